//! Defines `Wait`, a job that turns time directives into a deadline or a delay.
//!
//! Directives accumulate through chained calls and are only reduced when the
//! wait is evaluated. Reduction folds every directive, in order, into an
//! accumulator pair `(now, then)`:
//!
//! - relative offsets (`seconds` .. `years`) move `then` forward and never
//!   change the mode;
//! - mode-defining directives (`timestamp`, `at`, `day_of_month`, the weekday
//!   directives) anchor `then` to a calendar position and commit a [`WaitMode`].
//!
//! A wait built only from relative offsets reduces to a duration in seconds;
//! any committed mode makes it reduce to an absolute Unix timestamp.

use crate::common::JobOutcome;
use crate::error::{JobError, WaitError};
use crate::job::Job;
use crate::runtime::Runtime;
use chrono::{
    DateTime, Datelike, Days, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeDelta, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// The name a `Wait` is known under when handed to a processor.
pub const WAIT_TASK_NAME: &str = "_Wait";

/// A source of the current instant. Overriding it makes reductions deterministic.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The class of absolute-time computation a wait has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    At,
    WeekDay,
    MonthDay,
    Timestamp,
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WaitMode::At => "AT",
            WaitMode::WeekDay => "WEEK_DAY",
            WaitMode::MonthDay => "MONTH_DAY",
            WaitMode::Timestamp => "TIMESTAMP",
        };
        f.write_str(label)
    }
}

/// The result of reducing a wait.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitTarget {
    /// An absolute deadline, in seconds since the Unix epoch.
    Timestamp(i64),
    /// A delay from the captured "now", in seconds.
    Duration(f64),
}

impl WaitTarget {
    /// Splits the target into a `(timestamp, duration)` pair; the unused slot is zero.
    pub fn into_parts(self) -> (i64, f64) {
        match self {
            WaitTarget::Timestamp(timestamp) => (timestamp, 0.0),
            WaitTarget::Duration(seconds) => (0, seconds),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Offset(Unit, i64),
    Timestamp(i64),
    At(String),
    DayOfMonth(u32),
    WeekDay { occurrence: u32, day: Weekday },
}

/// A job that waits for a deadline, a delay, or an event.
///
/// ```
/// use taskflow::prelude::*;
///
/// // Next Monday at 08:30 in Paris.
/// let wait = Wait::new()
///     .timezone("Europe/Paris")
///     .unwrap()
///     .monday(1)
///     .at("8:30");
/// assert!(matches!(
///     wait.timestamp_or_duration(),
///     Ok(WaitTarget::Timestamp(_))
/// ));
/// ```
#[derive(Clone, Default)]
pub struct Wait {
    event: Option<String>,
    directives: Vec<Directive>,
    timezone: Option<Tz>,
    clock: Option<Clock>,
}

impl fmt::Debug for Wait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wait")
            .field("event", &self.event)
            .field("directives", &self.directives)
            .field("timezone", &self.timezone)
            .field("clock_override", &self.clock.is_some())
            .finish()
    }
}

// Directive accumulation.
impl Wait {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the named event, bounded by the accumulated directives.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Evaluates calendar directives in the named IANA timezone.
    pub fn timezone(self, name: &str) -> Result<Self, WaitError> {
        let tz = name
            .parse::<Tz>()
            .map_err(|_| WaitError::UnknownTimezone(name.to_string()))?;
        Ok(self.with_timezone(tz))
    }

    pub fn with_timezone(mut self, tz: Tz) -> Self {
        self.timezone = Some(tz);
        self
    }

    /// Replaces the wall clock used to capture "now".
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn seconds(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Seconds, value))
    }

    pub fn minutes(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Minutes, value))
    }

    pub fn hours(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Hours, value))
    }

    pub fn days(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Days, value))
    }

    pub fn weeks(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Weeks, value))
    }

    pub fn months(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Months, value))
    }

    pub fn years(self, value: i64) -> Self {
        self.push(Directive::Offset(Unit::Years, value))
    }

    /// Waits until an absolute Unix timestamp. Cannot be combined with any other mode.
    pub fn timestamp(self, value: i64) -> Self {
        self.push(Directive::Timestamp(value))
    }

    /// Waits until a time of day, formatted `H`, `H:M` or `H:M:S`.
    pub fn at(self, time: impl Into<String>) -> Self {
        self.push(Directive::At(time.into()))
    }

    pub fn day_of_month(self, day: u32) -> Self {
        self.push(Directive::DayOfMonth(day))
    }

    /// Waits until the `occurrence`-th upcoming `day`.
    pub fn weekday(self, occurrence: u32, day: Weekday) -> Self {
        self.push(Directive::WeekDay { occurrence, day })
    }

    pub fn monday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Mon)
    }

    pub fn tuesday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Tue)
    }

    pub fn wednesday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Wed)
    }

    pub fn thursday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Thu)
    }

    pub fn friday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Fri)
    }

    pub fn saturday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Sat)
    }

    pub fn sunday(self, occurrence: u32) -> Self {
        self.weekday(occurrence, Weekday::Sun)
    }

    fn push(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }
}

// Reduction and execution.
impl Wait {
    /// Reduces the accumulated directives into a deadline or a delay.
    ///
    /// "Now" is captured once, from the clock override if one is set, and
    /// expressed in the configured timezone (the process's local zone by
    /// default). The first invalid or conflicting directive aborts the reduction.
    pub fn timestamp_or_duration(&self) -> Result<WaitTarget, WaitError> {
        let now = self.clock.as_ref().map_or_else(Utc::now, |clock| clock());
        match self.timezone {
            Some(tz) => self.reduce(now.with_timezone(&tz)),
            None => self.reduce(now.with_timezone(&Local)),
        }
    }

    fn reduce<Z: TimeZone>(&self, now: DateTime<Z>) -> Result<WaitTarget, WaitError> {
        let mut reduction = Reduction {
            then: now.clone(),
            now,
            mode: None,
        };
        for directive in &self.directives {
            reduction.apply(directive)?;
        }
        Ok(reduction.finish())
    }

    fn describe(&self, target: WaitTarget) -> Value {
        let (timestamp, duration) = match target {
            WaitTarget::Timestamp(timestamp) => (Some(timestamp), None),
            WaitTarget::Duration(seconds) => (None, Some(seconds)),
        };
        json!({
            "event": self.event,
            "timestamp": timestamp,
            "duration": duration,
        })
    }

    /// Runs this wait through the runtime's engine.
    pub async fn execute(&self, runtime: &Runtime) -> JobOutcome {
        runtime.engine().execute_one(Arc::new(self.clone())).await
    }

    pub fn dispatch(&self, runtime: &Runtime) -> oneshot::Receiver<JobOutcome> {
        runtime.engine().dispatch_one(Arc::new(self.clone()))
    }
}

impl Job for Wait {
    fn name(&self) -> &str {
        WAIT_TASK_NAME
    }

    fn handle(&self) -> JobOutcome {
        let target = self.timestamp_or_duration()?;
        Ok(Some(self.describe(target)))
    }

    fn payload(&self) -> Result<Option<Value>, JobError> {
        let target = self.timestamp_or_duration()?;
        Ok(Some(self.describe(target)))
    }
}

/// The accumulator folded over a wait's directives.
struct Reduction<Z: TimeZone> {
    now: DateTime<Z>,
    then: DateTime<Z>,
    mode: Option<WaitMode>,
}

impl<Z: TimeZone> Reduction<Z> {
    fn apply(&mut self, directive: &Directive) -> Result<(), WaitError> {
        self.then = match directive {
            Directive::Offset(unit, value) => offset(self.then.clone(), *unit, *value)?,
            Directive::Timestamp(timestamp) => self.timestamp(*timestamp)?,
            Directive::At(time) => self.at(time)?,
            Directive::DayOfMonth(day) => self.day_of_month(*day)?,
            Directive::WeekDay { occurrence, day } => self.week_day(*occurrence, *day)?,
        };
        Ok(())
    }

    fn finish(self) -> WaitTarget {
        match self.mode {
            Some(_) => WaitTarget::Timestamp(self.then.timestamp()),
            None => {
                let delta = self.then - self.now;
                WaitTarget::Duration(delta.num_milliseconds() as f64 / 1000.0)
            }
        }
    }

    /// Commits a mode, enforcing the exclusivity rules.
    ///
    /// The same mode cannot be set twice, `Timestamp` never coexists with
    /// another mode, and `At` yields to any stronger mode.
    fn set_mode(&mut self, mode: WaitMode) -> Result<(), WaitError> {
        if self.mode == Some(mode) {
            return Err(WaitError::IncompatibleDefinition);
        }
        if self.mode == Some(WaitMode::Timestamp)
            || (self.mode.is_some() && mode == WaitMode::Timestamp)
        {
            return Err(WaitError::IncompatibleDefinition);
        }
        if matches!(self.mode, None | Some(WaitMode::At)) {
            self.mode = Some(mode);
        }
        Ok(())
    }

    fn timestamp(&mut self, timestamp: i64) -> Result<DateTime<Z>, WaitError> {
        self.set_mode(WaitMode::Timestamp)?;
        self.now
            .timezone()
            .timestamp_opt(timestamp, 0)
            .single()
            .ok_or(WaitError::OutOfRange)
    }

    fn at(&mut self, time: &str) -> Result<DateTime<Z>, WaitError> {
        self.set_mode(WaitMode::At)?;
        let time = parse_time_of_day(time)?;
        let then = self.local(self.then.date_naive(), time)?;
        if then > self.now {
            return Ok(then);
        }
        match self.mode {
            Some(WaitMode::At) => add_days(then, 1),
            Some(WaitMode::WeekDay) => add_days(then, 7),
            Some(WaitMode::MonthDay) => add_months(then, 1),
            Some(other) => Err(WaitError::UnknownMode(other.to_string())),
            None => Err(WaitError::UnknownMode(String::new())),
        }
    }

    fn day_of_month(&mut self, day: u32) -> Result<DateTime<Z>, WaitError> {
        if !(1..=31).contains(&day) {
            return Err(WaitError::InvalidDayOfMonth(day));
        }
        self.set_mode(WaitMode::MonthDay)?;
        let time = self.now.time();
        let mut month = self
            .now
            .date_naive()
            .with_day(1)
            .ok_or(WaitError::OutOfRange)?;
        // A day missing from a month (the 31st of April) moves to the next month that has it.
        loop {
            if let Some(date) = month.with_day(day) {
                let then = self.local(date, time)?;
                if then > self.now {
                    return Ok(then);
                }
            }
            month = month
                .checked_add_months(Months::new(1))
                .ok_or(WaitError::OutOfRange)?;
        }
    }

    fn week_day(&mut self, occurrence: u32, day: Weekday) -> Result<DateTime<Z>, WaitError> {
        if occurrence == 0 {
            return Err(WaitError::InvalidOccurrence);
        }
        self.set_mode(WaitMode::WeekDay)?;
        let current = i64::from(self.then.weekday().number_from_monday());
        let target = i64::from(day.number_from_monday());
        let then = add_days(self.then.clone(), target - current)?;
        let weeks = if current > target {
            i64::from(occurrence)
        } else {
            i64::from(occurrence) - 1
        };
        add_days(then, weeks * 7)
    }

    fn local(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Z>, WaitError> {
        resolve(&self.now.timezone(), date.and_time(time))
    }
}

/// Maps a wall-clock time in `tz` to an instant.
///
/// A repeated time (clocks going back) takes its earliest instant. A skipped
/// time (clocks going forward) keeps the offset in force before the gap, so
/// 02:30 inside a 02:00-03:00 gap lands on 03:30.
fn resolve<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> Result<DateTime<Z>, WaitError> {
    if let Some(instant) = tz.from_local_datetime(&naive).earliest() {
        return Ok(instant);
    }
    let before_gap = naive
        .checked_sub_signed(TimeDelta::days(1))
        .ok_or(WaitError::OutOfRange)?;
    let offset = tz.offset_from_utc_datetime(&before_gap).fix();
    let utc = naive
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
        .ok_or(WaitError::OutOfRange)?;
    Ok(tz.from_utc_datetime(&utc))
}

fn parse_time_of_day(text: &str) -> Result<NaiveTime, WaitError> {
    let invalid = || WaitError::InvalidTimeOfDay(text.to_string());
    let segments: Vec<&str> = text.trim().split(':').collect();
    if segments.len() > 3 {
        return Err(invalid());
    }
    let mut parts = [0u32; 3];
    for (slot, segment) in parts.iter_mut().zip(&segments) {
        *slot = segment.trim().parse().map_err(|_| invalid())?;
    }
    NaiveTime::from_hms_opt(parts[0], parts[1], parts[2]).ok_or_else(invalid)
}

fn offset<Z: TimeZone>(
    then: DateTime<Z>,
    unit: Unit,
    value: i64,
) -> Result<DateTime<Z>, WaitError> {
    let by_delta = |delta: Option<TimeDelta>| {
        delta
            .and_then(|delta| then.clone().checked_add_signed(delta))
            .ok_or(WaitError::OutOfRange)
    };
    match unit {
        Unit::Seconds => by_delta(TimeDelta::try_seconds(value)),
        Unit::Minutes => by_delta(TimeDelta::try_minutes(value)),
        Unit::Hours => by_delta(TimeDelta::try_hours(value)),
        Unit::Days => add_days(then, value),
        Unit::Weeks => add_days(then, value.checked_mul(7).ok_or(WaitError::OutOfRange)?),
        Unit::Months => add_months(then, value),
        Unit::Years => add_months(then, value.checked_mul(12).ok_or(WaitError::OutOfRange)?),
    }
}

/// Calendar-aware day arithmetic: the local time of day is preserved.
fn add_days<Z: TimeZone>(then: DateTime<Z>, days: i64) -> Result<DateTime<Z>, WaitError> {
    let step = Days::new(days.unsigned_abs());
    let naive = then.naive_local();
    let shifted = if days >= 0 {
        naive.checked_add_days(step)
    } else {
        naive.checked_sub_days(step)
    };
    resolve(&then.timezone(), shifted.ok_or(WaitError::OutOfRange)?)
}

/// Calendar-aware month arithmetic; days past the end of the target month clamp to its last day.
fn add_months<Z: TimeZone>(then: DateTime<Z>, months: i64) -> Result<DateTime<Z>, WaitError> {
    let count = u32::try_from(months.unsigned_abs()).map_err(|_| WaitError::OutOfRange)?;
    let naive = then.naive_local();
    let shifted = if months >= 0 {
        naive.checked_add_months(Months::new(count))
    } else {
        naive.checked_sub_months(Months::new(count))
    };
    resolve(&then.timezone(), shifted.ok_or(WaitError::OutOfRange)?)
}
