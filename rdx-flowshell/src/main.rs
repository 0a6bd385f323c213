use anyhow::Result;
use chrono::{DateTime, Weekday};
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use taskflow::prelude::*;
use taskflow::{ENGINE_NAME, VERSION as LIB_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    println!("{}", "-------------------------------------------------------------".dimmed());
    println!("{}", version_string);
    println!("{}", "-------------------------------------------------------------".dimmed());
}

/// Registers the tasks that can be run from the shell.
fn register_shell_tasks(runtime: &mut Runtime) -> Result<()> {
    runtime.register(
        Task::builder("echo").handler_with(|value: Value| Ok::<_, BoxError>(value)),
    )?;
    runtime.register(
        Task::builder("sum")
            .handler_with(|numbers: Vec<i64>| Ok::<_, BoxError>(numbers.iter().sum::<i64>())),
    )?;
    runtime.register(Task::builder("sleep").handler_with(|millis: u64| {
        std::thread::sleep(Duration::from_millis(millis));
        Ok::<_, BoxError>(millis)
    }))?;
    runtime.register(Task::builder("fail").handler(|| -> Result<(), BoxError> {
        Err("this task always fails".into())
    }))?;
    Ok(())
}

/// Spawns a listener printing every engine event.
fn spawn_event_listener(runtime: &Runtime) {
    let mut engine_rx = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = engine_rx.recv().await {
            info!("<-- [ENGINE EVENT] {:?}", event);
        }
    });
}

fn parse_value<T: FromStr>(directive: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("'{}' is not a valid value for '{}'.", value, directive))
}

/// Applies `<directive> <value>` pairs to `wait`, e.g. `monday 1 at 8:30`.
fn parse_wait(mut wait: Wait, args: &[&str]) -> Result<Wait, String> {
    let mut tokens = args.iter();
    while let Some(&directive) = tokens.next() {
        let value = *tokens
            .next()
            .ok_or_else(|| format!("'{}' needs a value.", directive))?;
        wait = match directive {
            "seconds" => wait.seconds(parse_value(directive, value)?),
            "minutes" => wait.minutes(parse_value(directive, value)?),
            "hours" => wait.hours(parse_value(directive, value)?),
            "days" => wait.days(parse_value(directive, value)?),
            "weeks" => wait.weeks(parse_value(directive, value)?),
            "months" => wait.months(parse_value(directive, value)?),
            "years" => wait.years(parse_value(directive, value)?),
            "timestamp" => wait.timestamp(parse_value(directive, value)?),
            "at" => wait.at(value),
            "day" => wait.day_of_month(parse_value(directive, value)?),
            "event" => wait.with_event(value),
            "timezone" => wait.timezone(value).map_err(|e| e.to_string())?,
            other => match other.parse::<Weekday>() {
                Ok(day) => wait.weekday(parse_value(directive, value)?, day),
                Err(_) => return Err(format!("Unknown directive '{}'.", other)),
            },
        };
    }
    Ok(wait)
}

fn describe_target(target: WaitTarget) -> String {
    match target {
        WaitTarget::Timestamp(timestamp) => match DateTime::from_timestamp(timestamp, 0) {
            Some(utc) => format!("timestamp {} ({})", timestamp, utc),
            None => format!("timestamp {}", timestamp),
        },
        WaitTarget::Duration(seconds) => format!("duration {} seconds", seconds),
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  wait <DIRECTIVE> <VALUE>...  - Reduces wait directives.");
    println!("                                 e.g. 'wait monday 1 at 8:30'");
    println!("                                 Directives: seconds minutes hours days weeks");
    println!("                                 months years timestamp at day <weekday>");
    println!("                                 event timezone");
    println!("  tasks                        - Lists the registered tasks.");
    println!("  run <TASK> [JSON]            - Executes a task and prints its outcome.");
    println!("  dispatch <TASK> [JSON]       - Starts a task and prints its outcome when ready.");
    println!("  exit                         - Quits the shell.");
}

fn print_outcome(name: &str, outcome: &JobOutcome) {
    match outcome {
        Ok(Some(value)) => println!("--> {} returned {}", name, value),
        Ok(None) => println!("--> {} finished without a value.", name),
        Err(e) => println!("{} {}", "--> Error:".red(), e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RuntimeConfig::load(None)?;
    let mut runtime = Runtime::new(config);
    register_shell_tasks(&mut runtime)?;
    spawn_event_listener(&runtime);
    let runtime = Arc::new(runtime);

    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();
                // Task payloads are free-form JSON, so keep everything after the task name.
                let payload = line.trim().splitn(3, char::is_whitespace).nth(2).unwrap_or("");

                if let Some(command) = args.first() {
                    match *command {
                        "wait" => match parse_wait(runtime.wait(), &args[1..]) {
                            Ok(wait) => match wait.timestamp_or_duration() {
                                Ok(target) => println!("--> {}", describe_target(target)),
                                Err(e) => println!("{} {}", "--> Error:".red(), e),
                            },
                            Err(message) => println!("{} {}", "--> Error:".red(), message),
                        },
                        "tasks" => {
                            println!("Registered tasks:");
                            for name in runtime.registry().names() {
                                println!("  {}", name);
                            }
                        }
                        "run" => match args.get(1) {
                            Some(name) => match runtime.task(name, payload) {
                                Ok(task) => {
                                    let outcome = task.execute(&runtime).await;
                                    print_outcome(name, &outcome);
                                }
                                Err(e) => println!("{} {}", "--> Error:".red(), e),
                            },
                            None => println!("Usage: run <TASK> [JSON]"),
                        },
                        "dispatch" => match args.get(1) {
                            Some(name) => match runtime.task(name, payload) {
                                Ok(task) => {
                                    let pending = task.dispatch(&runtime);
                                    let name = name.to_string();
                                    println!("--> Dispatched {}.", name);
                                    tokio::spawn(async move {
                                        match pending.await {
                                            Ok(outcome) => print_outcome(&name, &outcome),
                                            Err(_) => println!("--> {} was dropped.", name),
                                        }
                                    });
                                }
                                Err(e) => println!("{} {}", "--> Error:".red(), e),
                            },
                            None => println!("Usage: dispatch <TASK> [JSON]"),
                        },
                        "help" => print_help(),
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting flowshell...");
                break;
            }
        }
    }

    Ok(())
}
