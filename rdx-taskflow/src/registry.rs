//! The task registry: maps task names to their canonical templates.

use crate::common::TaskId;
use crate::components::task::Task;
use crate::error::TaskError;
use serde_json::Value;
use slotmap::SlotMap;
use std::collections::HashMap;
use tracing::debug;

/// Registered task templates, keyed by name.
///
/// The registry only grows: a name can be registered once and its template is
/// never replaced.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: SlotMap<TaskId, Task>,
    names: HashMap<String, TaskId>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task template under its name.
    pub fn register(&mut self, task: Task) -> Result<TaskId, TaskError> {
        if self.names.contains_key(task.name()) {
            return Err(TaskError::Duplicate {
                name: task.name().to_string(),
            });
        }
        let name = task.name().to_string();
        let id = self.tasks.insert(task);
        self.names.insert(name.clone(), id);
        debug!(task = %name, "Registered task.");
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.names.get(name).and_then(|id| self.tasks.get(*id))
    }

    pub fn get_by_id(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Iterates over the registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.values().map(Task::name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Builds a task instance from a registered name and a JSON-encoded payload.
    ///
    /// The template is left untouched; the returned clone carries the decoded
    /// data. A blank payload means "no data".
    pub fn materialize(&self, name: &str, encoded: &str) -> Result<Task, TaskError> {
        let template = self.get(name).ok_or_else(|| TaskError::Unknown {
            name: name.to_string(),
        })?;
        let value = if encoded.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(encoded).map_err(|source| TaskError::Decode {
                name: name.to_string(),
                source,
            })?
        };
        template.with_data(value)
    }
}
