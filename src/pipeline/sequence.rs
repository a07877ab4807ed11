//! Ordered task sequences

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tasks::Task;

/// An ordered list of stages, fixed for the lifetime of a built pipeline.
/// Every process compiled against it carries exactly one directive per
/// position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskSequence {
    tasks: Vec<Task>,
}

impl TaskSequence {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    /// Parse from stage identity strings, e.g.
    /// `["kernel:linear", "optimizer:rlsprimal"]`
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self> {
        let tasks = ids
            .iter()
            .map(|id| id.as_ref().parse())
            .collect::<Result<Vec<Task>>>()?;
        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }
}
