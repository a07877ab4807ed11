//! Processes: named per-stage directive assignments

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Per-stage execution instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Directive {
    /// Run the stage; result visible within the run only
    Compute,
    /// Run the stage and persist the result in the session store
    ComputeAndSave,
    /// Skip execution; fetch the previously persisted result
    Load,
    /// Skip entirely; no result available downstream
    Ignore,
}

impl Directive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Directive::Compute => "compute",
            Directive::ComputeAndSave => "computeNsave",
            Directive::Load => "load",
            Directive::Ignore => "ignore",
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Directive {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compute" => Ok(Directive::Compute),
            "computeNsave" => Ok(Directive::ComputeAndSave),
            "load" => Ok(Directive::Load),
            "ignore" => Ok(Directive::Ignore),
            other => Err(PipelineError::InvalidDirective(other.to_string())),
        }
    }
}

/// A named, complete directive assignment across the task sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub name: String,
    pub directives: Vec<Directive>,
}

/// Registry of processes validated against the active task sequence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessTable {
    processes: HashMap<String, Process>,
    order: Vec<String>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a process. The directive list must be positionally aligned
    /// with the sequence, hence exactly `sequence_len` entries.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        directives: Vec<Directive>,
        sequence_len: usize,
    ) -> Result<()> {
        let name = name.into();
        if self.processes.contains_key(&name) {
            return Err(PipelineError::DuplicateName(name));
        }
        if directives.len() != sequence_len {
            return Err(PipelineError::LengthMismatch {
                expected: sequence_len,
                actual: directives.len(),
            });
        }
        self.order.push(name.clone());
        self.processes.insert(
            name.clone(),
            Process { name, directives },
        );
        Ok(())
    }

    /// Register a process from directive tokens
    /// (`compute` / `computeNsave` / `load` / `ignore`)
    pub fn add_tokens<S: AsRef<str>>(
        &mut self,
        name: impl Into<String>,
        tokens: &[S],
        sequence_len: usize,
    ) -> Result<()> {
        let directives = tokens
            .iter()
            .map(|t| t.as_ref().parse())
            .collect::<Result<Vec<Directive>>>()?;
        self.add(name, directives, sequence_len)
    }

    pub fn get(&self, name: &str) -> Option<&Process> {
        self.processes.get(name)
    }

    /// Registered names in insertion order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Explicit reset; required before re-registering a name
    pub fn clear(&mut self) {
        self.processes.clear();
        self.order.clear();
    }
}
