//! Weighted task registry.
//!
//! Tasks carry integer weights. The registry precomputes a cumulative-weight
//! table once and every [`TaskRegistry::draw`] is a binary search over it,
//! so a weight-3 task comes up three times as often as a weight-1 task.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::error::{SetupError, SetupResult};
use crate::session::ApiRequest;

/// Builds the requests for one task execution from a random source.
pub type Operation = Arc<dyn Fn(&mut dyn RngCore) -> Vec<ApiRequest> + Send + Sync>;

/// A named, weighted operation.
#[derive(Clone)]
pub struct TaskDefinition {
    pub name: String,
    pub weight: u32,
    operation: Operation,
}

impl TaskDefinition {
    /// Produce this execution's requests.
    pub fn requests(&self, rng: &mut dyn RngCore) -> Vec<ApiRequest> {
        (self.operation)(rng)
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// Collects task definitions before freezing them into a [`TaskRegistry`].
#[derive(Default)]
pub struct TaskRegistryBuilder {
    tasks: Vec<TaskDefinition>,
}

impl TaskRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Order is preserved and only matters for draw tables.
    pub fn register<F>(mut self, name: impl Into<String>, weight: u32, operation: F) -> Self
    where
        F: Fn(&mut dyn RngCore) -> Vec<ApiRequest> + Send + Sync + 'static,
    {
        self.tasks.push(TaskDefinition {
            name: name.into(),
            weight,
            operation: Arc::new(operation),
        });
        self
    }

    /// Same as [`register`](Self::register) for an already shared operation.
    pub fn register_shared(mut self, name: impl Into<String>, weight: u32, operation: Operation) -> Self {
        self.tasks.push(TaskDefinition {
            name: name.into(),
            weight,
            operation,
        });
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> SetupResult<TaskRegistry> {
        if self.tasks.is_empty() {
            return Err(SetupError::EmptyRegistry);
        }
        if let Some(task) = self.tasks.iter().find(|t| t.weight == 0) {
            return Err(SetupError::ZeroWeight(task.name.clone()));
        }

        let mut cumulative = Vec::with_capacity(self.tasks.len());
        let mut sum = 0u64;
        for task in &self.tasks {
            sum += u64::from(task.weight);
            cumulative.push(sum);
        }

        Ok(TaskRegistry {
            tasks: self.tasks,
            cumulative,
        })
    }
}

/// Immutable, non-empty set of weighted tasks.
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tasks: Vec<TaskDefinition>,
    cumulative: Vec<u64>,
}

impl TaskRegistry {
    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::new()
    }

    /// Pick a task with probability `weight / total_weight`.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> &TaskDefinition {
        let r = rng.gen_range(0..self.total_weight());
        let idx = self.cumulative.partition_point(|&boundary| boundary <= r);
        &self.tasks[idx]
    }

    pub fn total_weight(&self) -> u64 {
        // build() guarantees at least one task
        self.cumulative[self.cumulative.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> &[TaskDefinition] {
        &self.tasks
    }

    pub fn cumulative_weights(&self) -> &[u64] {
        &self.cumulative
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}
