//! Tasks and the handles that connect them.

use super::TaskFn;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Opaque reference to a task registered in a [`Graph`](super::Graph).
///
/// A handle only exists once its task was added, so it can only be used as a
/// dependency of tasks added later. This keeps every graph acyclic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    pub(crate) graph: Uuid,
    pub(crate) index: usize,
}

/// An ordered set of task handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskHandles(BTreeSet<TaskHandle>);

impl TaskHandles {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle; returns false if it was already present.
    pub fn insert(&mut self, handle: TaskHandle) -> bool {
        self.0.insert(handle)
    }

    /// Returns true if the handle is in the set.
    #[must_use]
    pub fn contains(&self, handle: &TaskHandle) -> bool {
        self.0.contains(handle)
    }

    /// Number of handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the handles in order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskHandle> {
        self.0.iter()
    }
}

impl<const N: usize> From<[TaskHandle; N]> for TaskHandles {
    fn from(handles: [TaskHandle; N]) -> Self {
        Self(handles.into_iter().collect())
    }
}

impl From<TaskHandle> for TaskHandles {
    fn from(handle: TaskHandle) -> Self {
        Self::from([handle])
    }
}

impl FromIterator<TaskHandle> for TaskHandles {
    fn from_iter<I: IntoIterator<Item = TaskHandle>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TaskHandles {
    type Item = &'a TaskHandle;
    type IntoIter = std::collections::btree_set::Iter<'a, TaskHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A named unit of work with its dependencies.
///
/// The name shows up in progress reports and is the identifier under which
/// a failure is recorded. It is not checked for uniqueness.
#[derive(Debug, Clone)]
pub struct Task {
    /// Name and persisted identifier of the task.
    pub name: String,
    /// The work to do.
    pub func: TaskFn,
    /// Tasks that must finish first.
    pub dependencies: TaskHandles,
}

impl Task {
    /// Creates a task without dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, func: TaskFn) -> Self {
        Self {
            name: name.into(),
            func,
            dependencies: TaskHandles::new(),
        }
    }

    /// Sets the dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl Into<TaskHandles>) -> Self {
        self.dependencies = dependencies.into();
        self
    }

    /// Adds one dependency.
    #[must_use]
    pub fn with_dependency(mut self, handle: TaskHandle) -> Self {
        self.dependencies.insert(handle);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(index: usize) -> TaskHandle {
        TaskHandle {
            graph: Uuid::nil(),
            index,
        }
    }

    #[test]
    fn test_handles_are_deduplicated_and_ordered() {
        let handles = TaskHandles::from([handle(3), handle(1), handle(3)]);
        assert_eq!(handles.len(), 2);
        let indices: Vec<_> = handles.iter().map(|h| h.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("Deploy etcd", TaskFn::noop())
            .with_dependencies([handle(0)])
            .with_dependency(handle(1));

        assert_eq!(task.name, "Deploy etcd");
        assert!(task.dependencies.contains(&handle(0)));
        assert!(task.dependencies.contains(&handle(1)));
    }
}
