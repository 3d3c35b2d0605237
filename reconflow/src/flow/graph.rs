//! Graph construction and compilation.

use super::{Task, TaskFn, TaskHandle};
use crate::errors::{ErrorInfo, GraphValidationError};
use uuid::Uuid;

/// A dependency graph under construction.
#[derive(Debug)]
pub struct Graph {
    id: Uuid,
    name: String,
    tasks: Vec<Task>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no task was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registers a task and returns its handle.
    pub fn add(&mut self, task: Task) -> TaskHandle {
        let handle = TaskHandle {
            graph: self.id,
            index: self.tasks.len(),
        };
        self.tasks.push(task);
        handle
    }

    /// Compiles the graph into an executable [`Flow`].
    ///
    /// # Errors
    ///
    /// Returns a [`GraphValidationError`] if a dependency handle was issued by
    /// another graph or does not refer to an earlier task.
    pub fn compile(self) -> Result<Flow, GraphValidationError> {
        let mut nodes: Vec<Node> = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.into_iter().enumerate() {
            let mut dependencies = Vec::with_capacity(task.dependencies.len());
            for handle in &task.dependencies {
                if handle.graph != self.id {
                    return Err(GraphValidationError::new(format!(
                        "task {:?} of graph {:?} depends on a task of another graph",
                        task.name, self.name
                    ))
                    .with_tasks(vec![task.name.clone()])
                    .with_error_info(
                        ErrorInfo::new("GRAPH-FOREIGN-HANDLE", "Dependency handle belongs to another graph")
                            .with_fix_hint("Only use handles returned by this graph's add().")
                            .with_context_entry("graph", self.name.clone()),
                    ));
                }
                if handle.index >= index {
                    return Err(GraphValidationError::new(format!(
                        "task {:?} of graph {:?} depends on a task that was not added before it",
                        task.name, self.name
                    ))
                    .with_tasks(vec![task.name.clone()])
                    .with_error_info(
                        ErrorInfo::new("GRAPH-UNKNOWN-HANDLE", "Dependency handle is unknown")
                            .with_fix_hint("Add the dependency before the task that depends on it.")
                            .with_context_entry("index", handle.index.to_string()),
                    ));
                }
                dependencies.push(handle.index);
            }

            for &dependency in &dependencies {
                nodes[dependency].dependents.push(index);
            }
            nodes.push(Node {
                name: task.name,
                func: task.func,
                dependencies,
                dependents: Vec::new(),
            });
        }

        Ok(Flow {
            name: self.name,
            nodes,
        })
    }
}

#[derive(Debug)]
pub(super) struct Node {
    pub(super) name: String,
    pub(super) func: TaskFn,
    pub(super) dependencies: Vec<usize>,
    pub(super) dependents: Vec<usize>,
}

/// A compiled, immutable graph ready to run.
///
/// Nodes are stored in registration order, which is also a valid topological
/// order.
#[derive(Debug)]
pub struct Flow {
    pub(super) name: String,
    pub(super) nodes: Vec<Node>,
}

impl Flow {
    /// Returns the flow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the flow has no task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the task names in execution order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Returns the names of the direct dependencies of the named task.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        self.nodes.iter().find(|node| node.name == name).map(|node| {
            node.dependencies
                .iter()
                .map(|&index| self.nodes[index].name.as_str())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_builds_dependents_index() {
        let mut graph = Graph::new("reconcile");
        let a = graph.add(Task::new("A", TaskFn::noop()));
        let b = graph.add(Task::new("B", TaskFn::noop()));
        graph.add(Task::new("C", TaskFn::noop()).with_dependencies([a, b]));

        let flow = graph.compile().unwrap();
        assert_eq!(flow.len(), 3);
        assert_eq!(flow.nodes[0].dependents, vec![2]);
        assert_eq!(flow.nodes[1].dependents, vec![2]);
        assert_eq!(flow.nodes[2].dependencies, vec![0, 1]);
        assert_eq!(flow.dependencies_of("C"), Some(vec!["A", "B"]));
        assert_eq!(flow.task_names().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_empty_graph_compiles() {
        let flow = Graph::new("empty").compile().unwrap();
        assert!(flow.is_empty());
    }

    #[test]
    fn test_foreign_handle_is_rejected() {
        let mut other = Graph::new("other");
        let foreign = other.add(Task::new("X", TaskFn::noop()));

        let mut graph = Graph::new("reconcile");
        graph.add(Task::new("A", TaskFn::noop()));
        graph.add(Task::new("B", TaskFn::noop()).with_dependency(foreign));

        let err = graph.compile().unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-FOREIGN-HANDLE"));
        assert_eq!(err.tasks, vec!["B".to_string()]);
    }

    #[test]
    fn test_forward_handle_is_rejected() {
        let mut graph = Graph::new("reconcile");
        let a = graph.add(Task::new("A", TaskFn::noop()));
        let forward = TaskHandle {
            graph: a.graph,
            index: 5,
        };
        graph.add(Task::new("B", TaskFn::noop()).with_dependency(forward));

        let err = graph.compile().unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-UNKNOWN-HANDLE"));
    }

    #[test]
    fn test_acyclic_by_construction() {
        let mut graph = Graph::new("chain");
        let mut previous = graph.add(Task::new("0", TaskFn::noop()));
        for i in 1..50 {
            previous = graph.add(Task::new(i.to_string(), TaskFn::noop()).with_dependency(previous));
        }

        let flow = graph.compile().unwrap();
        for (index, node) in flow.nodes.iter().enumerate() {
            assert!(node.dependencies.iter().all(|&dep| dep < index));
        }
    }
}
