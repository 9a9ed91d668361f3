//! The application model (C2): a queued/running job with a fixed container
//! count, mirroring the granularity the reference simulator uses for jobs
//! (`src/job.rs`), but flattened to the scheduler's per-container placement
//! view rather than a task dependency graph.

use crate::topology::{ClusterSlot, GroupTag, NO_GROUP};
use std::collections::HashSet;

pub type AppId = u64;
pub type NodeAddr = String;

/// One schedulable resource slot request, opaque to the scheduler beyond its
/// identity within the owning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub index: u32,
}

/// A container descriptor together with the node it has been bound to, if
/// any. `node == None` means the container is still awaiting placement.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub container: ContainerDescriptor,
    pub node: Option<NodeAddr>,
}

/// An admitted (or still-queued) unit of scheduling.
#[derive(Debug, Clone)]
pub struct Application {
    pub id: AppId,
    pub name: String,
    pub group: GroupTag,
    pub n_containers: usize,
    pub containers: Vec<ContainerDescriptor>,
    pub tasks: Vec<TaskHandle>,
    pub nodes: HashSet<NodeAddr>,
    pub cluster_slot: Option<ClusterSlot>,
    pub waiting_time: u64,
}

impl Application {
    pub fn new(id: AppId, name: impl Into<String>, group: GroupTag, n_containers: usize) -> Self {
        assert!(n_containers > 0, "an application must request at least one container");
        let containers: Vec<ContainerDescriptor> = (0..n_containers as u32)
            .map(|index| ContainerDescriptor { index })
            .collect();
        let tasks = containers
            .iter()
            .map(|c| TaskHandle {
                container: *c,
                node: None,
            })
            .collect();
        Self {
            id,
            name: name.into(),
            group,
            n_containers,
            containers,
            tasks,
            nodes: HashSet::new(),
            cluster_slot: None,
            waiting_time: 0,
        }
    }

    /// Convenience constructor for call sites that do not track a static
    /// group index (tests, the CLI demo harness).
    pub fn without_group(id: AppId, name: impl Into<String>, n_containers: usize) -> Self {
        Self::new(id, name, NO_GROUP, n_containers)
    }

    pub fn placed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.node.is_some()).count()
    }

    pub fn is_fully_placed(&self) -> bool {
        self.placed_count() == self.n_containers
    }

    /// Index of the next task still awaiting a node, if any.
    pub fn next_unplaced(&self) -> Option<usize> {
        self.tasks.iter().position(|t| t.node.is_none())
    }

    /// Bind the task at `task_index` to `node`, recording the node in the
    /// application's assigned node set.
    pub fn assign(&mut self, task_index: usize, node: &str) {
        self.tasks[task_index].node = Some(node.to_string());
        self.nodes.insert(node.to_string());
    }

    pub fn short_str(&self) -> String {
        format!("{}#{}", self.name, self.id)
    }
}

impl std::fmt::Display for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (group {}, {}/{} containers placed, waiting {})",
            self.short_str(),
            self.group,
            self.placed_count(),
            self.n_containers,
            self.waiting_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_ctor_has_unplaced_tasks() {
        let app = Application::new(0, "spark-job", 1, 4);
        assert_eq!(app.n_containers, 4);
        assert_eq!(app.placed_count(), 0);
        assert!(!app.is_fully_placed());
        assert_eq!(app.next_unplaced(), Some(0));
    }

    #[test]
    fn test_assign_tracks_node_set_and_placement() {
        let mut app = Application::new(0, "spark-job", 1, 2);
        app.assign(0, "10.0.0.1");
        assert_eq!(app.placed_count(), 1);
        assert!(!app.is_fully_placed());
        app.assign(1, "10.0.0.2");
        assert!(app.is_fully_placed());
        assert_eq!(app.nodes.len(), 2);
        assert_eq!(app.next_unplaced(), None);
    }

    #[test]
    #[should_panic]
    fn test_application_requires_at_least_one_container() {
        Application::without_group(0, "bad-job", 0);
    }
}
