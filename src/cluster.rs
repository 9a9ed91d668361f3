//! The cluster model (C1): nodes, their container slots, and which
//! applications currently occupy them.

use crate::application::{AppId, Application, NodeAddr};
use crate::metrics::{MetricsBackend, UsageSample};
use crate::topology::{ClusterSlot, GroupTag, SlotIndex, NO_GROUP};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Placement is a programming error, not a recoverable condition: asking to
/// place zero containers, or placing on a node with no free slots, fails
/// loud.
#[derive(Debug)]
pub struct InvalidPlacement(pub String);

impl std::fmt::Display for InvalidPlacement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid placement: {}", self.0)
    }
}

impl std::error::Error for InvalidPlacement {}

/// A fixed-capacity container host.
#[derive(Debug, Clone)]
pub struct Node {
    pub address: NodeAddr,
    pub capacity: usize,
    containers: Vec<AppId>,
}

impl Node {
    pub fn new(address: impl Into<String>, capacity: usize) -> Self {
        Self {
            address: address.into(),
            capacity,
            containers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn is_non_full(&self) -> bool {
        self.containers.len() < self.capacity
    }

    pub fn available(&self) -> usize {
        self.capacity - self.containers.len()
    }

    pub fn hosts(&self, app_id: AppId) -> bool {
        self.containers.iter().any(|id| *id == app_id)
    }

    fn push_container(&mut self, app_id: AppId) -> Result<(), InvalidPlacement> {
        if !self.is_non_full() {
            return Err(InvalidPlacement(format!(
                "node {} has no free slots",
                self.address
            )));
        }
        self.containers.push(app_id);
        Ok(())
    }

    fn remove_app(&mut self, app_id: AppId) -> usize {
        let before = self.containers.len();
        self.containers.retain(|id| *id != app_id);
        before - self.containers.len()
    }
}

/// A mapping from node address to node, plus the static slot side-table and
/// the live set of running applications. `running` is a `BTreeMap`, not a
/// `HashMap`: callers (e.g. `policy::group_adaptive_extend_select`'s
/// fairness override, which reads "the first currently-scheduled app's
/// group") rely on a deterministic enumeration order, which a randomized
/// hasher would not give them.
pub struct Cluster {
    nodes: Vec<Node>,
    index_by_address: HashMap<NodeAddr, usize>,
    slot_index: SlotIndex,
    metrics: Arc<dyn MetricsBackend>,
    running: BTreeMap<AppId, Application>,
}

impl Cluster {
    pub fn new(nodes: Vec<Node>, slot_index: SlotIndex, metrics: Arc<dyn MetricsBackend>) -> Self {
        let mut index_by_address = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index_by_address.insert(node.address.clone(), i);
        }
        Self {
            nodes,
            index_by_address,
            slot_index,
            metrics,
            running: BTreeMap::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn slot_of(&self, address: &str) -> Option<ClusterSlot> {
        self.slot_index.get(address)
    }

    pub fn available_containers(&self) -> usize {
        self.nodes.iter().map(Node::available).sum()
    }

    /// Insertion order of addresses, per the tie-breaking contract.
    pub fn empty_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_empty()).collect()
    }

    pub fn non_full_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_non_full()).collect()
    }

    /// Place one container of `app_id` on the node at `address`, recording
    /// the ownership in the node's container list. Does not mutate the
    /// application itself; callers update the application's task list with
    /// `Application::assign`.
    pub fn place_container(&mut self, address: &str, app_id: AppId) -> Result<(), InvalidPlacement> {
        let idx = *self
            .index_by_address
            .get(address)
            .ok_or_else(|| InvalidPlacement(format!("unknown node {address}")))?;
        self.nodes[idx].push_container(app_id)
    }

    /// Register a fully-placed application as running.
    pub fn commit_running(&mut self, app: Application) {
        self.running.insert(app.id, app);
    }

    /// Remove a finished application's containers from every node it
    /// occupies and drop it from the running set.
    pub fn remove_applications(&mut self, app_id: AppId) -> Option<Application> {
        let app = self.running.remove(&app_id)?;
        for address in &app.nodes {
            if let Some(&idx) = self.index_by_address.get(address) {
                self.nodes[idx].remove_app(app_id);
            }
        }
        Some(app)
    }

    pub fn has_application_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Same predicate as `has_application_running`; the original source
    /// exposes both names at different call sites.
    pub fn has_application_scheduled(&self) -> bool {
        self.has_application_running()
    }

    fn app_has_non_full_host(&self, app: &Application) -> bool {
        app.nodes.iter().any(|address| {
            self.index_by_address
                .get(address)
                .map(|&idx| self.nodes[idx].is_non_full())
                .unwrap_or(false)
        })
    }

    /// The currently-running application set, optionally restricted to
    /// applications hosted on at least one non-full node.
    pub fn applications(&self, with_full_nodes: bool) -> Vec<&Application> {
        self.running
            .values()
            .filter(|app| with_full_nodes || self.app_has_non_full_host(app))
            .collect()
    }

    /// Same as `applications`, deduplicated by application name with a
    /// weight (occurrence count) attached, in first-seen order.
    pub fn applications_by_name(&self, with_full_nodes: bool) -> (Vec<Application>, Vec<usize>) {
        let mut order = Vec::new();
        let mut weight: HashMap<String, usize> = HashMap::new();
        let mut representative: HashMap<String, Application> = HashMap::new();
        for app in self.applications(with_full_nodes) {
            let counter = weight.entry(app.name.clone()).or_insert(0);
            *counter += 1;
            if !representative.contains_key(&app.name) {
                order.push(app.name.clone());
                representative.insert(app.name.clone(), app.clone());
            }
        }
        let apps = order
            .iter()
            .map(|name| representative.remove(name).unwrap())
            .collect();
        let weights = order.iter().map(|name| weight[name]).collect();
        (apps, weights)
    }

    /// One `(apps_on_node, usage_sample)` pair per node, in insertion order.
    /// `apps_on_node` lists the group tag of every distinct application
    /// hosted on that node.
    pub fn apps_usage(&self) -> Vec<(Vec<GroupTag>, Box<dyn UsageSample>)> {
        self.nodes
            .iter()
            .map(|node| {
                let mut seen = Vec::new();
                let mut groups = Vec::new();
                for &app_id in &node.containers {
                    if seen.contains(&app_id) {
                        continue;
                    }
                    seen.push(app_id);
                    let group = self
                        .running
                        .get(&app_id)
                        .map(|app| app.group)
                        .unwrap_or(NO_GROUP);
                    groups.push(group);
                }
                (groups, self.metrics.sample_for(&node.address))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ConstantMetricsBackend;

    fn cluster(capacities: &[usize], rate: f64) -> Cluster {
        let nodes = capacities
            .iter()
            .enumerate()
            .map(|(i, &c)| Node::new(format!("n{i}"), c))
            .collect();
        Cluster::new(nodes, SlotIndex::new(), Arc::new(ConstantMetricsBackend { rate }))
    }

    #[test]
    fn test_available_containers() {
        let c = cluster(&[4, 4], 0.0);
        assert_eq!(c.available_containers(), 8);
    }

    #[test]
    fn test_place_and_remove_roundtrip() {
        let mut c = cluster(&[2], 0.0);
        c.place_container("n0", 7).unwrap();
        c.place_container("n0", 7).unwrap();
        assert_eq!(c.available_containers(), 0);
        assert!(c.place_container("n0", 8).is_err());

        let mut app = Application::without_group(7, "job", 2);
        app.assign(0, "n0");
        app.assign(1, "n0");
        c.commit_running(app);

        let removed = c.remove_applications(7).unwrap();
        assert_eq!(removed.id, 7);
        assert_eq!(c.available_containers(), 2);
    }

    #[test]
    fn test_empty_and_non_full_nodes_preserve_insertion_order() {
        let mut c = cluster(&[1, 1, 1], 0.0);
        c.place_container("n1", 1).unwrap();
        let empty: Vec<_> = c.empty_nodes().iter().map(|n| n.address.clone()).collect();
        assert_eq!(empty, vec!["n0".to_string(), "n2".to_string()]);
    }

    #[test]
    fn test_apps_usage_gates_on_group_tags() {
        let mut c = cluster(&[2], 1.2);
        c.place_container("n0", 1).unwrap();
        c.place_container("n0", 2).unwrap();
        let mut a = Application::new(1, "a", 10, 1);
        a.assign(0, "n0");
        let mut b = Application::new(2, "b", 20, 1);
        b.assign(0, "n0");
        c.commit_running(a);
        c.commit_running(b);

        let usage = c.apps_usage();
        assert_eq!(usage.len(), 1);
        let (groups, sample) = &usage[0];
        assert_eq!(groups.len(), 2);
        assert!(groups.contains(&10) && groups.contains(&20));
        assert!(sample.is_not_idle());
    }
}
