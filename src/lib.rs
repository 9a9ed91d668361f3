//! A complementarity-aware batch scheduler: a cluster of fixed-capacity
//! nodes, a queue of multi-container applications, and a pluggable
//! placement policy that can exploit co-running resource-usage
//! complementarity (rather than treating every container as a uniform bin
//! item) when deciding what to schedule next and where to put it.

pub mod application;
pub mod cluster;
pub mod error;
pub mod estimator;
pub mod metrics;
pub mod policy;
pub mod resource_manager;
pub mod scheduler;
pub mod telemetry;
pub mod topology;
pub mod updater;

pub use application::{AppId, Application};
pub use cluster::{Cluster, Node};
pub use error::ScheduleError;
pub use estimator::{ComplementarityEstimator, EstimationBenchmark, Estimator, GroupEstimator};
pub use policy::PolicyKind;
pub use scheduler::{Config, Scheduler};
pub use topology::{ClusterSlot, GroupIndex, GroupTag, SlotIndex, NO_GROUP};
