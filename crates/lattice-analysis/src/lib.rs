//! Lattice Analysis — topic bus, module holder, and the pipeline runner

pub mod broker;
pub mod holder;
pub mod runner;
pub mod status;

pub use broker::{Broker, Event, Subscription, TopicConfig, SUBSCRIBER_QUEUE_DEPTH};
pub use holder::ModuleHolder;
pub use runner::{AnalysisOptions, AnalysisRunner};
pub use status::{
    TargetGraphUpdate, WorkspaceState, WorkspaceStatus, TOPIC_TARGET_GRAPH, TOPIC_WORKSPACE_STATUS,
};
