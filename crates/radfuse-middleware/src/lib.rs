//! `radfuse-middleware` – streaming side of radar fusion
//!
//! Turns asynchronous pose, satellite fix, extrinsics and point cloud
//! samples into accumulator updates, and routes those samples in-process.
//!
//! # Modules
//!
//! - [`bus`] – Topic-based publish/subscribe bus for [`radfuse_types::Sample`]s
//!   built on Tokio broadcast channels.
//! - [`facade`] – [`StreamingFusionFacade`], the thread-safe event handlers
//!   and queries around the point cloud accumulator.
//! - [`node`] – [`FusionNode`], one subscription task per topic feeding a
//!   shared facade.

pub mod bus;
pub mod facade;
pub mod node;

pub use bus::{SampleBus, TopicReceiver};
pub use facade::{FacadeConfig, LocalizationMode, PointCloudCallback, StreamingFusionFacade};
pub use node::FusionNode;
