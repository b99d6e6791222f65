//! Wires a [`StreamingFusionFacade`] to a [`SampleBus`].
//!
//! [`FusionNode::spawn`] subscribes to the point cloud topic, the
//! localization topic (if any) and every extrinsics topic, and forwards each
//! received sample to the matching facade handler from one tokio task per
//! topic.  Each topic accepts one sample kind; samples of any other kind are
//! dropped with a warning.  Handler errors are logged; they never stop a
//! subscription.
//!
//! Dropping the node (or calling [`FusionNode::shutdown`]) aborts every
//! subscription task before the node's reference to the facade is released.
//!
//! # Example
//!
//! ```rust
//! use radfuse_middleware::bus::SampleBus;
//! use radfuse_middleware::facade::{FacadeConfig, LocalizationMode};
//! use radfuse_middleware::node::FusionNode;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SampleBus::default();
//! let node = FusionNode::spawn(
//!     &bus,
//!     FacadeConfig::new(4).with_localization(LocalizationMode::None),
//! )?;
//! assert_eq!(bus.subscriber_count("rt/radar_point_cloud"), 1);
//!
//! node.shutdown().await;
//! assert_eq!(bus.subscriber_count("rt/radar_point_cloud"), 0);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use radfuse_types::{Result, Sample};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{SampleBus, TopicReceiver};
use crate::facade::{FacadeConfig, LocalizationMode, StreamingFusionFacade};

/// A facade plus the tasks feeding it from the bus.
pub struct FusionNode {
    facade: Arc<StreamingFusionFacade>,
    tasks: Vec<JoinHandle<()>>,
}

impl FusionNode {
    /// Build the facade and subscribe it to its topics.
    ///
    /// Subscriptions exist when this returns, so samples published
    /// afterwards are never missed.  Must be called from within a tokio
    /// runtime.
    pub fn spawn(bus: &SampleBus, config: FacadeConfig) -> Result<Self> {
        let mut routes = vec![(config.point_cloud_topic.clone(), Route::PointCloud)];
        match &config.localization {
            LocalizationMode::None => {}
            LocalizationMode::Pose { topic } => routes.push((topic.clone(), Route::Pose)),
            LocalizationMode::GeoFix { topic } => routes.push((topic.clone(), Route::GeoFix)),
        }
        routes.extend(
            config
                .subscribed_extrinsics_topics()
                .into_iter()
                .map(|topic| (topic, Route::Extrinsics)),
        );

        // Validation guarantees every topic appears once.
        let facade = Arc::new(StreamingFusionFacade::new(config)?);
        let tasks = routes
            .iter()
            .map(|(topic, route)| {
                let receiver = bus.subscribe(topic);
                tokio::spawn(forward(receiver, *route, Arc::clone(&facade)))
            })
            .collect();

        info!(?routes, "fusion node subscribed");
        Ok(Self { facade, tasks })
    }

    /// The facade, for queries.
    pub fn facade(&self) -> &Arc<StreamingFusionFacade> {
        &self.facade
    }

    /// Abort every subscription task and wait for it to finish.
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // Cancellation is the expected outcome here.
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = %e, "subscription task panicked");
                }
            }
        }
        info!("fusion node shut down");
    }
}

impl Drop for FusionNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for FusionNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionNode")
            .field("facade", &self.facade)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Sample kind a subscription forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    PointCloud,
    Pose,
    GeoFix,
    Extrinsics,
}

async fn forward(mut receiver: TopicReceiver, route: Route, facade: Arc<StreamingFusionFacade>) {
    while let Some(sample) = receiver.recv().await {
        let topic = receiver.topic();
        let result = match (route, sample) {
            (Route::PointCloud, Sample::PointCloud(cloud)) => facade.on_point_cloud(cloud),
            (Route::Pose, Sample::Pose(pose)) => facade.on_pose_sample(&pose),
            (Route::GeoFix, Sample::GeoFix(fix)) => facade.on_geo_fix(&fix),
            (Route::Extrinsics, Sample::Extrinsics(extrinsics)) => {
                facade.on_extrinsics_sample(topic, &extrinsics);
                Ok(())
            }
            (route, sample) => {
                warn!(topic, ?route, kind = sample.kind(), "unexpected sample kind dropped");
                continue;
            }
        };
        if let Err(e) = result {
            error!(topic, error = %e, "sample handler failed");
        }
    }
    debug!(topic = receiver.topic(), "subscription closed");
}
