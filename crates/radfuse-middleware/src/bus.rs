//! In-process, topic-based publish/subscribe bus for fusion samples.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every sample without any single subscriber blocking
//! the others.  Topics are plain strings (`"rt/radar_point_cloud"`,
//! `"rt/extrinsics"`, ...); the channel behind a topic is created the first
//! time anyone publishes or subscribes to it.
//!
//! # Example
//!
//! ```rust
//! use radfuse_middleware::bus::SampleBus;
//! use radfuse_types::{PointCloudSample, Sample};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = SampleBus::default();
//! let mut rx = bus.subscribe("rt/radar_point_cloud");
//!
//! bus.publish(
//!     "rt/radar_point_cloud",
//!     Sample::PointCloud(PointCloudSample { frame_id: "radar_front".into(), points: vec![] }),
//! )?;
//!
//! assert!(matches!(rx.recv().await, Some(Sample::PointCloud(_))));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use radfuse_types::{FusionError, Result, Sample};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered samples before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared sample bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct SampleBus {
    capacity: usize,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Sample>>>>,
}

impl SampleBus {
    /// Create a new bus with the given per-topic channel capacity.
    ///
    /// A `capacity` of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `sample` on `topic`.
    ///
    /// Returns the number of subscribers that were handed the sample, or a
    /// [`FusionError::Transport`] when nobody is listening on the topic.
    pub fn publish(&self, topic: &str, sample: Sample) -> Result<usize> {
        let delivered = self
            .sender(topic)
            .send(sample)
            .map_err(|_| FusionError::transport(format!("no subscribers for topic {topic}")))?;
        trace!(topic, delivered, "sample published");
        Ok(delivered)
    }

    /// Subscribe to every sample published on `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self.sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Sample> {
        let mut topics = self.topics.lock();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for SampleBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Receiver
// ────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single topic.
///
/// Obtained via [`SampleBus::subscribe`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Sample>,
}

impl TopicReceiver {
    /// Wait for the next sample on this topic.
    ///
    /// A receiver that fell behind logs how many samples it missed and
    /// carries on with the oldest one still buffered.  Returns `None` once
    /// every clone of the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Sample> {
        loop {
            match self.receiver.recv().await {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "topic receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}
