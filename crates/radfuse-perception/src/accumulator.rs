//! Radar point cloud accumulation engine.
//!
//! [`PointCloudsAccumulator`] keeps a bounded history of point clouds per
//! radar, each frame paired with the ego pose that was current when it was
//! received, and answers "where are all these points now" queries in either
//! the shared local frame or the current ego frame.
//!
//! Two filters run on incoming points:
//!
//! - **SNR threshold** – applied immediately; points with a signal-to-noise
//!   ratio below the threshold never enter the buffer.
//! - **Delayed point filter** – applied exactly once per frame, at the moment
//!   the frame becomes `delayed_filter_depth` accumulate calls old.  Until
//!   then the frame keeps every point, which lets moving objects linger for a
//!   few cycles before being discarded.
//!
//! The transform from a radar point to the local frame is
//! `ego_pose_at_receipt · radar_extrinsics`:
//!
//! ```text
//! p_local = T_local_ego(t_receipt) · T_ego_radar · p_radar
//! p_ego   = T_local_ego(now)⁻¹ · p_local
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use radfuse_perception::accumulator::{AccumulatorConfig, PointCloudsAccumulator};
//! use radfuse_perception::transform::RigidTransform;
//! use radfuse_types::Point;
//!
//! let mut acc = PointCloudsAccumulator::new(
//!     AccumulatorConfig::new(2).with_snr_threshold(0.0).allow_no_extrinsics(true),
//! ).unwrap();
//!
//! let pose = Arc::new(RigidTransform::from_euler([5.0, 0.0, 0.0], [0.0; 3]));
//! acc.accumulate("radar_front", vec![Point::from([1.0, 2.0, 3.0, 0.0, 9.0, 0.0])], pose, None)
//!     .unwrap();
//!
//! let points = acc.get_points_local_frame_relative();
//! assert_eq!(points.len(), 1);
//! assert!((points[0].position.x - 6.0).abs() < 1e-9);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::{Matrix4, Vector3, Vector4};
use radfuse_types::{FusionError, Point, Result};
use tracing::{debug, trace, warn};

use crate::filter::{PointFilter, SensorFilter, StaticPointFilter};
use crate::ring_buffer::RingBuffer;
use crate::transform::RigidTransform;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Construction-time options for [`PointCloudsAccumulator`].
#[derive(Clone)]
pub struct AccumulatorConfig {
    /// Maximum number of frames kept per radar; must be > 0.
    pub capacity: usize,
    /// Points with an SNR below this are dropped on arrival.  Values ≤ 0
    /// disable the check.
    pub snr_threshold: f32,
    /// Number of accumulate calls a frame stays unfiltered.  0 applies the
    /// point filter immediately.
    pub delayed_filter_depth: usize,
    /// Delayed point filter; `None` keeps every point that passed the SNR
    /// threshold.
    pub point_filter: Option<Arc<dyn PointFilter>>,
    /// Restricts which radars are accumulated; `None` accepts all.
    pub sensor_filter: Option<Arc<dyn SensorFilter>>,
    /// When `true`, radars without extrinsics are treated as if mounted at
    /// the vehicle origin.
    pub allow_no_extrinsics: bool,
}

impl AccumulatorConfig {
    pub const DEFAULT_SNR_THRESHOLD: f32 = 2.5;
    pub const DEFAULT_DELAYED_FILTER_DEPTH: usize = 3;

    /// Defaults for everything but the capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            snr_threshold: Self::DEFAULT_SNR_THRESHOLD,
            delayed_filter_depth: Self::DEFAULT_DELAYED_FILTER_DEPTH,
            point_filter: Some(Arc::new(StaticPointFilter::default())),
            sensor_filter: None,
            allow_no_extrinsics: false,
        }
    }

    pub fn with_snr_threshold(mut self, snr_threshold: f32) -> Self {
        self.snr_threshold = snr_threshold;
        self
    }

    pub fn with_delayed_filter_depth(mut self, depth: usize) -> Self {
        self.delayed_filter_depth = depth;
        self
    }

    pub fn with_point_filter(mut self, filter: impl PointFilter + 'static) -> Self {
        self.point_filter = Some(Arc::new(filter));
        self
    }

    pub fn without_point_filter(mut self) -> Self {
        self.point_filter = None;
        self
    }

    pub fn with_sensor_filter(mut self, filter: impl SensorFilter + 'static) -> Self {
        self.sensor_filter = Some(Arc::new(filter));
        self
    }

    pub fn allow_no_extrinsics(mut self, allow: bool) -> Self {
        self.allow_no_extrinsics = allow;
        self
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for AccumulatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccumulatorConfig")
            .field("capacity", &self.capacity)
            .field("snr_threshold", &self.snr_threshold)
            .field("delayed_filter_depth", &self.delayed_filter_depth)
            .field("point_filter", &self.point_filter.as_ref().map(|_| "<filter>"))
            .field("sensor_filter", &self.sensor_filter.as_ref().map(|_| "<filter>"))
            .field("allow_no_extrinsics", &self.allow_no_extrinsics)
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output type
// ────────────────────────────────────────────────────────────────────────────

/// A point re-expressed in a target frame.  Produced by queries, never
/// stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedPoint {
    /// `(x, y, z, 1)` in the target frame.
    pub position_homogeneous: Vector4<f64>,
    /// `(x, y, z)` in the target frame.
    pub position: Vector3<f64>,
    /// Ground-relative radial velocity (m/s).
    pub ground_relative_velocity: f32,
    /// Signal-to-noise ratio.
    pub snr: f32,
    /// Radar the point came from.
    pub sensor_id: Arc<str>,
}

impl TransformedPoint {
    fn new(
        position_homogeneous: Vector4<f64>,
        ground_relative_velocity: f32,
        snr: f32,
        sensor_id: Arc<str>,
    ) -> Self {
        Self {
            position: position_homogeneous.xyz(),
            position_homogeneous,
            ground_relative_velocity,
            snr,
            sensor_id,
        }
    }

    fn reexpress(&mut self, to_target: &Matrix4<f64>) {
        self.position_homogeneous = to_target * self.position_homogeneous;
        self.position = self.position_homogeneous.xyz();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

/// One radar point cloud plus the ego pose in effect when it arrived.
#[derive(Debug)]
struct AccumulatedFrame {
    points: Vec<Point>,
    ego_pose: Arc<RigidTransform>,
}

#[derive(Debug)]
struct SensorHistory {
    sensor_id: Arc<str>,
    frames: RingBuffer<AccumulatedFrame>,
}

// ────────────────────────────────────────────────────────────────────────────
// PointCloudsAccumulator
// ────────────────────────────────────────────────────────────────────────────

/// Synchronous accumulation engine.  Not thread-safe on its own; the
/// streaming facade wraps it in a lock.
pub struct PointCloudsAccumulator {
    capacity: usize,
    snr_threshold: f32,
    delayed_filter_depth: usize,
    point_filter: Option<Arc<dyn PointFilter>>,
    sensor_filter: Option<Arc<dyn SensorFilter>>,
    allow_no_extrinsics: bool,

    /// Per-radar histories in first-seen order.
    histories: Vec<SensorHistory>,
    history_index: HashMap<String, usize>,
    /// Latest extrinsics per radar; overwritten, never cleared.
    extrinsics: HashMap<String, Arc<RigidTransform>>,
}

impl PointCloudsAccumulator {
    /// Build an accumulator.
    ///
    /// A delayed filter depth that is not smaller than the capacity disables
    /// the point filter: frames would be evicted before reaching that age.
    ///
    /// # Errors
    ///
    /// [`FusionError::Configuration`] when `capacity` is 0.
    pub fn new(config: AccumulatorConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(FusionError::configuration(
                "capacity (max frames per radar) must be > 0",
            ));
        }

        let point_filter = if config.delayed_filter_depth < config.capacity {
            config.point_filter
        } else {
            if config.point_filter.is_some() {
                warn!(
                    capacity = config.capacity,
                    delayed_filter_depth = config.delayed_filter_depth,
                    "delayed filter depth >= capacity; point filter will never run and is disabled"
                );
            }
            None
        };

        Ok(Self {
            capacity: config.capacity,
            snr_threshold: config.snr_threshold,
            delayed_filter_depth: config.delayed_filter_depth,
            point_filter,
            sensor_filter: config.sensor_filter,
            allow_no_extrinsics: config.allow_no_extrinsics,
            histories: Vec::new(),
            history_index: HashMap::new(),
            extrinsics: HashMap::new(),
        })
    }

    /// Accumulate the next point cloud of `sensor_id`.
    ///
    /// `ego_pose_at_receipt` is the vehicle pose in the local frame when the
    /// cloud arrived.  `extrinsics`, when given, replaces the cached mounting
    /// transform of the radar; otherwise the cached one is kept.
    ///
    /// # Errors
    ///
    /// [`FusionError::Precondition`] when no extrinsics were ever supplied
    /// for this radar and missing extrinsics are not allowed.  The call then
    /// leaves the accumulator untouched.
    pub fn accumulate(
        &mut self,
        sensor_id: &str,
        mut points: Vec<Point>,
        ego_pose_at_receipt: Arc<RigidTransform>,
        extrinsics: Option<Arc<RigidTransform>>,
    ) -> Result<()> {
        if let Some(filter) = &self.sensor_filter {
            if !filter.accept(sensor_id) {
                debug!(sensor_id, "point cloud from filtered-out radar ignored");
                return Ok(());
            }
        }

        if extrinsics.is_none()
            && !self.allow_no_extrinsics
            && !self.extrinsics.contains_key(sensor_id)
        {
            return Err(FusionError::precondition(format!(
                "no extrinsics known for radar '{sensor_id}' and missing extrinsics are not allowed"
            )));
        }

        if self.snr_threshold > 0.0 {
            let threshold = self.snr_threshold;
            points.retain(|p| p.signal_to_noise_ratio >= threshold);
        }

        let slot = self.history_slot(sensor_id);
        let history = &mut self.histories[slot];

        if let Some(filter) = &self.point_filter {
            let depth = self.delayed_filter_depth;
            if depth == 0 {
                points.retain(|p| filter.keep(p));
            } else if history.frames.len() >= depth {
                // The frame that has just aged to `depth` calls is filtered
                // now, and only now.
                if let Some(frame) = history.frames.nth_newest_mut(depth) {
                    frame.points.retain(|p| filter.keep(p));
                }
            }
        }

        if history
            .frames
            .push(AccumulatedFrame {
                points,
                ego_pose: ego_pose_at_receipt,
            })
            .is_some()
        {
            trace!(sensor_id, "oldest frame evicted");
        }

        if let Some(extrinsics) = extrinsics {
            self.extrinsics.insert(sensor_id.to_string(), extrinsics);
        }
        Ok(())
    }

    /// All accumulated points, expressed in the local frame the ego poses
    /// are given in.
    ///
    /// Ordered by radar (first-seen order), then by frame (oldest first),
    /// then by point order within the frame.
    pub fn get_points_local_frame_relative(&self) -> Vec<TransformedPoint> {
        let identity = Matrix4::identity();
        let mut out = Vec::new();

        for history in &self.histories {
            let extrinsics = self
                .extrinsics
                .get(history.sensor_id.as_ref())
                .map(|e| e.matrix())
                .unwrap_or(&identity);

            for frame in history.frames.iter() {
                let to_local = frame.ego_pose.matrix() * extrinsics;
                out.extend(frame.points.iter().map(|p| {
                    TransformedPoint::new(
                        to_local * Vector4::new(f64::from(p.x), f64::from(p.y), f64::from(p.z), 1.0),
                        p.ground_relative_radial_velocity,
                        p.signal_to_noise_ratio,
                        Arc::clone(&history.sensor_id),
                    )
                }));
            }
        }
        out
    }

    /// All accumulated points, expressed relative to `current_ego_pose`.
    pub fn get_points_ego_relative(&self, current_ego_pose: &RigidTransform) -> Vec<TransformedPoint> {
        let to_ego = current_ego_pose.inverse_matrix();
        let mut points = self.get_points_local_frame_relative();
        for point in &mut points {
            point.reexpress(to_ego);
        }
        points
    }

    /// See [`RigidTransform::localization_from_sensor_to_ego`].
    pub fn localization_from_sensor_to_ego(
        sensor_pose: &RigidTransform,
        sensor_extrinsics: &RigidTransform,
    ) -> RigidTransform {
        RigidTransform::localization_from_sensor_to_ego(sensor_pose, sensor_extrinsics)
    }

    // ── Introspection ───────────────────────────────────────────────────────

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `false` when no point filter is configured or it was disabled because
    /// the depth is not below the capacity.
    pub fn delayed_filter_enabled(&self) -> bool {
        self.point_filter.is_some()
    }

    /// Radars seen so far, in first-seen order.
    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.histories.iter().map(|h| h.sensor_id.as_ref())
    }

    /// Number of buffered frames for `sensor_id` (0 for unknown radars).
    pub fn frame_count(&self, sensor_id: &str) -> usize {
        self.history_index
            .get(sensor_id)
            .map_or(0, |&i| self.histories[i].frames.len())
    }

    /// Cached extrinsics for `sensor_id`, if any were received.
    pub fn extrinsics(&self, sensor_id: &str) -> Option<&Arc<RigidTransform>> {
        self.extrinsics.get(sensor_id)
    }

    fn history_slot(&mut self, sensor_id: &str) -> usize {
        if let Some(&slot) = self.history_index.get(sensor_id) {
            return slot;
        }
        let slot = self.histories.len();
        self.histories.push(SensorHistory {
            sensor_id: Arc::from(sensor_id),
            frames: RingBuffer::new(self.capacity),
        });
        self.history_index.insert(sensor_id.to_string(), slot);
        debug!(sensor_id, capacity = self.capacity, "new radar history");
        slot
    }
}

impl fmt::Debug for PointCloudsAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointCloudsAccumulator")
            .field("capacity", &self.capacity)
            .field("snr_threshold", &self.snr_threshold)
            .field("delayed_filter_depth", &self.delayed_filter_depth)
            .field("delayed_filter_enabled", &self.delayed_filter_enabled())
            .field("allow_no_extrinsics", &self.allow_no_extrinsics)
            .field("sensors", &self.histories.len())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
