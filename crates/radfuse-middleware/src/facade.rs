//! Thread-safe streaming front end of the point cloud accumulator.
//!
//! [`StreamingFusionFacade`] receives pose, satellite fix, extrinsics and
//! point cloud samples from independent delivery contexts (one per topic),
//! resolves which of them are usable yet, and forwards point clouds into a
//! [`PointCloudsAccumulator`] together with the latest ego pose.
//!
//! Every handler and query runs under a single [`parking_lot::Mutex`]
//! guarding all facade state.  Samples that arrive before their
//! prerequisites (a pose, or the extrinsics of their frame) are dropped and
//! logged at `debug!`; the next resolvable sample supersedes them.
//!
//! # Re-entrancy
//!
//! The optional post-accumulation callback is invoked after the lock has
//! been released, so it may call [`StreamingFusionFacade::get_points_local_frame_relative`]
//! and [`StreamingFusionFacade::get_points_ego_relative`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use nalgebra::Vector3;
use parking_lot::Mutex;
use radfuse_perception::{
    AccumulatorConfig, EnuProjector, HeadingEstimator, PointCloudsAccumulator, PointFilter,
    RigidTransform, SensorFilter, TransformedPoint,
};
use radfuse_types::{
    ExtrinsicsSample, FusionError, GeoFixSample, PointCloudSample, PoseSample, Result,
};
use tracing::{debug, info, trace};

/// Callback run after every point cloud handled by the facade.
pub type PointCloudCallback = Arc<dyn Fn(&StreamingFusionFacade) + Send + Sync>;

pub const DEFAULT_POINT_CLOUD_TOPIC: &str = "rt/radar_point_cloud";
pub const DEFAULT_LOCALIZATION_TOPIC: &str = "rt/radar_odometry";
pub const DEFAULT_EXTRINSICS_TOPIC: &str = "rt/extrinsics";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Where the ego pose comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalizationMode {
    /// No localization: the ego frame is the local frame.
    None,
    /// Full 6-DoF poses of the localization sensor.
    Pose { topic: String },
    /// Satellite fixes; yaw is estimated from the direction of travel.
    GeoFix { topic: String },
}

impl LocalizationMode {
    /// Topic carrying localization samples, if any.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Pose { topic } | Self::GeoFix { topic } => Some(topic),
        }
    }
}

/// Construction-time options for [`StreamingFusionFacade`].
///
/// `accumulator.allow_no_extrinsics` is not read: it is derived from whether
/// any radar extrinsics topic is configured.  The localization extrinsics
/// topic does not count.
#[derive(Clone)]
pub struct FacadeConfig {
    pub accumulator: AccumulatorConfig,
    pub localization: LocalizationMode,
    /// Frame id of the localization sensor.  Adopted from the first relevant
    /// sample when left unset.
    pub localization_frame_id: Option<String>,
    /// Topic carrying the localization sensor's extrinsics.  When unset the
    /// localization sensor is assumed to sit at the ego origin.
    pub localization_extrinsics_topic: Option<String>,
    pub point_cloud_topic: String,
    /// Topics carrying radar extrinsics.  Empty means every radar is mounted
    /// at the ego origin.
    pub extrinsics_topics: Vec<String>,
    pub on_point_cloud: Option<PointCloudCallback>,
}

impl FacadeConfig {
    /// Defaults: pose localization on [`DEFAULT_LOCALIZATION_TOPIC`], radar
    /// extrinsics on [`DEFAULT_EXTRINSICS_TOPIC`], accumulator defaults.
    pub fn new(capacity: usize) -> Self {
        Self {
            accumulator: AccumulatorConfig::new(capacity),
            localization: LocalizationMode::Pose {
                topic: DEFAULT_LOCALIZATION_TOPIC.to_string(),
            },
            localization_frame_id: None,
            localization_extrinsics_topic: None,
            point_cloud_topic: DEFAULT_POINT_CLOUD_TOPIC.to_string(),
            extrinsics_topics: vec![DEFAULT_EXTRINSICS_TOPIC.to_string()],
            on_point_cloud: None,
        }
    }

    pub fn with_localization(mut self, localization: LocalizationMode) -> Self {
        self.localization = localization;
        self
    }

    pub fn with_localization_frame_id(mut self, frame_id: impl Into<String>) -> Self {
        self.localization_frame_id = Some(frame_id.into());
        self
    }

    pub fn with_localization_extrinsics_topic(mut self, topic: impl Into<String>) -> Self {
        self.localization_extrinsics_topic = Some(topic.into());
        self
    }

    pub fn with_point_cloud_topic(mut self, topic: impl Into<String>) -> Self {
        self.point_cloud_topic = topic.into();
        self
    }

    pub fn with_extrinsics_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extrinsics_topics = topics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_snr_threshold(mut self, snr_threshold: f32) -> Self {
        self.accumulator = self.accumulator.with_snr_threshold(snr_threshold);
        self
    }

    pub fn with_delayed_filter_depth(mut self, depth: usize) -> Self {
        self.accumulator = self.accumulator.with_delayed_filter_depth(depth);
        self
    }

    pub fn with_point_filter(mut self, filter: impl PointFilter + 'static) -> Self {
        self.accumulator = self.accumulator.with_point_filter(filter);
        self
    }

    pub fn without_point_filter(mut self) -> Self {
        self.accumulator = self.accumulator.without_point_filter();
        self
    }

    pub fn with_sensor_filter(mut self, filter: impl SensorFilter + 'static) -> Self {
        self.accumulator = self.accumulator.with_sensor_filter(filter);
        self
    }

    pub fn on_point_cloud(
        mut self,
        callback: impl Fn(&StreamingFusionFacade) + Send + Sync + 'static,
    ) -> Self {
        self.on_point_cloud = Some(Arc::new(callback));
        self
    }

    /// Radar extrinsics topics plus the localization extrinsics topic, each
    /// listed once.
    pub fn subscribed_extrinsics_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::with_capacity(self.extrinsics_topics.len() + 1);
        let extra = self.localization_extrinsics_topic.iter();
        for topic in self.extrinsics_topics.iter().chain(extra) {
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        topics
    }

    /// Check the options [`StreamingFusionFacade::new`] rejects.
    pub fn validate(&self) -> Result<()> {
        if self.accumulator.capacity == 0 {
            return Err(FusionError::configuration("capacity must be greater than 0"));
        }
        match &self.localization {
            LocalizationMode::None => {
                if self.localization_frame_id.is_some() {
                    return Err(FusionError::configuration(
                        "a localization frame id requires a localization mode",
                    ));
                }
                if self.localization_extrinsics_topic.is_some() {
                    return Err(FusionError::configuration(
                        "a localization extrinsics topic requires a localization mode",
                    ));
                }
            }
            LocalizationMode::Pose { topic } | LocalizationMode::GeoFix { topic } => {
                if topic.is_empty() {
                    return Err(FusionError::configuration("localization topic must not be empty"));
                }
            }
        }
        if self.point_cloud_topic.is_empty() {
            return Err(FusionError::configuration("point cloud topic must not be empty"));
        }

        // Each topic carries a single sample kind.
        let extrinsics_topics = self.subscribed_extrinsics_topics();
        let localization_topic = self.localization.topic();
        if localization_topic == Some(self.point_cloud_topic.as_str())
            || extrinsics_topics.contains(&self.point_cloud_topic)
        {
            return Err(FusionError::configuration(format!(
                "point cloud topic {} is also used for another sample kind",
                self.point_cloud_topic
            )));
        }
        if let Some(topic) = localization_topic
            && extrinsics_topics.iter().any(|t| t == topic)
        {
            return Err(FusionError::configuration(format!(
                "localization topic {topic} is also used for extrinsics"
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for FacadeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacadeConfig")
            .field("accumulator", &self.accumulator)
            .field("localization", &self.localization)
            .field("localization_frame_id", &self.localization_frame_id)
            .field("localization_extrinsics_topic", &self.localization_extrinsics_topic)
            .field("point_cloud_topic", &self.point_cloud_topic)
            .field("extrinsics_topics", &self.extrinsics_topics)
            .field("on_point_cloud", &self.on_point_cloud.as_ref().map(|_| "Fn"))
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct GeoFixState {
    /// Fixed by the first satellite fix and never moved afterwards.
    origin: Option<EnuProjector>,
    heading: HeadingEstimator,
}

#[derive(Debug)]
struct FacadeState {
    accumulator: PointCloudsAccumulator,
    latest_ego_pose: Option<Arc<RigidTransform>>,
    localization_frame_id: Option<String>,
    extrinsics: HashMap<String, Arc<RigidTransform>>,
    geo_fix: Option<GeoFixState>,
}

/// Thread-safe event-driven wrapper around [`PointCloudsAccumulator`].
pub struct StreamingFusionFacade {
    localization: LocalizationMode,
    localization_extrinsics_topic: Option<String>,
    no_extrinsics: bool,
    identity: Arc<RigidTransform>,
    on_point_cloud: Option<PointCloudCallback>,
    state: Mutex<FacadeState>,
}

impl StreamingFusionFacade {
    /// Validate `config` and build an empty facade.
    ///
    /// Without localization the latest ego pose is the identity from the
    /// start; without radar extrinsics topics every radar frame is the ego
    /// frame.
    pub fn new(config: FacadeConfig) -> Result<Self> {
        config.validate()?;

        let no_extrinsics = config.extrinsics_topics.is_empty();
        let accumulator =
            PointCloudsAccumulator::new(config.accumulator.allow_no_extrinsics(no_extrinsics))?;
        let identity = Arc::new(RigidTransform::identity());

        let latest_ego_pose = match config.localization {
            LocalizationMode::None => Some(Arc::clone(&identity)),
            _ => None,
        };
        let geo_fix = match config.localization {
            LocalizationMode::GeoFix { .. } => Some(GeoFixState::default()),
            _ => None,
        };

        info!(
            localization = ?config.localization,
            no_extrinsics,
            capacity = accumulator.capacity(),
            "streaming fusion facade ready"
        );

        Ok(Self {
            localization: config.localization,
            localization_extrinsics_topic: config.localization_extrinsics_topic,
            no_extrinsics,
            identity,
            on_point_cloud: config.on_point_cloud,
            state: Mutex::new(FacadeState {
                accumulator,
                latest_ego_pose,
                localization_frame_id: config.localization_frame_id,
                extrinsics: HashMap::new(),
                geo_fix,
            }),
        })
    }

    // ── Event handlers ──────────────────────────────────────────────────────

    /// Handle a pose of the localization sensor.
    ///
    /// Errors when the facade is not in pose mode, or when the sample's
    /// frame id differs from the localization frame id while a localization
    /// extrinsics topic is configured.
    pub fn on_pose_sample(&self, sample: &PoseSample) -> Result<()> {
        if !matches!(self.localization, LocalizationMode::Pose { .. }) {
            return Err(FusionError::configuration(format!(
                "pose sample received with localization mode {:?}",
                self.localization
            )));
        }

        let mut state = self.state.lock();
        let Some(extrinsics) = self.localization_extrinsics(&mut state, &sample.frame_id)? else {
            debug!(frame_id = %sample.frame_id, "pose dropped: localization extrinsics pending");
            return Ok(());
        };

        let sensor_pose = RigidTransform::from_quaternion(sample.position, sample.orientation);
        let ego_pose = RigidTransform::localization_from_sensor_to_ego(&sensor_pose, &extrinsics);
        state.latest_ego_pose = Some(Arc::new(ego_pose));
        trace!(frame_id = %sample.frame_id, "ego pose updated");
        Ok(())
    }

    /// Handle a satellite fix of the localization sensor.
    ///
    /// The first fix fixes the ENU origin at its latitude and longitude.  A
    /// NaN altitude is read as 0.  The resulting ego pose carries only the
    /// estimated yaw.
    pub fn on_geo_fix(&self, sample: &GeoFixSample) -> Result<()> {
        let mut state = self.state.lock();
        if state.geo_fix.is_none() {
            return Err(FusionError::configuration(format!(
                "satellite fix received with localization mode {:?}",
                self.localization
            )));
        }

        let Some(extrinsics) = self.localization_extrinsics(&mut state, &sample.frame_id)? else {
            debug!(frame_id = %sample.frame_id, "fix dropped: localization extrinsics pending");
            return Ok(());
        };

        let Some(geo_fix) = state.geo_fix.as_mut() else {
            return Ok(());
        };
        let origin = geo_fix.origin.get_or_insert_with(|| {
            info!(
                latitude = sample.latitude,
                longitude = sample.longitude,
                "ENU origin fixed"
            );
            EnuProjector::new(sample.latitude, sample.longitude, 0.0)
        });

        let enu = origin.project(sample.latitude, sample.longitude, 0.0);
        let altitude = if sample.altitude.is_nan() { 0.0 } else { sample.altitude };
        let sensor_pose = RigidTransform::from_euler([enu.x, enu.y, altitude], [0.0; 3]);
        let ego_position: Vector3<f64> =
            RigidTransform::localization_from_sensor_to_ego(&sensor_pose, &extrinsics).translation();
        let yaw = geo_fix.heading.update(&ego_position);

        state.latest_ego_pose = Some(Arc::new(RigidTransform::from_euler(
            [ego_position.x, ego_position.y, ego_position.z],
            [0.0, 0.0, yaw],
        )));
        trace!(east = ego_position.x, north = ego_position.y, yaw, "ego pose updated from fix");
        Ok(())
    }

    /// Cache the extrinsics of `sample.child_frame_id`, replacing any earlier
    /// value.
    ///
    /// A sample on the localization extrinsics topic also names the
    /// localization frame when it is still unknown.
    pub fn on_extrinsics_sample(&self, topic: &str, sample: &ExtrinsicsSample) {
        let mut state = self.state.lock();

        if self.localization != LocalizationMode::None
            && state.localization_frame_id.is_none()
            && self.localization_extrinsics_topic.as_deref() == Some(topic)
        {
            info!(frame_id = %sample.child_frame_id, topic, "localization frame id adopted");
            state.localization_frame_id = Some(sample.child_frame_id.clone());
        }

        let extrinsics = RigidTransform::from_quaternion(sample.translation, sample.rotation);
        state
            .extrinsics
            .insert(sample.child_frame_id.clone(), Arc::new(extrinsics));
        debug!(frame_id = %sample.child_frame_id, topic, "extrinsics cached");
    }

    /// Accumulate a radar point cloud with the latest ego pose, then run the
    /// post-accumulation callback.
    ///
    /// The callback only runs when the cloud was handed to the accumulator.
    /// The sample is taken by value so its points move into the ring buffer
    /// without a copy.
    pub fn on_point_cloud(&self, sample: PointCloudSample) -> Result<()> {
        {
            let mut state = self.state.lock();
            let Some(ego_pose) = state.latest_ego_pose.clone() else {
                debug!(frame_id = %sample.frame_id, "point cloud dropped: localization pending");
                return Ok(());
            };

            let extrinsics = if self.no_extrinsics {
                None
            } else {
                match state.extrinsics.get(&sample.frame_id) {
                    Some(extrinsics) => Some(Arc::clone(extrinsics)),
                    None => {
                        debug!(frame_id = %sample.frame_id, "point cloud dropped: extrinsics pending");
                        return Ok(());
                    }
                }
            };

            state
                .accumulator
                .accumulate(&sample.frame_id, sample.points, ego_pose, extrinsics)?;
        }

        if let Some(callback) = &self.on_point_cloud {
            callback(self);
        }
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Every buffered point in the local frame.
    pub fn get_points_local_frame_relative(&self) -> Vec<TransformedPoint> {
        self.state.lock().accumulator.get_points_local_frame_relative()
    }

    /// Every buffered point relative to the latest ego pose.
    ///
    /// Empty while no ego pose has been resolved.
    pub fn get_points_ego_relative(&self) -> Vec<TransformedPoint> {
        let state = self.state.lock();
        match &state.latest_ego_pose {
            Some(pose) => state.accumulator.get_points_ego_relative(pose),
            None => Vec::new(),
        }
    }

    pub fn latest_ego_pose(&self) -> Option<Arc<RigidTransform>> {
        self.state.lock().latest_ego_pose.clone()
    }

    pub fn localization_frame_id(&self) -> Option<String> {
        self.state.lock().localization_frame_id.clone()
    }

    /// Cached extrinsics of `frame_id`.
    pub fn extrinsics(&self, frame_id: &str) -> Option<Arc<RigidTransform>> {
        self.state.lock().extrinsics.get(frame_id).cloned()
    }

    pub fn localization(&self) -> &LocalizationMode {
        &self.localization
    }

    /// `true` when radars are assumed to sit at the ego origin.
    pub fn no_extrinsics(&self) -> bool {
        self.no_extrinsics
    }

    // ── Internal helpers ────────────────────────────────────────────────────

    /// Extrinsics of the localization sensor reporting as `frame_id`.
    ///
    /// `Ok(None)` means they have not been received yet.
    fn localization_extrinsics(
        &self,
        state: &mut FacadeState,
        frame_id: &str,
    ) -> Result<Option<Arc<RigidTransform>>> {
        let expected = state.localization_frame_id.get_or_insert_with(|| {
            info!(frame_id, "localization frame id adopted");
            frame_id.to_string()
        });

        if self.localization_extrinsics_topic.is_none() {
            return Ok(Some(Arc::clone(&self.identity)));
        }
        if expected.as_str() != frame_id {
            return Err(FusionError::configuration(format!(
                "localization frame id is expected to be {expected} but {frame_id} was received"
            )));
        }
        Ok(state.extrinsics.get(frame_id).cloned())
    }
}

impl fmt::Debug for StreamingFusionFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingFusionFacade")
            .field("localization", &self.localization)
            .field("localization_extrinsics_topic", &self.localization_extrinsics_topic)
            .field("no_extrinsics", &self.no_extrinsics)
            .field("state", &self.state.try_lock().map(|state| format!("{:?}", *state)))
            .finish_non_exhaustive()
    }
}
