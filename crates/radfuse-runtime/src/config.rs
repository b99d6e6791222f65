//! Fusion settings – reads a `radfuse.toml` file and `RADFUSE_*` overrides.
//!
//! ```toml
//! capacity = 10
//! snr_threshold = 2.5
//! delayed_filter_depth = 3
//! static_velocity_threshold_m_s = 2.0
//! point_cloud_topic = "rt/radar_point_cloud"
//! extrinsics_topics = ["rt/extrinsics"]
//! sensor_allowlist = ["radar_front_left", "radar_front_right"]
//!
//! [localization]
//! mode = "geo_fix"
//! topic = "rt/gnss"
//! extrinsics_topic = "rt/gnss_extrinsics"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use radfuse_middleware::bus::SampleBus;
use radfuse_middleware::facade::{
    DEFAULT_EXTRINSICS_TOPIC, DEFAULT_LOCALIZATION_TOPIC, DEFAULT_POINT_CLOUD_TOPIC, FacadeConfig,
    LocalizationMode,
};
use radfuse_middleware::node::FusionNode;
use radfuse_perception::{AccumulatorConfig, SensorAllowList, StaticPointFilter};
use radfuse_types::FusionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised while loading or applying fusion settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error(transparent)]
    Fusion(#[from] FusionError),
}

/// Which localization source drives the ego pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationKind {
    None,
    #[default]
    Pose,
    GeoFix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationSettings {
    #[serde(default)]
    pub mode: LocalizationKind,

    /// Topic carrying poses or satellite fixes; ignored when `mode = "none"`.
    #[serde(default = "default_localization_topic")]
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrinsics_topic: Option<String>,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        Self {
            mode: LocalizationKind::default(),
            topic: default_localization_topic(),
            frame_id: None,
            extrinsics_topic: None,
        }
    }
}

/// Persisted fusion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionSettings {
    /// Frames kept per radar.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_snr_threshold")]
    pub snr_threshold: f32,

    #[serde(default = "default_delayed_filter_depth")]
    pub delayed_filter_depth: usize,

    /// Bound of the default static-point filter.  Values ≤ 0 disable the
    /// delayed point filter.
    #[serde(default = "default_static_velocity_threshold")]
    pub static_velocity_threshold_m_s: f32,

    #[serde(default = "default_point_cloud_topic")]
    pub point_cloud_topic: String,

    /// Radar extrinsics topics.  An empty list places every radar at the ego
    /// origin.
    #[serde(default = "default_extrinsics_topics")]
    pub extrinsics_topics: Vec<String>,

    /// Only these radars are accumulated when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_allowlist: Option<Vec<String>>,

    #[serde(default)]
    pub localization: LocalizationSettings,
}

fn default_capacity() -> usize {
    10
}
fn default_snr_threshold() -> f32 {
    AccumulatorConfig::DEFAULT_SNR_THRESHOLD
}
fn default_delayed_filter_depth() -> usize {
    AccumulatorConfig::DEFAULT_DELAYED_FILTER_DEPTH
}
fn default_static_velocity_threshold() -> f32 {
    StaticPointFilter::DEFAULT_VELOCITY_THRESHOLD_M_S
}
fn default_point_cloud_topic() -> String {
    DEFAULT_POINT_CLOUD_TOPIC.to_string()
}
fn default_localization_topic() -> String {
    DEFAULT_LOCALIZATION_TOPIC.to_string()
}
fn default_extrinsics_topics() -> Vec<String> {
    vec![DEFAULT_EXTRINSICS_TOPIC.to_string()]
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            snr_threshold: default_snr_threshold(),
            delayed_filter_depth: default_delayed_filter_depth(),
            static_velocity_threshold_m_s: default_static_velocity_threshold(),
            point_cloud_topic: default_point_cloud_topic(),
            extrinsics_topics: default_extrinsics_topics(),
            sensor_allowlist: None,
            localization: LocalizationSettings::default(),
        }
    }
}

impl FusionSettings {
    /// Build the facade configuration these settings describe.
    pub fn into_facade_config(self) -> Result<FacadeConfig, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "capacity",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.snr_threshold.is_nan() {
            return Err(ConfigError::Invalid {
                name: "snr_threshold",
                reason: "must be a number".to_string(),
            });
        }

        let localization = match self.localization.mode {
            LocalizationKind::None => LocalizationMode::None,
            LocalizationKind::Pose => LocalizationMode::Pose {
                topic: self.localization.topic,
            },
            LocalizationKind::GeoFix => LocalizationMode::GeoFix {
                topic: self.localization.topic,
            },
        };

        let mut config = FacadeConfig::new(self.capacity)
            .with_localization(localization)
            .with_point_cloud_topic(self.point_cloud_topic)
            .with_extrinsics_topics(self.extrinsics_topics)
            .with_snr_threshold(self.snr_threshold)
            .with_delayed_filter_depth(self.delayed_filter_depth);

        config = if self.static_velocity_threshold_m_s > 0.0 {
            config.with_point_filter(StaticPointFilter::new(self.static_velocity_threshold_m_s))
        } else {
            config.without_point_filter()
        };
        if let Some(allowed) = self.sensor_allowlist {
            config = config.with_sensor_filter(SensorAllowList::new(allowed));
        }
        if let Some(frame_id) = self.localization.frame_id {
            config = config.with_localization_frame_id(frame_id);
        }
        if let Some(topic) = self.localization.extrinsics_topic {
            config = config.with_localization_extrinsics_topic(topic);
        }

        config.validate()?;
        Ok(config)
    }

    /// Start a [`FusionNode`] on `bus` with these settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_node(self, bus: &SampleBus) -> Result<FusionNode, ConfigError> {
        let node = FusionNode::spawn(bus, self.into_facade_config()?)?;
        info!("fusion node started");
        Ok(node)
    }
}

/// Load settings from `path`.  Returns `None` if the file does not exist.
///
/// `RADFUSE_*` environment overrides are applied to the loaded settings.
pub fn load_from(path: &Path) -> Result<Option<FusionSettings>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut settings: FusionSettings = toml::from_str(&raw)?;
    apply_env_overrides(&mut settings);
    Ok(Some(settings))
}

/// Apply `RADFUSE_*` environment variable overrides to `settings`.
///
/// | Variable | Setting |
/// |---|---|
/// | `RADFUSE_CAPACITY` | `capacity` |
/// | `RADFUSE_SNR_THRESHOLD` | `snr_threshold` |
/// | `RADFUSE_POINT_CLOUD_TOPIC` | `point_cloud_topic` |
pub fn apply_env_overrides(settings: &mut FusionSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Override source extracted for testability without mutating environment
/// variables.  Unparsable values are logged and ignored.
pub(crate) fn apply_overrides_from(
    settings: &mut FusionSettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("RADFUSE_CAPACITY") {
        match v.parse::<usize>() {
            Ok(capacity) => settings.capacity = capacity,
            Err(e) => warn!(value = %v, error = %e, "ignoring RADFUSE_CAPACITY"),
        }
    }
    if let Some(v) = lookup("RADFUSE_SNR_THRESHOLD") {
        match v.parse::<f32>() {
            Ok(threshold) => settings.snr_threshold = threshold,
            Err(e) => warn!(value = %v, error = %e, "ignoring RADFUSE_SNR_THRESHOLD"),
        }
    }
    if let Some(v) = lookup("RADFUSE_POINT_CLOUD_TOPIC") {
        settings.point_cloud_topic = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn empty_file_yields_defaults() -> TestResult {
        let settings: FusionSettings = toml::from_str("")?;
        assert_eq!(settings, FusionSettings::default());
        assert_eq!(settings.snr_threshold, 2.5);
        assert_eq!(settings.delayed_filter_depth, 3);
        assert_eq!(settings.static_velocity_threshold_m_s, 2.0);
        assert_eq!(settings.extrinsics_topics, vec!["rt/extrinsics".to_string()]);
        assert_eq!(settings.localization.mode, LocalizationKind::Pose);
        assert_eq!(settings.localization.topic, "rt/radar_odometry");
        Ok(())
    }

    #[test]
    fn full_file_is_parsed() -> TestResult {
        let settings: FusionSettings = toml::from_str(
            r#"
            capacity = 4
            snr_threshold = 0.0
            extrinsics_topics = []
            sensor_allowlist = ["radar_front"]

            [localization]
            mode = "geo_fix"
            topic = "rt/gnss"
            frame_id = "gnss"
            extrinsics_topic = "rt/gnss_extrinsics"
            "#,
        )?;
        assert_eq!(settings.capacity, 4);
        assert!(settings.extrinsics_topics.is_empty());
        assert_eq!(settings.sensor_allowlist, Some(vec!["radar_front".to_string()]));

        let config = settings.into_facade_config()?;
        assert_eq!(
            config.localization,
            LocalizationMode::GeoFix {
                topic: "rt/gnss".into()
            }
        );
        assert_eq!(config.localization_frame_id.as_deref(), Some("gnss"));
        assert_eq!(config.subscribed_extrinsics_topics(), vec!["rt/gnss_extrinsics".to_string()]);
        assert!(config.accumulator.sensor_filter.is_some());
        Ok(())
    }

    #[test]
    fn unknown_localization_mode_is_a_parse_error() {
        let result: Result<FusionSettings, _> = toml::from_str("[localization]\nmode = \"sonar\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let settings = FusionSettings {
            capacity: 0,
            ..FusionSettings::default()
        };
        assert!(matches!(
            settings.into_facade_config(),
            Err(ConfigError::Invalid { name: "capacity", .. })
        ));
    }

    #[test]
    fn localization_options_without_mode_are_rejected() {
        let settings = FusionSettings {
            localization: LocalizationSettings {
                mode: LocalizationKind::None,
                frame_id: Some("gnss".into()),
                ..LocalizationSettings::default()
            },
            ..FusionSettings::default()
        };
        assert!(matches!(
            settings.into_facade_config(),
            Err(ConfigError::Fusion(FusionError::Configuration(_)))
        ));
    }

    #[test]
    fn non_positive_velocity_threshold_disables_point_filter() -> TestResult {
        let settings = FusionSettings {
            static_velocity_threshold_m_s: 0.0,
            ..FusionSettings::default()
        };
        assert!(settings.into_facade_config()?.accumulator.point_filter.is_none());
        assert!(
            FusionSettings::default()
                .into_facade_config()?
                .accumulator
                .point_filter
                .is_some()
        );
        Ok(())
    }

    #[test]
    fn overrides_replace_parsed_values() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("RADFUSE_CAPACITY", "7"),
            ("RADFUSE_SNR_THRESHOLD", "1.5"),
            ("RADFUSE_POINT_CLOUD_TOPIC", "rt/front_point_cloud"),
        ]);
        let mut settings = FusionSettings::default();
        apply_overrides_from(&mut settings, |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.capacity, 7);
        assert_eq!(settings.snr_threshold, 1.5);
        assert_eq!(settings.point_cloud_topic, "rt/front_point_cloud");
    }

    #[test]
    fn unparsable_overrides_are_ignored() {
        let mut settings = FusionSettings::default();
        apply_overrides_from(&mut settings, |name| {
            (name == "RADFUSE_CAPACITY").then(|| "many".to_string())
        });
        assert_eq!(settings.capacity, default_capacity());
    }

    #[test]
    fn missing_file_is_none() -> TestResult {
        let dir = tempfile::tempdir()?;
        assert!(load_from(&dir.path().join("radfuse.toml"))?.is_none());
        Ok(())
    }

    #[test]
    fn file_is_loaded_from_disk() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("radfuse.toml");
        fs::write(&path, "delayed_filter_depth = 1\n[localization]\nmode = \"none\"\n")?;

        let settings = load_from(&path)?.ok_or("settings not loaded")?;
        assert_eq!(settings.delayed_filter_depth, 1);
        assert_eq!(settings.localization.mode, LocalizationKind::None);
        Ok(())
    }

    #[test]
    fn malformed_file_is_a_parse_error() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("radfuse.toml");
        fs::write(&path, "capacity = \"ten\"\n")?;
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn spawn_node_subscribes_configured_topics() -> TestResult {
        let bus = SampleBus::default();
        let settings = FusionSettings {
            extrinsics_topics: vec!["rt/front_extrinsics".into(), "rt/rear_extrinsics".into()],
            ..FusionSettings::default()
        };
        let node = settings.spawn_node(&bus)?;

        assert_eq!(bus.subscriber_count("rt/radar_point_cloud"), 1);
        assert_eq!(bus.subscriber_count("rt/radar_odometry"), 1);
        assert_eq!(bus.subscriber_count("rt/front_extrinsics"), 1);
        assert_eq!(bus.subscriber_count("rt/rear_extrinsics"), 1);
        node.shutdown().await;
        Ok(())
    }
}
