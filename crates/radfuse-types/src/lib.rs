//! `radfuse-types` – shared records for the radar fusion core.
//!
//! Holds the fixed-layout radar [`Point`], the inbound samples delivered by
//! the transport ([`PointCloudSample`], [`PoseSample`], [`GeoFixSample`],
//! [`ExtrinsicsSample`]) and the [`FusionError`] taxonomy used by every other
//! crate in the workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single radar detection as carried on the wire.
///
/// Field order matches the point cloud layout: `x, y, z` in the sensor frame,
/// then the sensor-relative radial velocity (carried but not used
/// downstream), the signal-to-noise ratio and the ground-relative radial
/// velocity.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub radar_relative_radial_velocity: f32,
    pub signal_to_noise_ratio: f32,
    pub ground_relative_radial_velocity: f32,
}

impl Point {
    pub const X_INDEX: usize = 0;
    pub const Y_INDEX: usize = 1;
    pub const Z_INDEX: usize = 2;
    pub const RADAR_RELATIVE_VELOCITY_INDEX: usize = 3;
    pub const SNR_INDEX: usize = 4;
    pub const GROUND_RELATIVE_VELOCITY_INDEX: usize = 5;

    /// Number of fields in a point record.
    pub const FIELD_COUNT: usize = 6;

    /// Positional access in wire order.  Returns `None` past the last field.
    pub fn field(&self, index: usize) -> Option<f32> {
        match index {
            Self::X_INDEX => Some(self.x),
            Self::Y_INDEX => Some(self.y),
            Self::Z_INDEX => Some(self.z),
            Self::RADAR_RELATIVE_VELOCITY_INDEX => Some(self.radar_relative_radial_velocity),
            Self::SNR_INDEX => Some(self.signal_to_noise_ratio),
            Self::GROUND_RELATIVE_VELOCITY_INDEX => Some(self.ground_relative_radial_velocity),
            _ => None,
        }
    }
}

impl From<[f32; Point::FIELD_COUNT]> for Point {
    fn from(fields: [f32; Point::FIELD_COUNT]) -> Self {
        let [x, y, z, radar_relative_radial_velocity, signal_to_noise_ratio, ground_relative_radial_velocity] =
            fields;
        Self {
            x,
            y,
            z,
            radar_relative_radial_velocity,
            signal_to_noise_ratio,
            ground_relative_radial_velocity,
        }
    }
}

impl From<Point> for [f32; Point::FIELD_COUNT] {
    fn from(p: Point) -> Self {
        [
            p.x,
            p.y,
            p.z,
            p.radar_relative_radial_velocity,
            p.signal_to_noise_ratio,
            p.ground_relative_radial_velocity,
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Inbound samples
// ────────────────────────────────────────────────────────────────────────────

/// One radar point cloud, tagged with the frame id of the radar that
/// produced it (e.g. `"radar_front_center"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudSample {
    pub frame_id: String,
    pub points: Vec<Point>,
}

/// A localization reading: where the localization sensor named by
/// `frame_id` is, in the local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    pub frame_id: String,
    /// `x, y, z` in metres.
    pub position: [f64; 3],
    /// Unit quaternion as `w, x, y, z`.
    pub orientation: [f64; 4],
}

/// A satellite navigation fix.  Carries no orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFixSample {
    /// Mounting frame of the receiver, used to look up its extrinsics.
    pub frame_id: String,
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Metres; `NaN` when the receiver reports no altitude.
    pub altitude: f64,
}

/// Mounting position and orientation of the frame `child_frame_id` relative
/// to the vehicle origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrinsicsSample {
    pub child_frame_id: String,
    /// `x, y, z` in metres.
    pub translation: [f64; 3],
    /// Unit quaternion as `w, x, y, z`.
    pub rotation: [f64; 4],
}

/// Any sample that can be routed over a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Sample {
    PointCloud(PointCloudSample),
    Pose(PoseSample),
    GeoFix(GeoFixSample),
    Extrinsics(ExtrinsicsSample),
}

impl Sample {
    /// Variant name, as written in the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PointCloud(_) => "PointCloud",
            Self::Pose(_) => "Pose",
            Self::GeoFix(_) => "GeoFix",
            Self::Extrinsics(_) => "Extrinsics",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Errors raised synchronously by construction and accumulation.
///
/// Samples that arrive before their prerequisites (pose, extrinsics) are not
/// errors; they are dropped silently by the facade.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusionError {
    /// Invalid constructor arguments or an inconsistent localization setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An operation was invoked before its required inputs were available.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The in-process transport could not deliver a sample.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FusionError {
    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Creates a precondition error.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Self::Precondition(reason.into())
    }

    /// Creates a transport error.
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport(reason.into())
    }
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, FusionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_from_wire_array_keeps_field_order() {
        let p = Point::from([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(p.x, 1.0);
        assert_eq!(p.signal_to_noise_ratio, 5.0);
        assert_eq!(p.ground_relative_radial_velocity, 6.0);
        assert_eq!(p.field(Point::SNR_INDEX), Some(5.0));
        assert_eq!(p.field(Point::GROUND_RELATIVE_VELOCITY_INDEX), Some(6.0));
        assert_eq!(p.field(Point::FIELD_COUNT), None);
    }

    #[test]
    fn point_back_to_array() {
        let fields = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0];
        let back: [f32; 6] = Point::from(fields).into();
        assert_eq!(back, fields);
    }

    #[test]
    fn sample_serialization_roundtrip() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let sample = Sample::PointCloud(PointCloudSample {
            frame_id: "radar_front_center".to_string(),
            points: vec![Point::from([1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
        });
        let json = serde_json::to_string(&sample)?;
        assert_eq!(sample.kind(), "PointCloud");
        assert!(json.contains("\"kind\":\"PointCloud\""));
        let back: Sample = serde_json::from_str(&json)?;
        assert_eq!(back, sample);
        Ok(())
    }

    #[test]
    fn fusion_error_display() {
        let err = FusionError::precondition("no extrinsics for radar_left");
        assert!(err.to_string().contains("precondition failed"));
        assert!(err.to_string().contains("radar_left"));

        let err = FusionError::configuration("capacity must be > 0");
        assert!(err.to_string().starts_with("configuration error"));
    }
}
