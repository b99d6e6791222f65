//! Point and sensor filter strategies.
//!
//! The accumulator takes its filters as trait objects supplied at
//! construction.  Closures with a matching signature implement the traits
//! directly, so ad-hoc predicates need no wrapper type.
//!
//! Built-in strategies:
//! - [`StaticPointFilter`] – keeps points whose ground-relative radial
//!   velocity is close to zero.  This is the default delayed point filter.
//! - [`SensorAllowList`] – keeps only point clouds from the listed sensors.

use std::collections::HashSet;

use radfuse_types::Point;

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// Decides whether an accumulated point is kept once the delayed filter is
/// applied to its frame.
pub trait PointFilter: Send + Sync {
    fn keep(&self, point: &Point) -> bool;
}

impl<F> PointFilter for F
where
    F: Fn(&Point) -> bool + Send + Sync,
{
    fn keep(&self, point: &Point) -> bool {
        self(point)
    }
}

/// Decides whether point clouds from a sensor id are accumulated at all.
pub trait SensorFilter: Send + Sync {
    fn accept(&self, sensor_id: &str) -> bool;
}

impl<F> SensorFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn accept(&self, sensor_id: &str) -> bool {
        self(sensor_id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in strategies
// ────────────────────────────────────────────────────────────────────────────

/// Keeps points whose ground-relative radial velocity magnitude is strictly
/// below `velocity_threshold_m_s`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticPointFilter {
    pub velocity_threshold_m_s: f32,
}

impl StaticPointFilter {
    pub const DEFAULT_VELOCITY_THRESHOLD_M_S: f32 = 2.0;

    pub fn new(velocity_threshold_m_s: f32) -> Self {
        Self {
            velocity_threshold_m_s,
        }
    }
}

impl Default for StaticPointFilter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VELOCITY_THRESHOLD_M_S)
    }
}

impl PointFilter for StaticPointFilter {
    fn keep(&self, point: &Point) -> bool {
        point.ground_relative_radial_velocity.abs() < self.velocity_threshold_m_s
    }
}

/// Accepts only the listed sensor ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorAllowList {
    allowed: HashSet<String>,
}

impl SensorAllowList {
    pub fn new<I, S>(sensor_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: sensor_ids.into_iter().map(Into::into).collect(),
        }
    }
}

impl SensorFilter for SensorAllowList {
    fn accept(&self, sensor_id: &str) -> bool {
        self.allowed.contains(sensor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_with_velocity(v: f32) -> Point {
        Point::from([0.0, 0.0, 0.0, 0.0, 10.0, v])
    }

    #[test]
    fn static_filter_uses_strict_magnitude_bound() {
        let filter = StaticPointFilter::default();
        assert!(filter.keep(&point_with_velocity(0.0)));
        assert!(filter.keep(&point_with_velocity(-1.99)));
        assert!(!filter.keep(&point_with_velocity(2.0)));
        assert!(!filter.keep(&point_with_velocity(-2.0)));
        assert!(!filter.keep(&point_with_velocity(15.0)));
    }

    #[test]
    fn closures_are_point_filters() {
        let filter = |p: &Point| p.ground_relative_radial_velocity >= 5.0;
        assert!(filter.keep(&point_with_velocity(5.0)));
        assert!(!filter.keep(&point_with_velocity(4.0)));
    }

    #[test]
    fn allow_list_accepts_only_listed_sensors() {
        let filter = SensorAllowList::new(["radar_front_left", "radar_front_right"]);
        assert!(filter.accept("radar_front_left"));
        assert!(!filter.accept("radar_rear"));
    }

    #[test]
    fn closures_are_sensor_filters() {
        let filter = |id: &str| id.starts_with("radar_front");
        assert!(filter.accept("radar_front_center"));
        assert!(!filter.accept("radar_rear_center"));
    }
}
