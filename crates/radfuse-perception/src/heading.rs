//! Yaw estimation from successive positions.
//!
//! Satellite fixes carry no orientation, so the heading is derived from the
//! direction of travel.  [`HeadingEstimator`] keeps a short history of
//! positions and compares each new one against the oldest retained entry.
//! Small displacements (GPS jitter, standing still) leave the previous yaw
//! untouched.

use nalgebra::Vector3;

use crate::ring_buffer::RingBuffer;

/// Squared planar displacement (m²) required before the yaw is updated.
pub const MIN_SQUARED_DISPLACEMENT_M2: f64 = 0.05;

/// Number of positions retained.
pub const HISTORY_LEN: usize = 3;

/// Estimates yaw (radians, counter-clockwise from east) from a stream of
/// ENU positions.
#[derive(Debug, Clone)]
pub struct HeadingEstimator {
    history: RingBuffer<Vector3<f64>>,
    last_yaw: f64,
}

impl HeadingEstimator {
    pub fn new() -> Self {
        Self {
            history: RingBuffer::new(HISTORY_LEN),
            last_yaw: 0.0,
        }
    }

    /// Feed the current position `(east, north, up)` and get the yaw to use
    /// for it.
    ///
    /// The first position seeds the history and keeps the initial yaw of 0.
    /// Afterwards, a position farther than the threshold from the oldest
    /// retained one sets the yaw to the bearing of that displacement and is
    /// pushed into the history; closer positions keep the previous yaw and
    /// are not recorded.
    pub fn update(&mut self, position: &Vector3<f64>) -> f64 {
        let reference = match self.history.oldest() {
            Some(oldest) => *oldest,
            None => {
                self.history.push(*position);
                *position
            }
        };

        let east = position.x - reference.x;
        let north = position.y - reference.y;

        if east * east + north * north > MIN_SQUARED_DISPLACEMENT_M2 {
            self.last_yaw = north.atan2(east);
            self.history.push(*position);
        }
        self.last_yaw
    }

    /// Yaw returned by the latest [`update`](Self::update).
    pub fn last_yaw(&self) -> f64 {
        self.last_yaw
    }

    /// Positions currently retained, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Vector3<f64>> + '_ {
        self.history.iter()
    }
}

impl Default for HeadingEstimator {
    fn default() -> Self {
        Self::new()
    }
}
