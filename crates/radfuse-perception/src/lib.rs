//! `radfuse-perception` – geometry and accumulation for multi-radar fusion.
//!
//! Everything here is synchronous and lock-free; the streaming facade in
//! `radfuse-middleware` adds the locking and event handling.
//!
//! # Modules
//!
//! - [`transform`] – [`RigidTransform`][transform::RigidTransform]: immutable
//!   4×4 rigid-body transform with a lazily cached inverse, plus the
//!   sensor-pose to ego-pose conversion.
//! - [`ring_buffer`] – [`RingBuffer`][ring_buffer::RingBuffer]: fixed-capacity
//!   FIFO that evicts the oldest element on overflow.
//! - [`filter`] – [`PointFilter`][filter::PointFilter] and
//!   [`SensorFilter`][filter::SensorFilter] strategies, with the default
//!   [`StaticPointFilter`][filter::StaticPointFilter].
//! - [`accumulator`] – [`PointCloudsAccumulator`][accumulator::PointCloudsAccumulator]:
//!   bounded per-radar history with SNR and delayed point filtering, queried
//!   in the local or the current ego frame.
//! - [`geodesy`] – [`EnuProjector`][geodesy::EnuProjector]: WGS-84 to local
//!   East-North-Up projection.
//! - [`heading`] – [`HeadingEstimator`][heading::HeadingEstimator]: yaw from
//!   the direction of travel when localization carries no orientation.

pub mod accumulator;
pub mod filter;
pub mod geodesy;
pub mod heading;
pub mod ring_buffer;
pub mod transform;

pub use accumulator::{AccumulatorConfig, PointCloudsAccumulator, TransformedPoint};
pub use filter::{PointFilter, SensorAllowList, SensorFilter, StaticPointFilter};
pub use geodesy::EnuProjector;
pub use heading::HeadingEstimator;
pub use ring_buffer::RingBuffer;
pub use transform::RigidTransform;
