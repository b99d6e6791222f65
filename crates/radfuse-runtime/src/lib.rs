//! `radfuse-runtime` – process-level wiring for radar fusion
//!
//! # Modules
//!
//! - [`config`] – [`FusionSettings`][config::FusionSettings]: TOML settings
//!   with `RADFUSE_*` environment overrides, turned into a validated
//!   [`FacadeConfig`][radfuse_middleware::FacadeConfig] or a running
//!   [`FusionNode`][radfuse_middleware::FusionNode].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod config;
pub mod telemetry;

pub use config::{ConfigError, FusionSettings, LocalizationKind, LocalizationSettings};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
