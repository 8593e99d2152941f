//! Core types for benchwatch, a benchmark results dashboard backend.
//!
//! This crate holds everything that does not touch the database or the
//! network: the domain model, the trend analyzer that classifies a result
//! against its history, report aggregation, payload validation and
//! configuration.
//!
//! # Modules
//!
//! - [`model`] - Dimensions, measurements and reports
//! - [`trend`] - Change detection for one result
//! - [`changes`] - Changes-table rows and report summaries
//! - [`payload`] - Submission payloads and their validation
//! - [`config`] - Layered settings
//! - [`telemetry`] - Tracing subscriber setup

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod changes;
pub mod config;
pub mod error;
pub mod model;
pub mod payload;
pub mod telemetry;
pub mod trend;

pub use changes::{summarize, ChangeRow, ReportSummary};
pub use config::{IngestConfig, ReportPolicy, Settings, TrendConfig};
pub use error::{Error, Result};
pub use model::{
    Benchmark, BenchmarkSpec, Branch, Colorcode, DataType, Environment, Executable, Measurement,
    MeasurementKey, NewMeasurement, Project, Quartiles, Report, ReportKey, Revision, RowId,
};
pub use payload::{ResultPayload, ValidatedResult};
pub use trend::{analyze, BenchmarkTraits, Classification, TrendOutcome};
