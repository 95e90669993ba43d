#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! # Folio-Data
//! Price/metric service contracts for the Folio backtesting engine.
//!
//! The engine core never talks to a storage or vendor API directly; it
//! consumes the [`MetricService`] and [`RatingService`] contracts defined
//! here. Deterministic in-memory implementations back the test-suite and
//! fixtures. All request dates are interpreted in US Eastern, and end-of-day
//! rows are stamped at the regular session close.

/// Corporate action model with deterministic ordering.
pub mod actions;

/// Cooperative cancellation context passed through every suspension point.
pub mod ctx;

/// Defines all possible errors in Folio-Data.
pub mod error;

/// Deterministic in-memory [`MetricService`] / [`RatingService`] implementations.
pub mod in_memory;

/// The [`Metric`] taxonomy and column naming convention.
pub mod metric;

/// Request builder and the [`SecurityFrames`] result cache.
pub mod request;

/// External collaborator contracts.
pub mod service;

pub use actions::{ActionKind, CorporateAction};
pub use ctx::{CancelHandle, Ctx, CtxError};
pub use error::DataError;
pub use in_memory::{InMemoryMetricService, InMemoryRatingService};
pub use metric::{Metric, column_name};
pub use request::{DataRequest, SecurityFrames};
pub use service::{MetricService, RatingService};
