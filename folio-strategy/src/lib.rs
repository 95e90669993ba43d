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

//! # Folio-Strategy
//! Strategy interface, registry, indicator kit and the bundled strategies of
//! the Folio backtesting engine.
//!
//! A strategy is described by a [`StrategyInfo`] (shortcode, argument schema,
//! suggested parameter bundles, benchmark and factory) and exposes one
//! operation: [`Strategy::compute`], producing a time-ordered [`Plan`] of
//! target allocations plus a next-period prediction [`Pie`]. Computation must
//! be deterministic given identical arguments and identical data snapshots.
//!
//! Registration is explicit: [`registry()`] performs one `register` call per
//! bundled strategy during process bootstrap - no reflection.

/// Target-allocation [`Pie`] and the time-ordered [`Plan`].
pub mod allocation;

/// Defines all possible errors in Folio-Strategy.
pub mod error;

/// Momentum and moving-average indicators - pure functions over frames.
pub mod indicator;

/// Strategy descriptors: argument schema, suggested parameters, factories.
pub mod info;

/// Process-wide strategy registry.
pub mod registry;

/// Bundled strategy implementations.
pub mod strategies;

/// The [`Strategy`] trait and shared computation helpers.
pub mod strategy;

pub use allocation::{Pie, Plan};
pub use error::StrategyError;
pub use info::{Argument, ArgumentType, StrategyFactory, StrategyInfo};
pub use registry::{StrategyRegistry, registry};
pub use strategy::{ComputeCtx, Strategy};
