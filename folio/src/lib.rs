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

//! # Folio
//! Folio core is a Rust engine for quantitative investment backtesting and
//! portfolio simulation.
//! * **Deterministic**: identical arguments and identical data snapshots
//!   produce byte-identical plans, ledgers and metrics.
//! * **Robust**: strongly typed models, append-only transaction ledger,
//!   cooperative cancellation at every suspension point.
//! * **Composable**: strategies, data providers and the persistence layer are
//!   plug-and-play trait implementations.
//!
//! ## Overview
//! A backtest flows through one pipeline: strategy computation produces a
//! target-allocation plan plus a next-period prediction, the portfolio engine
//! materialises the plan into a transaction ledger under fractional-share
//! accounting, and the performance engine marks the ledger to market daily
//! and aggregates risk/return metrics (CAGR horizons, volatility, drawdowns,
//! Sharpe, Sortino, Ulcer index).
//!
//! At a high level it provides:
//! * `Portfolio` ledger engine handling buys, sells, splits, dividends and
//!   deposits with cash reconciliation.
//! * `Performance` engine emitting daily measurements and a
//!   `PortfolioMetrics` bundle.
//! * A persistence bridge contract with an in-memory reference
//!   implementation.
//! * A backtest orchestrator plus batch-update loop with per-portfolio error
//!   isolation.

/// Backtest orchestrator and batch portfolio updates.
pub mod backtest;

/// Read-mostly cache of the latest metrics per strategy.
pub mod cache;

/// Defines all possible errors in Folio core.
pub mod error;

/// Provides default Folio Tracing logging initialisers.
pub mod logging;

/// Daily mark-to-market measurements and the portfolio metrics bundle.
pub mod performance;

/// Portfolio model and the transaction-ledger engine.
pub mod portfolio;

/// Work-queue message contract for simulation requests.
pub mod queue;

/// Persistence bridge: transactional load/save contracts plus the in-memory
/// reference implementation.
pub mod repository;

/// Work-queue consumer loop for simulation requests.
pub mod worker;

pub use error::FolioError;
