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

//! # Folio-Frame
//! Column-oriented, date-indexed numeric table for the Folio backtesting engine.
//!
//! A [`Frame`] holds a strictly-increasing timestamp index, a unique set of
//! column names, and one `f64` column per name, all of equal length. Missing
//! values are IEEE 754 NaN - never an error, NaN is the normal warm-up signal
//! of windowed operations and is filtered with [`Frame::drop_na`] before
//! ranking.
//!
//! Operations are pure (they return new frames); the only row mutators are
//! [`Frame::insert_row`], [`Frame::insert_map`] and [`Frame::append`].
//! All windowing operations share one warm-up rule: the first `width - 1`
//! rows of their output are NaN.

/// Defines all possible errors in Folio-Frame.
pub mod error;

/// The [`Frame`] type: construction, accessors and row/column operations.
pub mod frame;

/// Algebraic and windowing operations over a [`Frame`].
pub mod ops;

pub use error::FrameError;
pub use frame::Frame;

use indexmap::IndexMap;
use smol_str::SmolStr;

/// Apply [`Frame::drop_na`] to every frame of a keyed map.
pub fn drop_na_all(frames: &IndexMap<SmolStr, Frame>) -> IndexMap<SmolStr, Frame> {
    frames
        .iter()
        .map(|(key, frame)| (key.clone(), frame.drop_na()))
        .collect()
}
