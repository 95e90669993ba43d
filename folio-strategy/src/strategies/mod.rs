/// Accelerating Dual Momentum.
pub mod adm;

/// Defensive Asset Allocation.
pub mod daa;

/// Momentum-Driven Earnings Prediction.
pub mod mdep;

/// Protective Asset Allocation.
pub mod paa;
