//! Grade arithmetic: scale normalization and per-subject averages/status.

pub mod average;
pub mod normalize;

pub use average::*;
pub use normalize::*;
