//! The `utils` module provides definitions shared across `popchat`: the
//! broker's error type and logging initialisation.

pub mod error;
pub mod logging;
