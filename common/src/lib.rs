//! ratewindow common types
//!
//! Shared types used across the ratewindow crates: validated currency codes,
//! per-currency rate series, and the day/epoch arithmetic that defines the
//! trailing rate window.

pub mod currency;
pub mod series;
pub mod time;

pub use currency::*;
pub use series::*;
pub use time::*;
