//! ratefeed Common Types
//!
//! Shared types used across the ratefeed workspace: currency codes, the
//! per-currency exchange rate record, the rate table assembled from one
//! snapshot, and the simplified rates map used for conversion.

pub mod currency;
pub mod error;
pub mod rate;
pub mod rates_map;
pub mod time;

pub use currency::*;
pub use error::*;
pub use rate::*;
pub use rates_map::*;
pub use time::*;
