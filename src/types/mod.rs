//! Data types for the portfolio ledger.

mod analytics;
mod ledger;

pub use analytics::*;
pub use ledger::*;
