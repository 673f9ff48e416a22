//! Core services: valuation/rule engine, persistence gateway, and the
//! orchestration layer that binds them.

pub mod engine;
mod ledger;
pub(crate) mod store;

pub use ledger::LedgerService;
pub use store::LedgerStore;
