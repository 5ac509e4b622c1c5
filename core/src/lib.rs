pub mod chain;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod signer;
pub mod transaction;
pub mod units;
pub mod wrapped;
