// Deposit settlement pipeline: scan, filter, pay out, record
pub mod engine;
pub mod faults;
pub mod filter;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{PayoutTerms, SettlementEngine};
pub use faults::FaultRecorder;
pub use filter::TransactionFilter;
pub use scanner::{ScanConfig, Scanner};
