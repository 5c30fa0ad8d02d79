use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::ledger::models::{AssetId, SourceTransaction};

/// Read access to the source chain node
#[async_trait]
pub trait LedgerQueryClient: Send + Sync {
    /// Latest height minus one, or 0 when the node cannot be queried.
    /// Callers must treat 0 as "no progress available".
    async fn current_height(&self) -> u64;

    /// Transactions of the block at `height`, in block order
    async fn block_at(&self, height: u64) -> AppResult<Vec<SourceTransaction>>;
}

/// A payout ready for the destination network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRequest {
    pub recipient: String,
    /// Destination smallest units
    pub amount: u64,
    pub asset: AssetId,
    /// Network fee in destination smallest units
    pub fee: u64,
    pub memo: String,
}

/// Answer of the destination node to a submission that reached it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResponse {
    Accepted { id: String },
    /// The node returned an error payload instead of a transaction
    Rejected { message: String },
}

/// Signing and broadcast on the destination network
#[async_trait]
pub trait SettlementSubmitter: Send + Sync {
    fn network(&self) -> &str;

    /// Parse and check a destination address, returning its canonical form
    async fn resolve_address(&self, address: &str) -> AppResult<String>;

    /// Build, sign and broadcast a payout
    async fn submit(&self, payout: &PayoutRequest) -> AppResult<SubmitResponse>;
}
