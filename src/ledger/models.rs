use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset identifier on either network
///
/// Nodes report the native asset as a null `assetId`, configuration names it by ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum AssetId {
    Native,
    Issued(String),
}

impl AssetId {
    /// Interpret a configured asset id, where `native_ticker` denotes the native asset
    pub fn from_configured(asset_id: &str, native_ticker: &str) -> Self {
        if asset_id.is_empty() || asset_id.eq_ignore_ascii_case(native_ticker) {
            AssetId::Native
        } else {
            AssetId::Issued(asset_id.to_string())
        }
    }
}

impl From<Option<String>> for AssetId {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(id) if !id.is_empty() => AssetId::Issued(id),
            _ => AssetId::Native,
        }
    }
}

impl From<AssetId> for Option<String> {
    fn from(value: AssetId) -> Self {
        match value {
            AssetId::Native => None,
            AssetId::Issued(id) => Some(id),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "native"),
            AssetId::Issued(id) => write!(f, "{}", id),
        }
    }
}

/// Transaction as read from a source block
///
/// Only the fields the gateway inspects are kept. Fields that other transaction
/// kinds omit default to empty so unrelated traffic never breaks block parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTransaction {
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: u8,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default = "native_asset")]
    pub asset_id: AssetId,
    #[serde(default)]
    pub amount: u64,
    /// Base58 encoded attachment bytes
    #[serde(default)]
    pub attachment: Option<String>,
}

fn native_asset() -> AssetId {
    AssetId::Native
}

/// A settled payout. One row per source transaction id, ever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTransfer {
    pub source_address: String,
    pub destination_address: String,
    pub source_tx_id: String,
    pub destination_tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Payout in destination smallest units
    pub amount: i64,
    /// Fee withheld, in source human units
    #[serde(with = "rust_decimal::serde::float")]
    pub amount_fee: Decimal,
}

/// Fault classes written to the error ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Matching deposit without a decodable destination address
    MissingAttachment,
    /// Destination node answered with an error payload, or the address did not resolve
    SendRejected,
    /// Building, signing or broadcasting the payout failed
    TransactionFailed,
}

impl FaultKind {
    /// Text stored in `errors.error`
    pub fn message(&self) -> &'static str {
        match self {
            FaultKind::MissingAttachment => "no attachment found on transaction",
            FaultKind::SendRejected => "tx error, check exception error",
            FaultKind::TransactionFailed => "tx error, possible incorrect address",
        }
    }

    #[cfg(test)]
    pub fn from_message(message: &str) -> Option<Self> {
        [
            FaultKind::MissingAttachment,
            FaultKind::SendRejected,
            FaultKind::TransactionFailed,
        ]
        .into_iter()
        .find(|kind| kind.message() == message)
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::MissingAttachment => "missing_attachment",
            FaultKind::SendRejected => "send_rejected",
            FaultKind::TransactionFailed => "transaction_failed",
        };
        write!(f, "{}", name)
    }
}

/// Diagnostic row in the error ledger. Never consulted for control flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub source_address: String,
    pub destination_address: Option<String>,
    pub destination_tx_id: Option<String>,
    pub source_tx_id: String,
    pub timestamp: DateTime<Utc>,
    /// Deposit amount in source human units
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub kind: FaultKind,
    pub exception: Option<String>,
}

/// What happened to one source transaction during a block pass
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Not a deposit to the gateway in the configured asset
    Unrelated,
    /// Already has an executed row, skipped silently
    AlreadyExecuted,
    Settled(ExecutedTransfer),
    MissingAttachment,
    SendRejected(String),
    TransactionFailed(String),
}

impl TransferOutcome {
    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            TransferOutcome::MissingAttachment => Some(FaultKind::MissingAttachment),
            TransferOutcome::SendRejected(_) => Some(FaultKind::SendRejected),
            TransferOutcome::TransactionFailed(_) => Some(FaultKind::TransactionFailed),
            _ => None,
        }
    }
}

/// Per-block tally
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    pub height: u64,
    pub transactions: usize,
    pub settled: usize,
    pub skipped: usize,
    pub faults: usize,
}

impl BlockReport {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    pub fn tally(&mut self, outcome: &TransferOutcome) {
        self.transactions += 1;
        match outcome {
            TransferOutcome::Settled(_) => self.settled += 1,
            TransferOutcome::AlreadyExecuted => self.skipped += 1,
            TransferOutcome::Unrelated => {}
            _ => self.faults += 1,
        }
    }
}

/// Result of one scan loop tick; the cursor moves only on `Advanced`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing confirmed beyond the cursor, or the node height was unavailable
    Idle,
    Advanced(BlockReport),
    /// Processing the block raised an error, the cursor was rolled back
    IterationAborted { height: u64, error: String },
}
