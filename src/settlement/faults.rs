use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::error;

use crate::error::AppResult;
use crate::ledger::models::{ErrorRecord, FaultKind, SourceTransaction};
use crate::ledger::LedgerRepository;

/// Writes faults to the error ledger and the log
///
/// Faults are diagnostic only. Nothing reads them back to decide what to do.
pub struct FaultRecorder {
    ledger: Arc<LedgerRepository>,
    source_decimals: u32,
}

/// Optional context attached to a fault row
#[derive(Debug, Default, Clone)]
pub struct FaultContext {
    pub destination_address: Option<String>,
    pub destination_tx_id: Option<String>,
    pub exception: Option<String>,
}

impl FaultRecorder {
    pub fn new(ledger: Arc<LedgerRepository>, source_decimals: u32) -> Self {
        Self {
            ledger,
            source_decimals,
        }
    }

    /// Deposit amount in source human units
    pub fn human_amount(&self, raw_amount: u64) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(raw_amount), self.source_decimals)
    }

    pub async fn record(
        &self,
        tx: &SourceTransaction,
        kind: FaultKind,
        context: FaultContext,
    ) -> AppResult<()> {
        let record = ErrorRecord {
            source_address: tx.sender.clone(),
            destination_address: context.destination_address,
            destination_tx_id: context.destination_tx_id,
            source_tx_id: tx.id.clone(),
            timestamp: Utc::now(),
            amount: self.human_amount(tx.amount),
            kind,
            exception: context.exception,
        };

        error!(
            fault = %kind,
            source_tx = %tx.id,
            detail = record.exception.as_deref().unwrap_or(""),
            "{} on transaction from {} - check errors table",
            kind.message(),
            tx.sender
        );

        self.ledger.record_error(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::models::AssetId;
    use crate::ledger::repository::tests::memory_ledger;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_record_stores_human_amount() {
        let ledger = Arc::new(memory_ledger().await);
        let recorder = FaultRecorder::new(ledger.clone(), 8);
        let tx = SourceTransaction {
            id: "tx1".to_string(),
            tx_type: 4,
            sender: "3PSender".to_string(),
            recipient: Some("3PGateway".to_string()),
            asset_id: AssetId::Native,
            amount: 150_000_000,
            attachment: None,
        };

        recorder
            .record(
                &tx,
                FaultKind::SendRejected,
                FaultContext {
                    destination_address: Some("3JTarget".to_string()),
                    exception: Some("negative balance".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let rows = ledger.errors_for("tx1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, dec!(1.5));
        assert_eq!(rows[0].kind, FaultKind::SendRejected);
        assert_eq!(rows[0].destination_address.as_deref(), Some("3JTarget"));
        assert_eq!(rows[0].exception.as_deref(), Some("negative balance"));
    }
}
