use std::sync::Arc;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::AppResult;
use crate::ledger::models::{AssetId, FaultKind, SourceTransaction, TransferOutcome};
use crate::ledger::LedgerRepository;
use crate::settlement::faults::{FaultContext, FaultRecorder};

/// Structural classification of a source transaction, no storage involved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not a transfer to the gateway in the bridged asset
    Unrelated,
    /// Deposit to the gateway with no usable destination address
    MissingAttachment,
    Deposit { destination: String },
}

/// Result of running a transaction through the filter
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Eligible { destination: String },
    /// Not settled this pass; the outcome says why
    Skip(TransferOutcome),
}

/// Decides which source transactions are deposits that still need a payout
pub struct TransactionFilter {
    transfer_type: u8,
    gateway_address: String,
    asset: AssetId,
    ledger: Arc<LedgerRepository>,
    faults: Arc<FaultRecorder>,
}

impl TransactionFilter {
    pub fn new(
        source: &SourceConfig,
        ledger: Arc<LedgerRepository>,
        faults: Arc<FaultRecorder>,
    ) -> Self {
        Self {
            transfer_type: source.transfer_type,
            gateway_address: source.gateway_address.clone(),
            asset: source.asset(),
            ledger,
            faults,
        }
    }

    /// Decode a base58 attachment into a destination address.
    /// Anything undecodable, non UTF-8, or shorter than two characters is no address.
    pub fn decode_attachment(attachment: Option<&str>) -> Option<String> {
        let raw = bs58::decode(attachment?).into_vec().ok()?;
        let decoded = String::from_utf8(raw).ok()?;

        if decoded.chars().count() > 1 {
            Some(decoded)
        } else {
            None
        }
    }

    pub fn classify(&self, tx: &SourceTransaction) -> Classification {
        let is_deposit = tx.tx_type == self.transfer_type
            && tx.recipient.as_deref() == Some(self.gateway_address.as_str())
            && tx.asset_id == self.asset;

        if !is_deposit {
            return Classification::Unrelated;
        }

        match Self::decode_attachment(tx.attachment.as_deref()) {
            Some(destination) => Classification::Deposit { destination },
            None => Classification::MissingAttachment,
        }
    }

    /// Full eligibility check: classification plus the executed-ledger lookup.
    /// A missing attachment is written to the error ledger here.
    pub async fn check(&self, tx: &SourceTransaction) -> AppResult<FilterDecision> {
        match self.classify(tx) {
            Classification::Unrelated => Ok(FilterDecision::Skip(TransferOutcome::Unrelated)),
            Classification::MissingAttachment => {
                self.faults
                    .record(tx, FaultKind::MissingAttachment, FaultContext::default())
                    .await?;
                Ok(FilterDecision::Skip(TransferOutcome::MissingAttachment))
            }
            Classification::Deposit { destination } => {
                if self.ledger.is_executed(&tx.id).await? {
                    debug!("Transaction {} already settled, skipping", tx.id);
                    return Ok(FilterDecision::Skip(TransferOutcome::AlreadyExecuted));
                }
                Ok(FilterDecision::Eligible { destination })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::ledger::models::ExecutedTransfer;
    use crate::ledger::repository::tests::memory_ledger;
    use crate::settlement::testing::{deposit, encode_attachment};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn filter() -> (TransactionFilter, Arc<LedgerRepository>) {
        let config = sample_config();
        let ledger = Arc::new(memory_ledger().await);
        let faults = Arc::new(FaultRecorder::new(ledger.clone(), config.source.decimals));
        (TransactionFilter::new(&config.source, ledger.clone(), faults), ledger)
    }

    #[test]
    fn test_decode_attachment() {
        assert_eq!(
            TransactionFilter::decode_attachment(Some(&encode_attachment("3JTarget"))),
            Some("3JTarget".to_string())
        );
        assert_eq!(TransactionFilter::decode_attachment(None), None);
        assert_eq!(TransactionFilter::decode_attachment(Some("")), None);
        // One character is not an address
        assert_eq!(TransactionFilter::decode_attachment(Some(&encode_attachment("x"))), None);
        // Not base58
        assert_eq!(TransactionFilter::decode_attachment(Some("0OIl")), None);
        // Valid base58, invalid UTF-8
        let bytes = bs58::encode([0xffu8, 0xfe, 0xfd]).into_string();
        assert_eq!(TransactionFilter::decode_attachment(Some(&bytes)), None);
    }

    #[tokio::test]
    async fn test_classify_unrelated_traffic() {
        let (filter, _) = filter().await;

        let mut wrong_type = deposit("tx1", 100, "3JTarget");
        wrong_type.tx_type = 11;
        assert_eq!(filter.classify(&wrong_type), Classification::Unrelated);

        let mut wrong_recipient = deposit("tx2", 100, "3JTarget");
        wrong_recipient.recipient = Some("3PSomeoneElse".to_string());
        assert_eq!(filter.classify(&wrong_recipient), Classification::Unrelated);

        let mut wrong_asset = deposit("tx3", 100, "3JTarget");
        wrong_asset.asset_id = AssetId::Native;
        assert_eq!(filter.classify(&wrong_asset), Classification::Unrelated);

        let mut no_recipient = deposit("tx4", 100, "3JTarget");
        no_recipient.recipient = None;
        assert_eq!(filter.classify(&no_recipient), Classification::Unrelated);
    }

    #[tokio::test]
    async fn test_check_records_missing_attachment() {
        let (filter, ledger) = filter().await;
        let mut tx = deposit("tx1", 100_000_000, "3JTarget");
        tx.attachment = Some(String::new());

        let decision = filter.check(&tx).await.unwrap();
        assert_eq!(decision, FilterDecision::Skip(TransferOutcome::MissingAttachment));

        let errors = ledger.errors_for("tx1").await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, FaultKind::MissingAttachment);
        assert_eq!(errors[0].destination_address, None);
        assert_eq!(ledger.count_executed().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_skips_executed_silently() {
        let (filter, ledger) = filter().await;
        let tx = deposit("tx1", 100_000_000, "3JTarget");

        assert_eq!(
            filter.check(&tx).await.unwrap(),
            FilterDecision::Eligible {
                destination: "3JTarget".to_string()
            }
        );

        ledger
            .record_executed(&ExecutedTransfer {
                source_address: tx.sender.clone(),
                destination_address: "3JTarget".to_string(),
                source_tx_id: tx.id.clone(),
                destination_tx_id: "dest".to_string(),
                timestamp: Utc::now(),
                amount: 999_000,
                amount_fee: dec!(0.001),
            })
            .await
            .unwrap();

        assert_eq!(
            filter.check(&tx).await.unwrap(),
            FilterDecision::Skip(TransferOutcome::AlreadyExecuted)
        );
        assert_eq!(ledger.count_errors().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_is_not_a_fault() {
        let (filter, ledger) = filter().await;
        let mut tx = deposit("tx1", 100, "3JTarget");
        tx.recipient = Some("3PSomeoneElse".to_string());
        tx.attachment = None;

        assert_eq!(
            filter.check(&tx).await.unwrap(),
            FilterDecision::Skip(TransferOutcome::Unrelated)
        );
        assert_eq!(ledger.count_errors().await.unwrap(), 0);
    }
}
