use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

use crate::adapters::traits::{PayoutRequest, SettlementSubmitter, SubmitResponse};
use crate::config::Config;
use crate::error::{AppError, AppResult, ChainError};
use crate::ledger::models::{
    AssetId, ExecutedTransfer, FaultKind, SourceTransaction, TransferOutcome,
};
use crate::ledger::LedgerRepository;
use crate::settlement::faults::{FaultContext, FaultRecorder};

/// Amount parameters shared by every payout
#[derive(Debug, Clone)]
pub struct PayoutTerms {
    pub source_decimals: u32,
    pub destination_decimals: u32,
    /// Source-asset human units
    pub fee: Decimal,
    /// Destination smallest units
    pub network_fee: u64,
    pub asset: AssetId,
    pub memo: String,
}

impl PayoutTerms {
    pub fn from_config(config: &Config) -> Self {
        Self {
            source_decimals: config.source.decimals,
            destination_decimals: config.destination.decimals,
            fee: config.destination.fee,
            network_fee: config.destination.tx_fee,
            asset: config.destination.asset(),
            memo: config.destination.memo.clone(),
        }
    }

    /// Payout in destination smallest units.
    ///
    /// The fee comes off in source human units before rescaling; the result is
    /// truncated toward zero. May be zero or negative for dust deposits.
    pub fn payout_amount(&self, raw_amount: u64) -> AppResult<i64> {
        let human = Decimal::from_i128_with_scale(i128::from(raw_amount), self.source_decimals);
        let scale = Decimal::from_i128_with_scale(10i128.pow(self.destination_decimals), 0);

        (human - self.fee)
            .checked_mul(scale)
            .and_then(|scaled| scaled.trunc().to_i64())
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Payout for {} does not fit destination precision",
                    raw_amount
                ))
            })
    }
}

/// Computes, submits and records payouts for eligible deposits
pub struct SettlementEngine {
    submitter: Arc<dyn SettlementSubmitter>,
    ledger: Arc<LedgerRepository>,
    faults: Arc<FaultRecorder>,
    terms: PayoutTerms,
    /// Payouts the destination accepted whose executed row is not written yet,
    /// keyed by source tx id. A replayed block writes these instead of paying again.
    unrecorded: Mutex<HashMap<String, ExecutedTransfer>>,
}

impl SettlementEngine {
    pub fn new(
        submitter: Arc<dyn SettlementSubmitter>,
        ledger: Arc<LedgerRepository>,
        faults: Arc<FaultRecorder>,
        terms: PayoutTerms,
    ) -> Self {
        Self {
            submitter,
            ledger,
            faults,
            terms,
            unrecorded: Mutex::new(HashMap::new()),
        }
    }

    async fn fault(
        &self,
        tx: &SourceTransaction,
        kind: FaultKind,
        destination: &str,
        exception: String,
    ) -> AppResult<TransferOutcome> {
        self.faults
            .record(
                tx,
                kind,
                FaultContext {
                    destination_address: Some(destination.to_string()),
                    destination_tx_id: None,
                    exception: Some(exception.clone()),
                },
            )
            .await?;

        Ok(match kind {
            FaultKind::SendRejected => TransferOutcome::SendRejected(exception),
            FaultKind::TransactionFailed => TransferOutcome::TransactionFailed(exception),
            FaultKind::MissingAttachment => TransferOutcome::MissingAttachment,
        })
    }

    /// Write the executed row of a payout broadcast in an earlier, aborted pass
    async fn record_unrecorded(&self, transfer: ExecutedTransfer) -> AppResult<TransferOutcome> {
        let source_tx_id = transfer.source_tx_id.clone();

        if self.ledger.is_executed(&source_tx_id).await? {
            self.unrecorded.lock().await.remove(&source_tx_id);
            return Ok(TransferOutcome::AlreadyExecuted);
        }

        self.ledger.record_executed(&transfer).await?;
        self.unrecorded.lock().await.remove(&source_tx_id);

        info!(
            "Recorded payout {} for {} broadcast in an earlier pass",
            transfer.destination_tx_id, source_tx_id
        );
        Ok(TransferOutcome::Settled(transfer))
    }

    /// Pay out one eligible deposit.
    ///
    /// Faults are recorded and returned as outcomes. An `Err` means the ledger
    /// itself could not be written and the block must be retried.
    #[instrument(skip(self, tx, destination), fields(source_tx = %tx.id, destination = %destination))]
    pub async fn settle(
        &self,
        tx: &SourceTransaction,
        destination: &str,
    ) -> AppResult<TransferOutcome> {
        let pending = self.unrecorded.lock().await.get(&tx.id).cloned();
        if let Some(transfer) = pending {
            return self.record_unrecorded(transfer).await;
        }

        let (amount, units) = match self.terms.payout_amount(tx.amount) {
            Ok(amount) => match u64::try_from(amount) {
                Ok(units) if units > 0 => (amount, units),
                _ => {
                    let reason = format!("amount does not cover fee: payout would be {}", amount);
                    return self.fault(tx, FaultKind::TransactionFailed, destination, reason).await;
                }
            },
            Err(e) => {
                return self.fault(tx, FaultKind::TransactionFailed, destination, e.to_string()).await;
            }
        };

        let recipient = match self.submitter.resolve_address(destination).await {
            Ok(recipient) => recipient,
            Err(e @ AppError::Chain(ChainError::InvalidAddress { .. })) => {
                return self.fault(tx, FaultKind::SendRejected, destination, e.to_string()).await;
            }
            Err(e) => {
                return self.fault(tx, FaultKind::TransactionFailed, destination, e.to_string()).await;
            }
        };

        let payout = PayoutRequest {
            recipient,
            amount: units,
            asset: self.terms.asset.clone(),
            fee: self.terms.network_fee,
            memo: self.terms.memo.clone(),
        };

        let destination_tx_id = match self.submitter.submit(&payout).await {
            Ok(SubmitResponse::Accepted { id }) => id,
            Ok(SubmitResponse::Rejected { message }) => {
                return self.fault(tx, FaultKind::SendRejected, destination, message).await;
            }
            Err(e) => {
                return self.fault(tx, FaultKind::TransactionFailed, destination, e.to_string()).await;
            }
        };

        let transfer = ExecutedTransfer {
            source_address: tx.sender.clone(),
            destination_address: payout.recipient.clone(),
            source_tx_id: tx.id.clone(),
            destination_tx_id: destination_tx_id.clone(),
            timestamp: Utc::now(),
            amount,
            amount_fee: self.terms.fee,
        };

        if let Err(e) = self.ledger.record_executed(&transfer).await {
            error!(
                "Payout {} for {} broadcast but not recorded, will record on retry: {}",
                destination_tx_id, tx.id, e
            );
            self.unrecorded.lock().await.insert(tx.id.clone(), transfer);
            return Err(e);
        }

        info!(
            "Settled {} from {}: {} units to {} on {} ({})",
            tx.id,
            tx.sender,
            amount,
            payout.recipient,
            self.submitter.network(),
            transfer.destination_tx_id
        );
        Ok(TransferOutcome::Settled(transfer))
    }
}
