use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::adapters::traits::LedgerQueryClient;
use crate::error::AppResult;
use crate::ledger::models::{BlockReport, SourceTransaction, TickOutcome, TransferOutcome};
use crate::ledger::LedgerRepository;
use crate::settlement::engine::SettlementEngine;
use crate::settlement::filter::{FilterDecision, TransactionFilter};

/// Scan loop settings
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Key of this bridge's row in `heights`
    pub chain: String,
    pub confirmations: u64,
    pub poll_interval: Duration,
}

/// Walks the source chain one confirmed block at a time
///
/// The in-memory cursor is the last fully processed height. It is persisted
/// only after a block ran to completion, so an aborted block is replayed on
/// the next tick and the executed ledger keeps the replay side-effect free.
pub struct Scanner {
    source: Arc<dyn LedgerQueryClient>,
    filter: TransactionFilter,
    engine: SettlementEngine,
    ledger: Arc<LedgerRepository>,
    config: ScanConfig,
    cursor: u64,
}

impl Scanner {
    pub fn new(
        source: Arc<dyn LedgerQueryClient>,
        filter: TransactionFilter,
        engine: SettlementEngine,
        ledger: Arc<LedgerRepository>,
        config: ScanConfig,
        cursor: u64,
    ) -> Self {
        Self {
            source,
            filter,
            engine,
            ledger,
            config,
            cursor,
        }
    }

    #[cfg(test)]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Run forever. There is no exit path; the process is stopped by a signal.
    pub async fn run(mut self) {
        info!(
            "Started checking {} blocks at {}",
            self.config.chain, self.cursor
        );

        loop {
            self.tick().await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One poll: process at most one confirmed block
    pub async fn tick(&mut self) -> TickOutcome {
        let tip = self.source.current_height().await;
        if tip == 0 {
            return TickOutcome::Idle;
        }

        let target = tip.saturating_sub(self.config.confirmations);
        if target <= self.cursor {
            return TickOutcome::Idle;
        }

        let height = self.cursor + 1;
        self.cursor = height;

        match self.advance(height).await {
            Ok(report) => TickOutcome::Advanced(report),
            Err(e) => {
                self.cursor = height - 1;
                error!(
                    "Something went wrong during {} block iteration at {}: {}",
                    self.config.chain, height, e
                );
                TickOutcome::IterationAborted {
                    height,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn advance(&self, height: u64) -> AppResult<BlockReport> {
        let report = self.process_block(height).await?;
        self.ledger.store_height(&self.config.chain, height).await?;

        if report.settled > 0 || report.faults > 0 {
            info!(
                "Block {} done: {} settled, {} skipped, {} faults",
                height, report.settled, report.skipped, report.faults
            );
        }
        Ok(report)
    }

    #[instrument(skip(self), fields(chain = %self.config.chain))]
    async fn process_block(&self, height: u64) -> AppResult<BlockReport> {
        let transactions = self.source.block_at(height).await?;
        let mut report = BlockReport::new(height);

        for tx in &transactions {
            let outcome = self.process_transaction(tx).await?;
            if let Some(kind) = outcome.fault_kind() {
                warn!("Transaction {} in block {} ended in {}", tx.id, height, kind);
            }
            report.tally(&outcome);
        }

        Ok(report)
    }

    async fn process_transaction(&self, tx: &SourceTransaction) -> AppResult<TransferOutcome> {
        match self.filter.check(tx).await? {
            FilterDecision::Skip(outcome) => Ok(outcome),
            FilterDecision::Eligible { destination } => self.engine.settle(tx, &destination).await,
        }
    }
}
