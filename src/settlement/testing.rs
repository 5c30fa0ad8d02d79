//! Scripted chain doubles for pipeline tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use sqlx::SqlitePool;

use crate::adapters::traits::{LedgerQueryClient, PayoutRequest, SettlementSubmitter, SubmitResponse};
use crate::error::{AppError, AppResult, ChainError, FetchError};
use crate::ledger::models::{AssetId, SourceTransaction};

pub fn encode_attachment(address: &str) -> String {
    bs58::encode(address.as_bytes()).into_string()
}

/// A deposit matching `config::tests::sample_config`
pub fn deposit(id: &str, amount: u64, destination: &str) -> SourceTransaction {
    SourceTransaction {
        id: id.to_string(),
        tx_type: 4,
        sender: "3PSender".to_string(),
        recipient: Some("3PGateway".to_string()),
        asset_id: AssetId::Issued("SRCASSET".to_string()),
        amount,
        attachment: Some(encode_attachment(destination)),
    }
}

#[derive(Default)]
pub struct MockSource {
    tip: AtomicU64,
    blocks: Mutex<HashMap<u64, Vec<SourceTransaction>>>,
    broken: Mutex<HashSet<u64>>,
    fetched: Mutex<Vec<u64>>,
}

impl MockSource {
    pub fn new(tip: u64) -> Self {
        let source = Self::default();
        source.set_tip(tip);
        source
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn add_block(&self, height: u64, transactions: Vec<SourceTransaction>) {
        self.blocks.lock().unwrap().insert(height, transactions);
    }

    /// Make `block_at(height)` fail until `repair` is called
    pub fn break_block(&self, height: u64) {
        self.broken.lock().unwrap().insert(height);
    }

    pub fn repair(&self, height: u64) {
        self.broken.lock().unwrap().remove(&height);
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerQueryClient for MockSource {
    async fn current_height(&self) -> u64 {
        self.tip.load(Ordering::SeqCst)
    }

    async fn block_at(&self, height: u64) -> AppResult<Vec<SourceTransaction>> {
        self.fetched.lock().unwrap().push(height);

        if self.broken.lock().unwrap().contains(&height) {
            return Err(FetchError::Malformed {
                url: format!("mock://blocks/at/{}", height),
                message: "truncated body".to_string(),
            }
            .into());
        }

        Ok(self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or_default())
    }
}

/// Scripted behaviour of the submitter for a given recipient
#[derive(Debug, Clone)]
pub enum Script {
    Reject(String),
    Fail(String),
    InvalidAddress,
    /// Address validation cannot reach the node
    NodeDown,
}

/// Take the executed table away, as a storage outage would
pub async fn executed_offline(pool: &SqlitePool) {
    sqlx::query("ALTER TABLE executed RENAME TO executed_offline")
        .execute(pool)
        .await
        .unwrap();
}

pub async fn executed_online(pool: &SqlitePool) {
    sqlx::query("ALTER TABLE executed_offline RENAME TO executed")
        .execute(pool)
        .await
        .unwrap();
}

#[derive(Default)]
pub struct MockSubmitter {
    scripts: Mutex<HashMap<String, Script>>,
    submitted: Mutex<Vec<PayoutRequest>>,
    outage: Mutex<Option<(String, SqlitePool)>>,
}

impl MockSubmitter {
    pub fn script(&self, recipient: &str, script: Script) {
        self.scripts.lock().unwrap().insert(recipient.to_string(), script);
    }

    /// Take the executed table offline right after the payout to `recipient` is accepted
    pub fn outage_after(&self, recipient: &str, pool: SqlitePool) {
        *self.outage.lock().unwrap() = Some((recipient.to_string(), pool));
    }

    pub fn submitted(&self) -> Vec<PayoutRequest> {
        self.submitted.lock().unwrap().clone()
    }

    fn scripted(&self, recipient: &str) -> Option<Script> {
        self.scripts.lock().unwrap().get(recipient).cloned()
    }
}

#[async_trait]
impl SettlementSubmitter for MockSubmitter {
    fn network(&self) -> &str {
        "TN"
    }

    async fn resolve_address(&self, address: &str) -> AppResult<String> {
        match self.scripted(address) {
            Some(Script::InvalidAddress) => Err(ChainError::InvalidAddress {
                network: "TN".to_string(),
                address: address.to_string(),
            }
            .into()),
            Some(Script::NodeDown) => Err(FetchError::Unreachable {
                url: format!("mock://addresses/validate/{}", address),
                message: "connection refused".to_string(),
            }
            .into()),
            _ => Ok(address.to_string()),
        }
    }

    async fn submit(&self, payout: &PayoutRequest) -> AppResult<SubmitResponse> {
        match self.scripted(&payout.recipient) {
            Some(Script::Reject(message)) => Ok(SubmitResponse::Rejected { message }),
            Some(Script::Fail(message)) => Err(AppError::Internal(message)),
            _ => {
                let id = {
                    let mut submitted = self.submitted.lock().unwrap();
                    submitted.push(payout.clone());
                    format!("dest-{}", submitted.len())
                };

                let outage = {
                    let mut outage = self.outage.lock().unwrap();
                    match outage.as_ref() {
                        Some((recipient, _)) if *recipient == payout.recipient => outage.take(),
                        _ => None,
                    }
                };
                if let Some((_, pool)) = outage {
                    executed_offline(&pool).await;
                }

                Ok(SubmitResponse::Accepted { id })
            }
        }
    }
}
