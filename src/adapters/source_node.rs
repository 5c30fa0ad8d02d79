use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::traits::LedgerQueryClient;
use crate::error::{AppResult, FetchError};
use crate::ledger::models::SourceTransaction;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    transactions: Vec<SourceTransaction>,
}

/// REST client for the source chain node
pub struct SourceNodeClient {
    node_url: String,
    client: Client,
}

impl SourceNodeClient {
    pub fn new(node_url: &str) -> AppResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            node_url: node_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn fetch_height(&self) -> AppResult<u64> {
        let url = format!("{}/blocks/height", self.node_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<HeightResponse>()
            .await?;

        Ok(response.height)
    }

    fn parse_block(url: &str, body: &str) -> AppResult<Vec<SourceTransaction>> {
        let block: BlockResponse = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(block.transactions)
    }
}

#[async_trait]
impl LedgerQueryClient for SourceNodeClient {
    async fn current_height(&self) -> u64 {
        match self.fetch_height().await {
            // The tip itself may still change
            Ok(height) => height.saturating_sub(1),
            Err(e) => {
                warn!("Failed to query source height: {}", e);
                0
            }
        }
    }

    async fn block_at(&self, height: u64) -> AppResult<Vec<SourceTransaction>> {
        let url = format!("{}/blocks/at/{}", self.node_url, height);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let transactions = Self::parse_block(&url, &body)?;
        debug!("Block {} carries {} transactions", height, transactions.len());
        Ok(transactions)
    }
}
