use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::adapters::traits::{PayoutRequest, SettlementSubmitter, SubmitResponse};
use crate::config::DestinationConfig;
use crate::error::{AppError, AppResult, ChainError};
use crate::ledger::models::AssetId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw address layout: version, chain id, 20 byte key hash, 4 byte checksum
const ADDRESS_LENGTH: usize = 26;

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferBody<'a> {
    #[serde(rename = "type")]
    tx_type: u8,
    version: u8,
    sender: &'a str,
    recipient: &'a str,
    amount: u64,
    fee: u64,
    asset_id: Option<&'a str>,
    attachment: String,
}

#[derive(Debug, Deserialize)]
struct NodeReply {
    id: Option<String>,
    error: Option<serde_json::Value>,
    message: Option<String>,
}

/// Submits payouts through the destination node's wallet API
///
/// The node holds the gateway key and signs on our behalf; the API key is the
/// signing credential.
pub struct NodeWalletSubmitter {
    network: String,
    node_url: Url,
    sender: String,
    api_key: String,
    client: Client,
}

impl NodeWalletSubmitter {
    pub fn new(config: &DestinationConfig) -> AppResult<Self> {
        let node_url = Url::parse(config.node.trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("destination.node is not a URL: {}", e)))?;
        if node_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "destination.node cannot be a base URL: {}",
                config.node
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            network: config.network.clone(),
            node_url,
            sender: config.gateway_address.clone(),
            api_key: config.credential()?,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.node_url.clone();
        // Checked in the constructor
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn invalid_address(&self, address: &str) -> AppError {
        ChainError::InvalidAddress {
            network: self.network.clone(),
            address: address.to_string(),
        }
        .into()
    }

    /// Local structural check before asking the node
    fn check_address_format(address: &str) -> bool {
        bs58::decode(address)
            .into_vec()
            .map(|raw| raw.len() == ADDRESS_LENGTH)
            .unwrap_or(false)
    }

    /// Transfer of the native asset when `assetId` is null, of an issued asset otherwise
    fn transfer_body<'a>(&'a self, payout: &'a PayoutRequest) -> TransferBody<'a> {
        TransferBody {
            tx_type: 4,
            version: 2,
            sender: &self.sender,
            recipient: &payout.recipient,
            amount: payout.amount,
            fee: payout.fee,
            asset_id: match &payout.asset {
                AssetId::Native => None,
                AssetId::Issued(id) => Some(id.as_str()),
            },
            attachment: bs58::encode(payout.memo.as_bytes()).into_string(),
        }
    }

    fn interpret_reply(network: &str, status: StatusCode, body: &str) -> AppResult<SubmitResponse> {
        let reply: NodeReply = serde_json::from_str(body).map_err(|_| ChainError::Broadcast {
            network: network.to_string(),
            message: format!("HTTP {}: {}", status, body),
        })?;

        if let Some(error) = reply.error {
            let message = reply.message.unwrap_or_else(|| error.to_string());
            return Ok(SubmitResponse::Rejected { message });
        }

        match reply.id {
            Some(id) if status.is_success() => Ok(SubmitResponse::Accepted { id }),
            _ => Err(ChainError::Broadcast {
                network: network.to_string(),
                message: format!("HTTP {}: {}", status, body),
            }
            .into()),
        }
    }
}

#[async_trait]
impl SettlementSubmitter for NodeWalletSubmitter {
    fn network(&self) -> &str {
        &self.network
    }

    async fn resolve_address(&self, address: &str) -> AppResult<String> {
        let address = address.trim();
        if !Self::check_address_format(address) {
            return Err(self.invalid_address(address));
        }

        let url = self.endpoint(&["addresses", "validate", address]);
        let response = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<ValidateResponse>()
            .await?;

        if !response.valid {
            return Err(self.invalid_address(address));
        }

        Ok(address.to_string())
    }

    async fn submit(&self, payout: &PayoutRequest) -> AppResult<SubmitResponse> {
        let body = self.transfer_body(payout);

        debug!(
            "Submitting {} {} to {} on {}",
            payout.amount, payout.asset, payout.recipient, self.network
        );

        let response = self
            .client
            .post(self.endpoint(&["assets", "transfer"]))
            .header("X-API-Key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let reply = Self::interpret_reply(&self.network, status, &text)?;

        if let SubmitResponse::Accepted { id } = &reply {
            info!("Payout broadcast on {}: {}", self.network, id);
        }

        Ok(reply)
    }
}
