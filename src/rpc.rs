use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

/// General-purpose LCD (REST) client for a Cosmos SDK node
pub struct LcdClient {
    http: reqwest::Client,
    base_url: String,
}

impl LcdClient {
    /// Create a new LCD client instance
    ///
    /// # Arguments
    /// * `base_url` - The LCD endpoint URL (e.g., "https://bombay-lcd.terra.dev")
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the on-chain account record for an address
    ///
    /// Account number and sequence are required to build a sign doc.
    pub async fn account(&self, address: &str) -> Result<BaseAccount> {
        let url = format!("{}/cosmos/auth/v1beta1/accounts/{}", self.base_url, address);
        let response: AccountResponse = self
            .get_json(&url)
            .await
            .with_context(|| format!("failed to fetch account {address}"))?;
        Ok(response.account)
    }

    /// Simulate a signed transaction and return the gas it consumed
    pub async fn simulate(&self, tx_bytes: &[u8]) -> Result<u64> {
        let url = format!("{}/cosmos/tx/v1beta1/simulate", self.base_url);
        let body = json!({ "tx_bytes": BASE64.encode(tx_bytes) });
        let response: SimulateResponse = self
            .post_json(&url, &body)
            .await
            .context("transaction simulation failed")?;
        Ok(response.gas_info.gas_used)
    }

    /// Submit a signed transaction in sync mode
    ///
    /// The returned response reflects CheckTx only; the caller must poll
    /// [`LcdClient::tx_by_hash`] to learn the delivery result.
    pub async fn broadcast_sync(&self, tx_bytes: &[u8]) -> Result<TxResponse> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let body = json!({
            "tx_bytes": BASE64.encode(tx_bytes),
            "mode": "BROADCAST_MODE_SYNC",
        });
        let response: BroadcastResponse = self
            .post_json(&url, &body)
            .await
            .context("failed to broadcast transaction")?;
        Ok(response.tx_response)
    }

    /// Look up a transaction by hash, returning `None` while it is still pending
    pub async fn tx_by_hash(&self, hash: &str) -> Result<Option<TxResponse>> {
        let url = format!("{}/cosmos/tx/v1beta1/txs/{}", self.base_url, hash);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to look up tx {hash}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response: BroadcastResponse = Self::decode(response).await?;
        Ok(Some(response.tx_response))
    }

    /// Run a read-only smart query against a contract
    pub async fn smart_query<Q, R>(&self, contract: &str, query: &Q) -> Result<R>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let encoded = BASE64.encode(serde_json::to_vec(query)?);
        let url = format!(
            "{}/cosmwasm/wasm/v1/contract/{}/smart/{}",
            self.base_url, contract, encoded
        );
        let response: SmartQueryResponse<R> = self
            .get_json(&url)
            .await
            .with_context(|| format!("smart query against {contract} failed"))?;
        Ok(response.data)
    }

    async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R> {
        let response = self.http.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post_json<R: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<R> {
        let response = self.http.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("lcd returned {status}: {body}");
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: BaseAccount,
}

/// The subset of the auth account record needed for signing
#[derive(Debug, Deserialize)]
pub struct BaseAccount {
    #[serde(default, deserialize_with = "string_as_u64")]
    pub account_number: u64,
    #[serde(default, deserialize_with = "string_as_u64")]
    pub sequence: u64,
}

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    gas_info: GasInfo,
}

#[derive(Debug, Deserialize)]
struct GasInfo {
    #[serde(default, deserialize_with = "string_as_u64")]
    gas_used: u64,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    tx_response: TxResponse,
}

#[derive(Debug, Deserialize)]
struct SmartQueryResponse<R> {
    data: R,
}

/// Result of a broadcast (or delivered) transaction as reported by the node
///
/// The LCD omits `code` for successful transactions, so serde defaults it
/// to zero.
#[derive(Debug, Clone, Deserialize)]
pub struct TxResponse {
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default)]
    pub logs: Vec<TxLog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxLog {
    #[serde(default)]
    pub events: Vec<TxEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<TxAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxAttribute {
    pub key: String,
    pub value: String,
}

impl TxResponse {
    /// A transaction succeeded iff the node reported no error code
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Find an attribute value in the transaction's event logs
    pub fn event_attribute(&self, event_type: &str, key: &str) -> Option<&str> {
        self.logs
            .iter()
            .flat_map(|log| &log.events)
            .filter(|event| event.kind == event_type)
            .flat_map(|event| &event.attributes)
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value.as_str())
    }
}

fn string_as_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}
