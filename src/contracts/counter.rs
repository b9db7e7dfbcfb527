use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::rpc::TxResponse;
use crate::tx::TxSender;

#[derive(Debug, Serialize)]
pub struct InstantiateMsg {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    Set { x: u64 },
    Increment {},
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    Get {},
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct DataResponse {
    pub x: u64,
}

/// Counter contract client
///
/// The contract stores a single integer: `set` overwrites it, `increment`
/// bumps it by one, `get` reads it back.
pub struct Counter {
    address: String,
}

impl Counter {
    /// Upload the contract bytecode and instantiate it
    ///
    /// # Arguments
    /// * `sender` - The transaction sender paying for the deployment
    /// * `name` - Label for the new instance (also used in progress output)
    /// * `wasm_path` - Path to the compiled contract bytecode
    pub async fn deploy(
        sender: &TxSender,
        name: &str,
        wasm_path: impl AsRef<Path>,
        init_msg: &InstantiateMsg,
    ) -> Result<Self> {
        let code_id = sender.store_code(wasm_path.as_ref()).await?;
        log::info!("{name} uploaded, code_id: {code_id}");

        let address = sender.instantiate(code_id, init_msg, name).await?;
        log::info!("{name} instantiated, address: {address}");

        Ok(Self { address })
    }

    /// Attach to an already-deployed instance
    pub fn at(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Overwrite the stored value
    pub async fn set(&self, sender: &TxSender, x: u64) -> Result<TxResponse> {
        sender.execute(&self.address, &ExecuteMsg::Set { x }).await
    }

    /// Increment the stored value by one
    pub async fn increment(&self, sender: &TxSender) -> Result<TxResponse> {
        sender.execute(&self.address, &ExecuteMsg::Increment {}).await
    }

    /// Read the stored value
    pub async fn get(&self, sender: &TxSender) -> Result<u64> {
        let response: DataResponse = sender
            .lcd()
            .smart_query(&self.address, &QueryMsg::Get {})
            .await?;
        Ok(response.x)
    }
}
