use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use backoff::ExponentialBackoffBuilder;
use cosmrs::cosmwasm::{MsgExecuteContract, MsgInstantiateContract, MsgStoreCode};
use cosmrs::tendermint::chain::Id as ChainId;
use cosmrs::tx::{Body, Fee, Msg, SignDoc, SignerInfo};
use cosmrs::{AccountId, Any, Coin, Denom};
use serde::Serialize;

use crate::rpc::{BaseAccount, LcdClient, TxResponse};
use crate::wallet::Wallet;

/// Gas limit stamped on the throwaway tx used for fee simulation
const SIMULATE_GAS_LIMIT: u64 = 30_000_000;

/// sdk codespace code for an account sequence mismatch; safe to retry
const SEQUENCE_MISMATCH_CODE: u32 = 32;

/// Tuning knobs for fee estimation, inclusion polling, and retries
pub struct TxOptions {
    /// Fee price per gas unit, in `fee_denom`
    pub gas_price: f64,
    /// Multiplier applied to simulated gas before pricing
    pub gas_adjustment: f64,
    pub fee_denom: String,
    /// Delay between inclusion polls after a sync broadcast
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    /// Upper bound on total time spent retrying transient failures
    pub retry_max_elapsed: Duration,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            gas_price: 0.011_330_3,
            gas_adjustment: 1.2,
            fee_denom: "uluna".to_string(),
            poll_interval: Duration::from_secs(1),
            poll_attempts: 30,
            retry_max_elapsed: Duration::from_secs(60),
        }
    }
}

/// Signs and broadcasts transactions for a single wallet on a single chain
pub struct TxSender {
    lcd: LcdClient,
    wallet: Wallet,
    chain_id: ChainId,
    fee_denom: Denom,
    options: TxOptions,
}

impl TxSender {
    pub fn new(lcd: LcdClient, wallet: Wallet, chain_id: &str) -> Result<Self> {
        Self::with_options(lcd, wallet, chain_id, TxOptions::default())
    }

    pub fn with_options(
        lcd: LcdClient,
        wallet: Wallet,
        chain_id: &str,
        options: TxOptions,
    ) -> Result<Self> {
        let chain_id: ChainId = chain_id.parse().context("invalid chain id")?;
        let fee_denom: Denom = options
            .fee_denom
            .parse()
            .map_err(|err| anyhow!("invalid fee denom {:?}: {err}", options.fee_denom))?;

        Ok(Self {
            lcd,
            wallet,
            chain_id,
            fee_denom,
            options,
        })
    }

    pub fn lcd(&self) -> &LcdClient {
        &self.lcd
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Upload contract bytecode, returning the code id assigned by the chain
    ///
    /// Retries transient failures; see [`TxSender::send_messages`].
    pub async fn store_code(&self, wasm_path: &Path) -> Result<u64> {
        let wasm_byte_code = tokio::fs::read(wasm_path)
            .await
            .with_context(|| format!("failed to read {}", wasm_path.display()))?;

        let msg = MsgStoreCode {
            sender: self.wallet.address().clone(),
            wasm_byte_code,
            instantiate_permission: None,
        }
        .to_any()
        .map_err(|err| anyhow!("failed to encode MsgStoreCode: {err}"))?;

        let response = self.send_messages(&[msg]).await?;
        let code_id: u64 = response
            .event_attribute("store_code", "code_id")
            .context("store_code result carries no code_id attribute")?
            .parse()
            .context("code_id attribute is not an integer")?;
        ensure!(code_id > 0, "chain assigned code id 0");
        Ok(code_id)
    }

    /// Instantiate uploaded code, returning the new contract's address
    ///
    /// The sender is set as the contract admin. Retries transient failures.
    pub async fn instantiate<M: Serialize>(
        &self,
        code_id: u64,
        init_msg: &M,
        label: &str,
    ) -> Result<String> {
        let msg = MsgInstantiateContract {
            sender: self.wallet.address().clone(),
            admin: Some(self.wallet.address().clone()),
            code_id,
            label: Some(label.to_string()),
            msg: serde_json::to_vec(init_msg)?,
            funds: vec![],
        }
        .to_any()
        .map_err(|err| anyhow!("failed to encode MsgInstantiateContract: {err}"))?;

        let response = self.send_messages(&[msg]).await?;
        let address = response
            .event_attribute("instantiate", "_contract_address")
            // columbus-era nodes use the older event spelling
            .or_else(|| response.event_attribute("instantiate_contract", "contract_address"))
            .context("instantiate result carries no contract address attribute")?;
        address
            .parse::<AccountId>()
            .map_err(|err| anyhow!("chain returned malformed contract address {address:?}: {err}"))?;
        Ok(address.to_string())
    }

    /// Execute a contract call in a single attempt
    ///
    /// The returned response may carry an error code; callers decide what a
    /// failed execution means for them.
    pub async fn execute<M: Serialize>(&self, contract: &str, msg: &M) -> Result<TxResponse> {
        let contract: AccountId = contract
            .parse()
            .map_err(|err| anyhow!("invalid contract address: {err}"))?;
        let msg = MsgExecuteContract {
            sender: self.wallet.address().clone(),
            contract,
            msg: serde_json::to_vec(msg)?,
            funds: vec![],
        }
        .to_any()
        .map_err(|err| anyhow!("failed to encode MsgExecuteContract: {err}"))?;

        let response = self.try_send(&[msg]).await?;
        if !response.is_success() {
            log_failed_tx(&response);
        }
        Ok(response)
    }

    /// Estimate fees, sign, broadcast, and wait for inclusion, retrying
    /// transient failures with exponential backoff
    ///
    /// Transport and fee-estimation errors are transient, as is an account
    /// sequence mismatch. Any other non-zero result code fails immediately.
    pub async fn send_messages(&self, msgs: &[Any]) -> Result<TxResponse> {
        let strategy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(self.options.retry_max_elapsed))
            .build();

        let op = || async move {
            let response = self
                .try_send(msgs)
                .await
                .map_err(backoff::Error::transient)?;
            if response.is_success() {
                return Ok(response);
            }

            log_failed_tx(&response);
            let error = anyhow!(
                "tx {} failed with code {} ({})",
                response.txhash,
                response.code,
                response.codespace
            );
            if response.code == SEQUENCE_MISMATCH_CODE && response.codespace == "sdk" {
                Err(backoff::Error::transient(error))
            } else {
                Err(backoff::Error::permanent(error))
            }
        };

        backoff::future::retry(strategy, op).await
    }

    /// One estimate + sign + broadcast + poll attempt
    async fn try_send(&self, msgs: &[Any]) -> Result<TxResponse> {
        let account = self.lcd.account(self.wallet.address().as_ref()).await?;
        let fee = self.estimate_fee(msgs, &account).await?;
        let tx_bytes = self.sign_tx(msgs, &account, fee)?;

        let accepted = self.lcd.broadcast_sync(&tx_bytes).await?;
        if !accepted.is_success() {
            // rejected by CheckTx, never entered a block
            return Ok(accepted);
        }
        self.wait_for_inclusion(&accepted.txhash).await
    }

    /// Simulate the transaction and price the consumed gas
    async fn estimate_fee(&self, msgs: &[Any], account: &BaseAccount) -> Result<Fee> {
        let placeholder = Fee::from_amount_and_gas(self.zero_fee_coin(), SIMULATE_GAS_LIMIT);
        let sim_bytes = self.sign_tx(msgs, account, placeholder)?;
        let gas_used = self.lcd.simulate(&sim_bytes).await?;

        let gas_limit = adjusted_gas_limit(gas_used, self.options.gas_adjustment);
        let amount = fee_amount(gas_limit, self.options.gas_price);
        Ok(Fee::from_amount_and_gas(
            Coin {
                denom: self.fee_denom.clone(),
                amount,
            },
            gas_limit,
        ))
    }

    fn sign_tx(&self, msgs: &[Any], account: &BaseAccount, fee: Fee) -> Result<Vec<u8>> {
        let body = Body::new(msgs.to_vec(), "", 0u32);
        let auth_info =
            SignerInfo::single_direct(Some(self.wallet.public_key()), account.sequence)
                .auth_info(fee);
        let sign_doc = SignDoc::new(&body, &auth_info, &self.chain_id, account.account_number)
            .map_err(|err| anyhow!("failed to build sign doc: {err}"))?;
        self.wallet
            .sign(sign_doc)?
            .to_bytes()
            .map_err(|err| anyhow!("failed to encode signed transaction: {err}"))
    }

    async fn wait_for_inclusion(&self, txhash: &str) -> Result<TxResponse> {
        for _ in 0..self.options.poll_attempts {
            tokio::time::sleep(self.options.poll_interval).await;
            if let Some(response) = self.lcd.tx_by_hash(txhash).await? {
                return Ok(response);
            }
        }
        bail!(
            "tx {txhash} was not included after {} polls",
            self.options.poll_attempts
        )
    }

    fn zero_fee_coin(&self) -> Coin {
        Coin {
            denom: self.fee_denom.clone(),
            amount: 0,
        }
    }
}

fn log_failed_tx(response: &TxResponse) {
    log::warn!(
        "failed tx; hash: {}, code: {}, codespace: {}, log: {}",
        response.txhash,
        response.code,
        response.codespace,
        response.raw_log
    );
}

fn adjusted_gas_limit(gas_used: u64, gas_adjustment: f64) -> u64 {
    (gas_used as f64 * gas_adjustment).ceil() as u64
}

fn fee_amount(gas_limit: u64, gas_price: f64) -> u128 {
    (gas_limit as f64 * gas_price).ceil() as u128
}
