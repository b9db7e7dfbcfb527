use std::env;

use anyhow::{Context, Result};
use counter_deploy::contracts::counter::{Counter, InstantiateMsg};
use counter_deploy::rpc::LcdClient;
use counter_deploy::tx::TxSender;
use counter_deploy::wallet::Wallet;

// Testnet configuration
const TESTNET_LCD: &str = "https://bombay-lcd.terra.dev";
const TESTNET_CHAIN_ID: &str = "bombay-12";
const COUNTER_WASM: &str = "contract.wasm";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    println!("=== Counter Deploy - {TESTNET_CHAIN_ID} ===\n");

    let mnemonic = env::var("MNEMONIC")
        .context("MNEMONIC is not set; export it or put it in a .env file")?;
    let wallet = Wallet::from_mnemonic(&mnemonic)?;
    println!("Deploying from {}\n", wallet.address());

    let lcd = LcdClient::new(TESTNET_LCD);
    let sender = TxSender::new(lcd, wallet, TESTNET_CHAIN_ID)?;

    let counter = Counter::deploy(&sender, "testcontract1", COUNTER_WASM, &InstantiateMsg {}).await?;
    println!("✓ Counter deployed at {}\n", counter.address());

    let result = counter.set(&sender, 10).await?;
    if result.is_success() {
        println!("✓ Successfully set x to 10");
    }

    let result = counter.increment(&sender).await?;
    if result.is_success() {
        println!("✓ Successfully incremented x");
    }

    let x = counter.get(&sender).await?;
    println!("\n=== Current state ===");
    println!("x = {x}");

    Ok(())
}
