//! End-to-end deploy/execute/query flow against an in-process mock LCD node.
//!
//! The mock decodes the signed transactions it receives and keeps real
//! counter state, so these tests exercise the whole pipeline: fee
//! simulation, signing, broadcast, inclusion polling, event extraction,
//! and smart queries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use cosmrs::cosmwasm::{MsgExecuteContract, MsgInstantiateContract, MsgStoreCode};
use cosmrs::tx::{Msg, Tx};
use cosmrs::AccountId;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use counter_deploy::contracts::counter::{Counter, InstantiateMsg};
use counter_deploy::rpc::LcdClient;
use counter_deploy::tx::{TxOptions, TxSender};
use counter_deploy::wallet::Wallet;

const TEST_MNEMONIC: &str = "hundred student mail february buyer found print keep pond \
    all gym win unique latin pipe ski hurry ivory heart run inquiry among arrange thumb";

#[derive(Default)]
struct ChainState {
    sequence: u64,
    codes: u64,
    contracts: HashMap<String, u64>,
    included: HashMap<String, Value>,
    next_hash: u64,
    // failure injection
    fail_simulates: u32,
    fail_broadcasts: u32,
    reject_code: Option<u32>,
    // call counters
    simulate_calls: u32,
    broadcast_calls: u32,
}

type Shared = Arc<Mutex<ChainState>>;

fn contract_address(index: u64) -> String {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&index.to_be_bytes());
    AccountId::new("terra", &bytes).unwrap().to_string()
}

async fn account(State(chain): State<Shared>, Path(address): Path<String>) -> Json<Value> {
    let chain = chain.lock().await;
    Json(json!({
        "account": {
            "@type": "/cosmos.auth.v1beta1.BaseAccount",
            "address": address,
            "account_number": "1",
            "sequence": chain.sequence.to_string(),
        }
    }))
}

async fn simulate(State(chain): State<Shared>) -> Response {
    let mut chain = chain.lock().await;
    chain.simulate_calls += 1;
    if chain.fail_simulates > 0 {
        chain.fail_simulates -= 1;
        return (StatusCode::INTERNAL_SERVER_ERROR, "simulated outage").into_response();
    }
    Json(json!({
        "gas_info": { "gas_wanted": "30000000", "gas_used": "200000" }
    }))
    .into_response()
}

async fn broadcast(State(chain): State<Shared>, Json(request): Json<Value>) -> Response {
    let mut chain = chain.lock().await;
    chain.broadcast_calls += 1;
    if chain.fail_broadcasts > 0 {
        chain.fail_broadcasts -= 1;
        return (StatusCode::INTERNAL_SERVER_ERROR, "simulated outage").into_response();
    }

    chain.next_hash += 1;
    let txhash = format!("{:064X}", chain.next_hash);

    if let Some(code) = chain.reject_code {
        // CheckTx rejection; the tx never reaches a block
        return Json(json!({
            "tx_response": {
                "txhash": txhash,
                "code": code,
                "codespace": "wasm",
                "raw_log": "simulated rejection",
            }
        }))
        .into_response();
    }

    let tx_bytes = BASE64
        .decode(request["tx_bytes"].as_str().unwrap())
        .unwrap();
    let tx = Tx::from_bytes(&tx_bytes).unwrap();
    let msg = &tx.body.messages[0];

    let events = if let Ok(store) = MsgStoreCode::from_any(msg) {
        assert!(!store.wasm_byte_code.is_empty());
        chain.codes += 1;
        json!([{
            "type": "store_code",
            "attributes": [{ "key": "code_id", "value": chain.codes.to_string() }]
        }])
    } else if MsgInstantiateContract::from_any(msg).is_ok() {
        let address = contract_address(chain.contracts.len() as u64 + 1);
        chain.contracts.insert(address.clone(), 0);
        json!([{
            "type": "instantiate",
            "attributes": [{ "key": "_contract_address", "value": address }]
        }])
    } else if let Ok(execute) = MsgExecuteContract::from_any(msg) {
        let call: Value = serde_json::from_slice(&execute.msg).unwrap();
        let address = execute.contract.to_string();
        let x = chain.contracts.get_mut(&address).unwrap();
        if let Some(set) = call.get("set") {
            *x = set["x"].as_u64().unwrap();
        } else if call.get("increment").is_some() {
            *x += 1;
        } else {
            panic!("unexpected execute payload: {call}");
        }
        json!([{
            "type": "wasm",
            "attributes": [{ "key": "_contract_address", "value": address }]
        }])
    } else {
        return (StatusCode::BAD_REQUEST, "unsupported message").into_response();
    };

    chain.sequence += 1;
    let delivered = json!({
        "txhash": txhash,
        "height": "7",
        "raw_log": "[]",
        "logs": [{ "msg_index": 0, "events": events }],
    });
    chain.included.insert(txhash.clone(), delivered);

    Json(json!({ "tx_response": { "txhash": txhash, "raw_log": "[]" } })).into_response()
}

async fn tx_by_hash(State(chain): State<Shared>, Path(hash): Path<String>) -> Response {
    let chain = chain.lock().await;
    match chain.included.get(&hash) {
        Some(response) => Json(json!({ "tx_response": response })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": 5, "message": "tx not found" })),
        )
            .into_response(),
    }
}

async fn smart_query(
    State(chain): State<Shared>,
    Path((address, query)): Path<(String, String)>,
) -> Response {
    let chain = chain.lock().await;
    let query: Value = serde_json::from_slice(&BASE64.decode(query).unwrap()).unwrap();
    assert!(query.get("get").is_some(), "unexpected query: {query}");
    match chain.contracts.get(&address) {
        Some(x) => Json(json!({ "data": { "x": x } })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "code": 5, "message": "contract not found" })),
        )
            .into_response(),
    }
}

async fn spawn_mock(chain: Shared) -> String {
    let app = Router::new()
        .route("/cosmos/auth/v1beta1/accounts/:address", get(account))
        .route("/cosmos/tx/v1beta1/simulate", post(simulate))
        .route("/cosmos/tx/v1beta1/txs", post(broadcast))
        .route("/cosmos/tx/v1beta1/txs/:hash", get(tx_by_hash))
        .route(
            "/cosmwasm/wasm/v1/contract/:address/smart/:query",
            get(smart_query),
        )
        .with_state(chain);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn test_sender(base_url: &str) -> TxSender {
    let wallet = Wallet::from_mnemonic(TEST_MNEMONIC).unwrap();
    let options = TxOptions {
        poll_interval: Duration::from_millis(10),
        poll_attempts: 50,
        retry_max_elapsed: Duration::from_secs(10),
        ..Default::default()
    };
    TxSender::with_options(LcdClient::new(base_url), wallet, "localterra-1", options).unwrap()
}

fn test_wasm(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("counter-deploy-{name}.wasm"));
    std::fs::write(&path, b"\0asm mock counter bytecode").unwrap();
    path
}

#[tokio::test]
async fn upload_returns_positive_code_id() {
    let chain = Shared::default();
    let url = spawn_mock(chain.clone()).await;
    let sender = test_sender(&url);

    let code_id = sender.store_code(&test_wasm("upload")).await.unwrap();
    assert!(code_id > 0);
    assert_eq!(code_id, 1);
}

#[tokio::test]
async fn deploy_set_increment_get_roundtrip() {
    let chain = Shared::default();
    let url = spawn_mock(chain.clone()).await;
    let sender = test_sender(&url);

    let counter = Counter::deploy(
        &sender,
        "testcontract1",
        test_wasm("roundtrip"),
        &InstantiateMsg {},
    )
    .await
    .unwrap();
    assert!(counter.address().starts_with("terra1"));
    counter.address().parse::<AccountId>().unwrap();

    let result = counter.set(&sender, 10).await.unwrap();
    assert!(result.is_success());
    assert_eq!(counter.get(&sender).await.unwrap(), 10);

    let result = counter.increment(&sender).await.unwrap();
    assert!(result.is_success());
    assert_eq!(counter.get(&sender).await.unwrap(), 11);
}

#[tokio::test]
async fn rejected_upload_fails_without_retries() {
    let chain = Shared::default();
    chain.lock().await.reject_code = Some(4);
    let url = spawn_mock(chain.clone()).await;
    let sender = test_sender(&url);

    let error = sender.store_code(&test_wasm("rejected")).await.unwrap_err();
    assert!(error.to_string().contains("code 4"), "unexpected error: {error}");
    // a deterministic rejection must not be retried
    assert_eq!(chain.lock().await.broadcast_calls, 1);
}

#[tokio::test]
async fn failed_execute_is_classified_as_failed() {
    let chain = Shared::default();
    let url = spawn_mock(chain.clone()).await;
    let sender = test_sender(&url);

    let counter = Counter::deploy(
        &sender,
        "testcontract1",
        test_wasm("failed-execute"),
        &InstantiateMsg {},
    )
    .await
    .unwrap();

    chain.lock().await.reject_code = Some(11);
    let result = counter.set(&sender, 10).await.unwrap();
    assert!(!result.is_success());
    assert_eq!(result.code, 11);

    // the failed call never touched contract state
    chain.lock().await.reject_code = None;
    assert_eq!(counter.get(&sender).await.unwrap(), 0);
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let chain = Shared::default();
    {
        let mut chain = chain.lock().await;
        chain.fail_simulates = 1;
        chain.fail_broadcasts = 1;
    }
    let url = spawn_mock(chain.clone()).await;
    let sender = test_sender(&url);

    let code_id = sender.store_code(&test_wasm("retry")).await.unwrap();
    assert_eq!(code_id, 1);

    let chain = chain.lock().await;
    // attempt 1 dies in simulation, attempt 2 in broadcast, attempt 3 lands
    assert_eq!(chain.simulate_calls, 3);
    assert_eq!(chain.broadcast_calls, 2);
}
