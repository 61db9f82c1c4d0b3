use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use ledger_core::{
    Address, Balance, Block, BlockSummary, Ed25519Verifier, Ledger, LedgerConfig, LedgerError,
    LedgerStore, MemoryStore, MiningChallenge, SolutionPackage, SystemClock, TxId,
    ValidationResult,
};
use ledger_storage::SledStore;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::task::{self, JoinError};
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, env = "LEDGER_LISTEN", default_value = "127.0.0.1:8080")]
    listen: String,

    /// Data directory for sled
    #[arg(long, env = "LEDGER_DATA_DIR", default_value = "./data")]
    data_dir: String,

    /// Keep the ledger in memory only
    #[arg(long, env = "LEDGER_EPHEMERAL")]
    ephemeral: bool,

    /// Leading zero bits required of a solution hash
    #[arg(long, env = "LEDGER_DIFFICULTY", default_value_t = ledger_core::constants::DEFAULT_DIFFICULTY)]
    difficulty: u32,

    /// Amount paid to the miner of each accepted block
    #[arg(long, env = "LEDGER_MINING_REWARD", default_value_t = ledger_core::constants::DEFAULT_MINING_REWARD)]
    mining_reward: u64,
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Serialize)]
struct BalanceOut {
    address: Address,
    balance: Balance,
    pending_outgoing: u64,
}

#[derive(Serialize)]
struct Admitted {
    id: TxId,
}

/// A signed transfer as a client submits it.
#[derive(Deserialize)]
struct TxIn {
    from: Address,
    to: Address,
    amount: u64,
    timestamp: u64,
    #[serde(with = "hex::serde")]
    signature: Vec<u8>,
}

enum ApiError {
    Ledger(LedgerError),
    Worker(JoinError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Ledger(err) => err,
            ApiError::Worker(err) => {
                warn!(error = %err, "ledger worker failed");
                let body = serde_json::json!({ "error": "internal error", "retryable": true });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };
        let status = match &err {
            LedgerError::InvalidAmount | LedgerError::InvalidSignature => StatusCode::BAD_REQUEST,
            LedgerError::DuplicateTransaction(_) | LedgerError::Rejected(_) => StatusCode::CONFLICT,
            LedgerError::OutOfBounds { .. } => StatusCode::NOT_FOUND,
            LedgerError::StorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = serde_json::json!({
            "error": err.to_string(),
            "retryable": err.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

type Shared<S> = Arc<Ledger<S>>;

/// Ledger calls take locks, flush to disk and hash the whole chain, so they
/// run on the blocking pool rather than a runtime worker.
async fn with_ledger<S, T, F>(ledger: Shared<S>, f: F) -> Result<T, ApiError>
where
    S: LedgerStore + 'static,
    T: Send + 'static,
    F: FnOnce(&Ledger<S>) -> Result<T, LedgerError> + Send + 'static,
{
    task::spawn_blocking(move || f(&ledger))
        .await
        .map_err(ApiError::Worker)?
        .map_err(ApiError::from)
}

fn router<S: LedgerStore + 'static>(ledger: Shared<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/chain/head", get(head::<S>))
        .route("/chain/validate", get(validate::<S>))
        .route("/mining", get(mining_info::<S>))
        .route("/solutions", post(submit_solution::<S>))
        .route("/transactions", post(add_transaction::<S>))
        .route("/balances/{address}", get(balance::<S>))
        .route("/blocks/{index}", get(block::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(ledger)
}

async fn head<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
) -> Result<Json<Head>, ApiError> {
    let head = with_ledger(ledger, |l| Ok(l.head())).await?;
    Ok(Json(Head {
        height: head.index,
        hash: hex::encode(head.hash),
    }))
}

async fn validate<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
) -> Result<Json<ValidationResult>, ApiError> {
    with_ledger(ledger, |l| Ok(l.is_chain_valid())).await.map(Json)
}

async fn mining_info<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
) -> Result<Json<MiningChallenge>, ApiError> {
    with_ledger(ledger, |l| Ok(l.get_mining_info())).await.map(Json)
}

async fn submit_solution<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
    Json(package): Json<SolutionPackage>,
) -> Result<Json<BlockSummary>, ApiError> {
    with_ledger(ledger, move |l| l.submit_solution(package)).await.map(Json)
}

async fn add_transaction<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
    Json(tx): Json<TxIn>,
) -> Result<(StatusCode, Json<Admitted>), ApiError> {
    let id = with_ledger(ledger, move |l| {
        l.add_transfer(tx.from, tx.to, tx.amount, tx.timestamp, tx.signature)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(Admitted { id })))
}

async fn balance<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
    Path(address): Path<String>,
) -> Result<Json<BalanceOut>, ApiError> {
    let address = Address::new(address);
    with_ledger(ledger, move |l| {
        Ok(BalanceOut {
            balance: l.get_balance(&address),
            pending_outgoing: l.pending_outgoing(&address),
            address,
        })
    })
    .await
    .map(Json)
}

async fn block<S: LedgerStore + 'static>(
    State(ledger): State<Shared<S>>,
    Path(index): Path<u64>,
) -> Result<Json<Block>, ApiError> {
    with_ledger(ledger, move |l| l.get_block(index)).await.map(Json)
}

async fn serve<S: LedgerStore + 'static>(
    store: Arc<S>,
    config: LedgerConfig,
    addr: SocketAddr,
) -> anyhow::Result<()> {
    let ledger = Ledger::bootstrap(config, store, Arc::new(Ed25519Verifier), &SystemClock)?;
    match ledger.is_chain_valid() {
        ValidationResult::Valid => info!(blocks = ledger.len(), "chain verified"),
        ValidationResult::Invalid { index, reason } => {
            warn!(index, %reason, "stored chain failed validation")
        }
    }

    let app = router(Arc::new(ledger));
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let addr: SocketAddr = args.listen.parse()?;
    let config = LedgerConfig::default()
        .with_difficulty(args.difficulty)
        .with_mining_reward(args.mining_reward);
    info!(difficulty = config.difficulty, reward = config.mining_reward, "ledger config");

    if args.ephemeral {
        serve(Arc::new(MemoryStore::new()), config, addr).await
    } else {
        serve(Arc::new(SledStore::open(&args.data_dir)?), config, addr).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use ed25519_dalek::{Signer, SigningKey};
    use ledger_core::{pow, signature::address_of, transaction::signing_payload};
    use serde_json::{json, Value};

    const DIFFICULTY: u32 = 4;

    fn server() -> TestServer {
        let config = LedgerConfig::default().with_difficulty(DIFFICULTY);
        let ledger = Ledger::bootstrap(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(Ed25519Verifier),
            &SystemClock,
        )
        .expect("bootstrap");
        TestServer::new(router(Arc::new(ledger))).expect("test server")
    }

    fn signed(seed: u8, to: &Address, amount: u64, timestamp: u64) -> Value {
        let key = SigningKey::from_bytes(&[seed; 32]);
        let from = address_of(&key.verifying_key());
        let signature = key.sign(&signing_payload(&from, to, amount, timestamp));
        json!({
            "from": from,
            "to": to,
            "amount": amount,
            "timestamp": timestamp,
            "signature": hex::encode(signature.to_bytes()),
        })
    }

    #[tokio::test]
    async fn transfer_is_mined_through_the_api() {
        let server = server();
        let alice = address_of(&SigningKey::from_bytes(&[1; 32]).verifying_key());
        let bob = Address::new("b0b");

        let response = server.post("/transactions").json(&signed(1, &bob, 10, 1_000)).await;
        assert_eq!(response.status_code(), StatusCode::CREATED);

        let challenge: MiningChallenge = server.get("/mining").await.json();
        assert_eq!(challenge.transactions.len(), 1);
        assert_eq!(challenge.difficulty, DIFFICULTY);

        let package = pow::solve_package(
            challenge.previous_hash,
            challenge.transactions,
            challenge.difficulty,
            Address::new("miner"),
            2_000,
        );
        let response = server.post("/solutions").json(&package).await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let head: Value = server.get("/chain/head").await.json();
        assert_eq!(head["height"], 1);

        let balance: Value = server.get(&format!("/balances/{bob}")).await.json();
        assert_eq!(balance["balance"], 10);
        let balance: Value = server.get(&format!("/balances/{alice}")).await.json();
        assert_eq!(balance["balance"], -10);
        assert_eq!(balance["pending_outgoing"], 0);

        let audit: Value = server.get("/chain/validate").await.json();
        assert_eq!(audit["status"], "valid");
    }

    #[tokio::test]
    async fn tampered_signature_is_a_bad_request() {
        let server = server();
        let mut body = signed(1, &Address::new("b0b"), 10, 1_000);
        body["amount"] = json!(11);

        let response = server.post("/transactions").json(&body).await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let error: Value = response.json();
        assert_eq!(error["retryable"], false);

        let challenge: MiningChallenge = server.get("/mining").await.json();
        assert!(challenge.transactions.is_empty());
    }

    #[tokio::test]
    async fn resubmitted_transfer_conflicts() {
        let server = server();
        let body = signed(1, &Address::new("b0b"), 10, 1_000);

        let first = server.post("/transactions").json(&body).await;
        assert_eq!(first.status_code(), StatusCode::CREATED);
        let second = server.post("/transactions").json(&body).await;
        assert_eq!(second.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn stale_solution_conflicts() {
        let server = server();
        server.post("/transactions").json(&signed(1, &Address::new("b0b"), 10, 1_000)).await;
        let challenge: MiningChallenge = server.get("/mining").await.json();
        let package = pow::solve_package(
            challenge.previous_hash,
            challenge.transactions,
            challenge.difficulty,
            Address::new("miner"),
            2_000,
        );

        assert_eq!(server.post("/solutions").json(&package).await.status_code(), StatusCode::OK);
        assert_eq!(server.post("/solutions").json(&package).await.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn huge_pending_transfers_do_not_break_the_balance_route() {
        let server = server();
        let bob = Address::new("b0b");
        let alice = address_of(&SigningKey::from_bytes(&[1; 32]).verifying_key());
        for timestamp in [1, 2] {
            let response = server.post("/transactions").json(&signed(1, &bob, u64::MAX, timestamp)).await;
            assert_eq!(response.status_code(), StatusCode::CREATED);
        }

        let response = server.get(&format!("/balances/{alice}")).await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let balance: Value = response.json();
        assert_eq!(balance["pending_outgoing"], u64::MAX);
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let server = server();
        assert_eq!(server.get("/blocks/0").await.status_code(), StatusCode::OK);
        assert_eq!(server.get("/blocks/7").await.status_code(), StatusCode::NOT_FOUND);
    }
}
