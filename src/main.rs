use checkout_engine::application::actions::PAYLOAD_DETAILS_KEY;
use checkout_engine::application::actions::generic::DefaultDelegateProvider;
use checkout_engine::application::saved_state::{ActionStateRepository, PaymentDataRepository};
use checkout_engine::application::status_repository::StatusRepository;
use checkout_engine::config::CheckoutConfig;
use checkout_engine::domain::action::Action;
use checkout_engine::domain::payment::ActionComponentData;
use checkout_engine::domain::ports::StateStoreRef;
use checkout_engine::error::CheckoutError;
use checkout_engine::infrastructure::http::HttpCheckoutApi;
use checkout_engine::infrastructure::in_memory::{InMemoryStateStore, ScopedStateStore};
use checkout_engine::infrastructure::redirect::parse_redirect_result;
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use miette::{IntoDiagnostic, Result, miette};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const CLI_SCOPE: &str = "cli";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode an action JSON file and report the delegate that handles it
    DecodeAction {
        /// File holding the action as returned by /payments
        file: PathBuf,
    },
    /// Extract the details payload from a return URL
    RedirectResult { url: String },
    /// Poll the payment status until it reaches a terminal result code
    Poll {
        /// Payment data to poll. Defaults to the one saved by `decode-action`.
        payment_data: Option<String>,

        #[arg(long, env = "CHECKOUT_BASE_URL")]
        base_url: Option<String>,

        #[arg(long, env = "CHECKOUT_CLIENT_KEY")]
        client_key: Option<String>,

        /// Give up after this many seconds
        #[arg(long)]
        max_duration_secs: Option<u64>,
    },
    /// Print the action and payment data saved in the store
    SavedState,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.db_path)?;

    match cli.command {
        Command::DecodeAction { file } => decode_action(store, file).await,
        Command::RedirectResult { url } => {
            let details = parse_redirect_result(&url).into_diagnostic()?;
            println!("{}", serde_json::Value::Object(details));
            Ok(())
        }
        Command::Poll {
            payment_data,
            base_url,
            client_key,
            max_duration_secs,
        } => {
            let mut config = CheckoutConfig::from_env().into_diagnostic()?;
            if let Some(base_url) = base_url {
                config.base_url = base_url;
            }
            if let Some(client_key) = client_key {
                config.client_key = client_key;
            }
            if let Some(secs) = max_duration_secs {
                config.max_polling_duration = Duration::from_secs(secs);
            }
            poll(store, config, payment_data).await
        }
        Command::SavedState => {
            let action = ActionStateRepository::new(store.clone())
                .action()
                .await
                .into_diagnostic()?;
            let payment_data = PaymentDataRepository::new(store)
                .payment_data()
                .await
                .into_diagnostic()?;
            println!(
                "{}",
                json!({ "action": action, "paymentData": payment_data })
            );
            Ok(())
        }
    }
}

fn open_store(db_path: Option<PathBuf>) -> Result<StateStoreRef> {
    let store: StateStoreRef = match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(db_path) => {
            use checkout_engine::infrastructure::rocksdb::RocksDBStateStore;
            Arc::new(RocksDBStateStore::open(db_path).into_diagnostic()?)
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            return Err(miette!(
                "--db-path requires a build with the storage-rocksdb feature"
            ));
        }
        None => Arc::new(InMemoryStateStore::new()),
    };
    Ok(Arc::new(ScopedStateStore::new(store, CLI_SCOPE)))
}

async fn decode_action(store: StateStoreRef, file: PathBuf) -> Result<()> {
    let json = tokio::fs::read_to_string(&file).await.into_diagnostic()?;
    let action = Action::parse(&json).into_diagnostic()?;
    let delegate = DefaultDelegateProvider
        .delegate_name(&action)
        .ok_or_else(|| miette!("Unsupported action: {}", action.type_name()))?;

    ActionStateRepository::new(store.clone())
        .set_action(&action)
        .await
        .into_diagnostic()?;
    PaymentDataRepository::new(store)
        .set_payment_data(action.payment_data())
        .await
        .into_diagnostic()?;
    debug!(file = %file.display(), "Saved decoded action");

    println!("type: {}", action.type_name());
    println!("delegate: {delegate}");
    if let Some(payment_method_type) = action.payment_method_type() {
        println!("paymentMethodType: {payment_method_type}");
    }
    if let Some(payment_data) = action.payment_data() {
        println!("paymentData: {payment_data}");
    }
    Ok(())
}

async fn poll(
    store: StateStoreRef,
    config: CheckoutConfig,
    payment_data: Option<String>,
) -> Result<()> {
    let payment_data_repository = PaymentDataRepository::new(store);
    let payment_data = match payment_data {
        Some(pd) => pd,
        None => payment_data_repository
            .payment_data()
            .await
            .into_diagnostic()?
            .ok_or_else(|| miette!("No payment data to poll"))?,
    };
    payment_data_repository
        .set_payment_data(Some(&payment_data))
        .await
        .into_diagnostic()?;

    let api = HttpCheckoutApi::try_new(config.base_url().into_diagnostic()?, &config.client_key)
        .into_diagnostic()?;
    let status = StatusRepository::with_interval(Arc::new(api), config.polling_interval);
    info!(max_duration = ?config.max_polling_duration, "Polling payment status");

    let mut stream = status.poll(payment_data.clone(), config.max_polling_duration);
    while let Some(result) = stream.next().await {
        let response = result.into_diagnostic()?;
        println!("status: {}", response.result_code);
        if !response.is_final() {
            continue;
        }

        payment_data_repository
            .set_payment_data(None)
            .await
            .into_diagnostic()?;
        let payload = response.non_empty_payload().ok_or_else(|| {
            miette!("Payment was not completed. - {}", response.result_code)
        })?;
        let data = ActionComponentData::new(json!({ PAYLOAD_DETAILS_KEY: payload }), None);
        println!("{}", serde_json::to_string(&data).into_diagnostic()?);
        return Ok(());
    }

    Err(CheckoutError::PollingTimeout(config.max_polling_duration)).into_diagnostic()
}
