//! Careline - a terminal client for the patient care platform.
//!
//! Signs in against the member portal, opens care requests, and exchanges
//! messages with the care team. `careline demo` runs the same flows against
//! an in-process mock backend.

mod commands;
mod prompt;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use careline_core::auth::NoBiometrics;
use careline_core::clock::SystemClock;
use careline_core::config::{CredentialBackend, ENV_VAULT_PASSPHRASE};
use careline_core::store::{EncryptedFileStore, KeyringStore, SecretStore};
use careline_core::{CareContext, CareError, Config, HttpBackend};

/// Log file name prefix in the cache directory
const LOG_FILE_PREFIX: &str = "careline.log";

const USAGE: &str = "\
Usage: careline <command> [args]

Commands:
  login                     Sign in with email and password
  signup                    Create an account and sign in
  logout                    Sign out and forget the platform token
  status                    Show session and token state
  requests                  List care requests
  new-request <type>        Open a care request (checkup, sick, injury, ...)
  messages <request-id>     Show a care request's messages
  send <request-id> <text>  Send a message
  activities                List question sets and referrals
  complete <question-set>   Mark a question set completed
  read-referral <id>        Mark a referral message read
  biometric-enable          Enroll biometric login with a PIN
  biometric-disable         Remove biometric enrollment
  pin-login                 Sign in with the enrolled PIN
  demo                      Run every flow against the mock backend
";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and to a daily file in the cache directory. The
/// returned guard flushes the file writer and must be held until exit.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Open the credential store the config selects.
fn open_store(config: &Config) -> Result<Arc<dyn SecretStore>> {
    match config.credential_backend {
        CredentialBackend::Keyring => Ok(Arc::new(KeyringStore::new())),
        CredentialBackend::File => {
            let passphrase = match std::env::var(ENV_VAULT_PASSPHRASE) {
                Ok(value) if !value.is_empty() => value,
                _ => prompt::secret("Vault passphrase: ")?,
            };
            let path = config.vault_path()?;
            let store = EncryptedFileStore::open(&path, &passphrase)
                .with_context(|| format!("Failed to open credential vault {}", path.display()))?;
            Ok(Arc::new(store))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load().context("Failed to load config")?;
    let log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "help" | "-h" | "--help") {
        print!("{}", USAGE);
        return Ok(());
    }
    if command == "demo" {
        return commands::demo().await;
    }

    info!(command, "careline starting");

    let backend = Arc::new(HttpBackend::from_config(&config).context("Failed to build HTTP client")?);
    let ctx = CareContext::new(
        backend,
        open_store(&config)?,
        Arc::new(NoBiometrics),
        Arc::new(SystemClock),
    );

    if let Err(e) = commands::run(&ctx, &mut config, command, &args[1..]).await {
        match e.downcast_ref::<CareError>() {
            Some(care) => {
                eprintln!("Error: {}", care.user_message());
                if care.is_retryable() {
                    eprintln!("This may be temporary - try again shortly.");
                }
            }
            None => eprintln!("Error: {:#}", e),
        }
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}
