use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use session_auth::config::{HEALTH_PATH, PROFILE_PATH};
use session_auth::{
    AuthError, FileStore, HttpTransport, LogoutChannel, SessionConfig, SessionManager, SignInRequest,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "session", about = "Session authentication CLI")]
struct Cli {
    /// Overrides `SESSION_API_BASE_URL`.
    #[arg(long)]
    base_url: Option<String>,

    #[arg(long, env = "SESSION_STATE_FILE", default_value = ".session.json")]
    state_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the stored session, refreshing if needed.
    Check,
    Login {
        #[arg(long, env = "SESSION_EMAIL")]
        email: String,
        #[arg(long, env = "SESSION_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Me,
    Health,
    Refresh,
    Get {
        path: String,
    },
    Post {
        path: String,
        #[arg(long)]
        data: String,
    },
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = SessionConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }

    let transport = Arc::new(HttpTransport::new(&config)?);
    let store = Arc::new(FileStore::new(&cli.state_file));
    let manager = SessionManager::new(config, transport, store, LogoutChannel::new());
    tracing::debug!(state_file = %cli.state_file.display(), tab_id = %manager.tab_id(), "session loaded");

    match cli.command {
        Command::Check => {
            let authenticated = manager.check_auth().await;
            print_json(&session_summary(&manager, authenticated))
        }
        Command::Login { email, password } => {
            manager.login(&SignInRequest { email, password }).await?;
            print_json(&session_summary(&manager, manager.is_authenticated()))
        }
        Command::Me => print_json(&manager.get(PROFILE_PATH).await?.body),
        Command::Health => print_json(&manager.get(HEALTH_PATH).await?.body),
        Command::Refresh => {
            let credential = manager.refresh().await?;
            print_json(&json!({ "credential_issued": credential.is_some() }))
        }
        Command::Get { path } => print_json(&manager.get(&path).await?.body),
        Command::Post { path, data } => {
            let body = serde_json::from_str::<Value>(&data)?;
            print_json(&manager.post(&path, &body).await?.body)
        }
        Command::Logout => {
            manager.logout().await;
            print_json(&json!({ "signed_out": true, "landing": manager.config().landing_path }))
        }
    }
}

/// Session state without the credential itself.
fn session_summary(manager: &SessionManager, authenticated: bool) -> Value {
    let snapshot = manager.snapshot();
    json!({
        "authenticated": authenticated,
        "has_credential": snapshot.credential.is_some(),
        "profile": snapshot.profile,
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
