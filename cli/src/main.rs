//! wicket CLI - binary entry point.
//!
//! # Architecture
//!
//! The CLI wires [`wicket_config`] into the store, clients and access flow,
//! then runs one subcommand:
//!
//! ```text
//! main() -> WicketConfig -> App::from_config() -> commands::{login, register, demo,
//!                                                            unlock, status, logout, call}
//! ```
//!
//! Access-flow subcommands print every [`wicket_core::Signal`] and wait for the
//! flow to finish. Ctrl-C disposes the flow, cancelling its pending timers.

mod commands;

use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wicket_client::{ApiClient, Backend, CredentialClient, DemoSandbox, retry::RetryPolicy};
use wicket_config::WicketConfig;
use wicket_core::Timings;
use wicket_store::{FileTier, KeyValueTier, MemoryTier, SessionStore};

#[derive(Debug, Parser)]
#[command(name = "wicket", version, about = "Sign in to the school portal backend")]
struct Cli {
    /// Config file to use instead of ~/.wicket/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in with a username and password (password is read from stdin).
    Login {
        identifier: String,
        #[arg(long)]
        password: Option<String>,
        /// Keep the session only for this process.
        #[arg(long)]
        no_remember: bool,
    },
    /// Create an account, then log in with it.
    Register {
        identifier: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "student")]
        role: String,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        grade_level: Option<u32>,
        #[arg(long)]
        class_name: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        child_name: Option<String>,
        #[arg(long)]
        invite_code: Option<String>,
        #[arg(long)]
        no_remember: bool,
    },
    /// Start a demo session for a role.
    Demo {
        #[arg(default_value = "demo")]
        role: String,
    },
    /// Unlock a developer session with the shared developer secret.
    Unlock {
        identifier: String,
        /// Defaults to `[developer] secret` or `WICKET_DEV_SECRET`.
        #[arg(long)]
        secret: Option<String>,
    },
    /// Show the stored session and whether it is admitted.
    Status,
    /// End the session on the backend and clear local storage.
    Logout,
    /// Send an authenticated request with the stored session.
    Call {
        method: String,
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
        /// Treat the call as an AI request for this feature. POST only.
        #[arg(long)]
        ai: Option<String>,
    },
}

/// Everything a subcommand needs, built once from config.
struct App {
    config: WicketConfig,
    store: SessionStore,
    authenticator: Arc<CredentialClient>,
    api: ApiClient,
    timings: Timings,
}

impl App {
    fn from_config(config: WicketConfig) -> Result<Self> {
        let base_url = config.api_base_url()?;
        let backend = Backend::with_connect_timeout(base_url.as_str(), config.connect_timeout())
            .context("failed to build HTTP client")?;

        let persistent: Arc<dyn KeyValueTier> = match config.persistent_path() {
            Some(path) => Arc::new(FileTier::open(path)),
            None => {
                tracing::warn!("No home directory; persistent sessions last for this run only");
                Arc::new(MemoryTier::new())
            }
        };
        let store = SessionStore::new(Arc::new(MemoryTier::new()), persistent)
            .with_key_prefix(&config.session_key_prefix())
            .with_counter_prefix(config.counter_prefix());

        let api = ApiClient::new(backend.clone(), store.clone())
            .with_sandbox(DemoSandbox::new(
                config.demo_token(),
                config.sandbox_allowlist(),
            ))
            .with_ai_quota(config.ai_quota_per_feature())
            .with_retry(RetryPolicy::default().with_max_retries(config.max_retries()))
            .with_ai_timeout(config.ai_timeout());

        let timings = Timings {
            granted: config.granted_delay(),
            welcome: config.welcome_delay(),
            denied_redirect: config.denied_redirect_delay(),
        };

        Ok(Self {
            authenticator: Arc::new(CredentialClient::new(backend)),
            config,
            store,
            api,
            timings,
        })
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<WicketConfig> {
    let config = match path {
        Some(path) => WicketConfig::load_from(path)?,
        None => WicketConfig::load()?.unwrap_or_default(),
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = load_config(cli.config.as_ref())?;
    let app = App::from_config(config)?;

    match cli.command {
        Command::Login {
            identifier,
            password,
            no_remember,
        } => {
            let remember = !no_remember && app.config.remember_me();
            commands::login(&app, identifier, password, remember).await
        }
        Command::Register {
            identifier,
            name,
            role,
            password,
            email,
            phone,
            grade_level,
            class_name,
            subject,
            child_name,
            invite_code,
            no_remember,
        } => {
            let form = commands::RegisterForm {
                identifier,
                name,
                role,
                password,
                email,
                phone,
                grade_level,
                class_name,
                subject,
                child_name,
                invite_code,
            };
            commands::register(&app, form, !no_remember && app.config.remember_me()).await
        }
        Command::Demo { role } => commands::demo(&app, &role).await,
        Command::Unlock { identifier, secret } => commands::unlock(&app, identifier, secret).await,
        Command::Status => commands::status(&app),
        Command::Logout => commands::logout(&app).await,
        Command::Call {
            method,
            path,
            body,
            ai,
        } => commands::call(&app, &method, path, body.as_deref(), ai).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // Without a log file, stay silent rather than mixing logs into command output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.wicket/logs/wicket.log
    if let Some(data_dir) = wicket_config::data_dir() {
        candidates.push(data_dir.join("logs").join("wicket.log"));
    }

    // Fallback: ./.wicket/logs/wicket.log
    candidates.push(PathBuf::from(".wicket").join("logs").join("wicket.log"));

    candidates
}
