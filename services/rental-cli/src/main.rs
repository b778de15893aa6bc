//! Book rental client
//!
//! Command-line front-end over the rental API:
//! 1. Loads configuration and the persisted session
//! 2. Runs one command through the authenticated pipeline
//! 3. Prints the result as JSON on stdout
//! 4. Reports a session that ended during the command

mod config;
mod error;
mod metrics;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use auth_pipeline::{Pipeline, SessionEvent};
use clap::{Parser, Subcommand};
use common::Secret;
use rental_api::{DEFAULT_LIMIT, RentalApi, RentalCreate, UserCreate};
use serde::Serialize;
use session::CredentialStore;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::HttpTransport;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "rental-cli", version, about = "Book rental API client")]
struct Cli {
    /// Config file (default: CONFIG_PATH or rental-client.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print session renewal metrics to stderr after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the API is up
    Health,
    /// Create an account (password from RENTAL_PASSWORD or password_file)
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        age: Option<u32>,
    },
    /// Log in and store the session
    Login {
        /// Defaults to [account] email
        #[arg(long)]
        email: Option<String>,
    },
    /// Forget the stored session
    Logout,
    /// Show the logged-in user
    Me,
    /// List books
    Books {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Show one book
    Book { id: i64 },
    /// List rentals
    Rentals {
        #[arg(long, default_value_t = 0)]
        skip: u32,
        #[arg(long, default_value_t = DEFAULT_LIMIT)]
        limit: u32,
    },
    /// Rent a book as the logged-in user
    Rent {
        #[arg(long)]
        book: i64,
        /// Due date, e.g. 2025-06-30T12:00:00
        #[arg(long)]
        due: String,
        #[arg(long, default_value_t = 1.0)]
        daily_rate: f64,
    },
    /// Return a rented book
    Return { rental: i64 },
    /// List overdue rentals
    Overdue,
    /// Profile, catalog and overdue rentals, fetched concurrently
    Dashboard,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries command output, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let prometheus = if cli.metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        base_url = %config.api.base_url,
        credentials = %config.session.credentials_path.display(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(HttpTransport::new(
        client,
        config.api.base_url.clone(),
        config.api.timeout(),
    ));
    let store = CredentialStore::load(config.session.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load session from {}",
                config.session.credentials_path.display()
            )
        })?;
    let pipeline = Arc::new(Pipeline::new(transport, Arc::new(store)));
    let mut events = pipeline.subscribe();
    let api = RentalApi::new(pipeline);

    let outcome = run(&api, &config, cli.command).await;

    for notice in session_notices(&mut events) {
        eprintln!("{notice}");
    }
    if let Some(handle) = prometheus {
        eprintln!("{}", metrics::session_summary(&handle.render()));
    }

    let output = outcome?;
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("failed to format output")?
    );
    Ok(())
}

/// Execute one command and return what to print.
async fn run(api: &RentalApi, config: &Config, command: Command) -> Result<serde_json::Value> {
    let output = match command {
        Command::Health => to_json(api.health().await?)?,
        Command::Signup { name, email, age } => {
            let password = password(config)?;
            let user = UserCreate {
                name,
                email,
                password: password.expose().clone(),
                age,
                is_active: None,
            };
            to_json(api.sign_up(&user).await.context("signup failed")?)?
        }
        Command::Login { email } => {
            let email = email
                .or_else(|| config.account.as_ref().map(|a| a.email.clone()))
                .ok_or(error::Error::MissingAccount)?;
            let password = password(config)?;
            let profile = api
                .login(&email, password.expose())
                .await
                .context("login failed")?;
            info!(email = %email, "session stored");
            profile.unwrap_or_else(|| serde_json::json!({ "email": email }))
        }
        Command::Logout => {
            api.logout().await?;
            serde_json::json!({ "logged_out": true })
        }
        Command::Me => to_json(api.current_user().await?)?,
        Command::Books { skip, limit } => to_json(api.books(skip, limit).await?)?,
        Command::Book { id } => to_json(api.book(id).await?)?,
        Command::Rentals { skip, limit } => to_json(api.rentals(skip, limit).await?)?,
        Command::Rent {
            book,
            due,
            daily_rate,
        } => {
            let me = api.current_user().await?;
            let rental = RentalCreate {
                user_id: me.id,
                book_id: book,
                due_date: due,
                daily_rate,
            };
            to_json(api.create_rental(&rental).await?)?
        }
        Command::Return { rental } => to_json(api.return_book(rental).await?)?,
        Command::Overdue => to_json(api.overdue_rentals().await?)?,
        Command::Dashboard => {
            let (me, books, overdue) = tokio::join!(
                api.current_user(),
                api.books(0, DEFAULT_LIMIT),
                api.overdue_rentals()
            );
            serde_json::json!({
                "user": to_json(me?)?,
                "books": to_json(books?)?,
                "overdue": to_json(overdue?)?,
            })
        }
    };
    Ok(output)
}

/// The account password: RENTAL_PASSWORD, then the configured password_file.
fn password(config: &Config) -> error::Result<Secret<String>> {
    if let Some(password) = config.account.as_ref().and_then(|a| a.password.clone()) {
        return Ok(password);
    }
    crate::config::password_from_env().ok_or(error::Error::MissingPassword)
}

/// User-facing lines for session events received so far.
fn session_notices(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<String> {
    let mut notices = Vec::new();
    loop {
        match events.try_recv() {
            Ok(SessionEvent::Invalidated { reason }) => notices.push(format!(
                "Your session has ended ({reason}). Run `rental-cli login` to sign in again."
            )),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                warn!(missed, "session events dropped");
            }
            Err(_) => break,
        }
    }
    notices
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value> {
    serde_json::to_value(value).context("failed to encode output")
}
