//! # hirelane
//!
//! Command-line client for the hirelane API. Wires settings, the encrypted
//! token store and the session core together, then runs one command.

#![deny(unsafe_code)]

mod logging;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hirelane_auth::{
    AuthClient, GuardDecision, HttpAuthApi, Navigator, RouteTable, SessionConfig, SessionGuard,
    SessionManager, TokenStore,
};
use hirelane_settings::HirelaneSettings;
use reqwest::Method;
use secrecy::SecretString;

/// hirelane session client.
#[derive(Parser, Debug)]
#[command(name = "hirelane", about = "hirelane session client", version)]
struct Cli {
    /// API base URL (overrides settings and `HIRELANE_API_URL`).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the access token.
    Login {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "HIRELANE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and remove the stored token.
    Logout,
    /// Show the current session.
    Status,
    /// Send an authenticated request and print the response.
    Request {
        /// HTTP method.
        method: String,
        /// Path under the API base URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        body: Option<String>,
    },
    /// Show what the route guard decides for a path.
    Guard {
        /// Route path, e.g. `/admin/users`.
        path: String,
    },
}

/// Reports redirects on stderr; a CLI has nowhere to navigate.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect(&self, route: &str, notice: Option<&str>) {
        match notice {
            Some(notice) => eprintln!("{notice} (redirect: {route})"),
            None => eprintln!("redirect: {route}"),
        }
    }
}

fn build_session(settings: &HirelaneSettings) -> Result<(SessionManager, AuthClient)> {
    let store = TokenStore::open(
        Path::new(&settings.session.storage_path),
        Path::new(&settings.session.key_path),
    )
    .context("Failed to open token store")?;
    let api = HttpAuthApi::new(&settings.api).context("Failed to build HTTP client")?;
    let http = api.client().clone();
    let session = SessionManager::new(
        Arc::new(api),
        store,
        Arc::new(ConsoleNavigator),
        SessionConfig::from_settings(settings),
    );
    let client = AuthClient::new(http, &settings.api, &session);
    Ok((session, client))
}

fn parse_method(method: &str) -> Result<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {method}"))
}

fn describe(decision: &GuardDecision) -> String {
    match decision {
        GuardDecision::Loading => "loading".to_string(),
        GuardDecision::Render => "render".to_string(),
        GuardDecision::Redirect(to) => format!("redirect {to}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = hirelane_settings::load_settings().context("Failed to load settings")?;
    if let Some(url) = cli.api_url {
        settings.api.base_url = url;
    }
    logging::init_logging(&settings.logging);
    tracing::debug!(base_url = %settings.api.base_url, "settings loaded");

    let (session, client) = build_session(&settings)?;

    match cli.command {
        Command::Login { email, password } => {
            let flags = session
                .login(&email, &SecretString::from(password))
                .await
                .context("Login failed")?;
            println!("logged in (admin: {})", flags.is_admin);
        }
        Command::Logout => {
            session.logout().await.context("Logout failed")?;
            println!("logged out");
        }
        Command::Status => {
            let _ = session.initialize().await;
            let snapshot = session.state().snapshot();
            let status = serde_json::json!({
                "authenticated": snapshot.is_authenticated,
                "admin": snapshot.is_admin,
                "userId": snapshot.user_id,
                "expiresAt": snapshot.expires_at.map(|t| t.to_rfc3339()),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Request { method, path, body } => {
            let _ = session.initialize().await;
            let mut builder = client.request(parse_method(&method)?, &path);
            if let Some(body) = body {
                let json: serde_json::Value =
                    serde_json::from_str(&body).context("Request body is not valid JSON")?;
                builder = builder.json(&json);
            }
            let resp = client.send(builder).await?;
            let status = resp.status();
            let text = resp.text().await.context("Failed to read response body")?;
            println!("{status}");
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Command::Guard { path } => {
            let flags = session.initialize().await;
            let guard = SessionGuard::new(settings.routes.clone());
            let decision = guard.evaluate(RouteTable::default().lookup(&path), flags);
            println!("{}", describe(&decision));
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
