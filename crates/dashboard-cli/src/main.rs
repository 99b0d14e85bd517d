//! dashboard-auth: sign in against the dashboard's Supabase project and print
//! the resolved tenant snapshot.
//!
//! Usage: dashboard-auth [--config <path>] [--log-level <level>] <command>

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dashboard_config::{init_logging, parse_level, Config, Paths};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tenant_auth::supabase::{SupabaseAuth, SupabaseTenantDirectory};
use tenant_auth::{
    AuthSnapshot, AuthStateMachine, Capabilities, ProfileResolver, SessionStore, SignUpMetadata,
};
use tracing::{debug, info};

/// Sign in to the voice dashboard and inspect tenant access.
#[derive(Parser, Debug)]
#[command(name = "dashboard-auth")]
#[command(about = "Sign in to the voice dashboard and inspect the resolved tenant")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.voice-dashboard/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Seconds to wait for the tenant context to resolve
    #[arg(long, default_value = "15", global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in with email and password
    SignIn {
        #[arg(long, env = "DASHBOARD_EMAIL")]
        email: String,

        #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
        password: String,

        /// Sign out again after printing the snapshot
        #[arg(long)]
        sign_out: bool,
    },

    /// Create an account and organization
    SignUp {
        #[arg(long)]
        email: String,

        #[arg(long, env = "DASHBOARD_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        /// Name of the organization to provision
        #[arg(long)]
        organization: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct SnapshotReport<'a> {
    #[serde(flatten)]
    snapshot: &'a AuthSnapshot,
    capabilities: Capabilities,
    display_name: Option<String>,
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    log_level: &'a str,
    log_format: dashboard_config::LogFormat,
    supabase_url: &'a str,
    supabase_publishable_key_set: bool,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::load_from_file(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            config.apply_overrides(|name| std::env::var(name).ok());
            config.validate()?;
            config
        }
        None => Config::load(&Paths::new()?)?,
    };
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_snapshot(snapshot: &AuthSnapshot) -> Result<()> {
    print_json(&SnapshotReport {
        snapshot,
        capabilities: snapshot.capabilities(),
        display_name: snapshot.profile.as_ref().and_then(|p| p.display_name()),
    })
}

/// Wire the Supabase adapters into a running state machine.
fn start_machine(config: &Config) -> (Arc<SupabaseAuth>, AuthStateMachine) {
    let auth = Arc::new(SupabaseAuth::new(
        &config.supabase_url,
        &config.supabase_publishable_key,
    ));
    let directory =
        SupabaseTenantDirectory::new(&config.supabase_url, &config.supabase_publishable_key)
            .with_auth(auth.clone());

    let machine = AuthStateMachine::start(
        SessionStore::new(auth.clone()),
        ProfileResolver::new(Arc::new(directory)),
    );
    (auth, machine)
}

/// Wait for a settled snapshot of a signed-in user.
async fn wait_for_tenant(machine: &AuthStateMachine, wait: Duration) -> Result<Arc<AuthSnapshot>> {
    let mut rx = machine.watch();
    let resolved = tokio::time::timeout(
        wait,
        rx.wait_for(|snapshot| snapshot.user.is_some() && !snapshot.is_loading),
    );

    tokio::select! {
        result = resolved => {
            let snapshot = result
                .context("timed out waiting for tenant resolution")?
                .context("auth state machine stopped")?;
            Ok(Arc::clone(&snapshot))
        }
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    }
}

async fn sign_in(
    config: &Config,
    email: &str,
    password: &str,
    sign_out: bool,
    wait: Duration,
) -> Result<()> {
    let (_auth, machine) = start_machine(config);
    let initial = machine.wait_until_settled().await;
    debug!(phase = ?initial.phase, "Startup settled");

    machine
        .sign_in(email, password)
        .await
        .context("sign-in failed")?;
    let snapshot = wait_for_tenant(&machine, wait).await?;
    print_snapshot(&snapshot)?;

    if sign_out {
        machine.sign_out().await;
        info!("Signed out");
        print_snapshot(&machine.snapshot())?;
    }

    machine.shutdown();
    Ok(())
}

async fn sign_up(
    config: &Config,
    email: &str,
    password: &str,
    metadata: SignUpMetadata,
    wait: Duration,
) -> Result<()> {
    let (auth, machine) = start_machine(config);
    machine.wait_until_settled().await;

    machine
        .sign_up(email, password, &metadata)
        .await
        .context("sign-up failed")?;

    if auth.current().is_none() {
        info!(email = %email, "Account created, email confirmation required");
        print_json(&serde_json::json!({
            "status": "confirmation_pending",
            "email": email,
        }))?;
    } else {
        let snapshot = wait_for_tenant(&machine, wait).await?;
        print_snapshot(&snapshot)?;
    }

    machine.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, config.log_format);

    debug!(
        level = %parse_level(level),
        supabase_url = %config.supabase_url,
        "Configuration loaded"
    );
    let wait = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Commands::SignIn {
            email,
            password,
            sign_out,
        } => sign_in(&config, &email, &password, sign_out, wait).await,
        Commands::SignUp {
            email,
            password,
            first_name,
            last_name,
            organization,
        } => {
            let metadata = SignUpMetadata {
                first_name,
                last_name,
                organization_name: organization,
            };
            sign_up(&config, &email, &password, metadata, wait).await
        }
        Commands::Config => print_json(&ConfigReport {
            log_level: &config.log_level,
            log_format: config.log_format,
            supabase_url: &config.supabase_url,
            supabase_publishable_key_set: !config.supabase_publishable_key.is_empty(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sign_in_with_global_flags() {
        let cli = Cli::try_parse_from([
            "dashboard-auth",
            "sign-in",
            "--email",
            "ada@example.com",
            "--password",
            "secret",
            "--sign-out",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::SignIn {
                email, sign_out, ..
            } => {
                assert_eq!(email, "ada@example.com");
                assert!(sign_out);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_sign_up_metadata() {
        let cli = Cli::try_parse_from([
            "dashboard-auth",
            "sign-up",
            "--email",
            "ada@example.com",
            "--password",
            "secret",
            "--organization",
            "Analytical Engines",
        ])
        .unwrap();

        match cli.command {
            Commands::SignUp {
                organization,
                first_name,
                ..
            } => {
                assert_eq!(organization.as_deref(), Some("Analytical Engines"));
                assert_eq!(first_name, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn snapshot_report_flattens_snapshot_and_capabilities() {
        let snapshot = AuthSnapshot::signed_out();
        let report = SnapshotReport {
            snapshot: &snapshot,
            capabilities: snapshot.capabilities(),
            display_name: None,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "signed_out");
        assert_eq!(json["is_loading"], false);
        assert_eq!(json["capabilities"]["is_admin"], false);
    }
}
