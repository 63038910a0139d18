//! Bridgeward - connection-gating bridge daemon.
//!
//! Runs the bridge server, and doubles as the host-invoked administrative
//! tool: token issuance, revocation, and address blocking are CLI verbs on
//! this binary, never network messages.

use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bridgeward::audit::AuditLogger;
use bridgeward::auth::{
    AuthenticationManager, ClientInfo, IpReputationTracker, ReputationPolicy, RevocationLedger,
    SecretKeyStore, TokenService,
};
use bridgeward::config::Settings;
use bridgeward::dispatch::DispatchRegistry;
use bridgeward::error::BridgeError;
use bridgeward::socket::BridgeServer;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

struct CliArgs {
    command: String,
    operand: Option<String>,
    config: Option<String>,
    reason: Option<String>,
    name: Option<String>,
    client_version: Option<String>,
    platform: Option<String>,
    help: bool,
    version: bool,
}

fn main() -> ExitCode {
    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.version {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "/etc/bridgeward/daemon.toml".to_string());

    // A missing config file only matters when it was named explicitly.
    let settings = if std::path::Path::new(&config_path).exists() {
        match Settings::load(&config_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else if args.config.is_some() {
        eprintln!("Error: config file '{}' not found", config_path);
        return ExitCode::FAILURE;
    } else {
        Settings::default()
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    match args.command.as_str() {
        "run" => run_server(settings, config_path),
        "issue-token" => issue_token(&settings, &args),
        "revoke-token" => revoke_token(&settings, &args),
        "revoke-all" => revoke_all(&settings, &args),
        "block" => block(&settings, &args),
        "unblock" => unblock(&settings, &args),
        "rotate-secret" => rotate_secret(&settings),
        other => {
            eprintln!("Error: unknown command '{}'", other);
            print_help();
            ExitCode::FAILURE
        }
    }
}

fn run_server(settings: Settings, config_path: String) -> ExitCode {
    info!("Starting {} v{}", NAME, VERSION);
    info!("Configuration loaded from: {}", config_path);
    info!("Listen address: {}", settings.listen.addr);
    info!("State directory: {}", settings.paths.state_dir.display());

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(async_main(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Daemon failed");
            ExitCode::FAILURE
        }
    }
}

/// Async main function.
async fn async_main(settings: Settings) -> Result<(), BridgeError> {
    let settings = Arc::new(settings);

    // The server keeps running on an ephemeral secret if the state
    // directory is unwritable; previously issued tokens stop working and
    // the operator is warned.
    let auth = build_auth(&settings, true)?;

    auth.reputation()
        .start_sweep_task(Duration::from_secs(settings.security.sweep_interval_seconds));

    let dispatch = Arc::new(DispatchRegistry::with_defaults());
    let server = BridgeServer::bind(Arc::clone(&settings), auth, dispatch).await?;

    let shutdown = Arc::new(Notify::new());
    let shutdown_for_run = Arc::clone(&shutdown);

    tokio::select! {
        result = server.run(shutdown_for_run) => {
            result?;
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, initiating graceful shutdown...");
            shutdown.notify_waiters();

            let drain_timeout = Duration::from_secs(30);
            match tokio::time::timeout(drain_timeout, server.wait_for_drain()).await {
                Ok(()) => info!("Graceful shutdown complete"),
                Err(_) => warn!(
                    "Shutdown timeout after {}s, some connections may be terminated",
                    drain_timeout.as_secs()
                ),
            }
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Assemble the authentication stack from settings.
///
/// With `allow_ephemeral_secret` the daemon keeps running on an in-memory
/// secret when the store is unwritable; administrative verbs pass `false`
/// because a token signed with an ephemeral secret could never authenticate
/// against the server's key.
fn build_auth(
    settings: &Settings,
    allow_ephemeral_secret: bool,
) -> Result<Arc<AuthenticationManager>, BridgeError> {
    let secret = match SecretKeyStore::load_or_create(&settings.paths.secret_path()) {
        Ok(secret) => secret,
        Err(e) if allow_ephemeral_secret => {
            warn!(
                error = %e,
                "Secret store unavailable, continuing with an ephemeral secret; \
                 previously issued tokens are no longer valid"
            );
            SecretKeyStore::generate_ephemeral()?
        }
        Err(e) => return Err(e),
    };

    let ledger = Arc::new(RevocationLedger::load(settings.paths.revocation_path()));
    let reputation = Arc::new(IpReputationTracker::load(
        settings.paths.block_list_path(),
        ReputationPolicy::from_settings(&settings.security),
    ));

    let audit = if settings.audit.enabled {
        match AuditLogger::new(&settings.audit.log_path) {
            Ok(logger) => {
                info!(path = %settings.audit.log_path.display(), "Audit logging enabled");
                Some(Arc::new(logger))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %settings.audit.log_path.display(),
                    "Failed to create audit logger, audit logging disabled"
                );
                None
            }
        }
    } else {
        info!("Audit logging disabled");
        None
    };

    let tokens = TokenService::new(
        &secret,
        Duration::from_secs(settings.security.token_ttl_seconds),
        Arc::clone(&ledger),
    );

    Ok(Arc::new(AuthenticationManager::new(
        tokens, reputation, ledger, audit,
    )))
}

/// Build the auth stack for an administrative verb, reporting failures on
/// stderr.
fn admin_auth(settings: &Settings) -> Option<Arc<AuthenticationManager>> {
    match build_auth(settings, false) {
        Ok(auth) => Some(auth),
        Err(e) => {
            eprintln!("Error: {}", e);
            None
        }
    }
}

fn issue_token(settings: &Settings, args: &CliArgs) -> ExitCode {
    let client = ClientInfo {
        name: args.name.clone().unwrap_or_else(|| "client".to_string()),
        version: args
            .client_version
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        platform: args
            .platform
            .clone()
            .unwrap_or_else(|| env::consts::OS.to_string()),
    };

    let Some(auth) = admin_auth(settings) else {
        return ExitCode::FAILURE;
    };

    match auth.request_token(client) {
        Ok(issued) => {
            println!("{}", issued.summary());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn revoke_token(settings: &Settings, args: &CliArgs) -> ExitCode {
    let Some(token_id) = args.operand.as_deref() else {
        eprintln!("Error: revoke-token requires a token id");
        return ExitCode::FAILURE;
    };
    let reason = args.reason.as_deref().unwrap_or("operator request");

    let Some(auth) = admin_auth(settings) else {
        return ExitCode::FAILURE;
    };

    match auth.revoke_token(token_id, reason) {
        Ok(()) => {
            println!("Token {} revoked", token_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn revoke_all(settings: &Settings, args: &CliArgs) -> ExitCode {
    let reason = args.reason.as_deref().unwrap_or("operator request");

    let Some(auth) = admin_auth(settings) else {
        return ExitCode::FAILURE;
    };

    match auth.revoke_all_tokens(reason) {
        Ok(()) => {
            println!("All previously issued tokens revoked");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn block(settings: &Settings, args: &CliArgs) -> ExitCode {
    let Some(addr) = parse_addr_operand(args, "block") else {
        return ExitCode::FAILURE;
    };
    let reason = args.reason.as_deref().unwrap_or("operator request");

    let Some(auth) = admin_auth(settings) else {
        return ExitCode::FAILURE;
    };

    match auth.block_address(addr, reason) {
        Ok(()) => {
            println!("Address {} blocked", addr);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn unblock(settings: &Settings, args: &CliArgs) -> ExitCode {
    let Some(addr) = parse_addr_operand(args, "unblock") else {
        return ExitCode::FAILURE;
    };

    let Some(auth) = admin_auth(settings) else {
        return ExitCode::FAILURE;
    };

    match auth.unblock_address(addr) {
        Ok(()) => {
            println!("Address {} unblocked", addr);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn rotate_secret(settings: &Settings) -> ExitCode {
    match SecretKeyStore::rotate(&settings.paths.secret_path()) {
        Ok(_) => {
            println!("Signing secret rotated; every previously issued token is now invalid");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn parse_addr_operand(args: &CliArgs, verb: &str) -> Option<IpAddr> {
    let Some(raw) = args.operand.as_deref() else {
        eprintln!("Error: {} requires a source address", verb);
        return None;
    };
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            eprintln!("Error: invalid address '{}': {}", raw, e);
            None
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn take_value<I: Iterator<Item = String>>(args: &mut I, flag: &str) -> Result<String, String> {
    args.next()
        .ok_or_else(|| format!("{} requires a value", flag))
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<CliArgs, String> {
    let mut parsed = CliArgs {
        command: "run".to_string(),
        operand: None,
        config: None,
        reason: None,
        name: None,
        client_version: None,
        platform: None,
        help: false,
        version: false,
    };
    let mut command_seen = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => parsed.help = true,
            "-V" | "--version" => parsed.version = true,
            "-c" | "--config" => parsed.config = Some(take_value(&mut args, "--config")?),
            "--reason" => parsed.reason = Some(take_value(&mut args, "--reason")?),
            "--name" => parsed.name = Some(take_value(&mut args, "--name")?),
            "--client-version" => {
                parsed.client_version = Some(take_value(&mut args, "--client-version")?)
            }
            "--platform" => parsed.platform = Some(take_value(&mut args, "--platform")?),
            other if other.starts_with("--config=") => {
                parsed.config = other.strip_prefix("--config=").map(String::from);
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown flag '{}'", other));
            }
            other => {
                if !command_seen {
                    parsed.command = other.to_string();
                    command_seen = true;
                } else if parsed.operand.is_none() {
                    parsed.operand = Some(other.to_string());
                } else {
                    return Err(format!("unexpected argument '{}'", other));
                }
            }
        }
    }

    Ok(parsed)
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Connection-gating bridge daemon.

USAGE:
    {} [COMMAND] [OPTIONS]

COMMANDS:
    run                    Run the bridge server [default]
    issue-token            Issue a client token and print it
    revoke-token <ID>      Revoke a single token by id
    revoke-all             Revoke every previously issued token
    block <ADDR>           Block a source address
    unblock <ADDR>         Unblock a source address
    rotate-secret          Replace the signing secret, invalidating all tokens

OPTIONS:
    -c, --config <PATH>        Path to configuration file
                               [default: /etc/bridgeward/daemon.toml]
        --reason <TEXT>        Reason recorded with revoke/block operations
        --name <TEXT>          Client name embedded in an issued token
        --client-version <V>   Client version embedded in an issued token
        --platform <TEXT>      Client platform embedded in an issued token
    -h, --help                 Print help information
    -V, --version              Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Initialize logging based on settings.
fn init_logging(settings: &Settings) -> Result<(), BridgeError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
