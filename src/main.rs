use anyhow::{Context, Result};
use clap::{builder::FalseyValueParser, Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use certbridge::api::server;
use certbridge::auth::TokenVerifier;
use certbridge::cert::store::write_private_file;
use certbridge::cert::{CertificateAcquirer, CertificateStore, Ownership, RetryConfig, RetryPolicy};
use certbridge::config::{self, Config};
use certbridge::observability::{logging, metrics::MetricsCollector};
use certbridge::provider::{CertificateProvider, HttpCertificateProvider};
use certbridge::state::AppState;
use certbridge::supervisor::{exit_code, Supervisor, SupervisorConfig};

#[derive(Parser)]
#[command(name = "certbridge")]
#[command(about = "Run commands under short-lived TLS certificates from a companion server", long_about = None)]
struct Cli {
    /// Config file path; defaults apply when it does not exist
    #[arg(long, global = true, default_value = "certbridge.toml", env = "CERTBRIDGE_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve certificates from a Traefik ACME file
    Serve(ServeArgs),
    /// Fetch a certificate once and write or print it
    Getcert(GetcertArgs),
    /// Run a command under a valid certificate, restarting it on rotation
    Exec(ExecArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address on which to listen
    #[arg(short = 'l', long, env = "ADDRESS")]
    address: Option<String>,

    /// Key used to validate request tokens
    #[arg(short = 'k', long, env = "PUBLIC")]
    public: Option<PathBuf>,

    /// Path to the ACME JSON file
    #[arg(short = 'f', long, env = "ACME")]
    acme: Option<PathBuf>,
}

#[derive(Args)]
struct FetchArgs {
    /// Base URL of the companion server
    #[arg(short = 'u', long, env = "URL")]
    url: String,

    /// Domain of the certificate to retrieve
    #[arg(short = 'd', long, env = "DOMAIN")]
    domain: String,

    /// Token for authentication
    #[arg(short = 'j', long, env = "JWT", hide_env_values = true)]
    jwt: String,

    /// Allow plain http to the companion server
    #[arg(long, env = "DEV", value_parser = FalseyValueParser::new())]
    dev: bool,

    /// Owner and optional group for written files, `user[:group]`
    #[arg(short = 'o', long, env = "OWNER")]
    owner: Option<Ownership>,
}

#[derive(Args)]
struct GetcertArgs {
    #[command(flatten)]
    fetch: FetchArgs,

    /// Path to save the certificate; printed to stdout when omitted
    #[arg(short = 'c', long, env = "CERT")]
    cert: Option<PathBuf>,

    /// Path to save the key; printed to stdout when omitted
    #[arg(short = 'k', long, env = "KEY")]
    key: Option<PathBuf>,
}

#[derive(Args)]
struct ExecArgs {
    #[command(flatten)]
    fetch: FetchArgs,

    /// Path to save the certificate
    #[arg(short = 'c', long, env = "CERT")]
    cert: PathBuf,

    /// Path to save the key
    #[arg(short = 'k', long, env = "KEY")]
    key: Option<PathBuf>,

    /// Command to run, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_or_default(&cli.config)?;
    let guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve(args) => serve(args, &config).await,
        Commands::Getcert(args) => getcert(args).await,
        Commands::Exec(args) => {
            let code = exec(args, &config).await;
            drop(guard);
            std::process::exit(code);
        }
    }
}

async fn serve(args: ServeArgs, config: &Config) -> Result<()> {
    let address = args.address.unwrap_or_else(|| config.server.address.clone());
    let public = args
        .public
        .unwrap_or_else(|| PathBuf::from(&config.server.public_key));
    let acme = args
        .acme
        .unwrap_or_else(|| PathBuf::from(&config.server.acme_file));

    info!("Starting certificate server...");

    let verifier = TokenVerifier::from_file(&public)?;
    info!("Verifying tokens with {:?}", verifier.algorithm());

    match certbridge::acme::count_certificates(&acme).await {
        Ok(count) => info!("ACME file {} holds {} certificates", acme.display(), count),
        Err(e) => warn!("{:#}; requests will fail until it is readable", e),
    }

    let state = AppState::new(acme, verifier, MetricsCollector::new()?);
    let (addr, app) = server::create_api_server(&address, state.clone())?;
    server::run_api_server(addr, app, state).await
}

async fn getcert(args: GetcertArgs) -> Result<()> {
    let fetch = args.fetch;
    let provider = HttpCertificateProvider::new(&fetch.url, &fetch.jwt, fetch.dev)?;
    let bundle = provider.fetch(&fetch.domain).await?;

    let mut written: Vec<&Path> = Vec::new();
    let mut stdout = std::io::stdout().lock();

    match &args.cert {
        Some(path) => {
            write_private_file(path, &bundle.cert)?;
            written.push(path);
        }
        None => writeln!(stdout, "{}", String::from_utf8_lossy(&bundle.cert))?,
    }
    match &args.key {
        Some(path) => {
            write_private_file(path, &bundle.key)?;
            written.push(path);
        }
        None => writeln!(stdout, "{}", String::from_utf8_lossy(&bundle.key))?,
    }

    if let Some(owner) = &fetch.owner {
        if written.is_empty() {
            warn!("--owner given but nothing was written to disk");
        }
        owner
            .apply(&written)
            .with_context(|| format!("Failed to set owner {}", owner.user))?;
    }

    info!("Fetched certificate for {}", fetch.domain);
    Ok(())
}

/// Run the supervisor and return the process exit code
async fn exec(args: ExecArgs, config: &Config) -> i32 {
    match run_supervisor(args, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    }
}

async fn run_supervisor(args: ExecArgs, config: &Config) -> Result<i32> {
    let fetch = args.fetch;
    let provider = HttpCertificateProvider::new(&fetch.url, &fetch.jwt, fetch.dev)?;
    let store = CertificateStore::new(args.cert, args.key, fetch.owner);
    let acquirer = CertificateAcquirer::new(Arc::new(provider), store, fetch.domain);

    let policy = Arc::new(RetryPolicy::new(
        Arc::new(acquirer),
        RetryConfig {
            max_attempts: config.supervisor.max_attempts,
        },
    ));

    let mut command = args.command.into_iter();
    let program = command.next().context("No command given")?;
    let supervisor_config = SupervisorConfig {
        command: program,
        args: command.collect(),
        strip_env: config.supervisor.strip_env.clone(),
        max_wait: config.supervisor.max_wait(),
    };

    let status = Supervisor::new(supervisor_config, policy).run().await?;
    Ok(exit_code(status))
}
