//! CLI parser and dispatch to command-specific modules.

mod call;
mod fetch;
mod helpers;
mod init_db;
mod pending;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use qualer_stage::http_client::HttpMethod;

use helpers::SessionArgs;

#[derive(Parser)]
#[command(name = "qualer-stage")]
#[command(about = "Fetch Qualer endpoints through an authenticated browser session and stage the responses")]
#[command(version)]
pub struct Cli {
    /// Config file path (default: ./qualer-stage.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Staging database URL (SQLite path or postgres:// URL)
    #[arg(long, global = true, env = "DB_URL", hide_env_values = true)]
    db_url: Option<String>,

    /// Stage into one CSV file per service under this directory instead
    #[arg(long, global = true)]
    csv_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Get,
    Post,
}

impl From<MethodArg> for HttpMethod {
    fn from(method: MethodArg) -> Self {
        match method {
            MethodArg::Get => HttpMethod::Get,
            MethodArg::Post => HttpMethod::Post,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the staging table in the configured database
    InitDb,

    /// Load a page over HTTP and in the browser, unwrap it, and stage it
    Fetch {
        /// Absolute URL or path relative to the base URL
        url: String,
        /// Service name the response is staged under
        #[arg(short, long)]
        service: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Call an internal endpoint (direct HTTP with browser fallback) and stage the JSON
    Call {
        /// Endpoint path relative to the base URL
        path: String,
        /// Service name the response is staged under
        #[arg(short, long)]
        service: Option<String>,
        #[arg(short, long, value_enum, default_value = "get")]
        method: MethodArg,
        /// Query (GET) or form (POST) parameter as NAME=VALUE; repeatable
        #[arg(short, long = "param", value_parser = helpers::parse_pair)]
        params: Vec<(String, String)>,
        /// Extra request header as NAME=VALUE; repeatable
        #[arg(short = 'H', long = "header", value_parser = helpers::parse_pair)]
        headers: Vec<(String, String)>,
        /// Page loaded before the browser fallback (referer and cookies)
        #[arg(long, default_value = "/")]
        context_page: String,
        /// Do not attach an anti-forgery token to POST requests
        #[arg(long)]
        no_csrf: bool,
        #[command(flatten)]
        session: SessionArgs,
    },

    /// List staged rows not yet consumed by the parsing pass
    Pending {
        /// Service to list
        service: String,
        /// Limit number of rows shown (0 = unlimited)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = qualer_stage::Settings::load(cli.config.as_deref()).await?;
    if cli.db_url.is_some() {
        settings.db_url = cli.db_url;
    }
    if cli.csv_dir.is_some() {
        settings.csv_dir = cli.csv_dir;
    }

    match cli.command {
        Commands::InitDb => init_db::cmd_init_db(&settings).await,
        Commands::Fetch {
            url,
            service,
            session,
        } => fetch::cmd_fetch(settings, session, &url, service.as_deref()).await,
        Commands::Call {
            path,
            service,
            method,
            params,
            headers,
            context_page,
            no_csrf,
            session,
        } => {
            let mut request = qualer_stage::EndpointRequest::new(method.into(), path)
                .context_page(context_page);
            if no_csrf {
                request = request.include_csrf(false);
            }
            request.params = params;
            request.headers = headers;
            call::cmd_call(settings, session, request, service.as_deref()).await
        }
        Commands::Pending { service, limit } => {
            pending::cmd_pending(&settings, &service, limit).await
        }
    }
}
