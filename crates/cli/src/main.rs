use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "WhatsApp to OpenAI Assistants relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the webhook gateway. Point the Twilio WhatsApp webhook at POST /webhook.
    Gateway {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from PORT, config, or 5000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Check credentials, the running gateway, and the OpenAI and Twilio APIs.
    Doctor {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Gateway base URL (default http://localhost:<port>)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// Send a WhatsApp text message through Twilio.
    Send {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Recipient number (e.g. +15551234567)
        #[arg(long)]
        to: String,

        /// Message text
        #[arg(long)]
        body: String,
    },

    /// Send an approved WhatsApp template through Twilio (starts a conversation).
    SendTemplate {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Recipient number (e.g. +15551234567)
        #[arg(long)]
        to: String,

        /// Content template sid (HX...)
        #[arg(long)]
        template: String,

        /// Template variables as a JSON object (e.g. '{"1":"Maria"}')
        #[arg(long, default_value = "{}")]
        vars: String,
    },
}

impl Commands {
    fn config_path(&self) -> Option<PathBuf> {
        match self {
            Commands::Version => None,
            Commands::Init { config }
            | Commands::Gateway { config, .. }
            | Commands::Doctor { config, .. }
            | Commands::Send { config, .. }
            | Commands::SendTemplate { config, .. } => config.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let env_debug = lib::config::debug_from_env().unwrap_or(false);
    let default_level = if env_debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Run with --help for usage");
        return;
    };

    let (config, config_path) = match lib::config::load_config(command.config_path()) {
        Ok(loaded) => loaded,
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    };
    if config.gateway.debug && !env_debug {
        log::info!("gateway.debug is set in the config file; set DEBUG=true for debug logs");
    }

    let result = match command {
        Commands::Version => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Init { .. } => run_init(&config_path),
        Commands::Gateway { port, .. } => run_gateway(config, port).await,
        Commands::Doctor { url, .. } => run_doctor(&config, url).await,
        Commands::Send { to, body, .. } => run_send(&config, &to, &body).await,
        Commands::SendTemplate {
            to, template, vars, ..
        } => run_send_template(&config, &to, &template, &vars).await,
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: &std::path::Path) -> anyhow::Result<()> {
    let dir = lib::init::init_config_dir(config_path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(mut config: lib::config::Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!(
        "starting gateway on {}:{}",
        config.gateway.bind,
        config.gateway.port
    );
    lib::gateway::run_gateway(config).await
}

async fn run_doctor(config: &lib::config::Config, url: Option<String>) -> anyhow::Result<()> {
    let url = url.unwrap_or_else(|| format!("http://localhost:{}", config.gateway.port));
    println!("running health checks...");
    let report = lib::doctor::run_checks(config, &url).await;
    for check in &report.checks {
        let mark = if check.passed { "ok  " } else { "FAIL" };
        println!("[{}] {}: {}", mark, check.name, check.detail);
    }
    println!(
        "{} ({:.2}s)",
        if report.healthy() { "healthy" } else { "unhealthy" },
        report.duration.as_secs_f64()
    );
    if !report.healthy() {
        anyhow::bail!("one or more health checks failed");
    }
    Ok(())
}

async fn run_send(config: &lib::config::Config, to: &str, body: &str) -> anyhow::Result<()> {
    let client = lib::channels::TwilioClient::from_config(config)?;
    let sid = client.send_message(to, body).await?;
    println!("{}", sid);
    Ok(())
}

async fn run_send_template(
    config: &lib::config::Config,
    to: &str,
    template: &str,
    vars: &str,
) -> anyhow::Result<()> {
    let variables: serde_json::Value = serde_json::from_str(vars)
        .map_err(|e| anyhow::anyhow!("--vars must be a JSON object: {}", e))?;
    if !variables.is_object() {
        anyhow::bail!("--vars must be a JSON object");
    }
    let client = lib::channels::TwilioClient::from_config(config)?;
    let sid = client
        .send_template_message(to, template, &variables)
        .await?;
    println!("{}", sid);
    Ok(())
}
