use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use pairhub::config::Policy;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser)]
#[command(name = "pairhub")]
#[command(about = "pairhub: pairing-and-relay broker for app and web peers", long_about = None)]
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
        /// Config file path (default: PAIRHUB_CONFIG_PATH or ~/.pairhub/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the broker (WebSocket on / and /ws, health on /health).
    Serve {
        /// Config file path (default: PAIRHUB_CONFIG_PATH or ~/.pairhub/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Listen port (default from PAIRHUB_PORT, config, or 9988)
        #[arg(long, short)]
        port: Option<u16>,

        /// Cleanup policy: "hard" drops bindings when an app disconnects, "soft" keeps them for rebind.
        #[arg(long, value_name = "POLICY")]
        policy: Option<Policy>,
    },

    /// Connect as a web client and print the registered apps.
    Apps {
        /// Broker URL (default: ws://127.0.0.1:<port from config>/)
        #[arg(long, value_name = "URL")]
        url: Option<String>,

        /// Config file path used to resolve the default URL.
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("pairhub {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Serve {
            config,
            port,
            policy,
        }) => {
            if let Err(e) = run_serve(config, port, policy).await {
                log::error!("broker failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Apps { url, config }) => {
            if let Err(e) = run_apps(url, config).await {
                eprintln!("apps error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(pairhub::config::default_config_path);
    let dir = pairhub::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_serve(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
    policy: Option<Policy>,
) -> anyhow::Result<()> {
    let (mut config, path) = pairhub::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    config.broker.port = port.unwrap_or_else(|| pairhub::config::resolve_port(&config));
    if let Some(p) = policy {
        config.broker.policy = p;
    }
    log::info!("starting broker on {}:{}", config.broker.bind, config.broker.port);
    pairhub::broker::run_broker(config).await
}

async fn run_apps(
    url: Option<String>,
    config_path: Option<std::path::PathBuf>,
) -> Result<(), String> {
    let url = match url {
        Some(u) => u,
        None => {
            let (config, _) =
                pairhub::config::load_config(config_path).map_err(|e| e.to_string())?;
            format!("ws://127.0.0.1:{}/", pairhub::config::resolve_port(&config))
        }
    };

    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(|e| e.to_string())?;

    let req = serde_json::json!({ "name": pairhub::broker::protocol::APP_LIST });
    ws.send(Message::Text(req.to_string()))
        .await
        .map_err(|e| e.to_string())?;

    while let Some(msg) = ws.next().await {
        let msg = msg.map_err(|e| e.to_string())?;
        let Message::Text(text) = msg else { continue };
        let res: serde_json::Value = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        if res.get("name").and_then(|v| v.as_str()) != Some(pairhub::broker::protocol::APP_LIST) {
            continue;
        }
        let entries: Vec<pairhub::broker::AppEntry> =
            serde_json::from_value(res.get("data").cloned().unwrap_or_default())
                .map_err(|e| e.to_string())?;
        if entries.is_empty() {
            println!("no apps registered");
        }
        for entry in entries {
            match entry.client_info {
                Some(info) => println!("{}\t{}", entry.client_id, info),
                None => println!("{}", entry.client_id),
            }
        }
        let _ = ws.close(None).await;
        return Ok(());
    }

    Err("connection closed before app list arrived".to_string())
}
