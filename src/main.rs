use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use plainwire::client::shell;
use plainwire::client::{Exchange, HttpClient, Payload, Target};
use plainwire::config::Config;
use plainwire::http::content::DEFAULT_CONTENT_TYPE;
use plainwire::server::Server;
use plainwire::server::resolver::FsResolver;

#[derive(Parser)]
#[command(name = "plainwire")]
#[command(about = "Minimal HTTP/1.1 client and server on raw sockets", long_about = None)]
struct Cli {
    /// YAML configuration file; defaults to $PLAINWIRE_CONFIG or plainwire.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve files and accept uploads until interrupted
    Serve {
        #[arg(short, long)]
        listen: Option<String>,
        #[arg(long)]
        public_dir: Option<PathBuf>,
        #[arg(long)]
        receive_dir: Option<PathBuf>,
    },
    /// Run one exchange against a URL
    Fetch {
        url: String,
        /// GET or POST
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        #[arg(short = 't', long, default_value = DEFAULT_CONTENT_TYPE)]
        content_type: String,
        /// Inline body for POST
        #[arg(short, long, conflicts_with = "file")]
        data: Option<String>,
        /// File whose contents are the POST body
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Interactive client
    Shell,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve {
            listen,
            public_dir,
            receive_dir,
        } => {
            if let Some(listen) = listen {
                cfg.server.listen_addr = listen;
            }
            if let Some(public_dir) = public_dir {
                cfg.server.public_dir = public_dir;
            }
            if let Some(receive_dir) = receive_dir {
                cfg.server.receive_dir = receive_dir;
            }
            serve(cfg).await
        }
        Commands::Fetch {
            url,
            method,
            content_type,
            data,
            file,
        } => fetch(cfg, &url, &method, content_type, data, file).await,
        Commands::Shell => {
            let client = HttpClient::new(cfg.client);
            shell::run(&client).await
        }
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let resolver = FsResolver::from_config(&cfg.server);
    resolver
        .ensure_receive_dir()
        .with_context(|| format!("failed to create {}", resolver.receive_dir().display()))?;

    let server = Server::bind(cfg.server, Arc::new(resolver))?;
    let handle = server.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    tokio::task::spawn_blocking(move || handle.shutdown()).await?;
    Ok(())
}

async fn fetch(
    cfg: Config,
    url: &str,
    method: &str,
    content_type: String,
    data: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = HttpClient::new(cfg.client);
    let target = Target::parse(url, client.config().default_port)?;

    let exchange = match method.to_ascii_uppercase().as_str() {
        "GET" => Exchange::get(target),
        "POST" => {
            let body = match (data, file) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => Vec::new(),
            };
            Exchange::post(target, Payload::new(content_type, body))
        }
        other => anyhow::bail!("unsupported method {other}"),
    };

    let outcome = client.exchange(exchange).await?;
    println!("{}", shell::describe(&outcome));
    client.close_all();
    Ok(())
}
