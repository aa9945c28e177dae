use clap::{Parser, Subcommand};
use edge_p2p::core::config::{load_file, process_env};
use edge_p2p::network::RpcClient;
use edge_p2p::utils::setup_logging;
use edge_p2p::{
    AgentConfig, NodeAddress, P2PError, PeerAgent, RegistryClient, RegistryConfig, RegistryNode,
    Result,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "edge-p2p")]
#[command(about = "A minimal P2P file sharing overlay with an edge registry")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the edge registry
    Registry {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Seconds between liveness sweeps
        #[arg(long)]
        sweep_interval: Option<u64>,
    },
    /// Run a regular node that shares a directory
    Node {
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Address to bind and advertise
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory to share files from
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Registry address (host:port)
        #[arg(short, long)]
        registry: Option<NodeAddress>,
        /// Seconds between registration refreshes
        #[arg(long)]
        refresh_interval: Option<u64>,
        /// Files to fetch from peers once registered
        #[arg(short, long)]
        fetch: Vec<String>,
    },
    /// Ask the registry where a file can be fetched from
    Locate {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        registry: NodeAddress,
        filename: String,
    },
    /// Ask the registry which nodes hold a file
    Search {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        registry: NodeAddress,
        filename: String,
    },
    /// List every file known to the registry
    List {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        registry: NodeAddress,
        /// Group by node instead of listing files
        #[arg(long)]
        nodes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Registry {
            config,
            host,
            port,
            sweep_interval,
        } => {
            let mut config: RegistryConfig = match config {
                Some(path) => load_file(&path)?,
                None => RegistryConfig::default(),
            };
            config.apply_env(process_env)?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(secs) = sweep_interval {
                config.sweep_interval_secs = secs;
            }

            let node = RegistryNode::bind(config).await?;
            node.run().await?;
        }
        Commands::Node {
            config,
            host,
            port,
            dir,
            registry,
            refresh_interval,
            fetch,
        } => {
            let mut config: AgentConfig = match config {
                Some(path) => load_file(&path)?,
                None => AgentConfig::default(),
            };
            config.apply_env(process_env)?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = dir {
                config.shared_dir = dir;
            }
            if let Some(registry) = registry {
                config.registry_host = registry.host;
                config.registry_port = registry.port;
            }
            if let Some(secs) = refresh_interval {
                config.refresh_interval_secs = secs;
            }

            let agent = PeerAgent::new(config).await?;
            agent.start().await?;

            for filename in &fetch {
                match agent.fetch(filename).await {
                    Ok(outcome) => println!(
                        "File '{}' downloaded from {} ({} bytes)",
                        outcome.filename, outcome.source, outcome.size
                    ),
                    Err(P2PError::NotFound(_)) => {
                        println!("File '{}' not found in the network.", filename)
                    }
                    Err(e) => println!("Failed to fetch '{}': {}", filename, e),
                }
            }

            tokio::signal::ctrl_c().await?;
            agent.shutdown().await;
        }
        Commands::Locate { registry, filename } => {
            let locations = client(registry).locate_file(&filename).await?;
            if locations.is_empty() {
                println!("File '{}' not found in the network.", filename);
            }
            for location in locations {
                println!("{}  {}", location.address, location.digest);
            }
        }
        Commands::Search { registry, filename } => {
            let addresses = client(registry).search(&filename).await?;
            if addresses.is_empty() {
                println!("File '{}' not found in the network.", filename);
            }
            for address in addresses {
                println!("{}", address);
            }
        }
        Commands::List { registry, nodes } => {
            let client = client(registry);
            if nodes {
                for node in client.list_nodes().await? {
                    println!("{} ({} files)", node.address, node.files.len());
                    for filename in node.files.keys() {
                        println!("  - {}", filename);
                    }
                }
            } else {
                let files = client.list_files().await?;
                if files.is_empty() {
                    println!("No files available.");
                }
                for (i, file) in files.iter().enumerate() {
                    println!("{}. {} available at {}", i + 1, file.filename, file.address);
                }
            }
        }
    }

    Ok(())
}

fn client(registry: NodeAddress) -> RegistryClient {
    RegistryClient::new(
        registry,
        RpcClient::new(
            Duration::from_secs(5),
            edge_p2p::network::rpc::DEFAULT_MAX_MESSAGE_SIZE,
        ),
    )
}
