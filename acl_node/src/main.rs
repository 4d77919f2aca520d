use acl_node::config::Config;
use acl_node::logging::init_logging;
use acl_node::Node;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the node until interrupted
    Run,
    /// Write a default configuration file
    GenerateConfig {
        /// Where to write the file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => {
            let config = match &cli.config {
                Some(path) => Config::from_file(path)
                    .with_context(|| format!("loading configuration from {}", path.display()))?,
                None => Config::default(),
            };
            init_logging(&config.logging)?;
            if let Some(path) = &cli.config {
                info!("Loaded configuration from {}", path.display());
            }

            let node = Node::start(config).await?;
            if let Some(root) = node.root_token() {
                // Printed once for the operator; never written to the log
                println!("Root token accessor: {}", root.accessor_id);
                println!("Root token secret:   {}", root.secret_id);
            }

            info!("ACL node running, press Ctrl-C to stop");
            node.run_until_ctrl_c().await?;
        }
        Command::GenerateConfig { path } => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            Config::default()
                .to_file(&path)
                .with_context(|| format!("writing configuration to {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}
