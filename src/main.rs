use anyhow::Context;
use clap::{Parser, Subcommand};
use cradle::{Config, DockerEngine, Service};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cradle")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run containers from declarative alias definitions")]
#[command(arg_required_else_help = true)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", default_value = "cradle.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create or reuse the alias container and start it
    Run {
        /// Alias name
        alias: String,
    },
    /// Stop the alias container
    Stop {
        /// Alias name
        alias: String,
    },
    /// List aliases with image and container status
    Ls,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cradle=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let engine = DockerEngine::new().await?;
    let service = Service::new(config, engine);

    tokio::select! {
        result = execute(&service, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            anyhow::bail!("interrupted")
        }
    }
}

async fn execute(service: &Service<DockerEngine>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run { alias } => {
            let result = service.run(&alias).await?;
            println!("{}", result.id);
            info!("Container {} for '{}'", result.outcome, alias);
            if result.attach {
                eprintln!("attach with: docker attach {}", result.id);
                if result.auto_remove {
                    eprintln!("the container is removed when it exits");
                }
            }
        }
        Commands::Stop { alias } => {
            let id = service.stop(&alias).await?;
            println!("{}", id);
        }
        Commands::Ls => {
            for status in service.statuses().await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    status.alias,
                    status.image_ref,
                    if status.image_present { "present" } else { "absent" },
                    status.container_name,
                    status.container_status,
                );
            }
        }
    }
    Ok(())
}
