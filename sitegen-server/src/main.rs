mod doctor;
mod generate;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sitegen", version, about = "Generate websites from prompts, images and PDFs")]
struct Cli {
    /// Settings file (defaults to ~/.sitegen/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Check credentials and reachability of every configured provider
    Doctor,

    /// Generate a website from a prompt and print the streamed response
    Generate {
        /// What the website should be about
        prompt: String,

        /// Write the extracted HTML to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitegen=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = sitegen::Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port, host } => {
            server::run_server(settings, &host, port).await?;
        }
        Commands::Doctor => {
            doctor::run_doctor(settings).await?;
        }
        Commands::Generate { prompt, out } => {
            generate::run_generate(settings, &prompt, out.as_deref()).await?;
        }
    }

    Ok(())
}
