use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use voicedesk::{create_router, session, AppState, Config, VoiceSession};

/// voicedesk - voice chat session client
#[derive(Parser)]
#[command(name = "voicedesk", version, about)]
struct Cli {
    /// Config file path, without extension
    #[arg(short, long, default_value = "config/voicedesk")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the session over HTTP (default)
    Serve,
    /// Drive the session from the terminal
    Repl {
        /// Connect before reading input
        #[arg(long)]
        connect: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Voice endpoint: {}", cfg.voice.endpoint);

    let voice_session = VoiceSession::from_config(&cfg).context("Failed to build voice session")?;
    let (handle, driver) = session::spawn(voice_session);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            info!("HTTP server listening on {}", addr);

            let app = create_router(AppState::new(handle.clone()));
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutting down");
                })
                .await?;

            handle.shutdown().await;
        }
        Command::Repl { connect } => {
            if connect {
                if let Err(e) = handle.connect().await {
                    println!("! {}", e);
                }
            }
            voicedesk::repl::run(handle.clone()).await?;
        }
    }

    drop(handle);
    driver.await?;
    Ok(())
}
