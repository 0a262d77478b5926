use anyhow::Result;
use clap::{Parser, Subcommand};
use sitebot::config::Config;
use sitebot::pipeline::{CollectingSink, InboundMessage, RequestHandler};
use sitebot::server::{create_router, AppState, SharedState};
use sitebot::telegram::{run_polling, TelegramClient};
use sitebot::telemetry::{init_tracing, with_bootstrap_logging};
use sitebot::PageOutcome;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sitebot", version, about = "Answers questions from the content of configured web pages")]
struct Cli {
    /// Config file (defaults to $SITEBOT_CONFIG, then ~/.config/sitebot/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot with long polling
    Poll,
    /// Serve the HTTP message API
    Serve,
    /// Answer one question and print every reply
    Ask {
        question: String,
    },
    /// Fetch the configured sources and print the resulting context
    Gather,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = with_bootstrap_logging(|| Config::load_auto(cli.config.as_deref()))?;
    init_tracing(&config.logging)?;
    info!("Starting sitebot");

    config.validate()?;
    let handler = Arc::new(RequestHandler::from_config(&config)?);

    match cli.command {
        Commands::Poll => {
            let token = config.require_telegram_token()?;
            let client = Arc::new(TelegramClient::new(&config.telegram, token)?);
            info!("Polling Telegram for updates");
            run_polling(client, handler, &config.telegram).await
        }
        Commands::Serve => {
            let listener_addr = format!("{}:{}", config.server.host, config.server.port);
            let state: SharedState = Arc::new(AppState { handler });
            let app = create_router(state);

            let listener = TcpListener::bind(&listener_addr).await?;
            info!("Server listening on http://{}", listener_addr);

            axum::serve(listener, app).await.map_err(|e| {
                error!("Server error: {}", e);
                e.into()
            })
        }
        Commands::Ask { question } => {
            let sink = CollectingSink::new();
            let message = InboundMessage {
                user_id: 0,
                text: question,
            };
            handler.handle(&message, &sink).await;
            for reply in sink.into_replies() {
                println!("{}", reply);
            }
            Ok(())
        }
        Commands::Gather => {
            let gatherer = handler.gatherer();
            let outcomes = gatherer.gather_pages().await;
            for (url, outcome) in gatherer.urls().iter().zip(&outcomes) {
                match outcome {
                    PageOutcome::Extracted(text) => {
                        println!("ok     {} ({} chars)", url, text.chars().count())
                    }
                    PageOutcome::Failed(reason) => println!("failed {} ({})", url, reason),
                }
            }
            println!();
            println!("{}", gatherer.gather().await);
            Ok(())
        }
    }
}
