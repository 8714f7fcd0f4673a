//! Minimal wiring demo: open the store, build the engine against an
//! OpenAI-compatible endpoint, and chat on stdin.
//!
//! ```text
//! TERRACE_GENERATOR_URL=http://localhost:11434/v1/chat/completions \
//!     cargo run -p terrace-engine --example terrace_chat -- arsenal
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use terrace_config::AppConfig;
use terrace_engine::{ChatEngine, ChatRequest, EngineEvent};
use terrace_llm::HttpGenerator;
use terrace_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load_from("config/terrace.toml")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level)),
        )
        .init();

    let persona_id = std::env::args().nth(1);

    let store = Arc::new(Store::open(&config.store.db_path)?);
    let generator = Arc::new(HttpGenerator::from_config(&config.generator)?);
    let engine = ChatEngine::new(config, store, generator)?;

    let stdin = io::stdin();
    let mut conversation_id: Option<String> = None;
    print!("> ");
    io::stdout().flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }

        let (tx, mut rx) = mpsc::channel(64);
        let request = ChatRequest {
            message: line,
            conversation_id: conversation_id.clone(),
            persona_id: persona_id.clone(),
        };
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let EngineEvent::Chunk { text } = event {
                    print!("{text}");
                    let _ = io::stdout().flush();
                }
            }
        });

        match engine
            .chat_stream(request, CancellationToken::new(), tx)
            .await
        {
            Ok(response) => {
                conversation_id = Some(response.conversation_id.clone());
                println!(
                    "\n  [confidence {:.2}, {} sources, trust {}]",
                    response.confidence,
                    response.sources.len(),
                    response.metadata.trust_level
                );
            }
            Err(err) => println!("\nerror: {err}"),
        }
        let _ = printer.await;
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}
