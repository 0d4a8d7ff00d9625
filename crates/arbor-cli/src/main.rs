use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arbor_chat::{ChatSession, StreamAggregator};
use arbor_cli::{config::Config, repl::Repl};
use arbor_llm::{ChatClient, OpenAIClient};
use arbor_persist::{ChatStore, JsonFileBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(model = %config.llm.model, base_url = %config.llm.base_url, "Starting arbor");

    let openai = config.openai_config();
    if !openai.has_credentials() {
        tracing::warn!("OPENAI_API_KEY is not set, replies will fail until it is");
    }
    let client: Arc<dyn ChatClient> = Arc::new(OpenAIClient::from_config(openai)?);

    // Open chat history
    let path = config.storage_path()?;
    let store = ChatStore::open(JsonFileBackend::new(&path))
        .with_context(|| format!("Failed to open chat history at {}", path.display()))?;
    tracing::info!(path = %path.display(), chats = store.len(), "Chat history loaded");

    let mut aggregator =
        StreamAggregator::new(client, config.llm.model.clone()).with_options(config.chat_options());
    if let Some(prompt) = &config.llm.system_prompt {
        aggregator = aggregator.with_system_prompt(prompt.clone());
    }

    Repl::new(ChatSession::new(store, aggregator)).run().await
}

/// Logs go to stderr so the transcript on stdout stays readable
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }
}
