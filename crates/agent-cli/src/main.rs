//! wiki-math-agent console
//!
//! Interactive question-answering loop. The agent can look things up on
//! Wikipedia and hand arithmetic to the Calculator tool; every turn sees the
//! full conversation so far.

mod console;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{
    credential::{load_credential, OPENAI_API_KEY},
    memory::ConversationMemory,
    session::{Session, ShutdownSignal},
    tool::ToolRegistry,
    Agent, CalculatorTool, LlmProvider,
};
use agent_runtime::{
    openai::agent_config_from_env, OpenAiConfig, OpenAiProvider, WikipediaConfig, WikipediaTool,
};

use crate::console::RustylineSource;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so they never interleave with answers
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let credential = load_credential(OPENAI_API_KEY)?;
    let config = agent_config_from_env()?;

    // Initialize LLM provider
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::from_config(OpenAiConfig::from_env(credential)?)?);

    // Verify the endpoint and key; a failure here is reported but not fatal
    match provider.health_check().await {
        Ok(true) => tracing::info!(provider = provider.name(), model = %config.generation.model, "✓ Connected to LLM provider"),
        Ok(false) => tracing::warn!(provider = provider.name(), "⚠ LLM provider rejected the health check; questions will fail"),
        Err(e) => tracing::warn!(provider = provider.name(), error = %e, "⚠ LLM provider not reachable; questions will fail"),
    }

    // Initialize tools
    let mut tools = ToolRegistry::new();
    tools.register(WikipediaTool::from_config(WikipediaConfig::from_env()?)?)?;
    tools.register(CalculatorTool::new(Arc::clone(&provider), &config.generation))?;

    tracing::info!("Registered {} tools:", tools.len());
    for schema in tools.schemas() {
        tracing::info!("  - {}: {}", schema.name, schema.description);
    }

    let agent = Agent::new(provider, config);
    let memory = ConversationMemory::from_env()?;
    let mut session = Session::new(Arc::new(agent), Arc::new(tools), memory);
    let mut input = RustylineSource::spawn()?;

    // Ctrl+C at the prompt stops at once; during a turn, once the answer is printed
    let shutdown = ShutdownSignal::new();
    let watcher = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Interrupt received");
            watcher.trigger();
        }
    });
    tokio::task::yield_now().await;

    println!("\nAgent ready. Type your question (Ctrl+C to exit):\n");

    let mut stdout = std::io::stdout();
    session.run_loop(&mut input, &mut stdout, &shutdown).await?;

    Ok(())
}
