use std::sync::Arc;

use airborne_dispatch::Dispatcher;
use airborne_provider_core::registry::ProviderRegistry;
use airborne_providers::anthropic::AnthropicProvider;
use airborne_providers::gemini::GeminiProvider;
use airborne_providers::openai_compat::{
    OpenAiCompatProvider, CEREBRAS, DEEPINFRA, DEEPSEEK, FIREWORKS, GROK, MISTRAL, OPENROUTER,
    PERPLEXITY,
};
use airborne_providers::openai_native::OpenAiResponsesProvider;
use airborne_rag::client::{HttpEmbedderClient, HttpVectorStoreClient};
use airborne_rag::RagService;
use airborne_tenant::TenantStore;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Wires up and owns the long-lived state for the gateway core. The RPC/HTTP
/// surface that fronts this is out of scope here; this binary only proves the
/// wiring and keeps the tenant snapshot fresh on SIGHUP.
#[derive(Parser)]
#[command(name = "airborne")]
struct Cli {
    #[arg(long, env = "AIRBORNE_TENANT_DIR")]
    tenant_dir: String,

    #[arg(long, env = "AIRBORNE_DEFAULT_PROVIDER")]
    default_provider: Option<String>,

    #[arg(long, env = "AIRBORNE_RAG_EMBEDDER_URL")]
    rag_embedder_url: Option<String>,

    #[arg(long, env = "AIRBORNE_RAG_EMBEDDER_MODEL", default_value = "nomic-embed-text")]
    rag_embedder_model: String,

    #[arg(long, env = "AIRBORNE_RAG_VECTOR_STORE_URL")]
    rag_vector_store_url: Option<String>,

    #[arg(long, env = "AIRBORNE_RAG_COLLECTION", default_value = "airborne")]
    rag_collection: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let tenants = TenantStore::load(&cli.tenant_dir)?;
    info!(dir = %cli.tenant_dir, "loaded tenant snapshot");

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(AnthropicProvider::new()));
    registry.register(Arc::new(OpenAiResponsesProvider::new()));
    registry.register(Arc::new(GeminiProvider::new()));
    for profile in [DEEPSEEK, GROK, MISTRAL, CEREBRAS, FIREWORKS, PERPLEXITY, OPENROUTER, DEEPINFRA] {
        registry.register(Arc::new(OpenAiCompatProvider::new(profile)));
    }

    let mut dispatcher = Dispatcher::new(registry, tenants);
    if let Some(provider) = &cli.default_provider {
        dispatcher = dispatcher.with_default_provider(provider.clone());
    }
    if let (Some(embedder_url), Some(store_url)) = (&cli.rag_embedder_url, &cli.rag_vector_store_url) {
        let embedder = Arc::new(HttpEmbedderClient::new(embedder_url.clone(), cli.rag_embedder_model.clone()));
        let vector_store = Arc::new(HttpVectorStoreClient::new(store_url.clone(), cli.rag_collection.clone()));
        dispatcher = dispatcher.with_rag(Arc::new(RagService::new(embedder, vector_store)));
        info!("retrieval-augmented generation enabled");
    }
    let dispatcher = Arc::new(dispatcher);

    spawn_reload_on_sighup(dispatcher.clone());

    info!(providers = ?dispatcher_provider_names(), "airborne core ready");
    // The gRPC/HTTP/CLI surface that accepts calls and forwards them to
    // `dispatcher.generate_reply`/`generate_reply_stream` lives outside this
    // binary's scope; hold the runtime open so background reload keeps working.
    std::future::pending::<()>().await;
    Ok(())
}

fn dispatcher_provider_names() -> &'static [&'static str] {
    &[
        "anthropic",
        "openai",
        "gemini",
        "deepseek",
        "grok",
        "mistral",
        "cerebras",
        "fireworks",
        "perplexity",
        "openrouter",
        "deepinfra",
    ]
}

fn spawn_reload_on_sighup(dispatcher: Arc<Dispatcher>) {
    tokio::spawn(async move {
        let mut stream = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGHUP handler: {e}");
                return;
            }
        };
        loop {
            stream.recv().await;
            match dispatcher.reload_tenants() {
                Ok(()) => info!("tenant snapshot reloaded on SIGHUP"),
                Err(e) => error!("SIGHUP reload failed, keeping previous snapshot: {e}"),
            }
        }
    });
}
