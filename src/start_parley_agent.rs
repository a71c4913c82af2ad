//! Startup helpers for the agent.
//!
//! Wires the HTTP capability clients, the stores and the console chat
//! adapter, spawns the background sweeps, then feeds stdin lines into the
//! pipeline as messages from a single local conversation.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;

use crate::agent::cache::MediaCache;
use crate::agent::config::AgentConfig;
use crate::agent::history::HistoryNormalizer;
use crate::agent::orchestrator::Orchestrator;
use crate::agent::tools::ToolExecutor;
use crate::agent::types::PlatformMessage;
use crate::agent::AgentService;
use crate::providers::{
    BraveSearchClient, ChatPlatform, ConsolePlatform, OcrProvider, OcrSpaceClient,
    OpenAiChatClient, VisionChatClient, WhisperClient,
};
use crate::store::{ConsentStore, ReminderStore, UsageStats};

/// OCR.space parse endpoint.
const OCR_ENDPOINT: &str = "https://api.ocr.space/parse/image";

/// Conversation id used for the console session.
const CONSOLE_CONVERSATION: &str = "console";

/// Run the agent against stdin/stdout.
///
/// # Returns
/// `ExitCode::SUCCESS` when stdin closes, `1` on a startup failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting parley-agent v{}", env!("CARGO_PKG_VERSION"));

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_console()) {
        tracing::error!("Agent error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

async fn run_console() -> anyhow::Result<()> {
    let api_key = std::env::var("PARLEY_API_KEY")
        .map_err(|_| anyhow::anyhow!("PARLEY_API_KEY is required"))?;
    let base_url = env_or("PARLEY_OPENAI_BASE_URL", "https://api.groq.com/openai/v1");
    let whisper_model = env_or("PARLEY_WHISPER_MODEL", "whisper-large-v3");
    let vision_model = env_or("PARLEY_VISION_MODEL", "llama-3.2-90b-vision-preview");
    let data_dir = std::path::PathBuf::from(env_or("PARLEY_DATA_DIR", "./data"));
    std::fs::create_dir_all(&data_dir)?;

    let brave_key = std::env::var("PARLEY_BRAVE_API_KEY").unwrap_or_else(|_| {
        tracing::warn!("PARLEY_BRAVE_API_KEY not set, web search will fail");
        String::new()
    });

    let mut config = AgentConfig::default();
    config.cache.snapshot_path = Some(data_dir.join("media_cache.json"));

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    let inference = Arc::new(OpenAiChatClient::new(client.clone(), &base_url, &api_key));
    let transcriber = Arc::new(WhisperClient::new(
        client.clone(),
        &base_url,
        &api_key,
        whisper_model,
    ));
    let vision = Arc::new(VisionChatClient::new(
        client.clone(),
        &base_url,
        &api_key,
        vision_model,
    ));
    let ocr = std::env::var("PARLEY_OCR_API_KEY").ok().map(|key| {
        Arc::new(OcrSpaceClient::new(client.clone(), OCR_ENDPOINT, key)) as Arc<dyn OcrProvider>
    });
    let search = Arc::new(BraveSearchClient::new(client, brave_key));

    let cache = Arc::new(MediaCache::new(config.cache.clone()));
    let _sweeper = cache.spawn_sweeper();

    let platform = Arc::new(ConsolePlatform::new());
    let reminders = Arc::new(ReminderStore::open(data_dir.join("reminders.json")));
    let _checker =
        reminders.spawn_checker(Arc::clone(&platform) as Arc<dyn ChatPlatform>);
    let consent = Arc::new(ConsentStore::open(data_dir.join("consent.json")));
    let stats = Arc::new(UsageStats::open(data_dir.join("stats.json")));

    let normalizer = HistoryNormalizer::new(Arc::clone(&cache), transcriber, vision, ocr, None);
    let executor = ToolExecutor::new(
        search,
        None,
        Some(Arc::clone(&reminders)),
        config.search_stagger,
    );
    let orchestrator = Orchestrator::new(inference, executor, &config);
    let service = AgentService::new(
        config,
        Arc::clone(&platform) as Arc<dyn ChatPlatform>,
        normalizer,
        orchestrator,
        consent,
        stats,
    )
    .with_reminder_store(Arc::clone(&reminders));

    tracing::info!("Ready. Type a message; Ctrl-D exits.");
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let body = line.trim();
        if body.is_empty() {
            continue;
        }
        let message = PlatformMessage::text(CONSOLE_CONVERSATION, "console-user", body);
        platform.record_incoming(message.clone());
        if !service.handle_message(message).await {
            tracing::debug!("message dropped by the admission guard");
        }
    }

    Ok(())
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
