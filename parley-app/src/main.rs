//! Parley server entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use parley_app::settings::{default_settings_path, load_settings, save_settings, AppSettings};
use parley_app::state::AppState;
use parley_app::storage::LocalStore;
use parley_core::topics::topic_catalog;
use parley_core::{
    CannedGenerator, GeminiConfig, GeminiGenerator, GeneratorHandle, ModelHandle,
    OpenAiTranscriber, OpenAiTranscriberConfig, PracticeEngine, StubModel,
};
use tracing::{info, warn};

fn build_model(settings: &AppSettings) -> ModelHandle {
    match &settings.openai_api_key {
        Some(key) => {
            let mut cfg = OpenAiTranscriberConfig::new(key.clone());
            cfg.model = settings.openai_transcribe_model.clone();
            cfg.timeout = Duration::from_secs(settings.transcription_timeout_secs);
            info!(model = %cfg.model, "using OpenAI transcription");
            ModelHandle::new(OpenAiTranscriber::new(cfg))
        }
        None => {
            warn!("no OpenAI API key configured, spoken turns will be unintelligible (StubModel)");
            ModelHandle::new(StubModel::new())
        }
    }
}

fn build_generator(settings: &AppSettings) -> GeneratorHandle {
    match &settings.gemini_api_key {
        Some(key) => {
            let mut cfg = GeminiConfig::new(key.clone());
            cfg.model = settings.gemini_model.clone();
            cfg.timeout = Duration::from_secs(settings.generation_timeout_secs);
            info!(model = %cfg.model, "using Gemini dialogue generation");
            GeneratorHandle::new(GeminiGenerator::new(cfg))
        }
        None => {
            warn!("no Gemini API key configured, using the built-in dialogue library");
            GeneratorHandle::new(CannedGenerator)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Environment + tracing ─────────────────────────────────────────────
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("failed to load .env: {e}");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("parley=info,tower_http=info")),
        )
        .init();

    info!("Parley starting");

    let settings_path = std::env::var_os("PARLEY_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if !settings_path.exists() {
        // Written before env overrides so keys from the environment stay out of the file.
        match save_settings(&settings_path, &settings) {
            Ok(()) => info!(settings_path = ?settings_path, "default settings written"),
            Err(e) => warn!("failed to write default settings: {e}"),
        }
    }
    settings.apply_env_overrides();
    info!(
        settings_path = ?settings_path,
        bind_addr = %settings.bind_addr,
        acceptance_threshold = settings.acceptance_threshold,
        medium_unlock = settings.medium_unlock,
        hard_unlock = settings.hard_unlock,
        "settings loaded"
    );

    // ── Engine ────────────────────────────────────────────────────────────
    let engine = PracticeEngine::new(
        settings.engine_config(),
        build_model(&settings),
        build_generator(&settings),
    );
    if let Err(e) = engine.warm_up() {
        tracing::error!("model warm-up failed: {e}");
    }

    // ── Storage ───────────────────────────────────────────────────────────
    let db_path = settings
        .db_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(LocalStore::default_db_path);
    let store = LocalStore::new(db_path.clone())
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    match store.prune_messages(settings.retention_days) {
        Ok(0) => {}
        Ok(pruned) => info!(pruned, "old messages pruned"),
        Err(e) => warn!("message prune failed at startup: {e}"),
    }
    match store.seed_topics(&topic_catalog()) {
        Ok(report) => info!(
            created = report.created,
            updated = report.updated,
            unchanged = report.unchanged,
            "topic catalog seeded"
        ),
        Err(e) => warn!("topic seeding failed: {e}"),
    }

    // ── HTTP ──────────────────────────────────────────────────────────────
    let addr = settings.bind_addr.clone();
    let state = AppState::new(engine, store, settings);
    parley_app::serve(state, &addr).await
}
