use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use livescribe_ai::GeminiLlm;
use livescribe_audio::transcription::Dispatcher;
use livescribe_core::keys::ApiKeyStore;
use livescribe_server::cli::AudioInputMode;
use livescribe_server::{
    serve, spawn_background_tasks, spawn_pipeline, AppState, Cli, SilentSource, StdinPcmSource,
};

/// How long shutdown waits for the dispatcher to drain queued batches.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.to_config()?;

    let file_appender = tracing_appender::rolling::daily(&cli.log_dir, "livescribe.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&cli.log_filter).context("invalid log filter")?)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    // Missing keys are a startup refusal; rotation problems later only fail
    // individual requests.
    let keys = ApiKeyStore::open(&cli.env_file)?;
    let loaded = keys.load()?;
    if loaded.openai_key.is_empty() {
        bail!(
            "OPENAI_API_KEY missing from {} - set it before starting",
            cli.env_file.display()
        );
    }
    if loaded.gemini_key.is_empty() {
        bail!(
            "GOOGLE_API_KEY missing from {} - set it before starting",
            cli.env_file.display()
        );
    }

    let llm = Arc::new(GeminiLlm::new(&config.llm, loaded.gemini_key.clone())?);
    let dispatcher = Arc::new(Dispatcher::from_config(
        config.transcription.clone(),
        config.segmenter.sample_rate,
        &loaded.openai_key,
        &loaded.gemini_key,
    )?);

    let state = AppState::new(config, llm, keys);
    let shutdown = CancellationToken::new();

    let source: Box<dyn livescribe_audio::SampleSource> = match cli.audio {
        AudioInputMode::Stdin => Box::new(StdinPcmSource::new(
            state.config.audio.sample_rate,
            state.config.audio.channels,
            state.config.audio.chunk_size,
        )),
        AudioInputMode::None => Box::new(SilentSource),
    };

    let pipeline = spawn_pipeline(state.clone(), source, dispatcher, shutdown.clone());
    let background = spawn_background_tasks(state.clone(), shutdown.clone());
    let server = tokio::spawn(serve(state.clone(), shutdown.clone()));

    info!("livescribe running; recording starts disabled until a client enables it");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();

    // Pipeline tasks force-flush and drain within the grace period
    let drain = async {
        for task in pipeline.tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("pipeline did not drain within grace period");
    }
    for task in background {
        task.abort();
    }
    match server.await {
        Ok(result) => result?,
        Err(e) => warn!("server task failed: {e}"),
    }

    info!("livescribe stopped");
    Ok(())
}
