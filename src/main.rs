use std::path::Path;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use stickerpack::cli::CliOptions;
use stickerpack::config::{PipelineConfig, setup_logging};
use stickerpack::constants::OUTPUT_DIR;
use stickerpack::fonts::FontBook;
use stickerpack::gemini::GeminiClient;
use stickerpack::model::{ReferenceImage, Theme};
use stickerpack::orchestrator::{CancelFlag, Orchestrator, ProgressEvent, SlotState, render_local};
use stickerpack::output::write_batch;
use stickerpack::planner::Planner;
use stickerpack::synth::Synthesizer;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = CliOptions::parse();

    if setup_logging(cli.debug).is_err() {
        std::process::exit(1);
    }

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: CliOptions) -> Result<()> {
    let config = PipelineConfig::from(&cli);
    let mut theme = Theme::new(cli.theme.trim());
    if theme.text.is_empty() {
        return Err(anyhow!("Theme must not be empty"));
    }
    theme.character = cli.character.clone();
    if let Some(path) = cli.reference_image.as_deref() {
        theme.reference_image = Some(read_reference_image(path)?);
    }

    let fonts = FontBook::load(config.font_path.as_deref());
    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_progress(rx));

    let batch = if config.offline {
        info!("Offline mode, rendering placeholders only");
        render_local(&theme, config.sticker_count, &fonts, Some(&tx))
    } else {
        let api_key = cli
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("An API key is required, set --api-key or GEMINI_API_KEY"))?;
        let mut client = GeminiClient::new(&config, api_key);
        if let Some(dir) = cli.debug_dir.as_deref() {
            client = client.with_debug_dir(dir);
        }

        let cancel = CancelFlag::default();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the current slot then stopping");
                on_ctrl_c.cancel();
            }
        });

        let orchestrator = Orchestrator::new(
            Planner::new(client.clone(), config.retry, config.params),
            Synthesizer::new(client, config.retry),
            fonts,
        )
        .with_progress(tx.clone())
        .with_cancel(cancel);
        orchestrator
            .run(&theme, config.sticker_count)
            .await
            .context("Failed to plan the sticker set")?
    };
    drop(tx);
    if let Err(err) = reporter.await {
        warn!("Progress reporter stopped: {err}");
    }

    let out_dir = cli.out_dir.clone().unwrap_or_else(|| {
        OUTPUT_DIR.join(chrono::Local::now().format("%Y%m%d-%H%M%S").to_string())
    });
    let paths = write_batch(&out_dir, &batch)
        .with_context(|| format!("Failed to write stickers to {}", out_dir.display()))?;

    if batch.fallback_count() > 0 {
        warn!(
            "{} of {} images are placeholders",
            batch.fallback_count(),
            batch.assets.len()
        );
    }
    if batch.cancelled {
        warn!("Run was cancelled, remaining slots were rendered locally");
    }
    for spec in &batch.specs {
        info!("{} | {}", spec.text, spec.description);
    }
    info!("Wrote {} files to {}", paths.len(), out_dir.display());
    Ok(())
}

fn read_reference_image(path: &Path) -> Result<ReferenceImage> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read reference image {}", path.display()))?;
    let format = image::guess_format(&data)
        .with_context(|| format!("{} is not a recognised image", path.display()))?;
    Ok(ReferenceImage {
        mime_type: format.to_mime_type().to_string(),
        data,
    })
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<ProgressEvent>) {
    while let Some(event) = rx.recv().await {
        let (n, total, role) = (event.slot + 1, event.total, event.role);
        match event.state {
            SlotState::Synthesizing => info!("[{n}/{total}] Rendering {role}"),
            SlotState::Fallback => warn!("[{n}/{total}] Using placeholder for {role}"),
            SlotState::Done => info!("[{n}/{total}] {role} done"),
            SlotState::Pending | SlotState::PostProcessing => {}
        }
    }
}
