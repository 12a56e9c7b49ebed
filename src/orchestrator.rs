//! Runs a whole batch: plan once, then render and post-process every slot
//! in a fixed order.
//!
//! A slot never fails. Remote trouble moves it through `Fallback` instead,
//! so the only error a run can return is the initial planning failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbaImage;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::backend::{ImageBackend, TextBackend};
use crate::error::PlanningError;
use crate::fonts::FontBook;
use crate::model::{AssetRole, GenerationResult, ImageAsset, StickerSpec, StyleDescription, Theme};
use crate::planner::{Planner, default_style, placeholder_specs};
use crate::postprocess::{assemble_grid, composite_text, remove_background_local, resize};
use crate::synth::{Synthesizer, fallback};

/// Where a slot is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SlotState {
    /// Planned, not started
    Pending,
    /// Remote render in flight
    Synthesizing,
    /// Remote render replaced by a placeholder
    Fallback,
    /// Background removal, captions, resizing
    PostProcessing,
    /// Finished
    Done,
}

/// One slot state transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressEvent {
    /// Zero-based position in slot order
    pub slot: usize,
    /// Number of slots in the batch
    pub total: usize,
    /// Which asset the slot produces
    pub role: AssetRole,
    /// New state
    pub state: SlotState,
}

/// Cooperative cancellation shared with the caller.
///
/// Checked before each planning request and between slots; an in-flight
/// remote call is left to finish or time out.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once [`CancelFlag::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Finished set handed to the packaging step.
#[derive(Clone, Debug)]
pub struct Batch {
    /// One result per slot: main, tab, then stickers 1..N
    pub assets: Vec<GenerationResult>,
    /// Grid stickers laid out on one sheet
    pub sheet: ImageAsset,
    /// Sticker specs, in grid order
    pub specs: Vec<StickerSpec>,
    /// Art direction used for every slot
    pub style: StyleDescription,
    /// True when the run was cancelled part way
    pub cancelled: bool,
}

impl Batch {
    /// Number of slots rendered by the placeholder renderer.
    pub fn fallback_count(&self) -> usize {
        self.assets.iter().filter(|result| result.is_fallback()).count()
    }

    /// Grid sticker assets in order.
    pub fn grid_stickers(&self) -> impl Iterator<Item = &ImageAsset> {
        self.assets
            .iter()
            .map(GenerationResult::asset)
            .filter(|asset| matches!(asset.role, AssetRole::GridSticker(_)))
    }
}

/// Slot order: main image, tab image, grid stickers 1..N.
pub fn slots(theme: &Theme, specs: &[StickerSpec]) -> Vec<(AssetRole, StickerSpec)> {
    let subject = theme.character.as_deref().unwrap_or("the main character");
    let mut slots = vec![
        (
            AssetRole::MainImage,
            StickerSpec::new(
                format!("{subject} waving hello, cover art for the \"{}\" set", theme.text),
                "",
            ),
        ),
        (
            AssetRole::TabImage,
            StickerSpec::new(format!("Close-up of {subject}'s smiling face"), ""),
        ),
    ];
    slots.extend(
        specs
            .iter()
            .enumerate()
            .map(|(index, spec)| (AssetRole::GridSticker(index + 1), spec.clone())),
    );
    slots
}

/// Drives planner, synthesizer and post-processing for one batch.
pub struct Orchestrator<T, I> {
    planner: Planner<T>,
    synth: Synthesizer<I>,
    fonts: FontBook,
    progress: Option<UnboundedSender<ProgressEvent>>,
    cancel: CancelFlag,
}

impl<T: TextBackend, I: ImageBackend> Orchestrator<T, I> {
    /// Builds an orchestrator.
    pub fn new(planner: Planner<T>, synth: Synthesizer<I>, fonts: FontBook) -> Self {
        Self {
            planner,
            synth,
            fonts,
            progress: None,
            cancel: CancelFlag::default(),
        }
    }

    /// Sends slot transitions to `sender`.
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Uses a caller-held cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation flag for this orchestrator.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// The planner, for inspecting its backend.
    pub fn planner(&self) -> &Planner<T> {
        &self.planner
    }

    /// The synthesizer, for inspecting its backend.
    pub fn synthesizer(&self) -> &Synthesizer<I> {
        &self.synth
    }

    /// Plans and renders a full batch of `count` grid stickers.
    ///
    /// Fails only when the initial sticker-list request fails.
    pub async fn run(&self, theme: &Theme, count: usize) -> Result<Batch, PlanningError> {
        if self.cancel.is_cancelled() {
            info!("Cancelled before planning, rendering placeholders only");
            return Ok(self.render_cancelled(theme, count));
        }

        let style = self.planner.plan_style(theme).await;
        debug!("Style: {}", style.summary);
        if self.cancel.is_cancelled() {
            info!("Cancelled after style planning, rendering placeholders only");
            return Ok(self.render_cancelled(theme, count));
        }
        let specs = self.planner.plan_stickers(theme, &style, count).await?;
        info!("Planned {} stickers for \"{}\"", specs.len(), theme.text);

        let slots = slots(theme, &specs);
        let total = slots.len();
        for (slot, (role, _)) in slots.iter().enumerate() {
            emit(self.progress.as_ref(), slot, total, *role, SlotState::Pending);
        }

        let mut assets = Vec::with_capacity(total);
        let mut cancelled = false;
        for (slot, (role, spec)) in slots.iter().enumerate() {
            let role = *role;
            let result = if cancelled || self.cancel.is_cancelled() {
                if !cancelled {
                    warn!("Cancelled at {role}, remaining slots use placeholders");
                    cancelled = true;
                }
                fallback(theme, spec, role, &self.fonts)
            } else {
                emit(self.progress.as_ref(), slot, total, role, SlotState::Synthesizing);
                self.synth
                    .synthesize(theme, &style, spec, role, &self.fonts)
                    .await
            };
            if result.is_fallback() {
                emit(self.progress.as_ref(), slot, total, role, SlotState::Fallback);
            }
            emit(self.progress.as_ref(), slot, total, role, SlotState::PostProcessing);
            assets.push(post_process(result, spec, &style, &self.fonts));
            emit(self.progress.as_ref(), slot, total, role, SlotState::Done);
        }

        let batch = finish(assets, specs, style, cancelled);
        info!(
            "Batch complete: {} slots, {} placeholders",
            batch.assets.len(),
            batch.fallback_count()
        );
        Ok(batch)
    }

    fn render_cancelled(&self, theme: &Theme, count: usize) -> Batch {
        let mut batch = render_local(theme, count, &self.fonts, self.progress.as_ref());
        batch.cancelled = true;
        batch
    }
}

/// Offline preview batch: backfill specs, default style, placeholder art.
/// Makes no remote calls.
pub fn render_local(
    theme: &Theme,
    count: usize,
    fonts: &FontBook,
    progress: Option<&UnboundedSender<ProgressEvent>>,
) -> Batch {
    let specs = placeholder_specs(&theme.text, count);
    let style = default_style();
    let slots = slots(theme, &specs);
    let total = slots.len();
    let assets = slots
        .iter()
        .enumerate()
        .map(|(slot, (role, spec))| {
            emit(progress, slot, total, *role, SlotState::Fallback);
            let result = post_process(fallback(theme, spec, *role, fonts), spec, &style, fonts);
            emit(progress, slot, total, *role, SlotState::Done);
            result
        })
        .collect();
    finish(assets, specs, style, false)
}

/// Background removal and captions for remote renders, then an exact fit
/// to the role size.
fn post_process(
    result: GenerationResult,
    spec: &StickerSpec,
    style: &StyleDescription,
    fonts: &FontBook,
) -> GenerationResult {
    let role = result.asset().role;
    let (width, height) = role.dimensions();
    let generated = !result.is_fallback();
    let caption = generated && matches!(role, AssetRole::GridSticker(_)) && !spec.text.is_empty();
    result.map_pixels(|pixels| {
        let pixels = if generated {
            remove_background_local(&pixels)
        } else {
            pixels
        };
        let pixels = if caption {
            composite_text(pixels, &spec.text, &style.text_style, fonts)
        } else {
            pixels
        };
        if pixels.dimensions() == (width, height) {
            pixels
        } else {
            resize(&pixels, width, height)
        }
    })
}

fn finish(
    assets: Vec<GenerationResult>,
    specs: Vec<StickerSpec>,
    style: StyleDescription,
    cancelled: bool,
) -> Batch {
    let stickers: Vec<&RgbaImage> = assets
        .iter()
        .map(GenerationResult::asset)
        .filter(|asset| matches!(asset.role, AssetRole::GridSticker(_)))
        .map(|asset| &asset.pixels)
        .collect();
    let sheet = ImageAsset {
        role: AssetRole::GridSheet(stickers.len()),
        pixels: assemble_grid(stickers.into_iter()),
    };
    Batch {
        assets,
        sheet,
        specs,
        style,
        cancelled,
    }
}

fn emit(
    progress: Option<&UnboundedSender<ProgressEvent>>,
    slot: usize,
    total: usize,
    role: AssetRole,
    state: SlotState,
) {
    if let Some(sender) = progress
        && sender
            .send(ProgressEvent {
                slot,
                total,
                role,
                state,
            })
            .is_err()
    {
        debug!("Progress receiver dropped");
    }
}
