//! Scripted backends for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::backend::{EncodedImage, ImageBackend, TextBackend};
use crate::config::{GenerationParams, PipelineConfig, RetryPolicy};
use crate::error::{RemoteError, SynthesisError};
use crate::model::ReferenceImage;

pub(crate) fn opaque(color: [u8; 3]) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], 255])
}

/// Config that never touches the network and retries quickly.
pub(crate) fn offline_config() -> PipelineConfig {
    PipelineConfig {
        api_base: "http://127.0.0.1:9".to_string(),
        text_model: "text-test".to_string(),
        image_model: "image-test".to_string(),
        sticker_count: 8,
        retry: fast_policy(),
        params: GenerationParams::default(),
        font_path: None,
        offline: true,
    }
}

pub(crate) fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_millis(100),
        total_budget: Duration::from_millis(300),
        backoff: Duration::from_millis(1),
    }
}

/// Replies with queued responses in order; errors once the queue is empty.
pub(crate) struct ScriptedText {
    replies: Mutex<VecDeque<Result<String, RemoteError>>>,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl ScriptedText {
    pub(crate) fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, RemoteError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails.
    pub(crate) fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn ok<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    pub(crate) fn prompt_count(&self) -> usize {
        self.prompts.lock().map(|prompts| prompts.len()).unwrap_or(0)
    }
}

impl TextBackend for ScriptedText {
    async fn generate_text(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, RemoteError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut queue| queue.pop_front());
        next.unwrap_or(Err(RemoteError::Empty))
    }
}

/// Image backend whose every call fails.
#[derive(Default)]
pub(crate) struct FailingImages {
    pub(crate) calls: AtomicUsize,
}

impl ImageBackend for FailingImages {
    async fn generate_image(
        &self,
        _prompt: &str,
        _reference: Option<&ReferenceImage>,
    ) -> Result<EncodedImage, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SynthesisError::Remote(RemoteError::Status {
            status: 503,
            body: "overloaded".to_string(),
        }))
    }
}

/// Image backend that never answers.
pub(crate) struct HangingImages;

impl ImageBackend for HangingImages {
    async fn generate_image(
        &self,
        _prompt: &str,
        _reference: Option<&ReferenceImage>,
    ) -> Result<EncodedImage, SynthesisError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(SynthesisError::NoDecoderMatched)
    }
}

/// Image backend returning a PNG of a red disc on white.
#[derive(Default)]
pub(crate) struct DiscImages {
    pub(crate) calls: AtomicUsize,
}

impl ImageBackend for DiscImages {
    async fn generate_image(
        &self,
        _prompt: &str,
        _reference: Option<&ReferenceImage>,
    ) -> Result<EncodedImage, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(EncodedImage {
            mime_type: Some("image/png".to_string()),
            bytes: disc_png(256, 256),
        })
    }
}

/// White square with an opaque red disc in the middle.
pub(crate) fn disc_image(width: u32, height: u32) -> RgbaImage {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 3.0;
    RgbaImage::from_fn(width, height, |x, y| {
        let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
        if dx * dx + dy * dy <= radius * radius {
            Rgba([220, 30, 40, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

pub(crate) fn disc_png(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    disc_image(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}
