//! Remote image synthesis with local fallback.

use image::RgbaImage;
use tracing::{debug, warn};

use crate::backend::{ImageBackend, with_retry};
use crate::config::RetryPolicy;
use crate::error::SynthesisError;
use crate::fonts::FontBook;
use crate::model::{
    AssetRole, GenerationResult, ImageAsset, StickerSpec, StyleDescription, TextPlacement, Theme,
};
use crate::placeholder::render_placeholder;

/// Builds the rendering prompt for one slot.
pub fn build_prompt(
    theme: &Theme,
    style: &StyleDescription,
    spec: &StickerSpec,
    width: u32,
    height: u32,
) -> String {
    let character = theme
        .character
        .as_deref()
        .map(|character| format!("The recurring character is: {character}. Keep it consistent with the rest of the set.\n"))
        .unwrap_or_else(|| "Use the same recurring character as the rest of the set.\n".to_string());
    let reference = if theme.reference_image.is_some() {
        "Match the character in the attached reference image.\n"
    } else {
        ""
    };
    let caption = if spec.text.is_empty() {
        "Do not include any text.".to_string()
    } else {
        let band = match style.text_style.placement {
            TextPlacement::Top => "top",
            TextPlacement::Center => "middle",
            TextPlacement::Bottom => "bottom",
        };
        format!(
            "Leave clear space at the {band} for the caption \"{}\", which is added afterwards \
             in large readable lettering; do not draw any lettering yourself.",
            spec.text
        )
    };
    format!(
        "Create a chat sticker illustration for the theme \"{theme}\".\n\
         Scene: {description}\n\
         {character}{reference}\
         Art style: {style}\n\
         Canvas: {width}x{height} pixels (aspect ratio {ratio}), one centred subject.\n\
         Background: fully transparent, or a single flat plain colour that is easy to remove.\n\
         {caption}",
        theme = theme.text,
        description = spec.description,
        style = style.summary,
        ratio = aspect_ratio(width, height),
    )
}

fn aspect_ratio(width: u32, height: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 { a } else { gcd(b, a % b) }
    }
    let divisor = gcd(width, height).max(1);
    format!("{}:{}", width / divisor, height / divisor)
}

/// Renders slots through an [`ImageBackend`].
#[derive(Debug)]
pub struct Synthesizer<B> {
    backend: B,
    policy: RetryPolicy,
}

impl<B: ImageBackend> Synthesizer<B> {
    /// Wraps an image backend.
    pub fn new(backend: B, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// One remote render under the retry policy, decoded to RGBA.
    pub async fn try_synthesize(
        &self,
        theme: &Theme,
        style: &StyleDescription,
        spec: &StickerSpec,
        role: AssetRole,
    ) -> Result<RgbaImage, SynthesisError> {
        let (width, height) = role.dimensions();
        let prompt = build_prompt(theme, style, spec, width, height);
        let label = role.to_string();
        let encoded = with_retry(&self.policy, &label, || {
            self.backend
                .generate_image(&prompt, theme.reference_image.as_ref())
        })
        .await?;
        debug!(
            "{label}: received {} bytes ({})",
            encoded.bytes.len(),
            encoded.mime_type.as_deref().unwrap_or("unknown type")
        );
        Ok(image::load_from_memory(&encoded.bytes)?.to_rgba8())
    }

    /// Renders a slot, substituting a placeholder of the role's exact size
    /// when the remote render fails.
    pub async fn synthesize(
        &self,
        theme: &Theme,
        style: &StyleDescription,
        spec: &StickerSpec,
        role: AssetRole,
        fonts: &FontBook,
    ) -> GenerationResult {
        match self.try_synthesize(theme, style, spec, role).await {
            Ok(pixels) => GenerationResult::Generated(ImageAsset { role, pixels }),
            Err(err) => {
                warn!("{role}: remote render failed, using placeholder: {err}");
                fallback(theme, spec, role, fonts)
            }
        }
    }
}

/// Placeholder asset for a slot.
pub fn fallback(theme: &Theme, spec: &StickerSpec, role: AssetRole, fonts: &FontBook) -> GenerationResult {
    let (width, height) = role.dimensions();
    GenerationResult::Fallback(ImageAsset {
        role,
        pixels: render_placeholder(&spec.description, &theme.text, role.index(), width, height, fonts),
    })
}
