//! Values flowing through the pipeline.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::constants::{MAIN_IMAGE_SIZE, STICKER_SIZE, TAB_IMAGE_SIZE};

/// Reference picture supplied with the theme.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReferenceImage {
    /// MIME type, eg `image/png`
    pub mime_type: String,
    /// Encoded image bytes
    pub data: Vec<u8>,
}

/// User input for one run. Read-only for the whole run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Theme {
    /// Free-text premise, eg "上班族的日常"
    pub text: String,
    /// Optional description of the recurring character
    pub character: Option<String>,
    /// Optional reference picture of the character
    pub reference_image: Option<ReferenceImage>,
}

impl Theme {
    /// Theme with no character description or reference image.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Sets the character description.
    pub fn with_character(mut self, character: impl Into<String>) -> Self {
        self.character = Some(character.into());
        self
    }
}

/// Where caption text is placed on a sticker.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPlacement {
    /// Above the character
    Top,
    /// Over the middle
    Center,
    /// Below the character
    #[default]
    Bottom,
}

/// Caption styling guidance produced by the planner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TextStyle {
    /// Fill colour
    pub color: [u8; 3],
    /// Outline colour
    pub outline: [u8; 3],
    /// Heavier outline and glyph weight
    pub bold: bool,
    /// Vertical placement
    pub placement: TextPlacement,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: [255, 255, 255],
            outline: [51, 51, 51],
            bold: true,
            placement: TextPlacement::Bottom,
        }
    }
}

/// Art direction for the whole set. Created once, never mutated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StyleDescription {
    /// Short prose description fed into every prompt
    pub summary: String,
    /// How captions are drawn
    pub text_style: TextStyle,
}

/// One planned sticker.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub struct StickerSpec {
    /// What the sticker shows
    pub description: String,
    /// Short caption; unique within a batch
    pub text: String,
}

impl StickerSpec {
    /// Builds a spec from a description and caption.
    pub fn new(description: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            text: text.into(),
        }
    }
}

/// Which output position an asset fills.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AssetRole {
    /// Store main image, 240×240
    MainImage,
    /// Chat tab icon, 96×74
    TabImage,
    /// One grid sticker (1-based), 370×320
    GridSticker(usize),
    /// All grid stickers laid out on one sheet; carries the sticker count,
    /// 740×1280 for eight
    GridSheet(usize),
}

impl AssetRole {
    /// Output dimensions. The grid sheet grows with its sticker count; see
    /// [`crate::postprocess::sheet_size`].
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            AssetRole::MainImage => MAIN_IMAGE_SIZE,
            AssetRole::TabImage => TAB_IMAGE_SIZE,
            AssetRole::GridSticker(_) => STICKER_SIZE,
            AssetRole::GridSheet(count) => crate::postprocess::sheet_size(count),
        }
    }

    /// Slot index used by the placeholder badge; zero for non-sticker roles.
    pub fn index(self) -> usize {
        match self {
            AssetRole::GridSticker(index) => index,
            _ => 0,
        }
    }

    /// File stem used when handing the asset over for packaging.
    pub fn file_stem(self) -> String {
        match self {
            AssetRole::MainImage => "main".to_string(),
            AssetRole::TabImage => "tab".to_string(),
            AssetRole::GridSticker(index) => format!("{index:02}"),
            AssetRole::GridSheet(_) => "grid".to_string(),
        }
    }
}

impl std::fmt::Display for AssetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetRole::MainImage => write!(f, "main image"),
            AssetRole::TabImage => write!(f, "tab image"),
            AssetRole::GridSticker(index) => write!(f, "sticker {index}"),
            AssetRole::GridSheet(_) => write!(f, "grid sheet"),
        }
    }
}

/// A finished raster for one role.
#[derive(Clone, Debug)]
pub struct ImageAsset {
    /// Output position
    pub role: AssetRole,
    /// RGBA pixels; width and height match the role
    pub pixels: RgbaImage,
}

impl ImageAsset {
    /// Pixel width
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Pixel height
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Outcome of one slot. There is no failure variant: a slot that could not
/// be rendered remotely carries a placeholder instead.
#[derive(Clone, Debug)]
pub enum GenerationResult {
    /// Rendered by the remote model
    Generated(ImageAsset),
    /// Rendered locally by the placeholder renderer
    Fallback(ImageAsset),
}

impl GenerationResult {
    /// The asset regardless of how it was produced.
    pub fn asset(&self) -> &ImageAsset {
        match self {
            GenerationResult::Generated(asset) | GenerationResult::Fallback(asset) => asset,
        }
    }

    /// Applies a pixel transform, keeping track of how the asset was produced.
    pub fn map_pixels(self, transform: impl FnOnce(RgbaImage) -> RgbaImage) -> Self {
        match self {
            GenerationResult::Generated(asset) => GenerationResult::Generated(ImageAsset {
                role: asset.role,
                pixels: transform(asset.pixels),
            }),
            GenerationResult::Fallback(asset) => GenerationResult::Fallback(ImageAsset {
                role: asset.role,
                pixels: transform(asset.pixels),
            }),
        }
    }

    /// True when the placeholder renderer produced the asset.
    pub fn is_fallback(&self) -> bool {
        matches!(self, GenerationResult::Fallback(_))
    }
}
