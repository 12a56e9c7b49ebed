//! Shared constants for the sticker pipeline
//!

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// The default place we write finished sticker sets
pub static OUTPUT_DIR: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("./stickers"));

/// Default API root for the generative language endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used for style planning and sticker descriptions.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";

/// Model used for image rendering.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.0-flash-preview-image-generation";

/// Number of grid stickers in a standard set.
pub const DEFAULT_STICKER_COUNT: usize = 8;

/// Main image dimensions (width, height).
pub const MAIN_IMAGE_SIZE: (u32, u32) = (240, 240);

/// Tab image dimensions (width, height).
pub const TAB_IMAGE_SIZE: (u32, u32) = (96, 74);

/// Single grid sticker dimensions (width, height).
pub const STICKER_SIZE: (u32, u32) = (370, 320);

/// Number of sticker columns on the grid sheet.
pub const GRID_COLUMNS: u32 = 2;

/// Attempts per remote call before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Timeout for a single remote call.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Cumulative time all attempts for one remote call may use.
pub const DEFAULT_TOTAL_BUDGET: Duration = Duration::from_secs(90);

/// First retry delay; doubled on each subsequent retry.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Style summary used when the style request fails.
pub const DEFAULT_STYLE: &str = "Cute chibi cartoon style, thick clean outlines, soft pastel colours, \
flat shading, expressive face, bold rounded lettering in white with a dark outline";

/// Description prefix for synthesised backfill stickers: `<theme> - 表情 k`.
pub const BACKFILL_DESCRIPTION_LABEL: &str = "表情";

/// Text prefix for synthesised backfill stickers: `貼k`.
pub const BACKFILL_TEXT_PREFIX: &str = "貼";

#[cfg(test)]
/// Sample theme used in tests
pub const TEST_THEME: &str = "上班族的日常";
