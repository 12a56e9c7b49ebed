//! CLI parser
use clap::Parser;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL, DEFAULT_STICKER_COUNT, DEFAULT_TEXT_MODEL,
};

#[derive(Parser, Debug)]
#[command(name = "stickerpack")]
#[command(about = "Generate a themed chat-sticker set: main image, tab image and grid stickers")]
/// CLI Options
pub struct CliOptions {
    /// Theme for the sticker set, eg "上班族的日常"
    pub theme: String,

    #[clap(long, env = "STICKERPACK_CHARACTER")]
    /// Optional description of the recurring character.
    /// Env: STICKERPACK_CHARACTER
    pub character: Option<String>,

    #[clap(long, env = "STICKERPACK_REFERENCE_IMAGE")]
    /// Optional reference image (PNG or JPEG) passed along with every image request.
    /// Env: STICKERPACK_REFERENCE_IMAGE
    pub reference_image: Option<PathBuf>,

    #[clap(long, short, default_value_t = DEFAULT_STICKER_COUNT, env = "STICKERPACK_COUNT")]
    /// Number of grid stickers, defaults to `8`.
    /// Env: STICKERPACK_COUNT
    pub count: usize,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    /// API key, only sent to the configured endpoint.
    /// Env: GEMINI_API_KEY
    pub api_key: Option<String>,

    #[clap(long, default_value = DEFAULT_API_BASE, env = "STICKERPACK_API_BASE")]
    /// API root.
    /// Env: STICKERPACK_API_BASE
    pub api_base: String,

    #[clap(long, default_value = DEFAULT_TEXT_MODEL)]
    /// Text model used for style and sticker planning
    pub text_model: String,

    #[clap(long, default_value = DEFAULT_IMAGE_MODEL)]
    /// Image model used for rendering
    pub image_model: String,

    #[clap(long, default_value = "60", env = "STICKERPACK_TIMEOUT_SECS")]
    /// Timeout for a single remote call in seconds.
    /// Env: STICKERPACK_TIMEOUT_SECS
    pub timeout_secs: u64,

    #[clap(long, default_value = "90", env = "STICKERPACK_BUDGET_SECS")]
    /// Cumulative budget for all attempts of one remote call, in seconds.
    /// Env: STICKERPACK_BUDGET_SECS
    pub budget_secs: u64,

    #[clap(long, default_value = "3")]
    /// Attempts per remote call before falling back
    pub attempts: u32,

    #[clap(long, env = "STICKERPACK_FONT")]
    /// TTF/OTF font for captions; a system font is used when unset.
    /// Env: STICKERPACK_FONT
    pub font: Option<PathBuf>,

    #[clap(long, short, env = "STICKERPACK_OUT_DIR")]
    /// Output directory, defaults to `./stickers/<timestamp>`.
    /// Env: STICKERPACK_OUT_DIR
    pub out_dir: Option<PathBuf>,

    #[clap(long, env = "STICKERPACK_DEBUG_DIR")]
    /// Save every raw API response into this directory.
    /// Env: STICKERPACK_DEBUG_DIR
    pub debug_dir: Option<PathBuf>,

    #[clap(long)]
    /// Render placeholders locally without calling the API
    pub offline: bool,

    #[clap(long, help = "Enable debug logging", env = "STICKERPACK_DEBUG")]
    /// Enable debug logging. Env: STICKERPACK_DEBUG
    pub debug: bool,
}
