//! Hands a finished batch over as PNG files.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::OutputError;
use crate::model::ImageAsset;
use crate::orchestrator::Batch;

/// Writes `main.png`, `tab.png`, `01.png`..`NN.png` and `grid.png` into
/// `dir`, creating it if needed. Returns the paths in slot order, sheet last.
pub fn write_batch(dir: &Path, batch: &Batch) -> Result<Vec<PathBuf>, OutputError> {
    std::fs::create_dir_all(dir)?;
    batch
        .assets
        .iter()
        .map(|result| result.asset())
        .chain(std::iter::once(&batch.sheet))
        .map(|asset| write_asset(dir, asset))
        .collect()
}

fn write_asset(dir: &Path, asset: &ImageAsset) -> Result<PathBuf, OutputError> {
    let path = dir.join(format!("{}.png", asset.role.file_stem()));
    write_png(&path, &asset.pixels)?;
    debug!("Wrote {} ({}x{})", path.display(), asset.width(), asset.height());
    Ok(path)
}

/// Encodes `pixels` as PNG at `path`.
pub fn write_png(path: &Path, pixels: &RgbaImage) -> Result<(), OutputError> {
    let mut buf = std::io::Cursor::new(Vec::new());
    pixels.write_to(&mut buf, ImageFormat::Png)?;
    std::fs::write(path, buf.into_inner())?;
    Ok(())
}
