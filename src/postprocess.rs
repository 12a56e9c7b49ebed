//! Pixel-level post-processing applied to every asset.
//!
//! Each transform reads from one buffer and writes another. Background
//! removal only ever borrows its input, so it cannot observe its own writes.

use std::collections::VecDeque;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use crate::constants::{GRID_COLUMNS, STICKER_SIZE};
use crate::fonts::FontBook;
use crate::model::{TextPlacement, TextStyle};

/// Alpha at or below which a pixel already counts as transparent.
const TRANSPARENT_ALPHA: u8 = 16;

/// Squared RGB distance under which a pixel matches the background.
const BACKGROUND_TOLERANCE_SQ: u32 = 40 * 40;

/// Squared RGB distance over which edge pixels stay fully opaque.
const FEATHER_LIMIT_SQ: u32 = 80 * 80;

/// Makes the backdrop transparent.
///
/// The background colour is the per-channel median of the opaque border
/// pixels. Pixels connected to the border and within tolerance of that
/// colour become fully transparent; foreground pixels touching them are
/// feathered by colour distance. Enclosed regions of background colour are
/// kept. Images whose border is already mostly transparent keep their alpha
/// as is, which makes the transform idempotent.
pub fn remove_background_local(source: &RgbaImage) -> RgbaImage {
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return source.clone();
    }

    let border = border_pixels(width, height);
    let transparent = border
        .iter()
        .filter(|&&(x, y)| source.get_pixel(x, y).0[3] <= TRANSPARENT_ALPHA)
        .count();
    if transparent * 2 > border.len() {
        return source.clone();
    }

    let background = median_color(
        border
            .iter()
            .map(|&(x, y)| source.get_pixel(x, y))
            .filter(|pixel| pixel.0[3] > TRANSPARENT_ALPHA),
    );
    let is_background = |pixel: &Rgba<u8>| {
        pixel.0[3] <= TRANSPARENT_ALPHA || distance_sq(*pixel, background) <= BACKGROUND_TOLERANCE_SQ
    };

    let idx = |x: u32, y: u32| (y as usize) * (width as usize) + x as usize;
    let mut mask = vec![false; (width as usize) * (height as usize)];
    let mut queue = VecDeque::new();
    for &(x, y) in &border {
        if !mask[idx(x, y)] && is_background(source.get_pixel(x, y)) {
            mask[idx(x, y)] = true;
            queue.push_back((x, y));
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (nx, ny) in neighbours(x, y, width, height) {
            if !mask[idx(nx, ny)] && is_background(source.get_pixel(nx, ny)) {
                mask[idx(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    let mut output = RgbaImage::new(width, height);
    for (x, y, out) in output.enumerate_pixels_mut() {
        let original = source.get_pixel(x, y);
        *out = *original;
        if mask[idx(x, y)] {
            out.0[3] = 0;
            continue;
        }
        let touches_background = neighbours(x, y, width, height)
            .into_iter()
            .any(|(nx, ny)| mask[idx(nx, ny)]);
        if touches_background {
            let dist = distance_sq(*original, background);
            if dist < FEATHER_LIMIT_SQ {
                let t = dist.saturating_sub(BACKGROUND_TOLERANCE_SQ) as f32
                    / (FEATHER_LIMIT_SQ - BACKGROUND_TOLERANCE_SQ) as f32;
                out.0[3] = (f32::from(original.0[3]) * t.clamp(0.0, 1.0)).round() as u8;
            }
        }
    }
    output
}

/// Draws the caption onto the image per the style guidance.
///
/// The caption is shrunk until it fits 90% of the width, outlined, then
/// filled. An empty caption leaves the image untouched.
pub fn composite_text(mut image: RgbaImage, text: &str, style: &TextStyle, fonts: &FontBook) -> RgbaImage {
    let text = text.trim();
    let (width, height) = image.dimensions();
    if text.is_empty() || width == 0 || height == 0 {
        return image;
    }

    let max_width = width as f32 * 0.9;
    let mut px = (height as f32 * 0.16).max(8.0);
    while px > 8.0 && fonts.measure(text, px) > max_width {
        px -= 1.0;
    }
    let text_width = fonts.measure(text, px);
    let x = ((width as f32 - text_width) / 2.0).max(0.0);
    let margin = height as f32 * 0.05;
    let y = match style.placement {
        TextPlacement::Top => margin,
        TextPlacement::Center => (height as f32 - px) / 2.0,
        TextPlacement::Bottom => height as f32 - px - margin,
    };

    let stroke = px * if style.bold { 0.09 } else { 0.05 };
    if stroke >= 0.5 {
        for step in 0..16 {
            let angle = step as f32 * std::f32::consts::TAU / 16.0;
            let (dx, dy) = (angle.cos() * stroke, angle.sin() * stroke);
            fonts.draw(&mut image, text, x + dx, y + dy, px, style.outline);
        }
    }
    fonts.draw(&mut image, text, x, y, px, style.color);
    if style.bold {
        fonts.draw(&mut image, text, x + 0.6, y, px, style.color);
    }
    image
}

/// Scales to exactly `target_width` × `target_height`.
///
/// Aspect ratio is kept; the remainder is transparent padding around the
/// centred image.
pub fn resize(source: &RgbaImage, target_width: u32, target_height: u32) -> RgbaImage {
    let (width, height) = source.dimensions();
    if (width, height) == (target_width, target_height) {
        return source.clone();
    }
    let mut canvas = RgbaImage::new(target_width, target_height);
    if width == 0 || height == 0 || target_width == 0 || target_height == 0 {
        return canvas;
    }

    let scale = (target_width as f32 / width as f32).min(target_height as f32 / height as f32);
    let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_width);
    let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_height);
    let scaled = imageops::resize(source, scaled_width, scaled_height, FilterType::Lanczos3);

    let x = i64::from((target_width - scaled_width) / 2);
    let y = i64::from((target_height - scaled_height) / 2);
    imageops::overlay(&mut canvas, &scaled, x, y);
    canvas
}

/// Sheet dimensions for `count` stickers laid out in two columns.
pub fn sheet_size(count: usize) -> (u32, u32) {
    let rows = (count as u32).div_ceil(GRID_COLUMNS).max(1);
    (STICKER_SIZE.0 * GRID_COLUMNS, STICKER_SIZE.1 * rows)
}

/// Lays stickers out row by row; eight stickers give a 740×1280 sheet.
pub fn assemble_grid<'a>(stickers: impl ExactSizeIterator<Item = &'a RgbaImage>) -> RgbaImage {
    let (sheet_width, sheet_height) = sheet_size(stickers.len());
    let mut sheet = RgbaImage::new(sheet_width, sheet_height);
    let (cell_width, cell_height) = STICKER_SIZE;
    for (i, sticker) in stickers.enumerate() {
        let i = i as u32;
        let x = i64::from((i % GRID_COLUMNS) * cell_width);
        let y = i64::from((i / GRID_COLUMNS) * cell_height);
        let cell = resize(sticker, cell_width, cell_height);
        imageops::overlay(&mut sheet, &cell, x, y);
    }
    sheet
}

fn border_pixels(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut pixels = Vec::with_capacity(2 * (width + height) as usize);
    for x in 0..width {
        pixels.push((x, 0));
        if height > 1 {
            pixels.push((x, height - 1));
        }
    }
    for y in 1..height.saturating_sub(1) {
        pixels.push((0, y));
        if width > 1 {
            pixels.push((width - 1, y));
        }
    }
    pixels
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut out = Vec::with_capacity(4);
    if x > 0 {
        out.push((x - 1, y));
    }
    if y > 0 {
        out.push((x, y - 1));
    }
    if x + 1 < width {
        out.push((x + 1, y));
    }
    if y + 1 < height {
        out.push((x, y + 1));
    }
    out
}

fn median_color<'a>(pixels: impl Iterator<Item = &'a Rgba<u8>>) -> [u8; 3] {
    let mut channels: [Vec<u8>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for pixel in pixels {
        for (channel, values) in channels.iter_mut().enumerate() {
            values.push(pixel.0[channel]);
        }
    }
    let mut color = [255u8; 3];
    for (channel, values) in channels.iter_mut().enumerate() {
        if values.is_empty() {
            continue;
        }
        values.sort_unstable();
        color[channel] = values[values.len() / 2];
    }
    color
}

fn distance_sq(pixel: Rgba<u8>, color: [u8; 3]) -> u32 {
    (0..3)
        .map(|channel| {
            let d = i32::from(pixel.0[channel]) - i32::from(color[channel]);
            (d * d) as u32
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::opaque;

    const WHITE: [u8; 3] = [255, 255, 255];
    const RED: [u8; 3] = [220, 30, 40];

    /// White page, transparent black top-left corner, red square with a
    /// white hole in the middle.
    fn test_page(size: u32) -> RgbaImage {
        let (lo, hi) = (size / 3, size * 2 / 3);
        let hole = (size / 2 - 4, size / 2 + 4);
        RgbaImage::from_fn(size, size, |x, y| {
            if x < 10 && y < 10 {
                Rgba([0, 0, 0, 0])
            } else if (hole.0..hole.1).contains(&x) && (hole.0..hole.1).contains(&y) {
                opaque(WHITE)
            } else if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                opaque(RED)
            } else {
                opaque(WHITE)
            }
        })
    }

    #[test]
    fn background_removal_reads_only_the_source() {
        let size = 600;
        let source = test_page(size);
        let output = remove_background_local(&source);
        let (lo, hi) = (size / 3, size * 2 / 3);
        let hole = (size / 2 - 4, size / 2 + 4);

        for (x, y, pixel) in output.enumerate_pixels() {
            let original = source.get_pixel(x, y);
            // colour channels are never rewritten
            assert_eq!(pixel.0[..3], original.0[..3], "colour changed at {x},{y}");
            let in_square = (lo..hi).contains(&x) && (lo..hi).contains(&y);
            let in_hole = (hole.0..hole.1).contains(&x) && (hole.0..hole.1).contains(&y);
            let expected = if in_square || in_hole { 255 } else { 0 };
            assert_eq!(pixel.0[3], expected, "alpha at {x},{y}");
        }
    }

    #[test]
    fn background_removal_is_idempotent() {
        let once = remove_background_local(&test_page(120));
        let twice = remove_background_local(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn already_transparent_images_are_kept() {
        let mut source = RgbaImage::new(50, 50);
        crate::canvas::fill_circle(&mut source, 25.0, 25.0, 12.0, WHITE);
        assert_eq!(remove_background_local(&source), source);
        assert_eq!(remove_background_local(&RgbaImage::new(0, 0)).dimensions(), (0, 0));
    }

    #[test]
    fn resize_hits_exact_dimensions() {
        let source = test_page(97);
        for (w, h) in [(240, 240), (96, 74), (370, 320), (740, 1280), (1, 1), (5, 300)] {
            let out = resize(&source, w, h);
            assert_eq!(out.dimensions(), (w, h));
        }
        assert_eq!(resize(&source, 0, 10).dimensions(), (0, 10));
        assert_eq!(resize(&RgbaImage::new(0, 0), 4, 4).dimensions(), (4, 4));
    }

    #[test]
    fn resize_pads_instead_of_stretching() {
        let source = RgbaImage::from_pixel(100, 100, opaque(RED));
        let out = resize(&source, 200, 100);
        assert_eq!(out.get_pixel(10, 50).0[3], 0);
        assert!(out.get_pixel(100, 50).0[3] >= 250);
    }

    #[test]
    fn composite_text_draws_in_placement_band() {
        let fonts = FontBook::none();
        let blank = RgbaImage::new(370, 320);
        let style = TextStyle::default();
        let out = composite_text(blank.clone(), "好的", &style, &fonts);

        let drawn_rows: Vec<u32> = (0..320)
            .filter(|&y| (0..370).any(|x| out.get_pixel(x, y).0[3] > 0))
            .collect();
        assert!(!drawn_rows.is_empty());
        assert!(drawn_rows.iter().all(|&y| y > 200), "caption should sit at the bottom");

        let top = TextStyle {
            placement: TextPlacement::Top,
            ..style
        };
        let out = composite_text(blank.clone(), "好的", &top, &fonts);
        assert!((0..370).any(|x| out.get_pixel(x, 40).0[3] > 0));
        assert!((0..370).all(|x| out.get_pixel(x, 300).0[3] == 0));

        assert_eq!(composite_text(blank.clone(), "  ", &style, &fonts), blank);
    }

    #[test]
    fn transforms_compose_in_either_order() {
        let fonts = FontBook::none();
        let style = TextStyle {
            color: [10, 200, 10],
            ..TextStyle::default()
        };
        let page = test_page(120);
        let a = composite_text(remove_background_local(&page), "嗨", &style, &fonts);
        let b = remove_background_local(&composite_text(page, "嗨", &style, &fonts));
        assert_eq!(a.dimensions(), b.dimensions());
        assert!(a.pixels().any(|p| p.0[..3] == style.color && p.0[3] == 255));
        assert!(b.pixels().any(|p| p.0[..3] == style.color && p.0[3] == 255));
    }

    #[test]
    fn grid_of_eight_is_740_by_1280() {
        let stickers: Vec<RgbaImage> = (0..8)
            .map(|_| RgbaImage::from_pixel(370, 320, opaque(RED)))
            .collect();
        let sheet = assemble_grid(stickers.iter());
        assert_eq!(sheet.dimensions(), (740, 1280));
        assert_eq!(*sheet.get_pixel(739, 1279), opaque(RED));
        assert_eq!(sheet_size(3), (740, 640));
        assert_eq!(sheet_size(0), (740, 320));
    }
}
