//! Caption and label text rendering.
//!
//! A [`FontBook`] holds at most one face, either loaded from a configured
//! file or discovered among the system fonts. Characters the face cannot
//! draw, or every character when no face was found, are drawn as solid
//! block glyphs so text placement stays visible and deterministic.

use std::path::Path;

use image::RgbaImage;
use rusttype::{Font, Scale, point};
use tracing::{debug, info, warn};

use crate::canvas::{blend, fill_rect};

/// Families tried, in order, when discovering a system font. CJK faces
/// first since most captions are Chinese.
const PREFERRED_FAMILIES: [&str; 8] = [
    "Noto Sans CJK TC",
    "Noto Sans CJK SC",
    "Noto Sans TC",
    "Source Han Sans TC",
    "PingFang TC",
    "Microsoft JhengHei",
    "WenQuanYi Zen Hei",
    "Droid Sans Fallback",
];

/// Font used for captions and placeholder labels.
#[derive(Clone, Default)]
pub struct FontBook {
    font: Option<Font<'static>>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl FontBook {
    /// No face; every character renders as a block.
    pub fn none() -> Self {
        Self { font: None }
    }

    /// Loads a TTF/OTF file.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let font = Font::try_from_vec(data).ok_or_else(|| {
            std::io::Error::other(format!("{} is not a usable font", path.display()))
        })?;
        Ok(Self { font: Some(font) })
    }

    /// Looks through the system fonts for a CJK-capable sans face.
    pub fn discover() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        let mut families: Vec<fontdb::Family<'_>> = PREFERRED_FAMILIES
            .iter()
            .map(|&name| fontdb::Family::Name(name))
            .collect();
        families.push(fontdb::Family::SansSerif);

        let query = fontdb::Query {
            families: &families,
            weight: fontdb::Weight::BOLD,
            ..fontdb::Query::default()
        };
        let font = db.query(&query).and_then(|id| {
            db.with_face_data(id, |data, index| {
                Font::try_from_vec_and_index(data.to_vec(), index)
            })
            .flatten()
        });
        match &font {
            Some(_) => info!("Using system font for captions"),
            None => warn!("No system font found, captions will render as blocks"),
        }
        Self { font }
    }

    /// Configured file when given and loadable, system discovery otherwise.
    pub fn load(path: Option<&Path>) -> Self {
        if let Some(path) = path {
            match Self::from_file(path) {
                Ok(book) => {
                    debug!("Loaded caption font from {}", path.display());
                    return book;
                }
                Err(err) => warn!("Failed to load font {}: {err}", path.display()),
            }
        }
        Self::discover()
    }

    /// True when a real face is available.
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn glyph_font(&self, ch: char) -> Option<&Font<'static>> {
        self.font.as_ref().filter(|font| font.glyph(ch).id().0 != 0)
    }

    fn advance(&self, ch: char, px: f32) -> f32 {
        match self.glyph_font(ch) {
            Some(font) => font.glyph(ch).scaled(Scale::uniform(px)).h_metrics().advance_width,
            None if ch.is_whitespace() => px * 0.35,
            None if ch.is_ascii() => px * 0.6,
            None => px,
        }
    }

    /// Width of a single line at `px` pixels.
    pub fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars().map(|ch| self.advance(ch, px)).sum()
    }

    /// Greedy wrap to `max_width`. ASCII words stay together; other
    /// characters may break anywhere.
    pub fn wrap(&self, text: &str, px: f32, max_width: f32) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current = String::new();
        for token in tokens(text) {
            let candidate = format!("{current}{token}");
            if !current.is_empty() && self.measure(candidate.trim_end(), px) > max_width {
                lines.push(current.trim_end().to_string());
                current = token.trim_start().to_string();
            } else {
                current = candidate;
            }
        }
        if !current.trim().is_empty() {
            lines.push(current.trim_end().to_string());
        }
        lines
    }

    /// Draws one line with its top-left at `(x, y)`.
    pub fn draw(&self, img: &mut RgbaImage, text: &str, x: f32, y: f32, px: f32, color: [u8; 3]) {
        let scale = Scale::uniform(px);
        let mut caret = x;
        for ch in text.chars() {
            match self.glyph_font(ch) {
                Some(font) => {
                    let ascent = font.v_metrics(scale).ascent;
                    let glyph = font.glyph(ch).scaled(scale).positioned(point(caret, y + ascent));
                    if let Some(bb) = glyph.pixel_bounding_box() {
                        glyph.draw(|gx, gy, v| {
                            let px = i64::from(bb.min.x) + i64::from(gx);
                            let py = i64::from(bb.min.y) + i64::from(gy);
                            blend(img, px, py, color, v);
                        });
                    }
                }
                None if ch.is_whitespace() => {}
                None => {
                    let width = self.advance(ch, px);
                    let inset = (px * 0.1).max(1.0);
                    fill_rect(
                        img,
                        (caret + inset).round() as i64,
                        (y + inset).round() as i64,
                        (width - inset * 2.0).max(1.0) as u32,
                        (px - inset * 2.0).max(1.0) as u32,
                        color,
                        1.0,
                    );
                }
            }
            caret += self.advance(ch, px);
        }
    }
}

/// Splits text into wrap units: ASCII words with their trailing space, or
/// single non-ASCII characters.
fn tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut word = String::new();
    for ch in text.chars() {
        if ch.is_ascii() && !ch.is_whitespace() {
            word.push(ch);
            continue;
        }
        if !word.is_empty() {
            out.push(std::mem::take(&mut word));
        }
        if ch.is_whitespace() {
            match out.last_mut() {
                Some(last) => last.push(' '),
                None => out.push(" ".to_string()),
            }
        } else {
            out.push(ch.to_string());
        }
    }
    if !word.is_empty() {
        out.push(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_glyphs_without_font() {
        let fonts = FontBook::none();
        assert!(!fonts.has_font());
        assert_eq!(fonts.measure("好的", 20.0), 40.0);
        assert!((fonts.measure("ok", 20.0) - 24.0).abs() < 1e-3);

        let mut img = RgbaImage::new(60, 30);
        fonts.draw(&mut img, "好", 5.0, 5.0, 20.0, [255, 0, 0]);
        assert_eq!(img.get_pixel(15, 15).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(50, 15).0[3], 0);
    }

    #[test]
    fn wrap_breaks_cjk_and_keeps_words() {
        let fonts = FontBook::none();
        let lines = fonts.wrap("上班族喝咖啡", 10.0, 30.0);
        assert_eq!(lines, vec!["上班族", "喝咖啡"]);

        let lines = fonts.wrap("coffee time now", 10.0, 45.0);
        assert_eq!(lines, vec!["coffee", "time", "now"]);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(FontBook::from_file(Path::new("/nonexistent/font.ttf")).is_err());
    }
}
