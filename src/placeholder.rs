//! Local placeholder art.
//!
//! Used when the remote renderer fails and for offline previews. Output
//! depends only on the inputs (and the caption font, when one is found).

use image::RgbaImage;

use crate::canvas::{
    arc, dashed_border, fill_circle, fill_heart, lerp_color, line, radial_disc, ring,
};
use crate::fonts::FontBook;

/// Backdrop colours, picked by theme and slot index.
const PALETTE: [[u8; 3]; 6] = [
    [255, 183, 197],
    [174, 214, 241],
    [187, 234, 191],
    [255, 224, 150],
    [214, 196, 255],
    [255, 204, 170],
];

const FACE: [u8; 3] = [255, 214, 92];
const INK: [u8; 3] = [61, 44, 41];
const TEAR: [u8; 3] = [96, 170, 255];
const HEART: [u8; 3] = [235, 64, 96];
const BORDER: [u8; 3] = [150, 150, 160];
const LABEL: [u8; 3] = [70, 70, 80];

/// Face drawn in the middle of a placeholder.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Expression {
    /// Dot eyes, smile
    Happy,
    /// Closed eyes, open mouth
    Laughing,
    /// Frown and a tear
    Sad,
    /// Slanted brows, frown
    Angry,
    /// Wide eyes, round mouth
    Surprised,
    /// Heart eyes
    Love,
    /// Closed eyes, small mouth
    Sleepy,
}

/// Checked in order; first keyword hit wins.
const KEYWORDS: [(Expression, &[&str]); 7] = [
    (Expression::Sad, &["哭", "難過", "傷心", "淚", "sad", "cry"]),
    (Expression::Angry, &["生氣", "憤怒", "怒", "angry", "mad"]),
    (Expression::Sleepy, &["睡", "睏", "累", "sleep", "tired"]),
    (Expression::Surprised, &["驚", "嚇", "surprise", "shock", "wow"]),
    (Expression::Laughing, &["哈哈", "大笑", "笑", "laugh", "lol"]),
    (Expression::Happy, &["開心", "高興", "耶", "讚", "happy", "smile", "yay"]),
    (Expression::Love, &["愛", "喜歡", "心", "親", "love", "heart", "kiss"]),
];

/// Used when no keyword matches, cycled by slot index.
const DEFAULT_CYCLE: [Expression; 5] = [
    Expression::Happy,
    Expression::Laughing,
    Expression::Surprised,
    Expression::Love,
    Expression::Sleepy,
];

impl Expression {
    /// Picks a face for a description, falling back to the index cycle.
    pub fn for_description(description: &str, index: usize) -> Self {
        let lowered = description.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|word| lowered.contains(word)))
            .map(|(expression, _)| *expression)
            .unwrap_or(DEFAULT_CYCLE[index % DEFAULT_CYCLE.len()])
    }
}

/// Renders a placeholder sticker of exactly `width` × `height`.
///
/// Soft radial backdrop, a face picked from the description, the wrapped
/// description, a number badge when `index > 0`, and a dashed border.
pub fn render_placeholder(
    description: &str,
    theme: &str,
    index: usize,
    width: u32,
    height: u32,
    fonts: &FontBook,
) -> RgbaImage {
    let mut img = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return img;
    }
    let (w, h) = (width as f32, height as f32);
    let unit = w.min(h);

    let seed = theme
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)));
    let base = PALETTE[seed.wrapping_add(index) % PALETTE.len()];
    let (cx, cy) = (w / 2.0, h * 0.42);
    let radius = unit * 0.36;
    radial_disc(&mut img, cx, cy, radius, lerp_color(base, [255, 255, 255], 0.6), base);

    draw_face(&mut img, cx, cy, radius * 0.62, Expression::for_description(description, index));

    let px = (h * 0.075).max(7.0);
    let label_top = cy + radius + unit * 0.04;
    let lines = fonts.wrap(description, px, w * 0.86);
    for (row, text) in lines.iter().take(2).enumerate() {
        let y = label_top + row as f32 * px * 1.2;
        if y + px > h {
            break;
        }
        let x = (w - fonts.measure(text, px)) / 2.0;
        fonts.draw(&mut img, text, x.max(0.0), y, px, LABEL);
    }

    if index > 0 {
        let badge_radius = (unit * 0.09).max(5.0);
        let (bx, by) = (w - badge_radius * 1.5, badge_radius * 1.5);
        fill_circle(&mut img, bx, by, badge_radius, INK);
        let number = index.to_string();
        let badge_px = badge_radius * 1.1;
        let x = bx - fonts.measure(&number, badge_px) / 2.0;
        fonts.draw(&mut img, &number, x, by - badge_px / 2.0, badge_px, [255, 255, 255]);
    }

    let thickness = ((unit / 120.0).round() as u32).max(1);
    dashed_border(&mut img, thickness, thickness * 6, thickness * 4, thickness, BORDER);
    img
}

fn draw_face(img: &mut RgbaImage, cx: f32, cy: f32, r: f32, expression: Expression) {
    use std::f32::consts::PI;

    let stroke = (r * 0.07).max(1.0);
    fill_circle(img, cx, cy, r, FACE);
    ring(img, cx, cy, r, stroke, INK);

    let eye_y = cy - r * 0.2;
    let eyes = [cx - r * 0.35, cx + r * 0.35];
    let eye_r = r * 0.09;
    let smile = (PI * 0.15, PI * 0.85);
    let frown = (-PI * 0.85, -PI * 0.15);

    match expression {
        Expression::Happy => {
            for ex in eyes {
                fill_circle(img, ex, eye_y, eye_r, INK);
            }
            arc(img, cx, cy, r * 0.5, stroke, smile, INK);
        }
        Expression::Laughing => {
            for ex in eyes {
                arc(img, ex, eye_y + eye_r, eye_r * 1.6, stroke, frown, INK);
            }
            // open mouth: lower half disc
            let mouth_y = cy + r * 0.1;
            for step in 0..=12 {
                let t = step as f32 / 12.0;
                arc(img, cx, mouth_y, r * 0.45 * t, stroke * 1.2, (0.0, PI), INK);
            }
        }
        Expression::Sad => {
            for ex in eyes {
                fill_circle(img, ex, eye_y, eye_r, INK);
            }
            arc(img, cx, cy + r * 0.65, r * 0.35, stroke, frown, INK);
            fill_circle(img, eyes[0], eye_y + r * 0.3, eye_r * 1.2, TEAR);
        }
        Expression::Angry => {
            for (i, ex) in eyes.into_iter().enumerate() {
                fill_circle(img, ex, eye_y, eye_r, INK);
                let inward = if i == 0 { 1.0 } else { -1.0 };
                line(
                    img,
                    (ex - inward * r * 0.18, eye_y - r * 0.3),
                    (ex + inward * r * 0.12, eye_y - r * 0.18),
                    stroke,
                    INK,
                );
            }
            arc(img, cx, cy + r * 0.65, r * 0.35, stroke, frown, INK);
        }
        Expression::Surprised => {
            for ex in eyes {
                fill_circle(img, ex, eye_y, eye_r * 1.6, INK);
            }
            ring(img, cx, cy + r * 0.35, r * 0.18, stroke, INK);
        }
        Expression::Love => {
            for ex in eyes {
                fill_heart(img, ex, eye_y, r * 0.16, HEART);
            }
            arc(img, cx, cy, r * 0.5, stroke, smile, INK);
        }
        Expression::Sleepy => {
            for ex in eyes {
                line(img, (ex - r * 0.12, eye_y), (ex + r * 0.12, eye_y), stroke, INK);
            }
            ring(img, cx, cy + r * 0.4, r * 0.08, stroke, INK);
        }
    }
}
