//! Small anti-aliased drawing primitives over RGBA buffers.
//!
//! Shapes are rasterised by coverage: each pixel in the shape's bounding box
//! gets an alpha from its signed distance to the edge, then is composited
//! source-over.

use image::RgbaImage;

/// Composites `color` at `alpha` (0..=1) onto one pixel, source-over.
pub fn blend(img: &mut RgbaImage, x: i64, y: i64, color: [u8; 3], alpha: f32) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        return;
    }
    let dst = img.get_pixel_mut(x as u32, y as u32);
    let dst_a = f32::from(dst.0[3]) / 255.0;
    let out_a = alpha + dst_a * (1.0 - alpha);
    if out_a <= f32::EPSILON {
        return;
    }
    for (channel, src) in dst.0.iter_mut().zip(color) {
        let under = f32::from(*channel);
        let value = (f32::from(src) * alpha + under * dst_a * (1.0 - alpha)) / out_a;
        *channel = value.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Coverage for a signed distance (negative inside), one pixel of feathering.
fn coverage(distance: f32) -> f32 {
    (0.5 - distance).clamp(0.0, 1.0)
}

/// Visits pixel centres inside a clamped bounding box.
fn for_each_in_box(
    img: &mut RgbaImage,
    (x0, y0, x1, y1): (f32, f32, f32, f32),
    mut visit: impl FnMut(&mut RgbaImage, i64, i64, f32, f32),
) {
    let min_x = (x0.floor() as i64).max(0);
    let min_y = (y0.floor() as i64).max(0);
    let max_x = (x1.ceil() as i64).min(i64::from(img.width()) - 1);
    let max_y = (y1.ceil() as i64).min(i64::from(img.height()) - 1);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            visit(img, x, y, x as f32 + 0.5, y as f32 + 0.5);
        }
    }
}

/// Filled circle.
pub fn fill_circle(img: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: [u8; 3]) {
    let bounds = (cx - radius - 1.0, cy - radius - 1.0, cx + radius + 1.0, cy + radius + 1.0);
    for_each_in_box(img, bounds, |img, x, y, px, py| {
        let distance = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt() - radius;
        blend(img, x, y, color, coverage(distance));
    });
}

/// Circle filled with a radial gradient from `inner` at the centre to
/// `outer` at the rim.
pub fn radial_disc(
    img: &mut RgbaImage,
    cx: f32,
    cy: f32,
    radius: f32,
    inner: [u8; 3],
    outer: [u8; 3],
) {
    let bounds = (cx - radius - 1.0, cy - radius - 1.0, cx + radius + 1.0, cy + radius + 1.0);
    for_each_in_box(img, bounds, |img, x, y, px, py| {
        let dist = ((px - cx).powi(2) + (py - cy).powi(2)).sqrt();
        let t = (dist / radius.max(1.0)).clamp(0.0, 1.0);
        let color = lerp_color(inner, outer, t * t);
        blend(img, x, y, color, coverage(dist - radius));
    });
}

/// Circle outline.
pub fn ring(img: &mut RgbaImage, cx: f32, cy: f32, radius: f32, thickness: f32, color: [u8; 3]) {
    arc(img, cx, cy, radius, thickness, (-std::f32::consts::PI, std::f32::consts::PI), color);
}

/// Arc stroke between two angles (radians, y axis pointing down, so
/// `0..PI` is the lower half).
pub fn arc(
    img: &mut RgbaImage,
    cx: f32,
    cy: f32,
    radius: f32,
    thickness: f32,
    (start, end): (f32, f32),
    color: [u8; 3],
) {
    let half = thickness / 2.0;
    let reach = radius + half + 1.0;
    for_each_in_box(img, (cx - reach, cy - reach, cx + reach, cy + reach), |img, x, y, px, py| {
        let (dx, dy) = (px - cx, py - cy);
        let angle = dy.atan2(dx);
        if angle < start || angle > end {
            return;
        }
        let distance = ((dx * dx + dy * dy).sqrt() - radius).abs() - half;
        blend(img, x, y, color, coverage(distance));
    });
}

/// Straight stroke with round caps.
pub fn line(img: &mut RgbaImage, from: (f32, f32), to: (f32, f32), thickness: f32, color: [u8; 3]) {
    let half = thickness / 2.0;
    let bounds = (
        from.0.min(to.0) - half - 1.0,
        from.1.min(to.1) - half - 1.0,
        from.0.max(to.0) + half + 1.0,
        from.1.max(to.1) + half + 1.0,
    );
    let (vx, vy) = (to.0 - from.0, to.1 - from.1);
    let len_sq = (vx * vx + vy * vy).max(f32::EPSILON);
    for_each_in_box(img, bounds, |img, x, y, px, py| {
        let t = (((px - from.0) * vx + (py - from.1) * vy) / len_sq).clamp(0.0, 1.0);
        let (nx, ny) = (from.0 + vx * t, from.1 + vy * t);
        let distance = ((px - nx).powi(2) + (py - ny).powi(2)).sqrt() - half;
        blend(img, x, y, color, coverage(distance));
    });
}

/// Axis-aligned filled rectangle, no anti-aliasing.
pub fn fill_rect(img: &mut RgbaImage, x: i64, y: i64, width: u32, height: u32, color: [u8; 3], alpha: f32) {
    for yy in y..y + i64::from(height) {
        for xx in x..x + i64::from(width) {
            blend(img, xx, yy, color, alpha);
        }
    }
}

/// Heart shape centred on `(cx, cy)` with half-width `size`.
pub fn fill_heart(img: &mut RgbaImage, cx: f32, cy: f32, size: f32, color: [u8; 3]) {
    let size = size.max(1.0);
    let bounds = (cx - size - 1.0, cy - size - 1.0, cx + size + 1.0, cy + size + 1.0);
    for_each_in_box(img, bounds, |img, x, y, px, py| {
        // (x² + y² - 1)³ - x²y³ <= 0, y up
        let hx = (px - cx) / size * 1.2;
        let hy = -(py - cy) / size * 1.2 + 0.2;
        let f = (hx * hx + hy * hy - 1.0).powi(3) - hx * hx * hy.powi(3);
        if f <= 0.0 {
            blend(img, x, y, color, 1.0);
        }
    });
}

/// Dashed rectangle outline `inset` pixels inside the image edge.
pub fn dashed_border(img: &mut RgbaImage, inset: u32, dash: u32, gap: u32, thickness: u32, color: [u8; 3]) {
    let (width, height) = img.dimensions();
    if width <= inset * 2 || height <= inset * 2 {
        return;
    }
    let (left, top) = (i64::from(inset), i64::from(inset));
    let right = i64::from(width - inset) - i64::from(thickness);
    let bottom = i64::from(height - inset) - i64::from(thickness);
    let period = i64::from((dash + gap).max(1));
    let dash = i64::from(dash);

    let mut x = left;
    while x <= right {
        let len = dash.min(right + i64::from(thickness) - x).max(0) as u32;
        fill_rect(img, x, top, len, thickness, color, 1.0);
        fill_rect(img, x, bottom, len, thickness, color, 1.0);
        x += period;
    }
    let mut y = top;
    while y <= bottom {
        let len = dash.min(bottom + i64::from(thickness) - y).max(0) as u32;
        fill_rect(img, left, y, thickness, len, color, 1.0);
        fill_rect(img, right, y, thickness, len, color, 1.0);
        y += period;
    }
}

/// Linear interpolation between two colours.
pub fn lerp_color(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mix = |i: usize| (f32::from(a[i]) + (f32::from(b[i]) - f32::from(a[i])) * t).round() as u8;
    [mix(0), mix(1), mix(2)]
}
