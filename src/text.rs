//! Bitmap text rendering for the label and timestamp marks.

use crate::channels::ChannelMask;
use chrono::{DateTime, FixedOffset};
use font8x8::{
    UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, GREEK_FONTS, HIRAGANA_FONTS, LATIN_FONTS,
};
use image::RgbaImage;

const GLYPH_SIZE: u32 = 8;

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

fn glyph(ch: char) -> [u8; 8] {
    BASIC_FONTS
        .get(ch)
        .or_else(|| LATIN_FONTS.get(ch))
        .or_else(|| GREEK_FONTS.get(ch))
        .or_else(|| HIRAGANA_FONTS.get(ch))
        .or_else(|| BOX_FONTS.get(ch))
        .or_else(|| BLOCK_FONTS.get(ch))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Integer glyph scale so a glyph is roughly `min(width, height) / divisor`
/// pixels tall, never below 1.
pub fn font_scale(width: u32, height: u32, divisor: u32) -> u32 {
    (width.min(height) / divisor.max(1) / GLYPH_SIZE).max(1)
}

/// Rendered size of a single line of `text`.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let advance = GLYPH_SIZE * scale;
    (text.chars().count() as u32 * advance, advance)
}

/// Draws `text` with its top-left corner at (`x`, `y`). Pixels falling
/// outside the canvas are dropped.
pub fn draw_text(
    mask: &mut RgbaImage,
    x: i64,
    y: i64,
    text: &str,
    scale: u32,
    amplitude: u8,
    channels: ChannelMask,
) {
    let (width, height) = (mask.width() as i64, mask.height() as i64);
    let scale = scale.max(1) as i64;
    let advance = GLYPH_SIZE as i64 * scale;

    for (idx, ch) in text.chars().enumerate() {
        let origin_x = x + idx as i64 * advance;
        if origin_x >= width {
            break;
        }
        if origin_x + advance <= 0 {
            continue;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_SIZE as i64 {
                if (bits >> col) & 1 == 0 {
                    continue;
                }
                let base_x = origin_x + col * scale;
                let base_y = y + row as i64 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        let (px, py) = (base_x + dx, base_y + dy);
                        if px < 0 || py < 0 || px >= width || py >= height {
                            continue;
                        }
                        let pixel = mask.get_pixel_mut(px as u32, py as u32);
                        for c in channels.enabled() {
                            pixel.0[c] = amplitude;
                        }
                    }
                }
            }
        }
    }
}

/// Greedy word wrap. Words longer than `width` are split across lines.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        while !chars.is_empty() {
            let gap = if current_len == 0 { 0 } else { 1 };
            if current_len + gap + chars.len() <= width {
                if gap == 1 {
                    current.push(' ');
                }
                current.extend(chars.iter());
                current_len += gap + chars.len();
                break;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            let rest = chars.split_off(width.min(chars.len()));
            lines.push(chars.into_iter().collect());
            chars = rest;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}

/// The label repeated `repeat` times and wrapped into lines of `wrap_width`.
pub fn label_lines(label: &str, repeat: usize, wrap_width: usize) -> Vec<String> {
    let mut tiled = String::with_capacity((label.len() + 1) * repeat);
    for _ in 0..repeat {
        tiled.push_str(label);
        tiled.push(' ');
    }
    wrap(&tiled, wrap_width)
}

/// Tiles the wrapped label down the canvas from the origin.
pub fn paint_label(
    mask: &mut RgbaImage,
    lines: &[String],
    scale: u32,
    amplitude: u8,
    channels: ChannelMask,
) {
    let (_, glyph_height) = text_size("", scale);
    let pitch = (glyph_height * 3 / 2).max(1) as i64;
    for (i, line) in lines.iter().enumerate() {
        let y = i as i64 * pitch;
        if y >= mask.height() as i64 {
            break;
        }
        draw_text(mask, 0, y, line, scale, amplitude, channels);
    }
}

pub fn format_timestamp(at: &DateTime<FixedOffset>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Draws `text` with its bottom-right corner on the canvas's bottom-right corner.
pub fn paint_bottom_right(
    mask: &mut RgbaImage,
    text: &str,
    scale: u32,
    amplitude: u8,
    channels: ChannelMask,
) {
    let (text_width, text_height) = text_size(text, scale);
    let x = mask.width() as i64 - text_width as i64;
    let y = mask.height() as i64 - text_height as i64;
    draw_text(mask, x, y, text, scale, amplitude, channels);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::Rgba;

    #[test]
    fn wraps_on_words() {
        assert_eq!(wrap("abc def ghi", 7), vec!["abc def", "ghi"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("ab abcdefgh", 4), vec!["ab", "abcd", "efgh"]);
        assert!(wrap("   ", 5).is_empty());
    }

    #[test]
    fn label_is_repeated_before_wrapping() {
        let lines = label_lines("test", 10, 25);
        assert_eq!(lines[0], "test test test test test");
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.chars().count() <= 25));
    }

    #[test]
    fn timestamp_format() {
        let jst = FixedOffset::east_opt(9 * 3600).unwrap();
        let at = jst.with_ymd_and_hms(2024, 3, 7, 8, 5, 9).unwrap();
        assert_eq!(format_timestamp(&at), "2024/03/07 08:05:09");
    }

    #[test]
    fn font_scale_never_zero() {
        assert_eq!(font_scale(4, 5, 15), 1);
        assert_eq!(font_scale(1200, 2400, 15), 10);
        assert_eq!(font_scale(100, 100, 0), 12);
    }

    #[test]
    fn draw_text_clips_at_edges() {
        let mut mask = RgbaImage::from_pixel(4, 5, Rgba([0, 0, 0, 0]));
        draw_text(&mut mask, -6, -3, "WW", 1, 9, ChannelMask::ALL);
        draw_text(&mut mask, 2, 2, "#", 3, 9, ChannelMask::ALL);
        assert!(mask.pixels().all(|p| p.0.iter().all(|&v| v == 0 || v == 9)));
    }

    #[test]
    fn bottom_right_text_stays_in_corner() {
        let mut mask = RgbaImage::from_pixel(200, 40, Rgba([0, 0, 0, 0]));
        paint_bottom_right(&mut mask, "2024/03/07 08:05:09", 1, 64, "b".parse().unwrap());
        let (text_width, _) = text_size("2024/03/07 08:05:09", 1);
        for (x, y, p) in mask.enumerate_pixels() {
            if p.0[2] != 0 {
                assert!(x >= 200 - text_width && y >= 32);
                assert_eq!(p.0, [0, 0, 64, 0]);
            }
        }
        assert!(mask.pixels().any(|p| p.0[2] == 64));
    }
}
