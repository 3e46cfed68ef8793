//! Text file previews rendered with an 8x8 bitmap font

use font8x8::{UnicodeFonts, BASIC_FONTS, BLOCK_FONTS, BOX_FONTS, GREEK_FONTS, LATIN_FONTS, MISC_FONTS};
use image::{Rgb, RgbImage};

pub const MARGIN: u32 = 20;
pub const LINE_HEIGHT: u32 = 15;
const GLYPH_SIZE: u32 = 8;

/// How much of the text goes into the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextLimits {
    pub max_lines: usize,
    pub max_chars: usize,
}

impl TextLimits {
    pub const PREVIEW: TextLimits = TextLimits {
        max_lines: 30,
        max_chars: 1000,
    };
    pub const FULL: TextLimits = TextLimits {
        max_lines: 200,
        max_chars: 10_000,
    };
}

/// Decode UTF-8, then BOM-marked UTF-16, then Latin-1
pub fn decode_text(bytes: &[u8]) -> String {
    let utf8_body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(utf8_body) {
        return text.to_string();
    }

    let utf16 = match bytes {
        [0xFF, 0xFE, rest @ ..] => Some((rest, u16::from_le_bytes as fn([u8; 2]) -> u16)),
        [0xFE, 0xFF, rest @ ..] => Some((rest, u16::from_be_bytes as fn([u8; 2]) -> u16)),
        _ => None,
    };
    if let Some((body, to_unit)) = utf16 {
        let units: Vec<u16> = body.chunks_exact(2).map(|c| to_unit([c[0], c[1]])).collect();
        if let Ok(text) = String::from_utf16(&units) {
            return text;
        }
    }

    // Every byte is a valid Latin-1 code point
    bytes.iter().map(|&b| b as char).collect()
}

/// Cut text to the line and character limits, marking truncation with `...`
pub fn truncate(text: &str, limits: TextLimits) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut out = normalized
        .split('\n')
        .take(limits.max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if out.chars().count() > limits.max_chars {
        out = out.chars().take(limits.max_chars).collect();
        out.push_str("...");
    }
    out
}

fn glyph(c: char) -> [u8; 8] {
    BASIC_FONTS
        .get(c)
        .or_else(|| LATIN_FONTS.get(c))
        .or_else(|| GREEK_FONTS.get(c))
        .or_else(|| BOX_FONTS.get(c))
        .or_else(|| BLOCK_FONTS.get(c))
        .or_else(|| MISC_FONTS.get(c))
        .or_else(|| BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// Draw text black-on-white on a `width` x `height` canvas
///
/// With `grow`, the canvas is made taller when the text needs more room.
pub fn render_text(text: &str, width: u32, height: u32, grow: bool) -> RgbImage {
    let lines: Vec<&str> = text.split('\n').collect();
    let needed = MARGIN * 2 + lines.len() as u32 * LINE_HEIGHT;
    let height = if grow { height.max(needed) } else { height };

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    let black = Rgb([0, 0, 0]);

    for (row, line) in lines.iter().enumerate() {
        let top = MARGIN + row as u32 * LINE_HEIGHT;
        if top + GLYPH_SIZE > height {
            break;
        }
        let mut left = MARGIN;
        for c in line.chars() {
            if c == '\t' {
                left += GLYPH_SIZE * 4;
                continue;
            }
            if left + GLYPH_SIZE > width {
                break;
            }
            for (gy, bits) in glyph(c).iter().enumerate() {
                for gx in 0..GLYPH_SIZE {
                    if bits & (1 << gx) != 0 {
                        canvas.put_pixel(left + gx, top + gy as u32, black);
                    }
                }
            }
            left += GLYPH_SIZE;
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_and_bom() {
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
        assert_eq!(decode_text(&[0xEF, 0xBB, 0xBF, b'h', b'i']), "hi");
    }

    #[test]
    fn test_decode_utf16_le_with_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Xin chào".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_text(&bytes), "Xin chào");
    }

    #[test]
    fn test_decode_falls_back_to_latin1() {
        assert_eq!(decode_text(&[b'c', 0xE9, b'!']), "cé!");
    }

    #[test]
    fn test_truncate_lines_and_chars() {
        let text = (0..50).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let cut = truncate(&text, TextLimits::PREVIEW);
        assert_eq!(cut.lines().count(), 30);
        assert!(!cut.ends_with("..."));

        let long = "a".repeat(1500);
        let cut = truncate(&long, TextLimits::PREVIEW);
        assert_eq!(cut.len(), 1003);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_render_draws_ink_inside_margin() {
        let img = render_text("Hello", 800, 600, false);
        assert_eq!(img.dimensions(), (800, 600));
        let ink = img.pixels().filter(|p| p.0 == [0, 0, 0]).count();
        assert!(ink > 0);
        // Nothing drawn in the top margin
        assert!((0..800).all(|x| img.get_pixel(x, 5).0 == [255, 255, 255]));
    }

    #[test]
    fn test_render_grows_for_full_preview() {
        let text = vec!["line"; 100].join("\n");
        let img = render_text(&text, 1200, 900, true);
        assert_eq!(img.height(), MARGIN * 2 + 100 * LINE_HEIGHT);

        let fixed = render_text(&text, 1200, 900, false);
        assert_eq!(fixed.height(), 900);
    }

    #[test]
    fn test_unknown_glyph_falls_back() {
        assert_eq!(glyph('\u{4E2D}'), BASIC_FONTS.get('?').unwrap());
    }
}
