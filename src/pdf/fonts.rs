//! Standard Type 1 fonts: metrics and text encoding.
//!
//! Widths are the AFM advance widths in 1/1000 text-space units for the
//! printable ASCII range. Characters outside it use `DEFAULT_WIDTH`.

use lopdf::{dictionary, Dictionary};
use tracing::warn;

/// Advance width used for characters without a metric
pub const DEFAULT_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611,
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556,
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611,
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// One of the standard 14 fonts with known metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    Courier,
    CourierBold,
}

impl StandardFont {
    /// Look up a font by its PDF base-font name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Helvetica" => Some(Self::Helvetica),
            "Helvetica-Bold" => Some(Self::HelveticaBold),
            "Helvetica-Oblique" => Some(Self::HelveticaOblique),
            "Helvetica-BoldOblique" => Some(Self::HelveticaBoldOblique),
            "Courier" => Some(Self::Courier),
            "Courier-Bold" => Some(Self::CourierBold),
            _ => None,
        }
    }

    /// Look up a font, falling back to Helvetica for unknown names
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(font = %name, "Unknown font, falling back to Helvetica");
            Self::Helvetica
        })
    }

    /// PDF base-font name
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Helvetica => "Helvetica",
            Self::HelveticaBold => "Helvetica-Bold",
            Self::HelveticaOblique => "Helvetica-Oblique",
            Self::HelveticaBoldOblique => "Helvetica-BoldOblique",
            Self::Courier => "Courier",
            Self::CourierBold => "Courier-Bold",
        }
    }

    /// Advance width of `c` in 1/1000 units
    pub fn char_width(&self, c: char) -> u16 {
        let code = c as u32;
        if !(32..127).contains(&code) {
            return DEFAULT_WIDTH;
        }
        let index = (code - 32) as usize;

        match self {
            Self::Helvetica | Self::HelveticaOblique => HELVETICA_WIDTHS[index],
            Self::HelveticaBold | Self::HelveticaBoldOblique => HELVETICA_BOLD_WIDTHS[index],
            Self::Courier | Self::CourierBold => 600,
        }
    }

    /// Rendered width of `text` at `size` points
    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| self.char_width(c) as u32).sum();
        units as f32 * size / 1000.0
    }

    /// Font resource dictionary
    pub fn resource(&self) -> Dictionary {
        dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => self.base_name(),
            "Encoding" => "WinAnsiEncoding",
        }
    }
}

/// Encode text for a WinAnsi-encoded simple font.
///
/// Characters without a WinAnsi code become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => match c {
                '€' => 0x80,
                '‚' => 0x82,
                '„' => 0x84,
                '…' => 0x85,
                '‘' => 0x91,
                '’' => 0x92,
                '“' => 0x93,
                '”' => 0x94,
                '•' => 0x95,
                '–' => 0x96,
                '—' => 0x97,
                '™' => 0x99,
                _ => b'?',
            },
        })
        .collect()
}

/// Decode bytes shown with a simple font, treating codes as Latin-1
pub fn decode_simple(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| match b {
            0x85 => '…',
            0x91 => '‘',
            0x92 => '’',
            0x93 => '“',
            0x94 => '”',
            0x96 => '–',
            0x97 => '—',
            _ => *b as char,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_widths() {
        let font = StandardFont::Helvetica;
        assert_eq!(font.char_width(' '), 278);
        assert_eq!(font.char_width('.'), 278);
        assert_eq!(font.char_width('W'), 944);
        assert_eq!(font.char_width('i'), 222);
        assert_eq!(font.char_width('é'), DEFAULT_WIDTH);

        assert_eq!(StandardFont::HelveticaBold.char_width('b'), 611);
        assert_eq!(StandardFont::Courier.char_width('i'), 600);
    }

    #[test]
    fn test_text_width_scales_with_size() {
        let font = StandardFont::Helvetica;
        let width = font.text_width("..", 10.0);
        assert!((width - 5.56).abs() < 1e-4);
    }

    #[test]
    fn test_unknown_font_falls_back() {
        assert_eq!(StandardFont::resolve("Comic Sans"), StandardFont::Helvetica);
        assert_eq!(StandardFont::resolve("Helvetica-Bold"), StandardFont::HelveticaBold);
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Abc"), b"Abc".to_vec());
        assert_eq!(encode_win_ansi("café"), vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(encode_win_ansi("a…"), vec![b'a', 0x85]);
        assert_eq!(encode_win_ansi("日"), vec![b'?']);
        assert_eq!(decode_simple(&encode_win_ansi("Café…")), "Café…");
    }
}
