//! Display titles for table-of-contents entries.

use std::sync::OnceLock;

use regex::Regex;

/// Appended to truncated titles
pub const ELLIPSIS: &str = "...";

/// Appended to titles of items that are ready to play
pub const READY_MARKER: char = '*';

/// Difficulty symbols indexed by bin (bin 0 has none)
const DIFFICULTY_SYMBOLS: [char; 5] = ['○', '◔', '◑', '◕', '●'];

static ANNOTATIONS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Annotation patterns, applied in order
fn annotations() -> &'static [Regex] {
    ANNOTATIONS.get_or_init(|| {
        let patterns = [
            // (feat. X) / [featuring X]
            r"(?i)\s*[\(\[][^\)\]]*(?:feat\.|featuring)[^\)\]]*[\)\]]",
            // Any remaining [..]
            r"\s*\[[^\]]*\]",
            // (Radio Edit), (2011 Remaster Version), ...
            r"(?i)\s*\([^)]*(?:Radio|Single|Edit|Version|Mix|Remix|Mono)\b[^)]*\)",
        ];
        patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
    })
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip featuring and version annotations, collapse whitespace and
/// truncate to `max_length` characters.
///
/// Truncation reserves room for [`ELLIPSIS`] and prefers the last word
/// boundary when it lies beyond half the limit. Limits of 3 or fewer cut
/// without an ellipsis.
pub fn short_title(title: &str, max_length: Option<usize>) -> String {
    let mut cleaned = title.trim().to_string();
    for pattern in annotations() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }
    let cleaned = collapse_whitespace(&cleaned);

    let Some(max) = max_length else {
        return cleaned;
    };
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.len() <= max {
        return cleaned;
    }

    if max <= ELLIPSIS.len() {
        return chars[..max].iter().collect();
    }

    let keep = max - ELLIPSIS.len();
    let cut = match chars[..keep].iter().rposition(|c| *c == ' ') {
        Some(space) if space > max / 2 => space,
        _ => keep,
    };

    let mut short: String = chars[..cut].iter().collect();
    short.push_str(ELLIPSIS);
    short
}

/// Symbol for a difficulty bin: 1 quarter, 2 half, 3 three-quarter,
/// 4 and 5 full. Bin 0 and out-of-range bins have none.
pub fn difficulty_symbol(bin: u8) -> Option<char> {
    match bin {
        1..=3 => Some(DIFFICULTY_SYMBOLS[bin as usize]),
        4 | 5 => Some(DIFFICULTY_SYMBOLS[4]),
        _ => None,
    }
}

/// Filled fraction of the pie drawn for a difficulty bin
pub fn difficulty_fraction(bin: u8) -> Option<f32> {
    match bin {
        1 => Some(0.25),
        2 => Some(0.5),
        3 => Some(0.75),
        4 | 5 => Some(1.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_featuring_annotations() {
        assert_eq!(short_title("Song (feat. Someone)", None), "Song");
        assert_eq!(short_title("Song [Featuring Other]", None), "Song");
        assert_eq!(short_title("Song [Live]", None), "Song");
        assert_eq!(short_title("Track (Radio Edit)", None), "Track");
        assert_eq!(short_title("Track (2011 Remastered Version)", None), "Track");
        assert_eq!(short_title("Track (mono)", None), "Track");
        assert_eq!(short_title("Love (Is All Around)", None), "Love (Is All Around)");
        assert_eq!(short_title("  Lots   of\tspace  ", None), "Lots of space");
        assert_eq!(short_title("Two\n\nLines (Radio Edit)", None), "Two Lines");
    }

    #[test]
    fn test_truncates_at_word_boundary() {
        let title = "The quick brown fox jumps over";
        // keep = 17 chars: "The quick brown f", last space at 15 > 10
        assert_eq!(short_title(title, Some(20)), "The quick brown...");
        // keep = 7 chars: "The qui", last space at 3, not beyond 5
        assert_eq!(short_title(title, Some(10)), "The qui...");
        assert_eq!(short_title("Supercalifragilistic", Some(10)), "Superca...");
    }

    #[test]
    fn test_short_limits_hard_cut() {
        assert_eq!(short_title("Hello", Some(3)), "Hel");
        assert_eq!(short_title("Hello", Some(5)), "Hello");
        assert_eq!(short_title("Hi", Some(1)), "H");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(short_title("Café Société", Some(12)), "Café Société");
        assert_eq!(short_title("Ééééééééé", Some(6)), "Ééé...");
    }

    #[test]
    fn test_difficulty_symbols() {
        assert_eq!(difficulty_symbol(0), None);
        assert_eq!(difficulty_symbol(1), Some('◔'));
        assert_eq!(difficulty_symbol(2), Some('◑'));
        assert_eq!(difficulty_symbol(3), Some('◕'));
        assert_eq!(difficulty_symbol(4), Some('●'));
        assert_eq!(difficulty_symbol(5), Some('●'));
        assert_eq!(difficulty_symbol(6), None);
        assert_eq!(difficulty_fraction(2), Some(0.5));
    }
}
