//! Terminal output sanitization
//!
//! Tunnel clients write for a terminal: colour codes, cursor movement and
//! padding used to overwrite progress indicators. These helpers reduce a raw
//! line to the characters a reader would actually see.

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI escape: `ESC [`, parameter bytes, intermediate bytes, one final byte.
static ANSI_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("Invalid ANSI regex pattern"));

/// Remove CSI escape sequences.
pub fn strip_ansi(text: &str) -> std::borrow::Cow<'_, str> {
    ANSI_SEQUENCE.replace_all(text, "")
}

/// Anything but letters, marks, numbers, punctuation, symbols and the
/// ASCII space. Unassigned code points belong to none of these classes.
static NON_PRINTABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{L}\p{M}\p{N}\p{P}\p{S} ]").expect("Invalid printable regex pattern")
});

/// Reduce raw line content to printable text.
///
/// Escape sequences go first so that their parameter bytes are not left
/// behind once the ESC byte itself is filtered out.
pub fn sanitize_line(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let stripped = strip_ansi(raw);
    let printable = NON_PRINTABLE.replace_all(&stripped, "");
    printable.trim_start_matches([' ', '\u{00A0}']).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_colour_codes() {
        assert_eq!(strip_ansi("\x1b[32mOK\x1b[0m"), "OK");
        assert_eq!(strip_ansi("\x1b[1;31mfatal\x1b[m: x"), "fatal: x");
    }

    #[test]
    fn test_strip_ansi_cursor_and_private_modes() {
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gprogress"), "progress");
        assert_eq!(strip_ansi("\x1b[?25lhidden\x1b[?25h"), "hidden");
        // Intermediate byte before the final byte
        assert_eq!(strip_ansi("a\x1b[1 qb"), "ab");
    }

    #[test]
    fn test_sanitize_drops_controls_and_tabs() {
        assert_eq!(sanitize_line("a\tb\x07c\x00d"), "abcd");
        assert_eq!(sanitize_line("x\u{7f}y\u{85}z\u{9f}"), "xyz");
    }

    #[test]
    fn test_sanitize_lone_escape_is_dropped() {
        // Not a CSI sequence: only the ESC byte itself goes
        assert_eq!(sanitize_line("\x1b]0;title"), "]0;title");
    }

    #[test]
    fn test_sanitize_trims_leading_space_and_nbsp_only() {
        assert_eq!(sanitize_line("   \u{00A0} hello  world "), "hello  world ");
    }

    #[test]
    fn test_sanitize_keeps_unicode_text() {
        assert_eq!(sanitize_line("connecté ✓ 接続"), "connecté ✓ 接続");
        assert_eq!(sanitize_line("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn test_sanitize_drops_format_and_unassigned() {
        // Tag letter, musical format control, then two unassigned code points
        assert_eq!(sanitize_line("a\u{E0041}b\u{1D173}c"), "abc");
        assert_eq!(sanitize_line("a\u{378}b\u{890}c"), "abc");
        // Private use, interior NBSP and other non-ASCII spaces
        assert_eq!(sanitize_line("x\u{E000}y\u{00A0}z\u{2003}w"), "xyzw");
    }

    #[test]
    fn test_sanitize_keeps_replacement_character() {
        assert_eq!(sanitize_line("bad \u{FFFD} byte"), "bad \u{FFFD} byte");
    }

    #[test]
    fn test_sanitize_all_noise_is_empty() {
        assert_eq!(sanitize_line("\x1b[0m\t \x08"), "");
        assert_eq!(sanitize_line(""), "");
    }
}
