//! Command-line quoting for Windows-style targets.
//!
//! Two dialects are supported. [`QuoteDialect::Exe`] follows the C runtime
//! startup rules (`CommandLineToArgvW`): backslashes are literal unless they
//! precede a double quote, and a literal quote is written as `\"`.
//! [`QuoteDialect::Bat`] follows `cmd.exe`: there is no backslash escaping,
//! the operator characters `& | < > ( ) ^` are only literal inside quotes, and
//! a literal quote inside a quoted token is written as `""`.
//!
//! Every function here is total: any input string, including empty or
//! whitespace-only input, produces a token that the target's own parser reads
//! back as exactly one argument equal to the input (see [`crate::argv`]).

use std::fmt;
use std::path::Path;

/// Characters `cmd.exe` treats as operators or escapes outside quotes
const BAT_SPECIAL: &[char] = &['&', '|', '<', '>', '(', ')', '^'];

/// Quoting rule set, picked from the target file's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteDialect {
    /// Native executables parsed by the C runtime
    Exe,
    /// Batch files parsed by `cmd.exe`
    Bat,
    /// Unknown targets; fragments pass through untouched
    #[default]
    None,
}

impl QuoteDialect {
    /// Select a dialect from an extension such as `".EXE"`, `"bat"` or `"txt"`
    pub fn from_extension(extension: &str) -> Self {
        let ext = extension.trim();
        let ext = ext.strip_prefix('.').unwrap_or(ext);

        if ext.eq_ignore_ascii_case("exe") {
            QuoteDialect::Exe
        } else if ext.eq_ignore_ascii_case("bat") || ext.eq_ignore_ascii_case("cmd") {
            QuoteDialect::Bat
        } else {
            QuoteDialect::None
        }
    }

    /// Select a dialect from the extension of `path`
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(QuoteDialect::None)
    }

    /// Escape one raw fragment. A missing fragment is treated as empty.
    pub fn escape(self, raw: Option<&str>, force_quote: bool) -> String {
        let raw = raw.unwrap_or("");
        match self {
            QuoteDialect::Exe => quote_exe_argument(raw, force_quote),
            QuoteDialect::Bat => quote_bat_argument(raw, force_quote),
            QuoteDialect::None => raw.to_string(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuoteDialect::Exe => "exe",
            QuoteDialect::Bat => "bat",
            QuoteDialect::None => "none",
        }
    }
}

impl fmt::Display for QuoteDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_blank(raw: &str) -> bool {
    raw.chars().all(char::is_whitespace)
}

/// Quote `raw` for a native executable.
///
/// Blank input always becomes a quoted (possibly empty) token. Otherwise the
/// argument is left alone when the C runtime would already read it back as one
/// unchanged token, unless `force_quote` is set.
pub fn quote_exe_argument(raw: &str, force_quote: bool) -> String {
    if is_blank(raw) {
        return format!("\"{}\"", raw);
    }

    if !force_quote && !exe_needs_quotes(raw) {
        return raw.to_string();
    }

    let mut quoted = String::with_capacity(raw.len() + 2);
    quoted.push('"');

    let mut backslashes = 0usize;
    for c in raw.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // 2n backslashes before an escaped quote keep n literal ones
                push_backslashes(&mut quoted, backslashes * 2 + 1);
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                push_backslashes(&mut quoted, backslashes);
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    // The closing quote follows, so a trailing run must be doubled too
    push_backslashes(&mut quoted, backslashes * 2);

    quoted.push('"');
    quoted
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat('\\').take(count));
}

/// A bare token is stable under the C runtime parser as long as it has no
/// separator and no quote; backslashes are literal when not before a quote.
fn exe_needs_quotes(raw: &str) -> bool {
    raw.chars().any(|c| c.is_whitespace() || c == '"')
}

/// Quote `raw` for a batch file.
///
/// Embedded quotes are doubled; backslashes are never touched.
pub fn quote_bat_argument(raw: &str, force_quote: bool) -> String {
    if is_blank(raw) {
        return format!("\"{}\"", raw);
    }

    if !force_quote && !bat_needs_quotes(raw) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\"\""))
}

/// Caret escapes are consumed by `cmd.exe` before the script sees them, so a
/// raw `^` is quoted rather than trusted as an escape.
fn bat_needs_quotes(raw: &str) -> bool {
    raw.chars()
        .any(|c| c.is_whitespace() || c == '"' || BAT_SPECIAL.contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argv::{split_bat, split_exe};
    use proptest::prelude::*;

    const SAMPLES: &[&str] = &[
        "a b",
        "a\"b",
        "a\\\"b",
        "a\\\\",
        "\"\"",
        "",
        "   ",
        "\"a b\"",
        "C:\\Program Files\\",
        "\\\\server\\share",
        "say \"hi\" \\",
        "tab\there",
    ];

    #[test]
    fn exe_plain_word_passes_through() {
        assert_eq!(quote_exe_argument("hello", false), "hello");
        assert_eq!(quote_exe_argument("C:\\dir\\file.txt", false), "C:\\dir\\file.txt");
        assert_eq!(quote_exe_argument("a\\\\", false), "a\\\\");
    }

    #[test]
    fn exe_blank_becomes_quoted() {
        assert_eq!(quote_exe_argument("", false), "\"\"");
        assert_eq!(quote_exe_argument("  ", true), "\"  \"");
        assert_eq!(QuoteDialect::Exe.escape(None, false), "\"\"");
    }

    #[test]
    fn exe_escapes_quotes_and_backslash_runs() {
        assert_eq!(quote_exe_argument("hello world", false), "\"hello world\"");
        assert_eq!(quote_exe_argument("a\"b", false), "\"a\\\"b\"");
        assert_eq!(quote_exe_argument("a\\\"b", false), "\"a\\\\\\\"b\"");
        assert_eq!(quote_exe_argument("dir\\", true), "\"dir\\\\\"");
        assert_eq!(quote_exe_argument("a\\b c", false), "\"a\\b c\"");
    }

    #[test]
    fn bat_quotes_operators() {
        assert_eq!(quote_bat_argument("1 & 2", false), "\"1 & 2\"");
        assert_eq!(quote_bat_argument("a&b", false), "\"a&b\"");
        assert_eq!(quote_bat_argument("a^&b", false), "\"a^&b\"");
        assert_eq!(quote_bat_argument("(x)", false), "\"(x)\"");
    }

    #[test]
    fn bat_doubles_quotes_and_keeps_backslashes() {
        assert_eq!(quote_bat_argument("a\"b", false), "\"a\"\"b\"");
        assert_eq!(quote_bat_argument("dir\\", true), "\"dir\\\"");
        assert_eq!(quote_bat_argument("C:\\temp", false), "C:\\temp");
    }

    #[test]
    fn none_dialect_is_identity() {
        assert_eq!(QuoteDialect::None.escape(Some("a \"b\""), true), "a \"b\"");
        assert_eq!(QuoteDialect::None.escape(None, true), "");
    }

    #[test]
    fn dialect_from_extension() {
        assert_eq!(QuoteDialect::from_extension(".EXE"), QuoteDialect::Exe);
        assert_eq!(QuoteDialect::from_extension("exe"), QuoteDialect::Exe);
        assert_eq!(QuoteDialect::from_extension(" .Bat "), QuoteDialect::Bat);
        assert_eq!(QuoteDialect::from_extension(".cmd"), QuoteDialect::Bat);
        assert_eq!(QuoteDialect::from_extension(".ps1"), QuoteDialect::None);
        assert_eq!(QuoteDialect::from_extension(""), QuoteDialect::None);
        assert_eq!(
            QuoteDialect::from_path(Path::new("/srv/scripts/Report.Exe")),
            QuoteDialect::Exe
        );
        assert_eq!(QuoteDialect::from_path(Path::new("/usr/bin/env")), QuoteDialect::None);
    }

    #[test]
    fn exe_samples_round_trip() {
        for raw in SAMPLES {
            let token = quote_exe_argument(raw, false);
            assert_eq!(split_exe(&token), vec![raw.to_string()], "token {token}");
        }
    }

    #[test]
    fn bat_samples_round_trip() {
        for raw in SAMPLES.iter().chain(&["a&b", "a^&b", "x|y", "<in>", "^"]) {
            let token = quote_bat_argument(raw, false);
            assert_eq!(split_bat(&token), vec![raw.to_string()], "token {token}");
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn plain_words_are_untouched(raw in "[A-Za-z0-9_.:/=,+-]{1,24}") {
            prop_assert_eq!(quote_exe_argument(&raw, false), raw.clone());
            prop_assert_eq!(quote_bat_argument(&raw, false), raw);
        }

        #[test]
        fn exe_round_trips(raw in any::<String>(), force in any::<bool>()) {
            let token = quote_exe_argument(&raw, force);
            prop_assert_eq!(split_exe(&token), vec![raw]);
        }

        #[test]
        fn bat_round_trips(raw in any::<String>(), force in any::<bool>()) {
            let token = quote_bat_argument(&raw, force);
            prop_assert_eq!(split_bat(&token), vec![raw]);
        }

        #[test]
        fn force_quote_frames_token(raw in any::<String>()) {
            for token in [quote_exe_argument(&raw, true), quote_bat_argument(&raw, true)] {
                prop_assert!(token.len() >= 2);
                prop_assert!(token.starts_with('"') && token.ends_with('"'));
            }
        }

        #[test]
        fn exe_pass_through_is_single_token(raw in any::<String>()) {
            let token = quote_exe_argument(&raw, false);
            if token == raw {
                prop_assert_eq!(split_exe(&raw).len(), 1);
            }
        }
    }
}
