//! Splitting a rendered command line back into arguments.
//!
//! These are the parsers the quoting dialects in [`crate::quote`] target. On
//! platforms without a raw command-line spawn API the process runner uses
//! [`split_exe`] to turn the rendered command line into an argv vector.

use std::iter::Peekable;
use std::str::Chars;

fn is_separator(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn skip_separators(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| is_separator(*c)).is_some() {}
}

/// Split using the C runtime / `CommandLineToArgvW` rules.
///
/// - Spaces and tabs separate arguments outside quotes.
/// - `2n` backslashes before `"` yield `n` backslashes and the quote toggles
///   quoting; `2n + 1` backslashes yield `n` backslashes and a literal `"`.
/// - Backslashes not followed by `"` are literal.
/// - Inside quotes, `""` yields a literal `"`.
pub fn split_exe(command_line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = command_line.chars().peekable();

    loop {
        skip_separators(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let mut current = String::new();
        let mut in_quotes = false;

        while let Some(&c) = chars.peek() {
            if is_separator(c) && !in_quotes {
                break;
            }
            chars.next();

            match c {
                '\\' => {
                    let mut backslashes = 1;
                    while chars.next_if_eq(&'\\').is_some() {
                        backslashes += 1;
                    }
                    if chars.peek() == Some(&'"') {
                        current.extend(std::iter::repeat('\\').take(backslashes / 2));
                        if backslashes % 2 == 1 {
                            chars.next();
                            current.push('"');
                        }
                    } else {
                        current.extend(std::iter::repeat('\\').take(backslashes));
                    }
                }
                '"' => {
                    if in_quotes && chars.next_if_eq(&'"').is_some() {
                        current.push('"');
                    } else {
                        in_quotes = !in_quotes;
                    }
                }
                _ => current.push(c),
            }
        }

        args.push(current);
    }

    args
}

/// Split the way a batch script receives its parameters (`%~1`, `%~2`, ...).
///
/// - Spaces and tabs separate arguments outside quotes.
/// - Outside quotes `^` escapes the next character.
/// - Inside quotes everything is literal and `""` yields a literal `"`.
/// - The quotes delimiting a region are removed.
pub fn split_bat(command_line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = command_line.chars().peekable();

    loop {
        skip_separators(&mut chars);
        if chars.peek().is_none() {
            break;
        }

        let mut current = String::new();
        let mut in_quotes = false;

        while let Some(&c) = chars.peek() {
            if is_separator(c) && !in_quotes {
                break;
            }
            chars.next();

            match c {
                '"' => {
                    if in_quotes && chars.next_if_eq(&'"').is_some() {
                        current.push('"');
                    } else {
                        in_quotes = !in_quotes;
                    }
                }
                '^' if !in_quotes => {
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                }
                _ => current.push(c),
            }
        }

        args.push(current);
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exe_splits_on_whitespace() {
        assert_eq!(split_exe("a  b\tc"), strings(&["a", "b", "c"]));
        assert_eq!(split_exe("   "), Vec::<String>::new());
        assert_eq!(split_exe(""), Vec::<String>::new());
    }

    #[test]
    fn exe_handles_quotes_and_backslashes() {
        assert_eq!(
            split_exe(r#""hello world" "a\"b""#),
            strings(&["hello world", "a\"b"])
        );
        assert_eq!(split_exe(r#"a\\b"#), strings(&[r"a\\b"]));
        assert_eq!(split_exe(r#""a\\" b"#), strings(&["a\\", "b"]));
        assert_eq!(split_exe(r#"a\\\"b"#), strings(&["a\\\"b"]));
        assert_eq!(split_exe(r#""" x"#), strings(&["", "x"]));
        assert_eq!(split_exe(r#"a"b c"d"#), strings(&["ab cd"]));
    }

    #[test]
    fn exe_doubled_quote_inside_quotes_is_literal() {
        assert_eq!(split_exe(r#""a""b""#), strings(&["a\"b"]));
    }

    #[test]
    fn bat_caret_escapes_outside_quotes() {
        assert_eq!(split_bat("a^&b"), strings(&["a&b"]));
        assert_eq!(split_bat(r#""a^&b""#), strings(&["a^&b"]));
    }

    #[test]
    fn bat_doubled_quotes() {
        assert_eq!(split_bat(r#""say ""hi""" next"#), strings(&["say \"hi\"", "next"]));
        assert_eq!(split_bat(r#""1 & 2""#), strings(&["1 & 2"]));
        assert_eq!(split_bat(r#""" """#), strings(&["", ""]));
    }
}
