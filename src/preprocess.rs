use crate::config::NewlineMode;

/// Prepare source text for playback.
///
/// Outside code mode only CR/LF characters are touched, one at a time, per
/// `newline_mode` (so a CRLF pair becomes two spaces in `Space` mode). Code
/// mode ignores `newline_mode`: line endings are normalized to `\n` and the
/// leading whitespace of every line is dropped.
pub fn preprocess(text: &str, newline_mode: NewlineMode, code_mode: bool) -> String {
    if code_mode {
        strip_leading_whitespace(text)
    } else {
        map_newlines(text, newline_mode)
    }
}

fn map_newlines(text: &str, mode: NewlineMode) -> String {
    if mode == NewlineMode::Keep {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\r' | '\n' => {
                if mode == NewlineMode::Space {
                    out.push(' ');
                }
            }
            _ => out.push(c),
        }
    }
    out
}

fn strip_leading_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start_of_line = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                chars.next_if_eq(&'\n');
                out.push('\n');
                start_of_line = true;
            }
            '\n' => {
                out.push('\n');
                start_of_line = true;
            }
            c if start_of_line && c.is_whitespace() => {}
            c => {
                out.push(c);
                start_of_line = false;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_mode_passes_text_through() {
        assert_eq!(preprocess("a\r\nb\n", NewlineMode::Keep, false), "a\r\nb\n");
    }

    #[test]
    fn space_mode_maps_each_cr_and_lf() {
        assert_eq!(preprocess("a\r\nb", NewlineMode::Space, false), "a  b");
        assert_eq!(preprocess("x\ny\rz", NewlineMode::Space, false), "x y z");
    }

    #[test]
    fn remove_mode_drops_line_breaks() {
        let out = preprocess("one\r\ntwo\nthree\r", NewlineMode::Remove, false);
        assert_eq!(out, "onetwothree");
    }

    #[test]
    fn non_code_mode_keeps_indentation() {
        assert_eq!(preprocess("  x\n\ty", NewlineMode::Keep, false), "  x\n\ty");
    }

    #[test]
    fn code_mode_normalizes_line_endings() {
        assert_eq!(preprocess("a\r\nb", NewlineMode::Space, true), "a\nb");
        assert_eq!(preprocess("a\rb\r\n\r\nc", NewlineMode::Remove, true), "a\nb\n\nc");
    }

    #[test]
    fn code_mode_strips_leading_whitespace_only() {
        let src = "fn main() {\n    let x = 1;\n\t\tif x {  y  }\n  \n}\n";
        let out = preprocess(src, NewlineMode::Space, true);
        assert_eq!(out, "fn main() {\nlet x = 1;\nif x {  y  }\n\n}\n");
    }

    #[test]
    fn code_mode_output_never_starts_a_line_with_whitespace() {
        let src = "   a\n \t b c\r\n\n      d  \n";
        let out = preprocess(src, NewlineMode::Keep, true);
        let chars: Vec<char> = out.chars().collect();
        for (i, c) in chars.iter().enumerate() {
            let line_start = i == 0 || chars[i - 1] == '\n';
            if line_start && *c != '\n' {
                assert!(!c.is_whitespace(), "whitespace at line start in {out:?}");
            }
        }
    }

    #[test]
    fn whitespace_only_input_becomes_empty_in_code_mode() {
        assert_eq!(preprocess("   \t  ", NewlineMode::Keep, true), "");
    }
}
