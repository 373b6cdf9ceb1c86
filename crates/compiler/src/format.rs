//! Delimiter-depth formatter for emitted text.
//!
//! Re-indents every line by the number of open `{`, `[` and `(` that
//! precede it. All delimiters opened on one line count as a single level,
//! so `[for v in x {` indents its body once. Delimiters inside string
//! literals and `//` comments are ignored and multi-line strings are copied
//! through untouched.

use crate::error::FormatError;

/// Re-indent `text` with `indent` per level.
pub fn tidy(text: &str, indent: &str) -> Result<String, FormatError> {
    let mut out = String::with_capacity(text.len());
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut raw_string: Option<&'static str> = None;
    let mut blank_run = false;

    for (number, line) in text.lines().enumerate() {
        let number = number + 1;

        if let Some(terminator) = raw_string {
            out.push_str(line.trim_end());
            out.push('\n');
            if line.trim_start().starts_with(terminator) {
                raw_string = None;
            }
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !blank_run && !out.is_empty() {
                out.push('\n');
            }
            blank_run = true;
            continue;
        }
        blank_run = false;

        let mut chars = trimmed.char_indices().peekable();
        // Leading closers dedent the line they start.
        while let Some(&(_, ch)) = chars.peek() {
            if !is_close(ch) {
                break;
            }
            pop(&mut stack, ch, number)?;
            chars.next();
        }
        let level = stack.last().map(|&(_, inner)| inner).unwrap_or(0);

        while let Some((i, ch)) = chars.next() {
            match ch {
                '/' if trimmed[i..].starts_with("//") => break,
                '"' | '#' => {
                    let rest = &trimmed[i..];
                    if rest.starts_with("#\"\"\"") || rest.starts_with("\"\"\"") {
                        if !closes_on_same_line(rest) {
                            raw_string = Some(if ch == '#' { "\"\"\"#" } else { "\"\"\"" });
                        }
                        break;
                    }
                    if ch == '"' {
                        skip_string(&mut chars, number)?;
                    }
                }
                '{' | '[' | '(' => stack.push((ch, level + 1)),
                '}' | ']' | ')' => pop(&mut stack, ch, number)?,
                _ => {}
            }
        }

        for _ in 0..level {
            out.push_str(indent);
        }
        out.push_str(trimmed);
        out.push('\n');
    }

    if raw_string.is_some() {
        return Err(FormatError::UnterminatedString {
            line: text.lines().count(),
        });
    }
    if !stack.is_empty() {
        return Err(FormatError::UnclosedDelimiter { open: stack.len() });
    }
    if !text.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    Ok(out)
}

/// Format `text`, or log and return it unchanged when formatting fails.
pub fn format_or_original(text: &str, indent: &str) -> String {
    match tidy(text, indent) {
        Ok(formatted) => formatted,
        Err(err) => {
            tracing::warn!(error = %err, "formatting failed, keeping unformatted text");
            text.to_string()
        }
    }
}

fn is_close(ch: char) -> bool {
    matches!(ch, '}' | ']' | ')')
}

fn opener_for(close: char) -> char {
    match close {
        '}' => '{',
        ']' => '[',
        _ => '(',
    }
}

fn closer_for(open: char) -> char {
    match open {
        '{' => '}',
        '[' => ']',
        _ => ')',
    }
}

fn pop(stack: &mut Vec<(char, usize)>, found: char, line: usize) -> Result<(), FormatError> {
    match stack.pop() {
        None => Err(FormatError::UnexpectedClose { line, found }),
        Some((open, _)) if open == opener_for(found) => Ok(()),
        Some((open, _)) => Err(FormatError::Unbalanced {
            line,
            found,
            expected: closer_for(open),
        }),
    }
}

fn closes_on_same_line(rest: &str) -> bool {
    let body = rest.trim_start_matches('#');
    body.len() > 3 && body[3..].contains("\"\"\"")
}

/// Advance past a single-line string literal.
fn skip_string<I>(chars: &mut std::iter::Peekable<I>, line: usize) -> Result<(), FormatError>
where
    I: Iterator<Item = (usize, char)>,
{
    while let Some((_, ch)) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '"' => return Ok(()),
            _ => {}
        }
    }
    Err(FormatError::UnterminatedString { line })
}
