//! Splitting of one-line (`.list`) entries into fields.
//!
//! A line is whitespace-delimited except for the bracketed option group that
//! follows the type keyword, which is kept as a single token. Brackets and `%`
//! appearing anywhere else (for instance inside a URI) are percent-encoded
//! before splitting and restored afterwards, so only the option group's
//! brackets are ever seen by the splitter.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{Result, SourceError};

const BRACKETS: &AsciiSet = &CONTROLS.add(b'%').add(b'[').add(b']');

/// Tokenizes a legacy entry (without its comment region).
///
/// Returns the type keyword, the option group if present, the URI, the suite and
/// any components, in that order.
///
/// # Errors
///
/// [`SourceError::MalformedLine`] when brackets are unbalanced or nested, or when
/// fewer than a URI and a suite follow the type and options.
pub fn tokenize(line: &str) -> Result<Vec<String>> {
    let protected = protect(line);
    let tokens = split(&protected).map_err(|reason| SourceError::malformed(line, reason))?;

    let tokens: Vec<String> = tokens
        .into_iter()
        .map(|token| {
            if token.starts_with('[') {
                token.to_string()
            } else {
                percent_decode_str(token).decode_utf8_lossy().into_owned()
            }
        })
        .collect();

    let leading = match tokens.get(1) {
        Some(token) if is_option_group(token) => 2,
        _ => 1,
    };
    if tokens.len() < leading + 2 {
        return Err(SourceError::malformed(
            line,
            "expected a type, a URI and a suite",
        ));
    }

    Ok(tokens)
}

/// Whether a token is a bracketed option group.
pub fn is_option_group(token: &str) -> bool {
    token.starts_with('[') && token.ends_with(']')
}

/// Byte offset of the first `#` outside the option group, if any.
///
/// Everything from that offset on is the line's comment region.
pub fn comment_start(line: &str) -> Option<usize> {
    let group = option_group_span(line);
    line.char_indices()
        .filter(|(idx, _)| !matches!(group, Some((start, end)) if (start..=end).contains(idx)))
        .find(|(_, c)| *c == '#')
        .map(|(idx, _)| idx)
}

/// Byte span (inclusive) of the `[...]` group that directly follows the first word.
fn option_group_span(line: &str) -> Option<(usize, usize)> {
    let first_end = line.find(|c: char| !c.is_whitespace())?;
    let word_len = line[first_end..]
        .find(char::is_whitespace)
        .unwrap_or(line.len() - first_end);
    let after_word = first_end + word_len;
    let group_start = after_word + line[after_word..].find(|c: char| !c.is_whitespace())?;

    if !line[group_start..].starts_with('[') {
        return None;
    }
    let close = line[group_start..].find(']')?;
    Some((group_start, group_start + close))
}

/// Encodes every non-whitespace run outside the option group.
///
/// An option group without a closing bracket is left untouched so that the
/// splitter reports it.
fn protect(line: &str) -> String {
    let line = line.trim();
    let group = option_group_span(line);
    let mut out = String::with_capacity(line.len());

    let mut cursor = 0;
    if let Some((_, end)) = group {
        out.push_str(&line[..=end]);
        cursor = end + 1;
    } else if let Some(bracket) = unterminated_group(line) {
        return line[..bracket].to_string() + &encode_runs(&line[bracket..], true);
    }

    out.push_str(&encode_runs(&line[cursor..], false));
    out
}

fn unterminated_group(line: &str) -> Option<usize> {
    let first_end = line.find(char::is_whitespace)?;
    let start = first_end + line[first_end..].find(|c: char| !c.is_whitespace())?;
    line[start..].starts_with('[').then_some(start)
}

/// Encodes whitespace-separated runs, optionally keeping the first run verbatim.
fn encode_runs(text: &str, keep_first: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut first = true;
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String, first: &mut bool| {
        if run.is_empty() {
            return;
        }
        if keep_first && *first {
            out.push_str(run);
        } else {
            out.extend(utf8_percent_encode(run, BRACKETS));
        }
        *first = false;
        run.clear();
    };

    for c in text.chars() {
        if c.is_whitespace() {
            flush(&mut run, &mut out, &mut first);
            out.push(c);
        } else {
            run.push(c);
        }
    }
    flush(&mut run, &mut out, &mut first);

    out
}

/// Bracket-aware whitespace splitter.
fn split(line: &str) -> std::result::Result<Vec<&str>, &'static str> {
    let mut tokens = Vec::new();
    let mut start = None;
    let mut in_group = false;

    for (idx, c) in line.char_indices() {
        match c {
            '[' if in_group => return Err("nested '[' in option group"),
            '[' => {
                in_group = true;
                start.get_or_insert(idx);
            }
            ']' if !in_group => return Err("unbalanced ']'"),
            ']' => in_group = false,
            c if c.is_whitespace() && !in_group => {
                if let Some(s) = start.take() {
                    tokens.push(&line[s..idx]);
                }
            }
            _ => {
                start.get_or_insert(idx);
            }
        }
    }

    if in_group {
        return Err("unterminated option group");
    }
    if let Some(s) = start {
        tokens.push(&line[s..]);
    }

    Ok(tokens)
}
