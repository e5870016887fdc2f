//! Text-level brace balancing for segment extraction.
//!
//! A segment cut from the middle of a well-formed Java file is usually not
//! independently parseable: it either opens braces it never closes, or closes
//! braces it never opened. This module detects the imbalance, repairs it with
//! a minimal and reversible transformation, and provides the exact inverse so
//! a mutated segment can be spliced back into the file it came from.
//!
//! Documentation comments (`/** ... */`) are skipped verbatim: braces inside
//! them never affect the balance computation.

pub mod errors;

pub use errors::BalanceError;

/// Spaces per nesting level when re-appending stripped closing braces.
pub const INDENT_STEP: usize = 4;

/// How an imbalanced text was repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    /// The text opened more braces than it closed; closers were appended.
    Unclosed,
    /// The text closed braces it never opened; it was truncated before the
    /// first unowned closing brace.
    Uninitiated,
}

/// Outcome of repairing an imbalanced text.
///
/// `delta` counts the braces appended (`Unclosed`) or stripped by truncation
/// (`Uninitiated`). The two kinds invert through [`strip_trailing_braces`]
/// and [`append_trailing_braces`] respectively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceResult {
    pub kind: BalanceKind,
    pub delta: usize,
    pub adjusted: String,
}

/// Advance past a `/** ... */` comment starting at `start`, if one starts
/// there. Returns the byte index just past the terminator.
fn skip_doc_comment(bytes: &[u8], start: usize) -> Result<Option<usize>, BalanceError> {
    if start + 2 >= bytes.len()
        || bytes[start] != b'/'
        || bytes[start + 1] != b'*'
        || bytes[start + 2] != b'*'
    {
        return Ok(None);
    }
    let mut i = start + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return Ok(Some(i + 2));
        }
        i += 1;
    }
    Err(BalanceError::UnterminatedComment { start })
}

/// Find the byte index of the first closing brace with no matching opener.
///
/// Fails with [`BalanceError::NoUnbalancedBrace`] if every closer is owned,
/// which callers treat as "this text should not have been scanned".
pub fn scan_unbalanced(text: &str) -> Result<usize, BalanceError> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_doc_comment(bytes, i)? {
            i = next;
            continue;
        }
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return Ok(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        i += 1;
    }
    Err(BalanceError::NoUnbalancedBrace)
}

/// Repair an imbalanced text, or return `None` if it is already balanced.
///
/// Under-closing texts get `delta` closers appended; over-closing texts are
/// truncated at the first unowned closer. The asymmetry is deliberate:
/// appended braces are trivially removable later, while truncated content
/// must survive [`is_cut_suitable`] before a cut is accepted.
pub fn balance(text: &str) -> Result<Option<BalanceResult>, BalanceError> {
    let bytes = text.as_bytes();
    // The stack from the two-symbol scan is always homogeneous: an opener
    // arriving on top of unmatched closers is a malformed nesting error.
    let mut unclosed_open = 0usize;
    let mut unmatched_close = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(next) = skip_doc_comment(bytes, i)? {
            i = next;
            continue;
        }
        match bytes[i] {
            b'{' => {
                if unmatched_close > 0 {
                    return Err(BalanceError::MalformedNesting);
                }
                unclosed_open += 1;
            }
            b'}' => {
                if unclosed_open > 0 {
                    unclosed_open -= 1;
                } else {
                    unmatched_close += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if unclosed_open == 0 && unmatched_close == 0 {
        return Ok(None);
    }

    if unclosed_open > 0 {
        let mut adjusted = String::with_capacity(text.len() + unclosed_open);
        adjusted.push_str(text);
        for _ in 0..unclosed_open {
            adjusted.push('}');
        }
        Ok(Some(BalanceResult {
            kind: BalanceKind::Unclosed,
            delta: unclosed_open,
            adjusted,
        }))
    } else {
        let cut = scan_unbalanced(text)?;
        Ok(Some(BalanceResult {
            kind: BalanceKind::Uninitiated,
            delta: unmatched_close,
            adjusted: text[..cut].to_string(),
        }))
    }
}

/// Decide whether `text` is an acceptable side of a candidate segment cut.
///
/// A cut is acceptable unless repairing it would truncate actual code: for an
/// `Uninitiated` repair the discarded tail may contain only whitespace,
/// braces, parentheses, and semicolons. Balanced and `Unclosed` texts pass
/// unconditionally; texts that cannot be balanced at all fail.
pub fn is_cut_suitable(text: &str) -> bool {
    let result = match balance(text) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let Some(result) = result else {
        return true;
    };
    if result.kind == BalanceKind::Unclosed {
        return true;
    }
    let discarded = &text[result.adjusted.len()..];
    discarded
        .chars()
        .all(|c| c.is_whitespace() || matches!(c, '{' | '}' | '(' | ')' | ';'))
}

/// Remove the last `n` closing braces from `text`, inverting an `Unclosed`
/// repair. Returns the text unchanged if it holds fewer than `n` closers.
pub fn strip_trailing_braces(text: &str, n: usize) -> String {
    if n == 0 {
        return text.to_string();
    }
    let mut remaining = n;
    for (i, b) in text.bytes().enumerate().rev() {
        if b == b'}' {
            remaining -= 1;
            if remaining == 0 {
                return text[..i].to_string();
            }
        }
    }
    text.to_string()
}

/// Append `n` closing braces, each one indentation level shallower than the
/// last, inverting an `Uninitiated` repair.
///
/// Fails if `level` cannot absorb `n` de-indent steps without going past
/// column 0.
pub fn append_trailing_braces(
    text: &str,
    n: usize,
    level: usize,
) -> Result<String, BalanceError> {
    if n * INDENT_STEP > level {
        return Err(BalanceError::InvalidIndentation {
            level,
            braces: n,
            step: INDENT_STEP,
        });
    }
    let mut out = text.to_string();
    for i in 1..=n {
        out.push('\n');
        for _ in 0..(level - i * INDENT_STEP) {
            out.push(' ');
        }
        out.push('}');
    }
    Ok(out)
}

/// Strip the common leading indentation from every line, returning the
/// stripped text and the removed width. Blank lines do not participate in
/// the minimum.
pub fn reset_indentation(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.split('\n').collect();
    let level = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let stripped: Vec<&str> = lines
        .iter()
        .map(|line| {
            let cut = level.min(line.len());
            &line[cut..]
        })
        .collect();
    (stripped.join("\n"), level)
}

/// Prefix every line, blank lines included, with `level` spaces. Inverse of
/// [`reset_indentation`].
pub fn set_indentation(text: &str, level: usize) -> String {
    let prefix = " ".repeat(level);
    text.split('\n')
        .map(|line| format!("{prefix}{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace each tab with four spaces. Segment column arithmetic assumes
/// space-only indentation.
pub fn normalize_tabs(text: &str) -> String {
    text.replace('\t', "    ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_text_yields_none() {
        assert_eq!(balance("class A { int x; }").unwrap(), None);
        assert_eq!(balance("").unwrap(), None);
        assert_eq!(balance("no braces at all").unwrap(), None);
    }

    #[test]
    fn unclosed_text_gets_closers_appended() {
        let result = balance("class A {\n  void f() {").unwrap().unwrap();
        assert_eq!(result.kind, BalanceKind::Unclosed);
        assert_eq!(result.delta, 2);
        assert_eq!(result.adjusted, "class A {\n  void f() {}}");
    }

    #[test]
    fn uninitiated_text_gets_truncated() {
        let result = balance("  return x;\n  }\n}").unwrap().unwrap();
        assert_eq!(result.kind, BalanceKind::Uninitiated);
        assert_eq!(result.delta, 2);
        assert_eq!(result.adjusted, "  return x;\n  ");
    }

    #[test]
    fn braces_inside_doc_comments_are_ignored() {
        let text = "/** example: if (x) { y(); } */\nint f() { return 0; }";
        assert_eq!(balance(text).unwrap(), None);
    }

    #[test]
    fn unterminated_doc_comment_is_an_error() {
        let err = balance("/** never closed\nint x;").unwrap_err();
        assert!(matches!(err, BalanceError::UnterminatedComment { .. }));
    }

    #[test]
    fn opener_after_unmatched_closer_is_malformed() {
        let err = balance("} {").unwrap_err();
        assert_eq!(err, BalanceError::MalformedNesting);
    }

    #[test]
    fn scan_finds_first_unowned_closer() {
        assert_eq!(scan_unbalanced("{ } } {").unwrap(), 4);
        assert!(matches!(
            scan_unbalanced("{ }"),
            Err(BalanceError::NoUnbalancedBrace)
        ));
    }

    #[test]
    fn strip_inverts_unclosed_repair() {
        let original = "void f() {\n  if (x) {";
        let result = balance(original).unwrap().unwrap();
        assert_eq!(result.kind, BalanceKind::Unclosed);
        assert_eq!(strip_trailing_braces(&result.adjusted, result.delta), original);
    }

    #[test]
    fn append_restores_brace_population_after_uninitiated_repair() {
        let original = "        return x;\n    }\n}";
        let result = balance(original).unwrap().unwrap();
        assert_eq!(result.kind, BalanceKind::Uninitiated);
        let restored = append_trailing_braces(&result.adjusted, result.delta, 8).unwrap();
        // Exact text equality is not guaranteed, but the closing braces the
        // truncation removed are all back.
        let closers = |s: &str| s.bytes().filter(|b| *b == b'}').count();
        assert_eq!(closers(&restored), closers(original));
        let rebalanced = balance(&restored).unwrap().unwrap();
        assert_eq!(rebalanced.kind, BalanceKind::Uninitiated);
        assert_eq!(rebalanced.delta, result.delta);
    }

    #[test]
    fn append_places_braces_at_decreasing_indent() {
        let out = append_trailing_braces("x();", 2, 8).unwrap();
        assert_eq!(out, "x();\n    }\n}");
    }

    #[test]
    fn append_rejects_impossible_indentation() {
        let err = append_trailing_braces("x();", 3, 8).unwrap_err();
        assert!(matches!(err, BalanceError::InvalidIndentation { .. }));
    }

    #[test]
    fn cut_suitability() {
        // Balanced and unclosed sides are always fine.
        assert!(is_cut_suitable("int x = 1;"));
        assert!(is_cut_suitable("void f() {\n  g();"));
        // Trailing scope closers may be discarded.
        assert!(is_cut_suitable("  g();\n  }\n}"));
        // Real code in the discarded tail is not.
        assert!(!is_cut_suitable("}\nint tail = 1;"));
        // Unbalanceable text fails outright.
        assert!(!is_cut_suitable("} {"));
    }

    #[test]
    fn indentation_round_trip() {
        let text = "    void f() {\n\n        g();\n    }";
        let (stripped, level) = reset_indentation(text);
        assert_eq!(level, 4);
        assert_eq!(stripped, "void f() {\n\n    g();\n}");
        // Blank lines pick up the prefix on the way back; content lines match.
        let restored = set_indentation(&stripped, level);
        assert_eq!(restored.split('\n').next(), text.split('\n').next());
    }

    #[test]
    fn reset_indentation_of_blank_text() {
        let (stripped, level) = reset_indentation("\n  \n");
        assert_eq!(level, 0);
        assert_eq!(stripped, "\n  \n");
    }

    #[test]
    fn tabs_become_four_spaces() {
        assert_eq!(normalize_tabs("\tint x;\n\t\ty();"), "    int x;\n        y();");
    }
}
