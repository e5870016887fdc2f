//! File segmentation by marker lines.
//!
//! Splits a Java file into addressable segments at declaration boundaries,
//! refines oversized segments along blank lines validated against the brace
//! balancer, and provides fetch/substitute/remove operations addressed by
//! marker index. Markers are reserved comment lines of the form
//! `// <Label: k>`; label 0 always denotes everything before the first real
//! boundary (package and imports) and is synthesized unconditionally.

pub mod errors;

pub use errors::LabelError;

use crate::ast::{JavaParser, NodeKind, ParseTree};
use crate::balance::is_cut_suitable;
use crate::project::atomic_write;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

/// Reserved prefix of a marker line.
pub const MARKER_PREFIX: &str = "// <Label:";

/// Segments shorter than this never result from an accepted split.
pub const MIN_SEGMENT_LEN: usize = 10;

/// Segments longer than this are candidates for refinement.
pub const TARGET_SEGMENT_LEN: usize = 30;

fn marker_line(label: usize) -> String {
    format!("// <Label: {label}>")
}

fn is_marker(line: &str) -> bool {
    line.starts_with(MARKER_PREFIX)
}

fn find_marker(lines: &[&str], label: usize) -> Option<usize> {
    let marker = marker_line(label);
    lines.iter().position(|line| **line == marker)
}

/// Collect the 0-indexed lines on which file-level declarations start.
///
/// A node qualifies iff it is a class, enum, interface, method, or
/// constructor declaration with no method or constructor ancestor; local and
/// anonymous declarations inside method bodies never open segments. The
/// boundary sits at the declaration's first token, modifiers included.
pub fn collect_boundaries(tree: &ParseTree) -> Result<BTreeSet<usize>, LabelError> {
    let mut boundaries = BTreeSet::new();
    let mut missing: Option<&'static str> = None;

    tree.walk_scoped(|node, inside_body| {
        if inside_body || !node.kind.is_boundary_declaration() {
            return;
        }
        let position = match &node.kind {
            NodeKind::Class(d)
            | NodeKind::Enum(d)
            | NodeKind::Interface(d)
            | NodeKind::Method(d)
            | NodeKind::Constructor(d) => d.modifier_position.or(node.position),
            _ => node.position,
        };
        match position {
            Some(p) => {
                boundaries.insert(p.line - 1);
            }
            None => missing = missing.or(Some(node.kind.label())),
        }
    });

    if let Some(kind) = missing {
        return Err(LabelError::MissingPosition { kind });
    }
    Ok(boundaries)
}

/// Hash key for the omitted-segment memo. Keyed by content, not by line
/// numbers: splits elsewhere renumber boundaries, and a `(start, end)` key
/// could then suppress a legitimate retry of a different segment.
fn segment_key(lines: &[&str]) -> u64 {
    xxh3_64(lines.join("\n").as_bytes())
}

/// Break segments longer than `target_len` at blank lines, subject to the cut
/// suitability check on both resulting halves.
///
/// Each accepted split restarts the sizing pass, since it changes neighboring
/// segment lengths. A segment that exhausts its candidates is memoized as
/// omitted and never revisited, which guarantees termination.
pub fn refine(
    boundaries: &BTreeSet<usize>,
    lines: &[&str],
    min_len: usize,
    target_len: usize,
) -> BTreeSet<usize> {
    let mut labels: Vec<usize> = boundaries.iter().copied().collect();
    let mut omitted: HashSet<u64> = HashSet::new();

    loop {
        let mut segments: Vec<(usize, usize)> = labels
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        if let Some(&last) = labels.last() {
            segments.push((last, lines.len()));
        }
        segments.retain(|&(start, end)| {
            end - start > target_len && !omitted.contains(&segment_key(&lines[start..end]))
        });

        if segments.is_empty() {
            break;
        }

        // Accept at most one split per round: a split renumbers neighboring
        // segments, so sizing restarts from scratch. A round that accepts
        // nothing omits every oversized segment and the next pass terminates.
        for (start, end) in segments {
            match binary_breakdown(lines, start, end, min_len) {
                Some(split) => {
                    labels.push(split);
                    labels.sort_unstable();
                    break;
                }
                None => {
                    omitted.insert(segment_key(&lines[start..end]));
                }
            }
        }
    }

    labels.into_iter().collect()
}

/// Find one acceptable split line inside `lines[start..end)`, or `None`.
fn binary_breakdown(
    lines: &[&str],
    start: usize,
    end: usize,
    min_len: usize,
) -> Option<usize> {
    let segment = &lines[start..end];

    // Blank lines are the only candidates; of two adjacent candidates the
    // later one wins.
    let blanks: Vec<usize> = segment
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim().is_empty())
        .map(|(i, _)| i)
        .collect();
    let deduped: Vec<usize> = blanks
        .iter()
        .copied()
        .filter(|&i| !blanks.contains(&(i + 1)))
        .collect();

    // Enforce the minimum side length, greedily spacing accepted candidates
    // at least `min_len` apart.
    let mut spaced: Vec<usize> = Vec::new();
    for candidate in deduped {
        if segment.len() - candidate < min_len {
            continue;
        }
        match spaced.last() {
            None => {
                if candidate > min_len {
                    spaced.push(candidate);
                }
            }
            Some(&previous) => {
                if candidate - previous > min_len {
                    spaced.push(candidate);
                }
            }
        }
    }

    for candidate in spaced {
        let head = lines[start..start + candidate].join("\n");
        if !is_cut_suitable(&head) {
            continue;
        }
        let tail = lines[start + candidate..end].join("\n");
        if !is_cut_suitable(&tail) {
            continue;
        }
        return Some(start + candidate);
    }
    None
}

/// Compute and insert segment markers into the file at `path`.
///
/// Fails with [`LabelError::LabelExisted`] if markers are already present.
/// Returns the number of segments (boundary count + 1: label 0 is always
/// synthesized for the leading package/import block).
pub fn insert_markers(path: &Path) -> Result<usize, LabelError> {
    let source = fs::read_to_string(path)?;
    let lines: Vec<&str> = source.split('\n').collect();

    if lines.iter().any(|line| is_marker(line)) {
        return Err(LabelError::LabelExisted {
            path: path.to_path_buf(),
        });
    }

    let mut parser = JavaParser::new()?;
    let tree = parser.parse(&source)?;

    let mut boundaries = collect_boundaries(&tree)?;
    if !boundaries.is_empty() {
        boundaries = refine(&boundaries, &lines, MIN_SEGMENT_LEN, TARGET_SEGMENT_LEN);
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + boundaries.len() + 1);
    out.push(marker_line(0));
    let mut next_label = 1;
    for (i, line) in lines.iter().enumerate() {
        if boundaries.contains(&i) {
            out.push(marker_line(next_label));
            next_label += 1;
        }
        out.push((*line).to_string());
    }

    atomic_write(path, &out.join("\n"))?;
    tracing::debug!(path = %path.display(), segments = next_label, "markers inserted");
    Ok(next_label)
}

/// Extract the named segment from in-memory source: the lines strictly
/// between marker `label` and the next marker (or EOF), markers excluded,
/// every line carrying its terminator. A trailing blank line is therefore
/// distinguishable from the final line's terminator, which is what makes
/// `substitute(source, label, segment_from_source(source, label))` the
/// identity.
pub fn segment_from_source(source: &str, label: usize) -> Result<String, LabelError> {
    let lines: Vec<&str> = source.split('\n').collect();
    let start = find_marker(&lines, label).ok_or(LabelError::LabelNotFound { label })?;

    let mut body: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|line| !is_marker(line))
        .copied()
        .collect();
    // The empty element a newline-terminated file splits into at EOF is the
    // terminator itself, not a trailing blank line.
    let at_eof = start + 1 + body.len() == lines.len();
    if at_eof && body.last() == Some(&"") {
        body.pop();
    }

    let mut out = String::with_capacity(body.iter().map(|line| line.len() + 1).sum());
    for line in body {
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

/// Read the file at `path` and extract the named segment.
pub fn fetch(path: &Path, label: usize) -> Result<String, LabelError> {
    let source = fs::read_to_string(path)?;
    segment_from_source(&source, label)
}

/// Replace the named segment's body in-memory, markers preserved and a
/// trailing newline enforced on the inserted text. Used to build a candidate
/// for re-parsing before anything touches disk.
pub fn substitute(source: &str, label: usize, new_text: &str) -> Result<String, LabelError> {
    let lines: Vec<&str> = source.split('\n').collect();
    let start = find_marker(&lines, label).ok_or(LabelError::LabelNotFound { label })?;

    let mut out = lines[..=start].join("\n");
    out.push('\n');
    out.push_str(new_text);
    if !new_text.is_empty() && !new_text.ends_with('\n') {
        out.push('\n');
    }

    let next_marker = lines[start + 1..]
        .iter()
        .position(|line| is_marker(line))
        .map(|offset| start + 1 + offset);
    if let Some(next) = next_marker {
        out.push_str(&lines[next..].join("\n"));
    }
    Ok(out)
}

/// Replace the named segment on disk.
pub fn replace_segment(path: &Path, label: usize, new_text: &str) -> Result<(), LabelError> {
    let source = fs::read_to_string(path)?;
    let result = substitute(&source, label, new_text)?;
    atomic_write(path, &result)?;
    Ok(())
}

/// Count the marker lines present in in-memory source, which is the number
/// of addressable segments once markers have been inserted.
pub fn label_count(source: &str) -> usize {
    source.split('\n').filter(|line| is_marker(line)).count()
}

/// Strip all marker lines from in-memory source.
pub fn strip_markers(source: &str) -> String {
    source
        .split('\n')
        .filter(|line| !is_marker(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove all markers from the file at `path`, restoring its
/// pre-segmentation form.
pub fn remove_markers(path: &Path) -> Result<(), LabelError> {
    let source = fs::read_to_string(path)?;
    atomic_write(path, &strip_markers(&source))?;
    Ok(())
}
