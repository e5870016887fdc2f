//! Verified segment refactoring driver.
//!
//! Feeds one segment at a time to a [`MutationSource`], then proves the
//! proposal harmless before accepting it: the candidate file must parse, and
//! its tree must be structurally equivalent to the original's with nothing
//! but identifier renames between them. A proposal that fails verification is
//! retried with the failure fed back to the source, up to a configurable
//! attempt budget.
//!
//! # Hard Rules (Never Violate)
//!
//! 1. **Verify before write**: a proposal is substituted into an in-memory
//!    candidate and re-parsed; nothing reaches disk unverified.
//! 2. **Renames only**: any structural mismatch between the original and the
//!    candidate tree rejects the proposal. No guessing.

use crate::ast::{JavaParser, ParseError};
use crate::balance::{self, BalanceKind, BalanceResult};
use crate::compare::{self, CompareError, IdentifierDifference};
use crate::segment::{self, LabelError};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Refactoring errors that end a segment's processing outright. Recoverable
/// verification failures are not errors; they become feedback for the next
/// attempt and, once attempts run out, an [`SegmentOutcome::Exhausted`].
#[derive(Error, Debug)]
pub enum RefactorError {
    #[error("segment access failed: {0}")]
    Label(#[from] LabelError),

    #[error("parser initialization failed: {0}")]
    Parser(ParseError),

    #[error("original source does not parse: {0}")]
    OriginalUnparsable(ParseError),

    #[error("mutation source failed: {0}")]
    Source(#[from] anyhow::Error),

    #[error("verification bookkeeping failed: {0}")]
    Verification(CompareError),
}

/// Producer of refactored segment bodies.
///
/// `prior_error` carries the verification failure of the previous attempt on
/// the same segment, if any, so the source can correct itself. `Ok(None)`
/// means the source declined to answer.
pub trait MutationSource {
    fn propose(
        &mut self,
        segment: &str,
        standards: &[String],
        prior_error: Option<&str>,
    ) -> anyhow::Result<Option<String>>;
}

/// Terminal status of one segment, as recorded in the session report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Unchanged,
    Refactored,
    NoResponse,
    MutationFailed,
}

/// Outcome of processing one segment.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentOutcome {
    /// The source declared the segment compliant, or the verified result was
    /// byte-identical to the original.
    Unchanged,
    /// A proposal survived verification. `text` is the full marked source
    /// with the segment substituted; `diffs` are the renames it performs.
    Verified {
        text: String,
        diffs: Vec<IdentifierDifference>,
    },
    /// The source declined to answer.
    NoResponse,
    /// Every attempt failed verification; `last_error` is the final
    /// rejection fed back to the source.
    Exhausted { attempts: usize, last_error: String },
}

impl SegmentOutcome {
    pub fn status(&self) -> SegmentStatus {
        match self {
            SegmentOutcome::Unchanged => SegmentStatus::Unchanged,
            SegmentOutcome::Verified { .. } => SegmentStatus::Refactored,
            SegmentOutcome::NoResponse => SegmentStatus::NoResponse,
            SegmentOutcome::Exhausted { .. } => SegmentStatus::MutationFailed,
        }
    }
}

/// Per-segment entry of a [`SessionReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub label: usize,
    pub status: SegmentStatus,
    pub diffs: Vec<IdentifierDifference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-file entry of a [`SessionReport`].
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub segments: Vec<SegmentReport>,
}

/// Serializable summary of a refactoring run, written as JSON by the CLI.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SessionReport {
    pub files: Vec<FileReport>,
}

impl SessionReport {
    pub fn push(&mut self, file: FileReport) {
        self.files.push(file);
    }
}

/// Result of one verification attempt: either a terminal outcome, or a
/// rejection message to feed back to the source.
enum Verdict {
    Accepted(SegmentOutcome),
    Rejected(String),
}

/// Drives the propose/verify loop over the segments of a marked file.
pub struct RefactorEngine<S> {
    source: S,
    standards: Vec<String>,
    max_attempts: usize,
}

impl<S: MutationSource> RefactorEngine<S> {
    pub fn new(source: S, standards: Vec<String>, max_attempts: usize) -> Self {
        Self {
            source,
            standards,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Process one segment of `marked` and return its outcome.
    ///
    /// On [`SegmentOutcome::Verified`] the returned text is the whole marked
    /// source with the segment substituted; the caller decides whether and
    /// where it is written.
    pub fn refactor_segment(
        &mut self,
        marked: &str,
        label: usize,
    ) -> Result<SegmentOutcome, RefactorError> {
        let original = segment::segment_from_source(marked, label)?;
        let normalized = balance::normalize_tabs(&original);

        // Present the source with a self-contained, flush-left segment; the
        // repair and the indentation are both inverted before substitution.
        let repair = match balance::balance(&normalized) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(label, error = %e, "segment cannot be balanced, skipping");
                return Ok(SegmentOutcome::Exhausted {
                    attempts: 0,
                    last_error: e.to_string(),
                });
            }
        };
        let presented = match &repair {
            Some(r) => r.adjusted.clone(),
            None => normalized,
        };
        let (stripped, level) = balance::reset_indentation(&presented);

        let mut prior_error: Option<String> = None;
        for attempt in 1..=self.max_attempts {
            let proposal =
                self.source
                    .propose(&stripped, &self.standards, prior_error.as_deref())?;
            let Some(proposal) = proposal else {
                tracing::debug!(label, attempt, "mutation source declined");
                return Ok(SegmentOutcome::NoResponse);
            };

            if declares_compliant(&proposal) {
                tracing::debug!(label, attempt, "segment declared compliant");
                return Ok(SegmentOutcome::Unchanged);
            }

            match self.verify(marked, label, &original, &proposal, level, repair.as_ref())? {
                Verdict::Accepted(outcome) => return Ok(outcome),
                Verdict::Rejected(reason) => {
                    tracing::debug!(label, attempt, %reason, "proposal rejected");
                    prior_error = Some(reason);
                }
            }
        }

        Ok(SegmentOutcome::Exhausted {
            attempts: self.max_attempts,
            last_error: prior_error.unwrap_or_default(),
        })
    }

    /// Restore the proposal's original framing, substitute it into the
    /// candidate, and prove structural equivalence against the original.
    fn verify(
        &mut self,
        marked: &str,
        label: usize,
        original_segment: &str,
        proposal: &str,
        level: usize,
        repair: Option<&BalanceResult>,
    ) -> Result<Verdict, RefactorError> {
        let indented = balance::set_indentation(proposal.trim_end_matches('\n'), level);

        let restored = match repair {
            None => indented,
            Some(r) => match r.kind {
                // An unclosed segment was completed before presentation; the
                // appended closers come back off.
                BalanceKind::Unclosed => balance::strip_trailing_braces(&indented, r.delta),
                // An over-closing segment was truncated; the closers must be
                // re-appended at receding indentation.
                BalanceKind::Uninitiated => {
                    match balance::append_trailing_braces(&indented, r.delta, level) {
                        Ok(text) => text,
                        Err(e) => return Ok(Verdict::Rejected(e.to_string())),
                    }
                }
            },
        };

        // The framing disturbs trailing newlines; re-apply the original's run
        // so substitution reproduces its blank-line layout exactly.
        let mut restored = restored.trim_end_matches('\n').to_string();
        let trailing = original_segment.len() - original_segment.trim_end_matches('\n').len();
        restored.extend(std::iter::repeat('\n').take(trailing));

        if restored == original_segment {
            return Ok(Verdict::Accepted(SegmentOutcome::Unchanged));
        }

        let candidate = segment::substitute(marked, label, &restored)?;

        let original_plain = segment::strip_markers(marked);
        let candidate_plain = segment::strip_markers(&candidate);

        let mut parser = JavaParser::new().map_err(RefactorError::Parser)?;
        let original_tree = parser
            .parse(&original_plain)
            .map_err(RefactorError::OriginalUnparsable)?;
        let candidate_tree = match parser.parse(&candidate_plain) {
            Ok(tree) => tree,
            Err(e) => return Ok(Verdict::Rejected(e.to_string())),
        };

        match compare::compare(&original_tree, &candidate_tree, &original_plain) {
            Ok(diffs) => Ok(Verdict::Accepted(SegmentOutcome::Verified {
                text: candidate,
                diffs,
            })),
            Err(e) if e.is_structural() => Ok(Verdict::Rejected(e.to_string())),
            Err(e) => Err(RefactorError::Verification(e)),
        }
    }

    /// Process every segment of a marked file, carrying verified
    /// substitutions forward so later segments see earlier results.
    pub fn refactor_file(
        &mut self,
        path: PathBuf,
        marked: &str,
    ) -> Result<(String, FileReport), RefactorError> {
        let count = segment::label_count(marked);
        let mut working = marked.to_string();
        let mut segments = Vec::with_capacity(count);

        // Label 0 holds the package and import block; it is never offered to
        // the mutation source.
        if count > 0 {
            segments.push(SegmentReport {
                label: 0,
                status: SegmentStatus::Unchanged,
                diffs: Vec::new(),
                error: None,
            });
        }

        for label in 1..count {
            let outcome = self.refactor_segment(&working, label)?;
            let (diffs, error) = match &outcome {
                SegmentOutcome::Verified { text, diffs } => {
                    working = text.clone();
                    (diffs.clone(), None)
                }
                SegmentOutcome::Exhausted { last_error, .. } => {
                    (Vec::new(), Some(last_error.clone()))
                }
                _ => (Vec::new(), None),
            };
            segments.push(SegmentReport {
                label,
                status: outcome.status(),
                diffs,
                error,
            });
        }

        tracing::info!(
            path = %path.display(),
            segments = count,
            refactored = segments
                .iter()
                .filter(|s| s.status == SegmentStatus::Refactored)
                .count(),
            "file processed"
        );
        Ok((working, FileReport { path, segments }))
    }
}

/// Detect the compliance sentinel: a first line stating the segment already
/// follows the requested conventions.
fn declares_compliant(proposal: &str) -> bool {
    let first = proposal.lines().next().unwrap_or("").to_lowercase();
    first.contains("already") && first.contains("follows")
}
