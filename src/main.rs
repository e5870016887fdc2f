use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use renameguard::ast::JavaParser;
use renameguard::compare::{self, CompareError, CompareMode};
use renameguard::project::{atomic_write, load_standards, ProjectFiles};
use renameguard::refactor::{
    FileReport, MutationSource, RefactorEngine, SegmentStatus, SessionReport,
};
use renameguard::segment::{self, MIN_SEGMENT_LEN, TARGET_SEGMENT_LEN};
use similar::{ChangeTag, TextDiff};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Parser)]
#[command(name = "renameguard")]
#[command(about = "Structural-equivalence verification for Java rename refactoring", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert segment markers into a Java file
    Label {
        /// File to segment
        file: PathBuf,

        /// Project root the file must live under
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Remove all segment markers from a file
    Unlabel {
        /// File to restore
        file: PathBuf,

        /// Project root the file must live under
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Print one segment of a labeled file
    Fetch {
        /// Labeled file
        file: PathBuf,

        /// Segment label
        label: usize,

        /// Project root the file must live under
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Check two files for structural equivalence
    Check {
        /// Reference file
        original: PathBuf,

        /// File to compare against the reference
        candidate: PathBuf,

        /// Report every identifier occurrence, changed or not
        #[arg(long)]
        audit: bool,
    },

    /// Replace a segment with verified content from a file
    Apply {
        /// Labeled file to modify
        file: PathBuf,

        /// Segment label to replace
        label: usize,

        /// File holding the replacement segment body
        #[arg(short, long)]
        segment_file: PathBuf,

        /// Verify only; do not write the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of the change
        #[arg(short, long)]
        diff: bool,

        /// Project root the file must live under
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Drive a mutation command over every segment of a labeled file
    Run {
        /// Labeled file to refactor
        file: PathBuf,

        /// Shell command run once per segment: the segment body arrives on
        /// stdin and its stdout is the proposal
        #[arg(short, long)]
        mutator: String,

        /// Naming-convention standards file, one rule per line
        #[arg(long)]
        standards: Option<PathBuf>,

        /// Write the session report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Verification attempts per segment before giving up
        #[arg(long, default_value_t = 3)]
        max_attempts: usize,

        /// Verify only; do not write the file
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Project root the file must live under
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Report segmentation statistics over a project tree
    Survey {
        /// Project root to scan for .java files
        root: PathBuf,

        /// Fraction of files to sample, in (0, 1]
        #[arg(long, default_value_t = 1.0)]
        sample_ratio: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Label { file, root } => cmd_label(&guarded(&root, &file)?),

        Commands::Unlabel { file, root } => cmd_unlabel(&guarded(&root, &file)?),

        Commands::Fetch { file, label, root } => cmd_fetch(&guarded(&root, &file)?, label),

        Commands::Check {
            original,
            candidate,
            audit,
        } => cmd_check(&original, &candidate, audit),

        Commands::Apply {
            file,
            label,
            segment_file,
            dry_run,
            diff,
            root,
        } => cmd_apply(&guarded(&root, &file)?, label, &segment_file, dry_run, diff),

        Commands::Run {
            file,
            mutator,
            standards,
            report,
            max_attempts,
            dry_run,
            root,
        } => cmd_run(
            &guarded(&root, &file)?,
            mutator,
            standards.as_deref(),
            report.as_deref(),
            max_attempts,
            dry_run,
        ),

        Commands::Survey { root, sample_ratio } => cmd_survey(&root, sample_ratio),
    }
}

/// Resolve `file` against the project root, refusing paths that escape it.
fn guarded(root: &Path, file: &Path) -> Result<PathBuf> {
    let files = ProjectFiles::discover(root)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    Ok(files.validate(file)?)
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (modified)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_label(file: &Path) -> Result<()> {
    let count = segment::insert_markers(file)
        .with_context(|| format!("failed to label {}", file.display()))?;
    println!(
        "{} {}: {} segments",
        "✓".green(),
        file.display(),
        format!("{}", count).bold()
    );
    Ok(())
}

fn cmd_unlabel(file: &Path) -> Result<()> {
    segment::remove_markers(file)
        .with_context(|| format!("failed to unlabel {}", file.display()))?;
    println!("{} {}: markers removed", "✓".green(), file.display());
    Ok(())
}

fn cmd_fetch(file: &Path, label: usize) -> Result<()> {
    let body = segment::fetch(file, label)
        .with_context(|| format!("failed to fetch segment {label} from {}", file.display()))?;
    print!("{body}");
    Ok(())
}

fn cmd_check(original: &Path, candidate: &Path, audit: bool) -> Result<()> {
    let left_source = segment::strip_markers(&fs::read_to_string(original)?);
    let right_source = segment::strip_markers(&fs::read_to_string(candidate)?);

    let mut parser = JavaParser::new()?;
    let left = parser
        .parse(&left_source)
        .with_context(|| format!("failed to parse {}", original.display()))?;
    let right = parser
        .parse(&right_source)
        .with_context(|| format!("failed to parse {}", candidate.display()))?;

    let mode = if audit {
        CompareMode::Audit
    } else {
        CompareMode::ChangedOnly
    };

    match compare::compare_with(&left, &right, &left_source, mode) {
        Ok(diffs) => {
            if diffs.is_empty() {
                println!("{} structurally equivalent, no renames", "✓".green());
            } else {
                println!(
                    "{} structurally equivalent, {} identifier{}:",
                    "✓".green(),
                    format!("{}", diffs.len()).bold(),
                    if diffs.len() == 1 { "" } else { "s" }
                );
                for diff in &diffs {
                    println!("  {diff}");
                }
            }
            Ok(())
        }
        Err(e) if e.is_structural() => {
            eprintln!("{} NOT EQUIVALENT", "✗".red());
            eprintln!("  {e}");
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_apply(
    file: &Path,
    label: usize,
    segment_file: &Path,
    dry_run: bool,
    show_diff: bool,
) -> Result<()> {
    let marked = fs::read_to_string(file)?;
    let replacement = fs::read_to_string(segment_file)?;

    let candidate = segment::substitute(&marked, label, &replacement)
        .with_context(|| format!("failed to substitute segment {label}"))?;

    // Verify before anything touches disk.
    let original_plain = segment::strip_markers(&marked);
    let candidate_plain = segment::strip_markers(&candidate);

    let mut parser = JavaParser::new()?;
    let original_tree = parser
        .parse(&original_plain)
        .with_context(|| format!("original {} does not parse", file.display()))?;
    let candidate_tree = match parser.parse(&candidate_plain) {
        Ok(tree) => tree,
        Err(e) => {
            eprintln!("{} REJECTED: replacement does not parse", "✗".red());
            eprintln!("  {e}");
            std::process::exit(1);
        }
    };

    let diffs = match compare::compare(&original_tree, &candidate_tree, &original_plain) {
        Ok(diffs) => diffs,
        Err(e @ CompareError::Structural(_)) => {
            eprintln!("{} REJECTED: replacement is not a pure rename", "✗".red());
            eprintln!("  {e}");
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if show_diff {
        display_diff(file, &marked, &candidate);
        println!();
    }

    if dry_run {
        println!(
            "{} segment {}: would apply {} rename{}",
            "⊙".yellow(),
            label,
            diffs.len(),
            if diffs.len() == 1 { "" } else { "s" }
        );
    } else {
        atomic_write(file, &candidate)?;
        println!(
            "{} segment {}: applied with {} rename{}",
            "✓".green(),
            label,
            diffs.len(),
            if diffs.len() == 1 { "" } else { "s" }
        );
    }
    for diff in &diffs {
        println!("  {diff}");
    }
    Ok(())
}

/// Mutation source backed by an external shell command.
///
/// The segment body is piped to the command's stdin; standards and the prior
/// rejection travel in `RENAMEGUARD_STANDARDS` and `RENAMEGUARD_PRIOR_ERROR`.
/// Whatever the command prints to stdout is the proposal; empty output means
/// it declined.
struct CommandSource {
    program: String,
}

impl MutationSource for CommandSource {
    fn propose(
        &mut self,
        segment: &str,
        standards: &[String],
        prior_error: Option<&str>,
    ) -> Result<Option<String>> {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.program)
            .env("RENAMEGUARD_STANDARDS", standards.join("\n"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped());
        if let Some(error) = prior_error {
            command.env("RENAMEGUARD_PRIOR_ERROR", error);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn mutator `{}`", self.program))?;
        child
            .stdin
            .take()
            .context("mutator stdin unavailable")?
            .write_all(segment.as_bytes())?;
        let output = child.wait_with_output()?;
        anyhow::ensure!(
            output.status.success(),
            "mutator `{}` exited with {}",
            self.program,
            output.status
        );

        let proposal = String::from_utf8(output.stdout).context("mutator output is not UTF-8")?;
        if proposal.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(proposal))
        }
    }
}

fn status_line(status: SegmentStatus) -> colored::ColoredString {
    match status {
        SegmentStatus::Unchanged => "unchanged".normal(),
        SegmentStatus::Refactored => "refactored".green(),
        SegmentStatus::NoResponse => "no response".yellow(),
        SegmentStatus::MutationFailed => "failed".red(),
    }
}

fn print_file_report(report: &FileReport) {
    for entry in &report.segments {
        println!("  segment {:>3}  {}", entry.label, status_line(entry.status));
        for diff in &entry.diffs {
            println!("    {diff}");
        }
        if let Some(error) = &entry.error {
            println!("    {}", error.red());
        }
    }
}

fn cmd_run(
    file: &Path,
    mutator: String,
    standards: Option<&Path>,
    report_path: Option<&Path>,
    max_attempts: usize,
    dry_run: bool,
) -> Result<()> {
    let marked = fs::read_to_string(file)?;
    anyhow::ensure!(
        segment::label_count(&marked) > 0,
        "{} has no segment markers; run `label` first",
        file.display()
    );

    let standards = match standards {
        Some(path) => load_standards(path)
            .with_context(|| format!("failed to load standards from {}", path.display()))?,
        None => Vec::new(),
    };

    let source = CommandSource { program: mutator };
    let mut engine = RefactorEngine::new(source, standards, max_attempts);
    let (text, file_report) = engine.refactor_file(file.to_path_buf(), &marked)?;

    println!("{}", file.display().to_string().bold());
    print_file_report(&file_report);

    let refactored = file_report
        .segments
        .iter()
        .filter(|s| s.status == SegmentStatus::Refactored)
        .count();

    if dry_run {
        println!(
            "{} would refactor {} segment{}",
            "⊙".yellow(),
            refactored,
            if refactored == 1 { "" } else { "s" }
        );
    } else {
        if text != marked {
            atomic_write(file, &text)?;
        }
        println!(
            "{} {} segment{} refactored",
            "✓".green(),
            refactored,
            if refactored == 1 { "" } else { "s" }
        );
    }

    let mut session = SessionReport::default();
    session.push(file_report);
    if let Some(path) = report_path {
        fs::write(path, serde_json::to_string_pretty(&session)?)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    Ok(())
}

/// Segmentation statistics for one surveyed file.
struct FileStats {
    segments: Vec<usize>,
}

fn cmd_survey(root: &Path, sample_ratio: f64) -> Result<()> {
    anyhow::ensure!(
        sample_ratio > 0.0 && sample_ratio <= 1.0,
        "--sample-ratio must be in (0, 1], got {sample_ratio}"
    );

    let files = ProjectFiles::discover(root)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    anyhow::ensure!(!files.is_empty(), "no .java files under {}", root.display());

    // Deterministic sampling: every k-th file by sorted index.
    let stride = (1.0 / sample_ratio).round().max(1.0) as usize;
    let sampled: Vec<(usize, PathBuf)> = files
        .snapshot()
        .into_iter()
        .filter(|(index, _)| index % stride == 0)
        .collect();

    println!("{}", "Segmentation Survey".bold());
    println!("Root: {}", root.display());
    println!(
        "Files: {} total, {} sampled",
        files.len(),
        sampled.len()
    );
    println!();

    let mut parser = JavaParser::new()?;
    let mut stats: Vec<FileStats> = Vec::new();
    let mut faults = 0usize;

    for (_, path) in &sampled {
        match survey_file(&mut parser, path) {
            Ok(s) => stats.push(s),
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), path.display(), e);
                faults += 1;
            }
        }
    }

    let lengths: Vec<usize> = stats.iter().flat_map(|s| s.segments.iter().copied()).collect();
    if lengths.is_empty() {
        println!("{}", "No segments found in the sample".yellow());
        return Ok(());
    }

    let mut sorted = lengths.clone();
    sorted.sort_unstable();
    let total: usize = sorted.iter().sum();
    let mean = total as f64 / sorted.len() as f64;
    let median = if sorted.len() % 2 == 1 {
        sorted[sorted.len() / 2] as f64
    } else {
        (sorted[sorted.len() / 2 - 1] + sorted[sorted.len() / 2]) as f64 / 2.0
    };
    let variance = sorted
        .iter()
        .map(|&len| {
            let d = len as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / sorted.len() as f64;

    println!("{}", "Summary:".bold());
    println!("  {} files segmented", format!("{}", stats.len()).green());
    println!("  {} faults", format!("{faults}").red());
    println!("  {} segments", format!("{}", sorted.len()).bold());
    println!("  mean length   {:>8.1} lines", mean);
    println!("  median length {:>8.1} lines", median);
    println!("  std deviation {:>8.1} lines", variance.sqrt());
    println!("  min / max     {:>4} / {} lines", sorted[0], sorted[sorted.len() - 1]);

    if faults > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Compute segment lengths for one file without touching it on disk.
fn survey_file(parser: &mut JavaParser, path: &Path) -> Result<FileStats> {
    let source = fs::read_to_string(path)?;
    let plain = segment::strip_markers(&source);
    let tree = parser.parse(&plain)?;

    let lines: Vec<&str> = plain.split('\n').collect();
    let boundaries = segment::collect_boundaries(&tree)?;
    let refined = if boundaries.is_empty() {
        boundaries
    } else {
        segment::refine(&boundaries, &lines, MIN_SEGMENT_LEN, TARGET_SEGMENT_LEN)
    };

    // Label 0 spans from the top of the file to the first boundary.
    let mut starts = vec![0usize];
    starts.extend(refined.iter().copied());
    starts.dedup();
    let mut segments = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(lines.len());
        segments.push(end - start);
    }
    Ok(FileStats { segments })
}
