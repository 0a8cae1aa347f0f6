//! Concurrent Source Line Counter
//!
//! Walks a directory tree, classifies every line of every recognised source
//! file as code, comment, or blank according to the language's comment
//! grammar, and aggregates the counts per language and globally. Per-file
//! analysis fans out across a worker pool; results fan in through a channel
//! to a single collector.
//!
//! Supported languages: Python, Shell, C, Go, Java, Rust, JavaScript,
//! TypeScript.

use clap::{ArgAction, Parser};
use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use colored::*;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use thiserror::Error;

// Fixed width for the language column of the totals table.
const LANG_WIDTH: usize = 16;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Concurrent source code line counter for multiple programming languages",
    long_about = "Counts code, comment, and blank lines per language across a directory tree. \
                  Supported languages: Python, Shell, C, Go, Java, Rust, JavaScript, TypeScript."
)]
struct Args {
    /// Directory to scan
    #[arg(default_value = ".")]
    path: String,

    /// Directory names to skip (repeatable)
    #[arg(short, long, action = ArgAction::Append)]
    ignore: Vec<String>,

    /// Glob pattern a file name or root-relative path must match
    #[arg(short = 'f', long)]
    filespec: Option<String>,

    /// Number of analysis workers (0 = number of available CPUs)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Print a per-file breakdown as files complete
    #[arg(short, long)]
    verbose: bool,
}

// ---------------------------------------------------------------------------
// Comment grammars and the language registry
// ---------------------------------------------------------------------------

/// How a comment begins and (optionally) ends for one language.
///
/// A rule without an end token is a line comment and never spans lines.
#[derive(Debug, Clone, Copy)]
struct CommentRule {
    start: &'static str,
    end: Option<&'static str>,
    spans_lines: bool,
}

impl CommentRule {
    const fn line(start: &'static str) -> Self {
        CommentRule {
            start,
            end: None,
            spans_lines: false,
        }
    }

    const fn block(start: &'static str, end: &'static str) -> Self {
        CommentRule {
            start,
            end: Some(end),
            spans_lines: true,
        }
    }
}

/// A language's display name and its ordered comment rules. Profiles are
/// static and shared read-only by every analysis worker.
#[derive(Debug)]
struct LanguageProfile {
    name: &'static str,
    rules: &'static [CommentRule],
}

const HASH_RULES: &[CommentRule] = &[CommentRule::line("#")];
const C_FAMILY_RULES: &[CommentRule] = &[CommentRule::line("//"), CommentRule::block("/*", "*/")];

static PYTHON: LanguageProfile = LanguageProfile {
    name: "Python",
    rules: HASH_RULES,
};
static SHELL: LanguageProfile = LanguageProfile {
    name: "Shell",
    rules: HASH_RULES,
};
static C: LanguageProfile = LanguageProfile {
    name: "C",
    rules: C_FAMILY_RULES,
};
static GO: LanguageProfile = LanguageProfile {
    name: "Go",
    rules: C_FAMILY_RULES,
};
static JAVA: LanguageProfile = LanguageProfile {
    name: "Java",
    rules: C_FAMILY_RULES,
};
static RUST: LanguageProfile = LanguageProfile {
    name: "Rust",
    rules: C_FAMILY_RULES,
};
static JAVASCRIPT: LanguageProfile = LanguageProfile {
    name: "JavaScript",
    rules: C_FAMILY_RULES,
};
static TYPESCRIPT: LanguageProfile = LanguageProfile {
    name: "TypeScript",
    rules: C_FAMILY_RULES,
};

/// Look up the profile registered for a file extension. Extensions are
/// matched case-sensitively.
fn lookup_language(extension: &str) -> Option<&'static LanguageProfile> {
    match extension {
        "py" => Some(&PYTHON),
        "sh" => Some(&SHELL),
        "c" | "h" => Some(&C),
        "go" => Some(&GO),
        "java" => Some(&JAVA),
        "rs" => Some(&RUST),
        "js" => Some(&JAVASCRIPT),
        "ts" => Some(&TYPESCRIPT),
        _ => None,
    }
}

/// Substring after the final `.` of a file name, or `None` when the name
/// carries no separator at all.
fn extension_of(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Blank,
    Comment,
    Source,
}

fn is_blank(line: &str) -> bool {
    line.is_empty() || line.starts_with(' ')
}

fn starts_comment(line: &str, rules: &[CommentRule]) -> bool {
    rules.iter().any(|rule| line.starts_with(rule.start))
}

fn ends_comment(line: &str, rules: &[CommentRule]) -> bool {
    rules
        .iter()
        .any(|rule| matches!(rule.end, Some(end) if !end.is_empty() && line.ends_with(end)))
}

/// Whether the first rule matching the line (start token as prefix, or
/// non-empty end token as suffix) allows the comment to span lines.
fn matched_rule_spans_lines(line: &str, rules: &[CommentRule]) -> bool {
    for rule in rules {
        let end_matches = rule
            .end
            .is_some_and(|end| !end.is_empty() && line.ends_with(end));
        if line.starts_with(rule.start) || end_matches {
            return rule.spans_lines;
        }
    }
    false
}

fn opens_block(line: &str, rules: &[CommentRule]) -> bool {
    starts_comment(line, rules) && matched_rule_spans_lines(line, rules)
}

/// Classify one line and produce the block-comment flag for the next line.
///
/// Detection is plain prefix/suffix matching against the comment rules, not
/// tokenization: a string literal containing `//` is misclassified as a
/// comment. That imprecision is kept for output compatibility.
///
/// The start check runs after the close check and independently of it, so a
/// line such as `/* x */` that opens and closes a block comment on the same
/// line still leaves the flag set until a later line ends with a close
/// token. Also kept for compatibility.
fn classify_line(line: &str, in_block: bool, rules: &[CommentRule]) -> (LineClass, bool) {
    let class = if in_block {
        LineClass::Comment
    } else if is_blank(line) {
        LineClass::Blank
    } else if starts_comment(line, rules) || ends_comment(line, rules) {
        LineClass::Comment
    } else {
        LineClass::Source
    };

    let mut next_in_block = in_block;
    if next_in_block && ends_comment(line, rules) {
        next_in_block = false;
    }
    if opens_block(line, rules) {
        next_in_block = true;
    }

    (class, next_in_block)
}

// ---------------------------------------------------------------------------
// Per-file analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
enum AnalysisError {
    #[error("cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("read error in {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
}

/// Line counts for a single analyzed file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileReport {
    language: &'static str,
    source_lines: u64,
    blank_lines: u64,
    comment_lines: u64,
}

impl FileReport {
    fn new(language: &'static str) -> Self {
        FileReport {
            language,
            source_lines: 0,
            blank_lines: 0,
            comment_lines: 0,
        }
    }
}

/// Reads a file's lines, converting invalid UTF-8 sequences to replacement
/// characters instead of failing.
struct LossyLineReader {
    reader: BufReader<fs::File>,
    buffer: Vec<u8>,
}

impl LossyLineReader {
    fn new(file: fs::File) -> Self {
        LossyLineReader {
            reader: BufReader::new(file),
            buffer: Vec::with_capacity(4 * 1024),
        }
    }
}

impl Iterator for LossyLineReader {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => {
                let text = String::from_utf8_lossy(&self.buffer);
                Some(Ok(text.trim_end_matches(['\n', '\r']).to_string()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

/// Stream one file through the line classifier and accumulate its counts.
/// Failures are terminal for this file only; partial counts are discarded.
fn analyze_file(
    path: &Path,
    profile: &'static LanguageProfile,
) -> Result<FileReport, AnalysisError> {
    let file = fs::File::open(path).map_err(|source| AnalysisError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut report = FileReport::new(profile.name);
    let mut in_block = false;

    for line in LossyLineReader::new(file) {
        let line = line.map_err(|source| AnalysisError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();

        let (class, still_in_block) = classify_line(trimmed, in_block, profile.rules);
        in_block = still_in_block;

        match class {
            LineClass::Blank => report.blank_lines += 1,
            LineClass::Comment => report.comment_lines += 1,
            // The flag is re-checked after the update: a code-looking line
            // inside an open block comment must not count as code.
            LineClass::Source => {
                if !in_block {
                    report.source_lines += 1;
                }
            }
        }
    }

    Ok(report)
}

// ---------------------------------------------------------------------------
// Result aggregation
// ---------------------------------------------------------------------------

/// Field-wise totals for one language.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LanguageTotals {
    files: u64,
    source_lines: u64,
    blank_lines: u64,
    comment_lines: u64,
}

/// Merges per-file reports into per-language totals. Owned by the collector
/// thread alone; the merge is a commutative sum, so completion order never
/// affects the final numbers.
#[derive(Debug, Default)]
struct ResultAggregator {
    processed_files: u64,
    failed_files: u64,
    per_language: HashMap<&'static str, LanguageTotals>,
}

impl ResultAggregator {
    fn record(&mut self, report: FileReport) {
        let totals = self.per_language.entry(report.language).or_default();
        totals.files += 1;
        totals.source_lines += report.source_lines;
        totals.blank_lines += report.blank_lines;
        totals.comment_lines += report.comment_lines;
        self.processed_files += 1;
    }

    fn record_failure(&mut self) {
        self.failed_files += 1;
    }

    fn finalize(self, walk: WalkTally, elapsed: Duration) -> AggregateReport {
        AggregateReport {
            processed_files: self.processed_files,
            skipped_files: walk.skipped,
            failed_files: self.failed_files + walk.failed,
            per_language: self.per_language,
            elapsed,
        }
    }
}

/// Final totals for the whole run, read once by the report renderer after
/// every analysis task has completed.
#[derive(Debug)]
struct AggregateReport {
    processed_files: u64,
    skipped_files: u64,
    failed_files: u64,
    per_language: HashMap<&'static str, LanguageTotals>,
    elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Concurrent scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScanOptions {
    ignore: Vec<String>,
    filespec: Option<glob::Pattern>,
    jobs: usize,
    verbose: bool,
}

/// One unit of work for an analysis worker.
struct Job {
    path: PathBuf,
    profile: &'static LanguageProfile,
}

/// Skip and failure counts observed during traversal, before any worker is
/// involved.
#[derive(Debug, Default, Clone, Copy)]
struct WalkTally {
    skipped: u64,
    failed: u64,
}

fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn is_pruned_dir(path: &Path, extra: &[String]) -> bool {
    let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let pruned = [
        ".git",
        "target",
        "node_modules",
        "__pycache__",
        "venv",
        "build",
    ];
    pruned.contains(&dir_name) || extra.iter().any(|d| d == dir_name)
}

fn filespec_matches(pattern: &glob::Pattern, root: &Path, file_path: &Path) -> bool {
    if file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.matches(name))
        .unwrap_or(false)
    {
        return true;
    }

    let relative = match file_path.strip_prefix(root) {
        Ok(rel) => rel,
        Err(_) => return false,
    };

    match relative.to_str() {
        Some(s) => pattern.matches(&s.replace('\\', "/")),
        None => false,
    }
}

/// Decide what to do with one non-directory entry: count it as skipped or
/// failed, or hand it to the worker pool.
fn dispatch_candidate(
    path: PathBuf,
    root: &Path,
    options: &ScanOptions,
    jobs: &Sender<Job>,
    tally: &mut WalkTally,
) {
    if let Some(pattern) = &options.filespec {
        if !filespec_matches(pattern, root, &path) {
            tally.skipped += 1;
            return;
        }
    }

    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        tally.failed += 1;
        return;
    };
    let Some(extension) = extension_of(file_name) else {
        // No extension separator at all: malformed name, counted as failed.
        tally.failed += 1;
        return;
    };
    let Some(profile) = lookup_language(extension) else {
        tally.skipped += 1;
        return;
    };

    if jobs.send(Job { path, profile }).is_err() {
        tally.failed += 1;
    }
}

/// Recursively enumerate a directory, dispatching candidates as they are
/// found. Traversal errors are counted and logged, never fatal.
fn walk_directory(
    path: &Path,
    root: &Path,
    options: &ScanOptions,
    jobs: &Sender<Job>,
    tally: &mut WalkTally,
) {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            eprintln!("Error reading directory {}: {}", path.display(), err);
            tally.failed += 1;
            return;
        }
    };

    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("Error reading entry in {}: {}", path.display(), err);
                tally.failed += 1;
                continue;
            }
        };

        let entry_path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) => {
                eprintln!("Error reading type of {}: {}", entry_path.display(), err);
                tally.failed += 1;
                continue;
            }
        };

        if file_type.is_dir() {
            if !is_pruned_dir(&entry_path, &options.ignore) {
                walk_directory(&entry_path, root, options, jobs, tally);
            }
        } else {
            dispatch_candidate(entry_path, root, options, jobs, tally);
        }
    }
}

fn collect_results(
    results: Receiver<Result<FileReport, AnalysisError>>,
    mut aggregator: ResultAggregator,
) -> ResultAggregator {
    while let Ok(outcome) = results.recv() {
        match outcome {
            Ok(report) => aggregator.record(report),
            Err(err) => {
                eprintln!("{err}");
                aggregator.record_failure();
            }
        }
    }
    aggregator
}

/// Walk the tree under `root`, analyze every eligible file on a worker
/// pool, and return the merged totals. Returns only after every dispatched
/// job has been analyzed and collected.
fn run_scan(root: &Path, options: &ScanOptions) -> io::Result<AggregateReport> {
    let started = Instant::now();
    let worker_count = if options.jobs > 0 {
        options.jobs
    } else {
        default_worker_count()
    };

    let (job_tx, job_rx) = bounded::<Job>(worker_count * 2);
    let (result_tx, result_rx) = unbounded::<Result<FileReport, AnalysisError>>();
    let verbose = options.verbose;
    let mut tally = WalkTally::default();

    let aggregator = thread::scope(|scope| {
        for _ in 0..worker_count {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || {
                while let Ok(job) = jobs.recv() {
                    let outcome = analyze_file(&job.path, job.profile);
                    if verbose {
                        if let Ok(report) = &outcome {
                            println!(
                                "File: {}\n  Code lines: {}\n  Comment lines: {}\n  Blank lines: {}",
                                job.path.display(),
                                report.source_lines,
                                report.comment_lines,
                                report.blank_lines
                            );
                        }
                    }
                    if results.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(job_rx);
        drop(result_tx);

        let collector =
            scope.spawn(move || collect_results(result_rx, ResultAggregator::default()));

        walk_directory(root, root, options, &job_tx, &mut tally);
        // Closing the job channel lets the workers drain and exit; the
        // scope then joins them, which in turn closes the result channel.
        drop(job_tx);

        collector
            .join()
            .map_err(|_| io::Error::other("result collector thread panicked"))
    })?;

    Ok(aggregator.finalize(tally, started.elapsed()))
}

// ---------------------------------------------------------------------------
// Report rendering
// ---------------------------------------------------------------------------

fn build_summary_report(report: &AggregateReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "\n{}", "Overall Summary:".blue().bold());
    let _ = writeln!(
        output,
        "Analyzed files: {}",
        report.processed_files.to_string().bright_yellow()
    );
    let _ = writeln!(
        output,
        "Skipped files (unrecognised extension): {}",
        report.skipped_files.to_string().bright_yellow()
    );
    let _ = writeln!(
        output,
        "Failed files: {}",
        report.failed_files.to_string().bright_yellow()
    );
    let _ = writeln!(
        output,
        "Total time: {} seconds",
        format!("{:.2}", report.elapsed.as_secs_f64()).bright_yellow()
    );

    if report.per_language.is_empty() {
        return output;
    }

    let _ = writeln!(output, "\nTotals by language:");
    let _ = writeln!(output, "{}", "-".repeat(64));
    let _ = writeln!(
        output,
        "{:<width$} {:>8} {:>10} {:>10} {:>10}",
        "Language",
        "Files",
        "Code",
        "Comments",
        "Blank",
        width = LANG_WIDTH
    );
    let _ = writeln!(output, "{}", "-".repeat(64));

    let mut rows: Vec<_> = report.per_language.iter().collect();
    rows.sort_by(|(a, _), (b, _)| a.cmp(b));
    for (language, totals) in rows {
        let _ = writeln!(
            output,
            "{:<width$} {:>8} {:>10} {:>10} {:>10}",
            language,
            totals.files,
            totals.source_lines,
            totals.comment_lines,
            totals.blank_lines,
            width = LANG_WIDTH
        );
    }

    output
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    run_with_args(env::args_os())
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);

    println!(
        "{} {}",
        env!("CARGO_PKG_NAME").bright_cyan().bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_yellow()
    );

    let root = Path::new(&args.path);
    let metadata = fs::metadata(root).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("cannot access {}: {}", root.display(), err),
        )
    })?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", root.display()),
        ));
    }

    let filespec = match args.filespec.as_deref() {
        Some(spec) => Some(glob::Pattern::new(spec).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid filespec pattern '{}': {}", spec, err),
            )
        })?),
        None => None,
    };

    let options = ScanOptions {
        ignore: args.ignore,
        filespec,
        jobs: args.jobs,
        verbose: args.verbose,
    };

    println!("Scanning {}...", root.display());
    let aggregate = run_scan(root, &options)?;
    print!("{}", build_summary_report(&aggregate));

    Ok(())
}
