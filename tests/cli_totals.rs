use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn parloc_bin() -> &'static str {
    env!("CARGO_BIN_EXE_parloc")
}

fn write_file(path: &Path, contents: &str) {
    fs::write(path, contents).expect("failed to write test file");
}

// Map: lang -> (files, code, comments, blank) from the totals table.
fn parse_totals(stdout: &str) -> HashMap<String, (u64, u64, u64, u64)> {
    let mut out = HashMap::new();
    let mut iter = stdout.lines();
    while let Some(line) = iter.next() {
        if line.contains("Totals by language:") {
            break;
        }
    }
    for line in iter {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if trimmed.starts_with('-') || trimmed.starts_with("Language") {
            continue;
        }
        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let parse_u64 = |s: &str| s.parse::<u64>().unwrap_or(0);
        out.insert(
            parts[0].to_string(),
            (
                parse_u64(parts[1]),
                parse_u64(parts[2]),
                parse_u64(parts[3]),
                parse_u64(parts[4]),
            ),
        );
    }
    out
}

fn run_and_parse(root: &Path, extra_args: &[&str]) -> HashMap<String, (u64, u64, u64, u64)> {
    let output = Command::new(parloc_bin())
        .arg(root)
        .args(extra_args)
        .output()
        .expect("failed to execute parloc");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    parse_totals(&String::from_utf8_lossy(&output.stdout))
}

#[test]
fn cli_totals_for_c_family_and_hash_languages() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();

    // C: comment=2, blank=2, code=1
    write_file(&root.join("a.c"), "// c\n\nint x=1;\n  \n// c2\n");
    // Python: comment=1, blank=1, code=2
    write_file(&root.join("b.py"), "# header\n\nx = 1\ny = 2\n");

    let totals = run_and_parse(root, &[]);

    assert_eq!(totals["C"], (1, 1, 2, 2), "C (files, code, comments, blank)");
    assert_eq!(
        totals["Python"],
        (1, 2, 1, 1),
        "Python (files, code, comments, blank)"
    );
}

#[test]
fn cli_totals_block_comment_spanning_lines() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();

    write_file(&root.join("span.c"), "/* start\nmiddle\nend */\ncode();\n");

    let totals = run_and_parse(root, &[]);
    let (files, code, comments, blank) = totals["C"];
    assert_eq!(files, 1);
    assert_eq!(code, 1);
    assert_eq!(comments, 3);
    assert_eq!(blank, 0);
}

#[test]
fn cli_totals_same_line_block_open_close() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();

    // A one-line block comment leaves the block state open, so the code
    // line after it is counted as comment.
    write_file(&root.join("quirk.c"), "/* a */\ncode();\n");

    let totals = run_and_parse(root, &[]);
    let (_, code, comments, _) = totals["C"];
    assert_eq!(comments, 2);
    assert_eq!(code, 0);
}

#[test]
fn cli_totals_identical_across_worker_counts() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();

    for i in 0..60 {
        write_file(&root.join(format!("f{i}.py")), "# header\n\nx = 1\n");
        write_file(&root.join(format!("g{i}.c")), "// c\nint x;\n\n");
    }

    let one_worker = run_and_parse(root, &["--jobs", "1"]);
    let eight_workers = run_and_parse(root, &["--jobs", "8"]);

    assert_eq!(one_worker, eight_workers);
    assert_eq!(eight_workers["Python"], (60, 60, 60, 60));
    assert_eq!(eight_workers["C"], (60, 60, 60, 60));
}

#[test]
fn cli_filespec_restricts_totals() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let root = temp_dir.path();

    write_file(&root.join("a.py"), "x = 1\n");
    write_file(&root.join("b.c"), "int x;\n");

    let totals = run_and_parse(root, &["--filespec", "*.py"]);
    assert!(totals.contains_key("Python"));
    assert!(!totals.contains_key("C"));
}
