use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ragrag_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ragrag");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let corpus = root.join("corpus");
    fs::create_dir_all(corpus.join("notes")).unwrap();
    fs::write(
        corpus.join("alpha.md"),
        "# Alpha\n\nDense passage retrieval encodes questions and passages.\n\n## Training\n\nIn-batch negatives are used.",
    )
    .unwrap();
    fs::write(
        corpus.join("notes/beta.txt"),
        "Beta notes.\n\nBM25 remains a strong baseline for sparse retrieval.",
    )
    .unwrap();
    fs::write(
        corpus.join("gamma.html"),
        "<html><body><h1>Gamma</h1><p>Reranking with cross-encoders.</p><script>var x = 1;</script></body></html>",
    )
    .unwrap();

    // Downloaded papers live under the corpus but are owned by `upgrade`.
    fs::create_dir_all(corpus.join("papers")).unwrap();
    fs::write(corpus.join("papers/2004.04906.md"), "# DPR\n\nFull text.").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/ragrag.sqlite"

[chunking]
target_size = 64
overlap_fraction = 0.1

[corpus]
root = "{root}/corpus"

[upgrade]
papers_dir = "{root}/corpus/papers"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("ragrag.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_ragrag(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ragrag_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ragrag binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ragrag(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/ragrag.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ragrag(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ragrag(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_corpus_skips_papers_dir() {
    let (_tmp, config_path) = setup_test_env();

    run_ragrag(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ragrag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents seen: 3"), "got: {}", stdout);
    assert!(stdout.contains("ingested: 3"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reingest_is_noop_until_edit() {
    let (tmp, config_path) = setup_test_env();

    run_ragrag(&config_path, &["init"]);
    run_ragrag(&config_path, &["ingest"]);

    let (stdout, _, _) = run_ragrag(&config_path, &["ingest"]);
    assert!(stdout.contains("ingested: 0"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 3"));
    assert!(stdout.contains("chunks written: 0"));

    fs::write(
        tmp.path().join("corpus/alpha.md"),
        "# Alpha\n\nRewritten entirely.",
    )
    .unwrap();

    let (stdout, _, _) = run_ragrag(&config_path, &["ingest"]);
    assert!(stdout.contains("ingested: 1"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 2"));
}

#[test]
fn test_bad_document_does_not_abort_batch() {
    let (tmp, config_path) = setup_test_env();
    fs::write(tmp.path().join("corpus/broken.pdf"), b"not a pdf at all").unwrap();

    run_ragrag(&config_path, &["init"]);
    let (stdout, stderr, success) = run_ragrag(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingested: 3"), "got: {}", stdout);
    assert!(stdout.contains("failed: 1"));
    assert!(stdout.contains("broken.pdf"));
}

#[test]
fn test_ingest_single_file() {
    let (tmp, config_path) = setup_test_env();

    run_ragrag(&config_path, &["init"]);
    let file = tmp.path().join("corpus/notes/beta.txt");
    let (stdout, stderr, success) =
        run_ragrag(&config_path, &["ingest", file.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents seen: 1"), "got: {}", stdout);
    assert!(stdout.contains("ingested: 1"));
}

#[test]
fn test_stats_after_ingest() {
    let (_tmp, config_path) = setup_test_env();

    run_ragrag(&config_path, &["init"]);
    run_ragrag(&config_path, &["ingest"]);

    let (stdout, stderr, success) = run_ragrag(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Sources:     3"), "got: {}", stdout);
    assert!(stdout.contains("markdown"));
    assert!(stdout.contains("html"));
    assert!(stdout.contains("Papers:      0"));
}

#[test]
fn test_papers_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_ragrag(&config_path, &["init"]);
    let (stdout, _, success) = run_ragrag(&config_path, &["papers"]);
    assert!(success);
    assert!(stdout.contains("No papers stored."));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ragrag(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
