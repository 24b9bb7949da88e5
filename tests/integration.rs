use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

fn tutor_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("tutor");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("files")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/tutor.sqlite"

[chunking]
chunk_size = 200
chunk_overlap = 20

[embedding]
provider = "hashed"
dims = 64

[generation]
provider = "disabled"

[ingest]
max_attempts = 1
backoff_ms = 0

[server]
bind = "127.0.0.1:0"
upload_dir = "{root}/uploads"

[chat_log]
sink = "jsonl"
path = "{root}/data/chat_log.jsonl"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("tutor.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// PDF with one line of text per page in a base-14 font.
fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let pages = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn run_tutor(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = tutor_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run tutor binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_tutor(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/tutor.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_tutor(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_tutor(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_documents_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tutor(&config_path, &["documents"]);
    assert!(success, "documents failed: {}", stderr);
    assert!(stdout.contains("No documents ingested."));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_tutor(&missing, &["documents"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_rejects_non_pdf() {
    let (tmp, config_path) = setup_test_env();
    let notes = tmp.path().join("files/notes.txt");
    fs::write(&notes, "Amendment of section 183.\nThe fine is Rs 1000.\n").unwrap();

    run_tutor(&config_path, &["init"]);
    let (_, stderr, success) = run_tutor(&config_path, &["ingest", notes.to_str().unwrap()]);
    assert!(!success, "ingesting a .txt must fail");
    assert!(stderr.contains("notes.txt"), "stderr: {}", stderr);

    let (stdout, _, _) = run_tutor(&config_path, &["documents"]);
    assert!(stdout.contains("No documents ingested."));
}

#[test]
fn test_ingest_rejects_corrupt_pdf() {
    let (tmp, config_path) = setup_test_env();
    let bad = tmp.path().join("files/bad.pdf");
    fs::write(&bad, b"not a valid pdf").unwrap();

    run_tutor(&config_path, &["init"]);
    let (_, stderr, success) = run_tutor(&config_path, &["ingest", bad.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("bad.pdf"), "stderr: {}", stderr);
}

#[test]
fn test_extract_non_pdf_fails_without_config() {
    let tmp = TempDir::new().unwrap();
    let bad = tmp.path().join("bad.pdf");
    fs::write(&bad, b"plain text").unwrap();

    // No config file exists; extract must not need one
    let (_, stderr, success) = run_tutor(
        &tmp.path().join("absent.toml"),
        &["extract", bad.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Failed to extract"), "stderr: {}", stderr);
}

#[test]
fn test_extract_generated_pdf() {
    let tmp = TempDir::new().unwrap();
    let pdf = tmp.path().join("act.pdf");
    write_pdf(&pdf, &["Amendment of section 183."]);

    let (stdout, stderr, success) = run_tutor(
        &tmp.path().join("absent.toml"),
        &["extract", pdf.to_str().unwrap()],
    );
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("--- page 1"), "stdout: {}", stdout);
    assert!(stdout.contains("1 pages"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_generated_pdf() {
    let (tmp, config_path) = setup_test_env();
    let pdf = tmp.path().join("files/act.pdf");
    write_pdf(&pdf, &["Amendment of section 183."]);

    run_tutor(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tutor(&config_path, &["ingest", pdf.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("ingest act.pdf"), "stdout: {}", stdout);
    assert!(stdout.contains("collection: socratic_collection"));

    // Re-ingesting the same file is allowed
    let (_, stderr, success) = run_tutor(&config_path, &["ingest", pdf.to_str().unwrap()]);
    assert!(success, "re-ingest failed: {}", stderr);
}

#[test]
fn test_two_page_pdf_is_chunked_under_its_heading() {
    let (tmp, config_path) = setup_test_env();
    let pdf = tmp.path().join("files/act.pdf");
    write_pdf(&pdf, &["Amendment of section 183.", "The fine is Rs 1000."]);

    let (stdout, stderr, success) = run_tutor(&config_path, &["extract", pdf.to_str().unwrap()]);
    assert!(success, "extract failed: {}", stderr);
    assert!(stdout.contains("2 pages"), "stdout: {}", stdout);

    run_tutor(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tutor(&config_path, &["ingest", pdf.to_str().unwrap()]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("chunks: 1 (1 with heading context)"),
        "stdout: {}",
        stdout
    );

    let (stdout, stderr, success) = run_tutor(
        &config_path,
        &["search", "what is the fine", "--document", "act.pdf"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(
        stdout.contains("excerpt: \"Regarding Amendment of section 183.: The fine is Rs 1000.\""),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_search_unknown_document_is_empty() {
    let (_tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tutor(
        &config_path,
        &["search", "what is the fine", "--document", "missing.pdf"],
    );
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_chat_without_documents_answers_no_context() {
    let (tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (stdout, stderr, success) = run_tutor(
        &config_path,
        &["chat", "What is the fine?", "--document", "missing.pdf"],
    );
    assert!(success, "chat failed: {}", stderr);
    assert!(
        stdout.contains("I couldn't find specific information"),
        "stdout: {}",
        stdout
    );

    let log = fs::read_to_string(tmp.path().join("data/chat_log.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"document_source\":\"missing.pdf\""));
}

#[test]
fn test_chat_trims_message_before_logging() {
    let (tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (_, stderr, success) = run_tutor(
        &config_path,
        &["chat", "  What is the fine?\n", "--document", " missing.pdf "],
    );
    assert!(success, "chat failed: {}", stderr);

    let log = fs::read_to_string(tmp.path().join("data/chat_log.jsonl")).unwrap();
    assert!(log.contains("\"user_message\":\"What is the fine?\""), "log: {}", log);
    assert!(log.contains("\"document_source\":\"missing.pdf\""), "log: {}", log);

    let (_, stderr, success) = run_tutor(&config_path, &["chat", "   ", "--document", "a.pdf"]);
    assert!(!success);
    assert!(stderr.contains("message must not be empty"), "stderr: {}", stderr);
}

#[test]
fn test_chat_rejects_bad_history() {
    let (_tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (_, stderr, success) = run_tutor(
        &config_path,
        &["chat", "hi", "--document", "a.pdf", "--history", "{oops"],
    );
    assert!(!success);
    assert!(stderr.contains("--history"), "stderr: {}", stderr);
}

#[test]
fn test_chat_rejects_unrecognized_history_turn() {
    let (_tmp, config_path) = setup_test_env();

    run_tutor(&config_path, &["init"]);
    let (_, stderr, success) = run_tutor(
        &config_path,
        &[
            "chat",
            "hi",
            "--document",
            "a.pdf",
            "--history",
            r#"[{"role":"bot","text":"x"}]"#,
        ],
    );
    assert!(!success);
    assert!(stderr.contains("history entry 0"), "stderr: {}", stderr);
}

#[test]
fn test_models_requires_api_key_but_not_config() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(tutor_binary())
        .current_dir(tmp.path())
        .arg("--config")
        .arg(tmp.path().join("absent.toml"))
        .arg("models")
        .env_remove("GOOGLE_API_KEY")
        .env("RUST_LOG", "warn")
        .output()
        .unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!output.status.success());
    assert!(stderr.contains("GOOGLE_API_KEY"), "stderr: {}", stderr);
    assert!(!stderr.contains("Failed to read config file"), "stderr: {}", stderr);
}
