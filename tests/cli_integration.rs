// CLI integration tests for the minify/list/check-roots flows.
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_stubjar");
    Command::new(exe)
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn parse_json(text: &str) -> Value {
    serde_json::from_str(text).expect("valid json")
}

#[test]
fn minify_writes_jar_and_report() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = temp.path().join("stub.jar");
    let report_path = temp.path().join("report.json");

    let run = cmd()
        .args([
            "minify",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "--root",
            "com/example/gson/Gson#newBuilder()Lcom/example/gson/GsonBuilder;",
            "-o",
            output.to_str().unwrap(),
            "--report",
            report_path.to_str().unwrap(),
            "--quiet",
        ])
        .output()
        .expect("minify");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));

    let jar = std::fs::read(&output).expect("output jar");
    // Zip local header signature.
    assert_eq!(&jar[..4], &[0x50, 0x4b, 0x03, 0x04]);

    let report = parse_json(&std::fs::read_to_string(&report_path).expect("report"));
    assert_eq!(report["classes_emitted"], 3);
    assert_eq!(report["roots"], 1);
    assert_eq!(report["output_bytes"].as_u64().unwrap(), jar.len() as u64);
    assert_eq!(report["sha256"].as_str().unwrap().len(), 64);
    let missing: Vec<_> = report["missing"]
        .as_array()
        .expect("missing array")
        .iter()
        .map(|value| value.as_str().unwrap())
        .collect();
    assert!(missing.contains(&"java/lang/Object"));

    let stdout = String::from_utf8_lossy(&run.stdout);
    assert!(stdout.contains("Wrote"), "stdout: {stdout}");
}

#[test]
fn minify_reads_deflated_jar_classpaths() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = temp.path().join("stub.jar");

    let run = cmd()
        .args([
            "minify",
            "--cp",
            fixture("sample.jar").to_str().unwrap(),
            "--root",
            "com/example/gson/Gson",
            "-o",
            output.to_str().unwrap(),
            "--quiet",
        ])
        .output()
        .expect("minify");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));
    assert!(output.exists());
}

#[test]
fn minify_accepts_a_roots_file_and_separator_classpaths() {
    let temp = tempfile::tempdir().expect("tempdir");
    let roots = temp.path().join("roots.txt");
    std::fs::write(
        &roots,
        "# compile surface\ncom/example/gson/Gson\n\ncom/example/gson/GsonBuilder#lenient\n",
    )
    .expect("roots file");
    let output = temp.path().join("stub.jar");
    let joined = format!(
        "{}:{}",
        fixture("classes").display(),
        fixture("sample.jar").display()
    );

    let run = cmd()
        .args([
            "minify",
            "--cp",
            &joined,
            "--roots",
            roots.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--quiet",
        ])
        .output()
        .expect("minify");
    assert!(run.status.success(), "stderr: {}", String::from_utf8_lossy(&run.stderr));
}

#[test]
fn missing_roots_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = cmd()
        .args([
            "minify",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "-o",
            temp.path().join("stub.jar").to_str().unwrap(),
        ])
        .output()
        .expect("minify");
    assert_eq!(run.status.code(), Some(2));

    // stderr is not a terminal here, so the error arrives as JSON.
    let stderr = String::from_utf8_lossy(&run.stderr);
    let line = stderr.lines().last().expect("error line");
    let error = parse_json(line);
    assert_eq!(error["error"]["kind"], "Usage");
}

#[test]
fn malformed_root_signature_is_a_usage_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = cmd()
        .args([
            "minify",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "--root",
            "com/example/gson/Gson#run(",
            "-o",
            temp.path().join("stub.jar").to_str().unwrap(),
        ])
        .output()
        .expect("minify");
    assert_eq!(run.status.code(), Some(2));
}

#[test]
fn list_prints_internal_names() {
    let run = cmd()
        .args(["list", "--cp", fixture("classes").to_str().unwrap(), "--quiet"])
        .output()
        .expect("list");
    assert!(run.status.success());
    let stdout = String::from_utf8_lossy(&run.stdout);
    let names: Vec<_> = stdout.lines().collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&"com/example/gson/Gson"));
}

#[test]
fn list_json_prints_an_array_of_class_names() {
    let run = cmd()
        .args([
            "list",
            "--cp",
            fixture("sample.jar").to_str().unwrap(),
            "--json",
            "--quiet",
        ])
        .output()
        .expect("list");
    assert!(run.status.success());
    let names = parse_json(&String::from_utf8_lossy(&run.stdout));
    let names = names.as_array().expect("array");
    assert_eq!(names.len(), 3);
    assert!(names.contains(&serde_json::json!("com/example/gson/Gson")));
}

#[test]
fn check_roots_passes_and_fails_with_exit_3() {
    let ok = cmd()
        .args([
            "check-roots",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "--root",
            "com/example/gson/Gson#fromJson(Ljava/lang/String;Ljava/lang/Class;)Ljava/lang/Object;",
            "--quiet",
        ])
        .output()
        .expect("check-roots");
    assert!(ok.status.success());

    let bad = cmd()
        .args([
            "check-roots",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "--root",
            "com/example/gson/Gson",
            "--root",
            "com/example/gson/Gson#noSuchMethod()V",
            "--quiet",
        ])
        .output()
        .expect("check-roots");
    assert_eq!(bad.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&bad.stdout);
    assert!(stdout.contains("unresolved: com/example/gson/Gson#noSuchMethod()V"));
}

#[test]
fn nonexistent_classpath_entries_are_skipped_not_fatal() {
    let run = cmd()
        .args([
            "list",
            "--cp",
            "no-such-dir",
            "--cp",
            fixture("classes").to_str().unwrap(),
            "--quiet",
        ])
        .output()
        .expect("list");
    assert!(run.status.success());
    let stdout = String::from_utf8_lossy(&run.stdout);
    assert_eq!(stdout.lines().count(), 3);
}
