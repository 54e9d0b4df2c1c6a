use std::path::Path;
use std::process::{Command, Output};

fn testprof(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_testprof"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn copy_fixtures(to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for name in ["test_parse.prof", "test_render.prof"] {
        std::fs::copy(Path::new("tests/fixtures").join(name), to.join(name)).unwrap();
    }
}

#[test]
fn test_summarizes_default_directory() {
    let tmp = tempfile::tempdir().unwrap();
    copy_fixtures(&tmp.path().join("prof"));

    let output = testprof(tmp.path(), &["--profiling-sort-key", "calls", "--gprof2dot-use-it"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let combined = tmp.path().join("prof").join("combined.prof");
    assert!(stdout.starts_with(&format!("Profiling (from {}):\n", combined.display())));
    assert!(stdout.contains("   Ordered by: call count\n"));
    assert!(combined.is_file());
    assert!(String::from_utf8(output.stderr).unwrap().contains("Merging 2 profile(s)"));
}

#[test]
fn test_persisted_settings_apply() {
    let tmp = tempfile::tempdir().unwrap();
    copy_fixtures(&tmp.path().join("prof"));
    std::fs::write(tmp.path().join("testprof.toml"), "[profiling]\nstrip_dirs = true\nprofiling_mode = \"callees\"\n")
        .unwrap();

    let output = testprof(tmp.path(), &["-q", "--other-property=val1"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("was called by..."));
    assert!(stdout.contains("parser.rs:20(parse)"));
    assert!(!stdout.contains("src/parser.rs"));
    assert!(output.stderr.is_empty());
}

#[test]
fn test_explicit_files() {
    let tmp = tempfile::tempdir().unwrap();
    copy_fixtures(tmp.path());
    let out_dir = tmp.path().join("out");

    let output = testprof(
        tmp.path(),
        &["test_render.prof", "--pstats-dir", out_dir.to_str().unwrap(), "--profiling-filter", "render"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(out_dir.join("combined.prof").is_file());
    assert!(stdout.contains("List reduced from 3 to 2 due to restriction <'render'>"));
    assert!(!stdout.contains("test_parse"));
}

#[test]
fn test_no_profiles_is_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("prof")).unwrap();

    let output = testprof(tmp.path(), &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8(output.stderr).unwrap().contains("No profiles found"));
}

#[test]
fn test_invalid_persisted_value_is_a_usage_error() {
    let tmp = tempfile::tempdir().unwrap();
    copy_fixtures(&tmp.path().join("prof"));
    std::fs::write(tmp.path().join("testprof.toml"), "[profiling]\nprofiling_mode = \"sideways\"\n").unwrap();

    let output = testprof(tmp.path(), &[]);
    assert_eq!(output.status.code(), Some(2));
}
