use std::path::Path;
use testprof::harness::{Conclusion, Harness};
use testprof_common::{FunctionKey, ProfileData, COMBINED_PROFILE_NAME};

#[tracing::instrument]
fn tokenize(input: &str) -> Vec<String> {
    input.split_whitespace().map(String::from).collect()
}

#[tracing::instrument]
fn parse_sum(input: &str) -> i64 {
    tokenize(input).iter().filter_map(|t| t.parse::<i64>().ok()).sum()
}

fn find<'a>(data: &'a ProfileData, name: &str) -> &'a FunctionKey {
    data.functions()
        .keys()
        .find(|k| k.name == name && k.file.ends_with("test_harness_session.rs"))
        .unwrap_or_else(|| panic!("{name} was not recorded"))
}

fn config_file(dir: &Path, content: &str) -> String {
    let path = dir.join("testprof.toml");
    std::fs::write(&path, content).unwrap();
    format!("--config={}", path.display())
}

#[test]
fn test_profiled_session_records_instrumented_calls() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("prof");

    let harness = Harness::from_args([
        "bench".to_string(),
        "--profile".to_string(),
        format!("--pstats-dir={}", dir.display()),
        config_file(tmp.path(), "[profiling]\nprofiling_mode = \"callers\"\n"),
    ])
    .unwrap()
    .test("test_sum", || {
        anyhow::ensure!(parse_sum("1 2 3") == 6, "wrong sum");
        Ok(())
    })
    .test("test_twice", || {
        parse_sum("4");
        parse_sum("5 6");
        Ok(())
    });

    let mut out = Vec::new();
    let conclusion = harness.run_with_output(&mut out).unwrap();
    assert_eq!(conclusion, Conclusion { passed: 2, failed: 0, filtered_out: 0 });

    let single = ProfileData::load(dir.join("test_sum.prof")).unwrap();
    let parse = find(&single, "parse_sum").clone();
    let tokenize = find(&single, "tokenize").clone();
    assert_eq!(single.get(&parse).unwrap().stats.total_calls, 1);
    let tokenize_profile = single.get(&tokenize).unwrap();
    assert_eq!(tokenize_profile.callers.keys().collect::<Vec<_>>(), vec![&parse]);
    // Each test is the root frame of its own profile
    let root = find(&single, "test_sum").clone();
    assert_eq!(single.get(&parse).unwrap().callers.keys().collect::<Vec<_>>(), vec![&root]);
    assert_eq!(single.get(&root).unwrap().stats.primitive_calls, 1);

    let combined = ProfileData::load(dir.join(COMBINED_PROFILE_NAME)).unwrap();
    assert_eq!(combined.get(&parse).unwrap().stats.total_calls, 3);
    assert_eq!(combined.get(&tokenize).unwrap().stats.total_calls, 3);

    // Persisted mode applies: "callers" lists what each function called
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("test result: ok. 2 passed"));
    assert!(text.contains("called..."));
}

#[test]
fn test_command_line_overrides_persisted_settings() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("prof");

    let harness = Harness::from_args([
        "bench".to_string(),
        format!("--pstats-dir={}", dir.display()),
        "--profiling-mode=stats".to_string(),
        "--element-number=1".to_string(),
        config_file(tmp.path(), "[profiling]\nprofile = true\nprofiling_mode = \"callees\"\n"),
    ])
    .unwrap()
    .test("test_sum", || {
        parse_sum("7 8");
        Ok(())
    });

    let mut out = Vec::new();
    harness.run_with_output(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(dir.join("test_sum.prof").is_file());
    assert!(text.contains("filename:lineno(function)"));
    assert!(!text.contains("was called by..."));
    assert!(text.contains("List reduced from 3 to 1 due to restriction <1>"));
}

#[test]
fn test_profiling_off_writes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("prof");

    let harness = Harness::from_args([
        "bench".to_string(),
        format!("--pstats-dir={}", dir.display()),
        config_file(tmp.path(), "[profiling]\n"),
    ])
    .unwrap()
    .test("test_sum", || {
        parse_sum("1");
        Ok(())
    });

    let mut out = Vec::new();
    harness.run_with_output(&mut out).unwrap();
    assert!(!dir.exists());
    assert!(!String::from_utf8(out).unwrap().contains("Profiling (from"));
}

#[test]
fn test_long_test_names_fall_back_to_hashed_files() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("prof");
    let long_name = format!("test_{}", "x".repeat(300));

    let harness = Harness::from_args([
        "bench".to_string(),
        "--profile".to_string(),
        format!("--pstats-dir={}", dir.display()),
        config_file(tmp.path(), "[profiling]\n"),
    ])
    .unwrap()
    .test(long_name.as_str(), || Ok(()));

    let mut out = Vec::new();
    let conclusion = harness.run_with_output(&mut out).unwrap();
    assert_eq!(conclusion.passed, 1);

    let written: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != COMBINED_PROFILE_NAME)
        .collect();
    assert_eq!(written.len(), 1);
    assert!(written[0].len() < 255);
}
