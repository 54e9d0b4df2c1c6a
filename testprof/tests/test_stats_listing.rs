use std::path::{Path, PathBuf};
use testprof::analysis::StatsView;
use testprof::domain::{Restriction, SortKey};
use testprof::session::{collect_profiles, combine};
use testprof_common::{FunctionKey, ProfileFormatError};

const FIXTURES: &str = "tests/fixtures";

fn fixture(name: &str) -> PathBuf {
    Path::new(FIXTURES).join(name)
}

fn render(f: impl FnOnce(&mut Vec<u8>) -> std::io::Result<()>) -> String {
    let mut out = Vec::new();
    f(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_load_fixture_profile() {
    let view = StatsView::load(&fixture("test_parse.prof")).unwrap();
    assert_eq!(view.data().len(), 2);
    assert_eq!(view.data().total_calls(), 3);

    let parse = view.data().get(&FunctionKey::new("src/parser.rs", 20, "parse")).unwrap();
    assert_eq!(parse.callers.len(), 1);
}

#[test]
fn test_future_format_version_is_rejected() {
    let result = StatsView::load(&fixture("invalid/future_version.prof"));
    assert!(matches!(result, Err(ProfileFormatError::UnsupportedVersion { found: 7 })));
}

#[test]
fn test_collect_fixture_directory() {
    let profiles = collect_profiles(&[PathBuf::from(FIXTURES)]).unwrap();
    assert_eq!(profiles, vec![fixture("test_parse.prof"), fixture("test_render.prof")]);
}

#[test]
fn test_combined_listing_sorted_by_cumulative_time() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = vec![fixture("test_parse.prof"), fixture("test_render.prof")];
    let combined = combine(&profiles, tmp.path()).unwrap().unwrap();

    let mut view = StatsView::with_source(combined.data, &combined.path);
    view.sort_stats(&[SortKey::Cumulative]);
    let text = render(|out| view.print_stats(out, &[]));

    assert!(text.contains("         6 function calls in 0.013 seconds\n"));
    assert!(text.contains("   Ordered by: cumulative time\n"));

    let rows: Vec<&str> = text.lines().filter(|l| l.ends_with(')') && !l.contains("filename:lineno")).collect();
    let names: Vec<&str> = rows.iter().filter_map(|r| r.rsplit(' ').next()).collect();
    assert_eq!(
        names,
        vec![
            "tests/bench.rs:30(test_render)",
            "src/parser.rs:20(parse)",
            "tests/bench.rs:10(test_parse)",
            "src/render.rs:5(render)",
        ]
    );
    assert!(text.contains("        3    0.006    0.002    0.006    0.002 src/parser.rs:20(parse)\n"));
}

#[test]
fn test_restrictions_compose_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = vec![fixture("test_parse.prof"), fixture("test_render.prof")];
    let combined = combine(&profiles, tmp.path()).unwrap().unwrap();

    let mut view = StatsView::new(combined.data);
    view.sort_stats(&[SortKey::Tottime]);
    let text = render(|out| {
        view.print_stats(out, &[Restriction::Pattern("test_".into()), Restriction::Count(1)])
    });

    assert!(text.contains("   List reduced from 4 to 2 due to restriction <'test_'>\n"));
    assert!(text.contains("   List reduced from 2 to 1 due to restriction <1>\n"));
    assert!(text.contains("tests/bench.rs:30(test_render)"));
    assert!(!text.contains("tests/bench.rs:10(test_parse)"));
}

#[test]
fn test_callers_of_merged_function() {
    let tmp = tempfile::tempdir().unwrap();
    let profiles = vec![fixture("test_parse.prof"), fixture("test_render.prof")];
    let combined = combine(&profiles, tmp.path()).unwrap().unwrap();

    let mut view = StatsView::new(combined.data);
    view.strip_dirs();
    let text = render(|out| view.print_callers(out, &[Restriction::Pattern("parse\\)".into())]));

    assert!(text.contains("   Listed in natural (file, line, name) order\n"));
    assert!(text.contains("was called by..."));
    assert!(text.contains("bench.rs:10(test_parse)"));
    assert!(text.contains("bench.rs:30(test_render)"));
    assert!(!text.contains("tests/bench.rs"));
}
