//! End-to-end checks: real suite files on disk, real child processes, and
//! the reports a user would see when an expectation is not met.

use std::fs;
use std::process::Command;

use tempfile::TempDir;

use cli_tester::config::load_suites;
use cli_tester::{CaptureSpec, Comparator, Content, DiffMode, Encoding, Error, StyleMap, TreatAs};

const ECHO_SUITE: &str = r#"
name: echo
binary_path: /bin/echo
tests:
  - test: prints_argument
    arguments: ["hello"]
    expected_stdout:
      content: "hello\n"
      treat_as: text
"#;

#[test]
fn test_load_suites_discovers_and_excludes() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("echo.yaml"), ECHO_SUITE).unwrap();
    fs::write(
        dir.path().join("other.yml"),
        "name: other\nbinary_path: /bin/true\ntests: []\n",
    )
    .unwrap();
    fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

    let excluded = dir.path().join("excluded");
    fs::create_dir(&excluded).unwrap();
    fs::write(excluded.join("hidden.yaml"), ECHO_SUITE).unwrap();

    let suites = load_suites(dir.path(), Some(&excluded)).unwrap();
    let mut names = suites.iter().map(|s| s.name.as_str()).collect::<Vec<_>>();
    names.sort_unstable();
    assert_eq!(names, vec!["echo", "other"]);
}

#[test]
fn test_load_suites_requires_at_least_one() {
    let dir = TempDir::new().unwrap();
    match load_suites(dir.path(), None) {
        Err(Error::Config(_)) => (),
        other => panic!("expected a config error, got {:?}", other),
    }
}

#[test]
fn test_load_suites_reports_the_broken_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bad.yaml"), "name: [unclosed").unwrap();
    match load_suites(dir.path(), None) {
        Err(Error::Suite { path, .. }) => {
            assert!(path.ends_with("bad.yaml"));
        }
        other => panic!("expected a suite error, got {:?}", other),
    }
}

#[cfg(unix)]
fn capture_stdout(script: &str) -> Vec<u8> {
    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(script)
        .output()
        .unwrap();
    assert!(output.status.success());
    output.stdout
}

#[cfg(unix)]
#[test]
fn test_text_mismatch_against_a_real_process() {
    let styles = StyleMap::plain();
    let comparator = Comparator::new(DiffMode::Word, Encoding::Utf8, &styles);

    let expected = Content {
        content: Some("colour the sky".to_string()),
        treat_as: TreatAs::Text,
        ..Content::default()
    };
    let captured = capture_stdout("printf 'color the sky'");
    let spec = CaptureSpec {
        treat_as: TreatAs::Text,
        ..CaptureSpec::default()
    };

    let result = comparator.compare(
        &expected.treated().unwrap(),
        &spec.treat(captured).unwrap(),
        Some("Command stdout and expected output are different"),
    );
    match result {
        Err(Error::Mismatch(report)) => {
            assert!(report.contains("Command stdout and expected output are different"));
            assert!(report.contains("- olour "));
            assert!(report.contains("+ olor "));
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_structured_mismatch_against_a_real_process() {
    let styles = StyleMap::plain();
    let comparator = Comparator::new(DiffMode::Line, Encoding::Utf8, &styles);

    let expected = Content {
        content: Some(r#"{"k": 1, "stable": true}"#.to_string()),
        treat_as: TreatAs::Json,
        ..Content::default()
    };
    let captured = capture_stdout(r#"printf '{"k": 2, "stable": true}'"#);
    let spec = CaptureSpec {
        treat_as: TreatAs::Json,
        ..CaptureSpec::default()
    };

    let result = comparator.compare(
        &expected.treated().unwrap(),
        &spec.treat(captured).unwrap(),
        None,
    );
    match result {
        Err(Error::Mismatch(report)) => {
            assert!(report.contains("=> CHANGE"));
            assert!(report.contains("at key k values are different"));
            assert!(report.contains("EXPECTED: 1"));
            assert!(report.contains("  ACTUAL: 2"));
            assert!(!report.contains("stable"));
        }
        other => panic!("expected a mismatch, got {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_matching_output_passes() {
    let styles = StyleMap::plain();
    let comparator = Comparator::new(DiffMode::Word, Encoding::Utf8, &styles);

    let expected = Content {
        content: Some("steady\n".to_string()),
        treat_as: TreatAs::Text,
        ..Content::default()
    };
    let captured = capture_stdout("echo steady");
    let spec = CaptureSpec {
        treat_as: TreatAs::Text,
        ..CaptureSpec::default()
    };
    assert!(comparator
        .compare(
            &expected.treated().unwrap(),
            &spec.treat(captured).unwrap(),
            None
        )
        .is_ok());
}

#[cfg(unix)]
#[test]
fn test_structured_json_ignores_formatting() {
    let styles = StyleMap::plain();
    let comparator = Comparator::new(DiffMode::Word, Encoding::Utf8, &styles);

    let expected = Content {
        content: Some("{\"b\": 2, \"a\": 1}".to_string()),
        treat_as: TreatAs::Json,
        ..Content::default()
    };
    let captured = capture_stdout(r#"printf '{"a": 1,\n "b": 2}'"#);
    let spec = CaptureSpec {
        treat_as: TreatAs::Json,
        ..CaptureSpec::default()
    };
    assert!(comparator
        .compare(
            &expected.treated().unwrap(),
            &spec.treat(captured).unwrap(),
            None
        )
        .is_ok());
}

#[test]
fn test_capture_spec_saves_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("runs").join("stdout.txt");
    let spec = CaptureSpec {
        file_path: Some(path.clone()),
        ..CaptureSpec::default()
    };
    spec.save("captured text").unwrap();
    assert_eq!(fs::read_to_string(path).unwrap(), "captured text");
}
