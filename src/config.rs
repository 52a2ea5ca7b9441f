//! Declarative test configuration: YAML suite files describing which binary
//! to run, the flags and arguments of each case, and the expected outputs.
//! Suites are discovered on disk and deserialized with serde.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::compare::Payload;
use crate::error::{Error, Result};
use crate::textdiff::DiffMode;

/// Byte decoding declared for a piece of content. Only UTF-8 today; the
/// enum keeps the YAML field forward-compatible.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum Encoding {
    #[serde(rename = "utf-8")]
    Utf8,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
        }
    }

    pub fn decode(self, bytes: Vec<u8>) -> Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes).map_err(|source| Error::Decode {
                encoding: "utf-8",
                source,
            }),
        }
    }
}

/// How a piece of content takes part in a comparison.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TreatAs {
    Json,
    Yaml,
    Bytes,
    Text,
}

impl Default for TreatAs {
    fn default() -> Self {
        TreatAs::Bytes
    }
}

/// Expected content for one stream, given inline or as a file reference.
/// Exactly one of `content` and `file_path` must be set.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Content {
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub treat_as: TreatAs,
    pub file_path: Option<PathBuf>,
}

impl Content {
    pub fn validate(&self) -> Result<()> {
        match (&self.content, &self.file_path) {
            (None, None) => Err(Error::Config(
                "one of 'content' and 'file_path' must be provided".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::Config(
                "only one of 'content' and 'file_path' may be set".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn text(&self) -> Result<String> {
        match (&self.content, &self.file_path) {
            (Some(content), _) => Ok(content.clone()),
            (None, Some(path)) => Ok(fs::read_to_string(path)?),
            (None, None) => Err(Error::Config(
                "content has neither inline text nor a file path".to_string(),
            )),
        }
    }

    /// The comparison payload this content stands for, after applying its
    /// `treat_as` coercion.
    pub fn treated(&self) -> Result<Payload> {
        let text = self.text()?;
        coerce(text, self.treat_as)
    }
}

/// Per-case instructions for a captured stream: how to treat the bytes for
/// comparison and, optionally, where to save them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureSpec {
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default)]
    pub treat_as: TreatAs,
    pub file_path: Option<PathBuf>,
}

impl CaptureSpec {
    /// Coerce the captured bytes into a comparison payload.
    pub fn treat(&self, bytes: Vec<u8>) -> Result<Payload> {
        match self.treat_as {
            TreatAs::Bytes => Ok(Payload::Bytes(bytes)),
            other => coerce(self.encoding.decode(bytes)?, other),
        }
    }

    /// Save the captured text next to the test run, creating parent
    /// directories as needed. A spec with no `file_path` saves nothing.
    pub fn save(&self, text: &str) -> Result<()> {
        if let Some(path) = &self.file_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!(path = %path.display(), "saving captured output");
            fs::write(path, text)?;
        }
        Ok(())
    }
}

fn coerce(text: String, treat_as: TreatAs) -> Result<Payload> {
    match treat_as {
        TreatAs::Bytes => Ok(Payload::Bytes(text.into_bytes())),
        TreatAs::Text => Ok(Payload::Text(text)),
        TreatAs::Json => serde_json::from_str(&text)
            .map(Payload::Structured)
            .map_err(|e| Error::Config(format!("invalid JSON content: {}", e))),
        TreatAs::Yaml => serde_yaml::from_str(&text)
            .map(Payload::Structured)
            .map_err(|e| Error::Config(format!("invalid YAML content: {}", e))),
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Str,
    Path,
    ResolvedPath,
    Int,
}

/// One command-line flag, rendered as `-name value` (or a bare `-name` when
/// it carries no value).
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Flag {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<FlagKind>,
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
}

impl Flag {
    pub fn build(&self) -> Result<Vec<String>> {
        let value = match &self.value {
            None => return Ok(vec![format!("-{}", self.name)]),
            Some(v) => scalar_to_string(v).ok_or_else(|| {
                Error::Config(format!("flag '{}' has a non-scalar value", self.name))
            })?,
        };
        let value = match self.kind {
            Some(FlagKind::ResolvedPath) => fs::canonicalize(&value)
                .map(|p| p.display().to_string())
                .unwrap_or(value),
            _ => value,
        };
        Ok(vec![format!("-{}", self.name), value])
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One test case: a command line to run and the outputs to check.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub test: String,
    pub expected_stdout: Option<Content>,
    pub expected_stderr: Option<Content>,
    #[serde(default)]
    pub expected_return_code: i64,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub skip: bool,
    pub stdin: Option<Content>,
    pub stdout: Option<CaptureSpec>,
    pub stderr: Option<CaptureSpec>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub diff_mode: Option<DiffMode>,
    pub timeout: Option<u64>,
    #[serde(default)]
    pub shell: bool,
}

impl TestCase {
    /// Flags followed by positional arguments, ready to hand to the child
    /// process after the binary path.
    pub fn build_command(&self) -> Result<Vec<String>> {
        let mut command = Vec::new();
        for flag in &self.flags {
            command.extend(flag.build()?);
        }
        command.extend(self.arguments.iter().cloned());
        Ok(command)
    }

    fn validate(&self) -> Result<()> {
        for content in [&self.expected_stdout, &self.expected_stderr, &self.stdin]
            .iter()
            .filter_map(|c| c.as_ref())
        {
            content.validate()?;
        }
        Ok(())
    }
}

/// One suite file: a binary under test plus the cases exercising it.
/// Suite-level `env`, `cwd`, and `diff_mode` are defaults each case may
/// override.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSuite {
    pub name: String,
    pub description: Option<String>,
    pub binary_path: PathBuf,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub diff_mode: Option<DiffMode>,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn from_yaml_str(raw: &str) -> std::result::Result<Self, serde_yaml::Error> {
        let suite: TestSuite = serde_yaml::from_str(raw)?;
        Ok(suite)
    }

    fn validate(&self) -> Result<()> {
        for case in &self.tests {
            case.validate()?;
        }
        Ok(())
    }
}

fn is_suite_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Discover and parse every suite file under `dir`, skipping anything under
/// `exclude`. Finding no suites, or only skipped ones, is a configuration
/// error.
pub fn load_suites(dir: &Path, exclude: Option<&Path>) -> Result<Vec<TestSuite>> {
    debug!(dir = %dir.display(), "loading test suites");
    let mut suites = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| Error::Config(e.to_string()))?;
        if !entry.file_type().is_file() || !is_suite_file(entry.path()) {
            continue;
        }
        if let Some(exclude) = exclude {
            if entry.path().starts_with(exclude) {
                debug!(path = %entry.path().display(), "excluding suite file");
                continue;
            }
        }
        debug!(path = %entry.path().display(), "parsing suite file");
        let raw = fs::read_to_string(entry.path())?;
        let suite = TestSuite::from_yaml_str(&raw).map_err(|source| Error::Suite {
            path: entry.path().to_path_buf(),
            source,
        })?;
        suite.validate()?;
        suites.push(suite);
    }

    if suites.is_empty() {
        return Err(Error::Config(format!(
            "no test suites found in {}",
            dir.display()
        )));
    }
    if suites.iter().all(|s| s.skip) {
        return Err(Error::Config(format!(
            "no active test suites found in {}",
            dir.display()
        )));
    }
    Ok(suites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SUITE: &str = r#"
name: echo_suite
description: exercises echo
binary_path: /bin/echo
env:
  LANG: C
tests:
  - test: prints_hello
    arguments: ["hello"]
    expected_stdout:
      content: "hello\n"
      treat_as: text
  - test: json_output
    flags:
      - name: n
    expected_return_code: 3
    expected_stdout:
      content: '{"k": 1}'
      treat_as: json
    diff_mode: line
    skip: true
"#;

    #[test]
    fn test_parse_full_suite() {
        let suite = TestSuite::from_yaml_str(SUITE).unwrap();
        assert_eq!(suite.name, "echo_suite");
        assert_eq!(suite.binary_path, PathBuf::from("/bin/echo"));
        assert_eq!(suite.env.get("LANG").map(|s| s.as_str()), Some("C"));
        assert_eq!(suite.tests.len(), 2);

        let first = &suite.tests[0];
        assert_eq!(first.test, "prints_hello");
        assert_eq!(first.expected_return_code, 0);
        assert!(!first.skip);
        assert_eq!(first.build_command().unwrap(), vec!["hello".to_string()]);

        let second = &suite.tests[1];
        assert_eq!(second.expected_return_code, 3);
        assert_eq!(second.diff_mode, Some(DiffMode::Line));
        assert!(second.skip);
        assert_eq!(second.build_command().unwrap(), vec!["-n".to_string()]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(TestSuite::from_yaml_str(
            "name: x\nbinary_path: /bin/true\ntypo_field: 1\ntests: []"
        )
        .is_err());
    }

    #[test]
    fn test_flag_with_value() {
        let flag: Flag = serde_yaml::from_str("name: count\ntype: int\nvalue: 7").unwrap();
        assert_eq!(
            flag.build().unwrap(),
            vec!["-count".to_string(), "7".to_string()]
        );
    }

    #[test]
    fn test_flag_rejects_non_scalar_value() {
        let flag: Flag = serde_yaml::from_str("name: bad\ntype: str\nvalue: [1, 2]").unwrap();
        assert!(flag.build().is_err());
    }

    #[test]
    fn test_content_requires_exactly_one_source() {
        let neither = Content::default();
        assert!(neither.validate().is_err());

        let both = Content {
            content: Some("x".to_string()),
            file_path: Some(PathBuf::from("/tmp/x")),
            ..Content::default()
        };
        assert!(both.validate().is_err());

        let inline = Content {
            content: Some("x".to_string()),
            ..Content::default()
        };
        assert!(inline.validate().is_ok());
    }

    #[test]
    fn test_content_treated_as_json() {
        let content = Content {
            content: Some(r#"{"a": [1, 2]}"#.to_string()),
            treat_as: TreatAs::Json,
            ..Content::default()
        };
        match content.treated().unwrap() {
            Payload::Structured(v) => assert_eq!(v, json!({"a": [1, 2]})),
            other => panic!("expected structured payload, got {:?}", other),
        }
    }

    #[test]
    fn test_content_treated_as_yaml() {
        let content = Content {
            content: Some("a:\n  - 1\n  - two\n".to_string()),
            treat_as: TreatAs::Yaml,
            ..Content::default()
        };
        match content.treated().unwrap() {
            Payload::Structured(v) => assert_eq!(v, json!({"a": [1, "two"]})),
            other => panic!("expected structured payload, got {:?}", other),
        }
    }

    #[test]
    fn test_content_defaults_to_bytes() {
        let content = Content {
            content: Some("raw".to_string()),
            ..Content::default()
        };
        match content.treated().unwrap() {
            Payload::Bytes(b) => assert_eq!(b, b"raw"),
            other => panic!("expected bytes payload, got {:?}", other),
        }
    }

    #[test]
    fn test_capture_spec_treats_bytes_as_text() {
        let spec = CaptureSpec {
            treat_as: TreatAs::Text,
            ..CaptureSpec::default()
        };
        match spec.treat(b"out\n".to_vec()).unwrap() {
            Payload::Text(t) => assert_eq!(t, "out\n"),
            other => panic!("expected text payload, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_treated_json_is_config_error() {
        let content = Content {
            content: Some("not json".to_string()),
            treat_as: TreatAs::Json,
            ..Content::default()
        };
        match content.treated() {
            Err(Error::Config(_)) => (),
            other => panic!("expected a config error, got {:?}", other),
        }
    }
}
