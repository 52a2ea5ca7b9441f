//! The colour/action style map: symbolic names mapped to terminal escape
//! sequences, loaded once at process start and shared read-only by every
//! diff render afterwards.
//!
//! The on-disk format is a TOML file with two tables:
//!
//! ```text
//! [colors]
//! reset = "\\u001b[0m"
//! yellow = "\\u001b[33m"
//!
//! [action_colors]
//! add = "\\u001b[92m"
//! remove = "\\u001b[91m"
//! change = "\\u001b[93m"
//! ```
//!
//! Values may spell the escape character either as the TOML escape
//! `\u001b` or as the literal two-character text `\\u001b`, which is
//! unescaped on load.

use std::collections::HashMap;
use std::fs::read_to_string;
use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct StylesFile {
    #[serde(default)]
    colors: HashMap<String, String>,
    #[serde(default)]
    action_colors: HashMap<String, String>,
}

/// Mapping from symbolic colour and action names to terminal escape codes.
/// A missing key is a configuration error, not a diff-engine error.
#[derive(Clone, Debug)]
pub struct StyleMap {
    colors: HashMap<String, String>,
    actions: HashMap<String, String>,
}

impl StyleMap {
    /// Built-in ANSI defaults, used when no style file is configured.
    pub fn default_ansi() -> Self {
        let mut colors = HashMap::new();
        colors.insert("reset".to_string(), "\u{1b}[0m".to_string());
        colors.insert("red".to_string(), "\u{1b}[31m".to_string());
        colors.insert("green".to_string(), "\u{1b}[32m".to_string());
        colors.insert("yellow".to_string(), "\u{1b}[33m".to_string());
        colors.insert("magenta".to_string(), "\u{1b}[35m".to_string());
        let mut actions = HashMap::new();
        actions.insert("add".to_string(), "\u{1b}[92m".to_string());
        actions.insert("remove".to_string(), "\u{1b}[91m".to_string());
        actions.insert("change".to_string(), "\u{1b}[93m".to_string());
        StyleMap { colors, actions }
    }

    /// A map whose every lookup yields the empty string: reports come out as
    /// plain text. Useful under test and for non-terminal output.
    pub fn plain() -> Self {
        StyleMap {
            colors: HashMap::new(),
            actions: HashMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml_str(&read_to_string(path)?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: StylesFile = toml::from_str(raw)?;
        Ok(StyleMap {
            colors: unescape_map(file.colors),
            actions: unescape_map(file.action_colors),
        })
    }

    fn is_plain(&self) -> bool {
        self.colors.is_empty() && self.actions.is_empty()
    }

    /// The escape sequence for a colour name.
    pub fn color(&self, name: &str) -> Result<&str> {
        if self.is_plain() {
            return Ok("");
        }
        self.colors
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::Config(format!("no colour named '{}' in the style map", name)))
    }

    /// The escape sequence used to announce an action (`add`, `remove`,
    /// `change`).
    pub fn action(&self, name: &str) -> Result<&str> {
        if self.is_plain() {
            return Ok("");
        }
        self.actions
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| Error::Config(format!("no action named '{}' in the style map", name)))
    }
}

fn unescape_map(map: HashMap<String, String>) -> HashMap<String, String> {
    map.into_iter()
        .map(|(k, v)| (k, v.replace("\\u001b[", "\u{1b}[")))
        .collect()
}

static STYLES: OnceLock<StyleMap> = OnceLock::new();

/// Install the process-wide style map. Later calls are ignored; the map is
/// never mutated after installation, so concurrent readers are safe.
pub fn install(map: StyleMap) {
    let _ = STYLES.set(map);
}

/// The process-wide style map, falling back to the ANSI defaults if nothing
/// was installed.
pub fn global() -> &'static StyleMap {
    STYLES.get_or_init(StyleMap::default_ansi)
}
