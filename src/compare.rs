//! The comparison dispatcher: given an expected and an actual payload it
//! picks the right engine (structural walk for two nested values, text diff
//! for everything else), renders the report, and returns it as a mismatch
//! error for the caller's failure channel.

use serde_json::Value;

use crate::config::Encoding;
use crate::error::{Error, Result};
use crate::pretty;
use crate::structural::{self, Change};
use crate::styles::StyleMap;
use crate::textdiff::{compute_diff, DiffMode};

/// A value on one side of a comparison.
#[derive(Clone, Debug)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Structured(Value),
}

impl Payload {
    /// The raw bytes of this payload, for feeding a child process.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(s) => s.into_bytes(),
            Payload::Bytes(b) => b,
            Payload::Structured(v) => v.to_string().into_bytes(),
        }
    }
}

/// Comparison context: diff granularity, byte decoding, and the styles used
/// when rendering a report. Holds no mutable state, so one comparator may be
/// shared freely across threads.
pub struct Comparator<'a> {
    mode: DiffMode,
    encoding: Encoding,
    styles: &'a StyleMap,
}

impl<'a> Comparator<'a> {
    pub fn new(mode: DiffMode, encoding: Encoding, styles: &'a StyleMap) -> Self {
        Comparator {
            mode,
            encoding,
            styles,
        }
    }

    /// Compare the two payloads, returning `Ok(())` when they agree and
    /// `Err(Error::Mismatch)` with a rendered report when they do not. An
    /// optional caller message heads the report.
    ///
    /// Two structured payloads are walked with [`structural::diff`]; any
    /// other pairing is decoded to text and diffed at this comparator's
    /// granularity. Structured values paired with text are printed as
    /// indented JSON first, so the user still gets a readable diff.
    pub fn compare(&self, expected: &Payload, actual: &Payload, msg: Option<&str>) -> Result<()> {
        if let (Payload::Structured(ev), Payload::Structured(av)) = (expected, actual) {
            if ev == av {
                return Ok(());
            }
            return Err(Error::Mismatch(self.structural_report(ev, av, msg)?));
        }

        let expected_text = self.as_text(expected)?;
        let actual_text = self.as_text(actual)?;
        if expected_text == actual_text {
            return Ok(());
        }

        let diffs = compute_diff(&expected_text, &actual_text, self.mode);
        let header = match msg {
            Some(m) => format!(
                "{} {}{}\n",
                self.styles.color("magenta")?,
                m,
                self.styles.color("reset")?
            ),
            None => "The strings do not match...\n".to_string(),
        };
        Err(Error::Mismatch(format!(
            "{}{}",
            header,
            pretty::render(&diffs)
        )))
    }

    fn structural_report(&self, expected: &Value, actual: &Value, msg: Option<&str>) -> Result<String> {
        let changes = structural::diff(expected, actual);
        let mut paragraphs = Vec::with_capacity(changes.len());
        for change in &changes {
            paragraphs.push(self.render_change(change, "\t")?);
        }
        let mut report = String::new();
        if let Some(m) = msg {
            report.push_str(&format!(
                "{} {}{}\n",
                self.styles.color("magenta")?,
                m,
                self.styles.color("reset")?
            ));
        }
        report.push_str(&paragraphs.join("\n"));
        Ok(report)
    }

    /// One colorized paragraph per change record.
    fn render_change(&self, change: &Change, prepend: &str) -> Result<String> {
        let reset = self.styles.color("reset")?;
        let yellow = self.styles.color("yellow")?;
        let action = change.action();
        let mut text = format!(
            "{}{} => {}{}: ",
            prepend,
            self.styles.action(action)?,
            action.to_uppercase(),
            reset
        );
        match change {
            Change::Change { path, from, to } => {
                text.push_str(&format!(
                    "at key {} values are different\n{}{}EXPECTED{}: {}\n{}{}  ACTUAL{}: {}",
                    path, prepend, yellow, reset, from, prepend, yellow, reset, to
                ));
            }
            Change::Add { path, value } => {
                text.push_str(&format!(
                    "extra values under {} key on the right: {}",
                    path, value
                ));
            }
            Change::Remove { path, value } => {
                text.push_str(&format!(
                    "missing values under {} key on the right: {}",
                    path, value
                ));
            }
        }
        Ok(text)
    }

    fn as_text(&self, payload: &Payload) -> Result<String> {
        match payload {
            Payload::Text(s) => Ok(s.clone()),
            Payload::Bytes(b) => self.encoding.decode(b.clone()),
            Payload::Structured(v) => {
                Ok(serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()))
            }
        }
    }
}
