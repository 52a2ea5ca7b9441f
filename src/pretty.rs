//! Renders an edit script as an annotated plain-text report: inserted lines
//! are prefixed with `+ `, deleted lines with `- `, and unchanged context is
//! indented. The fiddly part is newline handling: every edit is forced onto
//! its own line without ever producing a spurious blank marked line.

use crate::textdiff::{DiffKind, DiffOp};

/// Per-line prefixes used by [`render_with`].
#[derive(Clone, Debug)]
pub struct Markers {
    pub insert: &'static str,
    pub delete: &'static str,
    pub equal: &'static str,
}

impl Default for Markers {
    fn default() -> Self {
        Markers {
            insert: "+ ",
            delete: "- ",
            equal: "  ",
        }
    }
}

/// Render an edit script with the default `+ `/`- ` markers.
pub fn render(diffs: &[DiffOp]) -> String {
    render_with(diffs, &Markers::default())
}

pub fn render_with(diffs: &[DiffOp], markers: &Markers) -> String {
    let mut segments = Vec::with_capacity(diffs.len());
    let mut cut_next_newline = false;
    for (index, op) in diffs.iter().enumerate() {
        match op.kind {
            DiffKind::Insert => {
                segments.push(mark_edit(markers.insert, diffs, index, &mut cut_next_newline))
            }
            DiffKind::Delete => {
                segments.push(mark_edit(markers.delete, diffs, index, &mut cut_next_newline))
            }
            DiffKind::Equal => {
                let mut text = indent(&op.text, markers.equal, false);
                if cut_next_newline {
                    cut_next_newline = false;
                    // The insert before us already closed the line.
                    text = skip_first_char(&text);
                }
                segments.push(text);
            }
        }
    }
    segments.concat()
}

/// Prefix one insert/delete segment, keeping its markers line-aligned with
/// whatever follows.
fn mark_edit(sign: &str, diffs: &[DiffOp], index: usize, cut_next_newline: &mut bool) -> String {
    let op = &diffs[index];
    if op.text.is_empty() {
        return String::new();
    }
    let (next_kind, next_text) = match diffs.get(index + 1) {
        Some(next) => (next.kind, next.text.as_str()),
        None => (DiffKind::Equal, ""),
    };

    let mut marked = indent(&op.text, sign, true);
    if index > 0 {
        // Force the change onto a fresh line for highlighting.
        marked.insert(0, '\n');
    }

    if marked.ends_with('\n') {
        if op.kind == DiffKind::Insert && !next_text.is_empty() && next_text.starts_with('\n') {
            // The following segment opens with a line break too; drop one of
            // the two rather than emitting a blank marked line.
            *cut_next_newline = true;
            if op.text.chars().count() > 1 {
                marked.push_str(sign);
                marked.push('\n');
            }
        }
    } else if next_kind == DiffKind::Equal && !next_text.is_empty() && !next_text.starts_with('\n')
    {
        marked.push('\n');
    }
    marked
}

/// Prefix every line of `text` with `sign`. Unless `all` is set, lines with
/// no printable content are left unmarked.
fn indent(text: &str, sign: &str, all: bool) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if all || !line.trim().is_empty() {
                format!("{}{}", sign, line)
            } else {
                line.to_string()
            }
        })
        .collect()
}

fn skip_first_char(text: &str) -> String {
    let mut chars = text.chars();
    chars.next();
    chars.as_str().to_string()
}
