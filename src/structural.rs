//! Structural diffing of nested values: mappings, sequences, and scalars are
//! walked recursively and every differing key or index yields one change
//! record with the path at which it was found.

use std::fmt;

use serde_json::Value;

/// One step into a nested value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a change inside a nested value. Displays as `a.b[2].c`; an
/// empty path (the root) displays as `<root>`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Path(pub Vec<PathSegment>);

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                PathSegment::Key(k) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", k)?;
                }
                PathSegment::Index(n) => write!(f, "[{}]", n)?,
            }
        }
        Ok(())
    }
}

/// One structured difference between two nested values.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    /// Present only in the actual value.
    Add { path: Path, value: Value },
    /// Present only in the expected value.
    Remove { path: Path, value: Value },
    /// Present in both with different contents.
    Change { path: Path, from: Value, to: Value },
}

impl Change {
    pub fn action(&self) -> &'static str {
        match self {
            Change::Add { .. } => "add",
            Change::Remove { .. } => "remove",
            Change::Change { .. } => "change",
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Change::Add { path, .. } | Change::Remove { path, .. } | Change::Change { path, .. } => {
                path
            }
        }
    }
}

/// Compare two nested values and report every differing path, in the
/// expected value's traversal order followed by the actual value's extra
/// keys. Equal values yield no records.
pub fn diff(expected: &Value, actual: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut path = Vec::new();
    diff_at(expected, actual, &mut path, &mut changes);
    changes
}

fn diff_at(
    expected: &Value,
    actual: &Value,
    path: &mut Vec<PathSegment>,
    changes: &mut Vec<Change>,
) {
    match (expected, actual) {
        (Value::Object(eo), Value::Object(ao)) => {
            for (key, ev) in eo {
                path.push(PathSegment::Key(key.clone()));
                match ao.get(key) {
                    Some(av) => diff_at(ev, av, path, changes),
                    None => changes.push(Change::Remove {
                        path: Path(path.clone()),
                        value: ev.clone(),
                    }),
                }
                path.pop();
            }
            for (key, av) in ao {
                if !eo.contains_key(key) {
                    path.push(PathSegment::Key(key.clone()));
                    changes.push(Change::Add {
                        path: Path(path.clone()),
                        value: av.clone(),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(ea), Value::Array(aa)) => {
            let shared = ea.len().min(aa.len());
            for i in 0..shared {
                path.push(PathSegment::Index(i));
                diff_at(&ea[i], &aa[i], path, changes);
                path.pop();
            }
            for (i, ev) in ea.iter().enumerate().skip(shared) {
                path.push(PathSegment::Index(i));
                changes.push(Change::Remove {
                    path: Path(path.clone()),
                    value: ev.clone(),
                });
                path.pop();
            }
            for (i, av) in aa.iter().enumerate().skip(shared) {
                path.push(PathSegment::Index(i));
                changes.push(Change::Add {
                    path: Path(path.clone()),
                    value: av.clone(),
                });
                path.pop();
            }
        }
        // Scalars, and scalar-vs-container or mapping-vs-sequence mismatches:
        // one change at this path, no recursion.
        _ => {
            if expected != actual {
                changes.push(Change::Change {
                    path: Path(path.clone()),
                    from: expected.clone(),
                    to: actual.clone(),
                });
            }
        }
    }
}
