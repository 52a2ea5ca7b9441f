//! The text diff core: a Myers edit-script computation over characters, plus
//! the token table that compresses lines/words to single characters so that
//! large texts can be diffed at line or word granularity for the cost of a
//! character diff over the distinct units.

use std::collections::HashMap;

use serde::Deserialize;

/// Granularity at which two texts are compared.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DiffMode {
    Character,
    Word,
    Line,
}

/// What one segment of an edit script does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiffKind {
    Delete,
    Insert,
    Equal,
}

/// One insert/delete/equal segment of an edit script. Concatenating the
/// `Insert`+`Equal` texts reconstructs the actual text; `Delete`+`Equal`
/// reconstructs the expected text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiffOp {
    pub kind: DiffKind,
    pub text: String,
}

impl DiffOp {
    pub fn delete<S: Into<String>>(text: S) -> Self {
        DiffOp {
            kind: DiffKind::Delete,
            text: text.into(),
        }
    }

    pub fn insert<S: Into<String>>(text: S) -> Self {
        DiffOp {
            kind: DiffKind::Insert,
            text: text.into(),
        }
    }

    pub fn equal<S: Into<String>>(text: S) -> Self {
        DiffOp {
            kind: DiffKind::Equal,
            text: text.into(),
        }
    }
}

/// Compute the edit script turning `expected` into `actual` at the given
/// granularity.
///
/// Character mode diffs the raw characters. Word and line mode first encode
/// each distinct unit as a single character through a [`TokenTable`], diff
/// the coded strings, expand the result back to the original units, and run
/// a semantic cleanup pass so the output is not visually fragmented.
pub fn compute_diff(expected: &str, actual: &str, mode: DiffMode) -> Vec<DiffOp> {
    match mode {
        DiffMode::Character => diff_main(expected, actual),
        DiffMode::Word | DiffMode::Line => {
            let mut table = TokenTable::new();
            let coded_expected = table.encode(expected, mode);
            let coded_actual = table.encode(actual, mode);
            let mut diffs = diff_main(&coded_expected, &coded_actual);
            table.expand(&mut diffs);
            cleanup_semantic(&mut diffs);
            diffs
        }
    }
}

/// Compute a character-level edit script between two strings.
pub fn diff_main(expected: &str, actual: &str) -> Vec<DiffOp> {
    if expected == actual {
        if expected.is_empty() {
            return Vec::new();
        }
        return vec![DiffOp::equal(expected)];
    }
    let a = expected.chars().collect::<Vec<_>>();
    let b = actual.chars().collect::<Vec<_>>();
    diff_chars(&a, &b)
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn diff_chars(a: &[char], b: &[char]) -> Vec<DiffOp> {
    if a == b {
        if a.is_empty() {
            return Vec::new();
        }
        return vec![DiffOp::equal(collect(a))];
    }

    let prefix = common_prefix(a, b);
    let suffix = common_suffix(&a[prefix..], &b[prefix..]);
    let mut diffs = diff_compute(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    );
    if prefix > 0 {
        diffs.insert(0, DiffOp::equal(collect(&a[..prefix])));
    }
    if suffix > 0 {
        diffs.push(DiffOp::equal(collect(&a[a.len() - suffix..])));
    }
    cleanup_merge(&mut diffs);
    diffs
}

/// Find the differences of two texts which share no common prefix or suffix.
fn diff_compute(a: &[char], b: &[char]) -> Vec<DiffOp> {
    if a.is_empty() {
        return vec![DiffOp::insert(collect(b))];
    }
    if b.is_empty() {
        return vec![DiffOp::delete(collect(a))];
    }

    let (long, short, a_is_long) = if a.len() > b.len() {
        (a, b, true)
    } else {
        (b, a, false)
    };
    if let Some(i) = find_sub(long, short) {
        // The shorter text sits inside the longer one.
        let kind = if a_is_long {
            DiffKind::Delete
        } else {
            DiffKind::Insert
        };
        return vec![
            DiffOp {
                kind,
                text: collect(&long[..i]),
            },
            DiffOp::equal(collect(short)),
            DiffOp {
                kind,
                text: collect(&long[i + short.len()..]),
            },
        ];
    }
    if short.len() == 1 {
        // A single character that is not inside the other text cannot be part
        // of an equality.
        return vec![DiffOp::delete(collect(a)), DiffOp::insert(collect(b))];
    }

    bisect(a, b)
}

fn find_sub(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Myers bisect: walk the forward and reverse edit paths simultaneously until
/// they overlap, then split the problem in two at the overlap point.
fn bisect(a: &[char], b: &[char]) -> Vec<DiffOp> {
    let a_len = a.len() as isize;
    let b_len = b.len() as isize;
    let max_d = (a_len + b_len + 1) / 2;
    let v_offset = max_d;
    let v_length = 2 * max_d;
    let mut v1 = vec![-1isize; v_length as usize];
    let mut v2 = vec![-1isize; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;
    let delta = a_len - b_len;
    // If the total number of characters is odd, the front path will collide
    // with the reverse path; if even, only the reverse path can overlap.
    let front = delta % 2 != 0;
    let mut k1start = 0isize;
    let mut k1end = 0isize;
    let mut k2start = 0isize;
    let mut k2end = 0isize;
    for d in 0..max_d {
        // Forward path.
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < a_len && y1 < b_len && a[x1 as usize] == b[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > a_len {
                // Ran off the right of the graph.
                k1end += 2;
            } else if y1 > b_len {
                // Ran off the bottom of the graph.
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    let x2 = a_len - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k1 += 2;
        }
        // Reverse path.
        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < a_len
                && y2 < b_len
                && a[(a_len - x2 - 1) as usize] == b[(b_len - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > a_len {
                k2end += 2;
            } else if y2 > b_len {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    let x2 = a_len - x2;
                    if x1 >= x2 {
                        return bisect_split(a, b, x1 as usize, y1 as usize);
                    }
                }
            }
            k2 += 2;
        }
    }
    // No commonality at all.
    vec![DiffOp::delete(collect(a)), DiffOp::insert(collect(b))]
}

fn bisect_split(a: &[char], b: &[char], x: usize, y: usize) -> Vec<DiffOp> {
    let mut diffs = diff_chars(&a[..x], &b[..y]);
    diffs.extend(diff_chars(&a[x..], &b[y..]));
    diffs
}

fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Byte length of the longest common character prefix of two strings.
fn common_prefix_bytes(a: &str, b: &str) -> usize {
    let mut n = 0;
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca != cb {
            break;
        }
        n += ca.len_utf8();
    }
    n
}

/// Byte length of the longest common character suffix of two strings.
fn common_suffix_bytes(a: &str, b: &str) -> usize {
    let mut n = 0;
    for (ca, cb) in a.chars().rev().zip(b.chars().rev()) {
        if ca != cb {
            break;
        }
        n += ca.len_utf8();
    }
    n
}

/// Byte length of the longest suffix of `a` that is also a prefix of `b`.
fn common_overlap(a: &str, b: &str) -> usize {
    for (i, _) in a.char_indices() {
        let suffix = &a[i..];
        if suffix.len() <= b.len() && b.starts_with(suffix) {
            return suffix.len();
        }
    }
    0
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

/// Reorder and merge like edit sections, and factor out commonalities shared
/// between an edit run and its neighbouring equalities.
pub fn cleanup_merge(diffs: &mut Vec<DiffOp>) {
    if diffs.is_empty() {
        return;
    }
    diffs.push(DiffOp::equal(""));
    let mut pointer = 0usize;
    let mut count_delete = 0usize;
    let mut count_insert = 0usize;
    let mut text_delete = String::new();
    let mut text_insert = String::new();
    while pointer < diffs.len() {
        match diffs[pointer].kind {
            DiffKind::Insert => {
                count_insert += 1;
                text_insert.push_str(&diffs[pointer].text);
                pointer += 1;
            }
            DiffKind::Delete => {
                count_delete += 1;
                text_delete.push_str(&diffs[pointer].text);
                pointer += 1;
            }
            DiffKind::Equal => {
                if count_delete + count_insert > 1 {
                    if count_delete != 0 && count_insert != 0 {
                        let n = common_prefix_bytes(&text_insert, &text_delete);
                        if n != 0 {
                            let prefix = text_insert[..n].to_string();
                            let x = pointer as isize
                                - count_delete as isize
                                - count_insert as isize
                                - 1;
                            if x >= 0 && diffs[x as usize].kind == DiffKind::Equal {
                                diffs[x as usize].text.push_str(&prefix);
                            } else {
                                diffs.insert(0, DiffOp::equal(prefix));
                                pointer += 1;
                            }
                            text_insert.drain(..n);
                            text_delete.drain(..n);
                        }
                        let n = common_suffix_bytes(&text_insert, &text_delete);
                        if n != 0 {
                            let tail = text_insert[text_insert.len() - n..].to_string();
                            let old = std::mem::take(&mut diffs[pointer].text);
                            diffs[pointer].text = format!("{}{}", tail, old);
                            text_insert.truncate(text_insert.len() - n);
                            text_delete.truncate(text_delete.len() - n);
                        }
                    }
                    // Replace the mixed run with one delete and one insert.
                    let start = pointer - count_delete - count_insert;
                    let mut replacement = Vec::new();
                    if !text_delete.is_empty() {
                        replacement.push(DiffOp::delete(text_delete.clone()));
                    }
                    if !text_insert.is_empty() {
                        replacement.push(DiffOp::insert(text_insert.clone()));
                    }
                    let added = replacement.len();
                    diffs.splice(start..pointer, replacement);
                    pointer = start + added + 1;
                } else if pointer != 0 && diffs[pointer - 1].kind == DiffKind::Equal {
                    let text = diffs.remove(pointer).text;
                    diffs[pointer - 1].text.push_str(&text);
                } else {
                    pointer += 1;
                }
                count_insert = 0;
                count_delete = 0;
                text_delete.clear();
                text_insert.clear();
            }
        }
    }
    if diffs.last().map(|d| d.text.is_empty()) == Some(true) {
        diffs.pop();
    }

    // Single edits surrounded by equalities may be shiftable to eliminate an
    // equality, e.g. A<ins>BA</ins>C becomes <ins>AB</ins>AC.
    let mut changes = false;
    let mut pointer = 1usize;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].kind == DiffKind::Equal && diffs[pointer + 1].kind == DiffKind::Equal
        {
            let prev = diffs[pointer - 1].text.clone();
            let next = diffs[pointer + 1].text.clone();
            if !prev.is_empty() && diffs[pointer].text.ends_with(&prev) {
                let cut = diffs[pointer].text.len() - prev.len();
                let body = diffs[pointer].text[..cut].to_string();
                diffs[pointer].text = format!("{}{}", prev, body);
                diffs[pointer + 1].text = format!("{}{}", prev, next);
                diffs.remove(pointer - 1);
                changes = true;
            } else if !next.is_empty() && diffs[pointer].text.starts_with(&next) {
                diffs[pointer - 1].text.push_str(&next);
                let rest = diffs[pointer].text[next.len()..].to_string();
                diffs[pointer].text = format!("{}{}", rest, next);
                diffs.remove(pointer + 1);
                changes = true;
            }
        }
        pointer += 1;
    }
    if changes {
        cleanup_merge(diffs);
    }
}

/// Reduce the number of edits by eliminating semantically trivial
/// equalities, aligning edit boundaries to lexical boundaries, and factoring
/// out overlaps between adjacent deletions and insertions.
pub fn cleanup_semantic(diffs: &mut Vec<DiffOp>) {
    if diffs.is_empty() {
        return;
    }
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    let mut pointer: isize = 0;
    // Number of characters changed before and after the candidate equality.
    let mut len_insertions1 = 0usize;
    let mut len_deletions1 = 0usize;
    let mut len_insertions2 = 0usize;
    let mut len_deletions2 = 0usize;
    while (pointer as usize) < diffs.len() {
        let p = pointer as usize;
        if diffs[p].kind == DiffKind::Equal {
            equalities.push(p);
            len_insertions1 = len_insertions2;
            len_deletions1 = len_deletions2;
            len_insertions2 = 0;
            len_deletions2 = 0;
            last_equality = Some(diffs[p].text.clone());
        } else {
            let n = char_count(&diffs[p].text);
            if diffs[p].kind == DiffKind::Insert {
                len_insertions2 += n;
            } else {
                len_deletions2 += n;
            }
            let eliminate = match &last_equality {
                Some(eq) if !eq.is_empty() => {
                    let eq_len = char_count(eq);
                    eq_len <= len_insertions1.max(len_deletions1)
                        && eq_len <= len_insertions2.max(len_deletions2)
                }
                _ => false,
            };
            if eliminate {
                let idx = *equalities.last().unwrap();
                let eq = last_equality.take().unwrap();
                diffs.insert(idx, DiffOp::delete(eq));
                diffs[idx + 1].kind = DiffKind::Insert;
                equalities.pop();
                equalities.pop();
                pointer = equalities.last().map(|&i| i as isize).unwrap_or(-1);
                len_insertions1 = 0;
                len_deletions1 = 0;
                len_insertions2 = 0;
                len_deletions2 = 0;
                changes = true;
            }
        }
        pointer += 1;
    }
    if changes {
        cleanup_merge(diffs);
    }
    cleanup_semantic_lossless(diffs);

    // A deletion directly followed by an insertion may share a boundary:
    // <del>abcxxx</del><ins>xxxdef</ins> becomes <del>abc</del>xxx<ins>def</ins>.
    let mut pointer = 1usize;
    while pointer < diffs.len() {
        if diffs[pointer - 1].kind == DiffKind::Delete && diffs[pointer].kind == DiffKind::Insert {
            let deletion = diffs[pointer - 1].text.clone();
            let insertion = diffs[pointer].text.clone();
            let overlap1 = common_overlap(&deletion, &insertion);
            let overlap2 = common_overlap(&insertion, &deletion);
            let overlap1_chars = char_count(&insertion[..overlap1]);
            let overlap2_chars = char_count(&deletion[..overlap2]);
            let del_chars = char_count(&deletion);
            let ins_chars = char_count(&insertion);
            if overlap1_chars >= overlap2_chars {
                if 2 * overlap1_chars >= del_chars || 2 * overlap1_chars >= ins_chars {
                    diffs.insert(pointer, DiffOp::equal(insertion[..overlap1].to_string()));
                    diffs[pointer - 1].text = deletion[..deletion.len() - overlap1].to_string();
                    diffs[pointer + 1].text = insertion[overlap1..].to_string();
                    pointer += 1;
                }
            } else if 2 * overlap2_chars >= del_chars || 2 * overlap2_chars >= ins_chars {
                // Reverse overlap: the end of the insertion starts the deletion.
                diffs.insert(pointer, DiffOp::equal(deletion[..overlap2].to_string()));
                diffs[pointer - 1] =
                    DiffOp::insert(insertion[..insertion.len() - overlap2].to_string());
                diffs[pointer + 1] = DiffOp::delete(deletion[overlap2..].to_string());
                pointer += 1;
            }
            pointer += 1;
        }
        pointer += 1;
    }
}

/// Shift single edits sideways so they line up with word, line, or blank-line
/// boundaries where possible.
fn cleanup_semantic_lossless(diffs: &mut Vec<DiffOp>) {
    let mut pointer: isize = 1;
    while diffs.len() >= 2 && (pointer as usize) < diffs.len() - 1 {
        let p = pointer as usize;
        if diffs[p - 1].kind == DiffKind::Equal && diffs[p + 1].kind == DiffKind::Equal {
            let mut equality1 = diffs[p - 1].text.clone();
            let mut edit = diffs[p].text.clone();
            let mut equality2 = diffs[p + 1].text.clone();

            // Shift the edit as far left as possible.
            let offset = common_suffix_bytes(&equality1, &edit);
            if offset > 0 {
                let common = edit[edit.len() - offset..].to_string();
                equality1.truncate(equality1.len() - offset);
                let body = edit[..edit.len() - offset].to_string();
                edit = format!("{}{}", common, body);
                equality2 = format!("{}{}", common, equality2);
            }

            // Step character by character right, looking for the best fit.
            let mut best_equality1 = equality1.clone();
            let mut best_edit = edit.clone();
            let mut best_equality2 = equality2.clone();
            let mut best_score =
                semantic_score(&equality1, &edit) + semantic_score(&edit, &equality2);
            while let (Some(e), Some(q)) = (edit.chars().next(), equality2.chars().next()) {
                if e != q {
                    break;
                }
                equality1.push(e);
                let rest = edit[e.len_utf8()..].to_string();
                edit = format!("{}{}", rest, e);
                equality2 = equality2[q.len_utf8()..].to_string();
                let score = semantic_score(&equality1, &edit) + semantic_score(&edit, &equality2);
                // The >= favours shifting right over staying put.
                if score >= best_score {
                    best_score = score;
                    best_equality1 = equality1.clone();
                    best_edit = edit.clone();
                    best_equality2 = equality2.clone();
                }
            }

            if diffs[p - 1].text != best_equality1 {
                let mut p = pointer;
                if !best_equality1.is_empty() {
                    diffs[(p - 1) as usize].text = best_equality1;
                } else {
                    diffs.remove((p - 1) as usize);
                    p -= 1;
                }
                diffs[p as usize].text = best_edit;
                if !best_equality2.is_empty() {
                    diffs[(p + 1) as usize].text = best_equality2;
                } else {
                    diffs.remove((p + 1) as usize);
                    p -= 1;
                }
                pointer = p;
            }
        }
        pointer += 1;
    }
}

/// Score how semantically natural a split between `one` and `two` is: 6 is a
/// text edge, 5 a blank line, 4 a line break, 3 the end of a sentence, 2
/// whitespace, 1 punctuation, 0 the middle of a word.
fn semantic_score(one: &str, two: &str) -> i32 {
    let (c1, c2) = match (one.chars().last(), two.chars().next()) {
        (Some(c1), Some(c2)) => (c1, c2),
        // Edges are the best.
        _ => return 6,
    };
    let non_alnum1 = !c1.is_alphanumeric();
    let non_alnum2 = !c2.is_alphanumeric();
    let whitespace1 = non_alnum1 && c1.is_whitespace();
    let whitespace2 = non_alnum2 && c2.is_whitespace();
    let line_break1 = whitespace1 && (c1 == '\n' || c1 == '\r');
    let line_break2 = whitespace2 && (c2 == '\n' || c2 == '\r');
    let blank_line1 = line_break1 && (one.ends_with("\n\n") || one.ends_with("\n\r\n"));
    let blank_line2 = line_break2
        && (two.starts_with("\n\n")
            || two.starts_with("\n\r\n")
            || two.starts_with("\r\n\n")
            || two.starts_with("\r\n\r\n"));

    if blank_line1 || blank_line2 {
        5
    } else if line_break1 || line_break2 {
        4
    } else if non_alnum1 && !whitespace1 && whitespace2 {
        3
    } else if whitespace1 || whitespace2 {
        2
    } else if non_alnum1 || non_alnum2 {
        1
    } else {
        0
    }
}

/// Total number of synthetic codes available to one diff call. Codes are
/// Unicode scalar values, so the surrogate block is unusable; the last code
/// is reserved for the overflow unit.
const TOKEN_CAPACITY: usize = 0x0011_0000 - 0x0800 - 1;
/// The first text may not claim the whole code space; two thirds leaves the
/// second text room for its own units.
const TOKEN_CAPACITY_FIRST: usize = TOKEN_CAPACITY * 2 / 3;

/// Per-call bidirectional mapping between line/word units and synthetic
/// single-character codes.
///
/// Index 0 is a sentinel so that no unit ever encodes to NUL.
pub struct TokenTable {
    units: Vec<String>,
    codes: HashMap<String, char>,
    limit: usize,
    capacity: usize,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::with_limits(TOKEN_CAPACITY_FIRST, TOKEN_CAPACITY)
    }

    /// A table with a smaller code space. Exhaustion behaviour is
    /// independent of where the limits sit, so tests use tiny ones.
    fn with_limits(first: usize, capacity: usize) -> Self {
        TokenTable {
            units: vec![String::new()],
            codes: HashMap::new(),
            limit: first,
            capacity,
        }
    }

    fn code_for(index: usize) -> char {
        let u = index as u32;
        let u = if u < 0xD800 { u } else { u + 0x800 };
        // Indices are capped at TOKEN_CAPACITY, which skips the surrogates.
        char::from_u32(u).unwrap()
    }

    fn index_for(code: char) -> usize {
        let u = code as u32;
        let u = if u < 0xD800 { u } else { u - 0x800 };
        u as usize
    }

    /// Split `text` into units and reduce it to a string of codes, one
    /// character per unit. First-seen units get the lowest available code.
    /// When the code space runs out, the rest of the text becomes a single
    /// overflow unit rather than an error.
    pub fn encode(&mut self, text: &str, mode: DiffMode) -> String {
        let chars = text.chars().collect::<Vec<_>>();
        let mut coded = String::new();
        let mut start = 0usize;
        let mut end: isize = -1;
        while end < chars.len() as isize - 1 {
            end = match next_break(&chars, start, mode) {
                Some(p) => p as isize,
                None => chars.len() as isize - 1,
            };
            let unit_end = ((end + 1) as usize).min(chars.len());
            let mut unit = chars[start..unit_end].iter().collect::<String>();
            match self.codes.get(&unit) {
                Some(&code) => coded.push(code),
                None => {
                    if self.units.len() == self.limit {
                        unit = chars[start..].iter().collect();
                        end = chars.len() as isize;
                    }
                    let code = Self::code_for(self.units.len());
                    self.codes.insert(unit.clone(), code);
                    self.units.push(unit);
                    coded.push(code);
                }
            }
            start = (end + 1) as usize;
        }
        // The second text may use the remainder of the code space.
        self.limit = self.capacity;
        coded
    }

    /// The unit a code stands for.
    pub fn decode(&self, code: char) -> &str {
        &self.units[Self::index_for(code)]
    }

    /// Rewrite a coded edit script back to the original units.
    pub fn expand(&self, diffs: &mut [DiffOp]) {
        for op in diffs.iter_mut() {
            op.text = op.text.chars().map(|c| self.decode(c)).collect();
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Position of the next unit break at or after `from`.
///
/// Line breaks sit on the `\n` itself (the unit includes it); word breaks are
/// zero-width boundaries between word and non-word characters, and the unit
/// extends one character past the boundary.
fn next_break(chars: &[char], from: usize, mode: DiffMode) -> Option<usize> {
    match mode {
        DiffMode::Line => (from..chars.len()).find(|&p| chars[p] == '\n'),
        DiffMode::Word => (from..=chars.len()).find(|&p| {
            let before = p.checked_sub(1).map_or(false, |q| is_word_char(chars[q]));
            let at = chars.get(p).map_or(false, |&c| is_word_char(c));
            before != at
        }),
        DiffMode::Character => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn del(s: &str) -> DiffOp {
        DiffOp::delete(s)
    }
    fn ins(s: &str) -> DiffOp {
        DiffOp::insert(s)
    }
    fn eq(s: &str) -> DiffOp {
        DiffOp::equal(s)
    }

    #[test]
    fn test_diff_main_trivial() {
        assert_eq!(diff_main("", ""), vec![]);
        assert_eq!(diff_main("abc", "abc"), vec![eq("abc")]);
        assert_eq!(diff_main("", "x"), vec![ins("x")]);
        assert_eq!(diff_main("x", ""), vec![del("x")]);
    }

    #[test]
    fn test_diff_main_simple_insert_delete() {
        assert_eq!(
            diff_main("abc", "ab123c"),
            vec![eq("ab"), ins("123"), eq("c")]
        );
        assert_eq!(
            diff_main("a123bc", "abc"),
            vec![eq("a"), del("123"), eq("bc")]
        );
    }

    #[test]
    fn test_diff_main_bisect() {
        assert_eq!(
            diff_main("cat", "map"),
            vec![del("c"), ins("m"), eq("a"), del("t"), ins("p")]
        );
    }

    #[test]
    fn test_diff_main_overlaps() {
        assert_eq!(
            diff_main("1ayb2", "abxab"),
            vec![del("1"), eq("a"), del("y"), eq("b"), del("2"), ins("xab")]
        );
        assert_eq!(
            diff_main("abcy", "xaxcxabc"),
            vec![ins("xaxcx"), eq("abc"), del("y")]
        );
    }

    #[test]
    fn test_diff_main_sentences() {
        assert_eq!(
            diff_main("Apples are a fruit.", "Bananas are also fruit."),
            vec![
                del("Apple"),
                ins("Banana"),
                eq("s are a"),
                ins("lso"),
                eq(" fruit.")
            ]
        );
    }

    #[test]
    fn test_diff_main_unicode() {
        assert_eq!(
            diff_main("ax\t", "\u{0680}x\0"),
            vec![del("a"), ins("\u{0680}"), eq("x"), del("\t"), ins("\0")]
        );
    }

    #[test]
    fn test_round_trip_all_modes() {
        let expected = "the quick brown fox\njumps over\nthe lazy dog";
        let actual = "the quick red fox\nleaps over\nthe lazy dog\n";
        for &mode in &[DiffMode::Character, DiffMode::Word, DiffMode::Line] {
            let diffs = compute_diff(expected, actual, mode);
            let mut from_delete = String::new();
            let mut from_insert = String::new();
            for op in &diffs {
                match op.kind {
                    DiffKind::Delete => from_delete.push_str(&op.text),
                    DiffKind::Insert => from_insert.push_str(&op.text),
                    DiffKind::Equal => {
                        from_delete.push_str(&op.text);
                        from_insert.push_str(&op.text);
                    }
                }
            }
            assert_eq!(from_delete, expected);
            assert_eq!(from_insert, actual);
        }
    }

    #[test]
    fn test_identical_inputs_yield_only_equal() {
        let text = "same\ntext\n";
        for &mode in &[DiffMode::Character, DiffMode::Word, DiffMode::Line] {
            let diffs = compute_diff(text, text, mode);
            assert!(diffs.iter().all(|op| op.kind == DiffKind::Equal));
        }
        assert_eq!(compute_diff("", "", DiffMode::Line), vec![]);
    }

    #[test]
    fn test_cleanup_merge() {
        let mut diffs = vec![];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![]);

        let mut diffs = vec![eq("a"), del("b"), ins("c")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("a"), del("b"), ins("c")]);

        let mut diffs = vec![eq("a"), eq("b"), eq("c")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("abc")]);

        let mut diffs = vec![del("a"), ins("b"), del("c"), ins("d"), eq("e"), eq("f")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![del("ac"), ins("bd"), eq("ef")]);

        let mut diffs = vec![del("a"), ins("abc"), del("dc")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("a"), del("d"), ins("b"), eq("c")]);

        let mut diffs = vec![eq("x"), del("a"), ins("abc"), del("dc"), eq("y")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("xa"), del("d"), ins("b"), eq("cy")]);
    }

    #[test]
    fn test_cleanup_merge_slides() {
        let mut diffs = vec![eq("a"), ins("ba"), eq("c")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![ins("ab"), eq("ac")]);

        let mut diffs = vec![eq("c"), ins("ab"), eq("a")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("ca"), ins("ba")]);

        let mut diffs = vec![eq("a"), del("b"), eq("c"), del("ac"), eq("x")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![del("abc"), eq("acx")]);

        let mut diffs = vec![eq("x"), del("ca"), eq("c"), del("b"), eq("a")];
        cleanup_merge(&mut diffs);
        assert_eq!(diffs, vec![eq("xca"), del("cba")]);
    }

    #[test]
    fn test_cleanup_semantic_no_elimination() {
        let mut diffs = vec![del("ab"), ins("cd"), eq("12"), del("e")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("ab"), ins("cd"), eq("12"), del("e")]);

        let mut diffs = vec![del("abc"), ins("ABC"), eq("1234"), del("wxyz")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("abc"), ins("ABC"), eq("1234"), del("wxyz")]);
    }

    #[test]
    fn test_cleanup_semantic_elimination() {
        let mut diffs = vec![del("a"), eq("b"), del("c")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("abc"), ins("b")]);

        let mut diffs = vec![del("ab"), eq("cd"), del("e"), eq("f"), ins("g")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("abcdef"), ins("cdfg")]);

        let mut diffs = vec![
            ins("1"),
            eq("A"),
            del("B"),
            ins("2"),
            eq("_"),
            ins("1"),
            eq("A"),
            del("B"),
            ins("2"),
        ];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("AB_AB"), ins("1A2_1A2")]);
    }

    #[test]
    fn test_cleanup_semantic_word_boundaries() {
        let mut diffs = vec![eq("The c"), del("ow and the c"), eq("at.")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![eq("The "), del("cow and the "), eq("cat.")]);
    }

    #[test]
    fn test_cleanup_semantic_overlaps() {
        let mut diffs = vec![del("abcxx"), ins("xxdef")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("abcxx"), ins("xxdef")]);

        let mut diffs = vec![del("abcxxx"), ins("xxxdef")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![del("abc"), eq("xxx"), ins("def")]);

        let mut diffs = vec![del("xxxabc"), ins("defxxx")];
        cleanup_semantic(&mut diffs);
        assert_eq!(diffs, vec![ins("def"), eq("xxx"), del("abc")]);

        let mut diffs = vec![
            del("abcd1212"),
            ins("1212efghi"),
            eq("----"),
            del("A3"),
            ins("3BC"),
        ];
        cleanup_semantic(&mut diffs);
        assert_eq!(
            diffs,
            vec![
                del("abcd"),
                eq("1212"),
                ins("efghi"),
                eq("----"),
                del("A"),
                eq("3"),
                ins("BC")
            ]
        );
    }

    #[test]
    fn test_cleanup_lossless_boundaries() {
        let mut diffs = vec![
            eq("AAA\r\n\r\nBBB"),
            ins("\r\nDDD\r\n\r\nBBB"),
            eq("\r\nEEE"),
        ];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(
            diffs,
            vec![
                eq("AAA\r\n\r\n"),
                ins("BBB\r\nDDD\r\n\r\n"),
                eq("BBB\r\nEEE")
            ]
        );

        let mut diffs = vec![eq("AAA\r\nBBB"), ins(" DDD\r\nBBB"), eq(" EEE")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(
            diffs,
            vec![eq("AAA\r\n"), ins("BBB DDD\r\n"), eq("BBB EEE")]
        );

        let mut diffs = vec![eq("The c"), ins("ow and the c"), eq("at.")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(diffs, vec![eq("The "), ins("cow and the "), eq("cat.")]);

        let mut diffs = vec![eq("The-c"), ins("ow-and-the-c"), eq("at.")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(diffs, vec![eq("The-"), ins("cow-and-the-"), eq("cat.")]);

        let mut diffs = vec![eq("a"), del("a"), eq("ax")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(diffs, vec![del("a"), eq("aax")]);

        let mut diffs = vec![eq("xa"), del("a"), eq("a")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(diffs, vec![eq("xaa"), del("a")]);
    }

    #[test]
    fn test_cleanup_lossless_sentence_boundaries() {
        let mut diffs = vec![eq("The xxx. The "), ins("zzz. The "), eq("yyy.")];
        cleanup_semantic_lossless(&mut diffs);
        assert_eq!(
            diffs,
            vec![eq("The xxx."), ins(" The zzz."), eq(" The yyy.")]
        );
    }

    #[test]
    fn test_common_overlap() {
        assert_eq!(common_overlap("", "abcd"), 0);
        assert_eq!(common_overlap("abc", "abcd"), 3);
        assert_eq!(common_overlap("123456", "abcd"), 0);
        assert_eq!(common_overlap("123456xxx", "xxxabcd"), 3);
        // Unicode: a precomposed character is not its decomposed parts.
        assert_eq!(common_overlap("fi", "\u{fb01}i"), 0);
    }

    #[test]
    fn test_token_table_lines() {
        let mut table = TokenTable::new();
        let coded1 = table.encode("alpha\nbeta\nalpha\n", DiffMode::Line);
        let coded2 = table.encode("beta\nalpha\nbeta\n", DiffMode::Line);
        assert_eq!(coded1, "\u{1}\u{2}\u{1}");
        assert_eq!(coded2, "\u{2}\u{1}\u{2}");
        assert_eq!(table.decode('\u{1}'), "alpha\n");
        assert_eq!(table.decode('\u{2}'), "beta\n");

        // A final line without a trailing newline is a unit of its own.
        let mut table = TokenTable::new();
        let coded = table.encode("alpha\nomega", DiffMode::Line);
        assert_eq!(coded, "\u{1}\u{2}");
        assert_eq!(table.decode('\u{2}'), "omega");
    }

    #[test]
    fn test_token_table_words() {
        let mut table = TokenTable::new();
        let coded = table.encode("colour the sky", DiffMode::Word);
        let units = coded
            .chars()
            .map(|c| table.decode(c).to_string())
            .collect::<Vec<_>>();
        assert_eq!(units.concat(), "colour the sky");
        // Word units never span two words.
        assert!(units.iter().all(|u| u.trim().split_whitespace().count() <= 1));
    }

    #[test]
    fn test_token_table_empty() {
        let mut table = TokenTable::new();
        assert_eq!(table.encode("", DiffMode::Line), "");
    }

    #[test]
    fn test_token_table_capacity() {
        assert!(TOKEN_CAPACITY >= 1_000_000);
        assert_eq!(TOKEN_CAPACITY_FIRST, TOKEN_CAPACITY * 2 / 3);
    }

    #[test]
    fn test_token_table_overflow_coalesces() {
        // First-text limit of 3: the sentinel plus two units, then the rest
        // of the text must fold into one overflow unit.
        let mut table = TokenTable::with_limits(3, 5);
        let coded = table.encode("a\nb\nc\nd\ne\n", DiffMode::Line);
        assert_eq!(coded.chars().count(), 3);
        assert_eq!(table.decode(coded.chars().last().unwrap()), "c\nd\ne\n");
        let expanded = coded
            .chars()
            .map(|c| table.decode(c).to_string())
            .collect::<String>();
        assert_eq!(expanded, "a\nb\nc\nd\ne\n");

        // The second text gets the remaining space: one reused unit, one
        // fresh unit, then its own overflow tail.
        let coded = table.encode("a\nx\ny\nz\n", DiffMode::Line);
        assert_eq!(coded.chars().count(), 3);
        assert_eq!(table.decode(coded.chars().last().unwrap()), "y\nz\n");
        let expanded = coded
            .chars()
            .map(|c| table.decode(c).to_string())
            .collect::<String>();
        assert_eq!(expanded, "a\nx\ny\nz\n");
    }

    #[test]
    fn test_line_mode_diff() {
        let diffs = compute_diff("a\nb\nc", "a\nx\nc", DiffMode::Line);
        assert_eq!(
            diffs,
            vec![eq("a\n"), del("b\n"), ins("x\n"), eq("c")]
        );
    }

    #[test]
    fn test_word_mode_diff() {
        let diffs = compute_diff("colour the sky", "color the sky", DiffMode::Word);
        let deleted = diffs
            .iter()
            .filter(|op| op.kind == DiffKind::Delete)
            .map(|op| op.text.as_str())
            .collect::<String>();
        let inserted = diffs
            .iter()
            .filter(|op| op.kind == DiffKind::Insert)
            .map(|op| op.text.as_str())
            .collect::<String>();
        assert_eq!(deleted, "olour ");
        assert_eq!(inserted, "olor ");
    }
}
