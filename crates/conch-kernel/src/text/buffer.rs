//! In-memory text with marks, versioning, and undoable edits.
//!
//! Text is a sequence of rune chunks, so edits in the middle do not move
//! the whole buffer. Named marks keep a position stable across other
//! edits: a right-biased mark sticks to the rune after it (an insertion at
//! the mark pushes it along), a left-biased mark stays put. The edit log
//! records every mutation; edits flagged `contd` chain onto the previous
//! one and undo/redo as a single group.

use std::collections::HashMap;

use conch_types::CmdError;

/// Chunks are split once they grow past this.
const CHUNK_MAX: usize = 512;
/// Adjacent edits merge into one log entry until it reaches this size.
const EDIT_MERGE_MAX: usize = 1024;

/// A position kept in the text despite insertions and removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pub off: usize,
    pub right_biased: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Ins,
    Del,
}

/// One logged edit. `data` is what was inserted or removed at `off`;
/// `dirty` is whether the text was already modified before this edit;
/// `contd` chains this edit onto the previous undo group.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub op: EditOp,
    pub off: usize,
    pub data: Vec<char>,
    pub dirty: bool,
    pub contd: bool,
}

/// Editable text with marks and an undo/redo log.
#[derive(Debug, Default)]
pub struct Text {
    data: Vec<Vec<char>>,
    sz: usize,
    vers: u64,
    dirty: bool,
    marks: HashMap<String, Mark>,
    edits: Vec<Edit>,
    nedits: usize,
    contd: bool,
    seek: Option<Seek>,
}

#[derive(Debug, Clone, Copy)]
struct Seek {
    chunk: usize,
    start: usize,
}

impl Text {
    pub fn new() -> Self {
        Self::default()
    }

    /// A text preloaded with `src`; the load is not undoable and leaves
    /// the text clean.
    pub fn from_str(src: &str) -> Self {
        let mut t = Text::new();
        let runes: Vec<char> = src.chars().collect();
        if !runes.is_empty() {
            t.ins_runes(&runes, 0).expect("insert at 0");
        }
        t
    }

    pub fn len(&self) -> usize {
        self.sz
    }

    pub fn is_empty(&self) -> bool {
        self.sz == 0
    }

    /// Version counter: bumped by every successful mutation.
    pub fn vers(&self) -> u64 {
        self.vers
    }

    /// Has the text been modified since it was last marked clean?
    pub fn dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the text clean, e.g. after saving or reloading.
    pub fn clean(&mut self) {
        self.dirty = false;
    }

    // ── marks ──────────────────────────────────────────────────────────

    /// Place (or move) a named mark.
    pub fn set_mark(&mut self, name: impl Into<String>, off: usize, right_biased: bool) {
        let off = off.min(self.sz);
        self.marks.insert(name.into(), Mark { off, right_biased });
    }

    pub fn del_mark(&mut self, name: &str) {
        self.marks.remove(name);
    }

    pub fn mark(&self, name: &str) -> Option<Mark> {
        self.marks.get(name).copied()
    }

    /// Names of existing marks, sorted.
    pub fn marks(&self) -> Vec<String> {
        let mut v: Vec<_> = self.marks.keys().cloned().collect();
        v.sort();
        v
    }

    fn adjust_marks_ins(&mut self, p0: usize, n: usize) {
        for m in self.marks.values_mut() {
            if m.off > p0 || (m.off == p0 && m.right_biased) {
                m.off += n;
            }
        }
    }

    fn adjust_marks_del(&mut self, p0: usize, p1: usize) {
        for m in self.marks.values_mut() {
            if m.off >= p1 {
                m.off -= p1 - p0;
            } else if m.off > p0 {
                m.off = p0;
            }
        }
    }

    // ── edits ──────────────────────────────────────────────────────────

    /// Insert runes at `off`.
    pub fn ins(&mut self, data: &[char], off: usize) -> Result<(), CmdError> {
        if data.is_empty() {
            return Ok(());
        }
        self.ins_runes(data, off)?;
        self.vers += 1;
        let contd = std::mem::take(&mut self.contd);
        self.log_edit(EditOp::Ins, off, data.to_vec(), contd);
        self.adjust_marks_ins(off, data.len());
        self.dirty = true;
        Ok(())
    }

    /// Insert a string at `off`.
    pub fn ins_str(&mut self, s: &str, off: usize) -> Result<(), CmdError> {
        let runes: Vec<char> = s.chars().collect();
        self.ins(&runes, off)
    }

    /// Delete `n` runes at `off`, returning what was removed.
    pub fn del(&mut self, off: usize, n: usize) -> Vec<char> {
        if n == 0 {
            return Vec::new();
        }
        let got = self.del_runes(off, n);
        if got.is_empty() {
            return got;
        }
        self.vers += 1;
        let contd = std::mem::take(&mut self.contd);
        self.log_edit(EditOp::Del, off, got.clone(), contd);
        self.adjust_marks_del(off, off + got.len());
        self.dirty = true;
        got
    }

    /// Delete everything, as one undoable edit.
    pub fn del_all(&mut self) -> Vec<char> {
        let n = self.sz;
        self.del(0, n)
    }

    /// Insert at a mark and leave the mark after the insertion,
    /// regardless of its bias.
    pub fn mark_ins(&mut self, name: &str, data: &[char]) -> Result<(), CmdError> {
        let m = self
            .marks
            .get(name)
            .copied()
            .ok_or_else(|| CmdError::other(format!("no mark {name}")))?;
        self.ins(data, m.off)?;
        if let Some(m2) = self.marks.get_mut(name) {
            m2.off = m.off + data.len();
        }
        Ok(())
    }

    /// Delete `n` runes right before the mark; the mark stays where it is.
    pub fn mark_del(&mut self, name: &str, n: usize) -> Vec<char> {
        let Some(m) = self.marks.get(name).copied() else {
            return Vec::new();
        };
        let n = n.min(m.off);
        if n == 0 {
            return Vec::new();
        }
        self.del(m.off - n, n)
    }

    /// Chain the next edit onto the current undo group.
    pub fn contd_edit(&mut self) {
        self.contd = true;
    }

    /// Cancel a pending `contd_edit`; the next edit starts a new group.
    pub fn discontd_edit(&mut self) {
        self.contd = false;
    }

    fn log_edit(&mut self, op: EditOp, off: usize, data: Vec<char>, contd: bool) {
        // a new edit invalidates the redo tail
        self.edits.truncate(self.nedits);
        if let Some(last) = self.edits.last_mut() {
            if last.data.len() < EDIT_MERGE_MAX {
                match (last.op, op) {
                    // typing run: extend the previous insert
                    (EditOp::Ins, EditOp::Ins) if last.off + last.data.len() == off => {
                        last.data.extend_from_slice(&data);
                        return;
                    }
                    // forward delete run at a fixed offset
                    (EditOp::Del, EditOp::Del) if last.off == off => {
                        last.data.extend_from_slice(&data);
                        return;
                    }
                    // backspace run: the new delete ends where the last began
                    (EditOp::Del, EditOp::Del) if off + data.len() == last.off => {
                        let mut d = data.clone();
                        d.extend_from_slice(&last.data);
                        last.data = d;
                        last.off = off;
                        return;
                    }
                    _ => {}
                }
            }
        }
        self.edits.push(Edit {
            op,
            off,
            data,
            dirty: self.dirty,
            contd,
        });
        self.nedits = self.edits.len();
    }

    // ── undo / redo ────────────────────────────────────────────────────

    /// Reverse one logged edit. The returned edit describes what was done
    /// to the text (an `Ins` in the log comes back as a `Del`).
    pub fn undo_one(&mut self) -> Option<Edit> {
        if self.nedits == 0 {
            return None;
        }
        self.nedits -= 1;
        let e = self.edits[self.nedits].clone();
        let inverted = self.apply_inverse(&e);
        self.dirty = e.dirty;
        Some(inverted)
    }

    /// Undo a whole group: reverse the tail until a non-`contd` entry has
    /// been consumed. Returns the applied inverse edits, newest first.
    pub fn undo(&mut self) -> Vec<Edit> {
        let mut out = Vec::new();
        while self.nedits > 0 {
            let contd = self.edits[self.nedits - 1].contd;
            match self.undo_one() {
                Some(e) => out.push(e),
                None => break,
            }
            if !contd {
                break;
            }
        }
        out
    }

    /// Re-apply one undone edit.
    pub fn redo_one(&mut self) -> Option<Edit> {
        if self.nedits == self.edits.len() {
            return None;
        }
        let e = self.edits[self.nedits].clone();
        self.nedits += 1;
        self.apply(&e);
        self.dirty = true;
        Some(e)
    }

    /// Re-apply a whole undone group: the head entry plus every following
    /// `contd` entry.
    pub fn redo(&mut self) -> Vec<Edit> {
        let mut out = Vec::new();
        match self.redo_one() {
            Some(e) => out.push(e),
            None => return out,
        }
        while self.nedits < self.edits.len() && self.edits[self.nedits].contd {
            match self.redo_one() {
                Some(e) => out.push(e),
                None => break,
            }
        }
        out
    }

    /// True if there is anything to undo.
    pub fn has_edits(&self) -> bool {
        self.nedits > 0
    }

    fn apply(&mut self, e: &Edit) {
        self.vers += 1;
        match e.op {
            EditOp::Ins => {
                self.ins_runes(&e.data, e.off).expect("redo insert in range");
                self.adjust_marks_ins(e.off, e.data.len());
            }
            EditOp::Del => {
                self.del_runes(e.off, e.data.len());
                self.adjust_marks_del(e.off, e.off + e.data.len());
            }
        }
    }

    fn apply_inverse(&mut self, e: &Edit) -> Edit {
        let inv = Edit {
            op: match e.op {
                EditOp::Ins => EditOp::Del,
                EditOp::Del => EditOp::Ins,
            },
            off: e.off,
            data: e.data.clone(),
            dirty: e.dirty,
            contd: e.contd,
        };
        self.apply(&inv);
        inv
    }

    // ── access ─────────────────────────────────────────────────────────

    /// A lazy sequence of rune chunks covering `[off, off+n)`, suitable
    /// for streaming to a viewer without copying the buffer.
    pub fn get(&self, off: usize, n: usize) -> Runes<'_> {
        Runes {
            text: self,
            chunk: 0,
            skip: off,
            left: n.min(self.sz.saturating_sub(off.min(self.sz))),
        }
    }

    /// The rune at `off`, with a seek cache for sequential access.
    pub fn get_rune(&mut self, off: usize) -> Option<char> {
        if off >= self.sz {
            return None;
        }
        if let Some(s) = self.seek {
            if let Some(chunk) = self.data.get(s.chunk) {
                if off >= s.start && off < s.start + chunk.len() {
                    return Some(chunk[off - s.start]);
                }
            }
        }
        let mut start = 0;
        for (i, chunk) in self.data.iter().enumerate() {
            if off < start + chunk.len() {
                self.seek = Some(Seek { chunk: i, start });
                return Some(chunk[off - start]);
            }
            start += chunk.len();
        }
        None
    }

    // ── chunk plumbing ─────────────────────────────────────────────────

    fn ins_runes(&mut self, data: &[char], mut off: usize) -> Result<(), CmdError> {
        self.seek = None;
        if off > self.sz {
            return Err(CmdError::other("text can't have holes"));
        }
        if off == self.sz {
            if let Some(last) = self.data.last_mut() {
                if last.len() < CHUNK_MAX {
                    last.extend_from_slice(data);
                    self.sz += data.len();
                    return Ok(());
                }
            }
            self.data.push(data.to_vec());
            self.sz += data.len();
            return Ok(());
        }
        let mut i = 0;
        while i < self.data.len() {
            let clen = self.data[i].len();
            if off < clen {
                let tail = self.data[i].split_off(off);
                self.data.insert(i + 1, tail);
            }
            if off == self.data[i].len() {
                self.data[i].extend_from_slice(data);
                self.sz += data.len();
                return Ok(());
            }
            off -= self.data[i].len();
            i += 1;
        }
        Ok(())
    }

    fn del_runes(&mut self, mut off: usize, n: usize) -> Vec<char> {
        self.seek = None;
        let mut got = Vec::new();
        if off >= self.sz {
            return got;
        }
        let n = n.min(self.sz - off);
        let mut i = 0;
        while i < self.data.len() && off >= self.data[i].len() {
            off -= self.data[i].len();
            i += 1;
        }
        while i < self.data.len() && got.len() < n {
            let avail = self.data[i].len() - off;
            let take = avail.min(n - got.len());
            got.extend(self.data[i].drain(off..off + take));
            if self.data[i].is_empty() {
                self.data.remove(i);
            } else {
                i += 1;
            }
            off = 0;
        }
        self.sz -= got.len();
        got
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for chunk in &self.data {
            for c in chunk {
                f.write_fmt(format_args!("{c}"))?;
            }
        }
        Ok(())
    }
}

/// Iterator over borrowed rune chunks; see [`Text::get`].
pub struct Runes<'a> {
    text: &'a Text,
    chunk: usize,
    skip: usize,
    left: usize,
}

impl<'a> Iterator for Runes<'a> {
    type Item = &'a [char];

    fn next(&mut self) -> Option<&'a [char]> {
        while self.left > 0 {
            let chunk = self.text.data.get(self.chunk)?;
            self.chunk += 1;
            if self.skip >= chunk.len() {
                self.skip -= chunk.len();
                continue;
            }
            let start = self.skip;
            self.skip = 0;
            let take = (chunk.len() - start).min(self.left);
            self.left -= take;
            return Some(&chunk[start..start + take]);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runes(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn insert_and_read_back() {
        let mut t = Text::new();
        t.ins_str("hello world", 0).unwrap();
        t.ins_str(" there,", 5).unwrap();
        assert_eq!(t.to_string(), "hello there, world");
        assert_eq!(t.len(), 18);
    }

    #[test]
    fn insert_past_end_is_an_error() {
        let mut t = Text::from_str("ab");
        assert!(t.ins_str("x", 5).is_err());
    }

    #[test]
    fn delete_returns_removed_runes() {
        let mut t = Text::from_str("hello world");
        let got = t.del(5, 6);
        assert_eq!(got, runes(" world"));
        assert_eq!(t.to_string(), "hello");
    }

    #[test]
    fn vers_bumps_on_every_mutation() {
        let mut t = Text::from_str("abc");
        let v0 = t.vers();
        t.ins_str("x", 0).unwrap();
        t.del(0, 1);
        assert_eq!(t.vers(), v0 + 2);
        t.undo();
        assert_eq!(t.vers(), v0 + 3);
    }

    #[test]
    fn right_biased_mark_moves_with_insert_at_mark() {
        let mut t = Text::from_str("abcd");
        t.set_mark("r", 2, true);
        t.set_mark("l", 2, false);
        t.ins_str("XY", 2).unwrap();
        assert_eq!(t.mark("r").unwrap().off, 4);
        assert_eq!(t.mark("l").unwrap().off, 2);
        assert_eq!(t.to_string(), "abXYcd");
    }

    #[test]
    fn marks_shift_past_insertion() {
        let mut t = Text::from_str("abcd");
        t.set_mark("m", 3, false);
        t.ins_str("Z", 1).unwrap();
        assert_eq!(t.mark("m").unwrap().off, 4);
    }

    #[test]
    fn marks_snap_into_deleted_range() {
        let mut t = Text::from_str("abcdef");
        t.set_mark("inside", 3, false);
        t.set_mark("after", 5, false);
        t.set_mark("at_end", 4, false);
        t.del(2, 2); // remove "cd"
        assert_eq!(t.mark("inside").unwrap().off, 2);
        assert_eq!(t.mark("after").unwrap().off, 3);
        assert_eq!(t.mark("at_end").unwrap().off, 2);
        assert!(t.mark("inside").unwrap().off <= t.len());
    }

    #[test]
    fn mark_ins_advances_the_mark() {
        let mut t = Text::from_str("ab");
        t.set_mark("p", 1, false);
        t.mark_ins("p", &runes("XY")).unwrap();
        assert_eq!(t.to_string(), "aXYb");
        assert_eq!(t.mark("p").unwrap().off, 3);
        t.mark_ins("p", &runes("z")).unwrap();
        assert_eq!(t.to_string(), "aXYzb");
    }

    #[test]
    fn mark_del_removes_before_the_mark() {
        let mut t = Text::from_str("abcdef");
        t.set_mark("p", 4, false);
        let got = t.mark_del("p", 2);
        assert_eq!(got, runes("cd"));
        assert_eq!(t.to_string(), "abef");
        assert_eq!(t.mark("p").unwrap().off, 2);
        // deleting more than is available stops at the start
        let got = t.mark_del("p", 10);
        assert_eq!(got, runes("ab"));
    }

    #[test]
    fn undo_then_redo_restores_text() {
        let mut t = Text::from_str("base");
        t.ins_str(" more", 4).unwrap();
        let after = t.to_string();
        t.undo();
        assert_eq!(t.to_string(), "base");
        t.redo();
        assert_eq!(t.to_string(), after);
        // redo after undo is idempotent on the log
        t.undo();
        t.redo();
        assert_eq!(t.to_string(), after);
    }

    #[test]
    fn contd_edits_undo_as_one_group() {
        let mut t = Text::from_str("");
        t.ins_str("one", 0).unwrap();
        t.contd_edit();
        t.del(0, 1);
        t.contd_edit();
        t.ins_str("X", 0).unwrap();
        assert_eq!(t.to_string(), "Xne");
        let undone = t.undo();
        assert_eq!(undone.len(), 3, "the whole group unwinds");
        assert_eq!(t.to_string(), "");
        let redone = t.redo();
        assert_eq!(redone.len(), 3);
        assert_eq!(t.to_string(), "Xne");
    }

    #[test]
    fn discontd_cancels_grouping() {
        let mut t = Text::from_str("");
        t.ins_str("a", 0).unwrap();
        t.contd_edit();
        t.discontd_edit();
        t.del(0, 1);
        t.undo();
        assert_eq!(t.to_string(), "a", "only the delete unwinds");
    }

    #[test]
    fn new_edit_drops_redo_tail() {
        let mut t = Text::from_str("");
        t.ins_str("aaa", 0).unwrap();
        t.undo();
        t.ins_str("b", 0).unwrap();
        assert!(t.redo().is_empty());
        assert_eq!(t.to_string(), "b");
    }

    #[test]
    fn adjacent_inserts_merge_in_the_log() {
        let mut t = Text::from_str("");
        t.ins_str("a", 0).unwrap();
        t.ins_str("b", 1).unwrap();
        t.ins_str("c", 2).unwrap();
        t.undo();
        assert_eq!(t.to_string(), "", "a typing run is one undo unit");
    }

    #[test]
    fn backspace_run_merges_in_the_log() {
        let mut t = Text::from_str("abc");
        t.del(2, 1);
        t.del(1, 1);
        t.del(0, 1);
        assert_eq!(t.to_string(), "");
        t.undo();
        assert_eq!(t.to_string(), "abc");
    }

    #[test]
    fn dirty_tracks_user_edits_across_undo() {
        let mut t = Text::from_str("x");
        assert!(!t.dirty());
        t.ins_str("y", 1).unwrap();
        assert!(t.dirty());
        t.undo();
        assert!(!t.dirty(), "undoing the only edit restores clean");
        t.redo();
        assert!(t.dirty());
        t.clean();
        assert!(!t.dirty());
    }

    #[test]
    fn get_streams_chunks() {
        let mut t = Text::new();
        let big = "x".repeat(2000);
        t.ins_str(&big, 0).unwrap();
        t.ins_str("MID", 1000).unwrap();
        let collected: String = t.get(998, 7).map(|c| c.iter().collect::<String>()).collect();
        assert_eq!(collected, "xxMIDxx");
        let total: usize = t.get(0, t.len()).map(|c| c.len()).sum();
        assert_eq!(total, 2003);
    }

    #[test]
    fn get_rune_with_seek_cache() {
        let mut t = Text::from_str("abcdef");
        assert_eq!(t.get_rune(0), Some('a'));
        assert_eq!(t.get_rune(1), Some('b'));
        assert_eq!(t.get_rune(5), Some('f'));
        assert_eq!(t.get_rune(6), None);
        t.ins_str("Z", 3).unwrap();
        assert_eq!(t.get_rune(3), Some('Z'));
    }

    #[test]
    fn unicode_offsets_are_rune_offsets() {
        let mut t = Text::from_str("aéz");
        assert_eq!(t.len(), 3);
        t.ins_str("☺", 2).unwrap();
        assert_eq!(t.to_string(), "aé☺z");
        assert_eq!(t.get_rune(2), Some('☺'));
    }

    #[test]
    fn marks_stay_in_bounds_under_edit_storm() {
        let mut t = Text::from_str("0123456789");
        t.set_mark("a", 0, true);
        t.set_mark("b", 5, false);
        t.set_mark("c", 10, true);
        t.ins_str("XXX", 5).unwrap();
        t.del(2, 6);
        t.ins_str("Y", 0).unwrap();
        t.del(0, 3);
        for name in ["a", "b", "c"] {
            let off = t.mark(name).unwrap().off;
            assert!(off <= t.len(), "mark {name} at {off} beyond {}", t.len());
        }
    }
}
