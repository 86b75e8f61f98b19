//! Directory records: the ordered `name -> value` attribute maps that
//! identify files on typed streams.
//!
//! A producer emits one `Dir` per file, then the file's data as `Bytes`
//! messages. Consumers treat the record as plain data; only the
//! conventional keys below have agreed meaning:
//!
//! - `path`   canonical absolute path at the producer's view
//! - `Upath`  path relative to the user's working directory
//! - `Rpath`  path relative to the traversal root
//! - `name`   base name (always `basename(path)`)
//! - `type`   one of `-`, `d`, `c`, `F`, `D`
//! - `mode`   octal permission bits
//! - `size`   decimal byte count
//! - `mtime`  decimal seconds since the epoch
//! - `uid`, `gid`
//!
//! Keys whose first rune is uppercase are synthesized or temporary and are
//! never written back to an underlying tree.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::msg::Addr;

/// Attribute order used when formatting a whole record.
const STD_ORDER: &[&str] = &[
    "name", "type", "mode", "size", "mtime", "uid", "gid", "path", "Upath", "Rpath",
];

/// An ordered attribute record for one file.
///
/// Insertion order is preserved; lookups are linear, which is fine for the
/// dozen-or-so attributes a record carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dir {
    attrs: Vec<(String, String)>,
}

impl Dir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an attribute value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute, replacing any previous value. An empty value
    /// removes the attribute.
    pub fn set(&mut self, key: impl Into<String>, val: impl Into<String>) {
        let key = key.into();
        let val = val.into();
        if val.is_empty() {
            self.attrs.retain(|(k, _)| *k != key);
            return;
        }
        if let Some(slot) = self.attrs.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = val;
        } else {
            self.attrs.push((key, val));
        }
    }

    /// An independent copy of the record.
    pub fn dup(&self) -> Dir {
        self.clone()
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Iterate attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn name(&self) -> &str {
        self.get("name").unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.get("path").unwrap_or("")
    }

    /// The single-character file type, `-` if absent.
    pub fn dir_type(&self) -> char {
        self.get("type").and_then(|t| t.chars().next()).unwrap_or('-')
    }

    pub fn is_dir(&self) -> bool {
        self.dir_type() == 'd'
    }

    /// Numeric attribute value, 0 when absent or malformed. Octal for
    /// `mode`, decimal otherwise.
    pub fn num(&self, key: &str) -> u64 {
        let Some(v) = self.get(key) else { return 0 };
        if key == "mode" {
            u64::from_str_radix(v.trim_start_matches("0o"), 8).unwrap_or(0)
        } else {
            v.parse().unwrap_or(0)
        }
    }

    pub fn size(&self) -> u64 {
        self.num("size")
    }

    pub fn mode(&self) -> u32 {
        self.num("mode") as u32
    }

    /// An address naming this file, with no line or rune positions.
    pub fn addr(&self) -> Addr {
        let name = if self.path().is_empty() {
            self.name().to_string()
        } else {
            self.path().to_string()
        };
        Addr::name(name)
    }

    /// True if the key names a synthesized or temporary attribute: those
    /// are never serialized back to an underlying tree.
    pub fn is_synth_key(key: &str) -> bool {
        key.chars().next().is_some_and(|c| c.is_uppercase())
    }

    /// The attributes that may be written back on a wstat: everything but
    /// the synthesized ones.
    pub fn wstat_attrs(&self) -> Dir {
        Dir {
            attrs: self
                .attrs
                .iter()
                .filter(|(k, _)| !Dir::is_synth_key(k))
                .cloned()
                .collect(),
        }
    }

    /// Does the record's path start with the given path prefix, component
    /// wise? `/a` is a prefix of `/a/b` but not of `/ab`.
    pub fn has_prefix(&self, pref: &str) -> bool {
        let p = self.path();
        let pref = pref.trim_end_matches('/');
        if pref.is_empty() || pref == "/" {
            return p.starts_with('/');
        }
        p == pref || (p.starts_with(pref) && p.as_bytes().get(pref.len()) == Some(&b'/'))
    }

    /// The path with the given prefix removed; `None` if it is not a
    /// prefix. The result keeps its leading `/`, and the whole prefix maps
    /// to `/`.
    pub fn suffix(&self, pref: &str) -> Option<&str> {
        if !self.has_prefix(pref) {
            return None;
        }
        let p = self.path();
        let pref = pref.trim_end_matches('/');
        let rest = &p[pref.len()..];
        if rest.is_empty() {
            Some("/")
        } else {
            Some(rest)
        }
    }

    /// Short listing format: `type mode size path`.
    pub fn fmt(&self) -> String {
        format!(
            "{} {:>6o} {:>8} {}",
            self.dir_type(),
            self.mode(),
            self.size(),
            if self.path().is_empty() { self.name() } else { self.path() },
        )
    }

    /// Long format: every attribute as `key=value`, conventional keys
    /// first in standard order, then user attributes in insertion order.
    pub fn long_fmt(&self) -> String {
        let mut parts = Vec::with_capacity(self.attrs.len());
        for k in STD_ORDER {
            if let Some(v) = self.get(k) {
                parts.push(format!("{k}={v}"));
            }
        }
        for (k, v) in &self.attrs {
            if !STD_ORDER.contains(&k.as_str()) {
                parts.push(format!("{k}={v}"));
            }
        }
        parts.join(" ")
    }

    /// Compare two records lexicographically by path components, so that
    /// `/a/b` sorts before `/a/b/c` and before `/a/c`.
    pub fn path_cmp(a: &Dir, b: &Dir) -> Ordering {
        let ae = a.path().split('/').filter(|e| !e.is_empty());
        let be = b.path().split('/').filter(|e| !e.is_empty());
        ae.cmp(be)
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fmt())
    }
}

impl FromIterator<(String, String)> for Dir {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut d = Dir::new();
        for (k, v) in iter {
            d.set(k, v);
        }
        d
    }
}
