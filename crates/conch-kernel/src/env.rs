//! Environment sets: list- and map-valued variables.
//!
//! A variable holds either a word list or a map from keys to word lists.
//! Both are modeled directly as typed structures; the flat string encoding
//! (`\x08` between list elements, `\x07` around map tokens) exists only for
//! the OS boundary, where a Unix environment block is all we have.

use std::collections::HashMap;

use conch_types::CmdError;

/// Separator between list elements in the OS encoding.
const LIST_SEP: char = '\u{8}';
/// Separator around map key/value tokens in the OS encoding.
const MAP_SEP: char = '\u{7}';

/// One environment variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    List(Vec<String>),
    Map(HashMap<String, Vec<String>>),
}

impl EnvValue {
    pub fn len(&self) -> usize {
        match self {
            EnvValue::List(l) => l.len(),
            EnvValue::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A set of environment variables. Each context holds one behind a shared
/// handle; forking a context's environment deep-copies the whole set.
#[derive(Debug, Clone, Default)]
pub struct EnvSet {
    vars: HashMap<String, EnvValue>,
}

impl EnvSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a Unix environment block, decoding the flat encoding.
    pub fn from_os() -> Self {
        let mut env = Self::new();
        for (k, v) in std::env::vars() {
            env.vars.insert(k, decode(&v));
        }
        env
    }

    /// Scalar view: the list joined with spaces, empty when unset.
    pub fn get(&self, name: &str) -> String {
        match self.vars.get(name) {
            Some(EnvValue::List(l)) => l.join(" "),
            Some(EnvValue::Map(m)) => {
                let mut keys: Vec<_> = m.keys().cloned().collect();
                keys.sort();
                keys.join(" ")
            }
            None => String::new(),
        }
    }

    /// Scalar set: an empty value removes the variable.
    pub fn set(&mut self, name: impl Into<String>, val: impl Into<String>) {
        let name = name.into();
        let val = val.into();
        if val.is_empty() {
            self.vars.remove(&name);
        } else {
            self.vars.insert(name, EnvValue::List(vec![val]));
        }
    }

    /// The word list for `name`; empty when unset. A map yields its sorted
    /// key names, which is what `$m` means for a map-valued variable.
    pub fn list(&self, name: &str) -> Vec<String> {
        match self.vars.get(name) {
            Some(EnvValue::List(l)) => l.clone(),
            Some(EnvValue::Map(m)) => {
                let mut keys: Vec<_> = m.keys().cloned().collect();
                keys.sort();
                keys
            }
            None => Vec::new(),
        }
    }

    pub fn set_list(&mut self, name: impl Into<String>, vals: Vec<String>) {
        self.vars.insert(name.into(), EnvValue::List(vals));
    }

    pub fn map(&self, name: &str) -> Option<&HashMap<String, Vec<String>>> {
        match self.vars.get(name) {
            Some(EnvValue::Map(m)) => Some(m),
            _ => None,
        }
    }

    pub fn set_map(&mut self, name: impl Into<String>, m: HashMap<String, Vec<String>>) {
        self.vars.insert(name.into(), EnvValue::Map(m));
    }

    /// `$name[idx]`: the idx-th list element, or the map entry under key
    /// `idx`. Missing entries are empty, not errors.
    pub fn index(&self, name: &str, idx: &str) -> Vec<String> {
        match self.vars.get(name) {
            Some(EnvValue::List(l)) => match idx.parse::<usize>() {
                Ok(i) => l.get(i).map(|v| vec![v.clone()]).unwrap_or_default(),
                Err(_) => Vec::new(),
            },
            Some(EnvValue::Map(m)) => m.get(idx).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// `name[idx] = val`. On a list, a decimal index must be within the
    /// list or exactly one past its end (append); further out is an error.
    /// On a map (or a non-numeric index), the entry is replaced.
    pub fn set_index(&mut self, name: &str, idx: &str, val: String) -> Result<(), CmdError> {
        let is_map = matches!(self.vars.get(name), Some(EnvValue::Map(_)));
        if !is_map {
            if let Ok(i) = idx.parse::<usize>() {
                let l = match self.vars.entry(name.to_string()).or_insert_with(|| EnvValue::List(Vec::new())) {
                    EnvValue::List(l) => l,
                    EnvValue::Map(_) => unreachable!("checked above"),
                };
                if i < l.len() {
                    l[i] = val;
                } else if i == l.len() {
                    l.push(val);
                } else {
                    return Err(CmdError::other(format!("{name}[{i}]: out of range")));
                }
                return Ok(());
            }
        }
        let m = match self
            .vars
            .entry(name.to_string())
            .or_insert_with(|| EnvValue::Map(HashMap::new()))
        {
            EnvValue::Map(m) => m,
            EnvValue::List(_) => {
                return Err(CmdError::other(format!("{name}: not a map")));
            }
        };
        m.insert(idx.to_string(), vec![val]);
        Ok(())
    }

    /// `$#name`: element count for lists, entry count for maps.
    pub fn len(&self, name: &str) -> usize {
        self.vars.get(name).map(EnvValue::len).unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) {
        self.vars.remove(name);
    }

    /// All variables in the Unix block format, flat-encoded, sorted by
    /// name. Only used when crossing the OS boundary.
    pub fn to_os(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect();
        out.sort();
        out
    }
}

fn encode(v: &EnvValue) -> String {
    match v {
        EnvValue::List(l) => l.join(&LIST_SEP.to_string()),
        EnvValue::Map(m) => {
            let mut keys: Vec<_> = m.keys().collect();
            keys.sort();
            let mut s = String::new();
            for k in keys {
                s.push_str(k);
                s.push(MAP_SEP);
                s.push_str(&m[k].join(&LIST_SEP.to_string()));
                s.push(MAP_SEP);
            }
            s
        }
    }
}

fn decode(s: &str) -> EnvValue {
    if s.contains(MAP_SEP) {
        let toks: Vec<&str> = s.split(MAP_SEP).collect();
        let mut m = HashMap::new();
        let pairs = toks.len() / 2;
        for i in 0..pairs {
            let k = toks[i * 2];
            let v = toks[i * 2 + 1];
            if !k.is_empty() {
                m.insert(
                    k.to_string(),
                    v.split(LIST_SEP).map(str::to_string).collect(),
                );
            }
        }
        EnvValue::Map(m)
    } else if s.contains(LIST_SEP) {
        EnvValue::List(s.split(LIST_SEP).map(str::to_string).collect())
    } else {
        EnvValue::List(vec![s.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut e = EnvSet::new();
        e.set("status", "oops");
        assert_eq!(e.get("status"), "oops");
        e.set("status", "");
        assert!(!e.contains("status"));
    }

    #[test]
    fn list_and_len() {
        let mut e = EnvSet::new();
        e.set_list("x", vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(e.list("x"), ["a", "b", "c"]);
        assert_eq!(e.len("x"), 3);
        assert_eq!(e.get("x"), "a b c");
        assert_eq!(e.index("x", "1"), ["b"]);
        assert!(e.index("x", "9").is_empty());
    }

    #[test]
    fn indexed_set_appends_at_len_only() {
        let mut e = EnvSet::new();
        e.set_list("x", vec!["a".into(), "b".into()]);
        e.set_index("x", "2", "z".into()).unwrap();
        e.set_index("x", "3", "z".into()).unwrap();
        assert_eq!(e.list("x"), ["a", "b", "z", "z"]);
        assert!(e.set_index("x", "9", "w".into()).is_err());
        e.set_index("x", "0", "q".into()).unwrap();
        assert_eq!(e.list("x")[0], "q");
    }

    #[test]
    fn maps_index_by_key() {
        let mut e = EnvSet::new();
        let mut m = HashMap::new();
        m.insert("k".to_string(), vec!["v1".to_string(), "v2".to_string()]);
        e.set_map("m", m);
        assert_eq!(e.index("m", "k"), ["v1", "v2"]);
        assert_eq!(e.list("m"), ["k"]);
        e.set_index("m", "j", "w".into()).unwrap();
        assert_eq!(e.index("m", "j"), ["w"]);
        assert_eq!(e.len("m"), 2);
    }

    #[test]
    fn os_encoding_roundtrips() {
        let mut e = EnvSet::new();
        e.set_list("l", vec!["a".into(), "b c".into()]);
        let os = e.to_os();
        let (_, enc) = os.iter().find(|(k, _)| k == "l").unwrap();
        assert_eq!(decode(enc), EnvValue::List(vec!["a".into(), "b c".into()]));

        let mut m = HashMap::new();
        m.insert("k".to_string(), vec!["v".to_string()]);
        e.set_map("m", m.clone());
        let os = e.to_os();
        let (_, enc) = os.iter().find(|(k, _)| k == "m").unwrap();
        assert_eq!(decode(enc), EnvValue::Map(m));
    }

    #[test]
    fn fork_is_a_deep_copy() {
        let mut e = EnvSet::new();
        e.set_list("x", vec!["a".into()]);
        let mut child = e.clone();
        child.set_list("x", vec!["b".into()]);
        assert_eq!(e.list("x"), ["a"]);
        assert_eq!(child.list("x"), ["b"]);
    }
}
