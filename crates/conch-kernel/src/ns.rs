//! Name spaces: prefix mounts over the host tree plus dot resolution.
//!
//! The namespace decides what an absolute path means for one command.
//! Tree traversal itself lives in the stream adapters; here we only
//! rewrite prefixes, longest mount first.

use std::path::{Path, PathBuf};

/// A per-context namespace: ordered `(prefix, target)` mounts.
#[derive(Debug, Clone)]
pub struct Namespace {
    mounts: Vec<(String, PathBuf)>,
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace {
            mounts: vec![("/".to_string(), PathBuf::from("/"))],
        }
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `target` at `prefix`, shadowing shorter mounts for paths
    /// under it.
    pub fn mount(&mut self, prefix: impl Into<String>, target: impl Into<PathBuf>) {
        let prefix = prefix.into();
        self.mounts.retain(|(p, _)| *p != prefix);
        self.mounts.push((prefix, target.into()));
    }

    pub fn mounts(&self) -> &[(String, PathBuf)] {
        &self.mounts
    }

    /// Make `name` absolute against `dot` and rewrite it through the
    /// longest matching mount.
    pub fn resolve(&self, name: &str, dot: &Path) -> PathBuf {
        let abs = if name.starts_with('/') {
            clean(Path::new(name))
        } else {
            clean(&dot.join(name))
        };
        let abss = abs.to_string_lossy();
        let mut best: Option<(&str, &PathBuf)> = None;
        for (p, t) in &self.mounts {
            let hit = p == "/"
                || abss.as_ref() == p.trim_end_matches('/')
                || abss.starts_with(&format!("{}/", p.trim_end_matches('/')));
            if hit && best.map(|(bp, _)| p.len() > bp.len()).unwrap_or(true) {
                best = Some((p, t));
            }
        }
        match best {
            Some((p, t)) if p != "/" => {
                let rest = abss[p.trim_end_matches('/').len()..].trim_start_matches('/');
                if rest.is_empty() {
                    t.clone()
                } else {
                    t.join(rest)
                }
            }
            _ => abs,
        }
    }
}

/// Normalize `.` and `..` components without touching the filesystem.
fn clean(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push("/");
    }
    out
}
