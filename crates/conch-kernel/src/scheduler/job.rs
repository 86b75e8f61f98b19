//! Background jobs: `&`-detached pipes indexed by tag.
//!
//! The job table is the only process-wide mutable state in the kernel.
//! Tags come from `&tag`; a bare `&` gets a generated `%n` tag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use conch_types::CmdError;
use tokio::task::JoinHandle;

/// One line of `jobs` output.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub tag: String,
    pub cmd: String,
    pub done: bool,
}

struct Job {
    cmd: String,
    handle: JoinHandle<Result<(), CmdError>>,
}

/// Table of running background pipes.
#[derive(Default)]
pub struct JobTable {
    seq: AtomicU64,
    jobs: Mutex<HashMap<String, Job>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a detached pipe. An empty tag gets a generated `%n` one.
    /// A reused tag replaces the previous job, which keeps running
    /// detached but can no longer be waited for.
    pub fn add(
        &self,
        tag: &str,
        cmd: impl Into<String>,
        handle: JoinHandle<Result<(), CmdError>>,
    ) -> String {
        let tag = if tag.is_empty() {
            format!("%{}", self.seq.fetch_add(1, Ordering::Relaxed) + 1)
        } else {
            tag.to_string()
        };
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(tag.clone(), Job { cmd: cmd.into(), handle });
        tag
    }

    /// Wait for one job (by tag) or for all of them. Unknown tags are
    /// errors; the result is the last non-ok job status.
    pub async fn wait(&self, tag: Option<&str>) -> Result<(), CmdError> {
        let picked: Vec<(String, Job)> = {
            let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
            match tag {
                Some(t) => match jobs.remove(t) {
                    Some(j) => vec![(t.to_string(), j)],
                    None => {
                        return Err(CmdError::other(format!("job {t}: exited or not found")))
                    }
                },
                None => jobs.drain().collect(),
            }
        };
        let mut sts = Ok(());
        for (_, job) in picked {
            match job.handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => sts = Err(e),
                Err(e) => sts = Err(CmdError::Bug(format!("job panicked: {e}"))),
            }
        }
        sts
    }

    /// Snapshot for the `jobs` builtin, sorted by tag.
    pub fn list(&self) -> Vec<JobInfo> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<JobInfo> = jobs
            .iter()
            .map(|(tag, j)| JobInfo {
                tag: tag.clone(),
                cmd: j.cmd.clone(),
                done: j.handle.is_finished(),
            })
            .collect();
        out.sort_by(|a, b| a.tag.cmp(&b.tag));
        out
    }

    /// Drop completed jobs, returning their tags.
    pub fn cleanup(&self) -> Vec<String> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let done: Vec<String> = jobs
            .iter()
            .filter(|(_, j)| j.handle.is_finished())
            .map(|(t, _)| t.clone())
            .collect();
        for t in &done {
            jobs.remove(t);
        }
        done
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tagged_job_roundtrip() {
        let t = JobTable::new();
        let tag = t.add("j1", "sleepy", tokio::spawn(async { Ok(()) }));
        assert_eq!(tag, "j1");
        assert_eq!(t.list().len(), 1);
        t.wait(Some("j1")).await.unwrap();
        assert!(t.is_empty());
    }

    #[tokio::test]
    async fn bare_tags_are_generated() {
        let t = JobTable::new();
        let a = t.add("", "one", tokio::spawn(async { Ok(()) }));
        let b = t.add("", "two", tokio::spawn(async { Ok(()) }));
        assert_ne!(a, b);
        assert!(a.starts_with('%'));
        t.wait(None).await.unwrap();
    }

    #[tokio::test]
    async fn wait_unknown_tag_is_an_error() {
        let t = JobTable::new();
        assert!(t.wait(Some("ghost")).await.is_err());
    }

    #[tokio::test]
    async fn wait_reports_job_failure() {
        let t = JobTable::new();
        t.add("bad", "boom", tokio::spawn(async { Err(CmdError::other("boom")) }));
        assert_eq!(t.wait(None).await, Err(CmdError::other("boom")));
    }

    #[tokio::test]
    async fn cleanup_drops_finished_jobs() {
        let t = JobTable::new();
        t.add("done", "quick", tokio::spawn(async { Ok(()) }));
        t.add(
            "running",
            "slow",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        let dropped = t.cleanup();
        assert_eq!(dropped, ["done"]);
        assert_eq!(t.list().len(), 1);
        // leave no stray sleepers
        t.cleanup();
    }
}
