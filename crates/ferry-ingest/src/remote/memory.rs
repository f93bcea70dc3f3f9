//! In-process remote source
//!
//! Holds named byte blobs in memory and serves them through the same seam as FTP. Failures
//! can be injected per operation, and every call is counted so tests can assert on what the
//! coordinator asked for.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{RemoteError, RemoteSession, RemoteSource};

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, Vec<u8>>,
    reject_connect: bool,
    failing_fetches: HashSet<String>,
    connects: usize,
    closes: usize,
    fetched: Vec<String>,
}

/// Cloneable handle; clones see the same files and counters
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add or replace a remote file
    pub fn put(&self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.lock().files.insert(name.into(), contents.into());
    }

    pub fn remove(&self, name: &str) {
        self.lock().files.remove(name);
    }

    /// Make every subsequent `connect` fail as a rejected login
    pub fn reject_connections(&self, reject: bool) {
        self.lock().reject_connect = reject;
    }

    /// Make fetching `name` fail part-way through the transfer
    pub fn fail_fetch(&self, name: impl Into<String>) {
        self.lock().failing_fetches.insert(name.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.reject_connect = false;
        state.failing_fetches.clear();
    }

    /// Connection attempts so far, successful or not
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Names passed to `fetch`, in call order
    pub fn fetched(&self) -> Vec<String> {
        self.lock().fetched.clone()
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let mut state = self.lock();
        state.connects += 1;
        if state.reject_connect {
            return Err(RemoteError::Auth {
                username: "memory".to_string(),
                reason: "530 Login incorrect".to_string(),
            });
        }
        Ok(Box::new(MemorySession {
            source: self.clone(),
            open: true,
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

struct MemorySession {
    source: MemorySource,
    open: bool,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn list(&mut self) -> Result<Vec<String>, RemoteError> {
        if !self.open {
            return Err(RemoteError::Closed);
        }
        Ok(self.source.lock().files.keys().cloned().collect())
    }

    async fn fetch(&mut self, name: &str, dest: &Path) -> Result<u64, RemoteError> {
        if !self.open {
            return Err(RemoteError::Closed);
        }

        let (contents, fail) = {
            let mut state = self.source.lock();
            state.fetched.push(name.to_string());
            let contents = state.files.get(name).cloned().ok_or_else(|| RemoteError::Fetch {
                name: name.to_string(),
                reason: "550 No such file".to_string(),
            })?;
            (contents, state.failing_fetches.contains(name))
        };

        let written = if fail {
            &contents[..contents.len() / 2]
        } else {
            &contents[..]
        };
        tokio::fs::write(dest, written)
            .await
            .map_err(|source| RemoteError::LocalWrite {
                path: dest.display().to_string(),
                source,
            })?;

        if fail {
            return Err(RemoteError::Fetch {
                name: name.to_string(),
                reason: "426 Connection closed; transfer aborted".to_string(),
            });
        }
        Ok(written.len() as u64)
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.source.lock().closes += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_list_and_fetch() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new();
        source.put("b.xml", "<b/>");
        source.put("a.xml", "<a/>");

        let mut session = source.connect().await.unwrap();
        assert_eq!(session.list().await.unwrap(), vec!["a.xml", "b.xml"]);

        let dest = dir.path().join("a.xml");
        assert_eq!(session.fetch("a.xml", &dest).await.unwrap(), 4);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "<a/>");

        session.close().await;
        session.close().await;
        assert_eq!(source.close_count(), 1);
        assert!(matches!(session.list().await, Err(RemoteError::Closed)));
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let dir = TempDir::new().unwrap();
        let source = MemorySource::new();
        source.put("a.xml", "<root>long enough</root>");
        source.fail_fetch("a.xml");

        let mut session = source.connect().await.unwrap();
        let dest = dir.path().join("a.xml");
        assert!(matches!(
            session.fetch("a.xml", &dest).await,
            Err(RemoteError::Fetch { .. })
        ));
        // A partial file is left behind, like an interrupted transfer
        assert!(std::fs::metadata(&dest).unwrap().len() < 25);

        source.reject_connections(true);
        assert!(matches!(
            source.connect().await.err(),
            Some(RemoteError::Auth { .. })
        ));
        assert_eq!(source.connect_count(), 2);
    }
}
