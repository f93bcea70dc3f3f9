//! Processed-name registry
//!
//! Base names of files confirmed moved to the archive. Shared by the staging coordinator
//! (skip re-fetch) and the processor/archiver (skip re-processing, record completion). Lives
//! for the process only.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle onto one shared set of processed names
#[derive(Debug, Clone, Default)]
pub struct ProcessedRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl ProcessedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    /// Record a name; returns false if it was already present.
    ///
    /// The archiver records through [`commit_with`](Self::commit_with) instead, so the move
    /// and the record are one step.
    pub fn mark_processed(&self, name: impl Into<String>) -> bool {
        self.lock().insert(name.into())
    }

    /// Run `op` with the registry locked and record `name` only if it succeeds.
    ///
    /// A reader going through [`check_with`](Self::check_with) sees either the state before
    /// `op` ran or the state after `name` is recorded, never the gap in between.
    pub fn commit_with<T, E>(
        &self,
        name: &str,
        op: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        let mut names = self.lock();
        let out = op()?;
        names.insert(name.to_string());
        Ok(out)
    }

    /// Evaluate `check` with the registry locked, passing whether `name` is registered
    pub fn check_with<R>(&self, name: &str, check: impl FnOnce(bool) -> R) -> R {
        let names = self.lock();
        check(names.contains(name))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the current contents
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let registry = ProcessedRegistry::new();
        let handle = registry.clone();

        assert!(handle.mark_processed("report1.xml"));
        assert!(registry.contains("report1.xml"));
        assert!(!registry.contains("report2.xml"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mark_is_idempotent() {
        let registry = ProcessedRegistry::new();
        assert!(registry.mark_processed("a.xml"));
        assert!(!registry.mark_processed("a.xml"));
        assert_eq!(registry.snapshot(), vec!["a.xml".to_string()]);
    }

    #[test]
    fn test_commit_records_only_on_success() {
        let registry = ProcessedRegistry::new();

        let failed: Result<(), &str> = registry.commit_with("a.xml", || Err("rename failed"));
        assert_eq!(failed, Err("rename failed"));
        assert!(!registry.contains("a.xml"));

        let done: Result<u8, &str> = registry.commit_with("a.xml", || Ok(7));
        assert_eq!(done, Ok(7));
        assert!(registry.contains("a.xml"));
    }

    #[test]
    fn test_check_never_sees_move_without_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let active = dir.path().join("a.xml");
        let archived = dir.path().join("archived.xml");
        std::fs::write(&active, "<a/>").unwrap();

        let registry = ProcessedRegistry::new();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();

        let committer = {
            let registry = registry.clone();
            let (active, archived) = (active.clone(), archived.clone());
            std::thread::spawn(move || {
                registry.commit_with("a.xml", || {
                    entered_tx.send(()).unwrap();
                    std::fs::rename(&active, &archived)?;
                    // Widen the window between the move and the record
                    std::thread::sleep(std::time::Duration::from_millis(50));
                    Ok::<(), std::io::Error>(())
                })
            })
        };

        entered_rx.recv().unwrap();
        let seen = registry.check_with("a.xml", |processed| processed || active.exists());
        assert!(seen, "name was neither registered nor in place");

        committer.join().unwrap().unwrap();
        assert!(registry.contains("a.xml"));
        assert!(archived.is_file());
    }

    #[test]
    fn test_concurrent_marks() {
        let registry = ProcessedRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for j in 0..50 {
                        registry.mark_processed(format!("{i}-{j}.xml"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 400);
    }
}
