use std::sync::{Arc, Mutex, MutexGuard};

use super::{ScalarRecord, TelemetryRecorder};
use crate::error::TelemetryError;

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ScalarRecord>,
    flushes: usize,
}

/// In-process recorder. Clones share the same storage, so a caller can keep a
/// handle while the recorder itself is moved into a runner.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds consistent records.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All records in insertion order.
    pub fn records(&self) -> Vec<ScalarRecord> {
        self.lock().records.clone()
    }

    /// `(step, value)` pairs recorded under `tag`, in insertion order.
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }
}

impl TelemetryRecorder for MemoryRecorder {
    fn add_scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<(), TelemetryError> {
        self.lock().records.push(ScalarRecord {
            tag: tag.to_string(),
            step,
            value,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TelemetryError> {
        self.lock().flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_storage() {
        let handle = MemoryRecorder::new();
        let mut writer = handle.clone();
        writer.add_scalar("distance", 1, 0.1).unwrap();
        writer.add_scalar("speed", 1, 2.0).unwrap();
        writer.add_scalar("distance", 2, 0.3).unwrap();

        assert_eq!(handle.len(), 3);
        assert_eq!(handle.series("distance"), vec![(1, 0.1), (2, 0.3)]);
        assert_eq!(handle.series("speed"), vec![(1, 2.0)]);
        assert!(handle.series("missing").is_empty());
    }
}
