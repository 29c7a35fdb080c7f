use std::sync::{Arc, Mutex, PoisonError};

/// Callback invoked with `(offset, size)` of an upload.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Forwards upload progress while keeping the reported offset monotonic.
///
/// Backends may report the same offset twice, restart from zero after a
/// credential refresh, or overshoot the total. Offsets are clamped to
/// `size` and never move backwards; repeated reports are dropped.
#[derive(Clone)]
pub struct ProgressForwarder {
    callback: ProgressCallback,
    last: Arc<Mutex<Option<(u64, u64)>>>,
}

impl ProgressForwarder {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Reports progress. Returns `true` if the callback was invoked.
    pub fn report(&self, offset: u64, size: u64) -> bool {
        let forwarded = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let mut offset = offset.min(size);
            if let Some((previous, _)) = *last {
                offset = offset.max(previous);
            }
            let size = size.max(offset);
            if *last == Some((offset, size)) {
                return false;
            }
            *last = Some((offset, size));
            (offset, size)
        };
        (self.callback)(forwarded.0, forwarded.1);
        true
    }

    /// Last forwarded `(offset, size)`.
    pub fn last(&self) -> Option<(u64, u64)> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProgressForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressForwarder")
            .field("last", &self.last())
            .finish_non_exhaustive()
    }
}
