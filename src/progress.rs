use std::sync::atomic::{AtomicUsize, Ordering};

type Callback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Byte counter shared by the workers of a scanning pass.
///
/// The optional callback receives `(done, total)` after every finished block.
pub struct ScanProgress {
    done: AtomicUsize,
    total: AtomicUsize,
    callback: Option<Callback>,
}

impl ScanProgress {

    pub fn new() -> Self {
        Self {
            done: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            callback: None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::new()
        }
    }

    pub fn add_total(&self, bytes: usize) {
        self.total.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn advance(&self, bytes: usize) {
        let done = self.done.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(callback) = &self.callback {
            callback(done, self.total.load(Ordering::Relaxed));
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
