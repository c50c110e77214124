//! Shared progress counter
//!
//! The atomic position is the source of truth; the indicatif bar only mirrors
//! it for display and can be hidden without affecting the count.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct ProgressCounter {
    inner: Arc<Inner>,
}

struct Inner {
    position: AtomicU64,
    total: Option<u64>,
    bar: ProgressBar,
}

impl ProgressCounter {
    /// Counter with a known total, drawn as a bar on stderr when `visible`
    pub fn with_total(total: u64, visible: bool) -> Self {
        let bar = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self::from_bar(bar, Some(total), visible)
    }

    /// Counter without a total, drawn as a spinner when `visible`
    pub fn indeterminate(visible: bool) -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {pos} files {msg}") {
            bar.set_style(style);
        }
        if visible {
            bar.enable_steady_tick(Duration::from_millis(120));
        }
        Self::from_bar(bar, None, visible)
    }

    /// Counter that never draws
    pub fn hidden(total: Option<u64>) -> Self {
        Self::from_bar(ProgressBar::hidden(), total, false)
    }

    fn from_bar(bar: ProgressBar, total: Option<u64>, visible: bool) -> Self {
        if !visible {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_prefix("Files");
        Self {
            inner: Arc::new(Inner {
                position: AtomicU64::new(0),
                total,
                bar,
            }),
        }
    }

    /// Advance by one processed file
    pub fn inc(&self) {
        self.inner.position.fetch_add(1, Ordering::Relaxed);
        self.inner.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.inner.position.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Option<u64> {
        self.inner.total
    }

    pub fn finish(&self, message: &str) {
        self.inner.bar.finish_with_message(message.to_string());
    }

    pub fn abandon(&self, message: &str) {
        self.inner.bar.abandon_with_message(message.to_string());
    }
}

impl fmt::Debug for ProgressCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressCounter")
            .field("position", &self.position())
            .field("total", &self.inner.total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_shared_between_clones() {
        let counter = ProgressCounter::hidden(Some(3));
        let other = counter.clone();
        counter.inc();
        other.inc();
        assert_eq!(counter.position(), 2);
        assert_eq!(other.total(), Some(3));
    }

    #[tokio::test]
    async fn test_counter_concurrent_increments() {
        let counter = ProgressCounter::with_total(400, false);
        let mut handles = Vec::new();
        for _ in 0..4 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    counter.inc();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.position(), 400);
    }
}
