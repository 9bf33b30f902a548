//! Cooperative stop requests (signals and interactive "stop")

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Shared stop flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Set the flag, returning whether it was already set.
    fn swap(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }
}

static GLOBAL_STOP: LazyLock<StopFlag> = LazyLock::new(StopFlag::new);

/// Process-wide flag set by the signal handlers.
pub fn global_stop() -> StopFlag {
    GLOBAL_STOP.clone()
}

/// First SIGINT/SIGTERM requests a graceful stop; a second one exits with 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let flag = global_stop();
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, move || {
                if flag.swap() {
                    std::process::exit(130);
                }
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = StopFlag::new();
        let b = a.clone();
        assert!(!b.is_requested());
        a.request();
        assert!(b.is_requested());
    }

    #[test]
    fn swap_reports_previous() {
        let f = StopFlag::new();
        assert!(!f.swap());
        assert!(f.swap());
    }
}
