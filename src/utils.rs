use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

/// A randomized pause between `min_ms` and `max_ms` (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jitter {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Jitter {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// No pause at all
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::thread_rng().gen_range(self.min_ms..=self.max_ms))
    }

    pub async fn sleep(&self) {
        let pause = self.sample();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

/// Human-plausible pauses used while driving the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Between feed scrolls
    #[serde(default = "default_scroll")]
    pub scroll: Jitter,

    /// After a job page loads, before reading it
    #[serde(default = "default_settle")]
    pub settle: Jitter,

    /// After clicking Apply, before looking for the upload control
    #[serde(default = "default_after_apply")]
    pub after_apply: Jitter,

    /// Hand-off window for the human to review and submit
    #[serde(default = "default_review")]
    pub review: Jitter,
}

fn default_scroll() -> Jitter {
    Jitter::new(800, 1500)
}

fn default_settle() -> Jitter {
    Jitter::new(800, 1500)
}

fn default_after_apply() -> Jitter {
    Jitter::new(1500, 3000)
}

fn default_review() -> Jitter {
    Jitter::new(15_000, 30_000)
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            scroll: default_scroll(),
            settle: default_settle(),
            after_apply: default_after_apply(),
            review: default_review(),
        }
    }
}

impl Pacing {
    /// Every pause disabled
    pub fn immediate() -> Self {
        Self {
            scroll: Jitter::none(),
            settle: Jitter::none(),
            after_apply: Jitter::none(),
            review: Jitter::none(),
        }
    }
}

/// Replace everything except ASCII letters and digits with `_`
/// Raises the stop flag shared by every [`StopSignal`] clone
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

/// Stop flag checked between jobs and raced against long waits
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopSignal {
    /// A signal nobody can raise
    pub fn never() -> Self {
        stop_signal().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised; never resolves if the handle is gone first
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("SWE Intern (2025)"), "SWE_Intern__2025_");
        assert_eq!(sanitize_filename("Café/Bar"), "Caf__Bar");
        assert_eq!(sanitize_filename(""), "");
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let jitter = Jitter::new(10, 20);
        for _ in 0..100 {
            let pause = jitter.sample();
            assert!(pause >= Duration::from_millis(10) && pause <= Duration::from_millis(20));
        }
        assert_eq!(Jitter::none().sample(), Duration::ZERO);
        assert_eq!(Jitter::new(5, 1).sample(), Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_stop_signal_reaches_clones() {
        let (handle, signal) = stop_signal();
        let clone = signal.clone();
        assert!(!clone.is_stopped());

        handle.stop();
        assert!(signal.is_stopped());
        tokio::time::timeout(Duration::from_secs(1), clone.stopped())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_signal_stays_pending() {
        let signal = StopSignal::never();
        assert!(!signal.is_stopped());
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.stopped()).await;
        assert!(waited.is_err());
    }
}
