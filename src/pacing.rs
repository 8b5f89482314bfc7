//! Pacing gate: computes and applies the wait between attempts.

use rand::Rng;
use std::time::Duration;

/// Exactly one of fixed delay, jitter range, or no wait at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    None,
    Fixed(Duration),
    Jitter { min: Duration, max: Duration },
}

pub struct PacingGate {
    pacing: Pacing,
}

impl PacingGate {
    pub fn new(pacing: Pacing) -> Self {
        Self { pacing }
    }

    /// Suspends the caller the configured amount. Call between attempts, never before the first.
    pub async fn wait(&self) {
        let duration = match self.pacing {
            Pacing::None => return,
            Pacing::Fixed(d) => d,
            Pacing::Jitter { min, max } => {
                if max <= min {
                    min
                } else {
                    let min_ms = min.as_millis() as u64;
                    let max_ms = max.as_millis() as u64;
                    let sampled_ms = rand::thread_rng().gen_range(min_ms..=max_ms);
                    Duration::from_millis(sampled_ms)
                }
            }
        };
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_pacing_yields_zero_sleep_path() {
        let gate = PacingGate::new(Pacing::None);
        assert_eq!(gate.pacing, Pacing::None);
    }

    #[tokio::test]
    async fn fixed_pacing_waits_approximately_configured_duration() {
        let gate = PacingGate::new(Pacing::Fixed(Duration::from_millis(10)));
        let start = std::time::Instant::now();
        gate.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn jitter_never_exceeds_max_or_undercuts_min() {
        let gate = PacingGate::new(Pacing::Jitter {
            min: Duration::from_millis(5),
            max: Duration::from_millis(15),
        });
        for _ in 0..20 {
            let start = std::time::Instant::now();
            gate.wait().await;
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_millis(5));
            assert!(elapsed <= Duration::from_millis(50));
        }
    }
}
