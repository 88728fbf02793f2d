use rand::rngs::OsRng;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Default)]
/// Produces human-like pauses between page interactions.
pub struct BehavioralEngine {}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// Pick a duration between `min` and `max` milliseconds.
    pub fn jitter(&self, min: u64, max: u64) -> Duration {
        let mut rng = OsRng;
        Duration::from_millis(rng.gen_range(min..=max.max(min)))
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        sleep(self.jitter(min, max)).await;
    }

    /// Pause between two scroll steps.
    pub async fn scroll_pause(&self) {
        self.random_delay(400, 650).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_in_range() {
        let engine = BehavioralEngine::new();
        for _ in 0..100 {
            let d = engine.jitter(10, 20);
            assert!(d >= Duration::from_millis(10) && d <= Duration::from_millis(20));
        }
        assert_eq!(engine.jitter(30, 5), Duration::from_millis(30));
    }
}
