//! Simulated latency and fault injection applied to every mocked response.

use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::MockConfig;
use crate::prng::Prng;
use crate::router::MockResponse;

const NETWORK_SALT: u32 = 0x4E45_5457;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkProfile {
    pub delay_ms: u64,
    pub failure_rate_percent: f64,
}

impl From<&MockConfig> for NetworkProfile {
    fn from(config: &MockConfig) -> Self {
        Self {
            delay_ms: config.network_delay_ms,
            failure_rate_percent: config.failure_rate_percent,
        }
    }
}

pub struct NetworkSimulator {
    rng: Mutex<Prng>,
}

impl NetworkSimulator {
    pub fn new(seed: u32) -> Self {
        Self {
            rng: Mutex::new(Prng::for_stream(seed, NETWORK_SALT)),
        }
    }

    pub fn reseed(&self, seed: u32) {
        self.rng
            .lock()
            .expect("network rng lock should not be poisoned")
            .reseed_stream(seed, NETWORK_SALT);
    }

    // One independent draw per call, so failures never stick.
    pub fn should_fail(&self, failure_rate_percent: f64) -> bool {
        let probability = (failure_rate_percent / 100.0).clamp(0.0, 1.0);
        if probability.is_nan() {
            return false;
        }
        self.rng
            .lock()
            .expect("network rng lock should not be poisoned")
            .gen_bool(probability)
    }

    pub async fn run<F>(&self, profile: NetworkProfile, produce: F) -> MockResponse
    where
        F: FnOnce() -> MockResponse,
    {
        if profile.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(profile.delay_ms)).await;
        }

        if self.should_fail(profile.failure_rate_percent) {
            warn!(
                component = "network",
                event = "network.fault_injected",
                failure_rate_percent = profile.failure_rate_percent
            );
            return MockResponse::server_error("simulated network failure");
        }

        produce()
    }
}
