//! Interception engine: decides per request whether the mock answers it and,
//! if so, produces the response under the configured network profile.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::info;

use crate::config::{ConfigModel, ConfigPatch, ConfigStore, MemoryConfigStore, MockConfig};
use crate::dataset::{generate, Dataset};
use crate::network::{NetworkProfile, NetworkSimulator};
use crate::prng::Prng;
use crate::router::{route, Endpoint, MockRequest, MockResponse, RouteContext};
use crate::session::Session;

const SESSION_SALT: u32 = 0x5345_5353;

#[derive(Debug)]
pub enum Intercept {
    Handled {
        endpoint: &'static str,
        response: MockResponse,
    },
    PassThrough(MockRequest),
}

pub struct MockEngine {
    enabled: AtomicBool,
    config: RwLock<ConfigModel>,
    dataset: RwLock<Option<(u64, Arc<Dataset>)>>,
    session: Mutex<Session>,
    session_rng: Mutex<Prng>,
    network: NetworkSimulator,
}

impl MockEngine {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        let config = ConfigModel::load(store);
        let enabled = config.load_enabled();
        let seed = config.current().seed;

        Self {
            enabled: AtomicBool::new(enabled),
            config: RwLock::new(config),
            dataset: RwLock::new(None),
            session: Mutex::new(Session::default()),
            session_rng: Mutex::new(Prng::for_stream(seed, SESSION_SALT)),
            network: NetworkSimulator::new(seed),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryConfigStore::new()))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        self.read_config().persist_enabled(enabled);
        info!(
            component = "engine",
            event = "mode.toggle",
            enabled,
            changed = previous != enabled
        );
    }

    pub fn config(&self) -> MockConfig {
        self.read_config().current().clone()
    }

    pub fn revision(&self) -> u64 {
        self.read_config().revision()
    }

    pub fn apply_config(&self, patch: &ConfigPatch) -> MockConfig {
        let applied = self
            .config
            .write()
            .expect("config lock should not be poisoned")
            .apply(patch)
            .clone();
        self.reseed(applied.seed);
        applied
    }

    pub fn reset_config(&self) -> MockConfig {
        let restored = self
            .config
            .write()
            .expect("config lock should not be poisoned")
            .reset()
            .clone();
        self.reseed(restored.seed);
        restored
    }

    pub fn dataset(&self) -> Arc<Dataset> {
        let (revision, config) = {
            let model = self.read_config();
            (model.revision(), model.current().clone())
        };

        if let Some((cached, dataset)) = &*self
            .dataset
            .read()
            .expect("dataset lock should not be poisoned")
        {
            if *cached == revision {
                return Arc::clone(dataset);
            }
        }

        let mut slot = self
            .dataset
            .write()
            .expect("dataset lock should not be poisoned");
        if let Some((cached, dataset)) = &*slot {
            if *cached == revision {
                return Arc::clone(dataset);
            }
        }
        let fresh = Arc::new(generate(&config));
        *slot = Some((revision, Arc::clone(&fresh)));
        fresh
    }

    pub async fn intercept(&self, request: MockRequest) -> Intercept {
        if !self.is_enabled() {
            return Intercept::PassThrough(request);
        }
        let Some(endpoint) = Endpoint::match_request(&request.method, &request.path) else {
            return Intercept::PassThrough(request);
        };

        let profile = NetworkProfile::from(&self.config());
        let dataset = self.dataset();
        let response = self
            .network
            .run(profile, || self.handle(&endpoint, &request, &dataset))
            .await;

        Intercept::Handled {
            endpoint: endpoint.name(),
            response,
        }
    }

    fn handle(&self, endpoint: &Endpoint, request: &MockRequest, dataset: &Dataset) -> MockResponse {
        let mut session = self
            .session
            .lock()
            .expect("session lock should not be poisoned");
        let mut rng = self
            .session_rng
            .lock()
            .expect("session rng lock should not be poisoned");

        route(
            endpoint,
            request,
            RouteContext {
                dataset,
                session: &mut session,
                rng: &mut rng,
                now: Utc::now(),
            },
        )
    }

    fn reseed(&self, seed: u32) {
        self.network.reseed(seed);
        self.session_rng
            .lock()
            .expect("session rng lock should not be poisoned")
            .reseed_stream(seed, SESSION_SALT);
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, ConfigModel> {
        self.config
            .read()
            .expect("config lock should not be poisoned")
    }
}
