//! Arena mock core crate.
//!
//! Deterministic demo backend for the token market dashboard:
//! - seeded PRNG and synthetic dataset generation
//! - persisted mock configuration (seed, size, volatility, network profile)
//! - endpoint contract table with simulated latency and faults
//! - HTTP front that answers mocked routes and forwards everything else

mod config;
mod dataset;
mod engine;
mod http;
mod network;
mod observability;
mod prng;
mod router;
mod session;

pub use config::{
    ConfigModel, ConfigPatch, ConfigStore, ConfigStoreError, MemoryConfigStore, MockConfig,
    SqliteConfigStore, Volatility, CONFIG_KEY, DEFAULT_SEED, DEFAULT_SERIES_DAYS, DEFAULT_SIZE,
    ENABLED_KEY, MAX_NETWORK_DELAY_MS, MAX_SERIES_DAYS, MAX_SIZE, MIN_SERIES_DAYS, MIN_SIZE,
};
pub use dataset::{
    composite_score, generate, holder_series, price_series, sharpe_ratio, symbol_for_index,
    Competition, CompetitionEntry, Dataset, Holding, Instrument, SyntheticUser,
};
pub use engine::{Intercept, MockEngine};
pub use http::{engine_router, HttpUpstream, ProxyError};
pub use network::{NetworkProfile, NetworkSimulator};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_mode_selected, LogFormat, LoggingConfig,
    LoggingInitError, ServerSettings, SettingsError, DEFAULT_ADDR, DEFAULT_STORE_PATH,
    DEFAULT_UPSTREAM_TIMEOUT_MS, ENV_ENABLED,
};
pub use prng::{hex_token, log_uniform, signed, Prng};
pub use router::{
    compare_instruments, route, select_page, sort_number, Endpoint, ListQuery, MockRequest,
    MockResponse, Page, RouteContext, SortDir, SortKey, SortValue, API_PREFIX,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use session::{
    is_hex_of_len, nostr_event_id, Challenge, ProfileError, ProfileUpdate, Session,
    SessionUser, VerifyError,
};
