use std::sync::Arc;

use arena_mock::{
    ConfigModel, ConfigPatch, ConfigStore, MockConfig, MockEngine, SqliteConfigStore, Volatility,
    CONFIG_KEY, ENABLED_KEY,
};
use regex::Regex;
use tempfile::{tempdir, NamedTempFile};

fn sqlite_store(path: &std::path::Path) -> Arc<dyn ConfigStore> {
    Arc::new(SqliteConfigStore::open(path).expect("sqlite store should open"))
}

#[test]
fn open_creates_missing_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("state").join("mock.sqlite");

    let store = sqlite_store(&path);
    store.write("probe", "1").unwrap();

    assert!(path.exists());
    assert_eq!(store.read("probe").unwrap().as_deref(), Some("1"));
    assert_eq!(store.read("missing").unwrap(), None);
}

#[test]
fn writes_upsert_existing_keys() {
    let file = NamedTempFile::new().unwrap();
    let store = sqlite_store(file.path());

    store.write(ENABLED_KEY, "true").unwrap();
    store.write(ENABLED_KEY, "false").unwrap();
    assert_eq!(store.read(ENABLED_KEY).unwrap().as_deref(), Some("false"));
}

#[test]
fn applied_config_survives_reopen() {
    let file = NamedTempFile::new().unwrap();

    {
        let mut model = ConfigModel::load(sqlite_store(file.path()));
        model.apply(&ConfigPatch {
            seed: Some(4242),
            volatility: Some(Volatility::Calm),
            network_delay_ms: Some(250),
            ..ConfigPatch::default()
        });
    }

    let reopened = ConfigModel::load(sqlite_store(file.path()));
    let config = reopened.current();
    assert_eq!(config.seed, 4242);
    assert_eq!(config.volatility, Volatility::Calm);
    assert_eq!(config.network_delay_ms, 250);
    assert_eq!(config.size, MockConfig::default().size);
}

#[test]
fn persisted_blob_is_snake_case_json() {
    let file = NamedTempFile::new().unwrap();
    let store = sqlite_store(file.path());
    let mut model = ConfigModel::load(Arc::clone(&store));
    model.apply(&ConfigPatch {
        series_days: Some(30),
        ..ConfigPatch::default()
    });

    let raw = store.read(CONFIG_KEY).unwrap().expect("config should be persisted");
    let field_re = Regex::new(r#""series_days":30"#).unwrap();
    assert!(field_re.is_match(&raw), "unexpected blob {raw}");
    assert!(raw.contains(r#""volatility":"normal""#));
}

#[test]
fn browser_shaped_blob_is_read_leniently() {
    let file = NamedTempFile::new().unwrap();
    let store = sqlite_store(file.path());
    store
        .write(
            CONFIG_KEY,
            r#"{"seed":"77","size":99999,"volatility":"DEGEN","seriesDays":"14","failureRatePercent":"NaN"}"#,
        )
        .unwrap();

    let model = ConfigModel::load(store);
    let config = model.current();
    assert_eq!(config.seed, 77);
    assert_eq!(config.size, 5_000);
    assert_eq!(config.volatility, Volatility::Degen);
    assert_eq!(config.series_days, 14);
    assert_eq!(config.failure_rate_percent, 0.0);
}

#[test]
fn corrupt_blob_falls_back_to_defaults() {
    let file = NamedTempFile::new().unwrap();
    let store = sqlite_store(file.path());
    store.write(CONFIG_KEY, "{not json").unwrap();

    let model = ConfigModel::load(store);
    assert_eq!(model.current(), &MockConfig::default());
}

#[test]
fn engine_restores_mode_and_config_from_sqlite() {
    let file = NamedTempFile::new().unwrap();

    {
        let engine = MockEngine::new(sqlite_store(file.path()));
        engine.set_enabled(true);
        engine.apply_config(&ConfigPatch {
            size: Some(25),
            ..ConfigPatch::default()
        });
    }

    let engine = MockEngine::new(sqlite_store(file.path()));
    assert!(engine.is_enabled());
    assert_eq!(engine.config().size, 25);
    assert_eq!(engine.dataset().instruments.len(), 25);
}
