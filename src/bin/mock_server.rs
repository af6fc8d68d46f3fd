use std::sync::Arc;

use arena_mock::{
    engine_router, init_logging, log_app_bind, log_app_start, log_mode_selected, ConfigStore,
    MockEngine, ServerSettings, SqliteConfigStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = ServerSettings::from_env()?;
    init_logging(&settings.logging)?;
    log_app_start(&settings);

    let store: Arc<dyn ConfigStore> = Arc::new(SqliteConfigStore::open(&settings.store_path)?);
    let engine = Arc::new(MockEngine::new(store));
    if let Some(enabled) = settings.forced_enabled {
        engine.set_enabled(enabled);
    }
    log_mode_selected(engine.is_enabled(), &settings);

    let app = engine_router(engine, settings.upstream()?);
    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
