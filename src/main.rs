use bursar::config::{BursarConfig, LoggingConfig, StoreBackend};
use bursar::http::BursarService;
use bursar::migration::{startup_migrations, Migrator};
use bursar::state::AppState;
use bursar::store::{MemoryStore, PgStore, Store};
use may_minihttp::HttpServer;
use std::error::Error;
use std::sync::Arc;

const MIGRATION_LOCK_TIMEOUT_SECS: u64 = 60;

#[cfg(feature = "tracing")]
fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(not(feature = "tracing"))]
fn init_logging(_config: &LoggingConfig) {}

fn open_store(config: &BursarConfig) -> Result<Arc<dyn Store>, Box<dyn Error>> {
    match config.database.backend {
        StoreBackend::Memory => {
            log::warn!("using the in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.database.url)?;
            startup_migrations(
                store.executor(),
                &Migrator::bundled(),
                Some(MIGRATION_LOCK_TIMEOUT_SECS),
            )?;
            Ok(Arc::new(store))
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = BursarConfig::load()?;
    init_logging(&config.logging);

    if config.server.workers > 0 {
        may::config().set_workers(config.server.workers);
    }

    let store = open_store(&config)?;
    let state = AppState::with_store(store, &config);
    if let Some(admin) = &config.auth.bootstrap_admin {
        state.auth.ensure_admin(admin)?;
    }

    let backend = state.store.backend_name();
    let server = HttpServer(BursarService::new(state)).start(&config.server.bind)?;
    log::info!("bursar listening on http://{} ({backend} backend)", config.server.bind);
    server
        .join()
        .map_err(|e| format!("server stopped abnormally: {e:?}"))?;
    Ok(())
}
