//! Service graph shared by every request.

use crate::auth::AuthService;
use crate::certificates::CertificateRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::BursarConfig;
use crate::directory::Directory;
use crate::fees::FeeSchedules;
use crate::ledger::Ledger;
use crate::reconciliation::Reconciler;
use crate::report::{DocumentRenderer, PdfRenderer};
use crate::store::{MemoryStore, Store};
use std::sync::Arc;

/// One instance per process, cloned into each HTTP worker.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub auth: Arc<AuthService>,
    pub directory: Arc<Directory>,
    pub fees: Arc<FeeSchedules>,
    pub ledger: Arc<Ledger>,
    pub reconciler: Arc<Reconciler>,
    pub certificates: Arc<CertificateRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        renderer: Arc<dyn DocumentRenderer>,
        config: &BursarConfig,
    ) -> Self {
        Self {
            auth: Arc::new(AuthService::new(store.clone(), clock.clone(), &config.auth)),
            directory: Arc::new(Directory::new(store.clone(), clock.clone())),
            fees: Arc::new(FeeSchedules::new(store.clone(), clock.clone())),
            ledger: Arc::new(Ledger::new(
                store.clone(),
                clock.clone(),
                &config.identifiers,
                &config.ledger,
            )),
            reconciler: Arc::new(Reconciler::new(store.clone(), &config.reconciliation)),
            certificates: Arc::new(CertificateRegistry::new(
                store.clone(),
                clock,
                renderer.clone(),
                &config.identifiers,
                &config.ledger,
            )),
            store,
            renderer,
        }
    }

    /// Wire the built-in PDF renderer and the system clock around `store`.
    pub fn with_store(store: Arc<dyn Store>, config: &BursarConfig) -> Self {
        let renderer = Arc::new(PdfRenderer::new(config.school.clone()));
        Self::new(store, Arc::new(SystemClock), renderer, config)
    }

    /// Everything in process memory.
    pub fn in_memory(config: &BursarConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }
}
