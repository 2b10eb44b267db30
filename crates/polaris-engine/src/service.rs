use std::sync::Arc;

use polaris_store::{InMemoryMetaStore, MetaStore};

use crate::access::{AccessManager, AllowAll};
use crate::batch::BatchProcessor;
use crate::config::EngineConfig;
use crate::engine::TransformEngine;
use crate::location::LocationLedger;
use crate::log::TransformLog;

/// Every Polaris component wired to one metadata store and one access
/// manager.
#[derive(Clone, Debug)]
pub struct Polaris {
    engine: TransformEngine,
    batches: BatchProcessor,
    log: TransformLog,
    locations: LocationLedger,
    config: EngineConfig,
}

impl Polaris {
    pub fn new(
        store: Arc<dyn MetaStore>,
        access: Arc<dyn AccessManager>,
        config: EngineConfig,
    ) -> Self {
        let engine = TransformEngine::new(store.clone(), access.clone());
        Self {
            batches: BatchProcessor::new(engine.clone(), config.max_batch_operations),
            log: TransformLog::new(store.clone(), access.clone(), config.max_transform_batch),
            locations: LocationLedger::new(store, access, config.max_batch_operations),
            engine,
            config,
        }
    }

    /// In-memory store that lets every device do everything.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryMetaStore::new()), Arc::new(AllowAll), config)
    }

    pub fn engine(&self) -> &TransformEngine {
        &self.engine
    }

    pub fn batches(&self) -> &BatchProcessor {
        &self.batches
    }

    pub fn log(&self) -> &TransformLog {
        &self.log
    }

    pub fn locations(&self) -> &LocationLedger {
        &self.locations
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
