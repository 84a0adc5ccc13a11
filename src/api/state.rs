use std::sync::Arc;

use crate::config::Config;
use crate::ingest::IngestService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ingest: Arc<IngestService>,
}

impl AppState {
    pub fn new(config: Config, ingest: IngestService) -> Self {
        Self {
            config: Arc::new(config),
            ingest: Arc::new(ingest),
        }
    }
}
