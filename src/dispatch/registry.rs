use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::classify::Category;
use crate::config::WorkersConfig;
use crate::runtime::WorkerSpec;

/// How the engine came to know about a running worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleOrigin {
    /// Created and started by this process
    Launched,
    /// Existed stopped and was started by this process
    Resumed,
    /// Found already running
    Discovered,
}

/// Tracked worker container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerHandle {
    pub name: String,
    pub container_id: Option<String>,
    pub origin: HandleOrigin,
    pub since: DateTime<Utc>,
}

impl WorkerHandle {
    pub fn new(name: impl Into<String>, container_id: Option<String>, origin: HandleOrigin) -> Self {
        Self {
            name: name.into(),
            container_id,
            origin,
            since: Utc::now(),
        }
    }
}

pub(crate) struct Slot {
    pub(crate) spec: WorkerSpec,
    /// Held for the whole check-then-start so callers for one category
    /// never race each other
    pub(crate) handle: Mutex<Option<WorkerHandle>>,
}

/// Category → worker mapping, fixed at startup
///
/// Slots exist for every category that has a worker; handles fill in
/// lazily and are never removed.
pub struct WorkerRegistry {
    slots: BTreeMap<Category, Slot>,
}

impl WorkerRegistry {
    pub fn new(specs: impl IntoIterator<Item = (Category, WorkerSpec)>) -> Self {
        let slots = specs
            .into_iter()
            .filter(|(category, _)| category.has_worker())
            .map(|(category, spec)| {
                (
                    category,
                    Slot {
                        spec,
                        handle: Mutex::new(None),
                    },
                )
            })
            .collect();

        Self { slots }
    }

    pub fn from_config(workers: &WorkersConfig) -> Self {
        Self::new(
            workers
                .iter()
                .map(|(category, worker)| (category, WorkerSpec::from(worker))),
        )
    }

    pub fn spec(&self, category: Category) -> Option<&WorkerSpec> {
        self.slots.get(&category).map(|slot| &slot.spec)
    }

    pub(crate) fn slot(&self, category: Category) -> Option<&Slot> {
        self.slots.get(&category)
    }

    /// Last known handle for a category, if any
    pub async fn handle(&self, category: Category) -> Option<WorkerHandle> {
        let slot = self.slots.get(&category)?;
        slot.handle.lock().await.clone()
    }

    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.slots.keys().copied()
    }
}
