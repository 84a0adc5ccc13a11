//! In-process container runtime for development and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use super::{ContainerRuntime, RuntimeError, WorkerSpec, WorkerStatus};

/// Simulated runtime: containers live in a map and start instantly.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    containers: Mutex<HashMap<String, WorkerStatus>>,
    status_calls: AtomicUsize,
    launches: AtomicUsize,
    resumes: AtomicUsize,
    launch_delay: Option<Duration>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container in the given state
    pub fn with_container(self, name: &str, status: WorkerStatus) -> Self {
        self.set(name, status);
        self
    }

    /// Make each launch take this long before it is acknowledged
    pub fn with_launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = Some(delay);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Start requests of either kind
    pub fn start_requests(&self) -> usize {
        self.launches() + self.resumes()
    }

    pub fn current(&self, name: &str) -> WorkerStatus {
        self.lock()
            .get(name)
            .cloned()
            .unwrap_or(WorkerStatus::NotFound)
    }

    fn set(&self, name: &str, status: WorkerStatus) {
        self.lock().insert(name.to_string(), status);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, WorkerStatus>> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn status(&self, name: &str) -> Result<WorkerStatus, RuntimeError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.current(name))
    }

    async fn launch(&self, spec: &WorkerSpec) -> Result<String, RuntimeError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.launch_delay {
            tokio::time::sleep(delay).await;
        }

        let mut containers = self.lock();
        if containers.contains_key(&spec.name) {
            return Err(RuntimeError::Api(format!(
                "409: container name \"{}\" is already in use",
                spec.name
            )));
        }
        containers.insert(spec.name.clone(), WorkerStatus::Running);

        Ok(Uuid::new_v4().simple().to_string())
    }

    async fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);

        let mut containers = self.lock();
        match containers.get_mut(name) {
            Some(status) => {
                *status = WorkerStatus::Running;
                Ok(())
            }
            None => Err(RuntimeError::Api(format!("404: no such container: {name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            image: format!("thoth/{name}:latest"),
            binds: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_launch_then_running() {
        let runtime = InMemoryRuntime::new();
        assert_eq!(runtime.status("nlp").await.unwrap(), WorkerStatus::NotFound);

        runtime.launch(&spec("nlp")).await.unwrap();
        assert_eq!(runtime.status("nlp").await.unwrap(), WorkerStatus::Running);
        assert_eq!(runtime.launches(), 1);
    }

    #[tokio::test]
    async fn test_launch_conflict() {
        let runtime = InMemoryRuntime::new().with_container("nlp", WorkerStatus::Stopped("exited".into()));

        assert!(matches!(
            runtime.launch(&spec("nlp")).await,
            Err(RuntimeError::Api(_))
        ));
        runtime.resume("nlp").await.unwrap();
        assert_eq!(runtime.current("nlp"), WorkerStatus::Running);
        assert_eq!(runtime.start_requests(), 2);
    }
}
