//! In-memory engine recording every call.

#![allow(dead_code)]

use async_trait::async_trait;
use cradle::container::{
    ContainerCreateParameters, ContainerError, ContainerMetadata, Engine, Result,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InspectContainer(String),
    Create(String),
    Start(String),
    Stop(String),
    Remove { id: String, force: bool },
    InspectImage(String),
    Pull(String),
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub name: String,
    pub meta: ContainerMetadata,
    pub params: ContainerCreateParameters,
}

#[derive(Default)]
struct State {
    containers: Vec<FakeContainer>,
    images: HashMap<String, String>,
    calls: Vec<Call>,
    next_id: usize,
    fail_stop: bool,
}

#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, reference: &str, id: &str) -> Self {
        self.set_image(reference, id);
        self
    }

    pub fn set_image(&self, reference: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.images.insert(reference.to_string(), id.to_string());
    }

    pub fn fail_stop(&self, fail: bool) {
        self.state.lock().unwrap().fail_stop = fail;
    }

    /// Mark a container as exited, as if its process ended.
    pub fn exit(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(c) = state.containers.iter_mut().find(|c| c.name == name) {
            c.meta.running = false;
            c.meta.status = Some("exited".to_string());
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        let state = self.state.lock().unwrap();
        state.containers.iter().find(|c| c.name == name).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerMetadata>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InspectContainer(name.to_string()));
        Ok(state
            .containers
            .iter()
            .find(|c| c.name == name || c.meta.id == name)
            .map(|c| c.meta.clone()))
    }

    async fn create_container(&self, params: &ContainerCreateParameters) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Create(params.name.clone()));
        if state.containers.iter().any(|c| c.name == params.name) {
            return Err(ContainerError::Other(format!(
                "Conflict. The container name \"/{}\" is already in use",
                params.name
            )));
        }

        state.next_id += 1;
        let id = format!("container-{}", state.next_id);
        state.containers.push(FakeContainer {
            name: params.name.clone(),
            meta: ContainerMetadata {
                id: id.clone(),
                labels: params.config.labels.clone().unwrap_or_default(),
                running: false,
                status: Some("created".to_string()),
            },
            params: params.clone(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Start(id.to_string()));
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.meta.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.meta.running = true;
        container.meta.status = Some("running".to_string());
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Stop(id.to_string()));
        if state.fail_stop {
            return Err(ContainerError::Other("stop timed out".to_string()));
        }
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.meta.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.meta.running = false;
        container.meta.status = Some("exited".to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Remove {
            id: id.to_string(),
            force,
        });
        let before = state.containers.len();
        state.containers.retain(|c| c.meta.id != id);
        if state.containers.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::InspectImage(reference.to_string()));
        Ok(state.images.get(reference).cloned())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Pull(reference.to_string()));
        state
            .images
            .entry(reference.to_string())
            .or_insert_with(|| format!("sha256:pulled-{}", reference));
        Ok(())
    }
}
