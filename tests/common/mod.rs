//! In-memory collaborators for driving the reconciler without a daemon.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tagwatch::docker::{
    ContainerDetails, ContainerRuntime, ContainerSummary, CreateRequest, DockerError, PruneReport,
};
use tagwatch::image::ImageRef;
use tagwatch::reconcile::Services;
use tagwatch::registry::{Registry, RegistryError, TagInfo};
use tagwatch::Notifier;

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

/// Inspect payload shaped like the engine's, with a bind, a restart policy
/// and one user network.
pub fn inspect_payload(id: &str, name: &str, image: &str, state: &str) -> Value {
    json!({
        "Id": id,
        "Name": format!("/{}", name),
        "Created": "2024-01-01T00:00:00Z",
        "State": { "Status": state },
        "Config": {
            "Image": image,
            "Cmd": ["serve", "--port", "8080"],
            "Env": ["MODE=prod", format!("NAME={}", name)],
            "Labels": { "com.example.owner": "ops" },
            "ExposedPorts": { "8080/tcp": {} }
        },
        "HostConfig": {
            "Binds": [format!("/srv/{}:/data", name)],
            "RestartPolicy": { "Name": "unless-stopped", "MaximumRetryCount": 0 },
            "PortBindings": { "8080/tcp": [{ "HostIp": "", "HostPort": "8080" }] },
            "NetworkMode": "backend"
        },
        "NetworkSettings": {
            "Networks": {
                "backend": {
                    "Aliases": [name],
                    "NetworkID": "net-1",
                    "EndpointID": "ep-1",
                    "IPAddress": "172.20.0.5"
                }
            }
        }
    })
}

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerSummary>,
    details: HashMap<String, ContainerDetails>,
    /// Remaining inspects before a container reports `exited`.
    exit_after: HashMap<String, usize>,
    pull_failures: HashSet<String>,
    create_failures: HashSet<String>,
    pulls: Vec<String>,
    creates: Vec<CreateRequest>,
    starts: Vec<String>,
    stops: Vec<String>,
    removes: Vec<String>,
    inspects: usize,
    image_prunes: usize,
    volume_prunes: usize,
}

/// Container runtime double that records every call.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running container in both the listing and inspect views.
    pub fn add_container(
        &self,
        id: &str,
        name: &str,
        image: &str,
        created: DateTime<Utc>,
        labels: &[(&str, &str)],
    ) {
        let mut state = self.state.lock().unwrap();
        state.containers.push(ContainerSummary {
            id: id.to_string(),
            name: name.to_string(),
            image: image.to_string(),
            created,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            state: "running".to_string(),
        });
        let details =
            ContainerDetails::from_inspect_value(&inspect_payload(id, name, image, "running"))
                .unwrap();
        state.details.insert(id.to_string(), details);
    }

    /// Report `exited` once `id` has been inspected `inspects` times.
    pub fn exit_after(&self, id: &str, inspects: usize) {
        self.state
            .lock()
            .unwrap()
            .exit_after
            .insert(id.to_string(), inspects);
    }

    pub fn fail_pull(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .pull_failures
            .insert(reference.to_string());
    }

    pub fn fail_create(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .create_failures
            .insert(name.to_string());
    }

    pub fn allow_create(&self, name: &str) {
        self.state.lock().unwrap().create_failures.remove(name);
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    pub fn creates(&self) -> Vec<CreateRequest> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.state.lock().unwrap().starts.clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.state.lock().unwrap().stops.clone()
    }

    pub fn removes(&self) -> Vec<String> {
        self.state.lock().unwrap().removes.clone()
    }

    pub fn inspects(&self) -> usize {
        self.state.lock().unwrap().inspects
    }

    pub fn image_prunes(&self) -> usize {
        self.state.lock().unwrap().image_prunes
    }

    pub fn volume_prunes(&self) -> usize {
        self.state.lock().unwrap().volume_prunes
    }

    pub fn details(&self, id: &str) -> Option<ContainerDetails> {
        self.state.lock().unwrap().details.get(id).cloned()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>, DockerError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.state == "running")
            .cloned()
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.inspects += 1;
        let exited = match state.exit_after.get_mut(id) {
            Some(0) => true,
            Some(remaining) => {
                *remaining -= 1;
                false
            }
            None => false,
        };
        let mut details = state
            .details
            .get(id)
            .cloned()
            .ok_or_else(|| DockerError::not_found(id))?;
        if exited {
            details.state = "exited".to_string();
        }
        Ok(details)
    }

    async fn pull_image(&self, reference: &str) -> Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(reference.to_string());
        if state.pull_failures.contains(reference) {
            return Err(DockerError::stream("pull", "manifest unknown"));
        }
        Ok(())
    }

    async fn create_container(&self, request: &CreateRequest) -> Result<String, DockerError> {
        let mut state = self.state.lock().unwrap();
        state.creates.push(request.clone());
        if state.create_failures.contains(&request.name) {
            return Err(DockerError::Conflict {
                operation: "create".to_string(),
                message: format!("name {} is already in use", request.name),
            });
        }
        let id = format!("{}-new", request.name);
        let image = request.image().unwrap_or_default().to_string();
        let mut config = request.body.clone();
        let host_config = config.remove("HostConfig").unwrap_or_else(|| json!({}));
        config.remove("NetworkingConfig");
        let labels = config
            .get("Labels")
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let payload = json!({
            "Id": id,
            "Name": format!("/{}", request.name),
            "State": { "Status": "created" },
            "Config": config,
            "HostConfig": host_config
        });
        let details = ContainerDetails::from_inspect_value(&payload)
            .map_err(|e| DockerError::invalid_request("create", e))?;
        state.details.insert(id.clone(), details);
        state.containers.push(ContainerSummary {
            id: id.clone(),
            name: request.name.clone(),
            image,
            created: Utc::now(),
            labels,
            state: "created".to_string(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.starts.push(id.to_string());
        if let Some(container) = state.containers.iter_mut().find(|c| c.id == id) {
            container.state = "running".to_string();
        }
        if let Some(details) = state.details.get_mut(id) {
            details.state = "running".to_string();
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), DockerError> {
        self.state.lock().unwrap().stops.push(id.to_string());
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), DockerError> {
        let mut state = self.state.lock().unwrap();
        state.removes.push(id.to_string());
        state.containers.retain(|c| c.id != id);
        state.details.remove(id);
        Ok(())
    }

    async fn prune_images(&self) -> Result<PruneReport, DockerError> {
        self.state.lock().unwrap().image_prunes += 1;
        Ok(PruneReport {
            deleted: 2,
            space_reclaimed: 1536,
        })
    }

    async fn prune_volumes(&self) -> Result<PruneReport, DockerError> {
        self.state.lock().unwrap().volume_prunes += 1;
        Ok(PruneReport::default())
    }
}

/// Registry double keyed by `image:tag`.
#[derive(Default)]
pub struct FakeRegistry {
    tags: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, reference: &str, last_updated: DateTime<Utc>) {
        let image = ImageRef::parse(reference);
        self.tags
            .lock()
            .unwrap()
            .insert(image.reference(), last_updated);
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn lookup(&self, image: &ImageRef) -> Result<TagInfo, RegistryError> {
        let reference = image.reference();
        self.tags
            .lock()
            .unwrap()
            .get(&reference)
            .map(|last_updated| TagInfo {
                name: image.tag.clone(),
                last_updated: *last_updated,
            })
            .ok_or(RegistryError::NotFound { reference })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> tagwatch::Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Fakes plus the [`Services`] bundle built from them.
pub struct Harness {
    pub runtime: Arc<FakeRuntime>,
    pub registry: Arc<FakeRegistry>,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            runtime: Arc::new(FakeRuntime::new()),
            registry: Arc::new(FakeRegistry::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            runtime: self.runtime.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
