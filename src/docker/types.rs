//! Runtime-agnostic container types.
//!
//! The reconciler works with these instead of engine API models. Container
//! configuration is carried as the raw JSON sections returned by `inspect`
//! so a recreated container receives exactly what the old one had.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-network settings that describe configuration rather than state
/// assigned by the daemon (addresses, endpoint ids, gateways).
const ENDPOINT_CONFIG_KEYS: &[&str] = &["IPAMConfig", "Links", "Aliases", "DriverOpts"];

/// One entry from a container listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSummary {
    pub id: String,
    /// Primary name without the leading `/`.
    pub name: String,
    /// Image the container was created from, as the user wrote it.
    pub image: String,
    pub created: DateTime<Utc>,
    pub labels: HashMap<String, String>,
    /// Engine state string (`running`, `exited`, ...).
    pub state: String,
}

impl ContainerSummary {
    /// Build from one element of the engine's container list payload.
    pub fn from_api_value(value: &Value) -> Option<Self> {
        let id = value.get("Id")?.as_str()?.to_string();
        let name = value
            .get("Names")
            .and_then(Value::as_array)
            .and_then(|names| names.first())
            .and_then(Value::as_str)
            .map(trim_name)
            .unwrap_or_default();
        let image = value.get("Image")?.as_str()?.to_string();
        let created = value
            .get("Created")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let labels = value
            .get("Labels")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let state = value
            .get("State")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self {
            id,
            name,
            image,
            created,
            labels,
            state,
        })
    }
}

/// Full runtime configuration captured from `inspect`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    /// The `Config` section (image, cmd, env, labels, ...).
    pub config: Map<String, Value>,
    /// The `HostConfig` section (binds, restart policy, ports, ...).
    pub host_config: Map<String, Value>,
    /// `NetworkSettings.Networks`, keyed by network name.
    pub endpoints: Map<String, Value>,
}

impl ContainerSpec {
    pub fn image(&self) -> Option<&str> {
        self.config.get("Image").and_then(Value::as_str)
    }

    /// Volume binds (`/host:/container[:mode]`).
    pub fn binds(&self) -> Vec<String> {
        self.host_config
            .get("Binds")
            .and_then(Value::as_array)
            .map(|binds| {
                binds
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Engine create payload reproducing this container.
    ///
    /// `image` replaces `Config.Image` when given; every other field is
    /// copied verbatim. Endpoint entries keep only their configuration keys.
    pub fn create_body(&self, image: Option<&str>) -> Map<String, Value> {
        let mut body = self.config.clone();
        if let Some(image) = image {
            body.insert("Image".to_string(), Value::String(image.to_string()));
        }
        if !self.host_config.is_empty() {
            body.insert(
                "HostConfig".to_string(),
                Value::Object(self.host_config.clone()),
            );
        }
        if !self.endpoints.is_empty() {
            let endpoints: Map<String, Value> = self
                .endpoints
                .iter()
                .map(|(network, settings)| (network.clone(), endpoint_config(settings)))
                .collect();
            let mut networking = Map::new();
            networking.insert("EndpointsConfig".to_string(), Value::Object(endpoints));
            body.insert("NetworkingConfig".to_string(), Value::Object(networking));
        }
        body
    }
}

fn endpoint_config(settings: &Value) -> Value {
    let Some(settings) = settings.as_object() else {
        return Value::Object(Map::new());
    };
    let kept: Map<String, Value> = settings
        .iter()
        .filter(|(key, value)| ENDPOINT_CONFIG_KEYS.contains(&key.as_str()) && !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(kept)
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDetails {
    pub id: String,
    /// Name without the leading `/`.
    pub name: String,
    pub created: Option<DateTime<Utc>>,
    /// Engine state string (`running`, `exited`, ...).
    pub state: String,
    pub spec: ContainerSpec,
}

impl ContainerDetails {
    /// Build from the engine's inspect payload.
    pub fn from_inspect_value(value: &Value) -> Result<Self, String> {
        let id = value
            .get("Id")
            .and_then(Value::as_str)
            .ok_or("inspect payload has no Id")?
            .to_string();
        let name = value
            .get("Name")
            .and_then(Value::as_str)
            .map(trim_name)
            .unwrap_or_default();
        let created = value
            .get("Created")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let state = value
            .pointer("/State/Status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let section = |pointer: &str| {
            value
                .pointer(pointer)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        Ok(Self {
            id,
            name,
            created,
            state,
            spec: ContainerSpec {
                config: section("/Config"),
                host_config: section("/HostConfig"),
                endpoints: section("/NetworkSettings/Networks"),
            },
        })
    }

    pub fn is_exited(&self) -> bool {
        self.state == "exited"
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// A container to be created under `name` from an engine payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub body: Map<String, Value>,
}

impl CreateRequest {
    /// Replacement for `details` under the same name with the same configuration.
    pub fn recreate(details: &ContainerDetails, image: Option<&str>) -> Self {
        Self {
            name: details.name.clone(),
            body: details.spec.create_body(image),
        }
    }

    pub fn image(&self) -> Option<&str> {
        self.body.get("Image").and_then(Value::as_str)
    }
}

/// What a prune call reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: usize,
    pub space_reclaimed: u64,
}

fn trim_name(name: &str) -> String {
    name.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inspect_fixture() -> Value {
        json!({
            "Id": "f00dbabe",
            "Name": "/web",
            "Created": "2024-01-05T10:00:00.123456789Z",
            "State": { "Status": "running", "Running": true },
            "Config": {
                "Image": "nginx:latest",
                "Cmd": ["nginx", "-g", "daemon off;"],
                "Env": ["PATH=/usr/bin", "MODE=prod"],
                "Labels": { "tagwatch.enable": "true" }
            },
            "HostConfig": {
                "Binds": ["/srv/www:/usr/share/nginx/html:ro"],
                "RestartPolicy": { "Name": "unless-stopped" },
                "NetworkMode": "frontend"
            },
            "NetworkSettings": {
                "Networks": {
                    "frontend": {
                        "Aliases": ["web"],
                        "IPAMConfig": null,
                        "NetworkID": "net123",
                        "EndpointID": "ep456",
                        "IPAddress": "172.18.0.4",
                        "Gateway": "172.18.0.1"
                    }
                }
            }
        })
    }

    #[test]
    fn summary_from_list_payload() {
        let value = json!({
            "Id": "abc",
            "Names": ["/db"],
            "Image": "postgres:16",
            "Created": 1704067200,
            "Labels": { "tagwatch.enable": "false" },
            "State": "running"
        });
        let summary = ContainerSummary::from_api_value(&value).unwrap();
        assert_eq!(summary.name, "db");
        assert_eq!(summary.image, "postgres:16");
        assert_eq!(summary.created.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert_eq!(summary.labels["tagwatch.enable"], "false");
    }

    #[test]
    fn summary_without_id_is_rejected() {
        assert!(ContainerSummary::from_api_value(&json!({ "Image": "x" })).is_none());
    }

    #[test]
    fn details_capture_sections() {
        let details = ContainerDetails::from_inspect_value(&inspect_fixture()).unwrap();
        assert_eq!(details.id, "f00dbabe");
        assert_eq!(details.name, "web");
        assert!(details.is_running());
        assert_eq!(details.spec.image(), Some("nginx:latest"));
        assert_eq!(details.spec.binds(), vec!["/srv/www:/usr/share/nginx/html:ro"]);
    }

    #[test]
    fn create_body_preserves_config_verbatim() {
        let fixture = inspect_fixture();
        let details = ContainerDetails::from_inspect_value(&fixture).unwrap();
        let request = CreateRequest::recreate(&details, None);

        assert_eq!(request.name, "web");
        assert_eq!(request.body["Cmd"], fixture["Config"]["Cmd"]);
        assert_eq!(request.body["Env"], fixture["Config"]["Env"]);
        assert_eq!(request.body["Labels"], fixture["Config"]["Labels"]);
        assert_eq!(request.body["HostConfig"], fixture["HostConfig"]);
        assert_eq!(request.image(), Some("nginx:latest"));
    }

    #[test]
    fn create_body_strips_daemon_assigned_endpoint_state() {
        let details = ContainerDetails::from_inspect_value(&inspect_fixture()).unwrap();
        let body = details.spec.create_body(Some("library/nginx:latest"));

        let endpoint = &body["NetworkingConfig"]["EndpointsConfig"]["frontend"];
        assert_eq!(endpoint, &json!({ "Aliases": ["web"] }));
        assert_eq!(body["Image"], "library/nginx:latest");
    }

    #[test]
    fn exited_state() {
        let mut fixture = inspect_fixture();
        fixture["State"]["Status"] = json!("exited");
        let details = ContainerDetails::from_inspect_value(&fixture).unwrap();
        assert!(details.is_exited());
    }
}
