//! vCenter adapter over the vSphere Automation REST API.
//!
//! `VsphereSessions` implements `SessionProvider`; each session owns a
//! `VsphereConnection` that implements the platform ports. Long-running
//! operations (clone, power off, delete) are spawned onto the runtime and
//! handed back as join handles, so `await_task` can bound and abort them.

use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::application::ports::{
    CloneRequest, ObjectResolver, Session, SessionProvider, TaskWaiter, VmOperations,
};
use crate::domain::config::VsphereConfig;
use crate::domain::session::generate_session_id;
use crate::domain::{ObjectKind, ObjectRef, VmError, VmRef};

/// Header carrying the API session token.
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Transport-level failures talking to vCenter.
#[derive(Debug, Error)]
pub enum VsphereError {
    #[error("vCenter rejected the credentials for {host}")]
    Unauthorized { host: String },

    #[error("{method} {path} returned {status}: {body}")]
    Http {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("unexpected response from {path}: {detail}")]
    UnexpectedResponse { path: String, detail: String },

    #[error("request to vCenter failed: {0}")]
    Transport(#[from] reqwest::Error),
}

// ── REST client ───────────────────────────────────────────────────────────────

/// Authenticated REST client. Cheap to clone; clones share the HTTP pool and
/// the session token.
#[derive(Clone)]
pub struct VsphereClient {
    http: Client,
    base_url: String,
    token: String,
    request_timeout: Duration,
}

impl VsphereClient {
    /// Open an API session with basic authentication.
    ///
    /// # Errors
    ///
    /// Returns `VsphereError::Unauthorized` for bad credentials, or a
    /// transport/HTTP error if vCenter cannot be reached.
    pub async fn login(config: &VsphereConfig) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .build()
            .map_err(VsphereError::from)?;
        let base_url = base_url(&config.host, config.port);
        let request_timeout = Duration::from_secs(config.request_timeout_secs);

        let response = http
            .post(format!("{base_url}/api/session"))
            .basic_auth(&config.username, Some(&config.password))
            .timeout(request_timeout)
            .send()
            .await
            .map_err(VsphereError::from)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(VsphereError::Unauthorized {
                host: config.host.clone(),
            }
            .into());
        }
        let body = checked_json(Method::POST, "/api/session", response).await?;
        let token = string_value(&body).ok_or_else(|| VsphereError::UnexpectedResponse {
            path: "/api/session".to_string(),
            detail: "no session token".to_string(),
        })?;

        Ok(Self {
            http,
            base_url,
            token,
            request_timeout,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header(SESSION_HEADER, &self.token)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .request(Method::GET, path)
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(VsphereError::from)?;
        checked_json(Method::GET, path, response).await
    }

    /// Look up the single object of `kind` called `name`.
    async fn find(&self, kind: ObjectKind, name: &str) -> Result<Option<String>> {
        let (path, id_field) = collection(kind);
        let mut query = vec![("names", name)];
        if kind == ObjectKind::Folder {
            query.push(("type", "VIRTUAL_MACHINE"));
        }
        let body = self.get_json(path, &query).await?;
        Ok(first_id(&body, id_field))
    }

    async fn clone_vm(&self, body: Value) -> Result<VmRef> {
        let path = "/api/vcenter/vm";
        let response = self
            .request(Method::POST, path)
            .query(&[("action", "clone")])
            .json(&body)
            .send()
            .await
            .map_err(VsphereError::from)?;
        let value = checked_json(Method::POST, path, response).await?;
        string_value(&value).map(VmRef).ok_or_else(|| {
            VsphereError::UnexpectedResponse {
                path: path.to_string(),
                detail: "clone returned no VM identifier".to_string(),
            }
            .into()
        })
    }

    async fn power_off(&self, vm: &VmRef) -> Result<()> {
        let path = format!("/api/vcenter/vm/{}/power", vm.0);
        let response = self
            .request(Method::POST, &path)
            .query(&[("action", "stop")])
            .send()
            .await
            .map_err(VsphereError::from)?;
        if response.status() != StatusCode::BAD_REQUEST {
            return checked(Method::POST, &path, response).await.map(drop);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if already_in_desired_state(&body) {
            return Ok(());
        }
        Err(VsphereError::Http {
            method: Method::POST,
            path,
            status,
            body,
        }
        .into())
    }

    async fn delete(&self, vm: &VmRef) -> Result<()> {
        let path = format!("/api/vcenter/vm/{}", vm.0);
        let response = self
            .request(Method::DELETE, &path)
            .send()
            .await
            .map_err(VsphereError::from)?;
        checked(Method::DELETE, &path, response).await.map(drop)
    }
}

fn base_url(host: &str, port: u16) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{host}:{port}")
    } else {
        format!("https://{host}:{port}")
    }
}

/// Collection path and identifier field for each lookup kind.
fn collection(kind: ObjectKind) -> (&'static str, &'static str) {
    match kind {
        ObjectKind::Datacenter => ("/api/vcenter/datacenter", "datacenter"),
        ObjectKind::Datastore => ("/api/vcenter/datastore", "datastore"),
        ObjectKind::ResourcePool => ("/api/vcenter/resource-pool", "resource_pool"),
        ObjectKind::Folder => ("/api/vcenter/folder", "folder"),
        ObjectKind::VirtualMachineTemplate => ("/api/vcenter/vm", "vm"),
    }
}

async fn checked(
    method: Method,
    path: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VsphereError::Http {
        method,
        path: path.to_string(),
        status,
        body,
    }
    .into())
}

async fn checked_json(method: Method, path: &str, response: reqwest::Response) -> Result<Value> {
    let response = checked(method, path, response).await?;
    Ok(response.json().await.map_err(VsphereError::from)?)
}

/// Whether an error body says the VM is already in the requested state,
/// in either the current (`error_type`) or legacy (`type`) error shape.
fn already_in_desired_state(body: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return false;
    };
    value.get("error_type").and_then(Value::as_str) == Some("ALREADY_IN_DESIRED_STATE")
        || value
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.ends_with("already_in_desired_state"))
}

/// Accept both the bare `"id"` form and the legacy `{"value": "id"}` wrapper.
fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// First identifier in a list response, tolerating the legacy wrapper.
fn first_id(body: &Value, id_field: &str) -> Option<String> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => map.get("value")?.as_array()?,
        _ => return None,
    };
    items
        .first()?
        .get(id_field)?
        .as_str()
        .map(str::to_string)
}

/// Guest IP from a `guest/identity` response; empty strings mean "not yet".
fn guest_ip(body: &Value) -> Option<String> {
    let identity = body.get("value").unwrap_or(body);
    identity
        .get("ip_address")
        .and_then(Value::as_str)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn clone_body(request: &CloneRequest<'_>) -> Value {
    json!({
        "name": request.name,
        "source": request.template.id,
        "placement": {
            "folder": request.folder.id,
            "resource_pool": request.resource_pool.id,
            "datastore": request.datastore.id,
        },
        "power_on": request.power_on,
    })
}

// ── Sessions and connections ──────────────────────────────────────────────────

/// `SessionProvider` that logs in to vCenter once per session.
pub struct VsphereSessions {
    config: VsphereConfig,
}

impl VsphereSessions {
    #[must_use]
    pub fn new(config: VsphereConfig) -> Self {
        Self { config }
    }
}

impl SessionProvider for VsphereSessions {
    type Connection = VsphereConnection;

    async fn connect(&self) -> Result<Session<VsphereConnection>> {
        let client = VsphereClient::login(&self.config).await?;
        Ok(Session {
            id: generate_session_id(),
            connection: VsphereConnection { client },
        })
    }
}

/// Platform ports over one authenticated API session.
pub struct VsphereConnection {
    client: VsphereClient,
}

impl ObjectResolver for VsphereConnection {
    async fn resolve(&self, kind: ObjectKind, name: &str) -> Result<ObjectRef> {
        match self.client.find(kind, name).await? {
            Some(id) => Ok(ObjectRef::new(kind, id)),
            None => Err(VmError::ObjectNotFound {
                kind,
                name: name.to_string(),
            }
            .into()),
        }
    }

    async fn default_vm_folder(&self, datacenter: &ObjectRef) -> Result<ObjectRef> {
        let body = self
            .client
            .get_json(
                "/api/vcenter/folder",
                &[
                    ("datacenters", datacenter.id.as_str()),
                    ("names", "vm"),
                    ("type", "VIRTUAL_MACHINE"),
                ],
            )
            .await?;
        first_id(&body, "folder")
            .map(|id| ObjectRef::new(ObjectKind::Folder, id))
            .ok_or_else(|| {
                VmError::ObjectNotFound {
                    kind: ObjectKind::Folder,
                    name: format!("vm (in {})", datacenter.id),
                }
                .into()
            })
    }
}

impl VmOperations for VsphereConnection {
    type Task = JoinHandle<Result<Option<VmRef>>>;

    async fn submit_clone(&self, request: &CloneRequest<'_>) -> Result<Self::Task> {
        anyhow::ensure!(
            !request.as_template,
            "cloning into a template is not supported over the REST API"
        );
        let client = self.client.clone();
        let body = clone_body(request);
        Ok(tokio::spawn(async move { client.clone_vm(body).await.map(Some) }))
    }

    async fn submit_power_off(&self, vm: &VmRef) -> Result<Self::Task> {
        let client = self.client.clone();
        let vm = vm.clone();
        Ok(tokio::spawn(async move {
            client.power_off(&vm).await.map(|()| None)
        }))
    }

    async fn submit_destroy(&self, vm: &VmRef) -> Result<Self::Task> {
        let client = self.client.clone();
        let vm = vm.clone();
        Ok(tokio::spawn(async move {
            client.delete(&vm).await.map(|()| None)
        }))
    }

    async fn guest_ip_address(&self, vm: &VmRef) -> Result<Option<String>> {
        let path = format!("/api/vcenter/vm/{}/guest/identity", vm.0);
        let response = self
            .client
            .request(Method::GET, &path)
            .timeout(self.client.request_timeout)
            .send()
            .await
            .map_err(VsphereError::from)?;
        // Tools not running yet, or no identity reported.
        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::SERVICE_UNAVAILABLE
        ) {
            return Ok(None);
        }
        let body = checked_json(Method::GET, &path, response).await?;
        Ok(guest_ip(&body))
    }
}

impl TaskWaiter for VsphereConnection {
    async fn await_task(
        &self,
        mut task: Self::Task,
        description: &str,
        timeout: Duration,
    ) -> Result<Option<VmRef>> {
        let failed = |reason: String| VmError::TaskFailed {
            description: description.to_string(),
            reason,
        };
        match tokio::time::timeout(timeout, &mut task).await {
            Err(_) => {
                task.abort();
                Err(VmError::TaskTimeout {
                    description: description.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
                .into())
            }
            Ok(Err(join_error)) => Err(failed(join_error.to_string()).into()),
            Ok(Ok(Err(err))) => Err(failed(format!("{err:#}")).into()),
            Ok(Ok(Ok(vm))) => Ok(vm),
        }
    }
}
