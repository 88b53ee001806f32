use std::sync::{Mutex, PoisonError};

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::fetch_token;
use crate::config::ResolvedConfig;
use crate::domain::{Category, Reference, ReferenceId, RegisteredItem, SavedProject};
use crate::error::{IngestError, Stage};
use crate::project::ProjectRequest;
use crate::registration::RegistrationRequest;

pub const ERROR_STATUS: &str = "ERROR";

/// Remote registration service. Every call blocks until its response has
/// been decoded.
pub trait RegistryClient: Send + Sync {
    fn load_reference(&self, id: ReferenceId) -> Result<Reference, IngestError>;
    fn register(
        &self,
        category: Category,
        request: &RegistrationRequest,
    ) -> Result<RegisteredItem, IngestError>;
    fn save_project(&self, request: &ProjectRequest) -> Result<SavedProject, IngestError>;
    fn delete(&self, category: Category, id: u64) -> Result<(), IngestError>;
}

/// `{status, message, payload}` wrapper around every service response.
#[derive(Debug, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

impl ResponseEnvelope {
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some(ERROR_STATUS)
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Decodes a response body into its payload.
///
/// An `ERROR` status is a rejection carrying the server message verbatim;
/// a success without a payload is a protocol error.
pub fn decode_payload<T: DeserializeOwned>(
    stage: Stage,
    http_status: u16,
    body: &str,
) -> Result<T, IngestError> {
    let envelope = parse_envelope(stage, http_status, body)?;
    let payload = match envelope.payload {
        Some(Value::Null) | None => {
            return Err(IngestError::RemoteProtocol {
                stage,
                message: envelope
                    .message
                    .unwrap_or_else(|| "missing payload".to_string()),
            });
        }
        Some(payload) => payload,
    };
    serde_json::from_value(payload).map_err(|err| IngestError::RemoteProtocol {
        stage,
        message: format!("malformed payload: {err}"),
    })
}

/// Checks a response that carries no payload of interest.
pub fn check_status(stage: Stage, http_status: u16, body: &str) -> Result<(), IngestError> {
    if body.trim().is_empty() && is_success(http_status) {
        return Ok(());
    }
    parse_envelope(stage, http_status, body).map(|_| ())
}

fn parse_envelope(
    stage: Stage,
    http_status: u16,
    body: &str,
) -> Result<ResponseEnvelope, IngestError> {
    let envelope = match serde_json::from_str::<ResponseEnvelope>(body) {
        Ok(envelope) => envelope,
        Err(err) if is_success(http_status) => {
            return Err(IngestError::RemoteProtocol {
                stage,
                message: format!("invalid JSON response: {err}"),
            });
        }
        Err(_) => {
            return Err(IngestError::HttpStatus {
                stage,
                status: http_status,
                message: body.to_string(),
            });
        }
    };
    if envelope.is_error() {
        return Err(IngestError::RemoteRejected {
            stage,
            message: envelope.message_or("request failed"),
        });
    }
    if !is_success(http_status) {
        return Err(IngestError::HttpStatus {
            stage,
            status: http_status,
            message: envelope.message_or(body),
        });
    }
    Ok(envelope)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub struct RegistryHttpClient {
    client: Client,
    config: ResolvedConfig,
    token: Mutex<Option<String>>,
}

impl RegistryHttpClient {
    pub fn new(config: ResolvedConfig) -> Result<Self, IngestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("biodata-ingest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| IngestError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|err| IngestError::InvalidConfig(err.to_string()))?;

        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn send(&self, stage: Stage, request: RequestBuilder) -> Result<(u16, String), IngestError> {
        let request = self.authorize(request, false)?;
        let response = request.send().map_err(|err| IngestError::Http {
            stage,
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| IngestError::Http {
            stage,
            message: err.to_string(),
        })?;
        tracing::debug!("{stage} response status={status}");
        Ok((status, body))
    }

    /// Attaches a bearer token when credentials are configured. With
    /// `required`, missing credentials are an error.
    fn authorize(
        &self,
        request: RequestBuilder,
        required: bool,
    ) -> Result<RequestBuilder, IngestError> {
        match &self.config.credentials {
            Some(_) => Ok(request.bearer_auth(self.bearer_token()?)),
            None if required => Err(IngestError::MissingCredentials),
            None => Ok(request),
        }
    }

    fn bearer_token(&self) -> Result<String, IngestError> {
        let mut guard = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let credentials = self
            .config
            .credentials
            .as_ref()
            .ok_or(IngestError::MissingCredentials)?;
        tracing::debug!("requesting token for {}", credentials.username);
        let token = fetch_token(&self.client, &self.config.token_endpoint(), credentials)?;
        *guard = Some(token.clone());
        Ok(token)
    }
}

impl RegistryClient for RegistryHttpClient {
    fn load_reference(&self, id: ReferenceId) -> Result<Reference, IngestError> {
        let url = self.config.reference_endpoint(id);
        let (status, body) = self.send(Stage::ReferenceLookup, self.client.get(&url))?;
        decode_payload(Stage::ReferenceLookup, status, &body)
    }

    fn register(
        &self,
        category: Category,
        request: &RegistrationRequest,
    ) -> Result<RegisteredItem, IngestError> {
        let url = self
            .config
            .registration_endpoint(category.endpoint_segment()?);
        let (status, body) = self.send(Stage::Registration, self.client.post(&url).json(request))?;
        decode_payload(Stage::Registration, status, &body)
    }

    fn save_project(&self, request: &ProjectRequest) -> Result<SavedProject, IngestError> {
        let url = self.config.project_endpoint();
        let mut builder = self.client.post(&url).json(request);
        if let Some(parent_id) = request.parent_id {
            builder = builder.query(&[("parentId", parent_id)]);
        }
        let (status, body) = self.send(Stage::ProjectSave, builder)?;
        decode_payload(Stage::ProjectSave, status, &body)
    }

    fn delete(&self, category: Category, id: u64) -> Result<(), IngestError> {
        let id_field = category.id_field()?;
        let url = self.config.delete_endpoint(category.as_str());
        let builder = self.client.delete(&url).query(&[(id_field, id)]);
        let builder = self.authorize(builder, true)?;
        let response = builder.send().map_err(|err| IngestError::Http {
            stage: Stage::Delete,
            message: err.to_string(),
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| IngestError::Http {
            stage: Stage::Delete,
            message: err.to_string(),
        })?;
        check_status(Stage::Delete, status, &body)
    }
}
