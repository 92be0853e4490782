//! Blocking REST client for an InvenTree-style server.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use invsync_core::{EntityKind, RemoteId};

use crate::api::{Payload, Query, RemoteApi, RemoteObject};
use crate::error::{FieldErrors, RemoteError};

const DEFAULT_PAGE_SIZE: usize = 100;

/// How the credential is presented in the `Authorization` header.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum AuthScheme {
    #[default]
    Token,
    Bearer,
}

impl AuthScheme {
    pub fn prefix(self) -> &'static str {
        match self {
            AuthScheme::Token => "Token",
            AuthScheme::Bearer => "Bearer",
        }
    }
}

impl core::str::FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(AuthScheme::Token),
            "bearer" => Ok(AuthScheme::Bearer),
            other => Err(format!("unknown auth scheme '{other}' (expected token or bearer)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL ending in `/`.
    pub base_url: String,
    pub token: String,
    pub scheme: AuthScheme,
    /// Bound on each request, connect included.
    pub timeout: Duration,
    pub page_size: usize,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            token: token.into(),
            scheme: AuthScheme::default(),
            timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// [`RemoteApi`] over HTTP. Holds only the credential and the connection pool.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    page_size: usize,
}

impl HttpRemote {
    pub fn new(config: HttpConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("{} {}", config.scheme.prefix(), config.token))
            .map_err(|_| RemoteError::decode("credential contains characters not allowed in a header"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Unreachable {
                url: config.base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url,
            page_size: config.page_size,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}{}", self.base_url, kind.endpoint())
    }

    fn item_url(&self, kind: EntityKind, id: RemoteId) -> String {
        format!("{}{}{}/", self.base_url, kind.endpoint(), id)
    }

    fn send(
        &self,
        request: RequestBuilder,
        url: &str,
        kind: EntityKind,
        id: Option<RemoteId>,
    ) -> Result<Response, RemoteError> {
        let response = request.send().map_err(|e| transport_error(url, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        let err = status_error(kind, id, status, &body);
        warn!(%url, status = status.as_u16(), error = %err, "request rejected");
        Err(err)
    }

    fn json(response: Response, url: &str) -> Result<Value, RemoteError> {
        response
            .json::<Value>()
            .map_err(|e| RemoteError::decode(format!("{url}: {e}")))
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout {
            url: url.to_string(),
        }
    } else {
        RemoteError::Unreachable {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

/// Maps a non-success response onto the error taxonomy.
pub(crate) fn status_error(
    kind: EntityKind,
    id: Option<RemoteId>,
    status: StatusCode,
    body: &str,
) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized {
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => RemoteError::NotFound { kind, id },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RemoteError::Timeout {
            url: format!("{} {}", kind.endpoint(), status.as_u16()),
        },
        StatusCode::CONFLICT => RemoteError::DuplicateKey {
            kind,
            message: body.trim().to_string(),
        },
        StatusCode::BAD_REQUEST => {
            let fields = field_errors(body);
            let uniqueness = fields
                .values()
                .flatten()
                .find(|message| RemoteError::is_uniqueness_message(message));
            match uniqueness {
                Some(message) => RemoteError::DuplicateKey {
                    kind,
                    message: message.clone(),
                },
                None => RemoteError::InvalidPayload { kind, fields },
            }
        }
        other => RemoteError::Server {
            status: other.as_u16(),
            message: body.trim().chars().take(500).collect(),
        },
    }
}

/// Parses a DRF-style error body (`{"field": ["msg", ...], ...}`); anything
/// else lands under `non_field_errors`.
fn field_errors(body: &str) -> FieldErrors {
    let mut fields = FieldErrors::new();
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => {
            for (field, value) in map {
                let messages = match value {
                    Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect(),
                    Value::String(s) => vec![s],
                    other => vec![other.to_string()],
                };
                fields.insert(field, messages);
            }
        }
        _ => {
            fields.insert("non_field_errors".to_string(), vec![body.trim().to_string()]);
        }
    }
    fields
}

impl RemoteApi for HttpRemote {
    fn create(&self, kind: EntityKind, payload: &Payload) -> Result<RemoteId, RemoteError> {
        let url = self.collection_url(kind);
        debug!(%url, %kind, "POST");
        let response = self.send(self.client.post(&url).json(payload), &url, kind, None)?;
        let object = RemoteObject::from_value(Self::json(response, &url)?)?;
        Ok(object.id)
    }

    fn list(&self, kind: EntityKind, query: &Query) -> Result<Vec<RemoteObject>, RemoteError> {
        let url = self.collection_url(kind);
        debug!(%url, %kind, %query, "GET");
        let mut params = query.params();
        params.push(("limit".to_string(), self.page_size.to_string()));
        params.push(("offset".to_string(), "0".to_string()));

        let mut objects = Vec::new();
        let mut request = self.client.get(&url).query(&params);
        let mut page_url = url.clone();
        loop {
            let response = self.send(request, &page_url, kind, None)?;
            let next = match Self::json(response, &page_url)? {
                // Unpaginated servers answer with a bare list.
                Value::Array(items) => {
                    for item in items {
                        objects.push(RemoteObject::from_value(item)?);
                    }
                    None
                }
                Value::Object(mut page) => {
                    let Some(Value::Array(items)) = page.remove("results") else {
                        return Err(RemoteError::decode(format!("{page_url}: page without results")));
                    };
                    for item in items {
                        objects.push(RemoteObject::from_value(item)?);
                    }
                    match page.remove("next") {
                        Some(Value::String(next)) if !next.is_empty() => Some(next),
                        _ => None,
                    }
                }
                _ => return Err(RemoteError::decode(format!("{page_url}: expected list or page"))),
            };
            match next {
                Some(next) => {
                    request = self.client.get(&next);
                    page_url = next;
                }
                None => break,
            }
        }
        Ok(objects)
    }

    fn update(&self, kind: EntityKind, id: RemoteId, payload: &Payload) -> Result<(), RemoteError> {
        let url = self.item_url(kind, id);
        debug!(%url, %kind, %id, "PATCH");
        self.send(self.client.patch(&url).json(payload), &url, kind, Some(id))?;
        Ok(())
    }

    fn delete(&self, kind: EntityKind, id: RemoteId) -> Result<(), RemoteError> {
        let url = self.item_url(kind, id);
        debug!(%url, %kind, %id, "DELETE");
        self.send(self.client.delete(&url), &url, kind, Some(id))?;
        Ok(())
    }
}
