use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::config::Config;
use crate::errors::{ClientError, Result};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::storage::{KeyValueStore, TOKEN_KEY};

const FALLBACK_ERROR: &str = "API request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// REST client for the backend. Used by every store to talk to the API.
///
/// Each call is a single attempt: no retry, no timeout, no backoff.
pub struct ApiClient {
    http: reqwest::Client,
    /// API base, e.g. `https://api.downloadcomment.com/api/v1`.
    base_url: String,
    storage: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    /// Whether failed calls also raise a notice on their own.
    notify_errors: bool,
}

impl ApiClient {
    /// Creates a new API client.
    pub fn new(config: &Config, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.api_base(),
            storage,
            notifier: Arc::new(TracingNotifier),
            notify_errors: false,
        }
    }

    /// Shows a failure notice for every API error, in addition to returning it.
    pub fn with_error_notices(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self.notify_errors = true;
        self
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<T, ()>(Method::Get, path, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request(Method::Post, path, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request(Method::Put, path, Some(body)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.request(Method::Patch, path, Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<T, ()>(Method::Delete, path, None).await
    }

    /// GET with query parameters, encoded from any serializable value.
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<T> {
        let (path, request) = self.prepare(Method::Get, path).await?;
        self.execute(Method::Get, &path, request.query(query)).await
    }

    /// Query an endpoint of the backend and unwrap its `{ "data": T }` envelope.
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let (path, mut request) = self.prepare(method, path).await?;

        if let Some(body) = body {
            request = request.json(body);
        }

        self.execute(method, &path, request).await
    }

    async fn prepare(&self, method: Method, path: &str) -> Result<(String, RequestBuilder)> {
        // Append a / to path if it does not start with one
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method.into(), &url);

        if let Some(token) = self.storage.get(TOKEN_KEY).await? {
            request = request.bearer_auth(token);
        }

        Ok((path, request))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        debug!("{:?} {}", method, path);

        let response = request.send().await.map_err(|err| {
            error!("Request to {} failed: {}", path, err);
            ClientError::RequestFailed
        })?;

        let status = response.status();
        let text = response.text().await.or(Err(ClientError::FailedToDecode))?;

        // Parse body into JSON
        let json: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(json) => json,
                Err(_) if !status.is_success() => Value::Null,
                Err(_) => return Err(ClientError::FailedToDecode),
            }
        };

        if !status.is_success() {
            return Err(self.api_error(status, path, &json));
        }

        // Extract the actual data object
        let data = match json {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        serde_json::from_value(data).map_err(|err| {
            error!("Unexpected payload from {}: {}", path, err);
            ClientError::FailedToDecode
        })
    }

    fn api_error(&self, status: StatusCode, path: &str, body: &Value) -> ClientError {
        let message = server_message(body).unwrap_or_else(|| FALLBACK_ERROR.to_string());

        error!("{} answered {}: {}", path, status.as_u16(), message);

        if self.notify_errors {
            self.notifier.notify(Notice::failure(message.clone()));
        }

        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// The backend puts a string in `message`, or an array of validation messages.
fn server_message(body: &Value) -> Option<String> {
    match body.get("message")? {
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Array(messages) => messages.first()?.as_str().map(str::to_string),
        _ => None,
    }
}
