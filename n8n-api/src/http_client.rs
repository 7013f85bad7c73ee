//! HttpClient middleware used by `N8nClient`
//!
//! Responsible for
//!  - handling all HTTP api requests
//!  - attaching the api key header
//!  - logging/tracing
//!  - mapping http error codes into `GatewayError`s
//!
//! There are deliberately no retries here: gateway calls are coarse-grained
//! and failures must surface to the operator (see `GatewayError`).

use reqwest::{ClientBuilder, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use snafu::prelude::*;
use tracing::{debug, error, trace};

use crate::{Result, config::N8N_API_KEY_HEADER, prelude::*};

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,

    /// Base URL for API requests including the api prefix,
    /// e.g. "http://localhost:5678/api/v1"
    base_url: String,

    api_key: String,
}

// manual Debug so the api key can't leak into logs
impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub fn new(builder: ClientBuilder, base_url: String, api_key: String) -> Result<Self> {
        let client = builder.build().context(HttpSnafu {
            method: "client-init",
            url: "",
        })?;
        Ok(HttpClient {
            client,
            base_url,
            api_key,
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        self.send(Method::GET, path, query, None).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_vec(body).context(SerializationSnafu)?;
        self.send(Method::POST, path, &[], Some(body)).await
    }

    pub(crate) async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_vec(body).context(SerializationSnafu)?;
        self.send(Method::PUT, path, &[], Some(body)).await
    }

    pub(crate) async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(Method::DELETE, path, &[], None).await
    }

    /// Handles one n8n rest api request (get, post, put, delete):
    /// - attaches the api key header
    /// - maps http error codes into `GatewayError`s
    /// - deserializes the json response body into the return type T
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Vec<u8>>,
    ) -> Result<T> {
        ensure!(
            !self.api_key.is_empty(),
            AuthSnafu {
                message: "api key not set. Provide --api-key or N8N_API_KEY.",
            }
        );
        let full_url = format!("{}{}", self.base_url, path);
        debug!("{method} {full_url}");
        let mut request = self
            .client
            .request(method.clone(), &full_url)
            .query(query)
            .header(N8N_API_KEY_HEADER, &self.api_key);
        if let Some(body) = body {
            log_request_body(&method, &full_url, &body);
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await.context(HttpSnafu {
            method: method.to_string(),
            url: full_url.clone(),
        })?;
        let code = response.status();
        match code {
            ok if ok.is_success() => {
                let data = response.bytes().await.context(HttpSnafu {
                    method: method.to_string(),
                    url: full_url,
                })?;
                log_response(path, &data);
                deserialize_json(&data)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let message = response.text().await.unwrap_or_default();
                Err(GatewayError::Auth {
                    message: format!("({code}) {message}"),
                })
            }
            StatusCode::NOT_FOUND => Err(GatewayError::NotFound {
                obj_type: "workflow".to_string(),
                key: path.to_string(),
            }),
            StatusCode::BAD_REQUEST => {
                let message = response.text().await.unwrap_or("BadRequest".into());
                error!(?code, ?message, %full_url, "http");
                Err(GatewayError::Validation { message })
            }
            other => {
                let message = response.text().await.unwrap_or_default();
                error!(?other, ?message, %full_url, "http");
                Err(GatewayError::Api {
                    code: other.as_u16(),
                    method: method.to_string(),
                    url: full_url,
                    message,
                })
            }
        }
    }
}

// dump request body, for debugging
// requires RUST_LOG=n8n_api::http_json=trace
// don't log headers so we don't leak the api key
fn log_request_body(method: &Method, url: &str, body: &[u8]) {
    if tracing::enabled!(target: "n8n_api::http_json", tracing::Level::TRACE) {
        trace!(target: "n8n_api::http_json", "{method} url={url} body={}",
            String::from_utf8_lossy(body)
        );
    }
}

// dump json response, for debugging
fn log_response(path: &str, body: &[u8]) {
    if tracing::enabled!(target: "n8n_api::http_json", tracing::Level::TRACE) {
        trace!(target: "n8n_api::http_json", "Response path={path} body={}",
            String::from_utf8_lossy(body)
        );
    }
}

// deserialize, reporting errors with 'serde_path_to_error', which provides
// the detailed json path to the error
fn deserialize_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(body);
    match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(value) => Ok(value),
        Err(err) => {
            error!("Deserialization failed at {}: {}", err.path(), err);
            Err(GatewayError::Deserialization {
                path: err.path().to_string(),
                source: err.into_inner(),
            })
        }
    }
}
