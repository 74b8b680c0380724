//! HTTP client for the PVZ API under test.
//!
//! [`PvzClient`] wraps a shared [`reqwest::Client`] and exposes one method per
//! endpoint. Every call returns a [`RequestOutcome`] instead of a `Result`:
//! load test iterations never abort on a failed request, they record it and
//! carry on with whatever values they managed to extract.

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::RequestBuilder;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

use crate::loadtest::error::RequestError;

/// Endpoint of the PVZ API. Used to classify request metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// `POST /dummyLogin`
    DummyLogin,
    /// `POST /pvz`
    CreatePvz,
    /// `POST /products`
    AddProduct,
    /// `POST /receptions`
    CreateReception,
    /// `POST /pvz/{pvzId}/delete_last_product`
    DeleteLastProduct,
    /// `POST /pvz/{pvzId}/close_last_reception`
    CloseLastReception,
    /// `GET /pvz`
    ListPvz,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DummyLogin => "POST /dummyLogin",
            Self::CreatePvz => "POST /pvz",
            Self::AddProduct => "POST /products",
            Self::CreateReception => "POST /receptions",
            Self::DeleteLastProduct => "POST /pvz/{pvzId}/delete_last_product",
            Self::CloseLastReception => "POST /pvz/{pvzId}/close_last_reception",
            Self::ListPvz => "GET /pvz",
        };
        f.write_str(s)
    }
}

/// Role requested from `/dummyLogin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May create pickup points.
    Moderator,
    /// May run receptions and manage products.
    Employee,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Moderator => f.write_str("moderator"),
            Self::Employee => f.write_str("employee"),
        }
    }
}

#[derive(Serialize)]
struct DummyLoginRequest {
    role: Role,
}

#[derive(Serialize)]
struct CreatePvzRequest<'a> {
    city: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddProductRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pvz_id: Option<&'a str>,
    #[serde(rename = "type")]
    product_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateReceptionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pvz_id: Option<&'a str>,
}

/// A response that made it back from the service, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, or `None` if the body was empty or not JSON.
    pub body: Option<serde_json::Value>,
    /// Raw body text, kept for error reporting.
    pub text: String,
}

impl ApiResponse {
    /// Returns the string value of a top-level JSON field, if present.
    pub fn json_str(&self, field: &str) -> Option<&str> {
        self.body.as_ref()?.get(field)?.as_str()
    }
}

/// Result of one request: the endpoint, how long it took, and either the
/// response or the transport failure that prevented one.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    /// Endpoint that was called.
    pub endpoint: Endpoint,
    /// Wall-clock duration including body download.
    pub duration: Duration,
    /// Response, or the transport-level error.
    pub response: Result<ApiResponse, RequestError>,
}

impl RequestOutcome {
    /// Status code, if a response was received.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().ok().map(|r| r.status)
    }

    /// String field from the JSON body, if a response was received and the
    /// field exists.
    pub fn json_str(&self, field: &str) -> Option<&str> {
        self.response.as_ref().ok()?.json_str(field)
    }

    /// Owned copy of a string field; used to carry values into later steps.
    pub fn extract(&self, field: &str) -> Option<String> {
        self.json_str(field)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    /// Failure classification for metrics: transport errors, and responses
    /// with status 400 or above.
    pub fn failure(&self) -> Option<RequestError> {
        match &self.response {
            Err(err) => Some(err.clone()),
            Ok(resp) if resp.status >= 400 => Some(RequestError::Http {
                status: resp.status,
                body: resp.text.clone(),
            }),
            Ok(_) => None,
        }
    }
}

/// PVZ API client. Cheap to clone; all clones share one connection pool.
#[derive(Debug, Clone)]
pub struct PvzClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl PvzClient {
    /// Creates a client for `base_url` with the given per-request timeout.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /dummyLogin {role}`. Expected 200 with a `token` field.
    pub async fn dummy_login(&self, role: Role) -> RequestOutcome {
        let request = self
            .http
            .post(self.url("/dummyLogin"))
            .json(&DummyLoginRequest { role });
        self.send(Endpoint::DummyLogin, request, None).await
    }

    /// `POST /pvz {city}`. Expected 201 echoing `city` and carrying `id`.
    pub async fn create_pvz(&self, token: Option<&str>, city: &str) -> RequestOutcome {
        let request = self
            .http
            .post(self.url("/pvz"))
            .json(&CreatePvzRequest { city });
        self.send(Endpoint::CreatePvz, request, token).await
    }

    /// `POST /products {pvzId, type}`. Expected 201.
    ///
    /// A missing `pvz_id` is left out of the body rather than sent as null.
    pub async fn add_product(
        &self,
        token: Option<&str>,
        pvz_id: Option<&str>,
        product_type: &str,
    ) -> RequestOutcome {
        let request = self.http.post(self.url("/products")).json(&AddProductRequest {
            pvz_id,
            product_type,
        });
        self.send(Endpoint::AddProduct, request, token).await
    }

    /// `POST /receptions {pvzId}`. Expected 200.
    pub async fn create_reception(&self, token: Option<&str>, pvz_id: Option<&str>) -> RequestOutcome {
        let request = self
            .http
            .post(self.url("/receptions"))
            .json(&CreateReceptionRequest { pvz_id });
        self.send(Endpoint::CreateReception, request, token).await
    }

    /// `POST /pvz/{pvzId}/delete_last_product`. Expected 200.
    pub async fn delete_last_product(
        &self,
        token: Option<&str>,
        pvz_id: Option<&str>,
    ) -> RequestOutcome {
        let path = format!("/pvz/{}/delete_last_product", pvz_id.unwrap_or_default());
        let request = self.http.post(self.url(&path));
        self.send(Endpoint::DeleteLastProduct, request, token).await
    }

    /// `POST /pvz/{pvzId}/close_last_reception`. Expected 200 with a closed status.
    pub async fn close_last_reception(
        &self,
        token: Option<&str>,
        pvz_id: Option<&str>,
    ) -> RequestOutcome {
        let path = format!("/pvz/{}/close_last_reception", pvz_id.unwrap_or_default());
        let request = self.http.post(self.url(&path));
        self.send(Endpoint::CloseLastReception, request, token).await
    }

    /// `GET /pvz?page=&limit=`. Expected 200.
    pub async fn list_pvz(&self, token: Option<&str>, page: u32, limit: u32) -> RequestOutcome {
        let request = self
            .http
            .get(self.url("/pvz"))
            .query(&[("page", page), ("limit", limit)]);
        self.send(Endpoint::ListPvz, request, token).await
    }

    /// Attach common headers, send, and time the full exchange.
    ///
    /// The `Authorization` header is only sent when a token is present; a
    /// missing token makes the service reject the call, which the caller's
    /// check then records.
    async fn send(
        &self,
        endpoint: Endpoint,
        request: RequestBuilder,
        token: Option<&str>,
    ) -> RequestOutcome {
        let mut request = request.timeout(self.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let sent = match request.build() {
            Ok(mut req) => {
                // `.json()` already set it for requests with a body.
                req.headers_mut()
                    .entry(CONTENT_TYPE)
                    .or_insert(HeaderValue::from_static("application/json"));
                self.http.execute(req).await
            },
            Err(err) => Err(err),
        };
        let response = match sent {
            Ok(resp) => {
                let status = resp.status().as_u16();
                match resp.text().await {
                    Ok(text) => Ok(ApiResponse {
                        status,
                        body: serde_json::from_str(&text).ok(),
                        text,
                    }),
                    Err(err) => Err(RequestError::classify_reqwest(&err)),
                }
            },
            Err(err) => Err(RequestError::classify_reqwest(&err)),
        };
        let duration = start.elapsed();

        if let Err(ref err) = response {
            tracing::debug!(%endpoint, error = %err, "request failed");
        }

        RequestOutcome {
            endpoint,
            duration,
            response,
        }
    }
}
