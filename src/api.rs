// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Buzz server API client.
//!
//! Small blocking HTTP client for the Buzz hosting server. Each method maps
//! one endpoint, interprets the response, and converts failures into the
//! [`ApiError`] taxonomy. No method retries on its own; retry policy belongs
//! to callers, and only the device-flow poll loop has one.
//!
//! The server reports failures as JSON documents carrying a `detail` field.
//! Interpretation of status codes is centralized in [`interpret_failure`] so
//! every command surfaces the same taxonomy: 401 means the session is gone
//! and the operator must log in again, 403 is a permission problem that may
//! carry a subdomain-conflict hint, 404 targets a missing resource, and
//! anything else is a plain server error. A request that never reaches the
//! server at all is a connectivity error.

use crate::{
    auth::{DeviceAuthority, DeviceSession, PollStatus},
    config::Settings,
};

use reqwest::{
    blocking::{multipart, Client, RequestBuilder, Response},
    StatusCode,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

/// Custom header carrying an explicitly requested subdomain on deploy.
pub const SUBDOMAIN_HEADER: &str = "x-subdomain";

/// Blocking client for the Buzz server API.
///
/// Holds the base URL and an optional bearer token resolved from the
/// per-invocation [`Settings`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Successful deploy response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployResponse {
    /// Public URL the site is now served from.
    pub url: String,
}

/// One site entry from the site listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteEntry {
    pub name: String,
    pub created: String,
    pub size_bytes: u64,
}

/// Authenticated user identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserInfo {
    pub login: String,
    pub name: Option<String>,
}

/// One deployment token entry from the token listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenEntry {
    pub id: String,
    pub name: String,
    pub site_name: String,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub last_used_at: Option<String>,
}

/// Freshly created deployment token.
///
/// The secret is only ever returned by this one response, so callers must
/// show it to the operator immediately.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedToken {
    pub id: String,
    pub token: String,
    pub name: String,
    pub site_name: String,
}

impl ApiClient {
    /// Construct a client from resolved settings.
    ///
    /// # Errors
    ///
    /// - Return [`ApiError::InvalidServer`] if the server URL is unparsable.
    /// - Return [`ApiError::Connectivity`] if the HTTP client cannot be
    ///   built.
    pub fn new(settings: &Settings) -> Result<Self> {
        reqwest::Url::parse(&settings.server)
            .map_err(|_| ApiError::InvalidServer(settings.server.clone()))?;
        let client = Client::builder()
            .build()
            .map_err(|err| ApiError::Connectivity(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.server.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
        })
    }

    /// Upload a ZIP byte stream as a site deploy.
    ///
    /// Builds a multipart body with exactly one part named `file`, filename
    /// `site.zip`, content type `application/zip`. The multipart boundary is
    /// a fresh random token per call. When `subdomain` is given it rides
    /// along in the `x-subdomain` header, otherwise the server assigns a
    /// random one.
    pub fn deploy(&self, bytes: Vec<u8>, subdomain: Option<&str>) -> Result<DeployResponse> {
        let part = multipart::Part::bytes(bytes)
            .file_name("site.zip")
            .mime_str("application/zip")
            .map_err(|err| ApiError::BadResponse(err.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self
            .authorized(self.client.post(self.endpoint("/deploy")))
            .multipart(form);
        if let Some(subdomain) = subdomain {
            request = request.header(SUBDOMAIN_HEADER, subdomain);
        }

        self.read_json(self.send(request)?)
    }

    /// List sites owned by the authenticated user.
    pub fn list_sites(&self) -> Result<Vec<SiteEntry>> {
        let request = self.authorized(self.client.get(self.endpoint("/sites")));
        self.read_json(self.send(request)?)
    }

    /// Delete a site by subdomain.
    pub fn delete_site(&self, subdomain: &str) -> Result<()> {
        let request = self.authorized(
            self.client
                .delete(self.endpoint(&format!("/sites/{subdomain}"))),
        );
        self.send(request)?;

        Ok(())
    }

    /// Fetch the authenticated user's identity.
    pub fn whoami(&self) -> Result<UserInfo> {
        let request = self.authorized(self.client.get(self.endpoint("/auth/me")));
        self.read_json(self.send(request)?)
    }

    /// Invalidate the current session server-side, best effort.
    ///
    /// Logout must still succeed locally when the server is unreachable or
    /// the session is already gone, so every failure is swallowed.
    pub fn logout(&self) {
        let request = self.authorized(self.client.post(self.endpoint("/auth/logout")));
        if let Err(err) = self.send(request) {
            warn!("server-side logout failed: {err}");
        }
    }

    /// List deployment tokens owned by the authenticated user.
    pub fn list_tokens(&self) -> Result<Vec<TokenEntry>> {
        let request = self.authorized(self.client.get(self.endpoint("/tokens")));
        self.read_json(self.send(request)?)
    }

    /// Create a deployment token scoped to one site.
    pub fn create_token(&self, site_name: &str, name: &str) -> Result<CreatedToken> {
        let request = self
            .authorized(self.client.post(self.endpoint("/tokens")))
            .json(&json!({ "site_name": site_name, "name": name }));
        self.read_json(self.send(request)?)
    }

    /// Delete a deployment token by identifier.
    pub fn delete_token(&self, token_id: &str) -> Result<()> {
        let request = self.authorized(
            self.client
                .delete(self.endpoint(&format!("/tokens/{token_id}"))),
        );
        self.send(request)?;

        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, mapping transport failure and non-2xx statuses into
    /// the error taxonomy.
    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .map_err(|err| ApiError::Connectivity(err.to_string()))?;
        let status = response.status();
        debug!("server responded with {status}");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().unwrap_or_default();
        Err(interpret_failure(status, &body))
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, response: Response) -> Result<T> {
        response
            .json()
            .map_err(|err| ApiError::BadResponse(err.to_string()))
    }
}

impl DeviceAuthority for ApiClient {
    fn start_session(&self) -> Result<DeviceSession> {
        let response = self.send(self.client.post(self.endpoint("/auth/device")))?;
        self.read_json(response)
    }

    fn poll(&self, device_code: &str) -> Result<PollStatus> {
        let request = self
            .client
            .post(self.endpoint("/auth/device/poll"))
            .json(&json!({ "device_code": device_code }));

        // INVARIANT: A reply from the server, even a failure status, ends the
        // flow as a denial. Only transport-level failure is an error here.
        let response = request
            .send()
            .map_err(|err| ApiError::Connectivity(err.to_string()))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Ok(PollStatus::Denied(
                detail_message(&body).unwrap_or_else(|| format!("authorization failed ({status})")),
            ));
        }

        parse_poll_reply(&body)
    }
}

/// Raw device poll reply layout.
#[derive(Debug, Deserialize)]
struct PollReply {
    status: Option<String>,
    token: Option<String>,
    user: Option<UserInfo>,
    interval: Option<u64>,
    error: Option<String>,
}

/// Interpret a device poll reply body.
fn parse_poll_reply(body: &str) -> Result<PollStatus> {
    let reply: PollReply =
        serde_json::from_str(body).map_err(|err| ApiError::BadResponse(err.to_string()))?;

    if let Some(error) = reply.error {
        return Ok(PollStatus::Denied(error));
    }

    match reply.status.as_deref() {
        Some("pending") => Ok(PollStatus::Pending {
            interval: reply.interval,
        }),
        Some("complete") => match (reply.token, reply.user) {
            (Some(token), Some(user)) => Ok(PollStatus::Complete { token, user }),
            _ => Err(ApiError::BadResponse(
                "complete reply missing token or user".to_string(),
            )),
        },
        other => Err(ApiError::BadResponse(format!(
            "unexpected poll status {other:?}"
        ))),
    }
}

/// Map a non-2xx response into the error taxonomy.
fn interpret_failure(status: StatusCode, body: &str) -> ApiError {
    let message = detail_message(body)
        .unwrap_or_else(|| format!("server returned status {}", status.as_u16()));

    match status.as_u16() {
        401 => ApiError::Auth,
        403 => {
            let subdomain_conflict = message.contains("owned by another user")
                || message.contains("is scoped to site");
            ApiError::Permission {
                message,
                subdomain_conflict,
            }
        }
        404 => ApiError::NotFound(message),
        code => ApiError::Server {
            status: code,
            message,
        },
    }
}

/// Extract the `detail` field from a server failure body.
fn detail_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("detail")?
        .as_str()
        .map(ToString::to_string)
}

/// Server API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No response reached the client at all.
    #[error("cannot reach server: {0}")]
    Connectivity(String),

    /// Server rejected the session token (401).
    #[error("session expired")]
    Auth,

    /// Server refused the operation (403).
    #[error("{message}")]
    Permission {
        message: String,
        subdomain_conflict: bool,
    },

    /// Targeted resource does not exist (404).
    #[error("{0}")]
    NotFound(String),

    /// Any other failure status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Request or response did not match the endpoint contract.
    #[error("protocol error: {0}")]
    BadResponse(String),

    /// Configured server URL is unparsable.
    #[error("invalid server URL {0:?}")]
    InvalidServer(String),
}

impl ApiError {
    /// One-line remediation tip for the operator, when one exists.
    pub fn tip(&self) -> Option<&'static str> {
        match self {
            Self::Auth => Some("run `buzz login` to authenticate"),
            Self::Permission {
                subdomain_conflict: true,
                ..
            } => Some("pass `--subdomain <name>` to deploy under a different subdomain"),
            _ => None,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn interpret_401_as_expired_session() {
        let result = interpret_failure(StatusCode::UNAUTHORIZED, r#"{"detail": "Invalid token"}"#);
        assert!(matches!(result, ApiError::Auth));
        assert_eq!(result.tip(), Some("run `buzz login` to authenticate"));
    }

    #[test]
    fn interpret_ownership_conflict_with_subdomain_tip() {
        let result = interpret_failure(
            StatusCode::FORBIDDEN,
            r#"{"detail": "Site 'zeta' is owned by another user"}"#,
        );

        assert!(matches!(
            result,
            ApiError::Permission {
                subdomain_conflict: true,
                ..
            }
        ));
        assert_eq!(
            result.tip(),
            Some("pass `--subdomain <name>` to deploy under a different subdomain")
        );
    }

    #[test]
    fn interpret_unrelated_403_without_tip() {
        let result = interpret_failure(
            StatusCode::FORBIDDEN,
            r#"{"detail": "You don't own this site"}"#,
        );

        assert!(matches!(
            result,
            ApiError::Permission {
                subdomain_conflict: false,
                ..
            }
        ));
        assert_eq!(result.tip(), None);
    }

    #[test]
    fn interpret_404_with_server_detail() {
        let result = interpret_failure(StatusCode::NOT_FOUND, r#"{"detail": "Site not found"}"#);

        match result {
            ApiError::NotFound(message) => assert_eq!(message, "Site not found"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn interpret_failure_without_detail_is_generic() {
        let result = interpret_failure(StatusCode::BAD_GATEWAY, "<html>oops</html>");

        match result {
            ApiError::Server { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "server returned status 502");
            }
            other => panic!("expected Server, got {other:?}"),
        }
    }

    #[test]
    fn parse_pending_poll_reply() -> anyhow::Result<()> {
        let result = parse_poll_reply(r#"{"status": "pending"}"#)?;
        assert_eq!(result, PollStatus::Pending { interval: None });

        Ok(())
    }

    #[test]
    fn parse_pending_poll_reply_with_slow_down_interval() -> anyhow::Result<()> {
        let result = parse_poll_reply(r#"{"status": "pending", "interval": 10}"#)?;
        assert_eq!(result, PollStatus::Pending { interval: Some(10) });

        Ok(())
    }

    #[test]
    fn parse_complete_poll_reply() -> anyhow::Result<()> {
        let result = parse_poll_reply(
            r#"{"status": "complete", "token": "buzz_sess_T", "user": {"login": "u", "name": null}}"#,
        )?;

        let expect = PollStatus::Complete {
            token: "buzz_sess_T".into(),
            user: UserInfo {
                login: "u".into(),
                name: None,
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn parse_error_field_as_denial() -> anyhow::Result<()> {
        let result = parse_poll_reply(r#"{"error": "access_denied"}"#)?;
        assert_eq!(result, PollStatus::Denied("access_denied".into()));

        Ok(())
    }

    #[test]
    fn parse_complete_reply_missing_token_fails() {
        let result = parse_poll_reply(r#"{"status": "complete"}"#);
        assert!(matches!(result, Err(ApiError::BadResponse(_))));
    }

    #[test]
    fn deserialize_token_listing_entry() -> anyhow::Result<()> {
        let result: TokenEntry = serde_json::from_str(
            r#"{
                "id": "abcd1234abcd1234",
                "name": "Deployment token",
                "site_name": "zeta",
                "created_at": "2025-11-02T09:30:00",
                "expires_at": null,
                "last_used_at": "2025-11-03T12:00:00"
            }"#,
        )?;

        let expect = TokenEntry {
            id: "abcd1234abcd1234".into(),
            name: "Deployment token".into(),
            site_name: "zeta".into(),
            created_at: "2025-11-02T09:30:00".into(),
            expires_at: None,
            last_used_at: Some("2025-11-03T12:00:00".into()),
        };

        assert_eq!(result, expect);

        Ok(())
    }
}
