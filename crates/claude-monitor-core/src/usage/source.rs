//! Upstream usage source: the contract and the claude.ai web API client.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::error::FetchError;
use super::types::{ErrorEnvelope, Organization, RawUsage};

/// Default upstream origin
pub const DEFAULT_BASE_URL: &str = "https://claude.ai";

/// Default user agent presented to the upstream
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Source of organization and usage records for a session credential.
///
/// Calls are blocking; the coordinator runs them on the blocking pool.
pub trait UsageSource: Send + Sync + 'static {
    /// List the organizations visible to the credential
    fn organizations(&self, credential: &str) -> Result<Vec<Organization>, FetchError>;

    /// Fetch the raw usage record for one organization
    fn usage(&self, credential: &str, org_uuid: &str) -> Result<RawUsage, FetchError>;
}

/// Settings for [`ClaudeWebClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upstream origin, without trailing slash
    pub base_url: String,
    /// Global per-request timeout
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Blocking HTTP client for the claude.ai organization/usage endpoints
pub struct ClaudeWebClient {
    agent: ureq::Agent,
    config: ClientConfig,
}

impl ClaudeWebClient {
    /// Create a client with the given settings
    pub fn new(mut config: ClientConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .into();
        Self { agent, config }
    }

    /// GET `path` with session headers and return the raw body
    fn get_body(
        &self,
        endpoint: &'static str,
        path: &str,
        credential: &str,
    ) -> Result<String, FetchError> {
        let base = &self.config.base_url;
        let url = format!("{}{}", base, path);
        debug!("Upstream request: {} {}", endpoint, url);

        self.agent
            .get(&url)
            .header("Accept", "application/json")
            .header("Cookie", &format!("sessionKey={}", credential))
            .header("User-Agent", &self.config.user_agent)
            .header("Referer", &format!("{}/", base))
            .header("Origin", base)
            .call()
            .map_err(|e| classify(endpoint, e))?
            .body_mut()
            .read_to_string()
            .map_err(|e| classify(endpoint, e))
    }
}

impl UsageSource for ClaudeWebClient {
    fn organizations(&self, credential: &str) -> Result<Vec<Organization>, FetchError> {
        let body = self.get_body("Organizations", "/api/organizations", credential)?;
        parse_organizations(&body)
    }

    fn usage(&self, credential: &str, org_uuid: &str) -> Result<RawUsage, FetchError> {
        let path = format!("/api/organizations/{}/usage", org_uuid);
        let body = self.get_body("Usage", &path, credential)?;
        decode("Usage", serde_json::from_str(&body))
    }
}

/// Decode the organizations body: a list, a lone record, or an error envelope.
///
/// The envelope is only recognised on an object whose `type` is `"error"`;
/// anything else that fails to decode is a parse failure.
fn parse_organizations(body: &str) -> Result<Vec<Organization>, FetchError> {
    const ENDPOINT: &str = "Organizations";

    let value: Value = decode(ENDPOINT, serde_json::from_str(body))?;
    let is_envelope = value.get("type").and_then(Value::as_str) == Some("error");
    match value {
        Value::Array(_) => decode(ENDPOINT, serde_json::from_value(value)),
        Value::Object(_) if is_envelope => {
            let envelope: ErrorEnvelope = decode(ENDPOINT, serde_json::from_value(value))?;
            Err(FetchError::UpstreamApi(envelope.message()))
        }
        Value::Object(_) => {
            decode(ENDPOINT, serde_json::from_value::<Organization>(value)).map(|org| vec![org])
        }
        other => Err(FetchError::UpstreamParse(format!(
            "{} response: unexpected JSON {}",
            ENDPOINT, other
        ))),
    }
}

fn decode<T>(endpoint: &str, result: serde_json::Result<T>) -> Result<T, FetchError> {
    result.map_err(|e| FetchError::UpstreamParse(format!("{} response: {}", endpoint, e)))
}

/// Map a transport error onto the fetch taxonomy
fn classify(endpoint: &'static str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::UpstreamStatus { endpoint, status },
        ureq::Error::Timeout(_) => FetchError::UpstreamTimeout,
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            FetchError::UpstreamTimeout
        }
        other => FetchError::Transport(format!("{}: {}", endpoint, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve one canned HTTP response per route, then stop listening.
    ///
    /// Routes are `(path, status line, body)`; an unknown path gets a 404.
    fn canned_upstream(routes: Vec<(&'static str, &'static str, String)>) -> ClaudeWebClient {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let expected = routes.len();

        thread::spawn(move || {
            for stream in listener.incoming().take(expected) {
                let mut stream = stream.unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                // Drain headers up to the blank line
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                }

                let path = request_line.split_whitespace().nth(1).unwrap_or("");
                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, body.as_str()))
                    .unwrap_or(("404 Not Found", ""));
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });

        ClaudeWebClient::new(ClientConfig {
            base_url: format!("http://{}", addr),
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        })
    }

    fn organizations_answering(
        status: &'static str,
        body: &str,
    ) -> Result<Vec<Organization>, FetchError> {
        canned_upstream(vec![("/api/organizations", status, body.to_string())])
            .organizations("cookie")
    }

    #[test]
    fn test_organizations_list_with_null_capabilities() {
        let orgs = organizations_answering(
            "200 OK",
            r#"[{"uuid": "a", "capabilities": null}, {"uuid": "b", "capabilities": ["claude_max"]}]"#,
        )
        .unwrap();
        assert_eq!(orgs.len(), 2);
        assert!(orgs[0].capabilities.is_empty());
        assert!(orgs[1].is_premium());
    }

    #[test]
    fn test_single_organization_object_becomes_list() {
        let orgs = organizations_answering("200 OK", r#"{"uuid": "solo", "name": "Solo"}"#).unwrap();
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].uuid, "solo");
        assert_eq!(orgs[0].name.as_deref(), Some("Solo"));
    }

    #[test]
    fn test_error_envelope_is_upstream_api_error() {
        let err = organizations_answering(
            "200 OK",
            r#"{"type": "error", "error": {"type": "permission_error", "message": "denied"}}"#,
        )
        .unwrap_err();
        assert_eq!(err, FetchError::UpstreamApi("denied".to_string()));
    }

    #[test]
    fn test_malformed_bodies_are_parse_errors() {
        for body in [
            "not json",
            r#"[{"name": "missing uuid"}]"#,
            r#"["error", {"message": "positional"}]"#,
            r#"{"name": "missing uuid"}"#,
            "42",
        ] {
            let err = organizations_answering("200 OK", body).unwrap_err();
            assert!(
                matches!(err, FetchError::UpstreamParse(_)),
                "body {:?} gave {:?}",
                body,
                err
            );
        }
    }

    #[test]
    fn test_non_success_status_is_upstream_status() {
        let err = organizations_answering("401 Unauthorized", r#"{"error": "nope"}"#).unwrap_err();
        assert_eq!(
            err,
            FetchError::UpstreamStatus {
                endpoint: "Organizations",
                status: 401
            }
        );
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_usage_endpoint_decodes_windows() {
        let client = canned_upstream(vec![(
            "/api/organizations/org-1/usage",
            "200 OK",
            r#"{"five_hour": {"utilization": 41.5, "resets_at": null}, "seven_day": null}"#
                .to_string(),
        )]);
        let usage = client.usage("cookie", "org-1").unwrap();
        assert_eq!(usage.five_hour.unwrap().utilization, Some(41.5));
        assert!(usage.seven_day.is_none());

        let client = canned_upstream(vec![(
            "/api/organizations/org-1/usage",
            "500 Internal Server Error",
            String::new(),
        )]);
        assert_eq!(
            client.usage("cookie", "org-1").unwrap_err(),
            FetchError::UpstreamStatus {
                endpoint: "Usage",
                status: 500
            }
        );
    }

    #[test]
    fn test_fetch_once_against_canned_upstream() {
        let client = canned_upstream(vec![
            (
                "/api/organizations",
                "200 OK",
                r#"[{"uuid": "org-1", "name": "Acme", "capabilities": ["claude_max"]}]"#.to_string(),
            ),
            (
                "/api/organizations/org-1/usage",
                "200 OK",
                r#"{"seven_day": {"utilization": 12.4}}"#.to_string(),
            ),
        ]);
        let snapshot = crate::usage::fetch_once(&client, "cookie").unwrap();
        assert_eq!(snapshot.organization, "Acme");
        assert_eq!(snapshot.plan, "Claude Max");
        assert_eq!(snapshot.seven_day.unwrap().utilization, 12);
    }

    #[test]
    fn test_classify_status_and_timeout() {
        assert_eq!(
            classify("Usage", ureq::Error::StatusCode(401)),
            FetchError::UpstreamStatus {
                endpoint: "Usage",
                status: 401
            }
        );
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(
            classify("Organizations", ureq::Error::Io(io)),
            FetchError::UpstreamTimeout
        );
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            classify("Organizations", ureq::Error::Io(io)),
            FetchError::Transport(_)
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ClaudeWebClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..ClientConfig::default()
        });
        assert_eq!(client.config.base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn test_unreachable_upstream_is_transport_error() {
        // Port 9 (discard) is not listening on loopback in test environments
        let client = ClaudeWebClient::new(ClientConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..ClientConfig::default()
        });
        let err = client.organizations("cookie").unwrap_err();
        assert!(
            matches!(err, FetchError::Transport(_) | FetchError::UpstreamTimeout),
            "unexpected error: {:?}",
            err
        );
    }
}
