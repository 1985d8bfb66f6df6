//! URL fetching with SSRF guards, retry/backoff, and a hard body cap.
//!
//! The guard only inspects IP *literals*: a domain name resolving to a
//! private address is not blocked, because the check runs before any DNS
//! resolution. Known limitation of the fetch contract, documented rather
//! than silently widened — closing it would require resolving the host and
//! re-checking every A/AAAA answer (and pinning the connection to it).

use futures_util::StreamExt;
use recipeflow_core::{Error, ProcessOptions, Result, RetryPolicy};
use std::time::Duration;
use tracing::{info, warn};

use crate::retry::{retry_async, AttemptError};

/// Responses are truncated at this many bytes to bound memory.
pub const MAX_CONTENT_BYTES: usize = 5 * 1024 * 1024;

/// Ports commonly hosting internal services; always refused.
const DENIED_PORTS: &[u16] = &[
    22, 23, 25, 53, 135, 139, 445, 993, 995, 1433, 3306, 3389, 5432, 6379,
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub content: String,
    pub final_url: String,
    pub status: u16,
    pub encoding: Option<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

/// Prefix scheme-less input with https:// so "example.com/recipe" works.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

fn ipv4_blocked(ip: std::net::Ipv4Addr) -> bool {
    let o = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // Shared address space 100.64.0.0/10 (CGNAT).
        || (o[0] == 100 && (o[1] & 0xc0) == 64)
        // IETF protocol assignments 192.0.0.0/24 and benchmarking 198.18.0.0/15.
        || (o[0] == 192 && o[1] == 0 && o[2] == 0)
        || (o[0] == 198 && (o[1] & 0xfe) == 18)
        // 240.0.0.0/4 reserved.
        || o[0] >= 240
}

fn ipv6_blocked(ip: std::net::Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return ipv4_blocked(v4);
    }
    let seg0 = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // Unique-local fc00::/7 and link-local fe80::/10.
        || (seg0 & 0xfe00) == 0xfc00
        || (seg0 & 0xffc0) == 0xfe80
}

/// Escape hatch for development and contract tests that run a fixture
/// server on loopback. Off unless explicitly enabled.
fn allow_private_hosts_from_env() -> bool {
    matches!(
        std::env::var("RECIPEFLOW_ALLOW_PRIVATE_HOSTS")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Reject URLs this service must never fetch. Runs before any network IO.
pub fn validate_url(url: &url::Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::InvalidUrl(format!("unsupported scheme: {other}")));
        }
    }

    let allow_private = allow_private_hosts_from_env();
    match url.host() {
        None => return Err(Error::InvalidUrl("missing host".to_string())),
        Some(url::Host::Ipv4(ip)) => {
            if ipv4_blocked(ip) && !allow_private {
                return Err(Error::Fetch(format!(
                    "refusing to fetch private/reserved address {ip}"
                )));
            }
        }
        Some(url::Host::Ipv6(ip)) => {
            if ipv6_blocked(ip) && !allow_private {
                return Err(Error::Fetch(format!(
                    "refusing to fetch private/reserved address {ip}"
                )));
            }
        }
        // Domain names are not resolved here; see the module docs.
        Some(url::Host::Domain(_)) => {}
    }

    if let Some(port) = url.port() {
        if DENIED_PORTS.contains(&port) {
            return Err(Error::Fetch(format!("refusing to fetch port {port}")));
        }
    }

    Ok(())
}

fn charset_from_content_type(ct: Option<&str>) -> Option<String> {
    let ct = ct?;
    for part in ct.split(';').skip(1) {
        let part = part.trim();
        if let Some(cs) = part.strip_prefix("charset=") {
            let cs = cs.trim_matches('"').trim();
            if !cs.is_empty() {
                return Some(cs.to_ascii_lowercase());
            }
        }
    }
    None
}

impl Fetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            // Avoid hanging forever on DNS/TLS/body stalls.
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch `url`, following redirects, with retry/backoff on transport
    /// errors and HTTP 429. Any other non-200 status is fatal on first
    /// occurrence. The body is truncated at [`MAX_CONTENT_BYTES`].
    pub async fn fetch(&self, url: &str, opts: &ProcessOptions) -> Result<FetchedPage> {
        let normalized = normalize_url(url);
        let parsed =
            url::Url::parse(&normalized).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        validate_url(&parsed)?;

        let policy = RetryPolicy::from_options(opts, 1.0);
        let outcome = retry_async(&policy, "fetch", |attempt| {
            let client = self.client.clone();
            let target = parsed.clone();
            async move {
                info!(url = %target, attempt = attempt + 1, "fetching url");
                let resp = client
                    .get(target)
                    .header(
                        reqwest::header::ACCEPT,
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5,he;q=0.3")
                    .send()
                    .await
                    .map_err(|e| AttemptError::Retryable(Error::Fetch(e.to_string())))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(AttemptError::Retryable(Error::Fetch(
                        "HTTP 429 (rate limited)".to_string(),
                    )));
                }
                if !status.is_success() {
                    return Err(AttemptError::Fatal(Error::Fetch(format!("HTTP {status}"))));
                }

                let final_url = resp.url().to_string();
                let encoding = charset_from_content_type(
                    resp.headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok()),
                );

                let mut bytes: Vec<u8> = Vec::new();
                let mut truncated = false;
                let mut stream = resp.bytes_stream();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk
                        .map_err(|e| AttemptError::Retryable(Error::Fetch(e.to_string())))?;
                    if bytes.len().saturating_add(chunk.len()) > MAX_CONTENT_BYTES {
                        let can_take = MAX_CONTENT_BYTES.saturating_sub(bytes.len());
                        bytes.extend_from_slice(&chunk[..can_take]);
                        truncated = true;
                        warn!(url = %final_url, "response body truncated at cap");
                        break;
                    }
                    bytes.extend_from_slice(&chunk);
                }

                Ok(FetchedPage {
                    content: String::from_utf8_lossy(&bytes).to_string(),
                    final_url,
                    status: status.as_u16(),
                    encoding,
                    truncated,
                })
            }
        })
        .await;

        outcome.map_err(|e| match e {
            crate::retry::RetryFailure::Fatal(inner) => inner,
            crate::retry::RetryFailure::Exhausted { last, attempts } => Error::Fetch(format!(
                "failed to fetch {normalized} after {attempts} attempts: {last}"
            )),
        })
    }
}
