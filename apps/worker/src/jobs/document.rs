//! CV text loading: inline text or a plain-text document URL
//!
//! Document URLs come from users, so downloads only go to public addresses.
//! The host is resolved once, every address is checked, and the connection is
//! pinned to the checked addresses. Redirects are not followed.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use reqwest::{redirect, Client, StatusCode};
use talentflow_job_queue::CvDocument;
use url::{Host, Url};

use crate::error::{WorkerError, WorkerResult};

/// Shorter texts cannot be a CV
pub const MIN_CV_CHARS: usize = 50;

/// Downloads CV documents with size, timeout and destination limits
#[derive(Debug, Clone)]
pub struct DocumentFetcher {
    timeout: Duration,
    max_bytes: usize,
    allow_private_hosts: bool,
}

impl DocumentFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        Self {
            timeout,
            max_bytes,
            allow_private_hosts: false,
        }
    }

    /// Permit loopback and private destinations (local development only)
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Resolve a document to its text
    pub async fn load(&self, document: &CvDocument) -> WorkerResult<String> {
        let text = match document {
            CvDocument::Text { text } => text.trim().to_string(),
            CvDocument::Url { url } => self.fetch_text(url).await?,
        };

        if text.chars().count() < MIN_CV_CHARS {
            return Err(WorkerError::InvalidPayload(format!(
                "CV text too short ({} chars, need at least {})",
                text.chars().count(),
                MIN_CV_CHARS
            )));
        }

        Ok(text)
    }

    async fn fetch_text(&self, url: &str) -> WorkerResult<String> {
        let parsed = Url::parse(url)
            .map_err(|e| WorkerError::InvalidPayload(format!("invalid document URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WorkerError::InvalidPayload(format!(
                "unsupported document URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let http = self.client_for(&parsed).await?;
        tracing::debug!(url = %parsed, "Downloading CV document");

        let mut response = http.get(parsed).send().await.map_err(|e| {
            WorkerError::document_fetch(url, e.to_string(), e.is_timeout() || e.is_connect())
        })?;

        let status = response.status();
        if status.is_redirection() {
            return Err(WorkerError::document_fetch(
                url,
                format!("redirect ({}) not followed", status.as_u16()),
                false,
            ));
        }
        if !status.is_success() {
            let retryable = status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT;
            return Err(WorkerError::document_fetch(
                url,
                format!("status {}", status.as_u16()),
                retryable,
            ));
        }

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > self.max_bytes {
                return Err(WorkerError::DocumentTooLarge {
                    size: length,
                    limit: self.max_bytes,
                });
            }
        }

        // Content-Length may be absent or wrong; enforce the limit on what arrives
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WorkerError::document_fetch(url, e.to_string(), true))?
        {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(WorkerError::DocumentTooLarge {
                    size: body.len() + chunk.len(),
                    limit: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).trim().to_string())
    }

    /// Client that only connects to the vetted addresses of `url`'s host
    async fn client_for(&self, url: &Url) -> WorkerResult<Client> {
        let builder = Client::builder()
            .timeout(self.timeout)
            .redirect(redirect::Policy::none());

        let port = url.port_or_known_default().unwrap_or(80);
        let builder = match url.host() {
            Some(Host::Ipv4(ip)) => {
                self.check_address(url, IpAddr::V4(ip))?;
                builder
            }
            Some(Host::Ipv6(ip)) => {
                self.check_address(url, IpAddr::V6(ip))?;
                builder
            }
            Some(Host::Domain(domain)) => {
                let addrs: Vec<SocketAddr> = tokio::net::lookup_host((domain, port))
                    .await
                    .map_err(|e| WorkerError::document_fetch(url.as_str(), e.to_string(), true))?
                    .collect();
                if addrs.is_empty() {
                    return Err(WorkerError::document_fetch(
                        url.as_str(),
                        "host did not resolve",
                        false,
                    ));
                }
                for addr in &addrs {
                    self.check_address(url, addr.ip())?;
                }
                builder.resolve_to_addrs(domain, &addrs)
            }
            None => {
                return Err(WorkerError::InvalidPayload(
                    "document URL has no host".to_string(),
                ))
            }
        };

        Ok(builder.build()?)
    }

    fn check_address(&self, url: &Url, ip: IpAddr) -> WorkerResult<()> {
        if self.allow_private_hosts || is_public(ip) {
            return Ok(());
        }
        tracing::warn!(url = %url, %ip, "Refusing document download from a private address");
        Err(WorkerError::InvalidPayload(format!(
            "document host resolves to a non-public address ({})",
            ip
        )))
    }
}

/// Whether `ip` is routable on the public internet
fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_public_v4(ip),
        IpAddr::V6(ip) => match ip.to_ipv4_mapped() {
            Some(mapped) => is_public_v4(mapped),
            None => is_public_v6(ip),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    !(ip.is_unspecified() || ip.is_loopback() || ip.is_multicast() || unique_local || link_local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    fn fetcher() -> DocumentFetcher {
        DocumentFetcher::new(Duration::from_secs(5), 1024)
    }

    #[tokio::test]
    async fn test_inline_text_is_trimmed() {
        let text = format!("  {}  \n", "Senior engineer. ".repeat(5));
        let loaded = fetcher().load(&CvDocument::Text { text }).await.unwrap();
        assert!(loaded.starts_with("Senior"));
        assert!(loaded.ends_with("engineer."));
    }

    #[tokio::test]
    async fn test_short_text_is_rejected() {
        let doc = CvDocument::Text {
            text: "too short".to_string(),
        };
        assert_matches!(
            fetcher().load(&doc).await,
            Err(WorkerError::InvalidPayload(_))
        );
    }

    #[tokio::test]
    async fn test_non_http_url_is_rejected() {
        let doc = CvDocument::Url {
            url: "file:///etc/passwd".to_string(),
        };
        assert_matches!(
            fetcher().load(&doc).await,
            Err(WorkerError::InvalidPayload(msg)) if msg.contains("scheme")
        );
    }

    #[rstest]
    #[case("http://127.0.0.1/cv.txt")]
    #[case("http://10.0.0.8:8080/cv.txt")]
    #[case("http://169.254.169.254/latest/meta-data/")]
    #[case("http://[::1]/cv.txt")]
    #[case("http://localhost/cv.txt")]
    #[tokio::test]
    async fn test_private_destinations_are_refused(#[case] url: &str) {
        let doc = CvDocument::Url {
            url: url.to_string(),
        };
        let err = fetcher().load(&doc).await.unwrap_err();
        assert_matches!(&err, WorkerError::InvalidPayload(msg) if msg.contains("non-public"));
        assert!(!err.is_retryable());
    }

    #[rstest]
    #[case("8.8.8.8", true)]
    #[case("93.184.216.34", true)]
    #[case("127.0.0.1", false)]
    #[case("10.1.2.3", false)]
    #[case("172.16.0.1", false)]
    #[case("192.168.1.1", false)]
    #[case("169.254.169.254", false)]
    #[case("100.64.0.1", false)]
    #[case("0.0.0.0", false)]
    #[case("2606:4700::1111", true)]
    #[case("::1", false)]
    #[case("fd00::1", false)]
    #[case("fe80::1", false)]
    #[case("::ffff:127.0.0.1", false)]
    fn test_is_public(#[case] ip: &str, #[case] expected: bool) {
        assert_eq!(is_public(ip.parse().unwrap()), expected);
    }
}
