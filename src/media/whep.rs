//! WHEP signaling client
//!
//! HTTP signaling for receive-only WebRTC sessions: the SDP offer is POSTed
//! as `application/sdp` and the 2xx response body is the SDP answer. The
//! `Location` header, when present, names the session resource that is
//! DELETEd on teardown.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, Url};
use thiserror::Error;

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Signaling failures
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Invalid endpoint URL {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Signaling request timed out")]
    Timeout,

    #[error("Signaling endpoint unavailable")]
    Unavailable,

    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Endpoint returned an empty answer")]
    EmptyAnswer,
}

/// Answer returned by the signaling endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpAnswer {
    pub sdp: String,
    /// Absolute URL of the created session resource, if the server gave one
    pub resource_url: Option<String>,
}

/// Offer/answer exchange with a remote endpoint
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn exchange(&self, endpoint: &str, offer_sdp: &str) -> Result<SdpAnswer, SignalingError>;

    /// Release a session resource; no-op by default
    async fn teardown(&self, _resource_url: &str) -> Result<(), SignalingError> {
        Ok(())
    }
}

/// WHEP client over reqwest
#[derive(Debug, Clone)]
pub struct WhepClient {
    client: Client,
}

impl WhepClient {
    pub fn new(request_timeout: Duration) -> Result<Self, SignalingError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client })
    }
}

fn classify(e: reqwest::Error) -> SignalingError {
    if e.is_timeout() {
        SignalingError::Timeout
    } else if e.is_connect() {
        SignalingError::Unavailable
    } else {
        SignalingError::Request(e)
    }
}

#[async_trait]
impl SignalingChannel for WhepClient {
    async fn exchange(&self, endpoint: &str, offer_sdp: &str) -> Result<SdpAnswer, SignalingError> {
        let url = Url::parse(endpoint).map_err(|e| SignalingError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(endpoint = %url, offer_len = offer_sdp.len(), "Posting SDP offer");

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let resource_url = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|loc| url.join(loc).ok())
            .map(|u| u.to_string());
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(SignalingError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Err(SignalingError::EmptyAnswer);
        }

        Ok(SdpAnswer {
            sdp: body,
            resource_url,
        })
    }

    async fn teardown(&self, resource_url: &str) -> Result<(), SignalingError> {
        let response = self
            .client
            .delete(resource_url)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SignalingError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP response and hand back the raw request
    async fn serve_once(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())?
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        (format!("http://{}/vr_stream/whep", addr), handle)
    }

    #[tokio::test]
    async fn test_offer_posted_as_sdp() {
        let (endpoint, server) = serve_once(
            "HTTP/1.1 201 Created\r\nContent-Type: application/sdp\r\nLocation: /vr_stream/whep/abc\r\nContent-Length: 8\r\nConnection: close\r\n\r\nv=0\r\nanz",
        )
        .await;

        let client = WhepClient::new(Duration::from_secs(5)).unwrap();
        let answer = client.exchange(&endpoint, "v=0\r\na=ice-ufrag:x\r\n").await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /vr_stream/whep"));
        assert!(request.to_ascii_lowercase().contains("content-type: application/sdp"));
        assert!(request.ends_with("a=ice-ufrag:x\r\n"));

        assert_eq!(answer.sdp, "v=0\r\nanz");
        assert!(answer
            .resource_url
            .unwrap()
            .ends_with("/vr_stream/whep/abc"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (endpoint, _server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 7\r\nConnection: close\r\n\r\nmissing",
        )
        .await;

        let client = WhepClient::new(Duration::from_secs(5)).unwrap();
        match client.exchange(&endpoint, "v=0\r\n").await {
            Err(SignalingError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "missing");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_endpoint() {
        let client = WhepClient::new(Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.exchange("not a url", "v=0").await,
            Err(SignalingError::InvalidEndpoint { .. })
        ));
    }
}
