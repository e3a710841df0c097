// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The fetch bridge worker (spec.md §4.7): performs the HTTP request with
//! manual redirect handling so the gateway can re-check policy on every hop.

use std::collections::HashMap;

use reqwest::{Method, StatusCode};
use tracing::debug;

use crate::error::{NetError, NetResult};
use crate::gateway::NetworkGateway;

pub const MAX_REDIRECTS: u32 = 5;

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub error: Option<String>,
}

/// Performs `req`, following up to [`MAX_REDIRECTS`] hops per spec.md §4.7:
/// 301/302/307/308 preserve the method and body, 303 becomes a bodyless GET.
/// The gateway is re-applied to the host of every hop, including the first.
pub struct FetchBridge {
    client: reqwest::Client,
    gateway: NetworkGateway,
}

impl FetchBridge {
    pub fn new(gateway: NetworkGateway) -> Self {
        let client = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build().expect("reqwest client");
        Self { client, gateway }
    }

    pub async fn fetch(&self, req: FetchRequest) -> FetchResponse {
        match self.fetch_inner(req).await {
            Ok(resp) => resp,
            Err(e) => FetchResponse { status: 0, body: Vec::new(), headers: HashMap::new(), error: Some(e.to_string()) },
        }
    }

    async fn fetch_inner(&self, mut req: FetchRequest) -> NetResult<FetchResponse> {
        for hop in 0..=MAX_REDIRECTS {
            let url = url::Url::parse(&req.url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
            let host = url.host_str().ok_or_else(|| NetError::InvalidUrl("missing host".into()))?.to_string();
            if !self.gateway.is_allowed(&host) {
                return Err(NetError::HostDenied(host));
            }

            let method = Method::from_bytes(req.method.as_bytes()).map_err(|_| NetError::InvalidUrl("bad method".into()))?;
            let mut builder = self.client.request(method, url.clone());
            for (k, v) in &req.headers {
                builder = builder.header(k, v);
            }
            if let Some(body) = req.body.clone() {
                builder = builder.body(body);
            }

            let resp = builder.send().await.map_err(|e| NetError::Transport(e.to_string()))?;
            let status = resp.status();

            if is_redirect(status) && hop < MAX_REDIRECTS {
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| NetError::Transport("redirect without Location".into()))?;
                let next_url = url.join(location).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
                debug!(from = %url, to = %next_url, status = %status, "following redirect");
                if status == StatusCode::SEE_OTHER {
                    req = FetchRequest { url: next_url.to_string(), method: "GET".into(), headers: req.headers, body: None };
                } else {
                    req = FetchRequest { url: next_url.to_string(), ..req };
                }
                continue;
            }

            let headers = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect();
            let body = resp.bytes().await.map_err(|e| NetError::Transport(e.to_string()))?.to_vec();
            return Ok(FetchResponse { status: status.as_u16(), body, headers, error: None });
        }
        Err(NetError::TooManyRedirects)
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER | StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_status_codes_are_recognized() {
        assert!(is_redirect(StatusCode::FOUND));
        assert!(is_redirect(StatusCode::PERMANENT_REDIRECT));
        assert!(!is_redirect(StatusCode::OK));
    }

    #[tokio::test]
    async fn denied_host_short_circuits_before_any_request() {
        let bridge = FetchBridge::new(NetworkGateway::new(None, Some(vec!["evil.com".into()])));
        let resp = bridge
            .fetch(FetchRequest { url: "https://evil.com/x".into(), method: "GET".into(), headers: HashMap::new(), body: None })
            .await;
        assert!(resp.error.is_some());
        assert_eq!(resp.status, 0);
    }
}
