// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#[derive(thiserror::Error, Debug, Clone)]
pub enum NetError {
    #[error("host not allowed by network policy: {0}")]
    HostDenied(String),
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type NetResult<T> = Result<T, NetError>;
