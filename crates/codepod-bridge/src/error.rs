// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge wait timed out")]
    TimedOut,
    #[error("bridge responder crashed or reset")]
    ResponderCrashed,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("{0}")]
    Operation(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
