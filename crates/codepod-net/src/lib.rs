// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Network gateway policy and fetch bridge worker (spec.md §4.7).

pub mod error;
pub mod fetch;
pub mod gateway;

pub use error::{NetError, NetResult};
pub use fetch::{FetchBridge, FetchRequest, FetchResponse, MAX_REDIRECTS};
pub use gateway::NetworkGateway;
