// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! No library surface; see `tests/` for the end-to-end scenarios covering
//! spec.md §8's invariants across the sandbox facade, RPC dispatcher and
//! persistence layer.
