// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared types for the wgpeer daemon: WireGuard keys and the
//! user → client-config data model.

pub mod keys;
pub mod model;
pub mod timestamp;

pub use keys::{KeyError, KeyPair, PrivateKey, PublicKey, KEY_LEN};
pub use model::{host_net, ClientConfig, User, UserId};
pub use timestamp::Timestamp;
