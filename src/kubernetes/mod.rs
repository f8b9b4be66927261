// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for type registration, polling, selectors, and watch caches.

pub mod cache;
pub mod crd;
pub mod poll;
pub mod selector;

pub use cache::ResourceCache;
pub use crd::{ensure_types, wait_for_established, ResourceTypeDefinition};
pub use poll::{poll_until, PollOutcome, PollSchedule};
pub use selector::LabelSelector;
