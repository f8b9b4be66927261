// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource types used by the operator: the aggregated API registration from
//! k8s-openapi and the Postgres version catalog CRD

pub mod apiservice;
pub mod postgres_version;

pub use apiservice::{APIService, APIServiceExt};
pub use postgres_version::PostgresVersion;
