// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watch-backed in-memory cache for any resource kind.

use futures::{Future, StreamExt};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Read side of a reflector.
///
/// The write side is owned by the driver returned from [`ResourceCache::new`].
#[derive(Clone)]
pub struct ResourceCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
}

impl<K> ResourceCache<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    /// Build the cache and the future that keeps it in sync.
    ///
    /// The cache stays empty until the driver is polled. Watch errors are retried with backoff.
    pub fn new(api: Api<K>, config: watcher::Config) -> (Self, impl Future<Output = ()> + Send) {
        let (store, writer) = reflector::store();
        let driver = reflector::reflector(writer, watcher(api, config))
            .default_backoff()
            .applied_objects()
            .for_each(|res| async move {
                match res {
                    Ok(obj) => debug!(
                        "Observed {} {}",
                        K::kind(&K::DynamicType::default()),
                        obj.meta().name.as_deref().unwrap_or_default()
                    ),
                    Err(e) => warn!("Watch error: {}", e),
                }
            });
        (Self { store }, driver)
    }

    #[cfg(test)]
    fn from_store(store: Store<K>) -> Self {
        Self { store }
    }

    /// Look up a cluster-scoped object, or a namespaced one when `namespace` is given
    pub fn get(&self, name: &str, namespace: Option<&str>) -> Option<Arc<K>> {
        let mut key = ObjectRef::new(name);
        if let Some(ns) = namespace {
            key = key.within(ns);
        }
        self.store.get(&key)
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Wait for the initial list to land. Returns false if the driver was dropped first.
    pub async fn wait_until_ready(&self) -> bool {
        self.store.wait_until_ready().await.is_ok()
    }
}
