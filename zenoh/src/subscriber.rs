//
// Copyright (c) 2022 ZettaScale Technology
//
// This program and the accompanying materials are made available under the
// terms of the Eclipse Public License 2.0 which is available at
// http://www.eclipse.org/legal/epl-2.0, or the Apache License, Version 2.0
// which is available at https://www.apache.org/licenses/LICENSE-2.0.
//
// SPDX-License-Identifier: EPL-2.0 OR Apache-2.0
//
//! The subscription registry: local subscribers, announced remote
//! subscriptions, and the precomputed `rem_res_loc_sub_map` index from a
//! remote resource id to the local subscribers it matches. Mirrors
//! `subscription.c`'s `_zn_register_subscription` /
//! `_zn_trigger_subscriptions` family, with the index keyed by subscriber
//! id rather than by pointer.

use std::sync::Arc;

use zenoh_core::{zerror, ZErrorKind, ZResult};
use zenoh_protocol_core::{ResKey, Sample, SubInfo, ZInt};

use crate::key_expr::rname_intersect;
use crate::resource::{Locality, ResourceTable};

/// Invoked with a delivered [`Sample`]. Remote subscription announcements
/// carry no callback of their own (the session never calls anything
/// locally for them); only local subscribers have one.
pub type SubscriberCallback = Arc<dyn Fn(&Sample) + Send + Sync>;

#[derive(Clone)]
pub struct Subscriber {
    pub id: ZInt,
    pub key: ResKey,
    pub info: SubInfo,
    pub callback: Option<SubscriberCallback>,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("info", &self.info)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    local: Vec<Subscriber>,
    remote: Vec<Subscriber>,
    rem_res_loc_sub_map: zenoh_collections::IntMap<ZInt>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            local: Vec::new(),
            remote: Vec::new(),
            rem_res_loc_sub_map: zenoh_collections::IntMap::new(),
        }
    }

    fn list(&self, locality: Locality) -> &[Subscriber] {
        match locality {
            Locality::Local => &self.local,
            Locality::Remote => &self.remote,
        }
    }

    fn list_mut(&mut self, locality: Locality) -> &mut Vec<Subscriber> {
        match locality {
            Locality::Local => &mut self.local,
            Locality::Remote => &mut self.remote,
        }
    }

    /// Rejects with `DuplicateRegistration` if a subscriber with the same
    /// `ResKey` already exists in `locality` (I2: uniqueness is by key,
    /// not id). On success, appends to the list and, if `locality` is
    /// `Local`, extends `rem_res_loc_sub_map` with any remote resource
    /// already known to intersect the new subscriber.
    pub fn register_subscription(
        &mut self,
        locality: Locality,
        sub: Subscriber,
        resources: &ResourceTable,
    ) -> ZResult<()> {
        if self.list(locality).iter().any(|s| s.key == sub.key) {
            return zerror!(ZErrorKind::DuplicateRegistration {
                descr: format!("subscriber with key {} already registered", sub.key),
            });
        }

        if locality == Locality::Local {
            let name = resources.resolve(Locality::Local, &sub.key)?;
            for r in resources.resources(Locality::Remote) {
                let remote_name = resources.resolve(Locality::Remote, &r.key)?;
                if rname_intersect(&name, &remote_name) {
                    let mut ids = self
                        .rem_res_loc_sub_map
                        .get(r.id)
                        .map(|s| s.to_vec())
                        .unwrap_or_default();
                    ids.push(sub.id);
                    self.rem_res_loc_sub_map.set(r.id, ids);
                }
            }
        }

        self.list_mut(locality).push(sub);
        Ok(())
    }

    /// Removes the subscriber with the given `id`. The index maps are
    /// left untouched: a stale entry in `rem_res_loc_sub_map` is resolved
    /// back to `None` by [`Self::get_subscription_by_id`] and simply
    /// skipped by [`Self::trigger_subscriptions`] (an acknowledged
    /// simplification carried over from the original source).
    pub fn unregister_subscription(&mut self, locality: Locality, id: ZInt) {
        self.list_mut(locality).retain(|s| s.id != id);
    }

    pub fn get_subscription_by_id(&self, locality: Locality, id: ZInt) -> Option<&Subscriber> {
        self.list(locality).iter().find(|s| s.id == id)
    }

    pub fn get_subscription_by_key(&self, locality: Locality, key: &ResKey) -> Option<&Subscriber> {
        self.list(locality).iter().find(|s| &s.key == key)
    }

    /// The local subscribers that would match a hypothetical remote
    /// declaration carrying `reskey`, per the three key forms.
    pub fn get_subscriptions_from_remote_key(
        &self,
        reskey: &ResKey,
        resources: &ResourceTable,
    ) -> ZResult<Vec<ZInt>> {
        match reskey {
            ResKey::RId(rid) => Ok(self
                .rem_res_loc_sub_map
                .get(*rid)
                .map(|s| s.to_vec())
                .unwrap_or_default()),
            ResKey::RName(rname) => Ok(self.matching_ids_by_name(rname, resources)),
            ResKey::RIdWithSuffix(..) => match resources.resolve(Locality::Remote, reskey) {
                Ok(name) => Ok(self.matching_ids_by_name(&name, resources)),
                Err(e) if matches!(e.kind(), ZErrorKind::UnknownResourceId { .. }) => Ok(Vec::new()),
                Err(e) => Err(e),
            },
        }
    }

    /// Local subscribers whose own resolved key intersects `name`. A
    /// subscriber whose key fails to resolve (dangling id) is skipped and
    /// iteration advances to the next one.
    fn matching_ids_by_name(&self, name: &str, resources: &ResourceTable) -> Vec<ZInt> {
        let mut ids = Vec::new();
        for s in &self.local {
            match resources.resolve(Locality::Local, &s.key) {
                Ok(own_name) => {
                    if rname_intersect(&own_name, name) {
                        ids.push(s.id);
                    }
                }
                Err(_) => continue,
            }
        }
        ids
    }

    /// Invoked when the peer declares a new resource: recomputes and
    /// replaces `rem_res_loc_sub_map[id]`, freeing the previous spine.
    /// A no-op if the new matching list is empty.
    pub fn on_remote_resource_declared(
        &mut self,
        id: ZInt,
        reskey: &ResKey,
        resources: &ResourceTable,
    ) -> ZResult<()> {
        let name = resources.resolve(Locality::Remote, reskey)?;
        let matches = self.matching_ids_by_name(&name, resources);
        self.rem_res_loc_sub_map.set(id, matches);
        Ok(())
    }

    /// Delivers one inbound DATA message, per the three key forms.
    /// Unknown remote ids resolve to a silent no-op (spec.md §7
    /// `UNKNOWN_RID`).
    pub fn trigger_subscriptions(&self, reskey: &ResKey, payload: &[u8], resources: &ResourceTable) {
        match reskey {
            ResKey::RId(rid) => {
                let name = match resources.resolve(Locality::Remote, reskey) {
                    Ok(n) => n,
                    Err(_) => return,
                };
                let sample = Sample {
                    key: name,
                    value: payload.to_vec(),
                };
                if let Some(ids) = self.rem_res_loc_sub_map.get(*rid) {
                    for id in ids {
                        if let Some(sub) = self.get_subscription_by_id(Locality::Local, *id) {
                            if let Some(cb) = &sub.callback {
                                cb(&sample);
                            }
                        }
                    }
                }
            }
            ResKey::RName(rname) => {
                let sample = Sample {
                    key: rname.clone(),
                    value: payload.to_vec(),
                };
                self.invoke_matching(rname, &sample, resources);
            }
            ResKey::RIdWithSuffix(..) => {
                let name = match resources.resolve(Locality::Remote, reskey) {
                    Ok(n) => n,
                    Err(_) => return,
                };
                let sample = Sample {
                    key: name.clone(),
                    value: payload.to_vec(),
                };
                self.invoke_matching(&name, &sample, resources);
            }
        }
    }

    fn invoke_matching(&self, name: &str, sample: &Sample, resources: &ResourceTable) {
        for s in &self.local {
            match resources.resolve(Locality::Local, &s.key) {
                Ok(own_name) => {
                    if rname_intersect(&own_name, name) {
                        if let Some(cb) = &s.callback {
                            cb(sample);
                        }
                    }
                }
                Err(_) => continue,
            }
        }
    }

    pub fn flush(&mut self) {
        self.local.clear();
        self.remote.clear();
        self.rem_res_loc_sub_map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn key(name: &str) -> ResKey {
        ResKey::RName(name.into())
    }

    #[test]
    fn duplicate_key_registration_is_rejected() {
        let resources = ResourceTable::new();
        let mut reg = SubscriptionRegistry::new();
        let sub = Subscriber {
            id: 1,
            key: key("/a"),
            info: SubInfo::default(),
            callback: None,
        };
        reg.register_subscription(Locality::Local, sub.clone(), &resources)
            .unwrap();
        let err = reg
            .register_subscription(Locality::Local, sub, &resources)
            .unwrap_err();
        assert!(matches!(err.kind(), ZErrorKind::DuplicateRegistration { .. }));
    }

    #[test]
    fn aliased_publish_invokes_subscriber_once() {
        let mut resources = ResourceTable::new();
        resources.declare(Locality::Local, 7, key("/s/1"));

        let mut reg = SubscriptionRegistry::new();
        let hits: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
        let hits2 = hits.clone();
        let sub = Subscriber {
            id: 100,
            key: key("/s/*"),
            info: SubInfo::default(),
            callback: Some(Arc::new(move |s: &Sample| hits2.lock().unwrap().push(s.clone()))),
        };
        reg.register_subscription(Locality::Local, sub, &resources).unwrap();

        reg.trigger_subscriptions(&key("/s/1"), b"payload", &resources);

        let recorded = hits.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].key, "/s/1");
        assert_eq!(recorded[0].value, b"payload".to_vec());
    }

    #[test]
    fn id_prefixed_publish_resolves_through_remote_resource() {
        let mut resources = ResourceTable::new();
        resources.declare(Locality::Remote, 42, key("/a"));

        let mut reg = SubscriptionRegistry::new();
        let hits: Arc<Mutex<Vec<Sample>>> = Arc::new(Mutex::new(Vec::new()));
        let hits2 = hits.clone();
        let sub = Subscriber {
            id: 1,
            key: key("/a/b"),
            info: SubInfo::default(),
            callback: Some(Arc::new(move |s: &Sample| hits2.lock().unwrap().push(s.clone()))),
        };
        reg.register_subscription(Locality::Local, sub, &resources).unwrap();
        reg.on_remote_resource_declared(42, &key("/a"), &resources).unwrap();

        reg.trigger_subscriptions(&ResKey::RIdWithSuffix(42, "/b".into()), b"x", &resources);

        let recorded = hits.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].key, "/a/b");
    }

    #[test]
    fn unregistering_removes_from_canonical_list_but_not_index() {
        let resources = ResourceTable::new();
        let mut reg = SubscriptionRegistry::new();
        let sub = Subscriber {
            id: 1,
            key: key("/a"),
            info: SubInfo::default(),
            callback: None,
        };
        reg.register_subscription(Locality::Local, sub, &resources).unwrap();
        reg.unregister_subscription(Locality::Local, 1);
        assert!(reg.get_subscription_by_id(Locality::Local, 1).is_none());
    }
}
