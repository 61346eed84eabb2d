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
//! The queryable registry. Structurally isomorphic to
//! [`crate::subscriber::SubscriptionRegistry`], with two differences
//! mirrored from `queryable.c`: uniqueness on registration is by `id`
//! rather than by key, and there is no `remote_queryables` list (a peer
//! never announces a queryable; it only issues queries against this
//! node's local ones).

use std::sync::Arc;

use zenoh_core::{zerror, ZErrorKind, ZResult};
use zenoh_protocol_core::{query_kind_matches, ResKey, ZInt};

use crate::key_expr::rname_intersect;
use crate::resource::{Locality, ResourceTable};

/// An inbound QUERY, resolved enough to hand to a queryable's callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub qid: ZInt,
    pub key: ResKey,
    pub predicate: String,
    pub target_kind: ZInt,
}

pub type QueryableCallback = Arc<dyn Fn(&Query) + Send + Sync>;

#[derive(Clone)]
pub struct Queryable {
    pub id: ZInt,
    pub key: ResKey,
    pub kind: ZInt,
    pub callback: QueryableCallback,
}

impl std::fmt::Debug for Queryable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queryable")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct QueryableRegistry {
    local: Vec<Queryable>,
    rem_res_loc_qle_map: zenoh_collections::IntMap<ZInt>,
}

impl QueryableRegistry {
    pub fn new() -> Self {
        QueryableRegistry {
            local: Vec::new(),
            rem_res_loc_qle_map: zenoh_collections::IntMap::new(),
        }
    }

    /// Rejects with `DuplicateRegistration` if a queryable with the same
    /// `id` is already registered (I2: uniqueness is by id here, unlike
    /// subscribers). On success, extends `rem_res_loc_qle_map` with any
    /// remote resource already known to intersect the new queryable.
    pub fn register_queryable(&mut self, qle: Queryable, resources: &ResourceTable) -> ZResult<()> {
        if self.local.iter().any(|q| q.id == qle.id) {
            return zerror!(ZErrorKind::DuplicateRegistration {
                descr: format!("queryable with id {} already registered", qle.id),
            });
        }

        let name = resources.resolve(Locality::Local, &qle.key)?;
        for r in resources.resources(Locality::Remote) {
            let remote_name = resources.resolve(Locality::Remote, &r.key)?;
            if rname_intersect(&name, &remote_name) {
                let mut ids = self
                    .rem_res_loc_qle_map
                    .get(r.id)
                    .map(|s| s.to_vec())
                    .unwrap_or_default();
                ids.push(qle.id);
                self.rem_res_loc_qle_map.set(r.id, ids);
            }
        }

        self.local.push(qle);
        Ok(())
    }

    /// Removes the queryable with the given `id`. As with subscribers,
    /// `rem_res_loc_qle_map` is left untouched.
    pub fn unregister_queryable(&mut self, id: ZInt) {
        self.local.retain(|q| q.id != id);
    }

    pub fn get_queryable_by_id(&self, id: ZInt) -> Option<&Queryable> {
        self.local.iter().find(|q| q.id == id)
    }

    /// The local queryables that would match a hypothetical remote
    /// key, per the three key forms, without any kind filtering.
    ///
    /// Unlike [`crate::subscriber::SubscriptionRegistry::get_subscriptions_from_remote_key`],
    /// an unresolvable `rid` is surfaced as `Err(UnknownResourceId)` rather
    /// than swallowed into an empty list: a query against a genuinely
    /// unknown resource has to be told apart from a query that resolved
    /// fine but simply matched zero queryables, because
    /// `Session::trigger_queryables` sends a terminal reply only in the
    /// latter case (`queryable.c`'s `_zn_trigger_queryables` `goto`s past
    /// the reply entirely when `res == NULL` / `rname == NULL`).
    pub fn get_queryables_from_remote_key(&self, reskey: &ResKey, resources: &ResourceTable) -> ZResult<Vec<ZInt>> {
        match reskey {
            ResKey::RId(rid) => {
                if resources.get_resource_by_id(Locality::Remote, *rid).is_none() {
                    return zerror!(ZErrorKind::UnknownResourceId { rid: rid.to_string() });
                }
                Ok(self
                    .rem_res_loc_qle_map
                    .get(*rid)
                    .map(|s| s.to_vec())
                    .unwrap_or_default())
            }
            ResKey::RName(rname) => Ok(self.matching_ids_by_name(rname, resources)),
            ResKey::RIdWithSuffix(..) => Ok(self.matching_ids_by_name(
                &resources.resolve(Locality::Remote, reskey)?,
                resources,
            )),
        }
    }

    fn matching_ids_by_name(&self, name: &str, resources: &ResourceTable) -> Vec<ZInt> {
        let mut ids = Vec::new();
        for q in &self.local {
            match resources.resolve(Locality::Local, &q.key) {
                Ok(own_name) => {
                    if rname_intersect(&own_name, name) {
                        ids.push(q.id);
                    }
                }
                Err(_) => continue,
            }
        }
        ids
    }

    pub fn on_remote_resource_declared(&mut self, id: ZInt, reskey: &ResKey, resources: &ResourceTable) -> ZResult<()> {
        let name = resources.resolve(Locality::Remote, reskey)?;
        let matches = self.matching_ids_by_name(&name, resources);
        self.rem_res_loc_qle_map.set(id, matches);
        Ok(())
    }

    /// The queryables in registration order that should be invoked for
    /// `query`: matching key intersection, filtered by
    /// `(target.kind & ALL_KINDS) | (target.kind & queryable.kind) != 0`.
    pub fn matching_queryables(&self, query: &Query, resources: &ResourceTable) -> ZResult<Vec<ZInt>> {
        let candidates = self.get_queryables_from_remote_key(&query.key, resources)?;
        Ok(candidates
            .into_iter()
            .filter(|id| {
                self.get_queryable_by_id(*id)
                    .map(|q| query_kind_matches(query.target_kind, q.kind))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub fn flush(&mut self) {
        self.local.clear();
        self.rem_res_loc_qle_map.clear();
    }
}
