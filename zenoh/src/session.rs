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
//! The session: wires the resource table, subscription/queryable
//! registries and the transmit pipeline together behind the two
//! independent locks described in spec.md §5. `mutex_inner` guards
//! registries and resource tables; `mutex_tx` guards the write buffer,
//! sequence counters and link writes. The only lock-order rule is that
//! `mutex_inner` may be held across a `mutex_tx` acquisition (never the
//! reverse), which is exactly what [`Session::trigger_queryables`] does
//! to send its terminal reply.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::{debug, trace, warn};

use zenoh_core::{zerror, ZErrorKind, ZResult};
use zenoh_protocol::{DeclareBody, ReplyContext, TransportMessage, ZenohMessage};
use zenoh_protocol_core::{CongestionControl, Reliability, ResKey, SubInfo, ZInt};
use zenoh_transport::{send_transport_message_locked, send_zenoh_message_locked, Link, TxState};

use crate::queryable::{Query, Queryable, QueryableCallback, QueryableRegistry};
use crate::resource::{Locality, ResourceTable};
use crate::subscriber::{Subscriber, SubscriberCallback, SubscriptionRegistry};

/// The parameters fixed at session open (spec.md §6): everything else
/// (reliability class, congestion policy) is chosen per call.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub sn_resolution: ZInt,
    pub frag_buf_chunk: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            sn_resolution: zenoh_transport::SnState::default().resolution(),
            frag_buf_chunk: zenoh_transport::tx::FRAG_BUF_CHUNK_DEFAULT,
        }
    }
}

/// Everything `mutex_inner` protects: the resource table and both
/// registries, which reference each other (a subscription's index
/// entries are computed from resolved resource names).
#[derive(Debug, Default)]
struct SessionInner {
    resources: ResourceTable,
    subscriptions: SubscriptionRegistry,
    queryables: QueryableRegistry,
}

/// A single open point-to-point session over `L`. The hook invoked on a
/// failed link write during [`Session::trigger_queryables`]'s terminal
/// reply, mirroring `on_disconnect` in the C source.
pub struct Session<L: Link> {
    link: L,
    mutex_inner: Mutex<SessionInner>,
    mutex_tx: Mutex<TxState>,
    transmitted: AtomicBool,
    on_disconnect: Box<dyn Fn() + Send + Sync>,
}

impl<L: Link> Session<L> {
    pub fn open(link: L, config: SessionConfig, on_disconnect: impl Fn() + Send + Sync + 'static) -> Self {
        Session {
            link,
            mutex_inner: Mutex::new(SessionInner::default()),
            mutex_tx: Mutex::new(TxState::with_frag_buf_chunk(config.sn_resolution, config.frag_buf_chunk)),
            transmitted: AtomicBool::new(false),
            on_disconnect: Box::new(on_disconnect),
        }
    }

    /// Whether any link write has ever succeeded on this session.
    pub fn transmitted(&self) -> bool {
        self.transmitted.load(Ordering::Relaxed)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, SessionInner> {
        self.mutex_inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- declarations -------------------------------------------------

    pub fn declare_resource(&self, id: ZInt, key: ResKey) {
        self.lock_inner().resources.declare(Locality::Local, id, key);
    }

    pub fn undeclare_resource(&self, id: ZInt) {
        self.lock_inner().resources.undeclare(Locality::Local, id);
    }

    pub fn declare_subscriber(
        &self,
        id: ZInt,
        key: ResKey,
        info: SubInfo,
        callback: Option<SubscriberCallback>,
    ) -> ZResult<()> {
        let mut inner = self.lock_inner();
        let SessionInner {
            resources,
            subscriptions,
            ..
        } = &mut *inner;
        subscriptions.register_subscription(
            Locality::Local,
            Subscriber {
                id,
                key,
                info,
                callback,
            },
            resources,
        )
    }

    pub fn undeclare_subscriber(&self, id: ZInt) {
        self.lock_inner().subscriptions.unregister_subscription(Locality::Local, id);
    }

    pub fn declare_queryable(&self, id: ZInt, key: ResKey, kind: ZInt, callback: QueryableCallback) -> ZResult<()> {
        let mut inner = self.lock_inner();
        let SessionInner {
            resources, queryables, ..
        } = &mut *inner;
        queryables.register_queryable(
            Queryable {
                id,
                key,
                kind,
                callback,
            },
            resources,
        )
    }

    pub fn undeclare_queryable(&self, id: ZInt) {
        self.lock_inner().queryables.unregister_queryable(id);
    }

    /// Tears down session state: drains both registries (freeing their
    /// index maps per spec.md §4.3's `flush_subscriptions`) and clears the
    /// resource table for both localities. Declarations do not outlive a
    /// session close (spec.md §3). The link itself is not closed here
    /// (session handshake/teardown is a named-contract collaborator,
    /// spec.md §1).
    pub fn close(&self) {
        let mut inner = self.lock_inner();
        inner.subscriptions.flush();
        inner.queryables.flush();
        inner.resources.clear(Locality::Local);
        inner.resources.clear(Locality::Remote);
    }

    // ---- transmit path --------------------------------------------------

    /// Sends a transport message standalone (outside any FRAME), e.g. a
    /// KeepAlive or the terminal Unit built by [`Self::trigger_queryables`].
    pub fn send_transport_message(&self, msg: &TransportMessage) -> ZResult<()> {
        let mut state = self.mutex_tx.lock().unwrap_or_else(|e| e.into_inner());
        let res = send_transport_message_locked(&mut state.wbuf, &self.link, msg);
        if res.is_ok() {
            self.transmitted.store(true, Ordering::Relaxed);
        }
        res
    }

    /// Sends one zenoh message, applying the congestion policy (spec.md
    /// §4.6 step 1): `Block` waits for `mutex_tx`; `Drop` tries once and,
    /// on contention, reports success without writing.
    fn send_zenoh_message(
        &self,
        msg: ZenohMessage,
        reliability: Reliability,
        congestion_control: CongestionControl,
    ) -> ZResult<()> {
        let guard = match congestion_control {
            CongestionControl::Block => Some(self.mutex_tx.lock().unwrap_or_else(|e| e.into_inner())),
            CongestionControl::Drop => match self.mutex_tx.try_lock() {
                Ok(g) => Some(g),
                Err(_) => None,
            },
        };
        let mut state = match guard {
            Some(state) => state,
            None => {
                debug!("mutex_tx contended under DROP policy, dropping message");
                return Ok(());
            }
        };
        let res = send_zenoh_message_locked(&mut state, &self.link, reliability, msg);
        if res.is_ok() {
            self.transmitted.store(true, Ordering::Relaxed);
        }
        res
    }

    pub fn write(
        &self,
        key: ResKey,
        payload: Vec<u8>,
        reliability: Reliability,
        congestion_control: CongestionControl,
    ) -> ZResult<()> {
        self.send_zenoh_message(
            ZenohMessage::Data {
                key,
                payload,
                congestion_control,
            },
            reliability,
            congestion_control,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn query(
        &self,
        key: ResKey,
        predicate: String,
        qid: ZInt,
        target_kind: ZInt,
        reliability: Reliability,
        congestion_control: CongestionControl,
    ) -> ZResult<()> {
        self.send_zenoh_message(
            ZenohMessage::Query {
                key,
                predicate,
                qid,
                target_kind,
            },
            reliability,
            congestion_control,
        )
    }

    // ---- receive dispatcher --------------------------------------------

    /// Routes one decoded zenoh message to the registries (spec.md §4.7).
    /// Declarations and triggers are serialized by `mutex_inner`.
    pub fn handle_message(&self, msg: ZenohMessage) -> ZResult<()> {
        match msg {
            ZenohMessage::Declare(body) => self.handle_declare(body),
            ZenohMessage::Data { key, payload, .. } => {
                let inner = self.lock_inner();
                inner.subscriptions.trigger_subscriptions(&key, &payload, &inner.resources);
                Ok(())
            }
            ZenohMessage::Query {
                key,
                predicate,
                qid,
                target_kind,
            } => self.trigger_queryables(Query {
                qid,
                key,
                predicate,
                target_kind,
            }),
            ZenohMessage::Reply { .. } => {
                trace!("reply delivery to a local querier is a public-API-layer concern, dropping");
                Ok(())
            }
        }
    }

    fn handle_declare(&self, body: DeclareBody) -> ZResult<()> {
        let mut inner = self.lock_inner();
        match body {
            DeclareBody::Resource { id, key } => {
                let SessionInner {
                    resources,
                    subscriptions,
                    queryables,
                } = &mut *inner;
                resources.declare(Locality::Remote, id, key.clone());
                subscriptions.on_remote_resource_declared(id, &key, resources)?;
                queryables.on_remote_resource_declared(id, &key, resources)?;
                Ok(())
            }
            DeclareBody::Subscriber { id, key, info } => {
                let SessionInner {
                    resources,
                    subscriptions,
                    ..
                } = &mut *inner;
                subscriptions.register_subscription(
                    Locality::Remote,
                    Subscriber {
                        id,
                        key,
                        info,
                        callback: None,
                    },
                    resources,
                )
            }
            DeclareBody::Queryable { .. } => {
                trace!("remote queryable declarations are not tracked: a peer never issues queries against its own queryables");
                Ok(())
            }
            DeclareBody::ForgetResource { id } => {
                inner.resources.undeclare(Locality::Remote, id);
                Ok(())
            }
            DeclareBody::ForgetSubscriber { id } => {
                inner.subscriptions.unregister_subscription(Locality::Remote, id);
                Ok(())
            }
            DeclareBody::ForgetQueryable { .. } => Ok(()),
        }
    }

    /// Delivers a query to every matching local queryable in registration
    /// order, then sends a terminal Unit reply closing the query on the
    /// wire (spec.md §4.4). The reply is sent while `mutex_inner` is still
    /// held: the one case where holding both locks at once is correct,
    /// never the reverse order.
    ///
    /// If `query.key` references an undeclared remote resource, this is a
    /// silent no-op per spec.md §7's `UNKNOWN_RID`: no callback is invoked
    /// and, matching `queryable.c`'s `goto EXIT_QLE_TRIG` on `res == NULL`
    /// / `rname == NULL`, no terminal reply is sent either.
    pub fn trigger_queryables(&self, query: Query) -> ZResult<()> {
        let inner = self.lock_inner();
        let matches = match inner.queryables.matching_queryables(&query, &inner.resources) {
            Ok(matches) => matches,
            Err(e) if matches!(e.kind(), ZErrorKind::UnknownResourceId { .. }) => {
                trace!(
                    "query {} referenced an unknown resource id, skipping without a reply",
                    query.qid
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        for id in matches {
            if let Some(qle) = inner.queryables.get_queryable_by_id(id) {
                (qle.callback)(&query);
            }
        }

        let reply = TransportMessage::Unit {
            reply_context: Some(ReplyContext {
                qid: query.qid,
                replier_kind: 0,
                is_final: true,
            }),
        };
        match self.send_transport_message(&reply) {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.kind(), ZErrorKind::LinkWriteFailed { .. }) => {
                (self.on_disconnect)();
                match self.send_transport_message(&reply) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        warn!("terminal reply for query {} failed after retry: {e}", query.qid);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl<L: Link> std::fmt::Debug for Session<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::{Arc, Mutex as StdMutex};
    use zenoh_protocol_core::{Sample, QUERYABLE_ALL_KINDS};

    struct RecordingLink {
        streamed: bool,
        fail_next: RefCell<usize>,
        writes: RefCell<Vec<Vec<u8>>>,
    }

    impl RecordingLink {
        fn new(streamed: bool) -> Self {
            RecordingLink {
                streamed,
                fail_next: RefCell::new(0),
                writes: RefCell::new(Vec::new()),
            }
        }
    }

    impl Link for RecordingLink {
        fn is_streamed(&self) -> bool {
            self.streamed
        }

        fn write_all(&self, bytes: &[u8]) -> ZResult<()> {
            let mut fail_next = self.fail_next.borrow_mut();
            if *fail_next > 0 {
                *fail_next -= 1;
                return zerror!(ZErrorKind::LinkWriteFailed {
                    descr: "simulated failure".into(),
                });
            }
            self.writes.borrow_mut().push(bytes.to_vec());
            Ok(())
        }
    }

    fn key(name: &str) -> ResKey {
        ResKey::RName(name.into())
    }

    #[test]
    fn aliased_publish_end_to_end() {
        let session = Session::open(RecordingLink::new(false), SessionConfig::default(), || {});
        session.declare_resource(7, key("/s/1"));

        let hits: Arc<StdMutex<Vec<Sample>>> = Arc::new(StdMutex::new(Vec::new()));
        let hits2 = hits.clone();
        session
            .declare_subscriber(
                100,
                key("/s/*"),
                SubInfo::default(),
                Some(Arc::new(move |s: &Sample| hits2.lock().unwrap().push(s.clone()))),
            )
            .unwrap();

        session
            .handle_message(ZenohMessage::Data {
                key: key("/s/1"),
                payload: b"hello".to_vec(),
                congestion_control: CongestionControl::Block,
            })
            .unwrap();

        let recorded = hits.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].key, "/s/1");
    }

    #[test]
    fn query_lifecycle_invokes_matches_then_sends_terminal_unit() {
        let session = Session::open(RecordingLink::new(true), SessionConfig::default(), || {});
        let order: Arc<StdMutex<Vec<ZInt>>> = Arc::new(StdMutex::new(Vec::new()));

        for id in [1, 2] {
            let order = order.clone();
            session
                .declare_queryable(
                    id,
                    key("/a/*"),
                    QUERYABLE_ALL_KINDS,
                    Arc::new(move |_q: &Query| order.lock().unwrap().push(id)),
                )
                .unwrap();
        }

        session
            .handle_message(ZenohMessage::Query {
                key: key("/a/b"),
                predicate: String::new(),
                qid: 9,
                target_kind: QUERYABLE_ALL_KINDS,
            })
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
        assert!(session.transmitted());
    }

    #[test]
    fn terminal_reply_retries_once_via_on_disconnect() {
        let link = RecordingLink::new(true);
        *link.fail_next.borrow_mut() = 1;
        let disconnects = Arc::new(StdMutex::new(0));
        let disconnects2 = disconnects.clone();
        let session = Session::open(link, SessionConfig::default(), move || {
            *disconnects2.lock().unwrap() += 1;
        });

        session
            .handle_message(ZenohMessage::Query {
                key: key("/a"),
                predicate: String::new(),
                qid: 1,
                target_kind: QUERYABLE_ALL_KINDS,
            })
            .unwrap();

        assert_eq!(*disconnects.lock().unwrap(), 1);
    }

    #[test]
    fn drop_policy_under_contended_tx_mutex_writes_nothing() {
        let session = Session::open(RecordingLink::new(false), SessionConfig::default(), || {});
        let _held = session.mutex_tx.lock().unwrap();
        let res = session.write(
            key("/a"),
            vec![1, 2, 3],
            Reliability::Reliable,
            CongestionControl::Drop,
        );
        assert!(res.is_ok());
        assert!(!session.transmitted());
    }

    #[test]
    fn close_drains_registries_and_resources() {
        let session = Session::open(RecordingLink::new(false), SessionConfig::default(), || {});
        session.declare_resource(7, key("/s/1"));
        session
            .declare_subscriber(100, key("/s/*"), SubInfo::default(), None)
            .unwrap();
        session
            .declare_queryable(1, key("/a"), QUERYABLE_ALL_KINDS, Arc::new(|_q: &Query| {}))
            .unwrap();

        session.close();

        let inner = session.lock_inner();
        assert!(inner.subscriptions.get_subscription_by_id(Locality::Local, 100).is_none());
        assert!(inner.queryables.get_queryable_by_id(1).is_none());
        assert!(inner.resources.get_resource_by_id(Locality::Local, 7).is_none());
    }

    #[test]
    fn unknown_remote_id_publish_is_a_silent_no_op() {
        let session = Session::open(RecordingLink::new(false), SessionConfig::default(), || {});
        // No resource 99 was ever declared remotely.
        session
            .handle_message(ZenohMessage::Data {
                key: ResKey::RId(99),
                payload: vec![1],
                congestion_control: CongestionControl::Block,
            })
            .unwrap();
    }

    #[test]
    fn query_against_unknown_remote_id_sends_no_reply() {
        let link = RecordingLink::new(true);
        let session = Session::open(link, SessionConfig::default(), || {});
        session
            .declare_queryable(1, key("/a"), QUERYABLE_ALL_KINDS, Arc::new(|_q: &Query| {
                panic!("callback must not be invoked for an unknown remote id");
            }))
            .unwrap();

        // No resource 99 was ever declared remotely: the query's key
        // can't resolve, so neither a callback nor a terminal reply
        // should be produced.
        session
            .handle_message(ZenohMessage::Query {
                key: ResKey::RId(99),
                predicate: String::new(),
                qid: 1,
                target_kind: QUERYABLE_ALL_KINDS,
            })
            .unwrap();

        assert!(!session.transmitted());
    }
}
