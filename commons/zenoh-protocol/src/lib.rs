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
//! Message shapes exchanged between the session and the transport's
//! transmit/receive pipeline (spec.md §5/§6). A [`TransportMessage`] is
//! what actually crosses a link; a [`ZenohMessage`] is what a `FRAME`
//! carries. Byte-level encoding lives in `zenoh-codec`; this crate only
//! fixes the shapes both sides agree on.

use zenoh_protocol_core::{Period, Reliability, ResKey, SubInfo, ZInt};

/// A single declaration inside a `DECLARE` message. Declarations are
/// batched (the C source sends one `DECLARE` carrying a
/// `declaration_array`), but the session processes them one at a time,
/// so the registries only ever see a single [`DeclareBody`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeclareBody {
    Resource { id: ZInt, key: ResKey },
    Subscriber { id: ZInt, key: ResKey, info: SubInfo },
    Queryable { id: ZInt, key: ResKey, kind: ZInt },
    ForgetResource { id: ZInt },
    ForgetSubscriber { id: ZInt },
    ForgetQueryable { id: ZInt },
}

/// Carried on a terminal `UNIT` transport message to tell the querier
/// which outstanding query a reply (or the end-of-replies marker)
/// belongs to. Mirrors `_zn_reply_context_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyContext {
    pub qid: ZInt,
    pub replier_kind: ZInt,
    /// Set on the terminal marker queryable.c sends after the last
    /// matching queryable has been invoked.
    pub is_final: bool,
}

/// A message carried inside a `FRAME`'s payload, addressed to the
/// session's receive dispatcher (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub enum ZenohMessage {
    Declare(DeclareBody),
    Data {
        key: ResKey,
        payload: Vec<u8>,
        congestion_control: zenoh_protocol_core::CongestionControl,
    },
    Query {
        key: ResKey,
        predicate: String,
        qid: ZInt,
        target_kind: ZInt,
    },
    Reply {
        reply_context: ReplyContext,
        key: ResKey,
        payload: Vec<u8>,
    },
}

/// What a `FRAME` transport message carries: either a batch of whole
/// zenoh messages, or a raw slice of a single zenoh message too large to
/// fit in one frame (spec.md §5 fragmentation).
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Messages(Vec<ZenohMessage>),
    Fragment(Vec<u8>),
}

/// Position of a `FRAME` within a (possibly fragmented) sequence:
/// whether it carries a fragment at all, and if so whether it is the
/// last one. Encodes the F/E header bits from `__zn_frame_header`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Whole,
    Fragment { is_final: bool },
}

/// A message that actually crosses a link. Open/Close/KeepAlive/Ack are
/// carried as opaque passthrough variants: the handshake and link
/// keepalive machinery are named-contract-only collaborators (spec.md
/// §2), so this crate fixes their presence in the enum without giving
/// them a payload to interpret.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Frame {
        reliability: Reliability,
        sn: ZInt,
        kind: FrameKind,
        payload: FramePayload,
    },
    /// Sent standalone (outside any `FRAME`) to carry a [`ReplyContext`]
    /// marking the end of a query's replies, per `_zn_trigger_queryables`.
    Unit { reply_context: Option<ReplyContext> },
    KeepAlive,
    Close { reason: u8 },
}

/// A period-carrying declaration helper used by tests exercising pull
/// mode shapes; triggering a pull schedule itself is out of scope.
#[cfg(test)]
fn sample_period() -> Period {
    Period {
        origin: 0,
        period: 1000,
        duration: 100,
    }
}
