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
//! Core wire-adjacent types shared between the session and the codec:
//! resource keys, reliability/congestion control, subscription modes and
//! the query-kind bitmask. None of this crate talks to a link; it is the
//! vocabulary the session and the codec agree on.

use std::fmt;

/// A zenoh varint. The wire-size tradeoff (7 bits per byte) is handled by
/// the codec; here it is just a plain integer.
pub type ZInt = u64;

/// Sentinel `rid` meaning "no numerical id is assigned", the Rust
/// counterpart of zenoh-pico's `ZN_NO_RESOURCE_ID`.
pub const NO_RESOURCE_ID: ZInt = ZInt::MAX;

/// A resource key as declared or referenced on the wire. The C source
/// models this as a single struct carrying both an `rid` (with a
/// sentinel for "none") and an optional suffix string; here it is an
/// enum with exactly the three forms spec.md's DESIGN NOTES calls out as
/// valid, so an invalid combination is unrepresentable rather than a
/// runtime check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResKey {
    /// A previously declared numerical id, resolved via the resource
    /// table.
    RId(ZInt),
    /// A plain, self-contained name; never resolved.
    RName(String),
    /// A previously declared id plus a suffix appended to the resolved
    /// name.
    RIdWithSuffix(ZInt, String),
}

impl fmt::Display for ResKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResKey::RId(id) => write!(f, "#{id}"),
            ResKey::RName(name) => write!(f, "{name}"),
            ResKey::RIdWithSuffix(id, suffix) => write!(f, "#{id}{suffix}"),
        }
    }
}

/// Reliability class a subscription or a message is sent under. Each
/// class has its own independent sequence-number space (spec.md §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    Reliable,
    BestEffort,
}

/// What happens when the TX mutex is already held by another thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CongestionControl {
    /// Block until the mutex is free.
    Block,
    /// Try once; if the mutex is held, drop the message.
    Drop,
}

/// Push vs pull delivery for a subscription. Pull mode is carried as a
/// variant for protocol completeness; triggering a pull is out of scope
/// (spec.md Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubMode {
    Push,
    Pull,
}

/// A periodic schedule attached to a pull-mode subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    pub origin: ZInt,
    pub period: ZInt,
    pub duration: ZInt,
}

/// The declaration payload of a DECLARE(subscriber): how the subscriber
/// wants data delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubInfo {
    pub reliability: Reliability,
    pub mode: SubMode,
    pub period: Option<Period>,
}

impl Default for SubInfo {
    fn default() -> Self {
        SubInfo {
            reliability: Reliability::Reliable,
            mode: SubMode::Push,
            period: None,
        }
    }
}

/// A single delivered data item: a resolved key and its payload. This is
/// what a subscription or queryable callback actually sees, as opposed
/// to the raw `ZenohMessage` the dispatcher decoded it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub key: String,
    pub value: Vec<u8>,
}

/// Bit reserved in a query's `target.kind` meaning "match regardless of
/// the queryable's own kind", the Rust counterpart of
/// `ZN_QUERYABLE_ALL_KINDS`. Any other bit is a specific queryable kind
/// (e.g. storage vs eval) and is matched by plain bitwise overlap.
pub const QUERYABLE_ALL_KINDS: ZInt = 0x01;

/// Default kind a queryable registers under when the caller doesn't
/// specify one.
pub const QUERYABLE_STORAGE: ZInt = 0x02;
pub const QUERYABLE_EVAL: ZInt = 0x04;

/// `true` if a query whose target carries `target_kind` should be
/// delivered to a queryable registered under `queryable_kind`. Mirrors
/// `(target->kind & ZN_QUERYABLE_ALL_KINDS) | (target->kind &
/// qle->kind)` from `queryable.c`'s `_zn_trigger_queryables`.
pub fn query_kind_matches(target_kind: ZInt, queryable_kind: ZInt) -> bool {
    (target_kind & QUERYABLE_ALL_KINDS) | (target_kind & queryable_kind) != 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_bit_matches_any_queryable() {
        assert!(query_kind_matches(QUERYABLE_ALL_KINDS, QUERYABLE_EVAL));
        assert!(query_kind_matches(QUERYABLE_ALL_KINDS, 0));
    }

    #[test]
    fn specific_kind_requires_overlap() {
        assert!(query_kind_matches(QUERYABLE_STORAGE, QUERYABLE_STORAGE));
        assert!(!query_kind_matches(QUERYABLE_STORAGE, QUERYABLE_EVAL));
    }

    #[test]
    fn reskey_display_forms() {
        assert_eq!(ResKey::RId(7).to_string(), "#7");
        assert_eq!(ResKey::RName("a/b".into()).to_string(), "a/b");
        assert_eq!(ResKey::RIdWithSuffix(7, "/c".into()).to_string(), "#7/c");
    }
}
