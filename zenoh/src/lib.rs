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
//! The session-level dispatch engine for a single point-to-point zenoh
//! session: the resource-key matcher, the resource table, the
//! subscription and queryable registries, and the [`Session`] type that
//! wires all of it to a transmit pipeline from `zenoh_transport`.
//!
//! Physical link I/O, the session handshake, scouting and the wire codec
//! are named-contract-only collaborators this crate does not implement;
//! see [`zenoh_transport::Link`] for the contract a transport must offer.

pub mod key_expr;
pub mod queryable;
pub mod resource;
pub mod session;
pub mod subscriber;

pub use key_expr::rname_intersect;
pub use queryable::{Query, Queryable, QueryableCallback, QueryableRegistry};
pub use resource::{Locality, Resource, ResourceTable};
pub use session::{Session, SessionConfig};
pub use subscriber::{Subscriber, SubscriberCallback, SubscriptionRegistry};
