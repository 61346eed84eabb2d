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
//! The link a session writes onto. Concrete transports (TCP, UDP,
//! serial, ...) are a named-contract-only collaborator (spec.md §2):
//! this crate only fixes the shape every link must offer the transmit
//! pipeline.

use zenoh_core::ZResult;

/// What the transmit pipeline needs from a link: whether it is a
/// streamed (byte-oriented, needs a length prefix) or a message-oriented
/// (datagram) transport, and a way to push a fully framed buffer out.
pub trait Link {
    /// `true` for byte-streams (e.g. TCP, serial) where message
    /// boundaries aren't preserved and a 2-byte length prefix is
    /// required; `false` for transports that preserve message
    /// boundaries on their own (e.g. UDP).
    fn is_streamed(&self) -> bool;

    /// Writes the entirety of `bytes` onto the link. Expected to either
    /// write everything or fail; no partial-write contract.
    fn write_all(&self, bytes: &[u8]) -> ZResult<()>;
}
