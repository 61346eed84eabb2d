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
//! The per-session transmit pipeline: sequence-number bookkeeping,
//! frame/fragment assembly and the single write onto a [`link::Link`].
//! Every function here is named with the `_locked` suffix used
//! throughout: the caller is expected to already hold the session's
//! `mutex_tx` guard (spec.md §2/§5). Acquiring that guard, and choosing
//! between blocking and dropping under congestion, is the session
//! crate's job; this crate only does what happens once the guard is
//! held.

pub mod link;
pub mod sn;
pub mod tx;

pub use link::Link;
pub use sn::SnState;
pub use tx::{
    finalize_wbuf_locked, prepare_wbuf_locked, send_transport_message_locked,
    send_zenoh_message_locked, TxState, MAX_MSG_LEN,
};
