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
// Contributors:
//   ZettaScale Zenoh Team, <zenoh@zettascale.tech>
//
//! Error kinds and configurable statics shared by every crate in the
//! workspace. Mirrors the `zerror!`/`zconfigurable!` macros used throughout
//! `zenoh/src/net/session.rs` in the teacher crate, adapted to the
//! taxonomy in spec.md §7.

pub mod core;

pub use crate::core::{ZError, ZErrorKind, ZResult};

#[doc(hidden)]
pub use lazy_static::lazy_static as __lazy_static;

/// Builds a [`ZError`] of the given [`ZErrorKind`] at the call site and
/// wraps it in `Err`, tagging it with the file/line it was raised from.
///
/// ```ignore
/// return zerror!(ZErrorKind::UnknownResourceId { rid: rid.to_string() });
/// ```
#[macro_export]
macro_rules! zerror {
    ($kind:expr) => {
        Err($crate::ZError::new($kind, file!(), line!()))
    };
}

/// Declares a set of process-wide configurable statics, each overridable by
/// setting an environment variable named after the static. This is the
/// Rust counterpart of zenoh-pico's compile-time `Z_*` knobs and of the
/// teacher's `zconfigurable!` usage for channel sizes.
#[macro_export]
macro_rules! zconfigurable {
    ($(static ref $name:ident : $ty:ty = $default:expr;)*) => {
        $crate::__lazy_static! {
            $(
                static ref $name: $ty = {
                    match std::env::var(stringify!($name)) {
                        Ok(val) => val.parse::<$ty>().unwrap_or($default),
                        Err(_) => $default,
                    }
                };
            )*
        }
    };
}
