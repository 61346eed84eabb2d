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
use std::fmt;

/// The error taxonomy from spec.md §7. `CongestionDropped` is deliberately
/// absent: a congestion-control drop is a successful, logged no-op, never
/// an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZErrorKind {
    /// A resource id was referenced without a prior DECLARE.
    UnknownResourceId { rid: String },
    /// A subscriber key or queryable id is already registered.
    DuplicateRegistration { descr: String },
    /// Serializing a message overflowed the target buffer and the buffer
    /// cannot be grown (the expandable fragmentation buffer failed too).
    EncodeOverflow { descr: String },
    /// The link rejected a write.
    LinkWriteFailed { descr: String },
    /// A streamed message's total length exceeds the 2-byte length prefix.
    MessageTooLarge { len: usize },
    /// Catch-all for error conditions outside the taxonomy above.
    Other { descr: String },
}

impl fmt::Display for ZErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZErrorKind::UnknownResourceId { rid } => write!(f, "unknown resource id: {rid}"),
            ZErrorKind::DuplicateRegistration { descr } => {
                write!(f, "duplicate registration: {descr}")
            }
            ZErrorKind::EncodeOverflow { descr } => write!(f, "encode overflow: {descr}"),
            ZErrorKind::LinkWriteFailed { descr } => write!(f, "link write failed: {descr}"),
            ZErrorKind::MessageTooLarge { len } => {
                write!(f, "message too large: {len} bytes exceeds 65535")
            }
            ZErrorKind::Other { descr } => write!(f, "{descr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZError {
    kind: ZErrorKind,
    file: &'static str,
    line: u32,
}

impl ZError {
    pub fn new(kind: ZErrorKind, file: &'static str, line: u32) -> Self {
        ZError { kind, file, line }
    }

    pub fn kind(&self) -> &ZErrorKind {
        &self.kind
    }
}

impl fmt::Display for ZError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.kind, self.file, self.line)
    }
}

impl std::error::Error for ZError {}

pub type ZResult<T> = Result<T, ZError>;
