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
//! Byte-level encode/decode for [`TransportMessage`] and [`ZenohMessage`].
//! This is a minimal wire format sufficient to drive the transmit
//! pipeline's framing and fragmentation (spec.md §5) and the receive
//! dispatcher (spec.md §6) end to end; it is not an interop encoding.

use zenoh_buffers::{RBuf, WBuf};
use zenoh_core::{zerror, ZErrorKind, ZResult};
use zenoh_protocol::{DeclareBody, FrameKind, FramePayload, ReplyContext, TransportMessage, ZenohMessage};
use zenoh_protocol_core::{CongestionControl, Period, Reliability, ResKey, SubInfo, SubMode, ZInt};

const MID_FRAME: u8 = 0x01;
const MID_UNIT: u8 = 0x02;
const MID_KEEP_ALIVE: u8 = 0x03;
const MID_CLOSE: u8 = 0x04;

const FLAG_R: u8 = 0x80;
const FLAG_F: u8 = 0x40;
const FLAG_E: u8 = 0x20;

const ZM_DECLARE: u8 = 0x10;
const ZM_DATA: u8 = 0x11;
const ZM_QUERY: u8 = 0x12;
const ZM_REPLY: u8 = 0x13;

const DECL_RESOURCE: u8 = 0x01;
const DECL_SUBSCRIBER: u8 = 0x02;
const DECL_QUERYABLE: u8 = 0x03;
const DECL_FORGET_RESOURCE: u8 = 0x04;
const DECL_FORGET_SUBSCRIBER: u8 = 0x05;
const DECL_FORGET_QUERYABLE: u8 = 0x06;

const RESKEY_ID: u8 = 0x01;
const RESKEY_NAME: u8 = 0x02;
const RESKEY_ID_SUFFIX: u8 = 0x03;

fn write_string(wbuf: &mut WBuf, s: &str) -> ZResult<()> {
    wbuf.write_zint(s.len() as u64)?;
    wbuf.write_bytes(s.as_bytes())
}

fn read_string(rbuf: &mut RBuf) -> ZResult<String> {
    let len = rbuf.read_zint()? as usize;
    let bytes = rbuf.read_bytes(len)?;
    String::from_utf8(bytes).map_err(|e| {
        zerror!(ZErrorKind::Other {
            descr: format!("invalid utf8 in string: {e}"),
        })
        .unwrap_err()
    })
}

fn write_reskey(wbuf: &mut WBuf, key: &ResKey) -> ZResult<()> {
    match key {
        ResKey::RId(id) => {
            wbuf.write_byte(RESKEY_ID)?;
            wbuf.write_zint(*id)
        }
        ResKey::RName(name) => {
            wbuf.write_byte(RESKEY_NAME)?;
            write_string(wbuf, name)
        }
        ResKey::RIdWithSuffix(id, suffix) => {
            wbuf.write_byte(RESKEY_ID_SUFFIX)?;
            wbuf.write_zint(*id)?;
            write_string(wbuf, suffix)
        }
    }
}

fn read_reskey(rbuf: &mut RBuf) -> ZResult<ResKey> {
    match rbuf.read_byte()? {
        RESKEY_ID => Ok(ResKey::RId(rbuf.read_zint()?)),
        RESKEY_NAME => Ok(ResKey::RName(read_string(rbuf)?)),
        RESKEY_ID_SUFFIX => {
            let id = rbuf.read_zint()?;
            let suffix = read_string(rbuf)?;
            Ok(ResKey::RIdWithSuffix(id, suffix))
        }
        other => zerror!(ZErrorKind::Other {
            descr: format!("unknown reskey tag {other}"),
        }),
    }
}

fn write_sub_info(wbuf: &mut WBuf, info: &SubInfo) -> ZResult<()> {
    let reliability = match info.reliability {
        Reliability::Reliable => 1u8,
        Reliability::BestEffort => 0u8,
    };
    let mode = match info.mode {
        SubMode::Push => 0u8,
        SubMode::Pull => 1u8,
    };
    wbuf.write_byte(reliability)?;
    wbuf.write_byte(mode)?;
    match info.period {
        Some(p) => {
            wbuf.write_byte(1)?;
            wbuf.write_zint(p.origin)?;
            wbuf.write_zint(p.period)?;
            wbuf.write_zint(p.duration)?;
        }
        None => wbuf.write_byte(0)?,
    }
    Ok(())
}

fn read_sub_info(rbuf: &mut RBuf) -> ZResult<SubInfo> {
    let reliability = if rbuf.read_byte()? == 1 {
        Reliability::Reliable
    } else {
        Reliability::BestEffort
    };
    let mode = if rbuf.read_byte()? == 1 {
        SubMode::Pull
    } else {
        SubMode::Push
    };
    let period = if rbuf.read_byte()? == 1 {
        Some(Period {
            origin: rbuf.read_zint()?,
            period: rbuf.read_zint()?,
            duration: rbuf.read_zint()?,
        })
    } else {
        None
    };
    Ok(SubInfo {
        reliability,
        mode,
        period,
    })
}

fn write_declare_body(wbuf: &mut WBuf, body: &DeclareBody) -> ZResult<()> {
    match body {
        DeclareBody::Resource { id, key } => {
            wbuf.write_byte(DECL_RESOURCE)?;
            wbuf.write_zint(*id)?;
            write_reskey(wbuf, key)
        }
        DeclareBody::Subscriber { id, key, info } => {
            wbuf.write_byte(DECL_SUBSCRIBER)?;
            wbuf.write_zint(*id)?;
            write_reskey(wbuf, key)?;
            write_sub_info(wbuf, info)
        }
        DeclareBody::Queryable { id, key, kind } => {
            wbuf.write_byte(DECL_QUERYABLE)?;
            wbuf.write_zint(*id)?;
            write_reskey(wbuf, key)?;
            wbuf.write_zint(*kind)
        }
        DeclareBody::ForgetResource { id } => {
            wbuf.write_byte(DECL_FORGET_RESOURCE)?;
            wbuf.write_zint(*id)
        }
        DeclareBody::ForgetSubscriber { id } => {
            wbuf.write_byte(DECL_FORGET_SUBSCRIBER)?;
            wbuf.write_zint(*id)
        }
        DeclareBody::ForgetQueryable { id } => {
            wbuf.write_byte(DECL_FORGET_QUERYABLE)?;
            wbuf.write_zint(*id)
        }
    }
}

fn read_declare_body(rbuf: &mut RBuf) -> ZResult<DeclareBody> {
    match rbuf.read_byte()? {
        DECL_RESOURCE => {
            let id = rbuf.read_zint()?;
            let key = read_reskey(rbuf)?;
            Ok(DeclareBody::Resource { id, key })
        }
        DECL_SUBSCRIBER => {
            let id = rbuf.read_zint()?;
            let key = read_reskey(rbuf)?;
            let info = read_sub_info(rbuf)?;
            Ok(DeclareBody::Subscriber { id, key, info })
        }
        DECL_QUERYABLE => {
            let id = rbuf.read_zint()?;
            let key = read_reskey(rbuf)?;
            let kind = rbuf.read_zint()?;
            Ok(DeclareBody::Queryable { id, key, kind })
        }
        DECL_FORGET_RESOURCE => Ok(DeclareBody::ForgetResource {
            id: rbuf.read_zint()?,
        }),
        DECL_FORGET_SUBSCRIBER => Ok(DeclareBody::ForgetSubscriber {
            id: rbuf.read_zint()?,
        }),
        DECL_FORGET_QUERYABLE => Ok(DeclareBody::ForgetQueryable {
            id: rbuf.read_zint()?,
        }),
        other => zerror!(ZErrorKind::Other {
            descr: format!("unknown declare body tag {other}"),
        }),
    }
}

fn write_reply_context(wbuf: &mut WBuf, ctx: &ReplyContext) -> ZResult<()> {
    wbuf.write_zint(ctx.qid)?;
    wbuf.write_zint(ctx.replier_kind)?;
    wbuf.write_byte(ctx.is_final as u8)
}

fn read_reply_context(rbuf: &mut RBuf) -> ZResult<ReplyContext> {
    let qid = rbuf.read_zint()?;
    let replier_kind = rbuf.read_zint()?;
    let is_final = rbuf.read_byte()? != 0;
    Ok(ReplyContext {
        qid,
        replier_kind,
        is_final,
    })
}

/// Encodes a single [`ZenohMessage`] (no framing). Used both to fill a
/// `FRAME`'s `Messages` payload and, by the fragmentation loop in
/// `zenoh-transport`, to produce the raw bytes that get sliced across
/// several `Fragment` payloads.
pub fn encode_zenoh_message(wbuf: &mut WBuf, msg: &ZenohMessage) -> ZResult<()> {
    match msg {
        ZenohMessage::Declare(body) => {
            wbuf.write_byte(ZM_DECLARE)?;
            write_declare_body(wbuf, body)
        }
        ZenohMessage::Data {
            key,
            payload,
            congestion_control,
        } => {
            wbuf.write_byte(ZM_DATA)?;
            write_reskey(wbuf, key)?;
            wbuf.write_byte(matches!(congestion_control, CongestionControl::Drop) as u8)?;
            wbuf.write_zint(payload.len() as u64)?;
            wbuf.write_bytes(payload)
        }
        ZenohMessage::Query {
            key,
            predicate,
            qid,
            target_kind,
        } => {
            wbuf.write_byte(ZM_QUERY)?;
            write_reskey(wbuf, key)?;
            write_string(wbuf, predicate)?;
            wbuf.write_zint(*qid)?;
            wbuf.write_zint(*target_kind)
        }
        ZenohMessage::Reply {
            reply_context,
            key,
            payload,
        } => {
            wbuf.write_byte(ZM_REPLY)?;
            write_reply_context(wbuf, reply_context)?;
            write_reskey(wbuf, key)?;
            wbuf.write_zint(payload.len() as u64)?;
            wbuf.write_bytes(payload)
        }
    }
}

pub fn decode_zenoh_message(rbuf: &mut RBuf) -> ZResult<ZenohMessage> {
    match rbuf.read_byte()? {
        ZM_DECLARE => Ok(ZenohMessage::Declare(read_declare_body(rbuf)?)),
        ZM_DATA => {
            let key = read_reskey(rbuf)?;
            let congestion_control = if rbuf.read_byte()? != 0 {
                CongestionControl::Drop
            } else {
                CongestionControl::Block
            };
            let len = rbuf.read_zint()? as usize;
            let payload = rbuf.read_bytes(len)?;
            Ok(ZenohMessage::Data {
                key,
                payload,
                congestion_control,
            })
        }
        ZM_QUERY => {
            let key = read_reskey(rbuf)?;
            let predicate = read_string(rbuf)?;
            let qid = rbuf.read_zint()?;
            let target_kind = rbuf.read_zint()?;
            Ok(ZenohMessage::Query {
                key,
                predicate,
                qid,
                target_kind,
            })
        }
        ZM_REPLY => {
            let reply_context = read_reply_context(rbuf)?;
            let key = read_reskey(rbuf)?;
            let len = rbuf.read_zint()? as usize;
            let payload = rbuf.read_bytes(len)?;
            Ok(ZenohMessage::Reply {
                reply_context,
                key,
                payload,
            })
        }
        other => zerror!(ZErrorKind::Other {
            descr: format!("unknown zenoh message id {other}"),
        }),
    }
}

/// Writes a `FRAME` header's R/F/E flag byte and sequence number, with no
/// payload. Split out from [`encode_transport_message`] so the
/// fragmentation loop in `zenoh-transport` can write a header, inspect
/// how much room is left in the buffer, and rewrite the header in place
/// with the `E` (final) bit set if the remaining fragment turns out to
/// fit (the same rewind-and-reencode two-pass trick the transmit
/// pipeline uses for the whole frame).
pub fn encode_frame_header(
    wbuf: &mut WBuf,
    reliability: Reliability,
    sn: ZInt,
    kind: FrameKind,
) -> ZResult<()> {
    let mut flags = 0u8;
    if matches!(reliability, Reliability::Reliable) {
        flags |= FLAG_R;
    }
    if let FrameKind::Fragment { is_final } = kind {
        flags |= FLAG_F;
        if is_final {
            flags |= FLAG_E;
        }
    }
    wbuf.write_byte(MID_FRAME | flags)?;
    wbuf.write_zint(sn)
}

/// Encodes a [`TransportMessage`], including its `FRAME` header flags
/// (R/F/E) as built by `zenoh-transport`'s frame header assembly. A
/// fragment's bytes carry no length prefix of their own: a `FRAME` with
/// the `F` flag set is defined to consume the rest of the buffer, the
/// same way a streamed link's 2-byte length prefix (or a datagram link's
/// own boundary) tells the receiver where the message ends.
pub fn encode_transport_message(wbuf: &mut WBuf, msg: &TransportMessage) -> ZResult<()> {
    match msg {
        TransportMessage::Frame {
            reliability,
            sn,
            kind,
            payload,
        } => {
            encode_frame_header(wbuf, *reliability, *sn, *kind)?;
            match payload {
                FramePayload::Messages(msgs) => {
                    wbuf.write_zint(msgs.len() as u64)?;
                    for m in msgs {
                        encode_zenoh_message(wbuf, m)?;
                    }
                }
                FramePayload::Fragment(bytes) => {
                    wbuf.write_bytes(bytes)?;
                }
            }
            Ok(())
        }
        TransportMessage::Unit { reply_context } => {
            let flags = if reply_context.is_some() { FLAG_F } else { 0 };
            wbuf.write_byte(MID_UNIT | flags)?;
            if let Some(ctx) = reply_context {
                write_reply_context(wbuf, ctx)?;
            }
            Ok(())
        }
        TransportMessage::KeepAlive => wbuf.write_byte(MID_KEEP_ALIVE),
        TransportMessage::Close { reason } => {
            wbuf.write_byte(MID_CLOSE)?;
            wbuf.write_byte(*reason)
        }
    }
}

pub fn decode_transport_message(rbuf: &mut RBuf) -> ZResult<TransportMessage> {
    let header = rbuf.read_byte()?;
    let mid = header & 0x1f;
    let flags = header & 0xe0;
    match mid {
        MID_FRAME => {
            let reliability = if flags & FLAG_R != 0 {
                Reliability::Reliable
            } else {
                Reliability::BestEffort
            };
            let sn = rbuf.read_zint()?;
            let kind = if flags & FLAG_F != 0 {
                FrameKind::Fragment {
                    is_final: flags & FLAG_E != 0,
                }
            } else {
                FrameKind::Whole
            };
            let payload = match kind {
                FrameKind::Whole => {
                    let count = rbuf.read_zint()?;
                    let mut msgs = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        msgs.push(decode_zenoh_message(rbuf)?);
                    }
                    FramePayload::Messages(msgs)
                }
                FrameKind::Fragment { .. } => {
                    let len = rbuf.len();
                    FramePayload::Fragment(rbuf.read_bytes(len)?)
                }
            };
            Ok(TransportMessage::Frame {
                reliability,
                sn,
                kind,
                payload,
            })
        }
        MID_UNIT => {
            let reply_context = if flags & FLAG_F != 0 {
                Some(read_reply_context(rbuf)?)
            } else {
                None
            };
            Ok(TransportMessage::Unit { reply_context })
        }
        MID_KEEP_ALIVE => Ok(TransportMessage::KeepAlive),
        MID_CLOSE => Ok(TransportMessage::Close {
            reason: rbuf.read_byte()?,
        }),
        other => zerror!(ZErrorKind::Other {
            descr: format!("unknown transport message id {other}"),
        }),
    }
}

/// Reassembles the zenoh message carried by a run of fragments: the
/// caller (the receive dispatcher) accumulates `Fragment` payloads in
/// arrival order until one arrives with `is_final`, concatenates their
/// bytes, then hands the result here to decode the single message they
/// jointly encoded.
pub fn decode_fragmented_zenoh_message(fragments: &[Vec<u8>]) -> ZResult<ZenohMessage> {
    let mut joined = Vec::new();
    for f in fragments {
        joined.extend_from_slice(f);
    }
    let mut rbuf = RBuf::from(joined);
    decode_zenoh_message(&mut rbuf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zenoh_protocol_core::QUERYABLE_STORAGE;

    fn sample_data_message() -> ZenohMessage {
        ZenohMessage::Data {
            key: ResKey::RName("a/b/c".into()),
            payload: vec![1, 2, 3, 4, 5],
            congestion_control: CongestionControl::Block,
        }
    }

    #[test]
    fn whole_frame_round_trips() {
        let msg = TransportMessage::Frame {
            reliability: Reliability::Reliable,
            sn: 42,
            kind: FrameKind::Whole,
            payload: FramePayload::Messages(vec![sample_data_message()]),
        };
        let mut wbuf = WBuf::with_capacity(256);
        encode_transport_message(&mut wbuf, &msg).unwrap();
        let mut rbuf = RBuf::from(wbuf.as_bytes().to_vec());
        let decoded = decode_transport_message(&mut rbuf).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn fragmentation_reconstitutes_original_message() {
        let big_payload: Vec<u8> = (0..500u32).map(|i| (i % 256) as u8).collect();
        let original = ZenohMessage::Data {
            key: ResKey::RId(9),
            payload: big_payload,
            congestion_control: CongestionControl::Block,
        };
        let mut full = WBuf::expandable();
        encode_zenoh_message(&mut full, &original).unwrap();

        let chunk = 64usize;
        let mut fragments = Vec::new();
        let bytes = full.as_bytes().to_vec();
        for slice in bytes.chunks(chunk) {
            fragments.push(slice.to_vec());
        }
        let reassembled = decode_fragmented_zenoh_message(&fragments).unwrap();
        assert_eq!(reassembled, original);
    }

    #[test]
    fn unit_with_reply_context_round_trips() {
        let msg = TransportMessage::Unit {
            reply_context: Some(ReplyContext {
                qid: 7,
                replier_kind: QUERYABLE_STORAGE,
                is_final: true,
            }),
        };
        let mut wbuf = WBuf::with_capacity(64);
        encode_transport_message(&mut wbuf, &msg).unwrap();
        let mut rbuf = RBuf::from(wbuf.as_bytes().to_vec());
        assert_eq!(decode_transport_message(&mut rbuf).unwrap(), msg);
    }

    #[test]
    fn declare_subscriber_round_trips() {
        let msg = ZenohMessage::Declare(DeclareBody::Subscriber {
            id: 3,
            key: ResKey::RIdWithSuffix(1, "/x".into()),
            info: SubInfo::default(),
        });
        let mut wbuf = WBuf::expandable();
        encode_zenoh_message(&mut wbuf, &msg).unwrap();
        let mut rbuf = RBuf::from(wbuf.as_bytes().to_vec());
        assert_eq!(decode_zenoh_message(&mut rbuf).unwrap(), msg);
    }
}
