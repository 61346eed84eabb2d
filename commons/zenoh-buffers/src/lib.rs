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
//! Write/read cursors over a byte buffer, the Rust counterpart of
//! zenoh-pico's `_z_wbuf_t`/`_z_rbuf_t`. `WBuf` backs both the session's
//! per-link write buffer and the expandable fragmentation buffer `fbf`
//! described in spec.md §5; `RBuf` backs the receive side.

use zenoh_core::{zerror, ZErrorKind, ZResult};

/// A write buffer with an independent write cursor (`wpos`) and drain
/// cursor (`rpos`). `len()` is `wpos - rpos`: on a freshly cleared buffer
/// that is the number of bytes written; on a buffer being drained by the
/// fragmentation loop (spec.md §5, `fbf`) it is the number of bytes left
/// to copy out. Both usages fall out of the same two cursors.
#[derive(Debug, Clone)]
pub struct WBuf {
    bytes: Vec<u8>,
    wpos: usize,
    rpos: usize,
    /// `None` means the buffer may grow without bound (the `fbf` buffer).
    /// `Some(cap)` means writes past `cap` fail with `EncodeOverflow`.
    capacity: Option<usize>,
}

impl WBuf {
    /// A buffer that refuses to grow past `capacity` bytes, used for the
    /// per-link `wbuf` that a single frame must fit into.
    pub fn with_capacity(capacity: usize) -> Self {
        WBuf {
            bytes: Vec::with_capacity(capacity),
            wpos: 0,
            rpos: 0,
            capacity: Some(capacity),
        }
    }

    /// A buffer that grows on demand, used for the expandable `fbf`
    /// fragmentation buffer.
    pub fn expandable() -> Self {
        WBuf {
            bytes: Vec::new(),
            wpos: 0,
            rpos: 0,
            capacity: None,
        }
    }

    /// Same as [`Self::expandable`], but pre-reserves `chunk` bytes so the
    /// first few fragmentation rounds don't each trigger a reallocation.
    /// Mirrors `FRAG_BUF_TX_CHUNK`.
    pub fn expandable_with_chunk_hint(chunk: usize) -> Self {
        WBuf {
            bytes: Vec::with_capacity(chunk),
            wpos: 0,
            rpos: 0,
            capacity: None,
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.wpos = 0;
        self.rpos = 0;
    }

    pub fn wpos(&self) -> usize {
        self.wpos
    }

    pub fn rpos(&self) -> usize {
        self.rpos
    }

    /// Rewinds the write cursor to `pos` without discarding the bytes
    /// past it. Used by the fragment serializer's rewind-and-reencode
    /// pass: the header is written once assuming non-final, then, if the
    /// remainder fits, the cursor is rewound and the header rewritten
    /// with the final flag set.
    pub fn set_wpos(&mut self, pos: usize) {
        debug_assert!(pos <= self.wpos);
        self.wpos = pos;
        self.bytes.truncate(pos);
    }

    pub fn len(&self) -> usize {
        self.wpos - self.rpos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining room before a fixed-capacity buffer overflows. Always
    /// `usize::MAX` for an expandable buffer.
    pub fn space_left(&self) -> usize {
        match self.capacity {
            Some(cap) => cap.saturating_sub(self.wpos),
            None => usize::MAX,
        }
    }

    fn ensure_room(&mut self, additional: usize) -> ZResult<()> {
        if let Some(cap) = self.capacity {
            if self.wpos + additional > cap {
                return zerror!(ZErrorKind::EncodeOverflow {
                    descr: format!(
                        "writing {additional} bytes at {} would exceed capacity {cap}",
                        self.wpos
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn write_byte(&mut self, b: u8) -> ZResult<()> {
        self.ensure_room(1)?;
        if self.wpos < self.bytes.len() {
            self.bytes[self.wpos] = b;
        } else {
            self.bytes.push(b);
        }
        self.wpos += 1;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> ZResult<()> {
        self.ensure_room(data.len())?;
        for &b in data {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Writes `value` as a little-endian `u16` at an absolute position,
    /// without disturbing the current write cursor. Used to backfill the
    /// 2-byte streamed-link length prefix reserved by `prepare_wbuf` and
    /// filled in by `finalize_wbuf` once the frame's length is known.
    pub fn put_at_u16_le(&mut self, pos: usize, value: u16) -> ZResult<()> {
        if pos + 2 > self.bytes.len() {
            return zerror!(ZErrorKind::Other {
                descr: format!("put_at_u16_le({pos}) out of bounds, len={}", self.bytes.len()),
            });
        }
        let le = value.to_le_bytes();
        self.bytes[pos] = le[0];
        self.bytes[pos + 1] = le[1];
        Ok(())
    }

    /// A zenoh varint ("zint"): 7 bits per byte, high bit set while more
    /// bytes follow. Mirrors the wire encoding zenoh-pico uses for `ZInt`.
    pub fn write_zint(&mut self, mut v: u64) -> ZResult<()> {
        loop {
            let mut byte = (v & 0x7f) as u8;
            v >>= 7;
            if v != 0 {
                byte |= 0x80;
            }
            self.write_byte(byte)?;
            if v == 0 {
                break;
            }
        }
        Ok(())
    }

    /// Drains up to `max` unread bytes into `dst`, advancing `rpos`, and
    /// returns how many bytes were copied. This is how the fragmentation
    /// loop pulls `min(bytes_left, space_left)` bytes out of `fbf` into
    /// the per-link `wbuf`.
    pub fn copy_into(&mut self, dst: &mut WBuf, max: usize) -> ZResult<usize> {
        let available = self.len();
        let n = available.min(max);
        dst.write_bytes(&self.bytes[self.rpos..self.rpos + n])?;
        self.rpos += n;
        Ok(n)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[self.rpos..self.wpos]
    }
}

/// A read cursor over a byte slice, the receive-side counterpart of
/// `WBuf`. Backed by an owned `Vec<u8>` so it can hold bytes handed back
/// from a link read.
#[derive(Debug, Clone)]
pub struct RBuf {
    bytes: Vec<u8>,
    rpos: usize,
}

impl RBuf {
    pub fn from(bytes: Vec<u8>) -> Self {
        RBuf { bytes, rpos: 0 }
    }

    pub fn len(&self) -> usize {
        self.bytes.len() - self.rpos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read_byte(&mut self) -> ZResult<u8> {
        if self.rpos >= self.bytes.len() {
            return zerror!(ZErrorKind::Other {
                descr: "read past end of buffer".into(),
            });
        }
        let b = self.bytes[self.rpos];
        self.rpos += 1;
        Ok(b)
    }

    pub fn read_bytes(&mut self, n: usize) -> ZResult<Vec<u8>> {
        if self.rpos + n > self.bytes.len() {
            return zerror!(ZErrorKind::Other {
                descr: format!("short read: wanted {n}, have {}", self.len()),
            });
        }
        let out = self.bytes[self.rpos..self.rpos + n].to_vec();
        self.rpos += n;
        Ok(out)
    }

    pub fn read_u16_le(&mut self) -> ZResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_zint(&mut self) -> ZResult<u64> {
        let mut v: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            v |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(v)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[self.rpos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_capacity_rejects_overflow() {
        let mut wbuf = WBuf::with_capacity(2);
        wbuf.write_byte(1).unwrap();
        wbuf.write_byte(2).unwrap();
        assert!(wbuf.write_byte(3).is_err());
    }

    #[test]
    fn expandable_grows_without_bound() {
        let mut wbuf = WBuf::expandable();
        for i in 0..1000u32 {
            wbuf.write_byte(i as u8).unwrap();
        }
        assert_eq!(wbuf.len(), 1000);
    }

    #[test]
    fn rewind_and_reencode_shrinks_written_length() {
        let mut wbuf = WBuf::with_capacity(16);
        wbuf.write_bytes(&[0xaa, 0xbb, 0xcc]).unwrap();
        let mark = 1;
        wbuf.set_wpos(mark);
        wbuf.write_byte(0xee).unwrap();
        assert_eq!(wbuf.as_bytes(), &[0xaa, 0xee]);
    }

    #[test]
    fn put_at_backfills_length_prefix() {
        let mut wbuf = WBuf::with_capacity(16);
        wbuf.write_bytes(&[0, 0]).unwrap();
        wbuf.write_bytes(&[1, 2, 3]).unwrap();
        wbuf.put_at_u16_le(0, 3).unwrap();
        assert_eq!(wbuf.as_bytes(), &[3, 0, 1, 2, 3]);
    }

    #[test]
    fn copy_into_drains_and_advances_rpos() {
        let mut src = WBuf::expandable();
        src.write_bytes(&[1, 2, 3, 4, 5]).unwrap();
        let mut dst = WBuf::with_capacity(2);
        let n = src.copy_into(&mut dst, 2).unwrap();
        assert_eq!(n, 2);
        assert_eq!(dst.as_bytes(), &[1, 2]);
        assert_eq!(src.len(), 3);
    }

    #[test]
    fn zint_round_trips_through_rbuf() {
        let mut wbuf = WBuf::expandable();
        wbuf.write_zint(300).unwrap();
        let mut rbuf = RBuf::from(wbuf.as_bytes().to_vec());
        assert_eq!(rbuf.read_zint().unwrap(), 300);
    }
}
