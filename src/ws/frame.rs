//! RFC 6455 frame codec.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Close status codes (RFC 6455 Section 7.4.1).
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const UNSUPPORTED_DATA: u16 = 1003;
    pub const NO_STATUS: u16 = 1005;
    pub const INVALID_PAYLOAD: u16 = 1007;
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    pub const INTERNAL_ERROR: u16 = 1011;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

/// A single WebSocket frame. `mask` is present on client-to-server frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>, fin: bool) -> Self {
        Self {
            fin,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    pub fn masked(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    /// Serialize, masking the payload when a key is set.
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = BytesMut::with_capacity(14 + len);

        let mut first = self.opcode.as_u8();
        if self.fin {
            first |= 0x80;
        }
        out.put_u8(first);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0 };
        if len < 126 {
            out.put_u8(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            out.put_u8(mask_bit | 126);
            out.put_u16(len as u16);
        } else {
            out.put_u8(mask_bit | 127);
            out.put_u64(len as u64);
        }

        match self.mask {
            Some(key) => {
                out.put_slice(&key);
                let start = out.len();
                out.put_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.put_slice(&self.payload),
        }
        out.to_vec()
    }

    /// Parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the frame and
    /// the number of bytes it occupied. Payloads larger than `max_payload` are
    /// rejected before they are buffered.
    pub fn decode(buf: &[u8], max_payload: u64) -> Result<Option<(Frame, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }
        let first = buf[0];
        let second = buf[1];

        if first & 0x70 != 0 {
            return Err(Error::frame("Reserved bits set"));
        }
        let fin = first & 0x80 != 0;
        let opcode = Opcode::from_u8(first & 0x0F)
            .ok_or_else(|| Error::frame(format!("Unknown opcode 0x{:X}", first & 0x0F)))?;
        let masked = second & 0x80 != 0;

        let mut offset = 2;
        let len = match second & 0x7F {
            126 => {
                if buf.len() < offset + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([buf[2], buf[3]]) as u64;
                offset += 2;
                len
            }
            127 => {
                if buf.len() < offset + 8 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                let len = u64::from_be_bytes(raw);
                if len & (1 << 63) != 0 {
                    return Err(Error::frame("Most significant bit of 64-bit length set"));
                }
                offset += 8;
                len
            }
            n => n as u64,
        };

        if opcode.is_control() {
            if !fin {
                return Err(Error::frame("Fragmented control frame"));
            }
            if len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(Error::frame(format!(
                    "Control frame payload of {} bytes",
                    len
                )));
            }
        }
        if len > max_payload {
            return Err(Error::MessageTooLarge {
                size: len,
                limit: max_payload,
            });
        }

        let mask = if masked {
            if buf.len() < offset + 4 {
                return Ok(None);
            }
            let key = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
            offset += 4;
            Some(key)
        } else {
            None
        };

        let len = len as usize;
        if buf.len() < offset + len {
            return Ok(None);
        }
        let mut payload = buf[offset..offset + len].to_vec();
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        let frame = Frame {
            fin,
            opcode,
            mask,
            payload: Bytes::from(payload),
        };
        Ok(Some((frame, offset + len)))
    }
}

/// XOR `data` with the 4-byte masking key. Applying it twice restores the input.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Close frame payload: status code followed by a UTF-8 reason.
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(2 + reason.len());
    payload.put_u16(code);
    payload.put_slice(reason.as_bytes());
    payload.freeze()
}

/// Split a Close payload. An empty payload carries no status.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<(u16, String)>> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(Error::frame("Close payload of 1 byte")),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            let reason = std::str::from_utf8(&payload[2..])
                .map_err(|_| Error::frame("Close reason is not valid UTF-8"))?;
            Ok(Some((code, reason.to_string())))
        }
    }
}
