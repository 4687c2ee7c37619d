// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Name Service frames.
//!
//! Every request and reply is one fixed 128-byte frame:
//! `[N,M,ver,op, source:i32, id:i32, dma:i32, errcode:i32, name[50], process_name[50], timestamp:u64]`
//! (all integers LE). `id` and `dma` use `-1` for "absent" on the wire and `Option` in Rust.

use core::fmt;

use crate::name::{NameError, NAME_MAX};
use crate::topology::TileId;

/// First magic byte (`'N'`).
pub const MAGIC0: u8 = b'N';
/// Second magic byte (`'M'`).
pub const MAGIC1: u8 = b'M';
/// Protocol version.
pub const VERSION: u8 = 1;
/// Size of every Name Service frame.
pub const FRAME_LEN: usize = 128;
/// Well-known tile hosting the registry.
pub const NAME_SERVER_TILE: TileId = TileId::IO0;
/// Mailbox port of the registry inbox.
pub const NAME_SERVER_PORT: u8 = 2;
/// Mailbox port on which clients receive replies.
pub const NAME_CLIENT_PORT: u8 = 1;

const SENTINEL: i32 = -1;
const OFF_SOURCE: usize = 4;
const OFF_ID: usize = 8;
const OFF_DMA: usize = 12;
const OFF_ERRCODE: usize = 16;
const OFF_NAME: usize = 20;
const OFF_PROCESS: usize = OFF_NAME + NAME_MAX;
const OFF_TIMESTAMP: usize = OFF_PROCESS + NAME_MAX;

/// Request and reply opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Shut the registry down.
    Exit = 0,
    /// Resolve a name (id == -1) or an id.
    Query = 1,
    /// Register a name.
    Add = 2,
    /// Remove a name.
    Remove = 3,
    /// Positive acknowledgement.
    Success = 4,
    /// Client liveness signal.
    Alive = 5,
    /// Negative acknowledgement; `errcode` carries the reason.
    Fail = 6,
}

impl Opcode {
    /// Parses a wire opcode.
    pub const fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0 => Self::Exit,
            1 => Self::Query,
            2 => Self::Add,
            3 => Self::Remove,
            4 => Self::Success,
            5 => Self::Alive,
            6 => Self::Fail,
            _ => return None,
        })
    }
}

/// Errors when decoding Name Service frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireError {
    /// Frame is malformed, truncated or carries out-of-range fields.
    Malformed,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed name service frame")
    }
}

/// NUL-padded string that fits a wire name buffer. Empty means "no name".
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedStr {
    len: u8,
    bytes: [u8; NAME_MAX],
}

impl FixedStr {
    /// The empty marker.
    pub const EMPTY: Self = Self { len: 0, bytes: [0u8; NAME_MAX] };

    /// Copies `s` into a wire buffer; the terminator must still fit.
    pub fn new(s: &str) -> Result<Self, NameError> {
        if s.bytes().any(|b| b == 0) {
            return Err(NameError::Invalid);
        }
        if s.len() >= NAME_MAX {
            return Err(NameError::TooLong);
        }
        let mut bytes = [0u8; NAME_MAX];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self { len: s.len() as u8, bytes })
    }

    /// Returns the string contents.
    pub fn as_str(&self) -> &str {
        // Only ever filled from `&str` or a UTF-8 checked decode.
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    /// Returns `true` for the empty marker.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn decode(raw: &[u8]) -> Result<Self, WireError> {
        let len = raw.iter().position(|b| *b == 0).ok_or(WireError::Malformed)?;
        let text = core::str::from_utf8(&raw[..len]).map_err(|_| WireError::Malformed)?;
        Self::new(text).map_err(|_| WireError::Malformed)
    }
}

impl Default for FixedStr {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for FixedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Decoded Name Service frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameMessage {
    /// Tile that sent the request (replies go back to it).
    pub source: TileId,
    /// Operation.
    pub op: Opcode,
    /// Tile id, if known.
    pub id: Option<TileId>,
    /// DMA channel, if known.
    pub dma: Option<u16>,
    /// Zero or a negative errno (replies only).
    pub errcode: i32,
    /// Symbolic name.
    pub name: FixedStr,
    /// Owning process name.
    pub process_name: FixedStr,
    /// Sender clock (heartbeats).
    pub timestamp: u64,
}

impl NameMessage {
    /// Creates a frame with every optional field absent.
    pub const fn new(source: TileId, op: Opcode) -> Self {
        Self {
            source,
            op,
            id: None,
            dma: None,
            errcode: 0,
            name: FixedStr::EMPTY,
            process_name: FixedStr::EMPTY,
            timestamp: 0,
        }
    }

    /// Encodes the frame.
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        out[0] = MAGIC0;
        out[1] = MAGIC1;
        out[2] = VERSION;
        out[3] = self.op as u8;
        put_i32(&mut out, OFF_SOURCE, i32::from(self.source.raw()));
        put_i32(&mut out, OFF_ID, self.id.map_or(SENTINEL, |id| i32::from(id.raw())));
        put_i32(&mut out, OFF_DMA, self.dma.map_or(SENTINEL, i32::from));
        put_i32(&mut out, OFF_ERRCODE, self.errcode);
        out[OFF_NAME..OFF_NAME + NAME_MAX].copy_from_slice(&self.name.bytes);
        out[OFF_PROCESS..OFF_PROCESS + NAME_MAX].copy_from_slice(&self.process_name.bytes);
        out[OFF_TIMESTAMP..].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    /// Decodes a frame. Never panics on malformed input.
    pub fn decode(frame: &[u8]) -> Result<Self, WireError> {
        if frame.len() != FRAME_LEN
            || frame[0] != MAGIC0
            || frame[1] != MAGIC1
            || frame[2] != VERSION
        {
            return Err(WireError::Malformed);
        }
        let op = Opcode::from_u8(frame[3]).ok_or(WireError::Malformed)?;
        let source = TileId::from_wire(get_i32(frame, OFF_SOURCE)).ok_or(WireError::Malformed)?;
        let id = match get_i32(frame, OFF_ID) {
            SENTINEL => None,
            raw => Some(TileId::from_wire(raw).ok_or(WireError::Malformed)?),
        };
        let dma = match get_i32(frame, OFF_DMA) {
            SENTINEL => None,
            raw => Some(u16::try_from(raw).map_err(|_| WireError::Malformed)?),
        };
        let errcode = get_i32(frame, OFF_ERRCODE);
        let name = FixedStr::decode(&frame[OFF_NAME..OFF_NAME + NAME_MAX])?;
        let process_name = FixedStr::decode(&frame[OFF_PROCESS..OFF_PROCESS + NAME_MAX])?;
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&frame[OFF_TIMESTAMP..]);
        Ok(Self {
            source,
            op,
            id,
            dma,
            errcode,
            name,
            process_name,
            timestamp: u64::from_le_bytes(ts),
        })
    }
}

fn put_i32(out: &mut [u8], off: usize, value: i32) {
    out[off..off + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_i32(frame: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([frame[off], frame[off + 1], frame[off + 2], frame[off + 3]])
}
