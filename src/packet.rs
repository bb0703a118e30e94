//! Wire-format definitions for data packets and acknowledgments.
//!
//! This module is responsible for:
//! - Defining the on-wire binary layout of a [`Packet`] (flag, sequence, payload).
//! - Defining the two acknowledgment shapes carried by an [`Ack`].
//! - Serialising to and parsing from raw datagram bytes.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  Data / EOF packet
//! +--------+--------------------------------+------------------------+
//! |  flag  |        sequence (u32)          |   payload (0..N bytes) |
//! +--------+--------------------------------+------------------------+
//!   byte 0           bytes 1..5                    bytes 5..
//!
//!  Data ACK                     EOF ACK
//! +----------------------+     +--------+----------------------+
//! |    sequence (u32)    |     | flag=1 |    sequence (u32)    |
//! +----------------------+     +--------+----------------------+
//! ```
//!
//! There is no checksum: a flipped payload byte decodes as a valid packet.

use thiserror::Error;

/// Byte length of the fixed-size packet header on the wire.
pub const HEADER_LEN: usize = 5;

/// Length of a plain data acknowledgment.
pub const ACK_LEN: usize = 4;

/// Length of the EOF acknowledgment (`[flag][sequence]`).
pub const EOF_ACK_LEN: usize = 5;

const OFF_FLAG: usize = 0;
const OFF_SEQ: usize = 1;

/// Packet kind carried in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flag {
    Data = 0,
    /// Final packet of the stream; its payload may be empty.
    Eof = 1,
}

impl Flag {
    /// Map a raw flag byte. Only `1` means EOF; anything else is data.
    pub fn from_byte(byte: u8) -> Self {
        if byte == Flag::Eof as u8 {
            Flag::Eof
        } else {
            Flag::Data
        }
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flag: Flag,
    pub seq: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn data(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            flag: Flag::Data,
            seq,
            payload,
        }
    }

    pub fn eof(seq: u32, payload: Vec<u8>) -> Self {
        Self {
            flag: Flag::Eof,
            seq,
            payload,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.flag == Flag::Eof
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// The payload length is the caller's responsibility; it is not checked
    /// against any configured packet size.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.flag as u8);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Fails only when `buf` is shorter than [`HEADER_LEN`]; every longer
    /// input decodes, whatever its contents.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::Malformed {
                len: buf.len(),
                min: HEADER_LEN,
            });
        }

        Ok(Packet {
            flag: Flag::from_byte(buf[OFF_FLAG]),
            seq: read_u32(&buf[OFF_SEQ..OFF_SEQ + 4]),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Acknowledgment of exactly one packet (window of one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub seq: u32,
    /// `true` for the distinguished acknowledgment of the EOF packet.
    pub eof: bool,
}

impl Ack {
    pub fn data(seq: u32) -> Self {
        Self { seq, eof: false }
    }

    pub fn eof(seq: u32) -> Self {
        Self { seq, eof: true }
    }

    /// A 4-byte sequence for data acks; the EOF ack mirrors the EOF packet
    /// header instead.
    pub fn encode(&self) -> Vec<u8> {
        if self.eof {
            let mut buf = Vec::with_capacity(EOF_ACK_LEN);
            buf.push(Flag::Eof as u8);
            buf.extend_from_slice(&self.seq.to_be_bytes());
            buf
        } else {
            self.seq.to_be_bytes().to_vec()
        }
    }

    /// Parse an acknowledgment.
    ///
    /// Datagrams of [`EOF_ACK_LEN`] or more bytes whose first byte is the EOF
    /// flag are EOF acks; anything else of at least [`ACK_LEN`] bytes is read
    /// as a plain data ack.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() >= EOF_ACK_LEN && buf[OFF_FLAG] == Flag::Eof as u8 {
            return Ok(Ack::eof(read_u32(&buf[OFF_SEQ..OFF_SEQ + 4])));
        }
        if buf.len() < ACK_LEN {
            return Err(PacketError::Malformed {
                len: buf.len(),
                min: ACK_LEN,
            });
        }
        Ok(Ack::data(read_u32(&buf[..4])))
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer shorter than the fixed header.
    #[error("malformed datagram: {len} bytes, need at least {min}")]
    Malformed { len: usize, min: usize },
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(word)
}
