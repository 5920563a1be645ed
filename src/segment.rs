//! Wire-format definitions for protocol segments.
//!
//! Every datagram exchanged between peers is a [`Segment`]: a fixed 32-byte
//! [`Header`] immediately followed by `data_len` payload bytes.  This module
//! is responsible for:
//! - Defining the on-wire binary layout (header fields, control values).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`].
//! - Computing and verifying the CRC32 checksum.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |            Control            |            Window             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Data Length                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Future Use 0 / 1 / 2                      |
//! |                         (3 x 32 bits)                         |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The checksum is CRC32 over the header (with the checksum field zeroed)
//! followed by the payload.

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 32;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CONTROL: usize = 8;
const OFF_WINDOW: usize = 10;
const OFF_DATA_LEN: usize = 12;
const OFF_FUTURE_USE: usize = 16;
const OFF_CHECKSUM: usize = 28;

mod bits {
    pub const FIN: u16 = 0b0000_0001;
    pub const SYN: u16 = 0b0000_0010;
    pub const ACK: u16 = 0b0000_1000;
}

/// Control value carried by a segment.
///
/// The protocol uses a closed set; exactly one is present per segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Connection request (handshake step 1).
    Syn,
    /// Connection accept (handshake step 2).
    SynAck,
    /// Acknowledgement; also carried by every data segment.
    Ack,
    /// Shutdown request.
    FinAck,
}

impl Control {
    pub fn to_u16(self) -> u16 {
        match self {
            Control::Syn => bits::SYN,
            Control::SynAck => bits::SYN | bits::ACK,
            Control::Ack => bits::ACK,
            Control::FinAck => bits::FIN | bits::ACK,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            v if v == bits::SYN => Some(Control::Syn),
            v if v == bits::SYN | bits::ACK => Some(Control::SynAck),
            v if v == bits::ACK => Some(Control::Ack),
            v if v == bits::FIN | bits::ACK => Some(Control::FinAck),
            _ => None,
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Control::Syn => "SYN",
            Control::SynAck => "SYN_ACK",
            Control::Ack => "ACK",
            Control::FinAck => "FIN_ACK",
        };
        f.write_str(name)
    }
}

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Segment::encode`] converts to big-endian
/// on the wire and [`Segment::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Byte offset of the first payload byte in this segment.
    pub seq: u32,
    /// Next byte offset the sender expects from its peer.
    pub ack: u32,
    pub control: Control,
    /// Advertised receive window of the sender, in bytes.
    pub window: u16,
    /// Length of the payload in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    pub data_len: u32,
    /// Reserved words. Zero on every segment we build, but whatever arrives
    /// is kept so the checksum can be recomputed over it.
    pub future_use: [u32; 3],
    /// CRC32 as found on the wire. Ignored on encode.
    pub checksum: u32,
}

impl Header {
    /// Header with the given control fields and everything else zeroed.
    pub fn new(control: Control, seq: u32, ack: u32, window: u16) -> Self {
        Self {
            seq,
            ack,
            control,
            window,
            data_len: 0,
            future_use: [0; 3],
            checksum: 0,
        }
    }
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(header: Header, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    /// A segment with no payload.
    pub fn control(control: Control, seq: u32, ack: u32, window: u16) -> Self {
        Self::new(Header::new(control, seq, ack, window), Vec::new())
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// `header.data_len` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.
    pub fn encode(&self) -> Vec<u8> {
        let h = &self.header;
        let mut buf = vec![0u8; HEADER_LEN + self.payload.len()];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&h.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&h.ack.to_be_bytes());
        buf[OFF_CONTROL..OFF_CONTROL + 2].copy_from_slice(&h.control.to_u16().to_be_bytes());
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&h.window.to_be_bytes());
        buf[OFF_DATA_LEN..OFF_DATA_LEN + 4]
            .copy_from_slice(&(self.payload.len() as u32).to_be_bytes());
        for (i, word) in h.future_use.iter().enumerate() {
            let off = OFF_FUTURE_USE + i * 4;
            buf[off..off + 4].copy_from_slice(&word.to_be_bytes());
        }
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        // Checksum field is still zero at this point.
        let csum = checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());

        buf
    }

    /// Parse a [`Segment`] from a raw byte slice.
    ///
    /// This does not check the checksum; call [`verify`] first when the bytes
    /// came off the wire.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the `data_len` field disagrees with `buf.len()`, or
    /// - the control field is not one of the known values.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::BufferTooShort(buf.len()));
        }

        let seq = read_u32(buf, OFF_SEQ);
        let ack = read_u32(buf, OFF_ACK);
        let raw_control = u16::from_be_bytes([buf[OFF_CONTROL], buf[OFF_CONTROL + 1]]);
        let window = u16::from_be_bytes([buf[OFF_WINDOW], buf[OFF_WINDOW + 1]]);
        let data_len = read_u32(buf, OFF_DATA_LEN);
        let future_use = [
            read_u32(buf, OFF_FUTURE_USE),
            read_u32(buf, OFF_FUTURE_USE + 4),
            read_u32(buf, OFF_FUTURE_USE + 8),
        ];
        let checksum = read_u32(buf, OFF_CHECKSUM);

        let actual = buf.len() - HEADER_LEN;
        if data_len as usize != actual {
            return Err(SegmentError::LengthMismatch {
                declared: data_len,
                actual,
            });
        }

        let control =
            Control::from_u16(raw_control).ok_or(SegmentError::UnknownControl(raw_control))?;

        Ok(Segment {
            header: Header {
                seq,
                ack,
                control,
                window,
                data_len,
                future_use,
                checksum,
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Recompute the checksum of an encoded segment and compare it with the
/// value stored in its header.
///
/// Returns `false` for buffers too short to hold a header.
pub fn verify(buf: &[u8]) -> bool {
    if buf.len() < HEADER_LEN {
        return false;
    }
    let stored = read_u32(buf, OFF_CHECKSUM);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..OFF_CHECKSUM]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[OFF_CHECKSUM + 4..]);
    hasher.finalize() == stored
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("buffer of {0} bytes is too short to contain a header")]
    BufferTooShort(usize),
    #[error("data_len field says {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: u32, actual: usize },
    #[error("unknown control value {0:#06x}")]
    UnknownControl(u16),
}

/// CRC32 (IEEE) over `data`.  The caller must zero the checksum field first.
fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
