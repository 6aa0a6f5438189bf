//! Flood frame codec
//!
//! A flood frame is an Ethernet header carrying the protocol's ethertype,
//! followed by the flood header and the opaque application payload:
//!
//! ```text
//! | dst(6) | src(6) | ethertype(2) | version(1) | sequence(4) |
//! | origin_len(1) | origin | sender_len(1) | sender | payload_len(2) | payload |
//! ```
//!
//! All integers are big-endian. Bytes following the payload (link padding)
//! are ignored on decode.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::FrameError;
use crate::identity::{MacAddress, PeerIdentity};

/// Current flood header version
pub const FLOOD_VERSION: u8 = 1;

/// Length of the Ethernet header
pub const ETHER_HEADER_LEN: usize = 14;

/// Largest payload a frame can carry
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Ethernet header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtherHeader {
    pub dst: MacAddress,
    pub src: MacAddress,
    pub ethertype: u16,
}

/// Flood header: which broadcast this is, who started it, who relayed this copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodHeader<I: PeerIdentity> {
    /// Sequence number identifying the broadcast
    pub sequence: u32,
    /// Node that originated the broadcast
    pub originator: I,
    /// Node that transmitted this copy
    pub sender: I,
}

/// A decoded flood frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodFrame<I: PeerIdentity> {
    pub ether: EtherHeader,
    pub header: FloodHeader<I>,
    pub payload: Bytes,
}

impl<I: PeerIdentity> FloodFrame<I> {
    /// Create a frame
    pub fn new(ether: EtherHeader, header: FloodHeader<I>, payload: Bytes) -> Self {
        Self {
            ether,
            header,
            payload,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Bytes, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let originator = self.header.originator.as_bytes();
        let sender = self.header.sender.as_bytes();

        let mut buf = BytesMut::with_capacity(
            ETHER_HEADER_LEN + 1 + 4 + 2 + originator.len() + sender.len() + 2 + self.payload.len(),
        );
        buf.put_slice(&self.ether.dst.octets());
        buf.put_slice(&self.ether.src.octets());
        buf.put_u16(self.ether.ethertype);

        buf.put_u8(FLOOD_VERSION);
        buf.put_u32(self.header.sequence);
        put_address(&mut buf, &originator)?;
        put_address(&mut buf, &sender)?;
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }

    /// Decode from wire bytes, checking the ethertype
    pub fn decode(frame: &[u8], expected_ethertype: u16) -> Result<Self, FrameError> {
        let mut cursor = frame;

        ensure(&cursor, ETHER_HEADER_LEN)?;
        let dst = take_mac(&mut cursor);
        let src = take_mac(&mut cursor);
        let ethertype = cursor.get_u16();
        if ethertype != expected_ethertype {
            return Err(FrameError::WrongEtherType {
                expected: expected_ethertype,
                actual: ethertype,
            });
        }

        ensure(&cursor, 1 + 4)?;
        let version = cursor.get_u8();
        if version != FLOOD_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }
        let sequence = cursor.get_u32();

        let originator = I::from_bytes(&take_address(&mut cursor)?)?;
        let sender = I::from_bytes(&take_address(&mut cursor)?)?;

        ensure(&cursor, 2)?;
        let payload_len = cursor.get_u16() as usize;
        ensure(&cursor, payload_len)?;
        let payload = Bytes::copy_from_slice(&cursor[..payload_len]);

        Ok(Self {
            ether: EtherHeader {
                dst,
                src,
                ethertype,
            },
            header: FloodHeader {
                sequence,
                originator,
                sender,
            },
            payload,
        })
    }
}

fn ensure(cursor: &&[u8], needed: usize) -> Result<(), FrameError> {
    if cursor.remaining() < needed {
        return Err(FrameError::Truncated {
            needed,
            available: cursor.remaining(),
        });
    }
    Ok(())
}

fn take_mac(cursor: &mut &[u8]) -> MacAddress {
    let mut octets = [0u8; 6];
    cursor.copy_to_slice(&mut octets);
    MacAddress(octets)
}

fn take_address(cursor: &mut &[u8]) -> Result<Vec<u8>, FrameError> {
    ensure(cursor, 1)?;
    let len = cursor.get_u8() as usize;
    ensure(cursor, len)?;
    let bytes = cursor[..len].to_vec();
    cursor.advance(len);
    Ok(bytes)
}

fn put_address(buf: &mut BytesMut, address: &[u8]) -> Result<(), FrameError> {
    let len = u8::try_from(address.len()).map_err(|_| {
        crate::error::IdentityError::InvalidFormat(format!(
            "address of {} bytes does not fit a flood header",
            address.len()
        ))
    })?;
    buf.put_u8(len);
    buf.put_slice(address);
    Ok(())
}
