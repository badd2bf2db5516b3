use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::relay::sequence::SequenceNumber;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error("packet header truncated: {0} bytes, need {needed}", needed = PacketHeader::SERIALIZED_SIZE)]
    Truncated(usize),
    #[error("not an API packet: type flags {0:#04x}")]
    NotApiPacket(u8),
    #[error("message of {message_len} bytes does not fit {max_fragments} fragments of {max_payload} bytes payload")]
    MessageTooLarge {
        message_len: usize,
        max_payload: usize,
        max_fragments: usize,
    },
}

/// The fixed 8-byte framing header at the start of every datagram (see the crate
///  level documentation for the byte layout).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub struct PacketHeader {
    /// set on exactly the highest-index fragment of a message
    pub last_fragment: bool,
    pub fragment_index: u16,
    pub sequence_number: SequenceNumber,
}

impl PacketHeader {
    pub const SERIALIZED_SIZE: usize = 8;

    /// bit 0 of the type flags: this datagram carries (part of) an API message
    const FLAG_API_TYPE: u8 = 0x01;
    /// bit 7 of the type flags: more fragments of the same message follow
    const FLAG_MORE_FRAGMENTS: u8 = 0x80;

    pub fn ser(&self, buf: &mut BytesMut) {
        let type_flags = if self.last_fragment {
            Self::FLAG_API_TYPE
        }
        else {
            Self::FLAG_API_TYPE | Self::FLAG_MORE_FRAGMENTS
        };

        buf.put_u8(type_flags);
        buf.put_u8(0); // reserved
        buf.put_u16(self.fragment_index);
        buf.put_u32(self.sequence_number.to_raw());
    }

    pub fn deser(buf: &mut impl Buf) -> Result<PacketHeader, PacketError> {
        if buf.remaining() < Self::SERIALIZED_SIZE {
            return Err(PacketError::Truncated(buf.remaining()));
        }

        let type_flags = buf.get_u8();
        if type_flags & Self::FLAG_API_TYPE == 0 {
            return Err(PacketError::NotApiPacket(type_flags));
        }
        let _reserved = buf.get_u8();
        let fragment_index = buf.get_u16();
        let sequence_number = SequenceNumber::from_raw(buf.get_u32());

        Ok(PacketHeader {
            last_fragment: type_flags & Self::FLAG_MORE_FRAGMENTS == 0,
            fragment_index,
            sequence_number,
        })
    }
}
