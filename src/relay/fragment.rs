use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::relay::packet_header::{PacketError, PacketHeader};
use crate::relay::sequence::SequenceNumber;
use crate::util::safe_converter::PrecheckedCast;

/// The widest payload slice that fits a single fragment: the maximum UDP payload
///  (2^16 - 1 bytes) minus the framing header (8), UDP header (8) and IP header (20).
pub const MAX_PAYLOAD_PER_PACKET: usize = (1 << 16) - 36 - 1;

/// The 16-bit fragment index caps the number of fragments per message.
pub const MAX_FRAGMENTS_PER_MESSAGE: usize = 1 << 16;

/// Splits a message into framed packets of at most `PacketHeader::SERIALIZED_SIZE
///  + max_payload` bytes each, ready for transmission in the returned order.
///
/// An empty message still produces exactly one fragment (index 0, last-fragment
///  flag set, zero-length body) - that is the minimal valid message on the wire.
pub fn packetize(
    data: &[u8],
    sequence_number: SequenceNumber,
    max_payload: usize,
) -> Result<Vec<Bytes>, PacketError> {
    assert!(max_payload > 0);

    let num_fragments = data.len().div_ceil(max_payload).max(1);
    if num_fragments > MAX_FRAGMENTS_PER_MESSAGE {
        return Err(PacketError::MessageTooLarge {
            message_len: data.len(),
            max_payload,
            max_fragments: MAX_FRAGMENTS_PER_MESSAGE,
        });
    }

    debug!("message #{}: {} bytes, {} fragment(s)", sequence_number, data.len(), num_fragments);

    let mut packets = Vec::with_capacity(num_fragments);
    for i_fragment in 0..num_fragments {
        let slice = &data[i_fragment * max_payload..((i_fragment + 1) * max_payload).min(data.len())];

        let mut buf = BytesMut::with_capacity(PacketHeader::SERIALIZED_SIZE + slice.len());
        PacketHeader {
            last_fragment: i_fragment + 1 == num_fragments,
            fragment_index: i_fragment.prechecked_cast(),
            sequence_number,
        }.ser(&mut buf);
        buf.put_slice(slice);

        packets.push(buf.freeze());
    }

    Ok(packets)
}
