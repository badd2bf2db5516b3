//! Relays messages from a satellite API backing store onto a one-way multicast
//!  UDP link, the way a real satellite receiver would emit them. Messages are
//!  addressed by a sequence number that the API assigns monotonically; the relay
//!  listens to a server-push notification feed, fetches each announced message
//!  over HTTP and transmits it as a series of framed UDP datagrams.
//!
//! ## Design goals
//!
//! * The link is strictly one-way and lossy - there is no acknowledgment path back
//!   to the sender, and no retransmission request mechanism. Recovery happens only
//!   by re-fetching from the (always available) backing store.
//! * No sequence number may be skipped silently: the notification feed can coalesce
//!   events or lose them across reconnects, so the relay reconstructs gaps purely
//!   from the numeric distance between its last processed sequence number and the
//!   newest announcement ("catch-up").
//! * Messages larger than a single UDP payload are fragmented; receivers reassemble
//!   by fragment index, so fragments are sent in strictly ascending index order.
//! * Feed reconnects never reset the relay's sequence bookkeeping.
//!
//! ## Wire format
//!
//! Each fragment travels as one UDP datagram with an 8-byte header, all numbers in
//!  network byte order (BE):
//! ```ascii
//! 0:   type flags (u8):
//!      * bit 0: API message marker, always set
//!      * bit 7: more fragments follow (clear on exactly the last fragment)
//!      * bits 1-6: unused, should be 0
//! 1:   reserved, should be 0
//! 2-3: fragment index (u16), 0-based, ascending without gaps within a message
//! 4-7: message sequence number (u32)
//! ```
//!
//! Sequence numbers wrap around at 2^31, so 0 follows after 7FFFFFFF.
//!
//! The payload slice after the header is capped so that header + payload fit the
//!  maximum UDP payload, leaving room for the UDP and IP headers.

pub mod api;
pub mod relay;
pub mod util;
