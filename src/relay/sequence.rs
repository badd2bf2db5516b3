use std::fmt::{Display, Formatter};

/// A message's sequence number as assigned by the backing store. The API wraps
///  its transmit counter at 2^31, so all arithmetic here is modulo [Self::MODULUS].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SequenceNumber(u32);

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequenceNumber {
    pub const MODULUS: u32 = 1 << 31;

    pub fn from_raw(value: u32) -> Self {
        SequenceNumber(value % Self::MODULUS)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }

    pub fn successor(&self) -> SequenceNumber {
        SequenceNumber((self.0 + 1) % Self::MODULUS)
    }

    /// The number of increments it takes to get from `self` to `to`, modulo the
    ///  sequence space. Small results mean `to` is ahead of `self`, results in the
    ///  upper half of the sequence space mean `to` is behind.
    pub fn distance_to(&self, to: SequenceNumber) -> u32 {
        to.0.wrapping_sub(self.0) % Self::MODULUS
    }
}


/// The single piece of mutable relay state: the last sequence number that was
///  processed (transmitted, or consciously skipped). It starts out unset and is
///  advanced by the catch-up controller only - in particular, feed reconnects
///  must not touch it.
///
/// NB: The tracker does not enforce ascending updates itself; the catch-up
///      controller's sequential processing is what upholds that invariant.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_processed: Option<SequenceNumber>,
}

impl SequenceTracker {
    pub fn new() -> SequenceTracker {
        SequenceTracker { last_processed: None }
    }

    pub fn last_processed(&self) -> Option<SequenceNumber> {
        self.last_processed
    }

    /// The next sequence number this tracker expects, or `None` before the first
    ///  message was processed ("accept whatever arrives first").
    pub fn expected_next(&self) -> Option<SequenceNumber> {
        self.last_processed.map(|s| s.successor())
    }

    pub fn mark_processed(&mut self, seq: SequenceNumber) {
        self.last_processed = Some(seq);
    }
}
