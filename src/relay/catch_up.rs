use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::relay::fragment::{packetize, MAX_PAYLOAD_PER_PACKET};
use crate::relay::multicast::PacketSink;
use crate::relay::sequence::{SequenceNumber, SequenceTracker};
use crate::util::backoff::RetryBackoff;

/// The two regular outcomes of a backing-store read. A transport failure is a
///  third, separate case (the `Err` side of [MessageStore::fetch]): not-found
///  means the store authoritatively has no record, and is handled as a gap rather
///  than retried.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(Bytes),
    NotFound,
}

/// The authoritative source of message bytes, addressable by sequence number.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Idempotent, retryable read of one message.
    async fn fetch(&self, seq: SequenceNumber) -> anyhow::Result<FetchOutcome>;
}

#[derive(Debug, Error)]
pub enum CatchUpError {
    #[error("catch-up stalled at message #{0}: fetch retries exhausted")]
    Stalled(SequenceNumber),
}

/// What to do when fetch retries for one sequence number are exhausted: skip it
///  (accepting a permanent gap on the wire) or abort the relay.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StallPolicy {
    SkipMessage,
    Abort,
}

#[derive(Debug, Clone)]
pub struct CatchUpConfig {
    /// message bytes per fragment, capped so header + payload fit one datagram
    pub max_payload_per_packet: usize,

    pub fetch_max_attempts: u32,
    pub fetch_retry_initial_delay: Duration,
    pub fetch_retry_max_delay: Duration,

    pub stall_policy: StallPolicy,
}

impl Default for CatchUpConfig {
    fn default() -> CatchUpConfig {
        CatchUpConfig {
            max_payload_per_packet: MAX_PAYLOAD_PER_PACKET,
            fetch_max_attempts: 5,
            fetch_retry_initial_delay: Duration::from_millis(500),
            fetch_retry_max_delay: Duration::from_secs(30),
            stall_policy: StallPolicy::SkipMessage,
        }
    }
}


/// Turns a stream of announced sequence numbers into gap-free transmissions:
///  every sequence number between the last processed one and a new announcement
///  is fetched, fragmented and sent, in ascending order, before the next
///  announcement is looked at.
///
/// The feed may coalesce events or lose them across reconnects, so announcements
///  are not assumed to arrive for every sequence number - missed ones are
///  reconstructed purely from the numeric gap. Announcements at or behind the
///  tracker (duplicates, stale events after a reconnect) are no-ops.
pub struct CatchUpController<S, P> {
    config: CatchUpConfig,
    store: S,
    sink: P,
    tracker: SequenceTracker,
}

impl<S: MessageStore, P: PacketSink> CatchUpController<S, P> {
    pub fn new(config: CatchUpConfig, store: S, sink: P) -> CatchUpController<S, P> {
        CatchUpController {
            config,
            store,
            sink,
            tracker: SequenceTracker::new(),
        }
    }

    pub fn last_processed(&self) -> Option<SequenceNumber> {
        self.tracker.last_processed()
    }

    /// Processes one announcement, catching up on any sequence numbers between
    ///  the tracker's expectation and `announced`.
    ///
    /// The shutdown flag is honored between sequence numbers, never in the middle
    ///  of one - a message is never left half-fragmented in flight.
    pub async fn on_announcement(
        &mut self,
        announced: SequenceNumber,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), CatchUpError> {
        let first = match self.tracker.expected_next() {
            // first announcement ever: start here, there is nothing to backfill
            None => announced,
            Some(expected) => {
                if expected.distance_to(announced) >= SequenceNumber::MODULUS / 2 {
                    debug!("message #{} was already processed - ignoring duplicate announcement", announced);
                    return Ok(());
                }
                expected
            }
        };

        let num_pending = first.distance_to(announced) + 1;
        let mut seq = first;
        for _ in 0..num_pending {
            if *shutdown.borrow() {
                info!("shutdown requested - abandoning catch-up before message #{}", seq);
                return Ok(());
            }

            if seq != announced {
                info!("catching up with transmission #{}", seq);
            }

            self.process_message(seq).await?;
            self.tracker.mark_processed(seq);
            seq = seq.successor();
        }
        Ok(())
    }

    /// Fetches and transmits a single message. All per-message failure modes end
    ///  up here: whatever happens, the caller marks `seq` processed afterwards
    ///  (except for a stall with [StallPolicy::Abort], which aborts the relay
    ///  anyway).
    async fn process_message(&self, seq: SequenceNumber) -> Result<(), CatchUpError> {
        let data = match self.fetch_with_retry(seq).await {
            Ok(FetchOutcome::Found(data)) => data,
            Ok(FetchOutcome::NotFound) => {
                warn!("the store has no data for message #{} - skipping it, this leaves a gap on the wire", seq);
                return Ok(());
            }
            Err(CatchUpError::Stalled(_)) if self.config.stall_policy == StallPolicy::SkipMessage => {
                error!("giving up on message #{} after {} fetch attempts - skipping it", seq, self.config.fetch_max_attempts);
                return Ok(());
            }
            Err(e) => {
                return Err(e);
            }
        };

        match packetize(&data, seq, self.config.max_payload_per_packet) {
            Ok(packets) => {
                self.sink.send_packets(packets).await;
            }
            Err(e) => {
                error!("not transmitting message #{}: {}", seq, e);
            }
        }
        Ok(())
    }

    async fn fetch_with_retry(&self, seq: SequenceNumber) -> Result<FetchOutcome, CatchUpError> {
        let mut backoff = RetryBackoff::new(
            self.config.fetch_retry_initial_delay,
            self.config.fetch_retry_max_delay,
        );

        for attempt in 1..=self.config.fetch_max_attempts {
            match self.store.fetch(seq).await {
                Ok(outcome) => {
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!("fetching message #{} failed (attempt {}/{}): {}", seq, attempt, self.config.fetch_max_attempts, e);
                    if attempt < self.config.fetch_max_attempts {
                        sleep(backoff.next_delay()).await;
                    }
                }
            }
        }
        Err(CatchUpError::Stalled(seq))
    }
}
