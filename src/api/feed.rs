use std::time::Duration;

use bytes::BytesMut;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::util::backoff::RetryBackoff;

/// One event from the `/subscribe/transmissions` feed. The API announces every
///  state change of a transmission order; only `status == "sent"` means the
///  message bytes are available in the store and due for relaying.
#[derive(Debug, Clone, Deserialize)]
pub struct TransmissionOrder {
    pub tx_seq_num: u32,
    pub status: String,
    #[serde(default)]
    pub message_size: Option<u64>,
    #[serde(default)]
    pub ended_transmission_at: Option<String>,
}

impl TransmissionOrder {
    pub fn is_sent(&self) -> bool {
        self.status == "sent"
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for FeedConfig {
    fn default() -> FeedConfig {
        FeedConfig {
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
        }
    }
}


/// Incremental parser for a `text/event-stream` response body. Chunk boundaries
///  are arbitrary, so raw bytes are buffered until a blank line completes an
///  event; [Self::push] returns the `data` payloads of all events completed by
///  the given chunk.
pub struct SseParser {
    buf: BytesMut,
}

impl SseParser {
    pub fn new() -> SseParser {
        SseParser { buf: BytesMut::new() }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some((end, delimiter_len)) = Self::find_event_end(&self.buf) {
            let event = self.buf.split_to(end + delimiter_len);
            if let Some(data) = Self::parse_event(&event[..end]) {
                events.push(data);
            }
        }
        events
    }

    /// position and length of the earliest event delimiter (blank line), if any
    fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
        let lf_lf = buf.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, 2));
        let crlf_crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| (pos, 4));

        match (lf_lf, crlf_crlf) {
            (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// the joined `data` field lines of one event block, or `None` for events
    ///  without data (comments, heartbeats)
    fn parse_event(block: &[u8]) -> Option<String> {
        let block = String::from_utf8_lossy(block);

        let mut data_lines = Vec::new();
        for line in block.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value));
            }
        }

        if data_lines.is_empty() {
            None
        }
        else {
            Some(data_lines.join("\n"))
        }
    }
}


enum SubscriptionEnd {
    /// the receiving side of the announcement channel is gone, the feed is done
    ConsumerGone,
    StreamEnded { delivered_events: u32 },
}

/// Supervised notification feed: subscribes to the transmission event stream and
///  forwards every "sent" order into the (bounded) announcement channel. Any
///  stream error or end-of-stream triggers a reconnect with backoff; the backoff
///  resets after a connection that delivered at least one event.
///
/// Returns once the receiving side of `announcements` is dropped. Reconnects are
///  invisible to the consumer - in particular, they never reset any relay state.
pub async fn run_feed(
    base_url: String,
    config: FeedConfig,
    announcements: mpsc::Sender<TransmissionOrder>,
) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let mut backoff = RetryBackoff::new(config.reconnect_initial_delay, config.reconnect_max_delay);

    loop {
        match subscribe_once(&client, &base_url, &announcements).await {
            Ok(SubscriptionEnd::ConsumerGone) => {
                debug!("announcement consumer is gone - stopping the notification feed");
                return Ok(());
            }
            Ok(SubscriptionEnd::StreamEnded { delivered_events }) => {
                if delivered_events > 0 {
                    backoff.reset();
                }
                warn!("notification feed disconnected - reconnecting");
            }
            Err(e) => {
                warn!("notification feed failed: {} - reconnecting", e);
            }
        }

        sleep(backoff.next_delay()).await;
        if announcements.is_closed() {
            return Ok(());
        }
    }
}

async fn subscribe_once(
    client: &reqwest::Client,
    base_url: &str,
    announcements: &mpsc::Sender<TransmissionOrder>,
) -> anyhow::Result<SubscriptionEnd> {
    let url = format!("{}/subscribe/transmissions", base_url);
    let response = client.get(&url).send().await?.error_for_status()?;
    info!("connected to the notification feed - waiting for events");

    let mut stream = response.bytes_stream();
    let mut parser = SseParser::new();
    let mut delivered_events = 0;

    while let Some(chunk) = stream.next().await {
        for data in parser.push(&chunk?) {
            let order = match serde_json::from_str::<TransmissionOrder>(&data) {
                Ok(order) => order,
                Err(e) => {
                    warn!("skipping malformed feed event: {}", e);
                    continue;
                }
            };
            debug!("feed event: {:?}", order);

            if !order.is_sent() {
                continue;
            }

            delivered_events += 1;
            if announcements.send(order).await.is_err() {
                return Ok(SubscriptionEnd::ConsumerGone);
            }
        }
    }

    Ok(SubscriptionEnd::StreamEnded { delivered_events })
}
