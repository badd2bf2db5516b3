pub mod catch_up;
pub mod fragment;
pub mod multicast;
pub mod packet_header;
pub mod sequence;

use anyhow::bail;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::api::client::ApiClient;
use crate::api::feed::{run_feed, FeedConfig, TransmissionOrder};
use crate::relay::catch_up::{CatchUpConfig, CatchUpController};
use crate::relay::multicast::{MulticastConfig, MulticastSender};
use crate::relay::sequence::SequenceNumber;

pub struct RelayConfig {
    pub api_base_url: String,
    pub multicast: MulticastConfig,
    pub catch_up: CatchUpConfig,
    pub feed: FeedConfig,

    /// Announcement backlog between the feed task and the relay loop. The feed
    ///  blocks when the loop is busy catching up; there is no benefit in a large
    ///  backlog since catch-up reconstructs gaps from the newest announcement
    ///  anyway.
    pub announcement_backlog: usize,
}

impl RelayConfig {
    pub fn new(api_base_url: String, multicast: MulticastConfig) -> RelayConfig {
        RelayConfig {
            api_base_url,
            multicast,
            catch_up: CatchUpConfig::default(),
            feed: FeedConfig::default(),
            announcement_backlog: 16,
        }
    }
}


/// The relay pipeline: a supervised feed task pushes announcements through a
///  bounded channel into this single worker loop, which drives the catch-up
///  controller one announcement at a time. Strictly sequential processing is
///  what upholds the ascending-order guarantee - there is deliberately no
///  concurrency across announcements.
///
/// Returns when the shutdown flag is raised (an in-flight catch-up finishes its
///  current sequence number first) or on an unrecoverable error.
pub async fn run_relay(config: RelayConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let sender = MulticastSender::open(&config.multicast)?;
    let store = ApiClient::new(config.api_base_url.clone());
    let mut controller = CatchUpController::new(config.catch_up.clone(), store, sender);

    let (announcement_tx, mut announcement_rx) = mpsc::channel::<TransmissionOrder>(config.announcement_backlog);
    let feed_task = tokio::spawn(run_feed(config.api_base_url, config.feed, announcement_tx));

    let mut shutdown_signal = shutdown.clone();
    loop {
        tokio::select! {
            announcement = announcement_rx.recv() => {
                match announcement {
                    Some(order) => {
                        info!("message #{} was sent ({} bytes, transmission ended {})",
                            order.tx_seq_num,
                            order.message_size.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()),
                            order.ended_transmission_at.as_deref().unwrap_or("?"),
                        );
                        if let Err(e) = controller.on_announcement(SequenceNumber::from_raw(order.tx_seq_num), &shutdown).await {
                            feed_task.abort();
                            return Err(e.into());
                        }
                    }
                    None => {
                        feed_task.abort();
                        bail!("the notification feed terminated unexpectedly");
                    }
                }
            }
            changed = shutdown_signal.changed() => {
                // a dropped shutdown sender counts as a shutdown request
                if changed.is_err() || *shutdown_signal.borrow() {
                    info!("shutdown requested - stopping the relay");
                    break;
                }
            }
        }
    }

    feed_task.abort();
    debug!("relay stopped at sequence number {:?}", controller.last_processed());
    Ok(())
}


#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::Full;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::Response;
    use hyper_util::rt::TokioIo;
    use rstest::*;
    use socket2::{Domain, Protocol, Socket, Type};
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
    use std::time::Duration;
    use tokio::net::{TcpListener, UdpSocket};
    use tokio::runtime::Builder;
    use super::*;
    use crate::relay::packet_header::PacketHeader;

    /// API stub: announces messages #2 and #4 on the feed; the store has data for
    ///  #2 and #4 but answers 404 for #3
    async fn spawn_api_stub() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let io = TokioIo::new(stream);

                tokio::spawn(async move {
                    let service = service_fn(|req| async move {
                        let response = match req.uri().path() {
                            "/subscribe/transmissions" => Response::new(Full::new(Bytes::from_static(concat!(
                                "data: {\"tx_seq_num\": 2, \"status\": \"sent\", \"message_size\": 5}\n\n",
                                "data: {\"tx_seq_num\": 4, \"status\": \"sent\", \"message_size\": 5}\n\n",
                            ).as_bytes()))),
                            "/message/2" => Response::new(Full::new(Bytes::from_static(b"first"))),
                            "/message/3" => Response::builder()
                                .status(hyper::StatusCode::NOT_FOUND)
                                .body(Full::new(Bytes::new()))
                                .unwrap(),
                            "/message/4" => Response::new(Full::new(Bytes::from_static(b"third"))),
                            other => panic!("unexpected request: {}", other),
                        };
                        Ok::<_, hyper::Error>(response)
                    });
                    let _ = http1::Builder::new().serve_connection(io, service).await;
                });
            }
        });

        addr
    }

    async fn open_receiver() -> UdpSocket {
        let receiver = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        receiver.set_reuse_address(true).unwrap();
        receiver.bind(&SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0).into()).unwrap();
        receiver.set_nonblocking(true).unwrap();
        UdpSocket::from_std(receiver.into()).unwrap()
    }

    async fn recv_message(receiver: &UdpSocket) -> (PacketHeader, Vec<u8>) {
        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).await.unwrap();
        let mut b: &[u8] = &buf[..n];
        let header = PacketHeader::deser(&mut b).unwrap();
        (header, b.to_vec())
    }

    #[rstest]
    fn test_relay_end_to_end() {
        let rt = Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let api_addr = spawn_api_stub().await;
            let receiver = open_receiver().await;
            let port = receiver.local_addr().unwrap().port();

            let config = RelayConfig::new(
                format!("http://{}", api_addr),
                MulticastConfig {
                    destination: SocketAddrV4::new(Ipv4Addr::LOCALHOST, port),
                    interface: None,
                    ttl: 1,
                },
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let relay = tokio::spawn(run_relay(config, shutdown_rx));

            // message #2 arrives directly, #3 is announced as a gap (404) and
            //  skipped, #4 comes from catch-up
            let (header, payload) = recv_message(&receiver).await;
            assert_eq!(header.sequence_number, SequenceNumber::from_raw(2));
            assert!(header.last_fragment);
            assert_eq!(payload, b"first");

            let (header, payload) = recv_message(&receiver).await;
            assert_eq!(header.sequence_number, SequenceNumber::from_raw(4));
            assert!(header.last_fragment);
            assert_eq!(payload, b"third");

            shutdown_tx.send(true).unwrap();
            tokio::time::timeout(Duration::from_secs(5), relay).await
                .unwrap().unwrap().unwrap();
        });
    }
}
