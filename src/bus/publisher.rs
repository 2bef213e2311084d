use super::types::{Frame, SUBSCRIBE_COMMAND, Topic};

use anyhow::Result;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};
use uuid::Uuid;

/// Frames buffered per subscriber before new ones are dropped.
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;
pub(crate) const MAX_LINE_LENGTH: usize = 64 * 1024;

struct Subscriber {
    peer: SocketAddr,
    topics: HashSet<Topic>,
    tx: mpsc::Sender<String>,
}

/// Router-side end of the bus: accepts subscriber connections and fans
/// published frames out to the ones subscribed to the frame's topic.
#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Arc<DashMap<Uuid, Subscriber>>,
    local_addr: SocketAddr,
}

impl BusPublisher {
    /// Binds the bus listener and starts accepting subscribers in the background.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let subscribers = Arc::new(DashMap::new());

        tokio::spawn(accept_loop(listener, subscribers.clone()));
        tracing::info!("Bus publisher listening on {}", local_addr);

        Ok(Self {
            subscribers,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queues `frame` for every matching subscriber and returns how many took it.
    /// Never blocks: full or closed connections lose the frame.
    pub fn publish(&self, frame: &Frame) -> usize {
        let line = frame.encode();
        let mut delivered = 0;

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.topics.contains(&frame.topic) {
                continue;
            }

            match subscriber.tx.try_send(line.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Subscriber {} is lagging, dropped {} frame", subscriber.peer, frame.topic);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        if delivered == 0 {
            tracing::warn!(
                "No subscriber for {}, frame for {} lost",
                frame.topic,
                frame.intent.book_code
            );
        }

        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers
            .iter()
            .filter(|entry| entry.value().topics.contains(&topic))
            .count()
    }
}

async fn accept_loop(listener: TcpListener, subscribers: Arc<DashMap<Uuid, Subscriber>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(stream, peer, subscribers.clone()));
            }
            Err(e) => {
                tracing::error!("Bus accept failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, subscribers: Arc<DashMap<Uuid, Subscriber>>) {
    let id = Uuid::new_v4();
    let (mut sink, mut lines) = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)).split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_CAPACITY);

    subscribers.insert(
        id,
        Subscriber {
            peer,
            topics: HashSet::new(),
            tx,
        },
    );
    tracing::info!("Bus subscriber {} connected", peer);

    let send_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = sink.send(line).await {
                tracing::warn!("Bus write to {} failed: {}", peer, e);
                break;
            }
        }
    });

    while let Some(result) = lines.next().await {
        match result {
            Ok(line) => match parse_subscription(&line) {
                Some(topic) => {
                    if let Some(mut subscriber) = subscribers.get_mut(&id) {
                        subscriber.topics.insert(topic);
                    }
                    tracing::info!("Bus subscriber {} subscribed to {}", peer, topic);
                }
                None => tracing::warn!("Ignoring bus command from {}: {:?}", peer, line),
            },
            Err(e) => {
                tracing::warn!("Bus read from {} failed: {}", peer, e);
                break;
            }
        }
    }

    subscribers.remove(&id);
    send_task.abort();
    tracing::info!("Bus subscriber {} disconnected", peer);
}

fn parse_subscription(line: &str) -> Option<Topic> {
    let (command, topic) = line.trim().split_once(' ')?;
    if command != SUBSCRIBE_COMMAND {
        return None;
    }
    topic.trim().parse().ok()
}
