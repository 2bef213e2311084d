use super::publisher::MAX_LINE_LENGTH;
use super::types::{Frame, SUBSCRIBE_COMMAND, Topic};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};

/// Worker-side end of the bus.
pub struct BusSubscriber {
    lines: Framed<TcpStream, LinesCodec>,
}

impl BusSubscriber {
    pub async fn connect(addr: SocketAddr, topics: &[Topic]) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connecting to bus at {}", addr))?;
        let mut lines = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

        for topic in topics {
            lines.send(format!("{} {}", SUBSCRIBE_COMMAND, topic)).await?;
        }

        Ok(Self { lines })
    }

    /// Next well-formed frame; `None` once the publisher has gone away.
    /// Cancel-safe: a frame is never half consumed when the call is dropped.
    pub async fn recv(&mut self) -> Result<Option<Frame>> {
        while let Some(line) = self.lines.next().await {
            let line = line.context("reading bus frame")?;
            match Frame::decode(&line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => tracing::warn!("Skipping malformed bus frame ({}): {:?}", e, line),
            }
        }

        Ok(None)
    }
}
