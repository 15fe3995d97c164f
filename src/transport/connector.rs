use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

use crate::error::TransportError;

/// A message on the streaming connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Close => Message::Close(None),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Opens streaming connections
///
/// Each call performs a full handshake and returns the two halves of a fresh
/// connection. Injectable so the channel can be driven without a network.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        info!("Connecting to {}", url);

        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let sink = write.with(|frame: Frame| async move { Ok::<_, TransportError>(Message::from(frame)) });

        let stream = read.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                // Ping/pong are answered by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            }
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}
