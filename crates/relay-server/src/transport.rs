//! [`Transport`] over an upgraded axum `WebSocket`.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use relay_hub::Frame;
use relay_hub::errors::TransportError;
use relay_hub::transport::{FrameSink, FrameSource, InboundFrame, Transport};

/// An upgraded WebSocket, ready to hand to `run_agent`.
pub struct WsTransport {
    socket: WebSocket,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        Self { socket }
    }
}

impl Transport for WsTransport {
    type Sink = WsSink;
    type Source = WsSource;

    fn split(self) -> (WsSink, WsSource) {
        let (sink, stream) = self.socket.split();
        (WsSink { sink }, WsSource { stream })
    }
}

/// Write half of a [`WsTransport`].
pub struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_frames(&mut self, frames: &[Frame]) -> Result<(), TransportError> {
        for frame in frames {
            self.sink
                .feed(Message::Text(frame.to_string().into()))
                .await
                .map_err(TransportError::backend)?;
        }
        self.sink.flush().await.map_err(TransportError::backend)
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(TransportError::backend)
    }

    async fn send_close(&mut self) -> Result<(), TransportError> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(TransportError::backend)
    }
}

/// Read half of a [`WsTransport`].
pub struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame, TransportError>> {
        let message = self.stream.next().await?;
        Some(message.map(inbound).map_err(TransportError::backend))
    }
}

fn inbound(message: Message) -> InboundFrame {
    match message {
        Message::Text(text) => InboundFrame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
        Message::Ping(_) => InboundFrame::Ping,
        Message::Pong(_) => InboundFrame::Pong,
        Message::Close(_) => InboundFrame::Close,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_mapping() {
        assert_eq!(
            inbound(Message::Text(String::from("hi").into())),
            InboundFrame::Text("hi".into())
        );
        assert_eq!(
            inbound(Message::Binary(Bytes::from_static(b"{}"))),
            InboundFrame::Binary(b"{}".to_vec())
        );
        assert_eq!(inbound(Message::Ping(Bytes::new())), InboundFrame::Ping);
        assert_eq!(inbound(Message::Pong(Bytes::new())), InboundFrame::Pong);
        assert_eq!(inbound(Message::Close(None)), InboundFrame::Close);
    }
}
