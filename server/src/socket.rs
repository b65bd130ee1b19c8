//! [`engine::transport::AgentSocket`] implemented over an `axum` websocket.
//!
//! One text frame per line; anything that isn't `Message::Text` is ignored
//! rather than treated as a protocol error, matching the relay server's
//! "ignore ping/pong and anything else" stance on unexpected frame kinds.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use engine::transport::AgentSocket;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

pub struct AxumSocket {
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
}

impl AxumSocket {
    pub fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        AxumSocket { sender, receiver }
    }
}

#[async_trait]
impl AgentSocket for AxumSocket {
    async fn send_line(&mut self, text: String) -> std::io::Result<()> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string()))
    }

    async fn recv_line(&mut self) -> Option<String> {
        loop {
            match self.receiver.next().await? {
                Ok(Message::Text(text)) => return Some(text.to_string()),
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.sender.send(Message::Close(None)).await;
        let _ = self.sender.close().await;
    }
}
