//! Agent Transport (§4.1): one full-duplex text channel to one remote agent.
//!
//! The transport itself is socket-agnostic — [`AgentSocket`] is implemented by
//! the server crate on top of an `axum` websocket, and by an in-memory channel
//! pair in tests. This crate only knows "send a line, maybe receive a line".

use std::time::Duration;

use async_trait::async_trait;
use protocol::Packet;
use tracing::warn;

use crate::error::TransportError;

/// The raw duplex line channel an [`AgentTransport`] drives. A `None` from
/// `recv_line` means the peer closed the socket.
#[async_trait]
pub trait AgentSocket: Send {
    async fn send_line(&mut self, text: String) -> std::io::Result<()>;
    async fn recv_line(&mut self) -> Option<String>;
    async fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub action: Duration,
    pub response: Duration,
    pub acceptable: Duration,
}

/// Wraps one [`AgentSocket`] and implements the request/response/probe state
/// machine from §4.1. Does not own `has_error`: that flag lives on `Agent`
/// (§3) since it gates every future send, not just transport internals.
pub struct AgentTransport {
    socket: Box<dyn AgentSocket>,
}

impl AgentTransport {
    pub fn new(socket: Box<dyn AgentSocket>) -> Self {
        AgentTransport { socket }
    }

    pub async fn close(&mut self) {
        self.socket.close().await;
    }

    /// Deliver `packet` and, if it requires one, return the agent's response.
    ///
    /// `has_error` is checked first and, on any fatal outcome, set to `true`
    /// by this call. `original_name` is the identity the liveness probe
    /// compares its answer against.
    pub async fn send(
        &mut self,
        packet: &Packet,
        original_name: &str,
        has_error: &mut bool,
        timeouts: Timeouts,
    ) -> Result<Option<String>, TransportError> {
        if *has_error {
            return Err(TransportError::AgentDisabled);
        }

        let encoded = serde_json::to_string(packet)
            .expect("packet always serializes: no non-finite floats, no raw maps with non-string keys");
        if let Err(e) = self.socket.send_line(encoded).await {
            *has_error = true;
            return Err(TransportError::TransportWrite(e.to_string()));
        }

        if !packet.request.requires_response() {
            return Ok(None);
        }

        let deadline = timeouts.action + timeouts.acceptable;
        match tokio::time::timeout(deadline, self.socket.recv_line()).await {
            Ok(Some(line)) => Ok(Some(line.trim_end_matches(['\n', '\r']).to_string())),
            Ok(None) => {
                *has_error = true;
                Err(TransportError::TransportClosed)
            }
            Err(_elapsed) => self.probe_liveness(original_name, has_error, timeouts).await,
        }
    }

    /// Out-of-band "identify yourself" probe, issued after a response
    /// deadline elapses without closing the socket. Distinguishes a slow
    /// agent (still alive, this turn's answer is just lost) from a dead one.
    async fn probe_liveness(
        &mut self,
        original_name: &str,
        has_error: &mut bool,
        timeouts: Timeouts,
    ) -> Result<Option<String>, TransportError> {
        let probe = Packet::bare(protocol::RequestKind::Name);
        let encoded = serde_json::to_string(&probe).expect("bare packet always serializes");
        if let Err(e) = self.socket.send_line(encoded).await {
            *has_error = true;
            return Err(TransportError::TransportWrite(e.to_string()));
        }

        match tokio::time::timeout(timeouts.response, self.socket.recv_line()).await {
            Ok(Some(answer)) if answer.trim_end_matches(['\n', '\r']) == original_name => {
                Err(TransportError::ResponseTimeout)
            }
            Ok(Some(_other)) => {
                *has_error = true;
                warn!(original_name, "liveness probe answered with an unexpected name");
                Err(TransportError::ProtocolViolation)
            }
            Ok(None) | Err(_) => {
                *has_error = true;
                Err(TransportError::LivenessTimeout)
            }
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::mpsc;

    /// An in-process socket pair standing in for a real connection, so the
    /// transport state machine can be exercised without a network.
    pub struct MockSocket {
        pub outbound: mpsc::UnboundedSender<String>,
        pub inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl AgentSocket for MockSocket {
        async fn send_line(&mut self, text: String) -> std::io::Result<()> {
            self.outbound
                .send(text)
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"))
        }

        async fn recv_line(&mut self) -> Option<String> {
            self.inbound.recv().await
        }
    }

    pub fn mock_pair() -> (MockSocket, mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>) {
        let (to_agent_tx, to_agent_rx) = mpsc::unbounded_channel();
        let (from_agent_tx, from_agent_rx) = mpsc::unbounded_channel();
        let socket = MockSocket {
            outbound: from_agent_tx,
            inbound: to_agent_rx,
        };
        (socket, to_agent_tx, from_agent_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::mock_pair;
    use super::*;
    use protocol::RequestKind;
    use std::time::Duration;

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            action: Duration::from_millis(20),
            response: Duration::from_millis(20),
            acceptable: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn response_received_before_deadline() {
        let (socket, to_agent, mut from_agent) = mock_pair();
        let mut transport = AgentTransport::new(Box::new(socket));
        let mut has_error = false;

        tokio::spawn(async move {
            let _sent = from_agent.recv().await;
            to_agent.send("Agent[02]\n".to_string()).unwrap();
        });

        let packet = Packet::bare(RequestKind::Vote);
        let result = transport
            .send(&packet, "Agent[01]", &mut has_error, fast_timeouts())
            .await
            .unwrap();
        assert_eq!(result, Some("Agent[02]".to_string()));
        assert!(!has_error);
    }

    #[tokio::test]
    async fn timeout_then_matching_probe_is_non_fatal() {
        let (socket, to_agent, mut from_agent) = mock_pair();
        let mut transport = AgentTransport::new(Box::new(socket));
        let mut has_error = false;

        tokio::spawn(async move {
            let _vote_request = from_agent.recv().await;
            let _probe_request = from_agent.recv().await;
            to_agent.send("Agent[01]".to_string()).unwrap();
        });

        let packet = Packet::bare(RequestKind::Vote);
        let err = transport
            .send(&packet, "Agent[01]", &mut has_error, fast_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ResponseTimeout));
        assert!(!has_error, "non-matching-name-fallthrough must not be fatal");
    }

    #[tokio::test]
    async fn probe_mismatch_is_protocol_violation() {
        let (socket, to_agent, mut from_agent) = mock_pair();
        let mut transport = AgentTransport::new(Box::new(socket));
        let mut has_error = false;

        tokio::spawn(async move {
            let _vote_request = from_agent.recv().await;
            let _probe_request = from_agent.recv().await;
            to_agent.send("someone-else".to_string()).unwrap();
        });

        let packet = Packet::bare(RequestKind::Vote);
        let err = transport
            .send(&packet, "Agent[01]", &mut has_error, fast_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ProtocolViolation));
        assert!(has_error);
    }

    #[tokio::test]
    async fn disabled_agent_fails_immediately() {
        let (socket, _to_agent, _from_agent) = mock_pair();
        let mut transport = AgentTransport::new(Box::new(socket));
        let mut has_error = true;

        let packet = Packet::bare(RequestKind::Vote);
        let err = transport
            .send(&packet, "Agent[01]", &mut has_error, fast_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::AgentDisabled));
    }
}
