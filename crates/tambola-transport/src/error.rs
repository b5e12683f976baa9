/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The TCP connection arrived but the WebSocket upgrade failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    /// An outbound frame was not valid UTF-8. The protocol is JSON, so
    /// every frame must be text.
    #[error("outbound frame is not valid utf-8")]
    NotText,
}
