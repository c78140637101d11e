use thiserror::{Error};

#[derive(Error, Debug)]
pub enum EchoError {
    #[error("Failed to resolve address for hostname: '{0}'")]
    ResolverIpLookup(String),
    #[error("Insufficient permissions for raw sockets, run with sudo or grant cap_net_raw. Reason: {0}")]
    SocketPermission(String),
    #[error("Failed to create socket, reason: {0}")]
    SocketCreate(String),
    #[error("Socket failed binding to address '{0}', reason: {1}")]
    SocketBind(String, String),
    #[error("Could not set sockets read timeout, reason: {0}")]
    SocketSetReadTimeout(String),
    #[error("Could not set sockets max hops, reason: {0}")]
    SocketSetMaxHops(String),
    #[error("Could not read sockets local address, reason: {0}")]
    SocketLocalAddress(String),
    #[error("Socket send, reason: {0}")]
    SocketSend(String),
    #[error("Socket receive, reason: {0}")]
    SocketReceive(String),
    #[error("Probe timeout out of range: {0}")]
    TimeoutRange(String),
    #[error("Probe session is closed.")]
    SessionClosed,
    #[error("Malformed packet, {0}")]
    MalformedPacket(String),
    #[error("Failed to read response field '{0}', reason: {1}")]
    ResponseReadField(&'static str, String),
    #[error("Failed to write request field '{0}', reason: {1}")]
    RequestWriteField(&'static str, String),
    #[error("Failed to write request payload, reason: {0}")]
    RequestWritePayload(String),
    #[error("Failed to write output, reason: {0}")]
    Output(String),
    #[error("Bad request, {0}")]
    HttpRequest(String),
    #[error("Connection failure on '{0}', reason: {1}")]
    HttpIo(String, String),
}
