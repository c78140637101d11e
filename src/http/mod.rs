//! One request, one response, then the connection is closed.

pub mod proxy;
pub mod server;

use std::{

    io::{Read, Write, ErrorKind},
    net::{TcpListener, TcpStream},
    thread,

    time::{Duration},
};

use tracing::{debug, error, info};

use super::{

    error::{EchoError},
    stop::{StopFlag},
};

const MAX_REQUEST_SIZE: usize = 64 * 1024;
const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
    pub version: String,
}

/// Split a request into its request line, header lines and body.
pub fn parse_request(request: &[u8]) -> Result<(RequestLine, Vec<(String, String)>, &[u8]), EchoError> {
    let end = header_end(request).ok_or(EchoError::HttpRequest({
        "incomplete header".to_string()
    }))?;

    let head = std::str::from_utf8(&(request[..end])).map_err(|e| {
        EchoError::HttpRequest(e.to_string())
    })?;

    let mut lines = head.split("\r\n").filter(|line| !line.is_empty());
    let mut parts = lines.next().unwrap_or_default().split_whitespace();

    let line = match (parts.next(), parts.next(), parts.next(), parts.next()) {

        (Some(method), Some(target), Some(version), None) if version.starts_with("HTTP/") => RequestLine {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        },

        _ => return Err(EchoError::HttpRequest("malformed request line".to_string())),
    };

    let mut headers = Vec::new();
    for header in lines {
        let (name, value) = header.split_once(':').ok_or(EchoError::HttpRequest({
            format!("malformed header '{}'", header)
        }))?;

        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok((line, headers, &(request[(end + 4)..])))
}

/// Offset of the blank line ending the header section.
fn header_end(request: &[u8]) -> Option<usize> {
    request.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Complete response with a plain text body.
pub fn status_response(code: u16, reason: &str, body: &[u8], content_type: &str) -> Vec<u8> {
    let mut response = format!("HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", {
        code
    }, reason, content_type, body.len()).into_bytes();

    response.extend_from_slice(body);
    response
}

pub fn error_response(code: u16, reason: &str) -> Vec<u8> {
    status_response(code, reason, format!("{} {}\n", code, reason).as_bytes(), "text/plain")
}

/// Read the header section and the body it announces, stopping early when the
/// peer closes or the size cap is hit.
pub(crate) fn read_request(stream: &mut TcpStream) -> Result<Vec<u8>, EchoError> {
    let peer = peer_name(stream);
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];

    loop {

        let length = match stream.read(&mut buf) {

            Ok(length) => length,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(EchoError::HttpIo(peer, e.to_string())),
        };

        if length == 0 {
            break
        }

        request.extend_from_slice(&(buf[..length]));
        if request.len() >= MAX_REQUEST_SIZE {
            break
        }

        if let Some(end) = header_end(&request) {
            if request.len() >= end + 4 + content_length(&(request[..end])) {
                break
            }
        }
    }

    Ok(request)
}

/// Body size announced by `Content-Length`, zero when absent or unparsable.
fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .split("\r\n")
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn peer_name(stream: &TcpStream) -> String {
    stream.peer_addr()
        .map(|address| address.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string())
}

/// Accept connections on `port` until `stop` is raised, answering each one
/// with `respond` on the accepting thread.
pub(crate) fn serve<F>(name: &str, port: u16, stop: &StopFlag, mut respond: F) -> Result<(), EchoError>
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    let address = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&address).map_err(|e| {
        EchoError::HttpIo(address.clone(), e.to_string())
    })?;

    listener.set_nonblocking(true).map_err(|e| {
        EchoError::HttpIo(address.clone(), e.to_string())
    })?;

    info!("{} listening on {}", name, address);

    while !stop.is_raised() {
        match listener.accept() {

            Ok((mut stream, peer)) => {
                debug!(%peer, "Accepted connection");

                if let Err(e) = exchange(&mut stream, &mut respond) {
                    error!("Error handling client {}: {}", peer, e);
                }
            }

            Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => error!("Failed to accept connection: {}", e),
        }
    }

    info!("{} stopped", name);
    Ok(())
}

fn exchange<F>(stream: &mut TcpStream, respond: &mut F) -> Result<(), EchoError>
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    let peer = peer_name(stream);

    stream.set_nonblocking(false).map_err(|e| EchoError::HttpIo(peer.clone(), e.to_string()))?;
    stream.set_read_timeout(Some(READ_TIMEOUT)).map_err(|e| EchoError::HttpIo(peer.clone(), e.to_string()))?;

    let request = read_request(stream)?;
    let response = respond(&request);

    stream.write_all(&response).map_err(|e| EchoError::HttpIo(peer.clone(), e.to_string()))?;
    stream.flush().map_err(|e| EchoError::HttpIo(peer.clone(), e.to_string()))?;

    // Peer may already be gone.
    let _ = stream.shutdown(std::net::Shutdown::Both);
    Ok(())
}
