use std::{

    io::{Read, Write},
    net::{TcpStream, ToSocketAddrs},

    time::{Duration},
};

use tracing::{debug, warn};

use super::{

    error_response,
    parse_request,
};

use crate::{

    error::{EchoError},
    stop::{StopFlag},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ORIGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Headers that describe the client hop and never travel upstream.
const HOP_HEADERS: [&str; 4] = ["connection", "proxy-connection", "keep-alive", "upgrade"];

/// Request rewritten for the origin server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upstream {
    pub host: String,
    pub port: u16,
    pub request: Vec<u8>,
}

/// Forward requests received on `port` until `stop` is raised.
pub fn run(port: u16, stop: &StopFlag) -> Result<(), EchoError> {
    super::serve("Proxy", port, stop, respond)
}

/// Forward one client request and return the origin's response, or an
/// error response when that is impossible.
pub fn respond(request: &[u8]) -> Vec<u8> {
    let upstream = match rewrite(request) {

        Ok(upstream) => upstream,
        Err(e) => {
            debug!("Rejecting request, {}", e);
            return error_response(400, "Bad Request")
        }
    };

    match forward(&upstream) {

        Ok(response) => response,
        Err(e) => {
            warn!("Origin {}:{} failed, {}", upstream.host, upstream.port, e);
            error_response(502, "Bad Gateway")
        }
    }
}

/// Turn a proxy request into an origin-form request with `Connection: close`.
pub fn rewrite(request: &[u8]) -> Result<Upstream, EchoError> {
    let (line, headers, body) = parse_request(request)?;

    let (authority, path) = match line.target.strip_prefix("http://") {

        Some(rest) => match rest.find('/') {

            Some(index) => (rest[..index].to_string(), rest[index..].to_string()),
            None => (rest.to_string(), "/".to_string()),
        },

        None if line.target.starts_with('/') => {
            let host = headers.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("host"))
                .map(|(_, value)| value.clone())
                .ok_or(EchoError::HttpRequest("missing host".to_string()))?;

            (host, line.target.clone())
        }

        None => return Err(EchoError::HttpRequest({
            format!("unsupported target '{}'", line.target)
        })),
    };

    let (host, port) = split_authority(&authority)?;

    let mut rewritten = format!("{} {} {}\r\n", line.method, path, line.version);
    let mut has_host = false;

    for (name, value) in headers.iter() {
        let lower = name.to_ascii_lowercase();
        if HOP_HEADERS.contains(&lower.as_str()) {
            continue
        }

        has_host |= lower == "host";
        rewritten.push_str(&format!("{}: {}\r\n", name, value));
    }

    if !has_host {
        rewritten.push_str(&format!("Host: {}\r\n", authority));
    }

    rewritten.push_str("Connection: close\r\n\r\n");

    let mut request = rewritten.into_bytes();
    request.extend_from_slice(body);

    Ok(Upstream {
        host: host,
        port: port,
        request: request,
    })
}

fn split_authority(authority: &str) -> Result<(String, u16), EchoError> {
    match authority.rsplit_once(':') {

        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                EchoError::HttpRequest(format!("invalid port in '{}'", authority))
            })?;

            Ok((host.to_string(), port))
        }

        None if !authority.is_empty() => Ok((authority.to_string(), 80)),
        None => Err(EchoError::HttpRequest("empty host".to_string())),
    }
}

/// Send the rewritten request to the origin and read its whole response.
pub fn forward(upstream: &Upstream) -> Result<Vec<u8>, EchoError> {
    let origin = format!("{}:{}", upstream.host, upstream.port);

    let address = (upstream.host.as_str(), upstream.port).to_socket_addrs()
        .map_err(|_| EchoError::ResolverIpLookup(upstream.host.clone()))?
        .next()
        .ok_or(EchoError::ResolverIpLookup(upstream.host.clone()))?;

    let mut stream = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT).map_err(|e| {
        EchoError::HttpIo(origin.clone(), e.to_string())
    })?;

    stream.set_read_timeout(Some(ORIGIN_TIMEOUT)).map_err(|e| {
        EchoError::HttpIo(origin.clone(), e.to_string())
    })?;

    stream.write_all(&(upstream.request)).map_err(|e| {
        EchoError::HttpIo(origin.clone(), e.to_string())
    })?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).map_err(|e| {
        EchoError::HttpIo(origin.clone(), e.to_string())
    })?;

    debug!(%origin, bytes = response.len(), "Relayed response");
    Ok(response)
}
