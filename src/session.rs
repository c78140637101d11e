use std::{

    mem::{MaybeUninit},
    io::{ErrorKind},

    time::{

        Duration,
        Instant,
    },

    net::{

        SocketAddrV4,
        Ipv4Addr,
    },
};

use socket2::{

    Protocol,
    SockAddr,
    Domain,
    Socket,
    Type,
};

use tracing::{debug, trace, warn};

use super::{

    config::{ProbeProtocol},
    error::{EchoError},

    packets::{

        encode_echo_request_with_payload,
        encode_udp_payload,
        decode_reply,
        DecodedReply,
    },

    responses::{Measurement},
};

const RECEIVE_BUFFER_SIZE: usize = 1500;

/// Socket level settings of a probe session: protocol, outbound ttl, how long
/// a probe waits for its reply and what each probe carries.
#[derive(Clone, Debug)]
pub struct SessionOptions {

    pub protocol: ProbeProtocol,
    pub ttl: u32,
    pub timeout: Duration,

    /// Bytes following the echo header, or the UDP datagram size.
    pub payload_size: usize,

    /// Base destination port of UDP probes, probe `n` targets `port + n`.
    pub port: u16,

    /// Drop replies whose ICMP checksum does not verify.
    pub strict_checksum: bool,
}

impl Default for SessionOptions {
    fn default() -> SessionOptions {
        SessionOptions {

            protocol: ProbeProtocol::Icmp,
            ttl: 64,

            timeout: {

                Duration::from_millis(2000)
            },

            payload_size: 0,
            port: 33434,
            strict_checksum: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sent,
    Matched,
    TimedOut,
    SocketError,
    Closed,
}

/// What the controllers need from a probe session.
pub trait Probe {

    /// Outbound time to live for the following probes.
    fn set_ttl(&mut self, ttl: u8) -> Result<(), EchoError>;

    /// Send one probe and wait for its reply or the timeout.
    fn probe(&mut self, identifier: u16, sequence: u16) -> Result<Measurement, EchoError>;
}

/// Reply a probe is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Expectation {
    Echo { identifier: u16, sequence: u16 },
    Udp { source_port: u16, destination_port: u16 },
}

impl Expectation {
    pub fn accepts(&self, reply: &DecodedReply) -> bool {
        match *self {

            Self::Echo { identifier, sequence } => reply.answers_echo(identifier, sequence),
            Self::Udp { source_port, destination_port } => reply.answers_udp(source_port, destination_port),
        }
    }
}

/// Raw socket probing of a single IPv4 destination.
///
/// In UDP mode probes leave through a datagram socket while replies are
/// still read from the raw ICMP socket.
pub struct ProbeSession {

    destination: Ipv4Addr,
    options: SessionOptions,
    state: SessionState,

    receiver: Option<Socket>,
    sender: Option<Socket>,
    local_port: u16,
}

impl ProbeSession {

    /// Open the sockets for `destination`.
    pub fn open(destination: Ipv4Addr, options: SessionOptions) -> Result<ProbeSession, EchoError> {
        let receiver = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(socket_create_error)?;

        receiver.set_read_timeout(Some(options.timeout)).map_err(|e| {
            EchoError::SocketSetReadTimeout(e.to_string())
        })?;

        receiver.set_ttl(options.ttl).map_err(|e| {
            EchoError::SocketSetMaxHops(e.to_string())
        })?;

        let (sender, local_port) = match options.protocol {

            ProbeProtocol::Icmp => (None, 0),
            ProbeProtocol::Udp => {

                let source_address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
                let sender = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
                    .map_err(socket_create_error)?;

                sender.bind(&(source_address.into())).map_err(|e| {
                    EchoError::SocketBind(source_address.to_string(), e.to_string())
                })?;

                sender.set_ttl(options.ttl).map_err(|e| {
                    EchoError::SocketSetMaxHops(e.to_string())
                })?;

                let local_port = sender.local_addr()
                    .map_err(|e| EchoError::SocketLocalAddress(e.to_string()))?
                    .as_socket_ipv4()
                    .map(|address| address.port())
                    .ok_or(EchoError::SocketLocalAddress({
                        "not an ipv4 address".to_string()
                    }))?;

                (Some(sender), local_port)
            }
        };

        debug!(%destination, protocol = %options.protocol, local_port, "Opened probe session");

        Ok(ProbeSession {

            destination: destination,
            options: options,
            state: SessionState::Idle,

            receiver: Some(receiver),
            sender: sender,
            local_port: local_port,
        })
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Release the sockets. Calling it again does nothing.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return
        }

        self.receiver.take();
        self.sender.take();
        self.state = SessionState::Closed;

        debug!(destination = %self.destination, "Closed probe session");
    }

    fn expectation(&self, identifier: u16, sequence: u16) -> Expectation {
        match self.options.protocol {

            ProbeProtocol::Icmp => Expectation::Echo {
                identifier: identifier,
                sequence: sequence,
            },

            ProbeProtocol::Udp => Expectation::Udp {
                source_port: self.local_port,
                destination_port: self.options.port.wrapping_add(sequence),
            },
        }
    }

    fn inner_send(&self, identifier: u16, sequence: u16) -> Result<(), EchoError> {
        match (self.options.protocol, &self.receiver, &self.sender) {

            (ProbeProtocol::Icmp, Some(socket), _) => {
                let request = encode_echo_request_with_payload(identifier, sequence, {
                    self.options.payload_size
                })?;

                let target = SockAddr::from(SocketAddrV4::new(self.destination, 0));
                socket.send_to(&(request), &(target)).map_err(|e| {
                    EchoError::SocketSend(e.to_string())
                })?;
            }

            (ProbeProtocol::Udp, _, Some(socket)) => {
                let port = self.options.port.wrapping_add(sequence);
                let target = SockAddr::from(SocketAddrV4::new(self.destination, port));
                socket.send_to(&(encode_udp_payload(self.options.payload_size)), &(target)).map_err(|e| {
                    EchoError::SocketSend(e.to_string())
                })?;
            }

            _ => return Err(EchoError::SessionClosed),
        }

        Ok(())
    }
}

impl Probe for ProbeSession {
    fn set_ttl(&mut self, ttl: u8) -> Result<(), EchoError> {
        let socket = match self.options.protocol {

            ProbeProtocol::Icmp => self.receiver.as_ref(),
            ProbeProtocol::Udp => self.sender.as_ref(),
        };

        socket.ok_or(EchoError::SessionClosed)?.set_ttl(ttl as u32).map_err(|e| {
            EchoError::SocketSetMaxHops(e.to_string())
        })?;

        self.options.ttl = ttl as u32;
        Ok(())
    }

    fn probe(&mut self, identifier: u16, sequence: u16) -> Result<Measurement, EchoError> {
        if self.state == SessionState::Closed {
            return Err(EchoError::SessionClosed)
        }

        let expectation = self.expectation(identifier, sequence);
        let sent_at = Instant::now();

        let deadline = sent_at.checked_add(self.options.timeout).ok_or_else(|| {
            EchoError::TimeoutRange(format!("{:?}", self.options.timeout))
        })?;

        if let Err(e) = self.inner_send(identifier, sequence) {
            self.state = SessionState::SocketError;
            return Err(e)
        }

        self.state = SessionState::Sent;
        trace!(destination = %self.destination, identifier, sequence, "Sent probe");

        let receiver = self.receiver.as_ref().ok_or(EchoError::SessionClosed)?;
        let outcome = wait_for_reply(|buf, remaining| inner_recv(receiver, buf, remaining), {
            deadline
        }, &(expectation), self.options.strict_checksum);

        match outcome {

            Ok(Some((reply, received_at))) => {
                self.state = SessionState::Matched;

                Ok(Measurement {

                    sequence: sequence,
                    sent_at: sent_at,

                    received_at: Some(received_at),
                    elapsed: Some(received_at.duration_since(sent_at)),
                    ttl: Some(reply.ttl),
                    responder: Some(reply.source),
                    bytes: reply.icmp_length(),
                    kind: Some(reply.reply_kind()),
                })
            }

            Ok(None) => {
                self.state = SessionState::TimedOut;
                debug!(destination = %self.destination, sequence, "Probe timed out");

                Ok(Measurement::lacking(sequence, sent_at))
            }

            Err(e) => {
                self.state = SessionState::SocketError;
                Err(e)
            }
        }
    }
}

impl Drop for ProbeSession {
    fn drop(&mut self) {
        self.close()
    }
}

fn socket_create_error(e: std::io::Error) -> EchoError {
    match e.kind() {

        ErrorKind::PermissionDenied => EchoError::SocketPermission(e.to_string()),
        _ => EchoError::SocketCreate(e.to_string()),
    }
}

/// Receive one datagram, `Ok(None)` when `timeout` passes first.
fn inner_recv(socket: &Socket, buf: &mut [u8], timeout: Duration) -> Result<Option<usize>, EchoError> {
    socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1)))).map_err(|e| {
        EchoError::SocketSetReadTimeout(e.to_string())
    })?;

    // SAFETY: an initialized byte buffer is a valid `MaybeUninit<u8>` buffer,
    // and `recv_from` never writes uninitialized bytes into it.
    let uninit = unsafe {
        &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>])
    };

    match socket.recv_from(uninit) {

        Ok((length, _)) => Ok(Some(length)),

        Err(e) => match e.kind() {

            ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::Interrupted => Ok(None),

            _ => Err(EchoError::SocketReceive(e.to_string())),
        }
    }
}

/// Read datagrams until one satisfies `expectation` or `deadline` passes.
///
/// Malformed and unrelated datagrams are dropped and the wait goes on.
pub(crate) fn wait_for_reply<R>(mut recv: R, deadline: Instant, expectation: &Expectation, strict_checksum: bool)
    -> Result<Option<(DecodedReply, Instant)>, EchoError>
where
    R: FnMut(&mut [u8], Duration) -> Result<Option<usize>, EchoError>,
{
    let mut buf: [u8; RECEIVE_BUFFER_SIZE] = {
        [0; RECEIVE_BUFFER_SIZE]
    };

    loop {

        let now = Instant::now();
        if now >= deadline {
            break Ok(None)
        }

        let length = match recv(&mut buf[..], deadline - now)? {
            Some(length) => length,
            None => continue,
        };

        let received_at = Instant::now();
        let reply = match decode_reply(&(buf[..length])) {

            Ok(reply) => reply,
            Err(e) => {
                warn!("Discarding datagram, {}", e);
                continue
            }
        };

        if strict_checksum && !reply.checksum_valid() {
            debug!(source = %reply.source, "Discarding datagram with invalid checksum");
            continue
        }

        if expectation.accepts(&reply) {
            break Ok(Some((reply, received_at)))
        }

        trace!(source = %reply.source, kind = reply.kind, code = reply.code, "Discarding unrelated datagram");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{VecDeque};
    use std::net::{SocketAddr, UdpSocket};
    use std::thread;

    use crate::packets::{

        encode_echo_request,
        fixtures::*,
        IPPROTO_ICMP,
        IPPROTO_UDP,
    };

    use crate::responses::{ReplyKind, UnreachableCode};

    fn scripted(datagrams: Vec<Vec<u8>>) -> impl FnMut(&mut [u8], Duration) -> Result<Option<usize>, EchoError> {
        let mut queue: VecDeque<Vec<u8>> = datagrams.into();
        move |buf: &mut [u8], remaining: Duration| match queue.pop_front() {

            Some(datagram) => {
                buf[..datagram.len()].copy_from_slice(&datagram);
                Ok(Some(datagram.len()))
            }

            None => {
                thread::sleep(remaining);
                Ok(None)
            }
        }
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_millis(50)
    }

    #[test]
    fn test_skips_mismatched_replies() {
        let source = Ipv4Addr::new(192, 0, 2, 1);
        let recv = scripted(vec![
            echo_reply(source, 7, 2, 60),
            echo_reply(source, 8, 3, 60),
            vec![0x45, 0x00, 0x00],
            echo_reply(source, 7, 3, 61),
        ]);

        let expectation = Expectation::Echo { identifier: 7, sequence: 3 };
        let (reply, _) = wait_for_reply(recv, deadline(), &expectation, false)
            .unwrap()
            .expect("matching reply");

        assert_eq!(reply.identifier, 7);
        assert_eq!(reply.sequence, 3);
        assert_eq!(reply.ttl, 61);
    }

    #[test]
    fn test_times_out_when_nothing_matches() {
        let recv = scripted(vec![
            echo_reply(Ipv4Addr::LOCALHOST, 1, 1, 64),
            echo_reply(Ipv4Addr::LOCALHOST, 2, 2, 64),
        ]);

        let started = Instant::now();
        let expectation = Expectation::Echo { identifier: 3, sequence: 3 };
        let outcome = wait_for_reply(recv, started + Duration::from_millis(30), &expectation, false).unwrap();

        assert!(outcome.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_strict_checksum_drops_corrupt_reply() {
        let mut corrupt = echo_reply(Ipv4Addr::LOCALHOST, 4, 4, 64);
        corrupt[22] ^= 0x01;

        let expectation = Expectation::Echo { identifier: 4, sequence: 4 };

        let lenient = wait_for_reply(scripted(vec![corrupt.clone()]), deadline(), &expectation, false).unwrap();
        assert!(lenient.is_some());

        let strict = wait_for_reply(scripted(vec![corrupt]), deadline(), &expectation, true).unwrap();
        assert!(strict.is_none());
    }

    #[test]
    fn test_accepts_time_exceeded_for_outstanding_probe() {
        let router = Ipv4Addr::new(10, 9, 8, 7);
        let target = Ipv4Addr::new(203, 0, 113, 9);
        let stale = encode_echo_request(99, 4).unwrap();
        let current = encode_echo_request(99, 5).unwrap();

        let recv = scripted(vec![
            icmp_error(router, 11, 0, target, IPPROTO_ICMP, &stale),
            icmp_error(router, 11, 0, target, IPPROTO_ICMP, &current),
        ]);

        let expectation = Expectation::Echo { identifier: 99, sequence: 5 };
        let (reply, _) = wait_for_reply(recv, deadline(), &expectation, false).unwrap().unwrap();
        assert_eq!(reply.source, router);
    }

    #[test]
    fn test_udp_expectation_matches_ports() {
        let target = Ipv4Addr::new(203, 0, 113, 9);
        let udp = [0xC3, 0x50, 0x82, 0x9C, 0x00, 0x08, 0x00, 0x00];
        let datagram = icmp_error(target, 3, 3, target, IPPROTO_UDP, &udp);
        let reply = crate::packets::decode_reply(&datagram).unwrap();

        assert!(Expectation::Udp { source_port: 50000, destination_port: 33436 }.accepts(&reply));
        assert!(!Expectation::Udp { source_port: 50001, destination_port: 33436 }.accepts(&reply));
    }

    #[test]
    fn test_receive_error_aborts_wait() {
        let recv = |_: &mut [u8], _: Duration| -> Result<Option<usize>, EchoError> {
            Err(EchoError::SocketReceive("connection refused".to_string()))
        };

        let expectation = Expectation::Echo { identifier: 1, sequence: 1 };
        assert!(matches!(wait_for_reply(recv, deadline(), &expectation, false), Err(EchoError::SocketReceive(_))));
    }

    /// UDP mode session on loopback datagram sockets. Anything sent to the
    /// returned address lands on the session's receiving socket.
    fn loopback_session(timeout: Duration) -> (ProbeSession, UdpSocket, SocketAddr) {
        let loopback = SockAddr::from(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));

        let receiver = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        receiver.bind(&loopback).unwrap();
        let inbox = receiver.local_addr().unwrap().as_socket().unwrap();

        let sender = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).unwrap();
        sender.bind(&loopback).unwrap();
        let local_port = sender.local_addr().unwrap().as_socket_ipv4().unwrap().port();

        let session = ProbeSession {

            destination: Ipv4Addr::LOCALHOST,

            options: SessionOptions {
                protocol: ProbeProtocol::Udp,
                timeout: timeout,
                ..SessionOptions::default()
            },

            state: SessionState::Idle,
            receiver: Some(receiver),
            sender: Some(sender),
            local_port: local_port,
        };

        (session, UdpSocket::bind("127.0.0.1:0").unwrap(), inbox)
    }

    fn port_unreachable(session: &ProbeSession, sequence: u16) -> Vec<u8> {
        let mut udp = Vec::new();
        udp.extend_from_slice(&session.local_port.to_be_bytes());
        udp.extend_from_slice(&session.options.port.wrapping_add(sequence).to_be_bytes());
        udp.extend_from_slice(&[0x00, 0x08, 0x00, 0x00]);

        icmp_error(Ipv4Addr::LOCALHOST, 3, 3, Ipv4Addr::LOCALHOST, IPPROTO_UDP, &udp)
    }

    #[test]
    fn test_late_reply_does_not_answer_next_probe() {
        let (mut session, injector, inbox) = loopback_session(Duration::from_millis(100));
        assert_eq!(session.state(), SessionState::Idle);

        // Answer to probe 1 arriving while probe 2 is outstanding.
        injector.send_to(&port_unreachable(&session, 1), inbox).unwrap();

        let measurement = session.probe(0, 2).unwrap();
        assert!(measurement.is_lacking());
        assert_eq!(session.state(), SessionState::TimedOut);

        injector.send_to(&port_unreachable(&session, 2), inbox).unwrap();
        injector.send_to(&port_unreachable(&session, 3), inbox).unwrap();

        let measurement = session.probe(0, 3).unwrap();
        assert_eq!(measurement.sequence, 3);
        assert_eq!(measurement.responder, Some(Ipv4Addr::LOCALHOST));
        assert_eq!(measurement.kind, {
            Some(ReplyKind::Unreachable(UnreachableCode::DestinationPortUnreachable))
        });
        assert_eq!(session.state(), SessionState::Matched);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut session, _, _) = loopback_session(Duration::from_millis(10));

        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closed);

        assert!(matches!(session.probe(0, 1), Err(EchoError::SessionClosed)));
        assert!(matches!(session.set_ttl(5), Err(EchoError::SessionClosed)));
    }

    #[test]
    fn test_timeout_beyond_clock_range() {
        let (mut session, _, _) = loopback_session(Duration::MAX);
        assert!(matches!(session.probe(0, 1), Err(EchoError::TimeoutRange(_))));
    }

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options.protocol, ProbeProtocol::Icmp);
        assert_eq!(options.timeout, Duration::from_secs(2));
        assert_eq!(options.port, 33434);
        assert!(!options.strict_checksum);
    }
}
