use std::{

    net::{Ipv4Addr},
    io::{Cursor},
};

use super::{

    checksum::{checksum, verify},
    error::{EchoError},
    responses::{ReplyKind},
};

use byteorder::{

    WriteBytesExt,
    ReadBytesExt,
    BigEndian,
};

pub const IP_HEADER_SIZE: usize = 20;
pub const ICMP_HEADER_SIZE: usize = 8;

/// Smallest datagram `decode_reply` accepts, an IP header and an ICMP header.
pub const MIN_REPLY_SIZE: usize = IP_HEADER_SIZE + ICMP_HEADER_SIZE;

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_UDP: u8 = 17;

/// Build an echo request carrying only the 8 byte header.
pub fn encode_echo_request(identifier: u16, sequence: u16) -> Result<Vec<u8>, EchoError> {
    encode_echo_request_with_payload(identifier, sequence, 0)
}

/// Build an echo request followed by `payload_size` random bytes.
pub fn encode_echo_request_with_payload(identifier: u16, sequence: u16, payload_size: usize) -> Result<Vec<u8>, EchoError> {
    let mut cursor = Cursor::new(Vec::with_capacity(ICMP_HEADER_SIZE + payload_size));

    cursor.write_u8(ICMP_ECHO_REQUEST).map_err(|e| {
        EchoError::RequestWriteField("type", e.to_string())
    })?;

    cursor.write_u8(0).map_err(|e| {
        EchoError::RequestWriteField("code", e.to_string())
    })?;

    cursor.write_u16::<BigEndian>(0).map_err(|e| {
        EchoError::RequestWriteField("checksum placeholder", e.to_string())
    })?;

    cursor.write_u16::<BigEndian>(identifier).map_err(|e| {
        EchoError::RequestWriteField("identifier", e.to_string())
    })?;

    cursor.write_u16::<BigEndian>(sequence).map_err(|e| {
        EchoError::RequestWriteField("sequence", e.to_string())
    })?;

    for _ in 0..payload_size {
        cursor.write_u8(rand::random()).map_err(|e| {
            EchoError::RequestWritePayload(e.to_string())
        })?;
    }

    let sum = checksum(cursor.get_ref());

    cursor.set_position(2);
    cursor.write_u16::<BigEndian>(sum).map_err(|e| {
        EchoError::RequestWriteField("checksum", e.to_string())
    })?;

    Ok(cursor.into_inner())
}

/// Payload for UDP probes, the kernel supplies the UDP and IP headers.
pub fn encode_udp_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| 0x40 + (i % 0x20) as u8).collect()
}

/// Leading header of the datagram quoted inside an ICMP error message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OriginalHeader {
    Echo { identifier: u16, sequence: u16 },
    Udp { source_port: u16, destination_port: u16 },
    Other(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Original {
    pub destination: Ipv4Addr,
    pub header: OriginalHeader,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedReply {
    pub protocol: u8,
    pub ttl: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,

    pub kind: u8,
    pub code: u8,
    pub checksum: u16,

    /// Bytes 4..8 of the ICMP header. Only meaningful for echo messages.
    pub identifier: u16,
    pub sequence: u16,

    pub header_length: usize,
    pub length: usize,

    pub original: Option<Original>,

    checksum_valid: bool,
}

impl DecodedReply {
    pub fn reply_kind(&self) -> ReplyKind {
        ReplyKind::from_type_code(self.kind, self.code)
    }

    /// Size of the ICMP message, excluding the IP header.
    pub fn icmp_length(&self) -> usize {
        self.length - self.header_length
    }

    pub fn checksum_valid(&self) -> bool {
        self.checksum_valid
    }

    /// Echo reply to, or error message about, the echo request `identifier`/`sequence`.
    pub fn answers_echo(&self, identifier: u16, sequence: u16) -> bool {
        match self.reply_kind() {

            ReplyKind::EchoReply => {
                self.identifier == identifier && self.sequence == sequence
            }

            ReplyKind::Other(..) => false,

            _ => matches!(self.original, Some(Original {
                header: OriginalHeader::Echo { identifier: i, sequence: s }, ..
            }) if i == identifier && s == sequence)
        }
    }

    /// Error message about the UDP datagram sent from `source_port` to `destination_port`.
    pub fn answers_udp(&self, source_port: u16, destination_port: u16) -> bool {
        match self.reply_kind() {

            ReplyKind::Exceeded | ReplyKind::Unreachable(_) => {
                matches!(self.original, Some(Original {
                    header: OriginalHeader::Udp { source_port: s, destination_port: d }, ..
                }) if s == source_port && d == destination_port)
            }

            _ => false,
        }
    }
}

/// Decode an IPv4 datagram holding an ICMP message, as read from a raw socket.
///
/// The ICMP checksum is recorded but not enforced.
pub fn decode_reply(datagram: &[u8]) -> Result<DecodedReply, EchoError> {
    if datagram.len() < MIN_REPLY_SIZE {
        return Err(EchoError::MalformedPacket({
            format!("expected at least {} bytes, got {}", MIN_REPLY_SIZE, datagram.len())
        }))
    }

    let mut cursor = Cursor::new(datagram);

    let version_and_length = cursor.read_u8().map_err(|e| {
        EchoError::ResponseReadField("internet protocol header size", e.to_string())
    })?;

    if version_and_length >> 4 != 4 {
        return Err(EchoError::MalformedPacket({
            format!("unsupported internet protocol version {}", version_and_length >> 4)
        }))
    }

    let header_octets = ((version_and_length & 0x0F) as usize) * 4;
    if header_octets < IP_HEADER_SIZE || (header_octets + ICMP_HEADER_SIZE) > datagram.len() {
        return Err(EchoError::MalformedPacket({
            format!("header length {} does not fit in {} bytes", header_octets, datagram.len())
        }))
    }

    cursor.set_position(8);
    let ttl = cursor.read_u8().map_err(|e| {
        EchoError::ResponseReadField("time to live", e.to_string())
    })?;

    let protocol = cursor.read_u8().map_err(|e| {
        EchoError::ResponseReadField("protocol", e.to_string())
    })?;

    cursor.set_position(12);
    let source = Ipv4Addr::from(cursor.read_u32::<BigEndian>().map_err(|e| {
        EchoError::ResponseReadField("source address", e.to_string())
    })?);

    let destination = Ipv4Addr::from(cursor.read_u32::<BigEndian>().map_err(|e| {
        EchoError::ResponseReadField("destination address", e.to_string())
    })?);

    cursor.set_position(header_octets as u64);
    let kind = cursor.read_u8().map_err(|e| {
        EchoError::ResponseReadField("type", e.to_string())
    })?;

    let code = cursor.read_u8().map_err(|e| {
        EchoError::ResponseReadField("code", e.to_string())
    })?;

    let checksum = cursor.read_u16::<BigEndian>().map_err(|e| {
        EchoError::ResponseReadField("checksum", e.to_string())
    })?;

    let identifier = cursor.read_u16::<BigEndian>().map_err(|e| {
        EchoError::ResponseReadField("identifier", e.to_string())
    })?;

    let sequence = cursor.read_u16::<BigEndian>().map_err(|e| {
        EchoError::ResponseReadField("sequence", e.to_string())
    })?;

    let message = &(datagram[header_octets..]);
    let original = match kind {

        3 | 4 | 5 | 11 | 12 => decode_original(&(message[ICMP_HEADER_SIZE..])),
        _ => None,
    };

    Ok(DecodedReply {

        protocol: protocol,
        ttl: ttl,
        source: source,
        destination: destination,

        kind: kind,
        code: code,
        checksum: checksum,

        identifier: identifier,
        sequence: sequence,

        header_length: header_octets,
        length: datagram.len(),

        original: original,

        checksum_valid: verify(message),
    })
}

fn decode_original(quoted: &[u8]) -> Option<Original> {
    let mut cursor = Cursor::new(quoted);

    let header_octets = ((cursor.read_u8().ok()? & 0x0F) as usize) * 4;
    if header_octets < IP_HEADER_SIZE || quoted.len() < (header_octets + 8) {
        return None
    }

    cursor.set_position(9);
    let protocol = cursor.read_u8().ok()?;

    cursor.set_position(16);
    let destination = Ipv4Addr::from(cursor.read_u32::<BigEndian>().ok()?);

    cursor.set_position(header_octets as u64);
    let header = match protocol {

        IPPROTO_ICMP => {
            let kind = cursor.read_u8().ok()?;
            if kind != ICMP_ECHO_REQUEST {
                OriginalHeader::Other(protocol)
            }

            else {

                cursor.set_position((header_octets + 4) as u64);
                OriginalHeader::Echo {
                    identifier: cursor.read_u16::<BigEndian>().ok()?,
                    sequence: cursor.read_u16::<BigEndian>().ok()?,
                }
            }
        }

        IPPROTO_UDP => OriginalHeader::Udp {
            source_port: cursor.read_u16::<BigEndian>().ok()?,
            destination_port: cursor.read_u16::<BigEndian>().ok()?,
        },

        x => OriginalHeader::Other(x),
    };

    Some(Original {
        destination: destination,
        header: header,
    })
}

/// Synthetic datagrams for tests elsewhere in the crate.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn ip_header(protocol: u8, ttl: u8, source: Ipv4Addr, destination: Ipv4Addr, payload_length: usize) -> Vec<u8> {
        let total = (IP_HEADER_SIZE + payload_length) as u16;
        let mut header = vec![0x45, 0x00];
        header.extend_from_slice(&total.to_be_bytes());
        header.extend_from_slice(&[0x00, 0x00, 0x40, 0x00, ttl, protocol, 0x00, 0x00]);
        header.extend_from_slice(&source.octets());
        header.extend_from_slice(&destination.octets());

        let sum = checksum(&header);
        header[10..12].copy_from_slice(&sum.to_be_bytes());
        header
    }

    pub fn with_checksum(mut message: Vec<u8>) -> Vec<u8> {
        message[2] = 0;
        message[3] = 0;
        let sum = checksum(&message);
        message[2..4].copy_from_slice(&sum.to_be_bytes());
        message
    }

    pub fn echo_reply(source: Ipv4Addr, identifier: u16, sequence: u16, ttl: u8) -> Vec<u8> {
        let mut message = vec![ICMP_ECHO_REPLY, 0, 0, 0];
        message.extend_from_slice(&identifier.to_be_bytes());
        message.extend_from_slice(&sequence.to_be_bytes());
        let message = with_checksum(message);

        let mut datagram = ip_header(IPPROTO_ICMP, ttl, source, Ipv4Addr::new(10, 0, 0, 1), message.len());
        datagram.extend_from_slice(&message);
        datagram
    }

    /// ICMP error of `kind`/`code` from `router` quoting `original` sent towards `target`.
    pub fn icmp_error(router: Ipv4Addr, kind: u8, code: u8, target: Ipv4Addr, protocol: u8, original: &[u8]) -> Vec<u8> {
        let mut message = vec![kind, code, 0, 0, 0, 0, 0, 0];
        message.extend_from_slice(&ip_header(protocol, 1, Ipv4Addr::new(10, 0, 0, 1), target, original.len()));
        message.extend_from_slice(original);
        let message = with_checksum(message);

        let mut datagram = ip_header(IPPROTO_ICMP, 250, router, Ipv4Addr::new(10, 0, 0, 1), message.len());
        datagram.extend_from_slice(&message);
        datagram
    }
}
