use std::{

    net::{Ipv4Addr},

    time::{
        Duration,
        Instant,
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnreachableCode {
    CommunicationAdministrativelyProhibited,
    NetworkAdministrativelyProhibited,
    HostAdministrativelyProhibited,
    DestinationProtocolUnreachable,
    DestinationNetworkUnreachable,
    DestinationHostUnreachable,
    DestinationPortUnreachable,
    DestinationNetworkUnknown,
    HostPrecedenceViolation,
    DestinationHostUnknown,
    FragmentationRequired,
    SourceHostIsolated,
    NetworkUnreachable,
    SourceRouteFailed,
    PrecedenceCutoff,
    HostUnreachable,
    Unexpected(u8),
}

impl UnreachableCode {
    pub fn from_code(code: u8) -> UnreachableCode {
        match code {

            0 => Self::DestinationNetworkUnreachable,
            1 => Self::DestinationHostUnreachable,
            2 => Self::DestinationProtocolUnreachable,
            3 => Self::DestinationPortUnreachable,
            4 => Self::FragmentationRequired,
            5 => Self::SourceRouteFailed,
            6 => Self::DestinationNetworkUnknown,
            7 => Self::DestinationHostUnknown,
            8 => Self::SourceHostIsolated,
            9 => Self::NetworkAdministrativelyProhibited,
            10 => Self::HostAdministrativelyProhibited,
            11 => Self::NetworkUnreachable,
            12 => Self::HostUnreachable,
            13 => Self::CommunicationAdministrativelyProhibited,
            14 => Self::HostPrecedenceViolation,
            15 => Self::PrecedenceCutoff,
            x => Self::Unexpected(x),
        }
    }

    /// Traceroute style annotation, port unreachable is the expected answer
    /// of a UDP probe and carries none.
    pub fn marker(&self) -> Option<String> {
        match self {

            Self::DestinationPortUnreachable => None,

            Self::DestinationNetworkUnreachable
            | Self::DestinationNetworkUnknown
            | Self::NetworkUnreachable => Some("!N".to_string()),

            Self::DestinationHostUnreachable
            | Self::DestinationHostUnknown
            | Self::HostUnreachable
            | Self::SourceHostIsolated => Some("!H".to_string()),

            Self::DestinationProtocolUnreachable => Some("!P".to_string()),
            Self::FragmentationRequired => Some("!F".to_string()),
            Self::SourceRouteFailed => Some("!S".to_string()),

            Self::CommunicationAdministrativelyProhibited
            | Self::NetworkAdministrativelyProhibited
            | Self::HostAdministrativelyProhibited => Some("!X".to_string()),

            Self::HostPrecedenceViolation => Some("!V".to_string()),
            Self::PrecedenceCutoff => Some("!C".to_string()),
            Self::Unexpected(x) => Some(format!("!<{}>", x)),
        }
    }

    pub fn description(&self) -> String {
        match self {

            Self::DestinationNetworkUnreachable => "Destination Net Unreachable".to_string(),
            Self::DestinationHostUnreachable => "Destination Host Unreachable".to_string(),
            Self::DestinationProtocolUnreachable => "Destination Protocol Unreachable".to_string(),
            Self::DestinationPortUnreachable => "Destination Port Unreachable".to_string(),
            Self::FragmentationRequired => "Frag needed and DF set".to_string(),
            Self::SourceRouteFailed => "Source Route Failed".to_string(),
            Self::DestinationNetworkUnknown => "Destination Net Unknown".to_string(),
            Self::DestinationHostUnknown => "Destination Host Unknown".to_string(),
            Self::SourceHostIsolated => "Source Host Isolated".to_string(),
            Self::NetworkAdministrativelyProhibited => "Destination Net Prohibited".to_string(),
            Self::HostAdministrativelyProhibited => "Destination Host Prohibited".to_string(),
            Self::NetworkUnreachable => "Destination Net Unreachable for Type of Service".to_string(),
            Self::HostUnreachable => "Destination Host Unreachable for Type of Service".to_string(),
            Self::CommunicationAdministrativelyProhibited => "Packet filtered".to_string(),
            Self::HostPrecedenceViolation => "Precedence Violation".to_string(),
            Self::PrecedenceCutoff => "Precedence Cutoff".to_string(),
            Self::Unexpected(x) => format!("Destination Unreachable, Bad Code: {}", x),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    EchoReply,
    Exceeded,
    Unreachable(UnreachableCode),
    Other(u8, u8),
}

impl ReplyKind {
    pub fn from_type_code(kind: u8, code: u8) -> ReplyKind {
        match kind {

            0 => Self::EchoReply,
            3 => Self::Unreachable(UnreachableCode::from_code(code)),
            11 => Self::Exceeded,
            x => Self::Other(x, code),
        }
    }

    /// Ping style wording of the message.
    pub fn description(&self) -> String {
        match self {

            Self::EchoReply => "Echo Reply".to_string(),
            Self::Exceeded => "Time to live exceeded".to_string(),
            Self::Unreachable(code) => code.description(),
            Self::Other(kind, code) => format!("Unexpected ICMP type {} code {}", kind, code),
        }
    }
}

/// Outcome of a single probe. Every `Option` is `None` when the probe
/// timed out.
#[derive(Clone, Debug)]
pub struct Measurement {
    pub sequence: u16,
    pub sent_at: Instant,
    pub received_at: Option<Instant>,
    pub elapsed: Option<Duration>,
    pub ttl: Option<u8>,
    pub responder: Option<Ipv4Addr>,
    pub bytes: usize,
    pub kind: Option<ReplyKind>,
}

impl Measurement {

    /// A probe that saw no attributable reply before its deadline.
    pub fn lacking(sequence: u16, sent_at: Instant) -> Measurement {
        Measurement {

            sequence: sequence,
            sent_at: sent_at,

            received_at: None,
            elapsed: None,
            ttl: None,
            responder: None,
            bytes: 0,
            kind: None,
        }
    }

    pub fn is_lacking(&self) -> bool {
        self.received_at.is_none()
    }

    /// Answered by the destination itself rather than by an error message.
    pub fn is_echo_reply(&self) -> bool {
        self.kind == Some(ReplyKind::EchoReply)
    }

    pub fn round_trip_time_ms(&self) -> Option<f64> {
        self.elapsed.map(duration_ms)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceHop {
    pub ttl: u8,
    pub responder: Option<Ipv4Addr>,
    pub elapsed: Option<Duration>,
    pub kind: Option<ReplyKind>,
}

impl TraceHop {
    pub fn from_measurement(ttl: u8, measurement: &Measurement) -> TraceHop {
        TraceHop {

            ttl: ttl,

            responder: measurement.responder,
            elapsed: measurement.elapsed,
            kind: measurement.kind,
        }
    }

    pub fn round_trip_time_ms(&self) -> Option<f64> {
        self.elapsed.map(duration_ms)
    }
}

pub(crate) fn duration_ms(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}
