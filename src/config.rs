use std::{

    fmt::{
        Result as FmtResult,
        Formatter,
        Display,
    },

    str::{FromStr},
};

use super::{

    cli::{PingArgs, TraceArgs},
    ping::{PingOptions},
    session::{SessionOptions},
    traceroute::{TraceOptions},
};

/// Transport used by traceroute probes. Ping always uses ICMP.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProbeProtocol {
    #[default]
    Icmp,
    Udp,
}

impl FromStr for ProbeProtocol {
    type Err = String;

    fn from_str(value: &str) -> Result<ProbeProtocol, String> {
        match value.to_lowercase().as_str() {

            "icmp" => Ok(Self::Icmp),
            "udp" => Ok(Self::Udp),
            other => Err(format!("Unknown protocol: {}. Use icmp or udp", other)),
        }
    }
}

impl Display for ProbeProtocol {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {

            Self::Icmp => write!(fmt, "icmp"),
            Self::Udp => write!(fmt, "udp"),
        }
    }
}

impl From<&PingArgs> for SessionOptions {
    fn from(args: &PingArgs) -> SessionOptions {
        SessionOptions {

            protocol: ProbeProtocol::Icmp,
            ttl: args.ttl as u32,
            timeout: args.timeout_duration(),
            payload_size: args.size,
            strict_checksum: args.strict_checksum,

            ..Default::default()
        }
    }
}

impl From<&PingArgs> for PingOptions {
    fn from(args: &PingArgs) -> PingOptions {
        PingOptions {

            count: args.count,
            interval: args.interval_duration(),

            ..Default::default()
        }
    }
}

impl From<&TraceArgs> for SessionOptions {
    fn from(args: &TraceArgs) -> SessionOptions {
        SessionOptions {

            protocol: args.protocol,
            ttl: 1,
            timeout: args.timeout_duration(),
            payload_size: args.size,
            port: args.port,
            strict_checksum: args.strict_checksum,
        }
    }
}

impl From<&TraceArgs> for TraceOptions {
    fn from(args: &TraceArgs) -> TraceOptions {
        TraceOptions {

            max_hops: args.max_hops,

            ..Default::default()
        }
    }
}
