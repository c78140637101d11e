//! Echotrace measures reachability and latency with raw ICMP echo requests,
//! and walks the route to a host by raising the time to live one hop at a time.
//!
//! ## Example
//! ```rust,no_run
//! use echotrace::{
//!     error::{EchoError},
//!     PingController,
//!     SessionOptions,
//!     ProbeSession,
//!     PingOptions,
//! };
//!
//! fn main() -> Result<(), EchoError> {
//!     let destination = echotrace::resolve_ipv4("one.one.one.one")?;
//!     let mut session = ProbeSession::open(destination, SessionOptions::default())?;
//!
//!     let statistics = PingController::new(destination, PingOptions::default())
//!         .run(&mut session, &mut std::io::stdout())?;
//!
//!     println!("{:?}", statistics);
//!     Ok(())
//! }
//! ```

mod traceroute;
mod responses;
mod checksum;
mod packets;
mod session;
mod resolve;
mod ping;
mod stop;

pub mod config;
pub mod error;
pub mod http;
pub mod app;
pub mod cli;

pub use checksum::{checksum, verify};
pub use resolve::{resolve_ipv4};
pub use stop::{StopFlag};

pub use packets::{

    encode_echo_request_with_payload,
    encode_echo_request,
    encode_udp_payload,
    decode_reply,

    OriginalHeader,
    DecodedReply,
    Original,

    ICMP_HEADER_SIZE,
    MIN_REPLY_SIZE,
    IP_HEADER_SIZE,
};

pub use responses::{

    UnreachableCode,
    Measurement,
    ReplyKind,
    TraceHop,
};

pub use session::{

    SessionOptions,
    SessionState,
    ProbeSession,
    Probe,
};

pub use ping::{

    PingStatistics,
    PingController,
    PingOptions,
    format_reply,
};

pub use traceroute::{

    TracerouteController,
    DEFAULT_MAX_HOPS,
    TraceOptions,
    format_hop,
};
