use std::{

    path::{PathBuf},
    time::{Duration},
};

use clap::{

    Subcommand,
    ArgAction,
    Parser,
    Args,
};

use super::{

    config::{ProbeProtocol},
};

/// Raw socket ping and traceroute, plus a tiny web server and proxy
#[derive(Parser, Debug, Clone)]
#[command(name = "echotrace")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbose logging on stderr (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Send ICMP echo requests to a host
    #[command(visible_alias = "p")]
    Ping(PingArgs),

    /// Print the route packets take to a host
    #[command(visible_alias = "t")]
    Traceroute(TraceArgs),

    /// Serve files from a directory over HTTP
    #[command(visible_alias = "w")]
    Web(WebArgs),

    /// Run an HTTP forwarding proxy
    #[command(visible_alias = "x")]
    Proxy(ProxyArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "ping",
            Command::Traceroute(_) => "traceroute",
            Command::Web(_) => "web",
            Command::Proxy(_) => "proxy",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PingArgs {
    /// Host to ping (IP address or hostname)
    pub hostname: String,

    /// Number of echo requests to send (0 = until interrupted)
    #[arg(short = 'c', long = "count", default_value = "10")]
    pub count: u32,

    /// Seconds to wait for each reply
    #[arg(short = 't', long = "timeout", default_value = "2")]
    pub timeout: f64,

    /// Seconds between requests
    #[arg(short = 'i', long = "interval", default_value = "1")]
    pub interval: f64,

    /// Time to live of outgoing requests
    #[arg(long = "ttl", default_value = "64")]
    pub ttl: u8,

    /// Payload bytes after the ICMP header
    #[arg(short = 's', long = "size", default_value = "0")]
    pub size: usize,

    /// Drop replies with an invalid ICMP checksum
    #[arg(long = "strict-checksum")]
    pub strict_checksum: bool,
}

#[derive(Args, Debug, Clone)]
pub struct TraceArgs {
    /// Host to trace (IP address or hostname)
    pub hostname: String,

    /// Seconds to wait for each hop
    #[arg(short = 't', long = "timeout", default_value = "2")]
    pub timeout: f64,

    /// Probe protocol (icmp, udp)
    #[arg(short = 'p', long = "protocol", default_value = "icmp")]
    pub protocol: ProbeProtocol,

    /// Maximum TTL (hops)
    #[arg(short = 'm', long = "max-hops", default_value = "30")]
    pub max_hops: u8,

    /// Base destination port for UDP probes
    #[arg(long = "port", default_value = "33434")]
    pub port: u16,

    /// Payload bytes per probe
    #[arg(short = 's', long = "size", default_value = "0")]
    pub size: usize,

    /// Drop replies with an invalid ICMP checksum
    #[arg(long = "strict-checksum")]
    pub strict_checksum: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WebArgs {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value = "8080")]
    pub port: u16,

    /// Directory to serve files from
    #[arg(short = 'r', long = "root", default_value = ".")]
    pub root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value = "8000")]
    pub port: u16,
}

/// Largest payload that still fits a single IPv4 datagram.
const MAX_PAYLOAD: usize = 65_507 - 8;

/// Upper bound for `--timeout` and `--interval`, in seconds.
const MAX_WAIT_SECONDS: f64 = 3600.0;

impl PingArgs {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }
}

impl TraceArgs {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }
}

impl Cli {
    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Ping(args) => {
                validate_seconds("Timeout", args.timeout)?;
                validate_seconds("Interval", args.interval)?;

                if args.ttl == 0 {
                    return Err("TTL must be at least 1".to_string())
                }

                validate_size(args.size)
            }

            Command::Traceroute(args) => {
                validate_seconds("Timeout", args.timeout)?;

                if args.max_hops == 0 {
                    return Err("Max hops must be at least 1".to_string())
                }

                validate_size(args.size)
            }

            Command::Web(_) | Command::Proxy(_) => Ok(()),
        }
    }
}

fn validate_seconds(name: &str, seconds: f64) -> Result<(), String> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("{} must be positive", name))
    }

    if seconds > MAX_WAIT_SECONDS {
        return Err(format!("{} cannot exceed {} seconds", name, MAX_WAIT_SECONDS))
    }

    Ok(())
}

fn validate_size(size: usize) -> Result<(), String> {
    if size > MAX_PAYLOAD {
        return Err(format!("Payload size cannot exceed {}", MAX_PAYLOAD))
    }

    Ok(())
}
