use std::{

    io::{Write},
    net::{Ipv4Addr},
};

use tracing::{debug, info};

use super::{

    error::{EchoError},
    responses::{ReplyKind, TraceHop},
    session::{Probe},
    stop::{StopFlag},
};

/// Conventional hop ceiling, the same one most traceroute tools use.
pub const DEFAULT_MAX_HOPS: u8 = 30;

/// Hop budget of a traceroute run and the echo identifier its ICMP probes
/// carry.
#[derive(Clone, Debug)]
pub struct TraceOptions {
    pub max_hops: u8,
    pub identifier: u16,
}

impl Default for TraceOptions {
    fn default() -> TraceOptions {
        TraceOptions {
            max_hops: DEFAULT_MAX_HOPS,
            identifier: rand::random(),
        }
    }
}

/// `ttl: *` for a silent hop, `ttl: address (rtt ms)` otherwise.
pub fn format_hop(hop: &TraceHop) -> String {
    match (hop.responder, hop.round_trip_time_ms()) {

        (Some(responder), Some(rtt)) => {
            let marker = match hop.kind {

                Some(ReplyKind::Unreachable(code)) => code.marker(),
                _ => None,
            };

            match marker {

                Some(marker) => format!("{}: {} ({:.3} ms) {}", hop.ttl, responder, rtt, marker),
                None => format!("{}: {} ({:.3} ms)", hop.ttl, responder, rtt),
            }
        }

        _ => format!("{}: *", hop.ttl),
    }
}

pub struct TracerouteController {

    destination: Ipv4Addr,
    options: TraceOptions,
    stop: StopFlag,
}

impl TracerouteController {
    pub fn new(destination: Ipv4Addr, options: TraceOptions) -> TracerouteController {
        TracerouteController {

            destination: destination,
            options: options,
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopFlag) -> TracerouteController {
        self.stop = stop;
        self
    }

    /// Probe with ttl 1, 2, ... until the destination itself answers or
    /// `max_hops` is spent. One line is written per hop.
    pub fn run<P, W>(&self, prober: &mut P, out: &mut W) -> Result<Vec<TraceHop>, EchoError>
    where
        P: Probe + ?Sized,
        W: Write,
    {
        let TraceOptions { max_hops, identifier } = self.options.clone();

        info!(destination = %self.destination, max_hops, identifier, "Starting traceroute");

        let mut hops = Vec::with_capacity(max_hops as usize);

        for ttl in 1..=max_hops {

            if self.stop.is_raised() {
                debug!("Stop requested, ending traceroute");
                break
            }

            prober.set_ttl(ttl)?;

            let measurement = prober.probe(identifier, ttl as u16)?;
            let hop = TraceHop::from_measurement(ttl, &measurement);

            writeln!(out, "{}", format_hop(&hop)).map_err(|e| {
                EchoError::Output(e.to_string())
            })?;

            let arrived = hop.responder == Some(self.destination);
            hops.push(hop);

            if arrived {
                debug!(ttl, "Destination reached");
                break
            }
        }

        Ok(hops)
    }
}
