use std::{

    io::{Write},
    net::{Ipv4Addr},
    thread,

    fmt::{
        Result as FmtResult,
        Formatter,
        Display,
    },

    time::{Duration},
};

use tracing::{debug, info};

use super::{

    error::{EchoError},
    responses::{Measurement, ReplyKind},
    session::{Probe},
    stop::{StopFlag},
};

/// How many echo requests a ping run sends, how far apart, and under which
/// identifier.
#[derive(Clone, Debug)]
pub struct PingOptions {

    /// Probes to send, zero keeps going until stopped.
    pub count: u32,
    pub interval: Duration,

    /// Echo identifier used for the whole run.
    pub identifier: u16,
}

impl Default for PingOptions {
    fn default() -> PingOptions {
        PingOptions {

            count: 10,
            interval: {

                Duration::from_millis(1000)
            },

            identifier: rand::random(),
        }
    }
}

/// Running totals of a ping run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PingStatistics {
    pub sent: u32,
    pub received: u32,

    rtt_min: Option<f64>,
    rtt_max: Option<f64>,
    rtt_total: f64,
}

impl PingStatistics {
    pub fn new() -> PingStatistics {
        Default::default()
    }

    /// Only echo replies count as received, error messages about the
    /// request count as lost.
    pub fn record(&mut self, measurement: &Measurement) {
        self.sent += 1;

        if !measurement.is_echo_reply() {
            return
        }

        if let Some(rtt) = measurement.round_trip_time_ms() {
            self.received += 1;
            self.rtt_total += rtt;

            self.rtt_min = Some(self.rtt_min.map_or(rtt, |min| min.min(rtt)));
            self.rtt_max = Some(self.rtt_max.map_or(rtt, |max| max.max(rtt)));
        }
    }

    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0
        }

        100.0 * (1.0 - (self.received as f64 / self.sent as f64))
    }

    pub fn rtt_min(&self) -> Option<f64> {
        self.rtt_min
    }

    pub fn rtt_max(&self) -> Option<f64> {
        self.rtt_max
    }

    pub fn rtt_avg(&self) -> Option<f64> {
        match self.received {

            0 => None,
            n => Some(self.rtt_total / n as f64),
        }
    }
}

impl Display for PingStatistics {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} packets transmitted, {} received, {:.2}% packet loss", {
            self.sent
        }, self.received, self.loss_percent())?;

        if let (Some(min), Some(avg), Some(max)) = (self.rtt_min(), self.rtt_avg(), self.rtt_max()) {
            write!(fmt, "\nrtt min/avg/max = {:.3}/{:.3}/{:.3} ms", min, avg, max)?;
        }

        Ok(())
    }
}

/// Line printed for an answered probe.
pub fn format_reply(measurement: &Measurement) -> Option<String> {
    match (measurement.kind, measurement.responder, measurement.ttl, measurement.round_trip_time_ms()) {

        (Some(ReplyKind::EchoReply), Some(responder), Some(ttl), Some(rtt)) => Some(format!("{} bytes from {}: icmp_seq={} ttl={} time={:.3} ms", {
            measurement.bytes
        }, responder, measurement.sequence, ttl, rtt)),

        (Some(kind), Some(responder), _, _) => Some(format!("From {} icmp_seq={} {}", {
            responder
        }, measurement.sequence, kind.description())),

        _ => None,
    }
}

pub struct PingController {

    destination: Ipv4Addr,
    options: PingOptions,
    stop: StopFlag,
}

impl PingController {
    pub fn new(destination: Ipv4Addr, options: PingOptions) -> PingController {
        PingController {

            destination: destination,
            options: options,
            stop: StopFlag::new(),
        }
    }

    pub fn with_stop(mut self, stop: StopFlag) -> PingController {
        self.stop = stop;
        self
    }

    /// Probe the destination `count` times, writing one line per reply and
    /// the statistics at the end.
    pub fn run<P, W>(&self, prober: &mut P, out: &mut W) -> Result<PingStatistics, EchoError>
    where
        P: Probe + ?Sized,
        W: Write,
    {
        let PingOptions { count, interval, identifier } = self.options.clone();

        info!(destination = %self.destination, count, identifier, "Starting ping");

        let mut statistics = PingStatistics::new();
        let mut sequence: u16 = 0;
        let mut issued: u32 = 0;

        while count == 0 || issued < count {

            if self.stop.is_raised() {
                debug!("Stop requested, ending ping run");
                break
            }

            let measurement = prober.probe(identifier, sequence)?;
            statistics.record(&measurement);

            if let Some(line) = format_reply(&measurement) {
                writeln!(out, "{}", line).map_err(|e| {
                    EchoError::Output(e.to_string())
                })?;
            }

            issued += 1;
            sequence = sequence.wrapping_add(1);

            if count == 0 || issued < count {
                thread::sleep(interval);
            }
        }

        writeln!(out, "--- {} ping statistics ---\n{}", self.destination, statistics).map_err(|e| {
            EchoError::Output(e.to_string())
        })?;

        Ok(statistics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Instant};

    fn answered(sequence: u16, millis: u64) -> Measurement {
        let sent_at = Instant::now();
        let elapsed = Duration::from_millis(millis);

        Measurement {
            sequence: sequence,
            sent_at: sent_at,
            received_at: Some(sent_at + elapsed),
            elapsed: Some(elapsed),
            ttl: Some(57),
            responder: Some(Ipv4Addr::new(192, 0, 2, 1)),
            bytes: 8,
            kind: Some(ReplyKind::EchoReply),
        }
    }

    fn exceeded(sequence: u16) -> Measurement {
        Measurement {
            responder: Some(Ipv4Addr::new(10, 9, 8, 7)),
            bytes: 36,
            kind: Some(ReplyKind::Exceeded),
            ..answered(sequence, 3)
        }
    }

    #[test]
    fn test_statistics_mixed_outcomes() {
        let mut statistics = PingStatistics::new();
        statistics.record(&answered(0, 10));
        statistics.record(&Measurement::lacking(1, Instant::now()));
        statistics.record(&answered(2, 15));

        assert_eq!(statistics.sent, 3);
        assert_eq!(statistics.received, 2);
        assert_eq!(statistics.rtt_min(), Some(10.0));
        assert_eq!(statistics.rtt_avg(), Some(12.5));
        assert_eq!(statistics.rtt_max(), Some(15.0));
        assert_eq!(format!("{:.2}", statistics.loss_percent()), "33.33");
    }

    #[test]
    fn test_statistics_without_replies() {
        let mut statistics = PingStatistics::new();
        statistics.record(&Measurement::lacking(0, Instant::now()));
        statistics.record(&Measurement::lacking(1, Instant::now()));

        assert_eq!(statistics.loss_percent(), 100.0);
        assert_eq!(statistics.rtt_avg(), None);
        assert_eq!(statistics.to_string(), "2 packets transmitted, 0 received, 100.00% packet loss");
    }

    #[test]
    fn test_statistics_count_error_messages_as_lost() {
        let mut statistics = PingStatistics::new();
        statistics.record(&exceeded(0));
        statistics.record(&answered(1, 20));

        assert_eq!(statistics.sent, 2);
        assert_eq!(statistics.received, 1);
        assert_eq!(statistics.rtt_min(), Some(20.0));
        assert_eq!(statistics.rtt_max(), Some(20.0));
    }

    #[test]
    fn test_statistics_empty() {
        assert_eq!(PingStatistics::new().loss_percent(), 0.0);
    }

    #[test]
    fn test_format_reply() {
        assert_eq!(format_reply(&answered(4, 12)).as_deref(), {
            Some("8 bytes from 192.0.2.1: icmp_seq=4 ttl=57 time=12.000 ms")
        });

        assert_eq!(format_reply(&exceeded(5)).as_deref(), {
            Some("From 10.9.8.7 icmp_seq=5 Time to live exceeded")
        });

        assert_eq!(format_reply(&Measurement::lacking(4, Instant::now())), None);
    }
}
