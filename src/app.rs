//! Maps each command onto the component that runs it.

use std::io::{self, Write};

use tracing::{info};

use super::{

    cli::{Command, PingArgs, ProxyArgs, TraceArgs, WebArgs},
    error::{EchoError},
    http::{proxy, server},
    ping::{PingController, PingOptions},
    resolve::{resolve_ipv4},
    session::{ProbeSession, SessionOptions},
    stop::{StopFlag},
    traceroute::{TraceOptions, TracerouteController},
};

/// Run `command` to completion, or until `stop` is raised.
pub fn execute(command: &Command, stop: &StopFlag) -> Result<(), EchoError> {
    match command {

        Command::Ping(args) => ping(args, stop),
        Command::Traceroute(args) => traceroute(args, stop),
        Command::Web(args) => serve_files(args, stop),
        Command::Proxy(args) => serve_proxy(args, stop),
    }
}

fn ping(args: &PingArgs, stop: &StopFlag) -> Result<(), EchoError> {
    let destination = resolve_ipv4(&(args.hostname))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Ping to: {} ({})...", args.hostname, destination).map_err(|e| {
        EchoError::Output(e.to_string())
    })?;

    let mut session = ProbeSession::open(destination, SessionOptions::from(args))?;
    let controller = PingController::new(destination, PingOptions::from(args))
        .with_stop(stop.clone());

    let statistics = controller.run(&mut session, &mut out)?;
    session.close();

    info!(sent = statistics.sent, received = statistics.received, "Ping finished");
    Ok(())
}

fn traceroute(args: &TraceArgs, stop: &StopFlag) -> Result<(), EchoError> {
    let destination = resolve_ipv4(&(args.hostname))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Traceroute to: {} ({}), {} hops max, {}...", &(args.hostname), {
        destination
    }, args.max_hops, args.protocol).map_err(|e| {
        EchoError::Output(e.to_string())
    })?;

    let mut session = ProbeSession::open(destination, SessionOptions::from(args))?;
    let controller = TracerouteController::new(destination, TraceOptions::from(args))
        .with_stop(stop.clone());

    let hops = controller.run(&mut session, &mut out)?;
    session.close();

    info!(hops = hops.len(), "Traceroute finished");
    Ok(())
}

fn serve_files(args: &WebArgs, stop: &StopFlag) -> Result<(), EchoError> {
    println!("Web Server starting on port: {}...", args.port);
    server::run(args.port, &(args.root), stop)
}

fn serve_proxy(args: &ProxyArgs, stop: &StopFlag) -> Result<(), EchoError> {
    println!("Web Proxy starting on port: {}...", args.port);
    proxy::run(args.port, stop)
}
