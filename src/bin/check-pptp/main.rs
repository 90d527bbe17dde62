//! Check that a PPTP server accepts a control connection

mod pptp;

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use structopt::StructOpt;
use tracing::{debug, info};

use vigil_plugins::args::CommonArgs;
use vigil_plugins::check::{CheckResult, MessageOptions};
use vigil_plugins::threshold::check_threshold;
use vigil_plugins::timeout::{self, timeout_message, Deadline};
use vigil_plugins::Status;

use crate::pptp::{decode_reply, start_control_connection_request, DecodeError, StartControlConnectionReply};

const SHORT_NAME: &str = "PPTP";
const VENDOR: &str = "vigil-plugins";

/// Check that a PPTP server accepts a control connection
///
/// Sends a Start-Control-Connection-Request and reports the server's reply.
/// The -w and -c ranges apply to the response time in seconds.
#[derive(StructOpt, Debug)]
#[structopt(
    name = "check-pptp (part of vigil-plugins)",
    raw(setting = "structopt::clap::AppSettings::ColoredHelp"),
    after_help = "Examples:

    Go critical if vpn.example.org takes more than 2 seconds to answer:

        check-pptp -H vpn.example.org -w 1 -c 2"
)]
struct Args {
    #[structopt(short = "H", long = "hostname", help = "PPTP server to connect to")]
    host: String,
    #[structopt(short = "p", long = "port", default_value = "1723", help = "TCP port")]
    port: u16,
    #[structopt(
        long = "client-name",
        default_value = "monitor",
        help = "Host name to announce in the request"
    )]
    client_name: String,
    #[structopt(flatten)]
    common: CommonArgs,
}

#[derive(Debug)]
enum PptpError {
    Resolve(String, io::Error),
    Connect(SocketAddr, io::Error),
    Exchange(io::Error),
    Decode(DecodeError),
    TimedOut,
}

impl PptpError {
    fn status(&self) -> Status {
        match *self {
            PptpError::Resolve(..) | PptpError::TimedOut => Status::Unknown,
            PptpError::Connect(..) | PptpError::Exchange(_) | PptpError::Decode(_) => Status::Critical,
        }
    }

    /// Socket timeouts mean the deadline ran out
    fn from_io(e: io::Error, wrap: impl FnOnce(io::Error) -> PptpError) -> PptpError {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => PptpError::TimedOut,
            _ => wrap(e),
        }
    }
}

impl fmt::Display for PptpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PptpError::Resolve(ref host, ref e) => write!(f, "unable to resolve {}: {}", host, e),
            PptpError::Connect(ref addr, ref e) => write!(f, "unable to connect to {}: {}", addr, e),
            PptpError::Exchange(ref e) => write!(f, "error talking to server: {}", e),
            PptpError::Decode(ref e) => write!(f, "unexpected reply: {}", e),
            PptpError::TimedOut => f.write_str("socket timed out"),
        }
    }
}

impl From<DecodeError> for PptpError {
    fn from(e: DecodeError) -> PptpError {
        PptpError::Decode(e)
    }
}

fn remaining(deadline: &Deadline) -> Result<Duration, PptpError> {
    deadline.remaining().ok_or(PptpError::TimedOut)
}

/// Try each address in turn until one accepts
///
/// The error is the last address's failure.
fn connect(addrs: &[SocketAddr], deadline: &Deadline) -> Result<(TcpStream, SocketAddr), PptpError> {
    let mut last_err = None;
    for addr in addrs {
        debug!(%addr, "connecting");
        match TcpStream::connect_timeout(addr, remaining(deadline)?) {
            Ok(stream) => return Ok((stream, *addr)),
            Err(e) => {
                debug!(%addr, "connect failed: {}", e);
                last_err = Some(PptpError::from_io(e, |e| PptpError::Connect(*addr, e)));
            }
        }
    }
    Err(last_err.unwrap_or(PptpError::TimedOut))
}

/// Connect, send the request, read and decode one reply
fn handshake(args: &Args, deadline: &Deadline) -> Result<StartControlConnectionReply, PptpError> {
    let addrs: Vec<SocketAddr> = (args.host.as_str(), args.port)
        .to_socket_addrs()
        .map_err(|e| PptpError::Resolve(args.host.clone(), e))?
        .collect();
    if addrs.is_empty() {
        return Err(PptpError::Resolve(
            args.host.clone(),
            io::Error::new(io::ErrorKind::NotFound, "no addresses"),
        ));
    }

    let (mut stream, addr) = connect(&addrs, deadline)?;
    debug!(%addr, "connected");
    stream
        .set_write_timeout(Some(remaining(deadline)?))
        .map_err(PptpError::Exchange)?;
    let request = start_control_connection_request(&args.client_name, VENDOR);
    stream
        .write_all(&request)
        .map_err(|e| PptpError::from_io(e, PptpError::Exchange))?;

    stream
        .set_read_timeout(Some(remaining(deadline)?))
        .map_err(PptpError::Exchange)?;
    let mut buf = Vec::with_capacity(pptp::MESSAGE_LEN);
    (&mut stream)
        .take(pptp::MESSAGE_LEN as u64)
        .read_to_end(&mut buf)
        .map_err(|e| PptpError::from_io(e, PptpError::Exchange))?;
    debug!(bytes = buf.len(), "read reply");

    Ok(decode_reply(&buf)?)
}

/// Turn a reply and how long it took into findings
fn evaluate(
    mut result: CheckResult,
    reply: &StartControlConnectionReply,
    elapsed: Duration,
    common: &CommonArgs,
) -> CheckResult {
    let thresholds = common.thresholds();
    if reply.is_success() {
        result.add_message(
            Status::Ok,
            format!(
                "server {} ({}) firmware {} protocol {}",
                display_name(&reply.hostname),
                display_name(&reply.vendor),
                reply.firmware_revision,
                reply.version()
            ),
        );
    } else {
        result.add_message(Status::Critical, format!("server refused control connection: {}", reply.failure_reason()));
    }

    let secs = elapsed.as_secs() as f64 + f64::from(elapsed.subsec_millis()) / 1000.0;
    let time_status = check_threshold(secs, &thresholds);
    if time_status != Status::Ok {
        result.add_message(time_status, format!("response time {:.3}s", secs));
    }
    result.add_elapsed(elapsed, &thresholds, Some(common.timeout()));
    result
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "unnamed"
    } else {
        name
    }
}

#[cfg_attr(test, allow(dead_code))]
fn main() {
    let args = Args::from_args();
    args.common.init_logging();
    let deadline = Deadline::new(args.common.timeout());
    let _watchdog = timeout::arm(SHORT_NAME, deadline.timeout());

    let result = CheckResult::new(SHORT_NAME);
    let reply = match handshake(&args, &deadline) {
        Ok(reply) => reply,
        Err(PptpError::TimedOut) => result.exit(Status::Unknown, timeout_message(deadline.timeout())),
        Err(e) => {
            info!("handshake failed: {}", e);
            let status = e.status();
            result.exit(status, e.to_string())
        }
    };

    let result = evaluate(result, &reply, deadline.elapsed(), &args.common);
    result.finish(&MessageOptions::join_all(", "))
}

#[cfg(test)]
mod unit {
    use super::*;

    use std::net::TcpListener;

    use crate::pptp::test::reply_bytes;

    fn build_args(argv: Vec<&str>) -> Args {
        Args::from_iter(argv.into_iter())
    }

    fn reply(result_code: u8, error_code: u8) -> StartControlConnectionReply {
        decode_reply(&reply_bytes(result_code, error_code, "vpn1", "Linux")).unwrap()
    }

    #[test]
    fn validate_argparse() {
        let args = build_args(vec!["check-pptp", "-H", "vpn1", "-w", "1", "-c", "5"]);
        assert_eq!(args.host, "vpn1");
        assert_eq!(args.port, 1723);
        assert_eq!(args.client_name, "monitor");
        assert!(args.common.warning.is_some());
    }

    #[test]
    fn success_is_ok() {
        let args = build_args(vec!["check-pptp", "-H", "vpn1", "-w", "1", "-c", "5"]);
        let report = evaluate(
            CheckResult::new(SHORT_NAME),
            &reply(1, 0),
            Duration::from_millis(20),
            &args.common,
        )
        .conclude(&MessageOptions::join_all(", "));
        assert_eq!(report.status(), Status::Ok);
        assert_eq!(
            report.to_string(),
            "PPTP OK server vpn1 (Linux) firmware 1281 protocol 1.0|time=0.02s;1;5;0;10"
        );
    }

    #[test]
    fn refusal_is_critical() {
        let args = build_args(vec!["check-pptp", "-H", "vpn1"]);
        let report = evaluate(
            CheckResult::new(SHORT_NAME),
            &reply(2, 6),
            Duration::from_millis(20),
            &args.common,
        )
        .conclude(&MessageOptions::join_all(", "));
        assert_eq!(report.status(), Status::Critical);
        assert!(report
            .message()
            .contains("general error: a generic vendor-specific error occurred in the PAC"));
    }

    #[test]
    fn slow_response_warns() {
        let args = build_args(vec!["check-pptp", "-H", "vpn1", "-w", "1", "-c", "5"]);
        let report = evaluate(
            CheckResult::new(SHORT_NAME),
            &reply(1, 0),
            Duration::from_millis(1500),
            &args.common,
        )
        .conclude(&MessageOptions::join_all(", "));
        assert_eq!(report.status(), Status::Warning);
        assert_eq!(
            report.message(),
            "response time 1.500s, server vpn1 (Linux) firmware 1281 protocol 1.0"
        );
    }

    #[test]
    fn connect_falls_through_to_a_listening_address() {
        let closed = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let open = listener.local_addr().unwrap();

        let deadline = Deadline::new(Duration::from_secs(5));
        let (_stream, addr) = connect(&[closed, open], &deadline).unwrap();
        assert_eq!(addr, open);
    }

    #[test]
    fn connect_reports_the_last_failure() {
        let closed: Vec<SocketAddr> = (0..2)
            .map(|_| TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap())
            .collect();
        let deadline = Deadline::new(Duration::from_secs(5));
        match connect(&closed, &deadline) {
            Err(PptpError::Connect(addr, _)) => assert_eq!(addr, closed[1]),
            other => panic!("unexpected {:?}", other.map(|(_, addr)| addr)),
        }
    }

    #[test]
    fn error_statuses() {
        let io_err = || io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            PptpError::Connect("127.0.0.1:1723".parse().unwrap(), io_err()).status(),
            Status::Critical
        );
        assert_eq!(PptpError::Decode(DecodeError::Short { got: 3 }).status(), Status::Critical);
        assert_eq!(PptpError::TimedOut.status(), Status::Unknown);
        assert_eq!(PptpError::Resolve("nope".into(), io_err()).status(), Status::Unknown);
        match PptpError::from_io(io::Error::new(io::ErrorKind::WouldBlock, "x"), PptpError::Exchange) {
            PptpError::TimedOut => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}
