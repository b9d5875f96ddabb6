//! In-process fake ADB server for unit tests.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use super::connection::{decode_length, encode_message};
use super::device::Endpoint;

type ShellHandler = dyn Fn(Option<&str>, &str) -> Option<String> + Send + Sync;
type HangupHandler = dyn Fn(&str) + Send + Sync;

/// Speaks enough of the host protocol for `host:devices`, transport
/// selection and `shell:`. Each connection is served on its own thread.
pub(crate) struct FakeAdbServer {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeAdbServer {
    /// Shell lines are answered with `handler(serial, line)` and the stream
    /// is closed afterwards.
    pub(crate) fn start<F>(devices: &[&str], handler: F) -> Self
    where
        F: Fn(Option<&str>, &str) -> String + Send + Sync + 'static,
    {
        Self::spawn(
            devices,
            Arc::new(move |serial, line| Some(handler(serial, line))),
            Arc::new(|_| {}),
        )
    }

    /// Shell lines never produce output; the stream stays open until the
    /// client closes it.
    pub(crate) fn start_blocking(devices: &[&str]) -> Self {
        Self::spawn(devices, Arc::new(|_, _| None), Arc::new(|_| {}))
    }

    /// Like [`Self::start`], but a `None` reply keeps the stream open like
    /// a long-running command, and `hangup(line)` runs once the client
    /// closes it.
    pub(crate) fn start_with_hangup<F, H>(devices: &[&str], handler: F, hangup: H) -> Self
    where
        F: Fn(Option<&str>, &str) -> Option<String> + Send + Sync + 'static,
        H: Fn(&str) + Send + Sync + 'static,
    {
        Self::spawn(devices, Arc::new(handler), Arc::new(hangup))
    }

    fn spawn(devices: &[&str], handler: Arc<ShellHandler>, hangup: Arc<HangupHandler>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let devices: Arc<Vec<String>> = Arc::new(devices.iter().map(|d| (*d).to_string()).collect());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let devices = Arc::clone(&devices);
                let handler = Arc::clone(&handler);
                let hangup = Arc::clone(&hangup);
                let log = Arc::clone(&log);
                thread::spawn(move || serve(stream, &devices, handler.as_ref(), hangup.as_ref(), &log));
            }
        });

        Self { port, requests }
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    /// Every request string received so far, in arrival order.
    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: TcpStream,
    devices: &[String],
    handler: &ShellHandler,
    hangup: &HangupHandler,
    log: &Mutex<Vec<String>>,
) {
    let mut selected: Option<String> = None;
    loop {
        let Some(request) = read_request(&mut stream) else { return };
        log.lock().unwrap().push(request.clone());

        if request == "host:devices" {
            let listing: String = devices.iter().map(|d| format!("{d}\tdevice\n")).collect();
            let _ = stream.write_all(b"OKAY");
            let _ = stream.write_all(&encode_message(&listing).unwrap());
            return;
        } else if request == "host:transport-any" {
            selected = None;
            let _ = stream.write_all(b"OKAY");
        } else if let Some(serial) = request.strip_prefix("host:transport:") {
            if !devices.iter().any(|d| d == serial) {
                fail(&mut stream, &format!("device '{serial}' not found"));
                return;
            }
            selected = Some(serial.to_string());
            let _ = stream.write_all(b"OKAY");
        } else if let Some(line) = request.strip_prefix("shell:") {
            let _ = stream.write_all(b"OKAY");
            match handler(selected.as_deref(), line) {
                Some(output) => {
                    let _ = stream.write_all(output.as_bytes());
                }
                None => {
                    let mut sink = Vec::new();
                    let _ = stream.read_to_end(&mut sink);
                    hangup(line);
                }
            }
            return;
        } else {
            fail(&mut stream, &format!("unknown request {request}"));
            return;
        }
    }
}

fn fail(stream: &mut TcpStream, reason: &str) {
    let _ = stream.write_all(b"FAIL");
    let _ = stream.write_all(&encode_message(reason).unwrap());
}

fn read_request(stream: &mut TcpStream) -> Option<String> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).ok()?;
    let length = decode_length(header).ok()?;
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).ok()?;
    String::from_utf8(body).ok()
}
