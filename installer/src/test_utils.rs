//! Shared test utilities for the installer crate.

use crate::exec::CommandExecutor;
use crate::placement::{Filesystem, LocalFilesystem};
use crate::transport::{Retrieval, Transport, TransportError};
use camino::Utf8Path;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::process::{ExitStatus, Output};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "sudo").
    pub cmd: String,
    /// The arguments to pass to the command.
    pub args: Vec<String>,
    /// The result to return when this command is invoked.
    pub result: io::Result<Output>,
}

impl ExpectedCall {
    /// Expect `cmd` with `args`, answering with a successful exit.
    #[must_use]
    pub fn new(cmd: &str, args: &[&str]) -> Self {
        Self {
            cmd: cmd.to_owned(),
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            result: Ok(success_output()),
        }
    }

    /// Expect `sudo` followed by `args`.
    #[must_use]
    pub fn sudo(args: &[&str]) -> Self {
        Self::new("sudo", args)
    }

    /// Replace the result returned for this call.
    #[must_use]
    pub fn returning(mut self, result: io::Result<Output>) -> Self {
        self.result = result;
        self
    }
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects. An
/// unexpected or mismatched invocation panics.
#[derive(Debug)]
pub struct StubExecutor {
    expected: RefCell<VecDeque<ExpectedCall>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: RefCell::new(expected.into()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        let remaining = self.expected.borrow();
        assert!(
            remaining.is_empty(),
            "expected no further command invocations, {} left: {:?}",
            remaining.len(),
            remaining.front().map(|call| (&call.cmd, &call.args))
        );
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        let Some(call) = self.expected.borrow_mut().pop_front() else {
            panic!("unexpected command invocation: {cmd} {args:?}");
        };

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args, args);

        call.result
    }
}

/// A `Transport` that answers every fetch with a canned response.
#[derive(Debug)]
pub struct StubTransport {
    answer: Result<(u16, Vec<u8>), String>,
    urls: RefCell<Vec<String>>,
}

impl StubTransport {
    /// Respond with `status` and `body`.
    #[must_use]
    pub fn new(status: u16, body: &[u8]) -> Self {
        Self {
            answer: Ok((status, body.to_vec())),
            urls: RefCell::new(Vec::new()),
        }
    }

    /// Fail every fetch as if the retry budget were spent.
    #[must_use]
    pub fn unreachable(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_owned()),
            urls: RefCell::new(Vec::new()),
        }
    }

    /// URLs requested so far, in order.
    #[must_use]
    pub fn requested(&self) -> Vec<String> {
        self.urls.borrow().clone()
    }
}

impl Transport for StubTransport {
    fn fetch(&self, url: &str) -> Result<Retrieval, TransportError> {
        self.urls.borrow_mut().push(url.to_owned());
        match &self.answer {
            Ok((status, body)) => Ok(Retrieval::new(*status, io::Cursor::new(body.clone()))),
            Err(reason) => Err(TransportError::Exhausted {
                url: url.to_owned(),
                attempts: 1,
                reason: reason.clone(),
            }),
        }
    }
}

/// A `Filesystem` that behaves as if every directory were its own device.
///
/// Renames between different parent directories fail with
/// [`ErrorKind::CrossesDevices`]; everything else hits the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossDeviceFilesystem;

impl Filesystem for CrossDeviceFilesystem {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        if from.parent() == to.parent() {
            LocalFilesystem.rename(from, to)
        } else {
            Err(io::Error::from(ErrorKind::CrossesDevices))
        }
    }

    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<u64> {
        LocalFilesystem.copy(from, to)
    }

    fn remove_file(&self, path: &Utf8Path) -> io::Result<()> {
        LocalFilesystem.remove_file(path)
    }

    fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
        LocalFilesystem.create_dir_all(path)
    }

    fn set_executable(&self, path: &Utf8Path) -> io::Result<()> {
        LocalFilesystem.set_executable(path)
    }
}

/// Minimal HTTP server on a loopback port that answers every request alike.
#[derive(Debug)]
pub struct LoopbackServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    served: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl LoopbackServer {
    /// Start serving `status` with `body` on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if no loopback port can be bound.
    #[must_use]
    pub fn serve(status: u16, body: &[u8]) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .unwrap_or_else(|e| panic!("bind loopback listener: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("loopback listener address: {e}"));
        let stop = Arc::new(AtomicBool::new(false));
        let served = Arc::new(AtomicUsize::new(0));
        let response = render_response(status, body);

        let handle = thread::spawn({
            let stop = Arc::clone(&stop);
            let served = Arc::clone(&served);
            move || {
                for stream in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(mut stream) = stream else { continue };
                    if read_request_head(&stream) {
                        served.fetch_add(1, Ordering::SeqCst);
                        if let Err(e) = stream.write_all(&response) {
                            log::debug!("loopback response not delivered: {e}");
                        }
                    }
                }
            }
        });

        Self {
            addr,
            stop,
            served,
            handle: Some(handle),
        }
    }

    /// URL for `path` on this server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Stop the server and return the number of requests it answered.
    #[must_use]
    pub fn finish(mut self) -> usize {
        self.shutdown();
        self.served.load(Ordering::SeqCst)
    }

    /// URL on a loopback port with nothing listening.
    ///
    /// # Panics
    ///
    /// Panics if no loopback port can be bound.
    #[must_use]
    pub fn unreachable_url(path: &str) -> String {
        let addr = TcpListener::bind(("127.0.0.1", 0))
            .and_then(|listener| listener.local_addr())
            .unwrap_or_else(|e| panic!("reserve loopback port: {e}"));
        format!("http://{addr}{path}")
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        // Wake the accept loop so it observes the stop flag.
        if TcpStream::connect(self.addr).is_ok() && handle.join().is_err() {
            log::warn!("loopback server thread panicked");
        }
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn render_response(status: u16, body: &[u8]) -> Vec<u8> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    };
    let mut response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// Consume request lines up to the blank separator; `false` if none arrived.
fn read_request_head(stream: &TcpStream) -> bool {
    let mut reader = BufReader::new(stream);
    let mut saw_request_line = false;
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) | Err(_) => return saw_request_line,
            Ok(_) if line.trim_end().is_empty() => return saw_request_line,
            Ok(_) => saw_request_line = true,
        }
    }
}

/// Run `f` with the action-style input variables set or cleared.
///
/// `None` removes the variable for the duration of the call.
pub fn with_action_inputs<R>(
    version: Option<&str>,
    destination: Option<&str>,
    launcher: Option<&str>,
    f: impl FnOnce() -> R,
) -> R {
    temp_env::with_vars(
        [
            ("INPUT_VERSION", version),
            ("INPUT_DESTINATION", destination),
            ("INPUT_LAUNCHER", launcher),
        ],
        f,
    )
}
