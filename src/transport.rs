//! Unix socket transport with readiness polling
//!
//! The stream is kept non-blocking; readiness is awaited through a per-transport
//! `polling::Poller` so every wait can carry a timeout.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use polling::{Event, Events, Poller};

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

const STREAM_KEY: usize = 0;

/// Environment variable overriding the directory that holds session sockets
pub const SOCKET_DIR_ENV: &str = "KSTLINK_SOCKET_DIR";

/// Resolve a session name to its socket path
///
/// Absolute paths are used as-is. Other names live in `$KSTLINK_SOCKET_DIR`,
/// or the system temp directory when that is unset.
pub fn endpoint_for(name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let dir = std::env::var_os(SOCKET_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    dir.join(name)
}

/// Outcome of a single connection attempt
enum Attempt {
    Connected(UnixStream),
    /// Nothing is listening yet; worth retrying
    Absent(io::Error),
}

/// A connected byte stream to the plotting process
pub struct Transport {
    stream: Option<UnixStream>,
    poller: Poller,
    endpoint: PathBuf,
    write_timeout: Option<Duration>,
}

impl Transport {
    /// Connect once, without retrying
    pub fn connect(endpoint: impl AsRef<Path>) -> Result<Self> {
        let endpoint = endpoint.as_ref();
        match attempt(endpoint)? {
            Attempt::Connected(stream) => Self::from_stream(stream, endpoint),
            Attempt::Absent(source) => Err(Error::Connection {
                endpoint: endpoint.to_path_buf(),
                source,
            }),
        }
    }

    /// Connect, retrying with backoff while the endpoint is absent
    ///
    /// `before_retry` runs after each failed attempt with the attempt number
    /// (starting at 1); the launcher hooks in here. Exhausting the policy yields
    /// `ProcessNotFound` for `name`.
    pub fn connect_with_retry(
        name: &str,
        endpoint: impl AsRef<Path>,
        policy: &RetryPolicy,
        mut before_retry: impl FnMut(u32) -> Result<()>,
    ) -> Result<Self> {
        let endpoint = endpoint.as_ref();
        let attempts = policy.attempts().max(1);

        for n in 1..=attempts {
            match attempt(endpoint)? {
                Attempt::Connected(stream) => {
                    tracing::debug!(path = %endpoint.display(), attempt = n, "connected");
                    return Self::from_stream(stream, endpoint);
                }
                Attempt::Absent(e) => {
                    tracing::debug!(
                        path = %endpoint.display(),
                        attempt = n,
                        error = %e,
                        "endpoint not available"
                    );
                    if n < attempts {
                        before_retry(n)?;
                        std::thread::sleep(policy.delay_for(n));
                    }
                }
            }
        }

        Err(Error::ProcessNotFound {
            name: name.to_string(),
            attempts,
        })
    }

    fn from_stream(stream: UnixStream, endpoint: &Path) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let poller = Poller::new()?;
        let fd = stream.as_raw_fd();
        // SAFETY: the stream outlives its registration; it is deleted from the
        // poller in `close` before the descriptor is released.
        unsafe {
            poller.add(fd, Event::none(STREAM_KEY))?;
        }
        Ok(Self {
            stream: Some(stream),
            poller,
            endpoint: endpoint.to_path_buf(),
            write_timeout: None,
        })
    }

    /// Bound how long `send` may wait for the socket to drain
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn stream(&self) -> Result<&UnixStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| Error::ConnectionLost("transport is closed".to_string()))
    }

    /// Write all of `bytes`, waiting for writability as needed
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let deadline = self.write_timeout.map(|t| Instant::now() + t);
        let mut written = 0;

        while written < bytes.len() {
            let result = self.stream()?.write(&bytes[written..]);
            match result {
                Ok(0) => return Err(lost("peer stopped accepting data")),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let remaining = match deadline {
                        Some(deadline) => {
                            let now = Instant::now();
                            if now >= deadline {
                                return Err(Error::Io(io::Error::new(
                                    io::ErrorKind::TimedOut,
                                    format!(
                                        "write stalled after {written} of {} bytes",
                                        bytes.len()
                                    ),
                                )));
                            }
                            Some(deadline - now)
                        }
                        None => None,
                    };
                    self.wait_writable(remaining)?;
                }
                Err(e) if is_disconnect(&e) => return Err(lost(&e.to_string())),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Wait until the stream has bytes to read (or the peer hung up)
    ///
    /// Returns `false` when the timeout elapsed first.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.wait_for(Event::readable(STREAM_KEY), timeout)
    }

    /// Wait until the stream can accept more bytes
    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.wait_for(Event::writable(STREAM_KEY), timeout)
    }

    fn wait_for(&self, interest: Event, timeout: Option<Duration>) -> Result<bool> {
        let stream = self.stream()?;
        self.poller.modify(stream, interest)?;

        let mut events = Events::new();
        match self.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(events.iter().any(|event| event.key == STREAM_KEY))
    }

    /// Read up to `max` bytes that are available right now
    ///
    /// An empty result means nothing was ready. End of stream is reported as
    /// `ConnectionLost`.
    pub fn read(&mut self, max: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; max];
        loop {
            let result = self.stream()?.read(&mut buf);
            match result {
                Ok(0) if max > 0 => return Err(lost("remote closed the connection")),
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
                Err(e) if is_disconnect(&e) => return Err(lost(&e.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Release the descriptor; calling again is a no-op
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = self.poller.delete(&stream);
            let _ = stream.shutdown(std::net::Shutdown::Both);
            tracing::debug!(path = %self.endpoint.display(), "transport closed");
        }
    }
}

impl AsRawFd for Transport {
    /// `-1` once closed
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn attempt(endpoint: &Path) -> Result<Attempt> {
    match UnixStream::connect(endpoint) {
        Ok(stream) => Ok(Attempt::Connected(stream)),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
            ) =>
        {
            Ok(Attempt::Absent(e))
        }
        Err(source) => Err(Error::Connection {
            endpoint: endpoint.to_path_buf(),
            source,
        }),
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
    )
}

fn lost(reason: &str) -> Error {
    Error::ConnectionLost(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    fn temp_socket(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "kstlink-transport-{tag}-{}-{}.sock",
            std::process::id(),
            rand::random::<u32>()
        ))
    }

    #[test]
    fn test_endpoint_absolute_name_is_kept() {
        assert_eq!(endpoint_for("/run/kst.sock"), PathBuf::from("/run/kst.sock"));
    }

    #[test]
    fn test_endpoint_relative_name_is_joined() {
        let path = endpoint_for("kstScript");
        assert!(path.ends_with("kstScript"));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_partial_reads_and_close() {
        let path = temp_socket("partial");
        let listener = UnixListener::bind(&path).unwrap();

        let mut transport = Transport::connect(&path).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        // Nothing ready yet
        assert!(!transport.wait_readable(Some(Duration::from_millis(20))).unwrap());
        assert!(transport.read(16).unwrap().is_empty());

        peer.write_all(b"hello world").unwrap();
        assert!(transport.wait_readable(Some(Duration::from_secs(2))).unwrap());
        assert_eq!(transport.read(5).unwrap(), b"hello");
        assert_eq!(transport.read(64).unwrap(), b" world");

        transport.send(b"ping").unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        transport.close();
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(transport.as_raw_fd(), -1);
        assert!(matches!(transport.send(b"x"), Err(Error::ConnectionLost(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_peer_hangup_is_connection_lost() {
        let path = temp_socket("hangup");
        let listener = UnixListener::bind(&path).unwrap();

        let mut transport = Transport::connect(&path).unwrap();
        let (peer, _) = listener.accept().unwrap();
        drop(peer);

        assert!(transport.wait_readable(Some(Duration::from_secs(2))).unwrap());
        assert!(matches!(transport.read(16), Err(Error::ConnectionLost(_))));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_retry_exhaustion_is_process_not_found() {
        let path = temp_socket("absent");
        let policy = RetryPolicy::builder()
            .attempts(3)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .build();

        let mut retries = Vec::new();
        let result = Transport::connect_with_retry("ghost", &path, &policy, |n| {
            retries.push(n);
            Ok(())
        });

        match result {
            Err(Error::ProcessNotFound { name, attempts }) => {
                assert_eq!(name, "ghost");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(retries, vec![1, 2]);
    }
}
