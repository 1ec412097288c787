//! In-process stand-in for the plotting process
//!
//! Listens on a Unix domain socket and speaks the same framing as a real
//! plotting process, keeping its objects in memory. Used by the integration
//! tests and by `kstlink stub` to try scripts without a display.
//!
//! ```rust,ignore
//! let server = StubServer::start(endpoint_for("demo"), executor).await?;
//! // ... run a Session against "demo" on another thread ...
//! server.wait_for_quit().await;
//! ```

mod analysis;
mod expr;
mod router;
mod store;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_net::unix::{UnixListener, UnixStream};
use executor_core::{Executor, Task};
use futures_lite::future;
use futures_lite::io::{AsyncReadExt, AsyncWriteExt};
use smol::channel::{self, Receiver, Sender};

use crate::codec::{
    Frame, MAX_FRAME_LEN, RemoteFault, decode_body, encode_event, encode_response,
};
use crate::error::Result;

use router::{Call, Router, stub_router};
use store::Store;

/// State shared by every connection of one stub server
pub(crate) struct StubState {
    store: Mutex<Store>,
    subscribers: Mutex<HashMap<String, Vec<Sender<Vec<u8>>>>>,
    quit_requested: AtomicBool,
    quit_tx: Sender<()>,
    identity: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StubState {
    fn new(quit_tx: Sender<()>) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            subscribers: Mutex::new(HashMap::new()),
            quit_requested: AtomicBool::new(false),
            quit_tx,
            identity: format!("kstlink-stub {}", env!("CARGO_PKG_VERSION")),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test() -> Arc<Self> {
        Arc::new(Self::new(channel::bounded(1).0))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn store(&self) -> MutexGuard<'_, Store> {
        lock(&self.store)
    }

    /// Register an event listener for `widget`
    fn subscribe(&self, widget: &str) -> Receiver<Vec<u8>> {
        let (tx, rx) = channel::unbounded();
        lock(&self.subscribers)
            .entry(widget.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Push `payload` to every listener of `widget`; returns how many got it
    pub fn emit(&self, widget: &str, payload: &[u8]) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let Some(listeners) = subscribers.get_mut(widget) else {
            return 0;
        };
        listeners.retain(|tx| tx.try_send(payload.to_vec()).is_ok());
        let delivered = listeners.len();
        tracing::debug!(widget, delivered, "event emitted");
        delivered
    }

    fn subscriber_count(&self, widget: &str) -> usize {
        lock(&self.subscribers)
            .get(widget)
            .map_or(0, |listeners| listeners.iter().filter(|tx| !tx.is_closed()).count())
    }

    /// Flag the quit and end every event channel
    pub fn request_quit(&self) {
        self.quit_requested.store(true, Ordering::SeqCst);
        lock(&self.subscribers).clear();
        let _ = self.quit_tx.try_send(());
        tracing::info!("quit requested");
    }
}

/// Stub plotting process listening on a Unix domain socket
pub struct StubServer {
    state: Arc<StubState>,
    socket_path: PathBuf,
    // Closed by `stop` to end the accept loop
    stop_tx: Sender<()>,
    quit_rx: Receiver<()>,
}

impl StubServer {
    /// Bind `socket_path` and start serving on `executor`
    ///
    /// A stale socket file at that path is replaced.
    pub async fn start<E: Executor + Clone + 'static>(
        socket_path: impl AsRef<Path>,
        executor: E,
    ) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let (quit_tx, quit_rx) = channel::bounded(1);
        let state = Arc::new(StubState::new(quit_tx));
        let (stop_tx, stop_rx) = channel::bounded(1);

        let _ = std::fs::remove_file(&socket_path);
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&socket_path)?;

        tracing::info!(path = %socket_path.display(), "stub server started");

        let router = Arc::new(stub_router());
        executor
            .spawn(run_server(
                listener,
                router,
                Arc::clone(&state),
                stop_rx,
                executor.clone(),
            ))
            .detach();

        Ok(Self {
            state,
            socket_path,
            stop_tx,
            quit_rx,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Push an event payload to every subscriber of `widget`
    ///
    /// Returns the number of live subscriptions that received it.
    pub fn emit(&self, widget: &str, payload: impl AsRef<[u8]>) -> usize {
        self.state.emit(widget, payload.as_ref())
    }

    /// Live subscriptions for `widget`
    pub fn subscriber_count(&self, widget: &str) -> usize {
        self.state.subscriber_count(widget)
    }

    /// Objects currently held, derived vectors included
    pub fn object_count(&self) -> usize {
        self.state.store().len()
    }

    pub fn quit_requested(&self) -> bool {
        self.state.quit_requested.load(Ordering::SeqCst)
    }

    /// Resolves once a client sent `quit`
    pub async fn wait_for_quit(&self) {
        if self.quit_requested() {
            return;
        }
        let _ = self.quit_rx.recv().await;
    }

    /// Stop accepting connections; open connections are served to the end
    pub fn stop(&self) {
        if self.stop_tx.close() {
            tracing::debug!(path = %self.socket_path.display(), "stub server stopping");
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.stop();
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Accept loop; ends when the stop channel closes
async fn run_server<E: Executor + Clone + 'static>(
    listener: UnixListener,
    router: Arc<Router>,
    state: Arc<StubState>,
    stop_rx: Receiver<()>,
    executor: E,
) {
    loop {
        let accepted = future::or(async { Some(listener.accept().await) }, async {
            let _ = stop_rx.recv().await;
            None
        })
        .await;
        match accepted {
            Some(Ok((stream, _addr))) => {
                executor
                    .spawn(handle_connection(stream, Arc::clone(&router), Arc::clone(&state)))
                    .detach();
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "failed to accept connection");
            }
            None => break,
        }
    }
    tracing::debug!("accept loop finished");
}

/// Read one length-prefixed frame body; `None` at end of stream or on a bad frame
async fn read_body(stream: &mut UnixStream) -> Option<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = stream.read_exact(&mut len_buf).await {
        if e.kind() != std::io::ErrorKind::UnexpectedEof {
            tracing::debug!(error = %e, "failed to read frame length");
        }
        return None;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        tracing::warn!(len, "invalid frame length");
        return None;
    }

    let mut body = vec![0u8; len];
    if let Err(e) = stream.read_exact(&mut body).await {
        tracing::debug!(error = %e, "failed to read frame body");
        return None;
    }
    Some(body)
}

/// Serve requests on one connection
///
/// A successful `widget.subscribe` turns the connection into an event channel
/// for that widget.
async fn handle_connection(mut stream: UnixStream, router: Arc<Router>, state: Arc<StubState>) {
    while let Some(body) = read_body(&mut stream).await {
        let (id, call) = match decode_body(&body) {
            Ok(Frame::Request {
                id,
                command,
                args,
                options,
            }) => (
                id,
                Call {
                    command,
                    args,
                    options,
                },
            ),
            Ok(other) => {
                tracing::warn!(frame = ?other, "ignoring non-request frame");
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to decode request");
                break;
            }
        };

        tracing::debug!(id, command = %call.command, "handling request");
        let subscribe = (call.command == "widget.subscribe")
            .then(|| call.args.first().and_then(|v| v.as_str()).map(str::to_string))
            .flatten();
        let quit = call.command == "quit";

        let outcome = router.handle(Arc::clone(&state), call).await;
        if let Err(fault) = &outcome {
            tracing::debug!(id, code = fault.code, message = %fault.message, "request failed");
        }

        // Listen before answering so events emitted right after the handshake
        // are not lost
        let events = match (&outcome, subscribe) {
            (Ok(_), Some(widget)) => Some((state.subscribe(&widget), widget)),
            _ => None,
        };

        let response = encode_response(id, &outcome).or_else(|e| {
            let fault = RemoteFault::new(RemoteFault::IO, e.to_string());
            encode_response(id, &Err(fault))
        });
        let response = match response {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode response");
                break;
            }
        };
        if let Err(e) = stream.write_all(&response).await {
            tracing::debug!(error = %e, "failed to write response");
            break;
        }

        if let Some((rx, widget)) = events {
            forward_events(stream, widget, rx).await;
            return;
        }
        if quit {
            break;
        }
    }
}

async fn forward_events(mut stream: UnixStream, widget: String, rx: Receiver<Vec<u8>>) {
    tracing::debug!(widget = %widget, "event channel open");
    while let Ok(payload) = rx.recv().await {
        let frame = match encode_event(&widget, &payload) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(widget = %widget, error = %e, "dropping event");
                continue;
            }
        };
        if let Err(e) = stream.write_all(&frame).await {
            tracing::debug!(widget = %widget, error = %e, "subscriber went away");
            break;
        }
    }
    tracing::debug!(widget = %widget, "event channel closed");
}
