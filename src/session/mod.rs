//! Client session with the plotting process
//!
//! A [`Session`] owns one control connection. Calls are strictly
//! call-and-wait: each one takes a fresh correlation id, sends its request and
//! blocks the calling thread until the response with that id arrives or the
//! deadline passes. Responses are matched by id, never by arrival order, so a
//! late answer to a timed-out call is recognised and dropped.
//!
//! The session is single-threaded (`!Sync`). Event callbacks run on the same
//! thread through [`EventSubscription`](crate::EventSubscription) and may issue
//! calls of their own.

pub(crate) mod channel;
mod objects;
mod pending;

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Instant;

use crate::codec::{CommandOptions, Frame, Invocation, RemoteFault, Value, encode_request};
use crate::config::SessionConfig;
use crate::error::{Error, Result};
use crate::events::EventSubscription;
use crate::handle::{Handle, ObjectKind};
use crate::launch;
use crate::transport::Transport;

use channel::Channel;
use pending::{CorrelationIds, PendingTable};

pub use objects::{
    DataVectorOptions, ExportOptions, Geometry, HistogramOptions, PlotOptions, SpectrumOptions,
};

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Closed,
}

/// Why a session reached `Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `quit` was sent to the plotting process
    Quit,
    /// The session was closed locally; the plotting process keeps running
    Disconnected,
    /// The transport broke
    ConnectionLost,
}

struct Connection {
    channel: Channel,
    ids: CorrelationIds,
    pending: PendingTable,
}

impl Connection {
    fn await_response(&mut self, id: u64) -> Result<Value> {
        loop {
            if let Some(outcome) = self.pending.take_ready(id) {
                return outcome.map_err(Error::from);
            }

            let deadline = self
                .pending
                .deadline(id)
                .ok_or_else(|| Error::Protocol(format!("request {id} is not pending")))?;

            match self.channel.next_frame_before(deadline)? {
                Some(frame) => self.route(frame),
                None => {
                    let (command, after) = self
                        .pending
                        .remove(id)
                        .map(|entry| (entry.command, entry.issued.elapsed()))
                        .unwrap_or_default();
                    tracing::warn!(id, command = %command, ?after, "request timed out");
                    return Err(Error::Timeout { command, after });
                }
            }
        }
    }

    fn route(&mut self, frame: Frame) {
        match frame {
            Frame::Response { id, outcome } => {
                if !self.pending.complete(id, outcome) {
                    tracing::warn!(id, "discarding response with no pending request");
                }
            }
            Frame::Event { key, .. } => {
                tracing::warn!(key = %key, "ignoring event on the control channel");
            }
            Frame::Request { id, command, .. } => {
                tracing::warn!(id, %command, "ignoring request from the plotting process");
            }
        }
    }
}

/// One client-side connection to a named plotting process
pub struct Session {
    config: SessionConfig,
    endpoint: PathBuf,
    state: Cell<ConnectionState>,
    close_reason: Cell<Option<CloseReason>>,
    conn: RefCell<Connection>,
    identity: String,
    child: Option<Child>,
}

impl Session {
    /// Attach to the plotting process registered under `name`
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::connect(SessionConfig::new(name))
    }

    /// Connect using an explicit configuration
    ///
    /// Retries while the endpoint is absent. If a launch configuration is
    /// present, the plotting process is spawned after the first failed attempt.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let endpoint = config.endpoint();
        tracing::debug!(
            name = config.name(),
            path = %endpoint.display(),
            state = ?ConnectionState::Connecting,
            "connecting"
        );

        let mut child = None;
        let mut transport = Transport::connect_with_retry(
            config.name(),
            &endpoint,
            config.retry(),
            |attempt| {
                if attempt == 1 {
                    if let Some(launch_config) = config.launch() {
                        child = Some(launch::spawn(config.name(), launch_config)?);
                    }
                }
                Ok(())
            },
        )?;
        transport.set_write_timeout(Some(config.write_timeout()));

        let mut session = Self {
            endpoint,
            state: Cell::new(ConnectionState::Connecting),
            close_reason: Cell::new(None),
            conn: RefCell::new(Connection {
                channel: Channel::new(transport),
                ids: CorrelationIds::new(),
                pending: PendingTable::new(),
            }),
            identity: String::new(),
            child,
            config,
        };

        let greeting = session.roundtrip(&Invocation::new("hello").arg(session.config.name()))?;
        session.identity = match greeting {
            Value::Str(identity) => identity,
            other => other.to_string(),
        };
        session.state.set(ConnectionState::Connected);

        tracing::info!(
            name = session.name(),
            remote = %session.identity,
            "session connected"
        );
        Ok(session)
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.get() == ConnectionState::Connected
    }

    /// What the plotting process answered to the handshake
    pub fn remote_identity(&self) -> &str {
        &self.identity
    }

    /// Process id of the plotting process if this session launched it
    pub fn launched_pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Requests sent and not yet answered or abandoned
    pub fn pending_requests(&self) -> usize {
        self.conn
            .try_borrow()
            .map(|conn| conn.pending.len())
            .unwrap_or(1)
    }

    /// Whether the control transport has released its descriptor
    pub fn transport_closed(&self) -> bool {
        self.conn
            .try_borrow()
            .map(|conn| conn.channel.transport.is_closed())
            .unwrap_or(false)
    }

    /// Run a command with positional arguments
    pub fn call(&self, command: &str, args: impl IntoIterator<Item = Value>) -> Result<Value> {
        self.invoke(Invocation::new(command).args(args))
    }

    /// Run a prepared invocation
    pub fn invoke(&self, invocation: Invocation) -> Result<Value> {
        self.ensure_open()?;
        self.roundtrip(&invocation)
    }

    /// Create a remote object through `<kind>.create`
    pub fn create(
        &self,
        kind: ObjectKind,
        args: impl IntoIterator<Item = Value>,
    ) -> Result<Handle<'_>> {
        self.create_from(Invocation::new(format!("{kind}.create")).args(args), kind)
    }

    /// Like `create`, with typed options attached
    pub fn create_with(
        &self,
        kind: ObjectKind,
        args: impl IntoIterator<Item = Value>,
        options: &impl CommandOptions,
    ) -> Result<Handle<'_>> {
        self.create_from(
            Invocation::new(format!("{kind}.create"))
                .args(args)
                .options(options),
            kind,
        )
    }

    fn create_from(&self, invocation: Invocation, kind: ObjectKind) -> Result<Handle<'_>> {
        let command = invocation.command().to_string();
        let value = self.invoke(invocation)?;
        self.handle_from(&command, value, kind)
    }

    /// Wrap a result that names a remote object
    pub(crate) fn handle_from(
        &self,
        command: &str,
        value: Value,
        kind: ObjectKind,
    ) -> Result<Handle<'_>> {
        match value {
            Value::Str(id) => Ok(Handle::new(self, id, kind)),
            Value::Int(id) => Ok(Handle::new(self, id.to_string(), kind)),
            other => Err(Error::UnexpectedResult {
                command: command.to_string(),
                expected: "object id",
                found: other.type_name(),
            }),
        }
    }

    /// Export the current tab (or all tabs) to an image file
    ///
    /// The plotting process writes the file; a failure on its side is reported
    /// as `ExportFailed` with its message unchanged.
    pub fn export(&self, path: impl AsRef<Path>, options: &ExportOptions) -> Result<()> {
        options.validate()?;
        let path = path.as_ref();
        let invocation = Invocation::new("export_graphics_file")
            .arg(path.to_string_lossy().into_owned())
            .options(options);

        match self.invoke(invocation) {
            Ok(_) => Ok(()),
            Err(Error::Remote { code, message }) if code == RemoteFault::IO => {
                Err(Error::ExportFailed {
                    path: path.to_path_buf(),
                    message,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Open a side channel for one widget's events
    ///
    /// Nothing is read until the subscription is dispatched by the caller's
    /// event loop.
    pub fn subscribe<'s>(
        &'s self,
        widget: &str,
        callback: impl FnMut(&[u8]) -> Result<()> + 's,
    ) -> Result<EventSubscription<'s>> {
        self.ensure_open()?;

        let mut transport = Transport::connect(&self.endpoint)?;
        transport.set_write_timeout(Some(self.config.write_timeout()));
        let mut channel = Channel::new(transport);

        let id = self
            .conn
            .try_borrow_mut()
            .map_err(|_| Error::CallInProgress)?
            .ids
            .next_id()?;
        let request = encode_request(id, &Invocation::new("widget.subscribe").arg(widget))?;
        channel.transport.send(&request)?;

        let timeout = self.config.call_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            match channel.next_frame_before(deadline)? {
                Some(Frame::Response { id: rid, outcome }) if rid == id => {
                    outcome?;
                    break;
                }
                Some(_) => {
                    tracing::warn!(widget, "unexpected frame during subscribe handshake");
                }
                None => {
                    return Err(Error::Timeout {
                        command: "widget.subscribe".to_string(),
                        after: timeout,
                    });
                }
            }
        }

        tracing::debug!(widget, "subscribed");
        Ok(EventSubscription::new(
            widget.to_string(),
            channel,
            Box::new(callback),
        ))
    }

    /// Ask the plotting process to exit and close the session
    ///
    /// The session is closed even if sending fails; any later call fails with
    /// `SessionClosed`.
    pub fn quit(&self) -> Result<()> {
        self.ensure_open()?;
        let mut conn = self
            .conn
            .try_borrow_mut()
            .map_err(|_| Error::CallInProgress)?;

        let id = conn.ids.next_id()?;
        let sent = encode_request(id, &Invocation::new("quit"))
            .and_then(|frame| conn.channel.transport.send(&frame));

        self.state.set(ConnectionState::Closed);
        self.close_reason.set(Some(CloseReason::Quit));
        conn.pending.clear();
        conn.channel.transport.close();

        tracing::info!(name = self.name(), "session quit");
        sent
    }

    /// Close the connection, leaving the plotting process running
    pub fn close(&self) {
        if self.state.get() == ConnectionState::Closed {
            return;
        }
        self.state.set(ConnectionState::Closed);
        self.close_reason.set(Some(CloseReason::Disconnected));
        if let Ok(mut conn) = self.conn.try_borrow_mut() {
            conn.pending.clear();
            conn.channel.transport.close();
        }
        tracing::debug!(name = self.name(), "session closed");
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state.get() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Closed => match self.close_reason.get() {
                Some(CloseReason::ConnectionLost) => Err(Error::ConnectionLost(
                    "session closed after a transport failure".to_string(),
                )),
                _ => Err(Error::SessionClosed),
            },
            state => Err(Error::Protocol(format!("session is {state:?}"))),
        }
    }

    fn roundtrip(&self, invocation: &Invocation) -> Result<Value> {
        let mut conn = self
            .conn
            .try_borrow_mut()
            .map_err(|_| Error::CallInProgress)?;

        let id = conn.ids.next_id()?;
        let frame = encode_request(id, invocation)?;
        let deadline = Instant::now() + self.config.call_timeout();

        tracing::debug!(id, command = invocation.command(), bytes = frame.len(), "sending request");
        if let Err(e) = conn.channel.transport.send(&frame) {
            // A partially written frame leaves the stream unusable
            self.mark_lost(&mut conn, &e);
            return Err(e);
        }

        conn.pending.insert(id, invocation.command(), deadline);
        let result = conn.await_response(id);

        if let Err(e) = &result {
            conn.pending.remove(id);
            if matches!(
                e,
                Error::ConnectionLost(_) | Error::Io(_) | Error::Protocol(_)
            ) {
                self.mark_lost(&mut conn, e);
            }
        }
        result
    }

    fn mark_lost(&self, conn: &mut Connection, error: &Error) {
        self.state.set(ConnectionState::Closed);
        self.close_reason.set(Some(CloseReason::ConnectionLost));
        let dropped = conn.pending.clear();
        conn.channel.transport.close();
        tracing::warn!(
            name = self.name(),
            error = %error,
            dropped,
            "connection lost, session closed"
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name())
            .field("endpoint", &self.endpoint)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.get() != ConnectionState::Closed {
            self.close();
        }
        if let Some(child) = &self.child {
            tracing::debug!(pid = child.id(), "leaving launched plotting process running");
        }
    }
}
