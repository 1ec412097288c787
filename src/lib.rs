//! kstlink - drive the Kst plotting application from Rust
//!
//! A running plotting process listens on a local socket under a session name.
//! This library connects to it, creates remote objects (plots, vectors,
//! equations, curves, widgets) and manipulates them through lightweight
//! [`Handle`]s. Every operation is a synchronous request/response round trip.
//!
//! # Example
//!
//! ```rust,no_run
//! use kstlink::{PlotOptions, Session};
//!
//! fn plot_parabola() -> kstlink::Result<()> {
//!     let session = Session::new("kstScript")?;
//!
//!     let plot = session.new_plot(&PlotOptions::default())?;
//!     let x = session.new_generated_vector(-1.0, 1.0, 100)?;
//!     let eq = session.new_equation(&x, "x^2")?;
//!     let curve = session.new_curve(&eq.x()?, &eq.y()?)?;
//!     curve.set_color("blue")?;
//!     plot.add(&curve)?;
//!
//!     let samples = x.values()?;
//!     assert_eq!(samples.len(), 100);
//!     Ok(())
//! }
//! ```
//!
//! # Events
//!
//! Buttons and line edits report interactions on a separate connection per
//! widget. Nothing runs in the background: drive an [`EventSubscription`]
//! directly, or register several in an [`EventLoop`].
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use kstlink::{EventLoop, Geometry, Session, WidgetEvent};
//!
//! fn watch_button(session: &Session) -> kstlink::Result<()> {
//!     let button = session.new_button("Press me", &Geometry::default())?;
//!     let subscription = button.subscribe(|payload| {
//!         if WidgetEvent::parse(payload) == WidgetEvent::Clicked {
//!             println!("clicked");
//!         }
//!         Ok(())
//!     })?;
//!
//!     let mut events = EventLoop::new()?;
//!     events.register(subscription)?;
//!     events.run_once(Some(Duration::from_secs(1)))?;
//!     Ok(())
//! }
//! ```
//!
//! # Testing without a display
//!
//! [`StubServer`] is an in-memory stand-in for the plotting process that speaks
//! the same protocol.

pub mod codec;
mod config;
mod error;
mod events;
mod handle;
mod launch;
mod session;
pub mod stub;
mod transport;

pub use codec::{CommandOptions, Invocation, RemoteFault, Value};
pub use config::{
    DEFAULT_SESSION_NAME, LaunchConfig, LaunchConfigBuilder, RetryPolicy, RetryPolicyBuilder,
    SessionConfig, SessionConfigBuilder,
};
pub use error::{Error, Result};
pub use events::{EventLoop, EventSubscription, WidgetEvent};
pub use handle::{Handle, ObjectKind};
pub use session::{
    CloseReason, ConnectionState, DataVectorOptions, ExportOptions, Geometry, HistogramOptions,
    PlotOptions, Session, SpectrumOptions,
};
pub use stub::StubServer;
pub use transport::{SOCKET_DIR_ENV, Transport, endpoint_for};
