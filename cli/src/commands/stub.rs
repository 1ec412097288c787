use std::path::{Path, PathBuf};

use anyhow::Context;
use executor_core::tokio::TokioGlobal;
use kstlink::StubServer;
use tokio::runtime::Runtime;

use crate::cli::StubArgs;
use crate::config::MergedConfig;
use crate::error::CliResult;

/// Serve until a client sends `quit` or the user interrupts
pub fn execute(args: StubArgs, config: MergedConfig) -> CliResult<()> {
    let endpoint = args.socket.unwrap_or_else(|| config.session.endpoint());
    let runtime = runtime()?;

    runtime.block_on(async {
        let server = StubServer::start(&endpoint, TokioGlobal)
            .await
            .with_context(|| format!("failed to listen on {}", endpoint.display()))?;
        eprintln!(
            "stub for session '{}' listening on {}",
            config.session.name(),
            server.socket_path().display()
        );

        tokio::select! {
            _ = server.wait_for_quit() => {
                tracing::info!("client asked the stub to quit");
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to wait for interrupt")?;
                tracing::info!("interrupted");
            }
        }
        server.stop();
        Ok::<(), anyhow::Error>(())
    })
}

fn runtime() -> CliResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")
}

/// Stub served on a background runtime while the caller runs blocking code
pub struct HostedStub {
    // Dropped before the runtime so the socket file goes first
    server: StubServer,
    _runtime: Runtime,
}

impl HostedStub {
    pub fn start(endpoint: &Path) -> CliResult<Self> {
        let runtime = runtime()?;
        let endpoint: PathBuf = endpoint.to_path_buf();
        let server = runtime
            .block_on(StubServer::start(&endpoint, TokioGlobal))
            .with_context(|| format!("failed to listen on {}", endpoint.display()))?;
        tracing::info!(path = %endpoint.display(), "hosting stub");
        Ok(Self {
            server,
            _runtime: runtime,
        })
    }

    pub fn server(&self) -> &StubServer {
        &self.server
    }
}
