use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

use crate::transport::endpoint_for;

/// Session name used when none is given
pub const DEFAULT_SESSION_NAME: &str = "kstScript";

/// Bounded connection retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 20,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new builder for RetryPolicy
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Fail on the first refused connection
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before the attempt following attempt `n` (1-based)
    ///
    /// Doubles per attempt up to `max_delay`. With jitter enabled the result is
    /// drawn uniformly from the upper half of that value.
    pub fn delay_for(&self, n: u32) -> Duration {
        let shift = n.saturating_sub(1).min(16);
        let base = self
            .initial_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let half = base / 2;
        let spread = (base - half).as_micros() as u64;
        half + Duration::from_micros(rand::thread_rng().gen_range(0..=spread))
    }
}

/// Builder for RetryPolicy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    inner: RetryPolicy,
}

impl RetryPolicyBuilder {
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.inner.attempts = attempts.max(1);
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.inner.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.inner.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.inner.jitter = enabled;
        self
    }

    pub fn build(self) -> RetryPolicy {
        self.inner
    }
}

/// How to start the plotting process when nothing answers
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl LaunchConfig {
    /// Create a new builder for LaunchConfig
    pub fn builder() -> LaunchConfigBuilder {
        LaunchConfigBuilder::default()
    }

    /// Explicit executable; `None` means look up `kst2` on `PATH`
    pub fn program(&self) -> Option<&Path> {
        self.program.as_deref()
    }

    /// Arguments passed after `--serverName=<name>`
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Builder for LaunchConfig
#[derive(Debug, Default)]
pub struct LaunchConfigBuilder {
    inner: LaunchConfig,
}

impl LaunchConfigBuilder {
    pub fn program(mut self, program: impl AsRef<Path>) -> Self {
        self.inner.program = Some(program.as_ref().to_path_buf());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.inner.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inner.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn build(self) -> LaunchConfig {
        self.inner
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    name: String,
    endpoint: Option<PathBuf>,
    call_timeout: Duration,
    write_timeout: Duration,
    retry: RetryPolicy,
    launch: Option<LaunchConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.to_string(),
            endpoint: None,
            call_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            launch: None,
        }
    }
}

impl SessionConfig {
    /// Configuration for the named process with default settings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a new builder for SessionConfig
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Socket path; derived from the name unless set explicitly
    pub fn endpoint(&self) -> PathBuf {
        self.endpoint
            .clone()
            .unwrap_or_else(|| endpoint_for(&self.name))
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn launch(&self) -> Option<&LaunchConfig> {
        self.launch.as_ref()
    }
}

/// Builder for SessionConfig
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    inner: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = name.into();
        self
    }

    pub fn endpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.inner.endpoint = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.inner.call_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.inner.write_timeout = timeout;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.inner.retry = policy;
        self
    }

    /// Spawn the plotting process if it is not running
    pub fn launch(mut self, config: LaunchConfig) -> Self {
        self.inner.launch = Some(config);
        self
    }

    pub fn build(self) -> SessionConfig {
        self.inner
    }
}
