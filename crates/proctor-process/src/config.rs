//! Command configuration

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Timeout applied when none (or zero) is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long output drains may outlive the process before being cut off
pub const DEFAULT_WAIT_DELAY: Duration = Duration::from_millis(100);

/// Blacklist entry that drops the whole inherited environment
pub const ENV_WILDCARD: &str = "*";

/// Boxed reader handed to the child's stdin
pub type FeedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Factory producing one stdin reader per execution
pub type Feeder = Arc<dyn Fn() -> FeedReader + Send + Sync>;

/// Which standard streams are attached to a pseudo-terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyMode {
    /// Child stdin reads from the pty slave
    pub stdin: bool,
    /// Child stdout writes to the pty slave
    pub stdout: bool,
    /// Child stderr writes to the pty slave
    pub stderr: bool,
}

impl PtyMode {
    /// Set per-stream flags
    pub fn new(stdin: bool, stdout: bool, stderr: bool) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }

    /// Whether a pty needs to be allocated at all
    pub fn any(&self) -> bool {
        self.stdin || self.stdout || self.stderr
    }
}

/// Configuration for one command execution
#[derive(Clone)]
pub struct CommandConfig {
    /// Binary to execute
    pub binary: String,
    /// Arguments placed before `args`
    pub prepend_args: Vec<String>,
    /// Command arguments
    pub args: Vec<String>,
    /// Wrapper binary; the invocation becomes `wrapper wrap_args... binary args...`
    pub wrap_binary: Option<String>,
    /// Wrapper arguments
    pub wrap_args: Vec<String>,
    /// Execution timeout (None or zero = [`DEFAULT_TIMEOUT`])
    pub timeout: Option<Duration>,
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Explicit environment; always wins over the inherited one
    pub env: HashMap<String, String>,
    /// Inherited variables to drop, or [`ENV_WILDCARD`] to drop all of them
    pub env_blacklist: Vec<String>,
    /// Pty-backed streams
    pub pty: PtyMode,
    /// Grace period for output drains after the process exited
    pub wait_delay: Duration,
    feeders: Vec<Feeder>,
}

impl CommandConfig {
    /// Create new command configuration
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            prepend_args: vec![],
            args: vec![],
            wrap_binary: None,
            wrap_args: vec![],
            timeout: None,
            working_dir: None,
            env: HashMap::new(),
            env_blacklist: vec![],
            pty: PtyMode::default(),
            wait_delay: DEFAULT_WAIT_DELAY,
            feeders: vec![],
        }
    }

    /// Set command arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Append arguments placed before the command arguments
    pub fn prepend_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prepend_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the binary through a wrapper
    pub fn wrapper<I, S>(mut self, binary: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrap_binary = Some(binary.into());
        self.wrap_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set timeout duration
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the inherited-environment blacklist
    pub fn env_blacklist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.env_blacklist = names.into_iter().map(Into::into).collect();
        self
    }

    /// Attach streams to a pseudo-terminal
    pub fn pty(mut self, stdin: bool, stdout: bool, stderr: bool) -> Self {
        self.pty = PtyMode::new(stdin, stdout, stderr);
        self
    }

    /// Set the output drain grace period
    pub fn wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = delay;
        self
    }

    /// Add a stdin feeder factory
    pub fn feeder<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> FeedReader + Send + Sync + 'static,
    {
        self.push_feeder(Arc::new(factory));
        self
    }

    /// Feed fixed bytes to stdin
    pub fn feed(self, data: impl Into<Vec<u8>>) -> Self {
        let data: Arc<[u8]> = data.into().into();
        self.feeder(move || Box::new(Cursor::new(Arc::clone(&data))) as FeedReader)
    }

    pub(crate) fn push_feeder(&mut self, feeder: Feeder) {
        self.feeders.push(feeder);
    }

    /// Stdin feeders, in feeding order
    pub fn feeders(&self) -> &[Feeder] {
        &self.feeders
    }

    /// Timeout actually applied to the run
    pub fn effective_timeout(&self) -> Duration {
        match self.timeout {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for CommandConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandConfig")
            .field("binary", &self.binary)
            .field("prepend_args", &self.prepend_args)
            .field("args", &self.args)
            .field("wrap_binary", &self.wrap_binary)
            .field("wrap_args", &self.wrap_args)
            .field("timeout", &self.timeout)
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .field("env_blacklist", &self.env_blacklist)
            .field("pty", &self.pty)
            .field("wait_delay", &self.wait_delay)
            .field("feeders", &self.feeders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CommandConfig::new("ls")
            .args(["-la"])
            .prepend_args(["--color=never"])
            .wrapper("env", ["-i"])
            .working_dir("/tmp")
            .env("A", "1")
            .envs([("B", "2")])
            .env_blacklist(["HOME"])
            .pty(false, true, false);

        assert_eq!(config.binary, "ls");
        assert_eq!(config.args, vec!["-la"]);
        assert_eq!(config.prepend_args, vec!["--color=never"]);
        assert_eq!(config.wrap_binary.as_deref(), Some("env"));
        assert_eq!(config.wrap_args, vec!["-i"]);
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(config.env.len(), 2);
        assert_eq!(config.env_blacklist, vec!["HOME"]);
        assert_eq!(config.pty, PtyMode::new(false, true, false));
    }

    #[test]
    fn test_effective_timeout() {
        assert_eq!(CommandConfig::new("x").effective_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(
            CommandConfig::new("x")
                .timeout(Duration::ZERO)
                .effective_timeout(),
            DEFAULT_TIMEOUT
        );
        assert_eq!(
            CommandConfig::new("x")
                .timeout(Duration::from_millis(50))
                .effective_timeout(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_clone_is_deep() {
        let original = CommandConfig::new("x").env("A", "1").feed("in");
        let mut copy = original.clone();
        copy.env.insert("B".to_string(), "2".to_string());
        copy.env_blacklist.push("*".to_string());

        assert_eq!(original.env.len(), 1);
        assert!(original.env_blacklist.is_empty());
        assert_eq!(copy.feeders().len(), 1);
    }

    #[test]
    fn test_pty_mode_serde() {
        let mode: PtyMode = serde_json::from_str(r#"{"stdout": true}"#).unwrap();
        assert_eq!(mode, PtyMode::new(false, true, false));
        assert!(mode.any());
        assert!(!PtyMode::default().any());
    }
}
