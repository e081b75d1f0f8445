//! Execution engine: the one-shot `run` / `wait` / `signal` lifecycle
//!
//! A [`Command`] moves through `Idle → Started → Finished`, or
//! `Idle → FailedToStart` when nothing could be started. No transition
//! leaves a terminal state; running again means cloning the command.

use std::fmt;

use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CommandConfig, FeedReader};
use crate::context::ExecContext;
use crate::error::{ProcessError, Result, SignalError, StartError};
use crate::invocation::Invocation;
use crate::pipes::Pipes;
use crate::result::{classify, Classification, ExecResult};
use crate::supervisor::{supervise, SignalRequest};

/// Lifecycle state of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Never run
    Idle,
    /// Process started, result not collected yet
    Started,
    /// Result produced
    Finished,
    /// Pipes, pty or process could not be started
    FailedToStart,
}

type Outcome = (ExecResult, Result<()>);

/// Transient per-run state, alive between `run` and the finalize step
struct Execution {
    pid: Option<u32>,
    signals: mpsc::UnboundedSender<SignalRequest>,
    outcome: watch::Receiver<Option<Outcome>>,
}

enum State {
    Idle,
    Started(Execution),
    Finished(ExecResult),
    FailedToStart {
        result: ExecResult,
        error: ProcessError,
    },
}

/// What is left of a failed start
struct StartFailure {
    error: ProcessError,
    result: ExecResult,
    pipes: Option<Pipes>,
}

/// A child process executed at most once
pub struct Command {
    config: CommandConfig,
    state: Mutex<State>,
}

impl Command {
    /// Create an idle command
    pub fn new(config: CommandConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Idle),
        }
    }

    /// Command configuration
    pub fn config(&self) -> &CommandConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> CommandState {
        match &*self.state.lock() {
            State::Idle => CommandState::Idle,
            State::Started(_) => CommandState::Started,
            State::Finished(_) => CommandState::Finished,
            State::FailedToStart { .. } => CommandState::FailedToStart,
        }
    }

    /// Process ID while started
    pub fn pid(&self) -> Option<u32> {
        match &*self.state.lock() {
            State::Started(execution) => execution.pid,
            _ => None,
        }
    }

    /// Attach streams to a pseudo-terminal
    pub fn with_pty(&mut self, stdin: bool, stdout: bool, stderr: bool) {
        self.config.pty = crate::config::PtyMode::new(stdin, stdout, stderr);
    }

    /// Add a stdin feeder factory
    pub fn with_feeder<F>(&mut self, factory: F)
    where
        F: Fn() -> FeedReader + Send + Sync + 'static,
    {
        self.config.push_feeder(std::sync::Arc::new(factory));
    }

    /// Start the process
    ///
    /// Returns once the process is started; it does not wait for it. The
    /// run is bounded by the configured timeout and by `parent`: cancelling
    /// it terminates the process.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Examples
    /// ```no_run
    /// use proctor_process::{CancellationToken, Command, CommandConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let command = Command::new(CommandConfig::new("echo").args(["hello"]));
    /// command.run(&CancellationToken::new()).await?;
    /// let (result, outcome) = command.wait().await;
    /// outcome?;
    /// assert_eq!(result.unwrap().stdout, b"hello\n");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, parent: &CancellationToken) -> Result<()> {
        let (pipes, error) = {
            let mut state = self.state.lock();
            match &*state {
                State::Finished(_) | State::FailedToStart { .. } => {
                    return Err(ProcessError::AlreadyFinished)
                }
                State::Started(_) => return Err(ProcessError::AlreadyStarted),
                State::Idle => {}
            }

            match self.launch(parent) {
                Ok(execution) => {
                    *state = State::Started(execution);
                    return Ok(());
                }
                Err(failure) => {
                    *state = State::FailedToStart {
                        result: failure.result,
                        error: failure.error.clone(),
                    };
                    (failure.pipes, failure.error)
                }
            }
        };

        // Nothing ever held the process-facing ends, so this only joins tasks.
        if let Some(pipes) = pipes {
            pipes.finalize().await;
        }

        Err(error)
    }

    /// Wait for the process and collect its result
    ///
    /// The result is produced once; later calls return it again together
    /// with `AlreadyFinished`, or with the original error when the command
    /// failed to start.
    pub async fn wait(&self) -> (Option<ExecResult>, Result<()>) {
        let mut outcome = {
            let state = self.state.lock();
            match &*state {
                State::Idle => return (None, Err(ProcessError::NotStarted)),
                State::FailedToStart { result, error } => {
                    return (Some(result.clone()), Err(error.clone()))
                }
                State::Finished(result) => {
                    return (Some(result.clone()), Err(ProcessError::AlreadyFinished))
                }
                State::Started(execution) => execution.outcome.clone(),
            }
        };

        let reported = match outcome.wait_for(Option::is_some).await {
            Ok(reported) => reported.clone(),
            Err(_) => None,
        };

        let mut state = self.state.lock();
        if let State::Finished(result) = &*state {
            // A concurrent waiter collected it first.
            return (Some(result.clone()), Err(ProcessError::AlreadyFinished));
        }

        let (result, outcome) = reported.unwrap_or_else(|| {
            // Only happens when the runtime shuts down under the supervisor.
            error!(binary = %self.config.binary, "Supervisor ended without a result");
            (
                ExecResult::degenerate(vec![]),
                Err(ProcessError::ExecutionCancelled),
            )
        });
        *state = State::Finished(result.clone());

        (Some(result), outcome)
    }

    /// Deliver a signal to the running process
    ///
    /// Only suspends for the supervisor's acknowledgement.
    pub async fn signal(&self, signal: Signal) -> Result<()> {
        let signals = {
            let state = self.state.lock();
            match &*state {
                State::Idle => return Err(ProcessError::NotStarted),
                State::Finished(_) => return Err(ProcessError::AlreadyFinished),
                State::FailedToStart { .. } => {
                    return Err(ProcessError::FailedSendingSignal(SignalError::NoProcess))
                }
                State::Started(execution) => execution.signals.clone(),
            }
        };

        let (reply, delivered) = oneshot::channel();
        // A closed channel means the supervisor has already reaped the process.
        signals
            .send(SignalRequest { signal, reply })
            .map_err(|_| ProcessError::FailedSendingSignal(SignalError::ProcessDone))?;

        match delivered.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(ProcessError::FailedSendingSignal(cause)),
            Err(_) => Err(ProcessError::FailedSendingSignal(SignalError::ProcessDone)),
        }
    }

    fn launch(&self, parent: &CancellationToken) -> std::result::Result<Execution, StartFailure> {
        let context = ExecContext::derive(parent, self.config.effective_timeout());
        let invocation = Invocation::from_config(&self.config);
        let environ = invocation.environ_entries();

        debug!(
            command = %invocation,
            timeout = ?self.config.effective_timeout(),
            pty = ?self.config.pty,
            "Starting command"
        );

        let (pipes, stdio) = match Pipes::open(
            self.config.pty,
            self.config.feeders(),
            self.config.wait_delay,
        ) {
            Ok(opened) => opened,
            Err(cause) => {
                warn!(command = %invocation, error = %cause, "Failed preparing pipes");
                context.cancel();
                return Err(StartFailure {
                    error: ProcessError::starting(cause),
                    result: ExecResult::degenerate(environ),
                    pipes: None,
                });
            }
        };

        let (stdin, stdout, stderr) = stdio.into_stdio();
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env_clear()
            .envs(invocation.environ.iter().map(|(k, v)| (k, v)))
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .kill_on_drop(true);
        if let Some(dir) = &invocation.working_dir {
            command.current_dir(dir);
        }

        let spawned = command.spawn();
        // The builder holds our copies of the process-facing ends.
        drop(command);

        let child = match spawned {
            Ok(child) => child,
            Err(source) => {
                warn!(command = %invocation, error = %source, "Start failed");
                context.cancel();
                return Err(StartFailure {
                    error: ProcessError::starting(StartError::Spawn {
                        program: invocation.program,
                        source,
                    }),
                    result: ExecResult::degenerate(environ),
                    pipes: Some(pipes),
                });
            }
        };

        let pid = child.id();
        info!(pid, command = %invocation, "Process spawned");

        let (signals, requests) = mpsc::unbounded_channel();
        let (report, outcome) = watch::channel(None);

        tokio::spawn(async move {
            let exit = supervise(child, &context, requests).await;
            let interruption = exit.interruption.or_else(|| context.interruption());

            let captured = pipes.finalize().await;
            context.cancel();

            let Classification {
                exit_code,
                signal,
                outcome,
            } = classify(exit.status, interruption);

            let result = ExecResult {
                exit_code,
                stdout: captured.stdout,
                stderr: captured.stderr,
                signal,
                environ,
            };
            debug!(pid, exit_code, ?signal, "Command finished");

            let _ = report.send(Some((result, outcome)));
        });

        Ok(Execution {
            pid,
            signals,
            outcome,
        })
    }
}

impl Clone for Command {
    /// Copy the configuration only; the copy is `Idle`
    fn clone(&self) -> Self {
        Self::new(self.config.clone())
    }
}

impl From<CommandConfig> for Command {
    fn from(config: CommandConfig) -> Self {
        Self::new(config)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    fn sh(script: &str) -> Command {
        Command::new(CommandConfig::new("sh").args(["-c", script]))
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let command = sh("exit 0");
        assert_eq!(command.state(), CommandState::Idle);

        command.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(command.state(), CommandState::Started);
        assert!(command.pid().is_some());

        let (_, outcome) = command.wait().await;
        outcome.unwrap();
        assert_eq!(command.state(), CommandState::Finished);
        assert_eq!(command.pid(), None);
    }

    #[tokio::test]
    async fn test_failed_start_state() {
        let command = Command::new(CommandConfig::new("/nonexistent/binary"));
        let err = command.run(&CancellationToken::new()).await.unwrap_err();

        assert!(err.is(ErrorKind::FailedStarting));
        assert_eq!(command.state(), CommandState::FailedToStart);
        assert!(command
            .run(&CancellationToken::new())
            .await
            .unwrap_err()
            .is(ErrorKind::AlreadyFinished));
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_one_result() {
        let command = std::sync::Arc::new(sh("echo once"));
        command.run(&CancellationToken::new()).await.unwrap();

        let other = std::sync::Arc::clone(&command);
        let second = tokio::spawn(async move { other.wait().await });
        let (first_result, first) = command.wait().await;
        let (second_result, second) = second.await.unwrap();

        assert_eq!(first_result, second_result);
        assert_eq!(first_result.unwrap().stdout, b"once\n");

        // Exactly one waiter saw the real outcome.
        let already = [&first, &second]
            .iter()
            .filter(|o| matches!(o, Err(e) if e.is(ErrorKind::AlreadyFinished)))
            .count();
        assert_eq!(already, 1);
    }

    #[tokio::test]
    async fn test_with_feeder_and_pty_mutators() {
        let mut command = Command::new(CommandConfig::new("cat"));
        command.with_feeder(|| Box::new(std::io::Cursor::new(b"fed".to_vec())) as FeedReader);
        command.with_pty(false, false, false);

        command.run(&CancellationToken::new()).await.unwrap();
        let (result, outcome) = command.wait().await;
        outcome.unwrap();
        assert_eq!(result.unwrap().stdout, b"fed");
    }

    #[tokio::test]
    async fn test_signal_is_delivered_through_supervisor() {
        let command = Command::new(
            CommandConfig::new("sleep")
                .args(["5"])
                .timeout(Duration::from_secs(30)),
        );
        command.run(&CancellationToken::new()).await.unwrap();
        command.signal(Signal::SIGKILL).await.unwrap();

        let (result, outcome) = command.wait().await;
        assert!(outcome.unwrap_err().is(ErrorKind::ExecutionSignaled));
        assert_eq!(result.unwrap().signal, Some(Signal::SIGKILL));
    }
}
