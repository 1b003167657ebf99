//! Child-process lifecycle for the route optimiser.

use std::io;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use binroute_core::{Route, RouteSet, RoutingStrategy};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

use crate::{RouteSolver, RoutingProblem, WireError, WireFormat};

/// Errors raised when the optimiser cannot be run at all.
///
/// An optimiser that runs but fails is not an error; its invocation simply
/// yields no routes.
#[derive(Debug, Error)]
pub enum SolverProcessError {
    /// The executable could not be started.
    #[error("failed to start solver {program}")]
    Spawn {
        /// Path that was executed.
        program: Utf8PathBuf,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },
    /// Reading the child's output or waiting for it failed.
    #[error("solver pipe failed")]
    Io(#[source] io::Error),
}

/// Where the optimiser lives and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverProcessConfig {
    /// Executable to spawn once per strategy.
    pub program: Utf8PathBuf,
    /// Argument encoding.
    pub wire: WireFormat,
}

impl SolverProcessConfig {
    /// Configuration for `program` with the default wire format.
    pub fn new(program: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            wire: WireFormat::default(),
        }
    }

    /// Replace the wire format.
    #[must_use]
    pub fn with_wire(mut self, wire: WireFormat) -> Self {
        self.wire = wire;
        self
    }
}

/// Runs the optimiser, one child at a time.
///
/// The running child is owned by the adapter. If a [`solve`](Self::solve)
/// future is dropped before completion the child stays in the slot and the
/// next call kills and reaps it before starting a new one. Dropping the
/// adapter kills any child still running.
#[derive(Debug)]
pub struct SolverProcess {
    config: SolverProcessConfig,
    current: Option<Child>,
}

impl SolverProcess {
    /// Create an idle adapter.
    #[must_use]
    pub const fn new(config: SolverProcessConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &SolverProcessConfig {
        &self.config
    }

    /// Process id of the child currently held, if any.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        self.current.as_ref().and_then(Child::id)
    }

    /// Run one invocation of the optimiser.
    ///
    /// Routes are returned in the order the child printed them. A non-zero
    /// exit, a termination signal or malformed output yields an empty
    /// [`RouteSet`] and a warning.
    ///
    /// # Errors
    ///
    /// Returns [`SolverProcessError::Spawn`] when the executable cannot be
    /// started and [`SolverProcessError::Io`] when its output cannot be read.
    pub async fn solve(
        &mut self,
        problem: &RoutingProblem,
        strategy: RoutingStrategy,
    ) -> Result<RouteSet, SolverProcessError> {
        self.supersede().await;

        let program = &self.config.program;
        let mut child = Command::new(program.as_std_path())
            .args(self.config.wire.arguments(problem, strategy))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SolverProcessError::Spawn {
                program: program.clone(),
                source,
            })?;
        debug!(
            "spawned solver {program} (pid {:?}) with strategy {strategy}",
            child.id()
        );
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        self.current = Some(child);

        let (routes, ()) = tokio::join!(
            read_routes(stdout, &self.config.wire),
            drain_stderr(stderr, &self.config.program)
        );
        let routes = routes.map_err(SolverProcessError::Io)?;
        let status = self.wait_current().await?;
        Ok(outcome(strategy, status, routes))
    }

    async fn wait_current(&mut self) -> Result<ExitStatus, SolverProcessError> {
        let Some(child) = self.current.as_mut() else {
            return Err(SolverProcessError::Io(io::Error::other(
                "solver child vanished before completion",
            )));
        };
        let status = child.wait().await.map_err(SolverProcessError::Io)?;
        self.current = None;
        Ok(status)
    }

    async fn supersede(&mut self) {
        let Some(mut child) = self.current.take() else {
            return;
        };
        warn!("superseding unfinished solver process {:?}", child.id());
        if let Err(err) = child.start_kill() {
            debug!("solver process already gone: {err}");
        }
        if let Err(err) = child.wait().await {
            warn!("failed to reap superseded solver process: {err}");
        }
    }
}

#[async_trait]
impl RouteSolver for SolverProcess {
    async fn solve(
        &mut self,
        problem: &RoutingProblem,
        strategy: RoutingStrategy,
    ) -> Result<RouteSet, SolverProcessError> {
        Self::solve(self, problem, strategy).await
    }
}

fn missing_pipe(name: &str) -> SolverProcessError {
    SolverProcessError::Io(io::Error::other(format!("solver {name} was not captured")))
}

fn outcome(
    strategy: RoutingStrategy,
    status: ExitStatus,
    routes: Result<Vec<Route>, WireError>,
) -> RouteSet {
    if !status.success() {
        warn!("solver failed for strategy {strategy}: {status}");
        return RouteSet::default();
    }
    match routes {
        Ok(routes) => {
            info!("solver returned {} routes for strategy {strategy}", routes.len());
            RouteSet(routes)
        }
        Err(err) => {
            warn!("discarding solver output for strategy {strategy}: {err}");
            RouteSet::default()
        }
    }
}

/// Collect routes until stdout closes.
///
/// After the first malformed line the rest of the output is still drained so
/// the child never blocks on a full pipe.
async fn read_routes(
    stdout: ChildStdout,
    wire: &WireFormat,
) -> io::Result<Result<Vec<Route>, WireError>> {
    let mut lines = BufReader::new(stdout).lines();
    let mut routes = Vec::new();
    let mut malformed = None;
    while let Some(line) = lines.next_line().await? {
        if malformed.is_some() {
            continue;
        }
        match wire.parse_route(&line) {
            Ok(Some(route)) => routes.push(route),
            Ok(None) => {}
            Err(err) => malformed = Some(err),
        }
    }
    match malformed {
        Some(err) => Ok(Err(err)),
        None => Ok(Ok(routes)),
    }
}

async fn drain_stderr(stderr: ChildStderr, program: &Utf8Path) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!("{program}: {line}"),
            Ok(None) => break,
            Err(err) => {
                debug!("stopped reading {program} stderr: {err}");
                break;
            }
        }
    }
}
