//! A concurrent application runner that manages long-running processes with graceful shutdown.
//!
//! This runner orchestrates multiple app processes and cleanup functions, providing:
//! - Concurrent execution of named processes under one cancellation token
//! - Graceful shutdown on SIGTERM/SIGINT
//! - Supervised processes that are restarted under a [`RestartPolicy`]
//! - Closers that always run, bounded by a timeout
//!
//! # Example
//!
//! ```no_run
//! use beacon_runner::{RestartPolicy, Runner};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = Runner::new()
//!         .with_named_process("ticker", |ctx| async move {
//!             loop {
//!                 tokio::select! {
//!                     _ = ctx.cancelled() => break,
//!                     _ = tokio::time::sleep(Duration::from_secs(1)) => {
//!                         tracing::info!("tick");
//!                     }
//!                 }
//!             }
//!             Ok(())
//!         })
//!         .with_supervised_process("worker", RestartPolicy::default(), |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer(|| async move {
//!             tracing::info!("Cleaning up resources");
//!             Ok(())
//!         })
//!         .with_closer_timeout(Duration::from_secs(5));
//!
//!     runner.run().await;
//! }
//! ```

use anyhow::anyhow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

type BoxedResultFuture = Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send>>;

/// An app process: takes the shared cancellation token, resolves when done
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedResultFuture + Send>;

/// A cleanup function run after every app process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedResultFuture + Send>;

struct NamedProcess {
    name: String,
    process: AppProcess,
}

/// How a supervised process is restarted after it fails
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Consecutive failures tolerated before giving up
    pub max_restarts: u32,
    /// Pause between a failure and the next start
    pub restart_delay: Duration,
    /// A session that ran at least this long resets the failure count
    pub stable_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            restart_delay: Duration::from_secs(5),
            stable_after: Duration::from_secs(60),
        }
    }
}

/// Run `factory` until it succeeds, the token is cancelled, or the restart
/// policy is exhausted. Each start gets a fresh future from the factory.
pub async fn supervise<F, Fut>(
    name: &str,
    policy: &RestartPolicy,
    ctx: CancellationToken,
    factory: F,
) -> Result<(), anyhow::Error>
where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), anyhow::Error>>,
{
    let mut failures: u32 = 0;

    loop {
        let started = Instant::now();
        let result = factory(ctx.clone()).await;

        if ctx.is_cancelled() {
            tracing::debug!(process = %name, "supervised process stopped by cancellation");
            return Ok(());
        }

        let err = match result {
            Ok(()) => {
                tracing::info!(process = %name, "supervised process finished");
                return Ok(());
            }
            Err(err) => err,
        };

        if started.elapsed() >= policy.stable_after {
            failures = 0;
        }
        failures += 1;

        if failures > policy.max_restarts {
            tracing::error!(
                process = %name,
                failures,
                error = %format!("{:#}", err),
                "supervised process exhausted its restart policy"
            );
            return Err(err.context(format!(
                "{} failed {} times in a row",
                name, failures
            )));
        }

        tracing::warn!(
            process = %name,
            attempt = failures,
            max_restarts = policy.max_restarts,
            delay_ms = policy.restart_delay.as_millis() as u64,
            error = %format!("{:#}", err),
            "supervised process failed, restarting"
        );

        tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            _ = tokio::time::sleep(policy.restart_delay) => {}
        }
    }
}

/// A concurrent application runner that manages long-running processes with graceful shutdown.
///
/// - App processes run concurrently until one fails or a shutdown signal is received
/// - Closers execute afterward, regardless of process outcome
/// - Signal handling (SIGTERM/SIGINT) implements graceful shutdown
pub struct Runner {
    app_processes: Vec<NamedProcess>,
    closers: Vec<Closer>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// Creates a runner with a 10 second closer timeout and nothing to run
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Adds an unnamed app process
    pub fn with_app_process<F, Fut>(self, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.with_named_process("app", process)
    }

    /// Adds an app process. If any process returns an error, all processes
    /// are cancelled and closers are executed.
    pub fn with_named_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.app_processes.push(NamedProcess {
            name: name.into(),
            process: Box::new(|token| Box::pin(process(token))),
        });
        self
    }

    /// Adds a process that is restarted on failure according to `policy`.
    /// Only exhausting the policy counts as a failure of the runner.
    pub fn with_supervised_process<F, Fut>(
        self,
        name: impl Into<String>,
        policy: RestartPolicy,
        factory: F,
    ) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        let name = name.into();
        let process_name = name.clone();
        self.with_named_process(name, move |ctx| async move {
            supervise(&process_name, &policy, ctx, factory).await
        })
    }

    /// Adds a closer. All closers run concurrently after the processes stop,
    /// even if some of them fail.
    pub fn with_closer<F, Fut>(mut self, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.closers.push(Box::new(|| Box::pin(closer())));
        self
    }

    /// Sets the timeout for executing closers. Default is 10 seconds.
    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Sets a custom cancellation token, for external control over shutdown
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Runs everything, then exits the application: code 0 on a clean
    /// shutdown, 1 if a process failed.
    pub async fn run(self) {
        let token = self.cancellation_token.clone();
        spawn_signal_handlers(token);

        match self.run_until_complete().await {
            Ok(()) => {
                tracing::info!("Application exiting normally");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!("Application exiting with error: {:#}", err);
                std::process::exit(1);
            }
        }
    }

    /// Runs all processes until they finish, one fails, or the token is
    /// cancelled; then runs the closers. Returns the first process error.
    pub async fn run_until_complete(self) -> Result<(), anyhow::Error> {
        let token = Arc::new(self.cancellation_token);
        let mut join_set = JoinSet::new();

        for NamedProcess { name, process } in self.app_processes {
            let process_token = (*token).clone();
            join_set.spawn(async move {
                tracing::debug!(process = %name, "starting app process");
                let result = process(process_token).await;
                (name, result)
            });
        }

        let mut first_error = None;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((name, Ok(()))) => {
                    tracing::debug!(process = %name, "app process completed successfully");
                }
                Ok((name, Err(err))) => {
                    if !token.is_cancelled() {
                        tracing::error!(process = %name, "app process error: {:#}", err);
                        first_error = Some(err.context(format!("process {} failed", name)));
                        token.cancel();
                    }
                }
                Err(err) => {
                    tracing::error!("app process panicked: {}", err);
                    if !token.is_cancelled() {
                        first_error = Some(anyhow!("app process panicked: {}", err));
                        token.cancel();
                    }
                }
            }

            if token.is_cancelled() {
                break;
            }
        }

        // Give the remaining processes the closer timeout to observe
        // cancellation, then abort whatever is left
        let drained = tokio::time::timeout(self.closer_timeout, async {
            while let Some(result) = join_set.join_next().await {
                if let Ok((name, Err(err))) = result {
                    tracing::warn!(process = %name, "app process stopped with error: {:#}", err);
                }
            }
        })
        .await;
        if drained.is_err() {
            tracing::warn!("app processes did not stop in time, aborting them");
        }
        join_set.shutdown().await;

        run_closers_with_timeout(self.closers, self.closer_timeout).await;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn spawn_signal_handlers(token: CancellationToken) {
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                ctrl_c_token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up signal handler: {}", err);
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
                token.cancel();
            }
            Err(err) => {
                tracing::error!("Error setting up SIGTERM handler: {}", err);
            }
        }
    });
}

async fn run_closers_with_timeout(closers: Vec<Closer>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    tracing::info!("Running closers with timeout of {:?}", timeout);
    match tokio::time::timeout(timeout, run_closers(closers)).await {
        Ok(()) => tracing::info!("All closers completed"),
        Err(_) => tracing::error!("Closers timed out after {:?}", timeout),
    }
}

async fn run_closers(closers: Vec<Closer>) {
    let mut closer_set = JoinSet::new();

    for closer in closers {
        closer_set.spawn(async move { closer().await });
    }

    while let Some(result) = closer_set.join_next().await {
        match result {
            Ok(Ok(())) => tracing::debug!("Closer completed successfully"),
            Ok(Err(err)) => tracing::error!("Closer error: {:#}", err),
            Err(err) => tracing::error!("Closer panicked: {}", err),
        }
    }
}
