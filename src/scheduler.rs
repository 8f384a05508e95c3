//! Background worker that runs a task on a fixed cadence.
//!
//! The worker owns nothing but the task closure; whoever holds the
//! `Scheduler` decides when it ends. A task panic is reported through the
//! fault callback and the worker keeps ticking.

use crossbeam_channel::{bounded, select, tick, Receiver, Sender, TryRecvError, TrySendError};
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Shortest accepted tick period. Unvalidated configs may carry a zero
/// interval, which would otherwise spin.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

const WORKER_NAME: &str = "shrink-map-worker";
const ONESHOT_NAME: &str = "shrink-map-oneshot";

/// Lifecycle of the background worker. `Stopped` is terminal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SchedulerState {
    Running,
    Stopped,
}

/// A panic caught at the worker boundary.
#[derive(Debug, Clone)]
pub(crate) struct Fault {
    pub(crate) message: String,
    pub(crate) backtrace: String,
}

pub(crate) struct Scheduler {
    // Dropping the sender disconnects the channel and wakes the worker.
    stop_tx: Option<Sender<()>>,
    nudge_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the worker thread. `task` runs once per `interval` and once per
    /// coalesced [`Scheduler::nudge`]; `on_fault` receives any panic it raises.
    pub(crate) fn spawn<T, F>(interval: Duration, task: T, on_fault: F) -> std::io::Result<Self>
    where
        T: Fn() + Send + 'static,
        F: Fn(Fault) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let (nudge_tx, nudge_rx) = bounded::<()>(1);
        let interval = interval.max(MIN_TICK);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run(interval, stop_rx, nudge_rx, task, on_fault))?;
        tracing::info!(?interval, "shrink worker started");
        Ok(Self {
            stop_tx: Some(stop_tx),
            nudge_tx,
            handle: Some(handle),
        })
    }

    pub(crate) fn state(&self) -> SchedulerState {
        if self.stop_tx.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Requests an out-of-band run without blocking. Requests made while one
    /// is already pending are merged into it.
    pub(crate) fn nudge(&self) -> bool {
        if self.stop_tx.is_none() {
            return false;
        }
        match self.nudge_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Signals the worker and waits for it to exit. Idempotent. When called
    /// from the worker itself the join is skipped.
    pub(crate) fn stop(&mut self) {
        let Some(stop_tx) = self.stop_tx.take() else {
            return;
        };
        drop(stop_tx);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("shrink worker terminated abnormally");
            }
        }
        tracing::info!("shrink worker stopped");
    }
}

/// Runs `task` once on a detached thread, with the same panic handling as a
/// worker tick. Returns without waiting for the task.
pub(crate) fn run_detached<T, F>(task: T, on_fault: F) -> std::io::Result<()>
where
    T: FnOnce() + Send + 'static,
    F: Fn(Fault) + Send + 'static,
{
    thread::Builder::new()
        .name(ONESHOT_NAME.to_string())
        .spawn(move || run_once(task, &on_fault))?;
    Ok(())
}

fn run<T, F>(
    interval: Duration,
    stop_rx: Receiver<()>,
    nudge_rx: Receiver<()>,
    task: T,
    on_fault: F,
) where
    T: Fn(),
    F: Fn(Fault),
{
    let ticker = tick(interval);
    loop {
        // A stop that races with a ready tick must win.
        if let Err(TryRecvError::Disconnected) = stop_rx.try_recv() {
            break;
        }
        select! {
            recv(stop_rx) -> _ => break,
            recv(ticker) -> _ => run_once(&task, &on_fault),
            recv(nudge_rx) -> msg => match msg {
                Ok(()) => run_once(&task, &on_fault),
                Err(_) => break,
            },
        }
    }
}

fn run_once<T, F>(task: T, on_fault: &F)
where
    T: FnOnce(),
    F: Fn(Fault),
{
    if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
        let fault = Fault {
            message: panic_message(payload.as_ref()),
            backtrace: Backtrace::capture().to_string(),
        };
        tracing::error!(message = %fault.message, "shrink task panicked");
        on_fault(fault);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
