use super::{
    transport::{RcCommand, TransportError, VehicleTransport},
    vehicle_command::VehicleCommand,
};
use crate::config::DispatcherConfig;
use crate::{error, event, info};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};
use strum_macros::Display;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DispatchError {
    /// The worker was stopped, the command will never run.
    Stopped,
    /// No result arrived within the reply timeout.
    Timeout,
    Transport(TransportError),
}

impl std::error::Error for DispatchError {}

type Reply = oneshot::Sender<Result<(), TransportError>>;

/// Holds the newest stick command while its job waits in the queue.
/// `Some` exactly while one [`DispatchJob::LatestRc`] is queued.
type RcSlot = Arc<Mutex<Option<RcCommand>>>;

enum DispatchJob {
    Command { command: VehicleCommand, reply: Option<Reply> },
    /// Runs whatever RC command sits in the slot once dequeued.
    LatestRc,
}

fn lock_slot(slot: &RcSlot) -> MutexGuard<'_, Option<RcCommand>> {
    slot.lock().expect("[FATAL] Mutex poisoned: Failed to acquire RC slot")
}

/// Serializes all outgoing vehicle commands onto one worker task.
///
/// Commands run strictly in FIFO order, one at a time, with a fixed gap
/// between executions. Execution errors are logged and do not stop the
/// worker. Once stopped, queued commands are dropped without running.
///
/// Stick commands submitted through [`CommandDispatcher::dispatch_latest_rc`]
/// keep their queue position but are superseded by newer ones, so only the
/// freshest velocity reaches the vehicle.
pub struct CommandDispatcher {
    tx: mpsc::UnboundedSender<DispatchJob>,
    c_tok: CancellationToken,
    rc_slot: RcSlot,
    pending: Arc<AtomicUsize>,
    executed: Arc<AtomicUsize>,
    config: DispatcherConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandDispatcher {
    /// Spawns the worker task. Must be called from within a Tokio runtime.
    pub fn start(transport: Arc<dyn VehicleTransport>, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let c_tok = CancellationToken::new();
        let pending = Arc::new(AtomicUsize::new(0));
        let executed = Arc::new(AtomicUsize::new(0));
        let rc_slot = RcSlot::default();
        let worker = tokio::spawn(Self::run(
            transport,
            rx,
            c_tok.clone(),
            Arc::clone(&rc_slot),
            Arc::clone(&pending),
            Arc::clone(&executed),
            config,
        ));
        info!("Command dispatcher started.");
        Self { tx, c_tok, rc_slot, pending, executed, config, worker: Mutex::new(Some(worker)) }
    }

    async fn run(
        transport: Arc<dyn VehicleTransport>,
        mut rx: mpsc::UnboundedReceiver<DispatchJob>,
        c_tok: CancellationToken,
        rc_slot: RcSlot,
        pending: Arc<AtomicUsize>,
        executed: Arc<AtomicUsize>,
        config: DispatcherConfig,
    ) {
        loop {
            let job = tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            // A stop issued while this job was queued wins over running it.
            if c_tok.is_cancelled() {
                break;
            }
            let (command, reply) = match job {
                DispatchJob::Command { command, reply } => (command, reply),
                DispatchJob::LatestRc => {
                    let latest = lock_slot(&rc_slot).take();
                    let Some(rc) = latest else {
                        pending.fetch_sub(1, Ordering::AcqRel);
                        continue;
                    };
                    (VehicleCommand::Rc(rc), None)
                }
            };
            let result = command.apply(transport.as_ref()).await;
            pending.fetch_sub(1, Ordering::AcqRel);
            executed.fetch_add(1, Ordering::AcqRel);
            match &result {
                Ok(()) => event!("Executed {command}."),
                Err(e) => error!("Command {command} failed: {e}"),
            }
            if let Some(reply) = reply {
                // Caller may have timed out and dropped the receiver.
                let _ = reply.send(result);
            }
            tokio::select! {
                biased;
                () = c_tok.cancelled() => break,
                () = tokio::time::sleep(config.command_gap) => {}
            }
        }
        rx.close();
        info!("Command dispatcher stopped.");
    }

    fn enqueue(&self, job: DispatchJob) -> Result<(), DispatchError> {
        if self.c_tok.is_cancelled() {
            return Err(DispatchError::Stopped);
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(job).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            DispatchError::Stopped
        })
    }

    /// Queues a command without waiting for its execution.
    pub fn dispatch(&self, command: VehicleCommand) -> Result<(), DispatchError> {
        self.enqueue(DispatchJob::Command { command, reply: None })
    }

    /// Queues a stick command without waiting, replacing the RC command
    /// that is still waiting in the queue, if any.
    ///
    /// # Returns
    /// `true` if a stale RC command was superseded.
    ///
    /// # Errors
    /// [`DispatchError::Stopped`] if the worker is no longer running.
    pub fn dispatch_latest_rc(&self, rc: RcCommand) -> Result<bool, DispatchError> {
        if self.c_tok.is_cancelled() {
            return Err(DispatchError::Stopped);
        }
        let mut slot = lock_slot(&self.rc_slot);
        if slot.replace(rc).is_some() {
            return Ok(true);
        }
        self.enqueue(DispatchJob::LatestRc).inspect_err(|_| *slot = None)?;
        Ok(false)
    }

    /// Queues a command and waits until the worker executed it.
    ///
    /// # Errors
    /// - [`DispatchError::Stopped`] if the dispatcher stopped before running it.
    /// - [`DispatchError::Timeout`] if no result arrived in time.
    /// - [`DispatchError::Transport`] if the vehicle reported a failure.
    pub async fn execute(&self, command: VehicleCommand) -> Result<(), DispatchError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(DispatchJob::Command { command, reply: Some(reply_tx) })?;
        match tokio::time::timeout(self.config.reply_timeout, reply_rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(DispatchError::Transport(e)),
            Ok(Err(_)) => Err(DispatchError::Stopped),
            Err(_) => Err(DispatchError::Timeout),
        }
    }

    /// Number of queued commands that have not completed yet.
    pub fn pending(&self) -> usize { self.pending.load(Ordering::Acquire) }

    pub fn executed(&self) -> usize { self.executed.load(Ordering::Acquire) }

    pub fn config(&self) -> &DispatcherConfig { &self.config }

    pub fn is_stopped(&self) -> bool { self.c_tok.is_cancelled() }

    /// Stops the worker. Queued commands are discarded.
    pub fn stop(&self) { self.c_tok.cancel(); }

    /// Stops the worker and waits for it to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self
            .worker
            .lock()
            .expect("[FATAL] Mutex poisoned: Failed to acquire worker handle")
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Command dispatcher worker ended abnormally: {e}");
            }
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) { self.c_tok.cancel(); }
}
