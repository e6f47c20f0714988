//! Discard pipeline state machine.
//!
//! Given a list of already-filtered, eligible items, issues one disposal
//! action at a time and drives the game's confirmation dialog to completion.
//! Every wait happens by re-enqueueing a short-delay poll on the shared
//! [`TaskQueue`]; no step blocks.
//!
//! Retry policy: an unready confirm control is retried a small number of
//! times before the job fails; a dialog that never appears is polled up to a
//! larger bound and then the discard is treated as having completed without
//! a prompt (some disposals skip confirmation; this is deliberate policy,
//! not a bug). Independently of both counters, a hard wall-clock timeout per
//! item bounds worst-case latency.
//!
//! Finished runs are appended to a bounded history, persisted as JSON when a
//! history path is configured.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::DiscardConfig;
use crate::error::{MiddenError, Result};
use crate::game::{DialogError, DialogHandle, DialogObserver, GameActionExecutor, Item};
use crate::queue::TaskQueue;

/// How a discard run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every item was processed.
    Completed,
    /// The caller cancelled the run.
    Cancelled,
    /// The run halted on an error.
    Failed,
}

/// One finished discard run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardRunRecord {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Items discarded before the run ended.
    pub discarded: usize,
    /// Items the run was started with.
    pub total: usize,
    /// Failure message, if any.
    #[serde(default)]
    pub message: Option<String>,
    /// Unix epoch seconds when the run ended.
    pub finished_at: u64,
}

/// Copy-out view of the pipeline for status displays.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscardStatus {
    /// No job has run yet.
    Idle,
    /// A job is working through its item list.
    Running {
        /// Items discarded so far.
        progress: usize,
        /// Items in the job.
        total: usize,
        /// Name of the item currently being discarded.
        current: Option<String>,
    },
    /// The last job processed every item.
    Completed {
        /// Items discarded.
        discarded: usize,
    },
    /// The last job was cancelled.
    Cancelled {
        /// Items discarded before cancellation.
        discarded: usize,
    },
    /// The last job halted on an error.
    Failed {
        /// Human-readable failure description.
        message: String,
        /// Items discarded before the failure.
        discarded: usize,
    },
}

enum JobPhase {
    Idle,
    /// Issue the discard for the item at the cursor.
    Issue,
    /// Poll for the confirmation dialog of the issued discard.
    AwaitConfirm {
        issued_at: Instant,
        confirm_retries: u32,
        missing_polls: u32,
    },
    /// Confirmed; wait for the dialog to leave the screen.
    AwaitDismissal {
        handle: DialogHandle,
        issued_at: Instant,
    },
    /// Terminal.
    Done {
        outcome: RunOutcome,
        message: Option<String>,
    },
}

impl JobPhase {
    fn is_active(&self) -> bool {
        matches!(
            self,
            JobPhase::Issue | JobPhase::AwaitConfirm { .. } | JobPhase::AwaitDismissal { .. }
        )
    }
}

struct PipelineState {
    phase: JobPhase,
    items: Vec<Item>,
    progress: usize,
    history: Vec<DiscardRunRecord>,
    history_path: Option<PathBuf>,
}

#[derive(Clone, Copy)]
enum Step {
    Issue,
    ConfirmPoll,
    DismissalPoll,
}

type PersistJob = (Vec<DiscardRunRecord>, PathBuf);

/// The discard pipeline. Cheap to clone; clones share one job state.
#[derive(Clone)]
pub struct DiscardPipeline {
    queue: Arc<TaskQueue>,
    actions: Arc<dyn GameActionExecutor>,
    dialogs: Arc<dyn DialogObserver>,
    config: DiscardConfig,
    state: Arc<Mutex<PipelineState>>,
}

impl DiscardPipeline {
    /// Create a pipeline over the shared queue and game collaborators.
    pub fn new(
        queue: Arc<TaskQueue>,
        actions: Arc<dyn GameActionExecutor>,
        dialogs: Arc<dyn DialogObserver>,
        config: DiscardConfig,
    ) -> Self {
        Self {
            queue,
            actions,
            dialogs,
            config,
            state: Arc::new(Mutex::new(PipelineState {
                phase: JobPhase::Idle,
                items: Vec::new(),
                progress: 0,
                history: Vec::new(),
                history_path: None,
            })),
        }
    }

    /// Persist run history to `path`, loading whatever is already there.
    pub fn with_history_path(self, path: PathBuf) -> Self {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match load_history_from_path(&path) {
                Ok(history) => state.history = history,
                Err(e) => warn!("cannot load discard history: {e}"),
            }
            state.history_path = Some(path);
        }
        self
    }

    /// Start a run over already-filtered, eligible items.
    ///
    /// # Errors
    ///
    /// Rejects an empty selection and rejects starting while another job is
    /// active; neither rejection mutates state.
    pub fn start(&self, items: Vec<Item>) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.phase.is_active() {
            return Err(MiddenError::Discard(
                "a discard job is already running".to_owned(),
            ));
        }
        if items.is_empty() {
            return Err(MiddenError::Discard(
                "nothing to discard: selection is empty".to_owned(),
            ));
        }

        info!("starting discard job over {} items", items.len());
        state.items = items;
        state.progress = 0;
        state.phase = JobPhase::Issue;
        drop(state);

        self.schedule(None, Step::Issue);
        Ok(())
    }

    /// Cancel the active run, if any. Returns whether a run was cancelled.
    ///
    /// Clears the shared queue and reports [`DiscardStatus::Cancelled`].
    /// An action already issued to the game cannot be recalled; cancellation
    /// only stops the pipeline from proceeding. Idempotent no-op when no job
    /// is active.
    pub fn cancel(&self) -> bool {
        let persist = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.phase.is_active() {
                return false;
            }
            info!(
                "cancelling discard job at {} of {}",
                state.progress,
                state.items.len()
            );
            self.finish_with(&mut state, RunOutcome::Cancelled, None)
        };
        self.queue.abort();
        self.persist_history(persist);
        true
    }

    /// Whether a job is currently between start and a terminal state.
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .phase
            .is_active()
    }

    /// Copy-out status for displays.
    pub fn status(&self) -> DiscardStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.phase {
            JobPhase::Idle => DiscardStatus::Idle,
            JobPhase::Issue | JobPhase::AwaitConfirm { .. } | JobPhase::AwaitDismissal { .. } => {
                DiscardStatus::Running {
                    progress: state.progress,
                    total: state.items.len(),
                    current: state.items.get(state.progress).map(|item| item.name.clone()),
                }
            }
            JobPhase::Done { outcome, message } => match outcome {
                RunOutcome::Completed => DiscardStatus::Completed {
                    discarded: state.progress,
                },
                RunOutcome::Cancelled => DiscardStatus::Cancelled {
                    discarded: state.progress,
                },
                RunOutcome::Failed => DiscardStatus::Failed {
                    message: message.clone().unwrap_or_default(),
                    discarded: state.progress,
                },
            },
        }
    }

    /// Finished runs, oldest first.
    pub fn history(&self) -> Vec<DiscardRunRecord> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .history
            .clone()
    }

    // ─── Scheduler steps ──────────────────────────────────────────────────────

    fn schedule(&self, delay: Option<Duration>, step: Step) {
        if let Some(delay) = delay {
            self.queue.enqueue_delay(delay);
        }
        let pipeline = self.clone();
        self.queue.enqueue(move |now| match step {
            Step::Issue => pipeline.step_issue(now),
            Step::ConfirmPoll => pipeline.step_confirm(now),
            Step::DismissalPoll => pipeline.step_dismissal(now),
        });
    }

    fn step_issue(&self, now: Instant) {
        enum Action {
            Finished(Option<PersistJob>),
            Request(Item),
        }

        let action = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(state.phase, JobPhase::Issue) {
                return;
            }
            if state.progress >= state.items.len() {
                info!("discard job completed: {} items", state.progress);
                Action::Finished(self.finish_with(&mut state, RunOutcome::Completed, None))
            } else {
                Action::Request(state.items[state.progress].clone())
            }
        };

        let item = match action {
            Action::Finished(persist) => {
                self.persist_history(persist);
                return;
            }
            Action::Request(item) => item,
        };

        debug!("requesting discard of '{}'", item.name);
        match self.actions.request_discard(&item) {
            Err(e) => {
                // The item is not counted as completed and there is no
                // automatic retry of the action itself.
                self.fail(format!("discard request for '{}' failed: {e}", item.name));
            }
            Ok(()) => {
                {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    if !matches!(state.phase, JobPhase::Issue) {
                        return;
                    }
                    state.phase = JobPhase::AwaitConfirm {
                        issued_at: now,
                        confirm_retries: 0,
                        missing_polls: 0,
                    };
                }
                self.schedule(Some(self.config.poll_interval()), Step::ConfirmPoll);
            }
        }
    }

    fn step_confirm(&self, now: Instant) {
        let (issued_at, confirm_retries, missing_polls, item_name) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.phase {
                JobPhase::AwaitConfirm {
                    issued_at,
                    confirm_retries,
                    missing_polls,
                } => (
                    issued_at,
                    confirm_retries,
                    missing_polls,
                    state
                        .items
                        .get(state.progress)
                        .map(|item| item.name.clone())
                        .unwrap_or_default(),
                ),
                _ => return,
            }
        };

        if now.duration_since(issued_at) >= self.config.hard_timeout() {
            self.fail(format!(
                "timed out waiting for the discard of '{item_name}' to confirm"
            ));
            return;
        }

        match self.dialogs.find_confirmation_dialog(&self.config.confirm_text) {
            Some(handle) => match self.dialogs.confirm(&handle) {
                Ok(()) => {
                    {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        if !matches!(state.phase, JobPhase::AwaitConfirm { .. }) {
                            return;
                        }
                        state.progress += 1;
                        state.phase = JobPhase::AwaitDismissal { handle, issued_at };
                    }
                    debug!("confirmed discard of '{item_name}'");
                    self.schedule(Some(self.config.poll_interval()), Step::DismissalPoll);
                }
                Err(DialogError::ControlNotReady) => {
                    let retries = confirm_retries + 1;
                    if retries > self.config.confirm_retry_limit {
                        self.fail(format!(
                            "confirm control for '{item_name}' never became ready"
                        ));
                        return;
                    }
                    {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        if !matches!(state.phase, JobPhase::AwaitConfirm { .. }) {
                            return;
                        }
                        state.phase = JobPhase::AwaitConfirm {
                            issued_at,
                            confirm_retries: retries,
                            missing_polls,
                        };
                    }
                    self.schedule(Some(self.config.poll_interval()), Step::ConfirmPoll);
                }
                Err(e) => {
                    self.fail(format!("confirming discard of '{item_name}' failed: {e}"));
                }
            },
            None => {
                let polls = missing_polls + 1;
                if polls > self.config.missing_dialog_limit {
                    // The game sometimes disposes without a prompt; repeated
                    // false negatives must not block progress forever, so the
                    // discard is treated as complete.
                    info!(
                        "no confirmation dialog for '{item_name}' after {polls} polls; \
                         assuming the discard completed without one"
                    );
                    {
                        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                        if !matches!(state.phase, JobPhase::AwaitConfirm { .. }) {
                            return;
                        }
                        state.progress += 1;
                        state.phase = JobPhase::Issue;
                    }
                    self.schedule(Some(self.config.poll_interval()), Step::Issue);
                    return;
                }
                {
                    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                    if !matches!(state.phase, JobPhase::AwaitConfirm { .. }) {
                        return;
                    }
                    state.phase = JobPhase::AwaitConfirm {
                        issued_at,
                        confirm_retries,
                        missing_polls: polls,
                    };
                }
                self.schedule(Some(self.config.poll_interval()), Step::ConfirmPoll);
            }
        }
    }

    fn step_dismissal(&self, now: Instant) {
        let (handle, issued_at) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.phase {
                JobPhase::AwaitDismissal { handle, issued_at } => (handle, issued_at),
                _ => return,
            }
        };

        if now.duration_since(issued_at) >= self.config.hard_timeout() {
            self.fail("timed out waiting for the confirmation dialog to close".to_owned());
            return;
        }

        if self.dialogs.is_visible(&handle) {
            self.schedule(Some(self.config.poll_interval()), Step::DismissalPoll);
            return;
        }

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !matches!(state.phase, JobPhase::AwaitDismissal { .. }) {
                return;
            }
            state.phase = JobPhase::Issue;
        }
        self.schedule(Some(self.config.poll_interval()), Step::Issue);
    }

    // ─── Terminal transitions ─────────────────────────────────────────────────

    fn fail(&self, message: String) {
        let persist = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if !state.phase.is_active() {
                return;
            }
            error!("discard job failed: {message}");
            self.finish_with(&mut state, RunOutcome::Failed, Some(message))
        };
        self.persist_history(persist);
    }

    /// Move to a terminal phase and append the run record. Returns the
    /// persistence job for the caller to run outside the state lock.
    fn finish_with(
        &self,
        state: &mut PipelineState,
        outcome: RunOutcome,
        message: Option<String>,
    ) -> Option<PersistJob> {
        state.phase = JobPhase::Done {
            outcome,
            message: message.clone(),
        };
        state.history.push(DiscardRunRecord {
            outcome,
            discarded: state.progress,
            total: state.items.len(),
            message,
            finished_at: now_epoch_secs(),
        });

        let limit = self.config.history_limit.max(1);
        if state.history.len() > limit {
            let drop_count = state.history.len() - limit;
            state.history.drain(0..drop_count);
        }

        state
            .history_path
            .clone()
            .map(|path| (state.history.clone(), path))
    }

    fn persist_history(&self, job: Option<PersistJob>) {
        if let Some((history, path)) = job {
            if let Err(e) = save_history_to_path(&path, &history) {
                error!("cannot persist discard history: {e}");
            }
        }
    }
}

fn load_history_from_path(path: &Path) -> Result<Vec<DiscardRunRecord>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(MiddenError::History(format!("cannot read history: {e}")));
        }
    };
    serde_json::from_slice(&bytes)
        .map_err(|e| MiddenError::History(format!("cannot parse history: {e}")))
}

fn save_history_to_path(path: &Path, history: &[DiscardRunRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| MiddenError::History(format!("cannot create history dir: {e}")))?;
    }

    let json = serde_json::to_string_pretty(history)
        .map_err(|e| MiddenError::History(format!("cannot serialize history: {e}")))?;

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json)
        .map_err(|e| MiddenError::History(format!("cannot write history temp file: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| MiddenError::History(format!("cannot finalize history file: {e}")))?;
    Ok(())
}

/// Returns current UTC seconds since epoch.
fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
