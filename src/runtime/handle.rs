use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    core::{
        batch::{SaveGate, SaveOutcome, SaveTicket, save_all},
        calendar::{
            CalendarError, LoadRequest, MealCalendar, MonthLoad, MonthSwitch, MonthSwitchPolicy,
            load_month,
        },
    },
    meal::{MealRecord, MonthlyView, UserProfile},
    persist::{RecordStore, StoreError, UserDirectory},
    session::{AuthError, IdentityProvider},
    types::{MealStatus, YearMonth},
};

use super::events::MealEvent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error("a save is already in progress")]
    SaveInFlight,
    #[error("no failed records to retry")]
    NothingToRetry,
    #[error("meal runtime is not running")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub fetch_timeout_ms: u64,
    pub upsert_timeout_ms: u64,
    pub command_queue_bound: usize,
    pub event_capacity: usize,
    pub month_switch: MonthSwitchPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            upsert_timeout_ms: 10_000,
            command_queue_bound: 256,
            event_capacity: 1024,
            month_switch: MonthSwitchPolicy::WarnAndDiscard,
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON object; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    fn upsert_timeout(&self) -> Duration {
        Duration::from_millis(self.upsert_timeout_ms)
    }
}

/// How a month fetch ended, as seen by the caller that asked for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub month: YearMonth,
    /// Records applied (zero on failure).
    pub records: usize,
    /// Unsaved edits the load replaced.
    pub discarded: usize,
    pub error: Option<StoreError>,
    /// The month was switched away before the fetch finished.
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthChange {
    pub switch: MonthSwitch,
    pub load: LoadReport,
}

#[derive(Clone)]
pub struct MealScreenHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<MealEvent>,
    gate: SaveGate,
    profile: UserProfile,
    initial_load: LoadReport,
}

enum Command {
    Cycle {
        date: NaiveDate,
        resp: oneshot::Sender<Result<MealStatus, RuntimeError>>,
    },
    Status {
        date: NaiveDate,
        resp: oneshot::Sender<MealStatus>,
    },
    View {
        resp: oneshot::Sender<MonthlyView>,
    },
    SwitchMonth {
        delta: i32,
        resp: oneshot::Sender<MonthChange>,
    },
    Reload {
        resp: oneshot::Sender<LoadReport>,
    },
    SaveAll {
        resp: oneshot::Sender<Result<SaveOutcome, RuntimeError>>,
    },
    RetryFailed {
        resp: oneshot::Sender<Result<SaveOutcome, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

enum LoadReply {
    Reload(oneshot::Sender<LoadReport>),
    Switch(MonthSwitch, oneshot::Sender<MonthChange>),
}

enum Completion {
    Loaded {
        load: MonthLoad,
        reply: LoadReply,
    },
    Saved {
        outcome: SaveOutcome,
        ticket: SaveTicket,
        resp: oneshot::Sender<Result<SaveOutcome, RuntimeError>>,
    },
}

/// Opens the meal screen on the current local month.
pub async fn open_meal_screen(
    store: Arc<dyn RecordStore>,
    users: Arc<dyn UserDirectory>,
    identity: Arc<dyn IdentityProvider>,
    config: RuntimeConfig,
) -> Result<MealScreenHandle, RuntimeError> {
    open_meal_screen_at(store, users, identity, config, YearMonth::current()).await
}

/// Opens the meal screen on `month`.
///
/// Requires a signed-in identity and an existing profile; a missing profile
/// invalidates the session. Returns after the first month load settled.
pub async fn open_meal_screen_at(
    store: Arc<dyn RecordStore>,
    users: Arc<dyn UserDirectory>,
    identity: Arc<dyn IdentityProvider>,
    config: RuntimeConfig,
    month: YearMonth,
) -> Result<MealScreenHandle, RuntimeError> {
    let owner = identity.require_owner_id()?;

    let profile = match tokio::time::timeout(config.fetch_timeout(), users.get_user(&owner)).await {
        Ok(Ok(profile)) => profile,
        Ok(Err(err @ StoreError::NotFound(_))) => {
            warn!(%owner, "no profile for signed-in owner, invalidating session");
            identity.invalidate();
            return Err(err.into());
        }
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => {
            return Err(StoreError::Timeout {
                after_ms: config.fetch_timeout_ms,
            }
            .into());
        }
    };

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<MealEvent>(config.event_capacity.max(1));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
    let gate = SaveGate::new();

    let mut screen = ScreenLoop {
        calendar: MealCalendar::new(owner, month, config.month_switch),
        store,
        gate: gate.clone(),
        events_tx: events_tx.clone(),
        done_tx,
        last_partial: None,
        config,
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if screen.handle_command(cmd) {
                        break;
                    }
                }
                Some(done) = done_rx.recv() => {
                    screen.handle_completion(done);
                }
            }
        }
        debug!("meal screen runtime stopped");
    });

    info!(owner = %profile.id, %month, "meal screen opened");

    let mut handle = MealScreenHandle {
        cmd_tx,
        events_tx,
        gate,
        profile,
        initial_load: LoadReport {
            month,
            records: 0,
            discarded: 0,
            error: None,
            stale: false,
        },
    };
    handle.initial_load = handle.reload().await?;
    Ok(handle)
}

impl MealScreenHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MealEvent> {
        self.events_tx.subscribe()
    }

    /// Profile of the signed-in owner.
    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Outcome of the load performed while opening.
    pub fn initial_load(&self) -> &LoadReport {
        &self.initial_load
    }

    /// True while a batch save is in flight; the save control should be disabled.
    pub fn save_in_flight(&self) -> bool {
        self.gate.is_busy()
    }

    pub async fn cycle_status(&self, date: NaiveDate) -> Result<MealStatus, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Cycle { date, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn effective_status(&self, date: NaiveDate) -> Result<MealStatus, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Status { date, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    pub async fn view(&self) -> Result<MonthlyView, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::View { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Moves the displayed month and waits for its load to settle.
    pub async fn switch_month(&self, delta: i32) -> Result<MonthChange, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SwitchMonth { delta, resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Refetches the displayed month. There is no automatic retry after a failed load.
    pub async fn reload(&self) -> Result<LoadReport, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Reload { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Persists every record in the displayed month's mapping.
    pub async fn save_all(&self) -> Result<SaveOutcome, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::SaveAll { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    /// Re-sends the failures of the last partially failed save, taking each
    /// date's current status when the displayed month still holds it.
    pub async fn retry_failed(&self) -> Result<SaveOutcome, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::RetryFailed { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)?
    }

    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown { resp: tx })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// State owned by the runtime task; the calendar is never touched elsewhere.
struct ScreenLoop {
    calendar: MealCalendar,
    store: Arc<dyn RecordStore>,
    gate: SaveGate,
    events_tx: broadcast::Sender<MealEvent>,
    done_tx: mpsc::UnboundedSender<Completion>,
    last_partial: Option<SaveOutcome>,
    config: RuntimeConfig,
}

impl ScreenLoop {
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Cycle { date, resp } => {
                let res = self.calendar.cycle_status(date).map_err(RuntimeError::from);
                if let Ok(status) = res {
                    let _ = self.events_tx.send(MealEvent::StatusChanged { date, status });
                }
                let _ = resp.send(res);
            }
            Command::Status { date, resp } => {
                let _ = resp.send(self.calendar.effective_status(date));
            }
            Command::View { resp } => {
                let _ = resp.send(self.calendar.view());
            }
            Command::SwitchMonth { delta, resp } => {
                let switch = self.calendar.switch_month(delta);
                if switch.discarded > 0 {
                    let _ = self.events_tx.send(MealEvent::UnsavedDiscarded {
                        month: switch.from,
                        count: switch.discarded,
                    });
                }
                let _ = self.events_tx.send(MealEvent::MonthChanged {
                    from: switch.from,
                    to: switch.to,
                });
                let request = self.calendar.begin_load();
                self.start_load(request, LoadReply::Switch(switch, resp));
            }
            Command::Reload { resp } => {
                let request = self.calendar.begin_load();
                self.start_load(request, LoadReply::Reload(resp));
            }
            Command::SaveAll { resp } => {
                let Some(ticket) = self.gate.try_begin() else {
                    let _ = resp.send(Err(RuntimeError::SaveInFlight));
                    return false;
                };
                let records = self.calendar.begin_save();
                self.start_save(ticket, records, resp);
            }
            Command::RetryFailed { resp } => {
                let Some(ticket) = self.gate.try_begin() else {
                    let _ = resp.send(Err(RuntimeError::SaveInFlight));
                    return false;
                };
                let Some(previous) = self.last_partial.take() else {
                    let _ = resp.send(Err(RuntimeError::NothingToRetry));
                    return false;
                };
                let records = self.calendar.begin_retry(previous.failed());
                self.start_save(ticket, records, resp);
            }
            Command::Shutdown { resp } => {
                let _ = resp.send(());
                return true;
            }
        }

        false
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::Loaded { load, reply } => {
                let month = load.month;
                let records = load.records.len();
                let error = load.error.clone();
                let applied = self.calendar.apply_load(load);

                if let Some(discarded) = applied {
                    if discarded > 0 {
                        let _ = self.events_tx.send(MealEvent::UnsavedDiscarded {
                            month,
                            count: discarded,
                        });
                    }
                    let evt = match &error {
                        Some(error) => MealEvent::LoadFailed {
                            month,
                            error: error.clone(),
                        },
                        None => MealEvent::MonthLoaded { month, records },
                    };
                    let _ = self.events_tx.send(evt);
                }

                let report = LoadReport {
                    month,
                    records: if applied.is_some() && error.is_none() { records } else { 0 },
                    discarded: applied.unwrap_or(0),
                    error,
                    stale: applied.is_none(),
                };
                match reply {
                    LoadReply::Reload(resp) => {
                        let _ = resp.send(report);
                    }
                    LoadReply::Switch(switch, resp) => {
                        let _ = resp.send(MonthChange {
                            switch,
                            load: report,
                        });
                    }
                }
            }
            Completion::Saved {
                outcome,
                ticket,
                resp,
            } => {
                self.calendar.finish_save(outcome.saved());
                self.last_partial = (outcome.failure_count() > 0).then(|| outcome.clone());
                drop(ticket);
                let _ = self.events_tx.send(MealEvent::SaveFinished {
                    outcome: outcome.clone(),
                });
                let _ = resp.send(Ok(outcome));
            }
        }
    }

    fn start_load(&self, request: LoadRequest, reply: LoadReply) {
        let store = Arc::clone(&self.store);
        let owner = self.calendar.owner().clone();
        let timeout = self.config.fetch_timeout();
        let done_tx = self.done_tx.clone();
        debug!(month = %request.month, seq = request.seq, "loading meal month");

        tokio::spawn(async move {
            let load = load_month(store.as_ref(), &owner, request, timeout).await;
            let _ = done_tx.send(Completion::Loaded { load, reply });
        });
    }

    fn start_save(
        &self,
        ticket: SaveTicket,
        records: Vec<MealRecord>,
        resp: oneshot::Sender<Result<SaveOutcome, RuntimeError>>,
    ) {
        let store = Arc::clone(&self.store);
        let per_call = self.config.upsert_timeout();
        let done_tx = self.done_tx.clone();
        let _ = self.events_tx.send(MealEvent::SaveStarted {
            total: records.len(),
        });

        tokio::spawn(async move {
            let outcome = save_all(store.as_ref(), records, per_call).await;
            let _ = done_tx.send(Completion::Saved {
                outcome,
                ticket,
                resp,
            });
        });
    }
}
