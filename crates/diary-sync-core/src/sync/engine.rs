//! Sync engine
//!
//! Drives the `Stopped → Idle → Syncing → Idle | ConflictPending | Error`
//! state machine. A background scheduler task fires cycles on the configured
//! period; hosts can also force a cycle, resolve conflicts and report
//! connectivity. `SyncEngine` is a cheap handle, and clones drive the same
//! engine.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::EngineOptions;
use crate::db::StateRepository;
use crate::error::{Error, Result};
use crate::models::{
    ChangeAction, ChangeId, ConflictId, ConflictType, DeviceIdentity, EngineState,
    HistoryAction, QueuedChange, Record, RecordId, Resolution, SyncConfig, SyncConflict,
    SyncHistoryEntry, SyncStatus,
};
use crate::util::{add_duration, compact_text, duration_millis, unix_millis_now};

use super::config_store::SyncConfigStore;
use super::conflicts::ConflictStore;
use super::device::load_device_identity;
use super::history::SyncHistoryLog;
use super::queue::{coalesce, Coalesced, OfflineChangeQueue};
use super::reconcile::{apply_resolution_policy, merge_records, reconcile};
use super::remote::{DiaryStore, PushRequest, RemoteStore};
use super::status::StatusHandle;

const PROGRESS_DRAINED: u8 = 25;
const PROGRESS_EXCHANGED: u8 = 50;
const PROGRESS_CHECKED: u8 = 75;
const PROGRESS_DONE: u8 = 100;

/// Outcome of `SyncEngine::force_sync`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceSyncOutcome {
    /// A cycle ran; failures are reported inside the report
    Completed(CycleReport),
    /// Another cycle is in flight
    AlreadyRunning,
    /// The engine is stopped
    NotRunning,
    /// The host reported no connectivity
    Offline,
}

/// Summary of one sync cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Changes the remote acknowledged
    pub pushed: usize,
    /// Remote records applied locally
    pub pulled: usize,
    /// Queue entries removed
    pub acknowledged: usize,
    /// Conflicts detected or decided during the cycle
    pub conflicts: Vec<ConflictId>,
    /// New conflicts left waiting for a decision
    pub detected: usize,
    /// Conflicts still waiting for a decision after the cycle
    pub unresolved: usize,
    /// Serialized bytes exchanged with the remote
    pub data_size: u64,
    pub duration_ms: u64,
    /// Failure cause, when the cycle did not complete
    pub error: Option<String>,
}

impl CycleReport {
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Handle to a sync engine
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    remote: Arc<dyn RemoteStore>,
    diary: Arc<dyn DiaryStore>,
    options: EngineOptions,
    device: DeviceIdentity,
    config: SyncConfigStore,
    queue: OfflineChangeQueue,
    conflicts: ConflictStore,
    history: SyncHistoryLog,
    status: StatusHandle,
    state: Mutex<EngineState>,
    syncing: AtomicBool,
    online: AtomicBool,
    scheduler: Mutex<Option<watch::Sender<bool>>>,
    cursor: Mutex<PullCursor>,
}

/// Where the next pull resumes
#[derive(Default)]
struct PullCursor {
    /// Taken just before the last successful pull
    since: Option<i64>,
    /// Records the last successful cycle pushed; they come back on the next pull
    echoes: Vec<Record>,
}

impl SyncEngine {
    /// Load persisted sync state and build a stopped engine
    pub async fn open(
        repo: Arc<dyn StateRepository>,
        remote: Arc<dyn RemoteStore>,
        diary: Arc<dyn DiaryStore>,
        options: EngineOptions,
    ) -> Result<Self> {
        options.validate()?;

        let status = StatusHandle::new();
        let device = load_device_identity(&repo).await?;
        let config = SyncConfigStore::load(repo.clone()).await?;
        let history = SyncHistoryLog::load(repo.clone(), options.history_capacity).await?;
        let conflicts = ConflictStore::load(repo.clone(), history.clone()).await?;
        let queue = OfflineChangeQueue::load(repo, status.clone(), options.queue_capacity).await?;

        let open_conflicts = conflicts.open_count();
        status.update(|s| s.open_conflicts = open_conflicts);
        tracing::info!(
            "Sync engine ready for {} ({} queued changes, {} open conflicts)",
            device.device_name,
            queue.len(),
            open_conflicts
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                remote,
                diary,
                options,
                device,
                config,
                queue,
                conflicts,
                history,
                status,
                state: Mutex::new(EngineState::Stopped),
                syncing: AtomicBool::new(false),
                online: AtomicBool::new(true),
                scheduler: Mutex::new(None),
                cursor: Mutex::new(PullCursor::default()),
            }),
        })
    }

    /// Validate and persist `config`, then arm the scheduler.
    ///
    /// Calling `start` again replaces the running scheduler. A disabled
    /// config is persisted and leaves the engine stopped.
    pub async fn start(&self, config: SyncConfig) -> Result<()> {
        let inner = &self.inner;
        inner.config.save(config.clone()).await?;
        inner.disarm();

        if !config.enabled {
            tracing::info!("Sync disabled; engine stays stopped");
            inner.enter_stopped();
            return Ok(());
        }

        let period = config.period(inner.options.realtime_poll());
        inner.arm(period);
        inner.enter_running(period);
        tracing::info!(
            "Sync engine started: frequency={:?}, period={:?}",
            config.frequency,
            period
        );
        Ok(())
    }

    /// Disarm the scheduler. An in-flight cycle finishes but does not
    /// reschedule.
    pub fn stop(&self) {
        self.inner.disarm();
        self.inner.enter_stopped();
        tracing::info!("Sync engine stopped");
    }

    /// Run one cycle now, outside the schedule
    pub async fn force_sync(&self) -> ForceSyncOutcome {
        self.inner.try_sync().await
    }

    /// Resolve a conflict and apply the decision to the diary data.
    ///
    /// Returns `false` when the conflict is unknown or already resolved.
    pub async fn resolve_conflict(&self, id: ConflictId, resolution: Resolution) -> Result<bool> {
        self.inner.resolve_conflict(id, resolution).await
    }

    /// Report host connectivity. Coming back online triggers a cycle.
    pub async fn set_online(&self, online: bool) -> Option<ForceSyncOutcome> {
        let inner = &self.inner;
        let was_online = inner.online.swap(online, Ordering::SeqCst);
        let running = inner.current_state() != EngineState::Stopped;
        inner.status.update(|s| s.connected = online && running);

        if was_online == online {
            return None;
        }
        if !online {
            tracing::info!("Host went offline; local changes keep queuing");
            return None;
        }

        tracing::info!("Host back online");
        if running {
            Some(self.force_sync().await)
        } else {
            None
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Current status snapshot
    pub fn status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn state(&self) -> EngineState {
        self.inner.current_state()
    }

    pub fn device(&self) -> &DeviceIdentity {
        &self.inner.device
    }

    /// Stored sync policy
    pub fn config(&self) -> SyncConfig {
        self.inner.config.current()
    }

    /// Queue that call sites feed local mutations into
    pub fn queue(&self) -> &OfflineChangeQueue {
        &self.inner.queue
    }

    pub fn conflicts(&self) -> &ConflictStore {
        &self.inner.conflicts
    }

    pub fn history(&self) -> &SyncHistoryLog {
        &self.inner.history
    }
}

/// Holds the single-cycle slot; releasing it clears `syncing`
struct CycleGuard<'a> {
    engine: &'a EngineInner,
}

impl<'a> CycleGuard<'a> {
    fn acquire(engine: &'a EngineInner) -> Option<Self> {
        engine
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        engine.status.update(|s| s.syncing = true);
        Some(Self { engine })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.engine.syncing.store(false, Ordering::Release);
        self.engine.status.update(|s| s.syncing = false);
    }
}

/// What a cycle decided to send and apply
#[derive(Default)]
struct CyclePlan {
    outgoing: Vec<QueuedChange>,
    incoming: Vec<Record>,
    settled: Vec<ChangeId>,
    decided: Vec<(ConflictId, Resolution)>,
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_scheduler(&self) -> MutexGuard<'_, Option<watch::Sender<bool>>> {
        self.scheduler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cursor(&self) -> MutexGuard<'_, PullCursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_state(&self) -> EngineState {
        *self.lock_state()
    }

    /// Move to `next` unless the engine was stopped meanwhile
    fn transition(&self, next: EngineState) {
        let mut state = self.lock_state();
        if *state == EngineState::Stopped || *state == next {
            return;
        }
        tracing::debug!("Sync engine {:?} -> {:?}", *state, next);
        *state = next;
        self.status.update(|s| s.state = next);
    }

    fn enter_running(&self, period: Duration) {
        let mut state = self.lock_state();
        if *state == EngineState::Stopped {
            *state = EngineState::Idle;
        }
        let current = *state;
        let online = self.online.load(Ordering::SeqCst);
        let next_sync = add_duration(unix_millis_now(), period);
        self.status.update(|s| {
            s.state = current;
            s.connected = online;
            s.next_sync = Some(next_sync);
        });
    }

    fn enter_stopped(&self) {
        let mut state = self.lock_state();
        *state = EngineState::Stopped;
        self.status.update(|s| {
            s.state = EngineState::Stopped;
            s.connected = false;
            s.next_sync = None;
        });
    }

    fn arm(self: &Arc<Self>, period: Duration) {
        let (shutdown, signal) = watch::channel(false);
        if let Some(previous) = self.lock_scheduler().replace(shutdown) {
            previous.send_replace(true);
        }
        tokio::spawn(run_scheduler(Arc::downgrade(self), period, signal));
    }

    fn disarm(&self) {
        if let Some(shutdown) = self.lock_scheduler().take() {
            shutdown.send_replace(true);
        }
    }

    fn set_progress(&self, percent: u8) {
        self.status.update(|s| s.progress_percent = percent);
    }

    async fn scheduled_tick(&self) {
        match self.try_sync().await {
            ForceSyncOutcome::Offline => self.offline_tick().await,
            ForceSyncOutcome::AlreadyRunning => {
                tracing::debug!("Skipping scheduled sync; a cycle is already running");
            }
            ForceSyncOutcome::Completed(_) | ForceSyncOutcome::NotRunning => {}
        }
    }

    async fn offline_tick(&self) {
        let config = self.config.current();
        if config.offline_support {
            tracing::debug!("Skipping scheduled sync while offline");
            self.schedule_next(&config);
            return;
        }

        let message = "Device is offline".to_string();
        tracing::warn!("Scheduled sync failed: {}", message);
        self.record_history(SyncHistoryEntry::new(HistoryAction::SyncError, message.clone()))
            .await;
        self.status.update(|s| s.last_error = Some(message));
        self.transition(EngineState::Error);
        self.schedule_next(&config);
    }

    async fn try_sync(&self) -> ForceSyncOutcome {
        if self.current_state() == EngineState::Stopped {
            return ForceSyncOutcome::NotRunning;
        }
        if !self.online.load(Ordering::SeqCst) {
            return ForceSyncOutcome::Offline;
        }
        let Some(_guard) = CycleGuard::acquire(self) else {
            return ForceSyncOutcome::AlreadyRunning;
        };
        if !self.current_state().accepts_trigger() {
            return ForceSyncOutcome::NotRunning;
        }
        ForceSyncOutcome::Completed(self.perform_cycle().await)
    }

    /// One full cycle. Failures end up in the report, history and status.
    async fn perform_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let config = self.config.current();
        self.transition(EngineState::Syncing);
        self.set_progress(0);
        tracing::info!("Sync cycle started ({} pending changes)", self.queue.len());

        let mut report = CycleReport::default();
        let result = self.exchange(&config, &mut report).await;

        report.duration_ms = duration_millis(started.elapsed());
        report.unresolved = self.conflicts.open_count();
        let open_conflicts = report.unresolved;
        let finished_at = unix_millis_now();

        match result {
            Ok(()) => {
                let action = if report.detected > 0 {
                    HistoryAction::ConflictDetected
                } else {
                    HistoryAction::SyncSuccess
                };
                let next = if open_conflicts > 0 {
                    EngineState::ConflictPending
                } else {
                    EngineState::Idle
                };
                let details = format!(
                    "Pushed {}, pulled {}, {} conflicts awaiting a decision",
                    report.pushed, report.pulled, open_conflicts
                );
                self.record_history(
                    SyncHistoryEntry::new(action, details)
                        .with_data_size(report.data_size)
                        .with_duration_ms(report.duration_ms),
                )
                .await;
                self.status.update(|s| {
                    s.last_sync = Some(finished_at);
                    s.last_error = None;
                    s.open_conflicts = open_conflicts;
                    s.progress_percent = PROGRESS_DONE;
                });
                self.transition(next);
                tracing::info!(
                    "Sync cycle finished in {}ms: pushed={}, pulled={}, open_conflicts={}",
                    report.duration_ms,
                    report.pushed,
                    report.pulled,
                    open_conflicts
                );
            }
            Err(error) => {
                let message = compact_text(&error.to_string());
                tracing::error!(
                    "Sync cycle failed after {}ms (retryable={}): {}",
                    report.duration_ms,
                    error.is_retryable(),
                    message
                );
                self.record_history(
                    SyncHistoryEntry::new(HistoryAction::SyncError, message.clone())
                        .with_data_size(report.data_size)
                        .with_duration_ms(report.duration_ms),
                )
                .await;
                self.status.update(|s| {
                    s.last_error = Some(message.clone());
                    s.open_conflicts = open_conflicts;
                });
                self.transition(EngineState::Error);
                report.error = Some(message);
            }
        }

        self.schedule_next(&config);
        self.reset_progress_later();
        report
    }

    async fn exchange(&self, config: &SyncConfig, report: &mut CycleReport) -> Result<()> {
        self.history
            .append(SyncHistoryEntry::new(
                HistoryAction::SyncStart,
                format!("Sync started on {}", self.device.device_name),
            ))
            .await?;

        let queued = self.queue.drain();
        let Coalesced { changes, folded } = coalesce(&queued);
        let (since, mut own_writes) = {
            let cursor = self.lock_cursor();
            (cursor.since, cursor.echoes.clone())
        };
        own_writes.extend(
            queued
                .iter()
                .filter(|change| change.attempted)
                .map(QueuedChange::effective_record),
        );
        let baseline = if since.is_none() {
            self.diary.list_local().await?
        } else {
            Vec::new()
        };
        self.set_progress(PROGRESS_DRAINED);

        let pulled_at = unix_millis_now();
        let remote = self.call_remote(self.remote.pull(since)).await?;
        report.data_size += encoded_size(&remote)?;
        self.set_progress(PROGRESS_EXCHANGED);

        let plan = self
            .plan(config, &changes, folded, baseline, &remote, &own_writes, report)
            .await?;
        self.set_progress(PROGRESS_CHECKED);

        let acks = if plan.outgoing.is_empty() {
            Vec::new()
        } else {
            report.data_size += encoded_size(plan.outgoing.iter().map(|c| &c.payload))?;
            let sent: Vec<ChangeId> = plan.outgoing.iter().map(|change| change.id).collect();
            self.queue.mark_attempted(&sent).await?;
            self.call_remote(self.remote.push(PushRequest {
                device: &self.device,
                changes: &plan.outgoing,
                encryption: config.encryption,
                compression: config.compression,
            }))
            .await?
        };

        let echoes: Vec<Record> = plan
            .outgoing
            .iter()
            .map(QueuedChange::effective_record)
            .collect();
        for record in &plan.incoming {
            self.diary.apply_remote(record).await?;
        }
        for (id, resolution) in plan.decided {
            self.conflicts.resolve(id, resolution).await?;
        }

        let mut settled = plan.settled;
        settled.extend(acks.iter().map(|ack| ack.change_id));
        report.pushed = acks.len();
        report.pulled = plan.incoming.len();
        report.acknowledged = self.queue.acknowledge(&settled).await?;

        *self.lock_cursor() = PullCursor {
            since: Some(pulled_at),
            echoes,
        };
        Ok(())
    }

    /// Reconcile and turn every difference into outgoing changes, incoming
    /// records and queue entries to settle.
    ///
    /// `own_writes` are copies this device already handed to the remote; a
    /// remote copy equal to one of them is not a concurrent change.
    #[allow(clippy::too_many_arguments)]
    async fn plan(
        &self,
        config: &SyncConfig,
        changes: &[QueuedChange],
        folded: Vec<ChangeId>,
        baseline: Vec<Record>,
        remote: &[Record],
        own_writes: &[Record],
        report: &mut CycleReport,
    ) -> Result<CyclePlan> {
        let intents: HashMap<&RecordId, &QueuedChange> = changes
            .iter()
            .map(|change| (&change.payload.id, change))
            .collect();
        let remote_ids: HashSet<&RecordId> = remote.iter().map(|record| &record.id).collect();

        // Untracked local records only matter where the remote has no copy.
        let mut local: Vec<Record> = changes.iter().map(QueuedChange::effective_record).collect();
        local.extend(baseline.into_iter().filter(|record| {
            !intents.contains_key(&record.id) && !remote_ids.contains(&record.id)
        }));

        let reconciliation = reconcile(&local, remote)?;
        let held = self.conflicts.open_record_ids();
        let mut plan = CyclePlan {
            settled: folded,
            ..CyclePlan::default()
        };

        for record in reconciliation.to_push {
            if held.contains(&record.id) && intents.contains_key(&record.id) {
                self.supersede(&mut plan, &record.id, report);
            }
            plan.outgoing.push(outgoing_change(&intents, record));
        }
        for id in &reconciliation.in_sync {
            if let Some(intent) = intents.get(id) {
                plan.settled.push(intent.id);
            }
        }
        for record in reconciliation.to_pull {
            if own_writes.contains(&record) {
                continue;
            }
            if held.contains(&record.id) {
                tracing::debug!("Holding remote copy of {} until its conflict is resolved", record.id);
                continue;
            }
            if self.conflicts.decision_for(&record) == Some(Resolution::Discard) {
                continue;
            }
            plan.incoming.push(record);
        }

        for candidate in reconciliation.conflicts {
            let intent = intents.get(&candidate.local.id).copied();
            let settle = intent.map(|change| change.id);

            if own_writes.contains(&candidate.remote) {
                tracing::debug!(
                    "Remote copy of {} is this device's earlier write",
                    candidate.local.id
                );
                if held.contains(&candidate.local.id) {
                    self.supersede(&mut plan, &candidate.local.id, report);
                }
                plan.outgoing.push(outgoing_change(&intents, candidate.local));
                continue;
            }

            if matches!(
                self.conflicts.decision_for(&candidate.remote),
                Some(Resolution::KeepLocal | Resolution::Merge)
            ) {
                plan.outgoing.push(outgoing_change(&intents, candidate.local));
                continue;
            }

            let conflict_type = match (candidate.conflict_type, intent.map(|c| c.action)) {
                (ConflictType::Update, Some(ChangeAction::Create)) => ConflictType::Create,
                (conflict_type, _) => conflict_type,
            };
            let mut fresh = false;
            let id = match self.conflicts.find_open(&candidate.local, &candidate.remote) {
                Some(existing) => existing,
                None => {
                    fresh = true;
                    tracing::warn!(
                        "Conflict detected on record {} ({:?})",
                        candidate.local.id,
                        conflict_type
                    );
                    self.conflicts
                        .record(SyncConflict::new(
                            conflict_type,
                            candidate.local.clone(),
                            candidate.remote.clone(),
                        ))
                        .await?
                }
            };
            report.conflicts.push(id);

            let Some(resolution) = apply_resolution_policy(
                config.conflict_resolution,
                &candidate.local,
                &candidate.remote,
            ) else {
                if fresh {
                    report.detected += 1;
                }
                plan.settled.extend(settle);
                continue;
            };

            plan.decided.push((id, resolution));
            match resolution {
                Resolution::KeepLocal => {
                    plan.outgoing.push(outgoing_change(&intents, candidate.local));
                }
                Resolution::KeepRemote => {
                    plan.incoming.push(candidate.remote);
                    plan.settled.extend(settle);
                }
                Resolution::Merge => {
                    let merged = merge_records(&candidate.local, &candidate.remote);
                    plan.outgoing
                        .push(QueuedChange::new(ChangeAction::Update, merged.clone()));
                    plan.incoming.push(merged);
                    plan.settled.extend(settle);
                }
                Resolution::Discard => plan.settled.extend(settle),
            }
        }

        Ok(plan)
    }

    /// A newer local edit replaces the local side of open conflicts on the
    /// record; they close as `KeepLocal` once the push succeeds.
    fn supersede(&self, plan: &mut CyclePlan, record_id: &RecordId, report: &mut CycleReport) {
        for id in self.conflicts.open_for(record_id) {
            tracing::debug!("Newer local edit of {} supersedes conflict {}", record_id, id);
            plan.decided.push((id, Resolution::KeepLocal));
            report.conflicts.push(id);
        }
    }

    async fn call_remote<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.options.remote_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::Timeout(limit))?
    }

    async fn resolve_conflict(&self, id: ConflictId, resolution: Resolution) -> Result<bool> {
        let Some(conflict) = self.conflicts.get(id) else {
            return Ok(false);
        };
        if !self.conflicts.resolve(id, resolution).await? {
            return Ok(false);
        }

        let now = unix_millis_now();
        match resolution {
            Resolution::KeepRemote => self.diary.apply_remote(&conflict.remote_version).await?,
            Resolution::KeepLocal => {
                let local = conflict.local_version.with_updated_at(now);
                self.queue.enqueue(action_for(&local), local).await?;
            }
            Resolution::Merge => {
                let merged = merge_records(&conflict.local_version, &conflict.remote_version)
                    .with_updated_at(now);
                self.diary.apply_remote(&merged).await?;
                self.queue.enqueue(ChangeAction::Update, merged).await?;
            }
            Resolution::Discard => {}
        }
        tracing::info!(
            "Conflict {} on record {} resolved with {:?}",
            id,
            conflict.record_id,
            resolution
        );

        let open_conflicts = self.conflicts.open_count();
        self.status.update(|s| s.open_conflicts = open_conflicts);
        if open_conflicts == 0 {
            let mut state = self.lock_state();
            if *state == EngineState::ConflictPending {
                *state = EngineState::Idle;
                self.status.update(|s| s.state = EngineState::Idle);
            }
        }
        Ok(true)
    }

    async fn record_history(&self, entry: SyncHistoryEntry) {
        if let Err(error) = self.history.append(entry).await {
            tracing::warn!("Failed to record sync history: {}", error);
        }
    }

    fn schedule_next(&self, config: &SyncConfig) {
        let state = self.lock_state();
        let next_sync = (*state != EngineState::Stopped).then(|| {
            add_duration(unix_millis_now(), config.period(self.options.realtime_poll()))
        });
        self.status.update(|s| s.next_sync = next_sync);
    }

    fn reset_progress_later(&self) {
        let status = self.status.clone();
        let grace = self.options.progress_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            status.update(|s| {
                if !s.syncing {
                    s.progress_percent = 0;
                }
            });
        });
    }
}

async fn run_scheduler(
    engine: Weak<EngineInner>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Sync scheduler armed: period={:?}", period);
    loop {
        tokio::select! {
            () = tokio::time::sleep(period) => {}
            _ = shutdown.changed() => break,
        }
        let Some(engine) = engine.upgrade() else {
            break;
        };
        tracing::debug!("Sync scheduler tick");
        engine.scheduled_tick().await;
    }
    tracing::debug!("Sync scheduler disarmed");
}

/// Queued change carrying `record`, reusing the queued ID when there is one
fn outgoing_change(intents: &HashMap<&RecordId, &QueuedChange>, record: Record) -> QueuedChange {
    match intents.get(&record.id) {
        Some(intent) => QueuedChange {
            payload: record,
            ..(*intent).clone()
        },
        None => {
            let action = if record.deleted {
                ChangeAction::Delete
            } else {
                ChangeAction::Create
            };
            QueuedChange::new(action, record)
        }
    }
}

const fn action_for(record: &Record) -> ChangeAction {
    if record.deleted {
        ChangeAction::Delete
    } else {
        ChangeAction::Update
    }
}

fn encoded_size<'a>(records: impl IntoIterator<Item = &'a Record>) -> Result<u64> {
    let mut total = 0_u64;
    for record in records {
        total = total.saturating_add(u64::try_from(record.encoded_len()?).unwrap_or(u64::MAX));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LibSqlStateRepository, MemoryStateRepository};
    use crate::models::{ConflictResolutionMode, DiaryEntry};
    use crate::sync::conflicts::ConflictFilter;
    use crate::sync::remote::fakes::{FakeDiary, FakeRemote};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    struct Harness {
        engine: SyncEngine,
        remote: Arc<FakeRemote>,
        diary: Arc<FakeDiary>,
    }

    async fn harness(remote: FakeRemote, diary: FakeDiary) -> Harness {
        init_tracing();
        let remote = Arc::new(remote);
        let diary = Arc::new(diary);
        let engine = SyncEngine::open(
            Arc::new(MemoryStateRepository::new()),
            remote.clone(),
            diary.clone(),
            EngineOptions::default(),
        )
        .await
        .unwrap();
        Harness {
            engine,
            remote,
            diary,
        }
    }

    async fn started(remote: FakeRemote, diary: FakeDiary, config: SyncConfig) -> Harness {
        let harness = harness(remote, diary).await;
        harness.engine.start(config).await.unwrap();
        harness
    }

    fn titled(id: &str, title: &str) -> Record {
        Record::diary(id, DiaryEntry::titled(title))
    }

    fn body(id: &str, text: &str, updated_at: i64) -> Record {
        Record::diary(id, DiaryEntry::with_body(text)).with_updated_at(updated_at)
    }

    fn report(outcome: ForceSyncOutcome) -> CycleReport {
        match outcome {
            ForceSyncOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn open_starts_stopped() {
        let h = harness(FakeRemote::default(), FakeDiary::default()).await;

        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert!(!h.engine.status().connected);
        assert_eq!(h.engine.force_sync().await, ForceSyncOutcome::NotRunning);
        assert_eq!(h.remote.pull_count(), 0);
    }

    #[tokio::test]
    async fn start_arms_and_stop_disarms() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;

        let status = h.engine.status();
        assert_eq!(status.state, EngineState::Idle);
        assert!(status.connected);
        assert!(status.next_sync.is_some());

        h.engine.stop();
        let status = h.engine.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(!status.connected);
        assert_eq!(status.next_sync, None);
    }

    #[tokio::test]
    async fn invalid_config_keeps_engine_stopped() {
        let h = harness(FakeRemote::default(), FakeDiary::default()).await;

        let error = h.engine.start(SyncConfig::every(0)).await.unwrap_err();

        assert!(matches!(error, Error::ConfigInvalid(_)));
        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert_eq!(h.engine.config(), SyncConfig::default());
    }

    #[tokio::test]
    async fn disabled_config_is_saved_but_not_armed() {
        let h = harness(FakeRemote::default(), FakeDiary::default()).await;
        let config = SyncConfig {
            enabled: false,
            ..SyncConfig::default()
        };

        h.engine.start(config).await.unwrap();

        assert_eq!(h.engine.state(), EngineState::Stopped);
        assert!(!h.engine.config().enabled);
    }

    #[tokio::test]
    async fn no_concurrent_cycles() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        let release = h.remote.hold_pulls();

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.force_sync().await });
        h.remote.entered.notified().await;

        assert!(h.engine.status().syncing);
        assert_eq!(h.engine.state(), EngineState::Syncing);
        assert_eq!(h.engine.force_sync().await, ForceSyncOutcome::AlreadyRunning);
        assert_eq!(h.engine.force_sync().await, ForceSyncOutcome::AlreadyRunning);

        release.notify_one();
        assert!(report(first.await.unwrap()).succeeded());
        assert_eq!(h.remote.pull_count(), 1);
        assert!(!h.engine.status().syncing);
        assert_eq!(h.engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn queued_updates_coalesce_to_latest() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        let queue = h.engine.queue();
        queue
            .enqueue(ChangeAction::Update, titled("d1", "old"))
            .await
            .unwrap();
        queue
            .enqueue(ChangeAction::Update, titled("d1", "new"))
            .await
            .unwrap();

        let report = report(h.engine.force_sync().await);

        assert!(report.succeeded());
        let remote = h.remote.record("d1").unwrap();
        assert_eq!(remote.as_diary().unwrap().title, "new");
        assert_eq!(h.remote.batches().len(), 1);
        assert_eq!(h.remote.batches()[0].len(), 1);
        assert!(h.engine.queue().is_empty());
        assert_eq!(h.engine.status().pending_changes, 0);
    }

    #[tokio::test]
    async fn failed_push_keeps_queue() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d1", "draft"))
            .await
            .unwrap();
        h.remote.fail_pushes(true);

        let failed = report(h.engine.force_sync().await);

        assert!(!failed.succeeded());
        assert_eq!(h.engine.queue().len(), 1);
        assert_eq!(h.engine.state(), EngineState::Error);
        let status = h.engine.status();
        assert!(status.last_error.unwrap().contains("connection reset"));
        assert_eq!(status.last_sync, None);
        assert!(status.next_sync.is_some());
        assert_eq!(
            h.engine.history().latest().unwrap().action,
            HistoryAction::SyncError
        );

        h.remote.fail_pushes(false);
        let retried = report(h.engine.force_sync().await);

        assert!(retried.succeeded());
        assert!(h.engine.queue().is_empty());
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.status().last_error, None);
        assert_eq!(h.remote.record("d1").unwrap().as_diary().unwrap().title, "draft");
    }

    #[tokio::test]
    async fn replay_after_crash_before_ack_applies_once() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        let change = h
            .engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d1", "once"))
            .await
            .unwrap();
        h.remote
            .push(PushRequest {
                device: h.engine.device(),
                changes: std::slice::from_ref(&change),
                encryption: false,
                compression: false,
            })
            .await
            .unwrap();

        let report = report(h.engine.force_sync().await);

        assert!(report.succeeded());
        assert_eq!(h.remote.applied(), vec![change.id]);
        assert!(h.engine.queue().is_empty());
    }

    #[tokio::test]
    async fn server_wins_overwrites_local_copy() {
        let local = body("d2", "A", 10);
        let h = started(
            FakeRemote::with_records([body("d2", "B", 20)]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default().with_conflict_resolution(ConflictResolutionMode::ServerWins),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();

        let report = report(h.engine.force_sync().await);

        assert!(report.succeeded());
        assert_eq!(h.diary.record("d2").unwrap().as_diary().unwrap().body, "B");
        let conflicts = h.engine.conflicts().list(ConflictFilter::ALL);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].resolution, Some(Resolution::KeepRemote));
        assert_eq!(conflicts[0].conflict_type, ConflictType::Update);
        assert!(h.engine.queue().is_empty());
        assert_eq!(h.engine.state(), EngineState::Idle);
    }

    #[tokio::test]
    async fn automatic_mode_keeps_newer_local_copy() {
        let local = body("d7", "mine", 50);
        let h = started(
            FakeRemote::with_records([body("d7", "theirs", 10)]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default().with_conflict_resolution(ConflictResolutionMode::Automatic),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();

        let report = report(h.engine.force_sync().await);

        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(h.remote.record("d7").unwrap().as_diary().unwrap().body, "mine");
        let conflict = h.engine.conflicts().get(report.conflicts[0]).unwrap();
        assert_eq!(conflict.resolution, Some(Resolution::KeepLocal));
    }

    #[tokio::test]
    async fn manual_conflict_waits_for_a_decision() {
        let local = body("d2", "A", 10);
        let h = started(
            FakeRemote::with_records([body("d2", "B", 20)]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default(),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();

        let first = report(h.engine.force_sync().await);

        assert_eq!(first.unresolved, 1);
        assert_eq!(h.engine.state(), EngineState::ConflictPending);
        assert_eq!(h.engine.status().open_conflicts, 1);
        assert_eq!(h.diary.record("d2").unwrap().as_diary().unwrap().body, "A");
        assert!(h.engine.queue().is_empty());
        assert_eq!(
            h.engine.history().latest().unwrap().action,
            HistoryAction::ConflictDetected
        );

        let id = first.conflicts[0];
        assert!(h
            .engine
            .resolve_conflict(id, Resolution::KeepLocal)
            .await
            .unwrap());
        assert!(!h
            .engine
            .resolve_conflict(id, Resolution::KeepRemote)
            .await
            .unwrap());
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.status().open_conflicts, 0);
        assert_eq!(h.engine.queue().len(), 1);

        let second = report(h.engine.force_sync().await);

        assert!(second.succeeded());
        assert!(second.conflicts.is_empty());
        assert_eq!(h.remote.record("d2").unwrap().as_diary().unwrap().body, "A");
        assert_eq!(h.engine.conflicts().list(ConflictFilter::ALL).len(), 1);
    }

    #[tokio::test]
    async fn merge_resolution_updates_both_sides() {
        let local = Record::diary(
            "d3",
            DiaryEntry {
                tags: vec!["travel".to_string()],
                ..DiaryEntry::with_body("local")
            },
        )
        .with_updated_at(10);
        let remote = Record::diary(
            "d3",
            DiaryEntry {
                tags: vec!["food".to_string()],
                ..DiaryEntry::with_body("remote")
            },
        )
        .with_updated_at(20);
        let h = started(
            FakeRemote::with_records([remote]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default(),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();
        let id = report(h.engine.force_sync().await).conflicts[0];

        assert!(h.engine.resolve_conflict(id, Resolution::Merge).await.unwrap());
        let merged = h.diary.record("d3").unwrap();
        let entry = merged.as_diary().unwrap();
        assert_eq!(entry.body, "remote");
        assert_eq!(entry.tags, vec!["food", "travel"]);

        assert!(report(h.engine.force_sync().await).succeeded());
        assert_eq!(h.remote.record("d3").unwrap().as_diary().unwrap().tags.len(), 2);
    }

    #[tokio::test]
    async fn first_sync_uploads_untracked_local_records() {
        let h = started(
            FakeRemote::with_records([body("shared", "remote copy", 5)]),
            FakeDiary::with_records([titled("d5", "offline draft"), body("shared", "stale", 1)]),
            SyncConfig::default(),
        )
        .await;

        let report = report(h.engine.force_sync().await);

        assert!(report.succeeded());
        assert!(report.conflicts.is_empty());
        let batch = &h.remote.batches()[0];
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].action, ChangeAction::Create);
        assert_eq!(h.remote.record("d5").unwrap().as_diary().unwrap().title, "offline draft");
        assert_eq!(
            h.diary.record("shared").unwrap().as_diary().unwrap().body,
            "remote copy"
        );
    }

    #[tokio::test]
    async fn stop_mid_cycle_lets_cycle_finish() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        let release = h.remote.hold_pulls();

        let engine = h.engine.clone();
        let cycle = tokio::spawn(async move { engine.force_sync().await });
        h.remote.entered.notified().await;
        h.engine.stop();
        release.notify_one();

        assert!(report(cycle.await.unwrap()).succeeded());
        let status = h.engine.status();
        assert_eq!(status.state, EngineState::Stopped);
        assert!(!status.connected);
        assert!(!status.syncing);
        assert_eq!(status.next_sync, None);
        assert!(status.last_sync.is_some());
        assert_eq!(h.engine.force_sync().await, ForceSyncOutcome::NotRunning);
        assert_eq!(h.remote.pull_count(), 1);
    }

    #[tokio::test]
    async fn offline_engine_queues_and_syncs_on_reconnect() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;

        assert_eq!(h.engine.set_online(false).await, None);
        assert!(!h.engine.status().connected);
        assert_eq!(h.engine.force_sync().await, ForceSyncOutcome::Offline);
        h.engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d9", "on the train"))
            .await
            .unwrap();
        assert_eq!(h.engine.status().pending_changes, 1);

        let outcome = h.engine.set_online(true).await.unwrap();

        assert!(report(outcome).succeeded());
        assert!(h.engine.status().connected);
        assert!(h.engine.queue().is_empty());
        assert!(h.remote.record("d9").is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn persisted_state_survives_reopen() {
        init_tracing();
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sync_state.db");
        let remote = Arc::new(FakeRemote::default());
        let diary = Arc::new(FakeDiary::default());

        let repo: Arc<dyn StateRepository> =
            Arc::new(LibSqlStateRepository::open(&path).await.unwrap());
        let engine = SyncEngine::open(repo, remote.clone(), diary.clone(), EngineOptions::default())
            .await
            .unwrap();
        engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d1", "kept"))
            .await
            .unwrap();
        engine.start(SyncConfig::every(90)).await.unwrap();
        engine.stop();
        let device = engine.device().clone();
        drop(engine);

        let repo: Arc<dyn StateRepository> =
            Arc::new(LibSqlStateRepository::open(&path).await.unwrap());
        let reopened = SyncEngine::open(repo, remote, diary, EngineOptions::default())
            .await
            .unwrap();

        assert_eq!(reopened.queue().len(), 1);
        assert_eq!(reopened.status().pending_changes, 1);
        assert_eq!(reopened.config().interval_seconds, 90);
        assert_eq!(reopened.device(), &device);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_fires_on_interval_until_stopped() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::every(60)).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.remote.pull_count(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.remote.pull_count(), 2);

        h.engine.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.remote.pull_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_scheduler() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::every(60)).await;
        h.engine.start(SyncConfig::every(600)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.remote.pull_count(), 0);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(h.remote.pull_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_tick_without_offline_support_is_an_error() {
        let config = SyncConfig {
            offline_support: false,
            ..SyncConfig::every(60)
        };
        let h = started(FakeRemote::default(), FakeDiary::default(), config).await;
        h.engine.set_online(false).await;

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(h.engine.state(), EngineState::Error);
        assert_eq!(h.remote.pull_count(), 0);
        assert_eq!(
            h.engine.history().latest().unwrap().action,
            HistoryAction::SyncError
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_resets_after_grace_period() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;

        h.engine.force_sync().await;
        assert_eq!(h.engine.status().progress_percent, PROGRESS_DONE);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.engine.status().progress_percent, 0);
    }

    /// Local diary that lets another device write `x` to the remote while
    /// the first pulled record is being applied
    struct RelayDiary {
        inner: FakeDiary,
        remote: Arc<FakeRemote>,
        fired: AtomicBool,
    }

    #[async_trait]
    impl DiaryStore for RelayDiary {
        async fn list_local(&self) -> Result<Vec<Record>> {
            self.inner.list_local().await
        }

        async fn apply_remote(&self, record: &Record) -> Result<()> {
            if !self.fired.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.remote.put(titled("x", "from another device"));
            }
            self.inner.apply_remote(record).await
        }
    }

    #[tokio::test]
    async fn remote_write_during_cycle_is_pulled_next_time() {
        init_tracing();
        let remote = Arc::new(FakeRemote::with_records([titled("a", "first")]));
        let diary = Arc::new(RelayDiary {
            inner: FakeDiary::default(),
            remote: remote.clone(),
            fired: AtomicBool::new(false),
        });
        let engine = SyncEngine::open(
            Arc::new(MemoryStateRepository::new()),
            remote.clone(),
            diary.clone(),
            EngineOptions::default(),
        )
        .await
        .unwrap();
        engine.start(SyncConfig::default()).await.unwrap();

        assert!(report(engine.force_sync().await).succeeded());
        assert!(remote.record("x").is_some());
        assert!(diary.inner.record("x").is_none());

        let second = report(engine.force_sync().await);

        assert!(second.succeeded());
        assert_eq!(second.pulled, 1);
        assert_eq!(
            diary.inner.record("x").unwrap().as_diary().unwrap().title,
            "from another device"
        );
    }

    #[tokio::test]
    async fn own_push_is_not_pulled_back_as_conflict() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d1", "v1"))
            .await
            .unwrap();
        assert!(report(h.engine.force_sync().await).succeeded());

        h.engine
            .queue()
            .enqueue(ChangeAction::Update, titled("d1", "v2"))
            .await
            .unwrap();
        let second = report(h.engine.force_sync().await);

        assert!(second.succeeded());
        assert!(second.conflicts.is_empty());
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.remote.record("d1").unwrap().as_diary().unwrap().title, "v2");
        assert!(h.engine.queue().is_empty());
    }

    #[tokio::test]
    async fn delete_after_unacknowledged_create_reaches_remote() {
        let h = started(FakeRemote::default(), FakeDiary::default(), SyncConfig::default()).await;
        let draft = titled("d1", "draft");
        h.engine
            .queue()
            .enqueue(ChangeAction::Create, draft.clone())
            .await
            .unwrap();
        h.remote.lose_acks(true);

        assert!(!report(h.engine.force_sync().await).succeeded());
        assert!(!h.remote.record("d1").unwrap().deleted);
        assert!(h.engine.queue().drain()[0].attempted);

        h.remote.lose_acks(false);
        h.engine
            .queue()
            .enqueue(ChangeAction::Delete, draft)
            .await
            .unwrap();
        let report = report(h.engine.force_sync().await);

        assert!(report.succeeded());
        assert!(report.conflicts.is_empty());
        assert!(h.remote.record("d1").unwrap().deleted);
        assert!(h.diary.record("d1").map_or(true, |record| record.deleted));
        assert!(h.engine.queue().is_empty());
    }

    #[tokio::test]
    async fn parked_conflict_is_not_reported_again() {
        let local = body("d2", "A", 10);
        let h = started(
            FakeRemote::with_records([body("d2", "B", 20)]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default(),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();
        assert_eq!(report(h.engine.force_sync().await).detected, 1);

        let second = report(h.engine.force_sync().await);

        assert!(second.succeeded());
        assert_eq!(second.detected, 0);
        assert_eq!(second.unresolved, 1);
        assert_eq!(h.engine.state(), EngineState::ConflictPending);
        assert_eq!(
            h.engine.history().latest().unwrap().action,
            HistoryAction::SyncSuccess
        );
        let detections = h
            .engine
            .history()
            .list(50)
            .iter()
            .filter(|entry| entry.action == HistoryAction::ConflictDetected)
            .count();
        assert_eq!(detections, 1);
    }

    #[tokio::test]
    async fn newer_local_edit_supersedes_open_conflict() {
        let local = body("d2", "A", 10);
        let h = started(
            FakeRemote::with_records([body("d2", "B", 20)]),
            FakeDiary::with_records([local.clone()]),
            SyncConfig::default(),
        )
        .await;
        h.engine
            .queue()
            .enqueue(ChangeAction::Update, local)
            .await
            .unwrap();
        let id = report(h.engine.force_sync().await).conflicts[0];

        h.engine
            .queue()
            .enqueue(ChangeAction::Update, body("d2", "C", 30))
            .await
            .unwrap();
        let second = report(h.engine.force_sync().await);

        assert!(second.succeeded());
        assert_eq!(second.conflicts, vec![id]);
        assert_eq!(h.remote.record("d2").unwrap().as_diary().unwrap().body, "C");
        let conflict = h.engine.conflicts().get(id).unwrap();
        assert_eq!(conflict.resolution, Some(Resolution::KeepLocal));
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.engine.status().open_conflicts, 0);

        assert!(!h
            .engine
            .resolve_conflict(id, Resolution::KeepRemote)
            .await
            .unwrap());
        assert_eq!(h.diary.record("d2").unwrap().as_diary().unwrap().body, "A");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_timeout_fails_cycle_and_keeps_queue() {
        init_tracing();
        let remote = Arc::new(FakeRemote::default());
        let _release = remote.hold_pulls();
        let engine = SyncEngine::open(
            Arc::new(MemoryStateRepository::new()),
            remote.clone(),
            Arc::new(FakeDiary::default()),
            EngineOptions::default().with_remote_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();
        engine.start(SyncConfig::default()).await.unwrap();
        engine
            .queue()
            .enqueue(ChangeAction::Create, titled("d1", "draft"))
            .await
            .unwrap();

        let failed = report(engine.force_sync().await);

        assert!(failed.error.unwrap().contains("timed out"));
        assert_eq!(remote.pull_count(), 1);
        assert_eq!(engine.state(), EngineState::Error);
        assert_eq!(engine.queue().len(), 1);
        let status = engine.status();
        assert!(!status.syncing);
        assert!(status.next_sync.is_some());
        assert!(status.last_error.is_some());
        assert_eq!(
            engine.history().latest().unwrap().action,
            HistoryAction::SyncError
        );
    }
}
