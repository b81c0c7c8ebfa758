use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::{error, info, warn};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    models::{SegmentPatch, SessionRecord, TodoStatus},
    scheduler::{ManagerSnapshot, SegmentManager, DEFAULT_STALL_THRESHOLD_SECS},
    settings::FocusSettings,
    store::SessionStore,
};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub tick_interval: Duration,
    pub watchdog_interval: Duration,
    pub stall_threshold_secs: u64,
    /// Periodic save cadence while a segment runs, in ticks.
    pub save_every_ticks: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            watchdog_interval: Duration::from_secs(5),
            stall_threshold_secs: DEFAULT_STALL_THRESHOLD_SECS,
            save_every_ticks: 5 * 60,
        }
    }
}

impl ControllerConfig {
    /// `STUDYFOCUS_DEBUG=1` saves on every tick.
    pub fn from_env() -> Self {
        let debug_mode = std::env::var("STUDYFOCUS_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            save_every_ticks: if debug_mode { 1 } else { 5 * 60 },
            ..Self::default()
        }
    }
}

/// Runs a [`SegmentManager`] in real time: a ticker task advances it every
/// second, a watchdog restarts a stalled ticker, and the record is written to
/// the store after transitions and periodically.
#[derive(Clone)]
pub struct SessionController {
    manager: Arc<Mutex<SegmentManager>>,
    store: Arc<dyn SessionStore>,
    user_id: Arc<str>,
    clock: Arc<dyn Clock>,
    settings: Arc<Mutex<FocusSettings>>,
    config: ControllerConfig,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    watchdog: Arc<Mutex<Option<JoinHandle<()>>>>,
    save_lock: Arc<Mutex<()>>,
    shutdown: CancellationToken,
}

impl SessionController {
    /// Resumes the user's active session, or plans a new one from `settings`.
    pub async fn open(
        store: Arc<dyn SessionStore>,
        user_id: &str,
        settings: FocusSettings,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Result<Self> {
        let loaded = match store.load_active_session(user_id).await {
            Ok(record) => record,
            Err(err) => {
                error!("Failed to load active session for {user_id}: {err:#}");
                None
            }
        };

        let (record, settings) = match loaded {
            Some(record) if !record.is_done => {
                info!(
                    "Resuming session {} at segment {}",
                    record.session_id, record.segment_index
                );
                let settings = record.user_settings;
                (record, settings)
            }
            _ => (SessionRecord::new(&settings, clock.now()), settings),
        };

        let manager = SegmentManager::new(record, &settings, clock.clone())?;
        let resumed_running = manager.is_running();

        let controller = Self {
            manager: Arc::new(Mutex::new(manager)),
            store,
            user_id: Arc::from(user_id),
            clock,
            settings: Arc::new(Mutex::new(settings)),
            config,
            ticker: Arc::new(Mutex::new(None)),
            watchdog: Arc::new(Mutex::new(None)),
            save_lock: Arc::new(Mutex::new(())),
            shutdown: CancellationToken::new(),
        };

        if resumed_running {
            controller.restart_tasks().await;
        }

        Ok(controller)
    }

    pub async fn snapshot(&self) -> ManagerSnapshot {
        self.manager.lock().await.snapshot()
    }

    pub async fn record(&self) -> SessionRecord {
        self.manager.lock().await.record().clone()
    }

    pub async fn start(&self) -> Result<ManagerSnapshot> {
        let snapshot = {
            let mut manager = self.manager.lock().await;
            manager.start()?;
            manager.snapshot()
        };
        // Always replace both tasks: a ticker that just saw the previous
        // segment stop may still be winding down.
        self.restart_tasks().await;
        Ok(snapshot)
    }

    pub async fn pause(&self) -> ManagerSnapshot {
        self.cancel_tasks().await;
        let snapshot = {
            let mut manager = self.manager.lock().await;
            manager.pause();
            manager.snapshot()
        };
        self.persist_in_background();
        snapshot
    }

    pub async fn reset(&self) -> ManagerSnapshot {
        self.cancel_tasks().await;
        let mut manager = self.manager.lock().await;
        manager.reset();
        manager.snapshot()
    }

    pub async fn update_current_segment(&self, patch: SegmentPatch) -> Result<ManagerSnapshot> {
        let mut manager = self.manager.lock().await;
        manager.update_current_segment(&patch)?;
        let snapshot = manager.snapshot();
        drop(manager);

        if snapshot.is_running {
            self.restart_tasks().await;
        } else {
            self.cancel_tasks().await;
        }
        Ok(snapshot)
    }

    pub async fn set_title(&self, title: &str) {
        self.manager.lock().await.set_title(title);
    }

    pub async fn set_auto_start_breaks(&self, enabled: bool) {
        self.manager.lock().await.set_auto_start_breaks(enabled);
        self.settings.lock().await.auto_start_breaks = enabled;
    }

    /// Settings used for the next planned session.
    pub async fn set_settings(&self, settings: FocusSettings) {
        *self.settings.lock().await = settings;
        self.manager
            .lock()
            .await
            .set_auto_start_breaks(settings.auto_start_breaks);
    }

    pub async fn update_feedback(&self, mood: Option<u8>, focus: Option<u8>) {
        self.manager.lock().await.feedback_mut().rate(mood, focus);
    }

    pub async fn toggle_distraction(&self, label: &str) {
        self.manager
            .lock()
            .await
            .feedback_mut()
            .toggle_distraction(label);
    }

    pub async fn add_todo(&self, text: &str) -> Option<String> {
        let mut manager = self.manager.lock().await;
        let now = manager.now();
        manager.user_data_mut().add_todo(text, now)
    }

    pub async fn set_todo_status(&self, id: &str, status: TodoStatus) -> bool {
        self.manager
            .lock()
            .await
            .user_data_mut()
            .set_todo_status(id, status)
    }

    pub async fn remove_todo(&self, id: &str) -> bool {
        self.manager.lock().await.user_data_mut().remove_todo(id)
    }

    pub async fn add_note(&self, text: &str, task_id: Option<String>) -> Option<String> {
        let mut manager = self.manager.lock().await;
        let now = manager.now();
        manager.user_data_mut().add_note(text, task_id, now)
    }

    pub async fn update_note(&self, id: &str, text: &str) -> bool {
        self.manager.lock().await.user_data_mut().update_note(id, text)
    }

    pub async fn remove_note(&self, id: &str) -> bool {
        self.manager.lock().await.user_data_mut().remove_note(id)
    }

    /// Removes the notes of one todo, or the general notes for `None`.
    pub async fn remove_notes_for(&self, task_id: Option<&str>) -> usize {
        self.manager
            .lock()
            .await
            .user_data_mut()
            .remove_notes_for(task_id)
    }

    pub async fn clear_history(&self) {
        self.manager.lock().await.clear_history();
    }

    /// Writes the record now. Returns false when skipped because no focus
    /// segment has started yet.
    pub async fn save_now(&self) -> Result<bool> {
        save_record(&self.manager, self.store.as_ref(), &self.user_id, &self.save_lock).await
    }

    /// Saves the current session one last time and replaces it with a fresh
    /// plan built from the current settings.
    pub async fn new_session(&self) -> Result<ManagerSnapshot> {
        self.cancel_tasks().await;
        self.manager.lock().await.pause();

        if let Err(err) = self.save_now().await {
            error!("Final save before new session failed: {err:#}");
        }

        let settings = *self.settings.lock().await;
        let record = SessionRecord::new(&settings, self.clock.now());
        let fresh = SegmentManager::new(record, &settings, self.clock.clone())?;

        let mut manager = self.manager.lock().await;
        *manager = fresh;
        info!("Started new session {}", manager.record().session_id);
        Ok(manager.snapshot())
    }

    /// Stops the background tasks and saves. A running segment keeps its
    /// start timestamp so the next `open` resumes it.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        self.cancel_tasks().await;
        self.save_now().await.map(|_| ())
    }

    async fn restart_tasks(&self) {
        self.restart_ticker().await;

        let mut watchdog = self.watchdog.lock().await;
        if let Some(handle) = watchdog.take() {
            handle.abort();
        }
        *watchdog = Some(self.spawn_watchdog());
    }

    async fn restart_ticker(&self) {
        let mut ticker = self.ticker.lock().await;
        if let Some(handle) = ticker.take() {
            handle.abort();
        }
        *ticker = Some(self.spawn_ticker());
    }

    async fn cancel_tasks(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.watchdog.lock().await.take() {
            handle.abort();
        }
    }

    fn spawn_ticker(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let tick_interval = self.config.tick_interval;
        let save_every = self.config.save_every_ticks.max(1);

        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks: u32 = 0;

            loop {
                tokio::select! {
                    _ = controller.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let (event, running) = {
                    let mut manager = controller.manager.lock().await;
                    let event = manager.tick();
                    (event, manager.is_running())
                };

                ticks = ticks.wrapping_add(1);
                if event.is_transition() || ticks % save_every == 0 {
                    controller.persist_in_background();
                }

                if !running {
                    break;
                }
            }
        })
    }

    fn spawn_watchdog(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let every = self.config.watchdog_interval;
        let threshold = self.config.stall_threshold_secs;

        tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = controller.shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let (stalled, running) = {
                    let mut manager = controller.manager.lock().await;
                    let stalled = manager.is_stalled(threshold);
                    manager.reconcile();
                    (stalled, manager.is_running())
                };

                if !running {
                    break;
                }
                if stalled {
                    warn!("No timer tick for over {threshold}s; restarting ticker");
                    controller.restart_ticker().await;
                }
            }
        })
    }

    fn persist_in_background(&self) {
        let manager = self.manager.clone();
        let store = self.store.clone();
        let user_id = self.user_id.clone();
        let save_lock = self.save_lock.clone();

        tokio::spawn(async move {
            if let Err(err) = save_record(&manager, store.as_ref(), &user_id, &save_lock).await {
                error!("Failed to save session for {user_id}: {err:#}");
            }
        });
    }
}

async fn save_record(
    manager: &Mutex<SegmentManager>,
    store: &dyn SessionStore,
    user_id: &str,
    save_lock: &Mutex<()>,
) -> Result<bool> {
    let _ordered = save_lock.lock().await;
    let record = {
        let manager = manager.lock().await;
        if !manager.record().has_started_focus() {
            return Ok(false);
        }
        manager.record().for_save()
    };

    store.save_session(user_id, &record).await?;
    Ok(true)
}
