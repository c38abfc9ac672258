//! Stage controller.
//!
//! Owns the single live [`SeatingState`] for the active group and drives it
//! from host signals: a poll loop, rendered messages, membership updates,
//! settings changes and chat switches. Every pass computes a transition with
//! the pure allocator, commits the new state, then feeds the effects to the
//! renderer one by one, pausing so transitions can settle.
//!
//! ## Concurrency
//!
//! - Passes are serialized by a busy flag; a pass that finds the stage busy
//!   is skipped, not queued.
//! - `end` bumps an epoch. A pass started under an older epoch neither
//!   commits state nor applies further effects.
//! - Restarts are debounced so a burst of changes rebuilds the stage once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tableau_seating::{
    last_speaker, mark_last_rendered, on_speaker_changed, order_roster, placements,
    reconcile_roster, ChatEntry, Effect, Placement, SeatingConfig, SeatingState, Transition,
};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::assets::{character_from_image_url, AssetResolver, StaticAssetResolver};
use crate::debounce::Debouncer;
use crate::error::StageError;
use crate::host::Host;
use crate::renderer::Renderer;
use crate::settings::{ChatSettings, MemoryStore, SettingsStore, StageSettings};

/// Pause after an effect that makes a portrait appear.
const ENTER_SETTLE: Duration = Duration::from_millis(50);

/// Quiet period before a requested restart runs.
pub const RESTART_DEBOUNCE: Duration = Duration::from_millis(300);

/// Clears the busy flag when dropped.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    /// Take the flag, or `None` if another pass holds it.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State that only exists while the stage is mounted.
struct ActiveStage {
    group_id: String,
    seating: SeatingState,
    /// Resolved portrait per roster name; `None` when nothing was found.
    images: HashMap<String, Option<String>>,
    shutdown: watch::Sender<bool>,
}

/// The stage controller.
pub struct Stage {
    host: Arc<dyn Host>,
    renderer: Arc<dyn Renderer>,
    assets: Arc<dyn AssetResolver>,
    store: Arc<dyn SettingsStore>,
    settings: RwLock<StageSettings>,
    chat: RwLock<ChatSettings>,
    active: Mutex<Option<ActiveStage>>,
    busy: AtomicBool,
    epoch: AtomicU64,
    rng: StdMutex<StdRng>,
    restarter: Debouncer<bool>,
}

/// Builder for [`Stage`].
pub struct StageBuilder {
    host: Arc<dyn Host>,
    renderer: Arc<dyn Renderer>,
    assets: Option<Arc<dyn AssetResolver>>,
    store: Option<Arc<dyn SettingsStore>>,
    settings: StageSettings,
    chat: ChatSettings,
    seed: Option<u64>,
    restart_debounce: Duration,
}

impl StageBuilder {
    /// Portrait resolver. Defaults to one that finds nothing.
    pub fn assets(mut self, assets: Arc<dyn AssetResolver>) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Settings persistence. Defaults to memory only.
    pub fn store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Initial settings.
    pub fn settings(mut self, settings: StageSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Initial per-chat settings.
    pub fn chat_settings(mut self, chat: ChatSettings) -> Self {
        self.chat = chat;
        self
    }

    /// Seed the eviction side choice, for reproducible runs.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Quiet period for debounced restarts.
    pub fn restart_debounce(mut self, quiet: Duration) -> Self {
        self.restart_debounce = quiet;
        self
    }

    pub fn build(self) -> Arc<Stage> {
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let mut settings = self.settings;
        settings.normalize();

        Arc::new(Stage {
            host: self.host,
            renderer: self.renderer,
            assets: self
                .assets
                .unwrap_or_else(|| Arc::new(StaticAssetResolver::empty())),
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            settings: RwLock::new(settings),
            chat: RwLock::new(self.chat),
            active: Mutex::new(None),
            busy: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            rng: StdMutex::new(rng),
            restarter: Debouncer::new(self.restart_debounce),
        })
    }
}

impl Stage {
    pub fn builder(host: Arc<dyn Host>, renderer: Arc<dyn Renderer>) -> StageBuilder {
        StageBuilder {
            host,
            renderer,
            assets: None,
            store: None,
            settings: StageSettings::default(),
            chat: ChatSettings::default(),
            seed: None,
            restart_debounce: RESTART_DEBOUNCE,
        }
    }

    // ---- lifecycle ----

    /// Mount the stage for the active group and start polling.
    ///
    /// Does nothing when disabled, outside a group chat, or already running.
    pub async fn start(self: &Arc<Self>) {
        let settings = self.settings.read().await.clone();
        if !settings.is_enabled {
            debug!("Stage disabled, not starting");
            return;
        }
        let Some(group_id) = self.host.active_group().await else {
            debug!("No active group, not starting");
            return;
        };

        let shutdown_rx = {
            let mut active = self.active.lock().await;
            if active.is_some() {
                debug!("Stage already running");
                return;
            }
            self.renderer.mount(&settings.style()).await;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            *active = Some(ActiveStage {
                group_id: group_id.clone(),
                seating: SeatingState::new(),
                images: HashMap::new(),
                shutdown: shutdown_tx,
            });
            shutdown_rx
        };

        info!(group_id = %group_id, "Stage started");
        tokio::spawn(Arc::clone(self).run_loop(shutdown_rx));
    }

    /// Stop polling, drop all seating state and unmount.
    pub async fn end(&self) {
        let Some(active) = self.active.lock().await.take() else {
            return;
        };
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let _ = active.shutdown.send(true);
        self.renderer.unmount().await;
        info!(group_id = %active.group_id, "Stage ended");
    }

    /// Request a debounced teardown and rebuild.
    ///
    /// Returns whether the stage is running after the rebuild this request
    /// joined.
    pub async fn restart(self: &Arc<Self>) -> bool {
        let stage = Arc::clone(self);
        self.restarter
            .request(move || async move { stage.rebuild().await })
            .await
            .unwrap_or(false)
    }

    #[instrument(skip(self))]
    async fn rebuild(self: Arc<Self>) -> bool {
        self.end().await;
        let delay = self.settings.read().await.rebuild_delay();
        tokio::time::sleep(delay).await;
        self.start().await;
        self.is_active().await
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        debug!("Stage loop running");
        loop {
            let (enabled, interval) = {
                let settings = self.settings.read().await;
                (settings.is_enabled, settings.poll_interval())
            };
            if !enabled || *shutdown.borrow() {
                break;
            }

            self.tick().await;

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Stage loop stopped");
    }

    // ---- host signals ----

    /// The host switched chats.
    pub async fn chat_changed(self: &Arc<Self>, chat: ChatSettings) {
        *self.chat.write().await = chat;
        if self.host.active_group().await.is_some() {
            self.restart().await;
        } else {
            self.end().await;
        }
    }

    /// Group membership changed: run one membership pass.
    pub async fn group_updated(&self) {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            debug!("Stage busy, skipping membership pass");
            return;
        };
        let epoch = self.epoch.load(Ordering::Acquire);
        self.reconcile_members(epoch).await;
    }

    /// A chat message finished rendering.
    pub async fn message_rendered(&self) {
        self.tick().await;
    }

    /// One full pass: membership, then speaker, then highlight.
    pub async fn tick(&self) {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            debug!("Stage busy, skipping tick");
            return;
        };
        let epoch = self.epoch.load(Ordering::Acquire);
        self.reconcile_members(epoch).await;
        self.follow_speaker(epoch).await;
    }

    /// The host's own expression image changed; mirror it onto a portrait.
    pub async fn expression_changed(&self, url: &str) {
        let Some(name) = character_from_image_url(url) else {
            debug!(url, "Expression image is not a character portrait");
            return;
        };

        {
            let mut active = self.active.lock().await;
            let Some(active) = active.as_mut() else {
                return;
            };
            if !active.seating.is_visible(&name) {
                debug!(name = %name, "Expression changed for a participant not on stage");
                return;
            }
            active.images.insert(name.clone(), Some(url.to_string()));
        }

        self.renderer
            .apply(&Effect::SetImage {
                name,
                url: Some(url.to_string()),
            })
            .await;
    }

    /// Change global settings, persist them and propagate the change.
    ///
    /// The change is committed only once the store has saved it; on a save
    /// error the running settings are left untouched.
    pub async fn update_settings<F>(self: &Arc<Self>, update: F) -> Result<(), StageError>
    where
        F: FnOnce(&mut StageSettings),
    {
        let (before, after) = {
            let mut settings = self.settings.write().await;
            let mut next = settings.clone();
            update(&mut next);
            next.normalize();
            if *settings == next {
                return Ok(());
            }

            self.store.save(&next).await?;
            let before = std::mem::replace(&mut *settings, next.clone());
            (before, next)
        };
        info!("Settings updated");

        if before.needs_restart(&after) {
            self.restart().await;
        } else if before.style() != after.style() && self.is_active().await {
            self.renderer.update_style(&after.style()).await;
        }
        Ok(())
    }

    // ---- accessors ----

    /// Returns true if the stage is mounted.
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Snapshot of the seating state, if mounted.
    pub async fn seating(&self) -> Option<SeatingState> {
        self.active.lock().await.as_ref().map(|a| a.seating.clone())
    }

    /// Draw positions of every visible participant.
    pub async fn placements(&self) -> Vec<Placement> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|a| placements(&a.seating))
            .unwrap_or_default()
    }

    /// Portrait currently shown for `name`.
    pub async fn image(&self, name: &str) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .and_then(|a| a.images.get(name).cloned().flatten())
    }

    pub async fn settings(&self) -> StageSettings {
        self.settings.read().await.clone()
    }

    pub async fn chat_settings(&self) -> ChatSettings {
        self.chat.read().await.clone()
    }

    // ---- passes ----

    async fn seating_config(&self) -> SeatingConfig {
        let chat = self.chat.read().await;
        self.settings.read().await.seating_config(&chat)
    }

    async fn history(&self) -> Vec<ChatEntry> {
        match self.host.history().await {
            Ok(history) => history,
            Err(e) => {
                warn!(error = %e, "Failed to read chat history, treating as empty");
                Vec::new()
            }
        }
    }

    async fn reconcile_members(&self, epoch: u64) {
        let Some((group_id, before)) = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|a| (a.group_id.clone(), a.seating.clone()))
        else {
            return;
        };

        let members = match self.host.group_members(&group_id).await {
            Ok(members) => members,
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Failed to read group members, treating as empty");
                Vec::new()
            }
        };
        let history = self.history().await;
        let config = self.seating_config().await;
        let roster = order_roster(&members, &history, &config);

        let transition = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            reconcile_roster(&before, &roster, &config, &mut *rng)
        };

        let added: Vec<&String> = roster
            .iter()
            .filter(|name| !before.roster().contains(*name))
            .collect();
        let (expression, extensions) = {
            let settings = self.settings.read().await;
            (settings.expression.clone(), settings.extensions.clone())
        };
        let mut resolved: Vec<(String, Option<String>)> = Vec::with_capacity(added.len());
        for name in added {
            let url = self.assets.resolve(name, &expression, &extensions).await;
            resolved.push((name.clone(), url));
        }

        let mut effects: Vec<Effect> = resolved
            .iter()
            .map(|(name, url)| Effect::SetImage {
                name: name.clone(),
                url: url.clone(),
            })
            .collect();
        effects.extend(transition.effects.iter().cloned());

        {
            let mut active = self.active.lock().await;
            let Some(active) = active.as_mut() else {
                return;
            };
            if self.epoch.load(Ordering::Acquire) != epoch {
                debug!("Stage restarted during membership pass, discarding");
                return;
            }
            active
                .images
                .retain(|name, _| transition.state.roster().contains(name));
            active.images.extend(resolved);
            active.seating = transition.state;
            if let Err(e) = active.seating.validate(&config) {
                error!(group_id = %group_id, error = %e, "Seating invariant violated after membership pass");
            }
        }

        if !effects.is_empty() {
            debug!(group_id = %group_id, effect_count = effects.len(), "Membership reconciled");
        }
        self.apply_effects(&effects, epoch).await;
    }

    async fn follow_speaker(&self, epoch: u64) {
        let Some(before) = self.seating().await else {
            return;
        };
        let history = self.history().await;
        let config = self.seating_config().await;

        let spoken = match last_speaker(&history, before.roster()) {
            Some(speaker) => {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                on_speaker_changed(&before, speaker, &config, &mut *rng)
            }
            None => Transition::unchanged(&before),
        };
        let marked = mark_last_rendered(&spoken.state, &history);

        let mut effects = spoken.effects;
        effects.extend(marked.effects);

        {
            let mut active = self.active.lock().await;
            let Some(active) = active.as_mut() else {
                return;
            };
            if self.epoch.load(Ordering::Acquire) != epoch || active.seating != before {
                debug!("Seating changed during speaker pass, discarding");
                return;
            }
            active.seating = marked.state;
            if let Err(e) = active.seating.validate(&config) {
                error!(group_id = %active.group_id, error = %e, "Seating invariant violated after speaker pass");
            }
        }

        self.apply_effects(&effects, epoch).await;
    }

    async fn apply_effects(&self, effects: &[Effect], epoch: u64) {
        for effect in effects {
            if self.epoch.load(Ordering::Acquire) != epoch {
                debug!(remaining = effects.len(), "Stage ended, dropping effects");
                return;
            }
            trace!(
                effect = effect.kind(),
                name = effect.name().unwrap_or("-"),
                "Applying effect"
            );
            self.renderer.apply(effect).await;

            let settle = match effect {
                Effect::Exit { .. } => self.settings.read().await.exit_settle(),
                Effect::Enter { .. } | Effect::PromoteToCurrent { .. } => ENTER_SETTLE,
                _ => Duration::ZERO,
            };
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);

        let guard = BusyGuard::acquire(&flag).unwrap();
        assert!(BusyGuard::acquire(&flag).is_none());

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(BusyGuard::acquire(&flag).is_some());
    }
}
