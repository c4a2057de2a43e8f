//! src/supervisor/actor.rs
//!
//! The supervisor actor: one task that owns the session registry and is
//! the only writer of connection state. It selects over three inputs
//! (API commands, bridged session events, timer fires) so every decision
//! about an account happens on one thread of control.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use afkbot_common::models::account::{Account, CredentialKind};
use afkbot_common::models::chat::{ChatDirection, ChatRecord};
use afkbot_common::models::connection::{ConnectionSnapshot, ConnectionState, HandshakeFailure};
use afkbot_common::models::settings::ServerSettings;
use afkbot_common::traits::repository_traits::{
    AccountRepository, ChatLogRepository, SettingsRepository,
};

use crate::Error;
use crate::bridge::{BridgedEvent, EventBridge};
use crate::eventbus::{BotEvent, EventBus};
use crate::sessions::worker::{self, SessionCommand, SessionHandle};
use crate::sessions::{self, SessionEvent, SessionFactory};
use crate::state::{ConnectionStateMachine, StateInput};
use crate::supervisor::{SupervisorCommand, SupervisorConfig};
use crate::timers::{self, AccountTimers, TimerFire};

/// Incoming lines with the same text inside this window are duplicates
/// (game servers often echo a line once per logical shard).
const CHAT_DEDUP_WINDOW_MS: i64 = 1000;

/// Everything the actor tracks for one live account. Settings are the
/// copy captured when the connection started; later edits do not apply
/// until the account reconnects through the API. `session_id` names the
/// current worker incarnation; bridged events from any other incarnation
/// are stale and ignored.
struct RuntimeSession {
    session_id: Uuid,
    machine: ConnectionStateMachine,
    settings: ServerSettings,
    account: Account,
    handle: Option<SessionHandle>,
    timers: AccountTimers,
    reconnect_attempts: u32,
    recent_incoming: HashMap<String, DateTime<Utc>>,
}

struct SpamJob {
    text: String,
    accounts: Vec<Uuid>,
    ticker: JoinHandle<()>,
}

pub(super) struct SupervisorActor {
    config: SupervisorConfig,
    accounts: Arc<dyn AccountRepository>,
    settings: Arc<dyn SettingsRepository>,
    chat_log: Arc<dyn ChatLogRepository>,
    factory: Arc<dyn SessionFactory>,
    event_bus: Arc<EventBus>,
    statuses: Arc<DashMap<Uuid, ConnectionSnapshot>>,
    bridge: EventBridge,
    timer_tx: mpsc::Sender<TimerFire>,
    registry: HashMap<Uuid, RuntimeSession>,
    spam_jobs: HashMap<Uuid, SpamJob>,
}

impl SupervisorActor {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        config: SupervisorConfig,
        accounts: Arc<dyn AccountRepository>,
        settings: Arc<dyn SettingsRepository>,
        chat_log: Arc<dyn ChatLogRepository>,
        factory: Arc<dyn SessionFactory>,
        event_bus: Arc<EventBus>,
        statuses: Arc<DashMap<Uuid, ConnectionSnapshot>>,
        bridge: EventBridge,
        timer_tx: mpsc::Sender<TimerFire>,
    ) -> Self {
        Self {
            config,
            accounts,
            settings,
            chat_log,
            factory,
            event_bus,
            statuses,
            bridge,
            timer_tx,
            registry: HashMap::new(),
            spam_jobs: HashMap::new(),
        }
    }

    pub(super) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<SupervisorCommand>,
        mut bridge_rx: mpsc::Receiver<BridgedEvent>,
        mut timer_rx: mpsc::Receiver<TimerFire>,
    ) {
        debug!("connection supervisor started");
        loop {
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => match maybe_cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    // All handles dropped; tear everything down.
                    None => break,
                },
                Some(ev) = bridge_rx.recv() => self.handle_session_event(ev).await,
                Some(fire) = timer_rx.recv() => self.handle_timer_fire(fire).await,
            }
        }
        self.shutdown_all().await;
        debug!("connection supervisor stopped");
    }

    /// Returns true when the actor should stop.
    async fn handle_command(&mut self, cmd: SupervisorCommand) -> bool {
        match cmd {
            SupervisorCommand::Connect { account_id, reply } => {
                let _ = reply.send(self.handle_connect(account_id).await);
            }
            SupervisorCommand::Disconnect { account_id, reply } => {
                let _ = reply.send(self.handle_disconnect(account_id).await);
            }
            SupervisorCommand::SendChat {
                account_id,
                text,
                reply,
            } => {
                let _ = reply.send(self.send_outgoing_chat(account_id, &text).await);
            }
            SupervisorCommand::BroadcastChat {
                account_ids,
                text,
                reply,
            } => {
                let mut results = Vec::with_capacity(account_ids.len());
                for account_id in account_ids {
                    let outcome = self.send_outgoing_chat(account_id, &text).await;
                    results.push((account_id, outcome));
                }
                let _ = reply.send(results);
            }
            SupervisorCommand::StartSpam {
                account_ids,
                text,
                interval,
                reply,
            } => {
                let _ = reply.send(Ok(self.start_spam_job(account_ids, text, interval)));
            }
            SupervisorCommand::StopSpam { spam_id, reply } => {
                let _ = reply.send(self.stop_spam_job(spam_id));
            }
            SupervisorCommand::Shutdown { reply } => {
                self.shutdown_all().await;
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    // ---------- connect / disconnect ----------

    async fn handle_connect(&mut self, account_id: Uuid) -> Result<(), Error> {
        if self.registry.contains_key(&account_id) {
            return Err(Error::AlreadyInProgress(account_id));
        }

        let settings = self.settings.get_settings().await?;
        sessions::parse_server_address(&settings.server_address)?;

        let account = self
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;

        if account.kind == CredentialKind::Token && !settings.offline_accounts_enabled {
            return Err(Error::Configuration(
                "offline accounts are disabled in the server settings".into(),
            ));
        }

        let mut machine = ConnectionStateMachine::new(account_id);
        machine.apply(StateInput::Connect)?;

        info!(
            "connecting account {} ({}) to {}",
            account_id,
            account.username(),
            settings.server_address
        );

        let session_id = Uuid::new_v4();
        let handle = self.spawn_worker(&account, &settings, session_id);
        self.registry.insert(
            account_id,
            RuntimeSession {
                session_id,
                machine,
                settings,
                account,
                handle: Some(handle),
                timers: AccountTimers::default(),
                reconnect_attempts: 0,
                recent_incoming: HashMap::new(),
            },
        );
        self.note_state(account_id, ConnectionState::Connecting, None)
            .await;
        Ok(())
    }

    async fn handle_disconnect(&mut self, account_id: Uuid) -> Result<(), Error> {
        if !self.registry.contains_key(&account_id) {
            // Unknown or already gone; make sure the snapshot agrees.
            let stale = self
                .statuses
                .get(&account_id)
                .map(|s| s.state != ConnectionState::Disconnected)
                .unwrap_or(false);
            if stale {
                self.note_state(account_id, ConnectionState::Disconnected, None)
                    .await;
            }
            return Ok(());
        }

        if let Some(rs) = self.registry.get_mut(&account_id) {
            // Accepted from every state; the machine keeps teardown
            // idempotent.
            let _ = rs.machine.apply(StateInput::Disconnect);
        }
        self.note_state(account_id, ConnectionState::Disconnecting, None)
            .await;
        self.teardown(account_id, ConnectionState::Disconnected, None)
            .await;
        Ok(())
    }

    /// Remove the account from the registry: cancel timers, unblock any
    /// in-flight handshake, and stop the worker.
    async fn teardown(
        &mut self,
        account_id: Uuid,
        final_state: ConnectionState,
        error: Option<String>,
    ) {
        if let Some(mut rs) = self.registry.remove(&account_id) {
            rs.timers.cancel_all();
            if let Some(handle) = rs.handle.take() {
                handle.cancel();
                let _ = handle.send(SessionCommand::Disconnect);
            }
        }
        self.note_state(account_id, final_state, error).await;
    }

    fn spawn_worker(
        &self,
        account: &Account,
        settings: &ServerSettings,
        session_id: Uuid,
    ) -> SessionHandle {
        let (session, control) = self.factory.create(account);
        worker::spawn(
            account.account_id,
            session,
            control,
            settings.server_address.clone(),
            account.clone(),
            self.bridge.sink(account.account_id, session_id),
        )
    }

    // ---------- session events ----------

    async fn handle_session_event(&mut self, ev: BridgedEvent) {
        let account_id = ev.account_id;
        match self.registry.get(&account_id) {
            None => {
                // Stale event from a torn-down session.
                debug!("dropping event for unregistered account {}", account_id);
                return;
            }
            Some(rs) if rs.session_id != ev.session_id => {
                // The account has been reconnected since this event was
                // posted; the old incarnation no longer speaks for it.
                debug!(
                    "dropping stale event {:?} for account {} (session {} superseded)",
                    ev.event, account_id, ev.session_id
                );
                return;
            }
            Some(_) => {}
        }
        match ev.event {
            SessionEvent::HandshakeSucceeded => self.on_handshake_succeeded(account_id).await,
            SessionEvent::HandshakeFailed(failure) => {
                self.on_handshake_failed(account_id, failure).await
            }
            SessionEvent::ChatReceived { text } => self.on_chat_received(account_id, text).await,
            SessionEvent::WorldChanged { world } => self.on_world_changed(account_id, &world),
            SessionEvent::PeerDisconnected { reason } => {
                self.on_peer_lost(account_id, reason).await
            }
            SessionEvent::PeerKicked { reason } => {
                let reason = format!("kicked: {}", reason);
                self.on_peer_lost(account_id, reason).await
            }
        }
    }

    async fn on_handshake_succeeded(&mut self, account_id: Uuid) {
        let settings = {
            let Some(rs) = self.registry.get_mut(&account_id) else {
                return;
            };
            if let Err(e) = rs.machine.apply(StateInput::HandshakeSucceeded) {
                debug!("ignoring handshake success for {}: {}", account_id, e);
                return;
            }
            rs.reconnect_attempts = 0;
            rs.settings.clone()
        };

        self.note_state(account_id, ConnectionState::Connected, None)
            .await;
        info!("account {} is connected", account_id);

        let Some(rs) = self.registry.get_mut(&account_id) else {
            return;
        };
        if settings.login_messages_enabled && !settings.login_messages.is_empty() {
            let handle = timers::spawn_message_sequence(
                account_id,
                Duration::from_secs(settings.login_delay_seconds),
                timers::sequence_delays(&settings.login_messages),
                self.timer_tx.clone(),
            );
            rs.timers.start_login_sequence(handle);
        }
        if settings.anti_idle_enabled {
            let handle = timers::spawn_anti_idle(
                account_id,
                self.config.anti_idle_interval,
                self.timer_tx.clone(),
            );
            rs.timers.start_anti_idle(handle);
        }
    }

    async fn on_handshake_failed(&mut self, account_id: Uuid, failure: HandshakeFailure) {
        let retry_attempt = {
            let Some(rs) = self.registry.get_mut(&account_id) else {
                return;
            };
            rs.timers.cancel_all();
            rs.handle = None;

            let will_retry = rs.settings.auto_reconnect_enabled
                && rs.reconnect_attempts < self.config.max_reconnect_attempts;
            let input = if will_retry {
                StateInput::HandshakeFailed { will_retry: true }
            } else if rs.machine.state() == ConnectionState::Reconnecting {
                StateInput::RetriesExhausted
            } else {
                StateInput::HandshakeFailed { will_retry: false }
            };
            match rs.machine.apply(input) {
                Ok(ConnectionState::Reconnecting) => {
                    rs.reconnect_attempts += 1;
                    Some(rs.reconnect_attempts)
                }
                Ok(_) => None,
                Err(e) => {
                    debug!("ignoring handshake failure for {}: {}", account_id, e);
                    return;
                }
            }
        };

        let reason = failure.to_string();
        match retry_attempt {
            Some(attempt) => {
                let delay = timers::backoff_delay(
                    self.config.reconnect_base_delay,
                    self.config.reconnect_max_delay,
                    attempt,
                );
                warn!(
                    "account {} handshake failed ({}); retry {} of {} in {:?}",
                    account_id, reason, attempt, self.config.max_reconnect_attempts, delay
                );
                let handle = timers::spawn_reconnect(account_id, delay, self.timer_tx.clone());
                if let Some(rs) = self.registry.get_mut(&account_id) {
                    rs.timers.schedule_reconnect(handle);
                }
                self.note_state(account_id, ConnectionState::Reconnecting, Some(reason))
                    .await;
            }
            None => {
                warn!("account {} failed to connect: {}", account_id, reason);
                self.teardown(account_id, ConnectionState::Failed, Some(reason))
                    .await;
            }
        }
    }

    async fn on_peer_lost(&mut self, account_id: Uuid, reason: String) {
        let retrying = {
            let Some(rs) = self.registry.get_mut(&account_id) else {
                return;
            };
            let will_retry =
                rs.settings.auto_reconnect_enabled && self.config.max_reconnect_attempts > 0;
            match rs.machine.apply(StateInput::PeerLost { will_retry }) {
                Ok(ConnectionState::Reconnecting) => {
                    rs.timers.cancel_all();
                    rs.handle = None;
                    rs.reconnect_attempts = 1;
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    debug!("ignoring peer loss for {}: {}", account_id, e);
                    return;
                }
            }
        };

        if retrying {
            let delay = timers::backoff_delay(
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
                1,
            );
            info!(
                "account {} lost connection ({}); reconnecting in {:?}",
                account_id, reason, delay
            );
            let handle = timers::spawn_reconnect(account_id, delay, self.timer_tx.clone());
            if let Some(rs) = self.registry.get_mut(&account_id) {
                rs.timers.schedule_reconnect(handle);
            }
            self.note_state(account_id, ConnectionState::Reconnecting, Some(reason))
                .await;
        } else {
            info!("account {} lost connection: {}", account_id, reason);
            self.teardown(account_id, ConnectionState::Disconnected, Some(reason))
                .await;
        }
    }

    async fn on_chat_received(&mut self, account_id: Uuid, text: String) {
        let now = Utc::now();
        {
            let Some(rs) = self.registry.get_mut(&account_id) else {
                return;
            };
            if rs.machine.state() != ConnectionState::Connected {
                return;
            }
            let window = chrono::Duration::milliseconds(CHAT_DEDUP_WINDOW_MS);
            if let Some(at) = rs.recent_incoming.get(&text) {
                if now.signed_duration_since(*at) < window {
                    debug!("duplicate chat line for {} suppressed", account_id);
                    return;
                }
            }
            rs.recent_incoming
                .retain(|_, at| now.signed_duration_since(*at) < window);
            rs.recent_incoming.insert(text.clone(), now);
        }

        let record = ChatRecord {
            record_id: Uuid::new_v4(),
            account_id,
            text,
            direction: ChatDirection::Incoming,
            timestamp: now,
        };
        if let Err(e) = self.chat_log.append(&record).await {
            error!("failed to persist chat for {}: {}", account_id, e);
        }
        self.event_bus.try_publish_chat(&record).await;
    }

    fn on_world_changed(&mut self, account_id: Uuid, world: &str) {
        let Some(rs) = self.registry.get_mut(&account_id) else {
            return;
        };
        if rs.machine.apply(StateInput::WorldChanged).is_err() {
            debug!("ignoring world change for {} while not connected", account_id);
            return;
        }
        debug!("account {} moved to world '{}'", account_id, world);
        if !rs.settings.world_change_messages_enabled || rs.settings.world_change_messages.is_empty()
        {
            return;
        }
        // A fresh world change supersedes a still-running sequence.
        let handle = timers::spawn_message_sequence(
            account_id,
            Duration::ZERO,
            timers::sequence_delays(&rs.settings.world_change_messages),
            self.timer_tx.clone(),
        );
        rs.timers.restart_world_sequence(handle);
    }

    // ---------- timer fires ----------

    async fn handle_timer_fire(&mut self, fire: TimerFire) {
        match fire {
            TimerFire::SendChat { account_id, text } => {
                if let Err(e) = self.send_outgoing_chat(account_id, &text).await {
                    debug!("scheduled chat for {} dropped: {}", account_id, e);
                }
            }
            TimerFire::AntiIdle { account_id } => {
                let Some(rs) = self.registry.get(&account_id) else {
                    return;
                };
                if rs.machine.state() != ConnectionState::Connected {
                    return;
                }
                if let Some(handle) = rs.handle.as_ref() {
                    let _ = handle.send(SessionCommand::Jump);
                }
            }
            TimerFire::ReconnectDue { account_id } => self.on_reconnect_due(account_id).await,
            TimerFire::SpamTick { spam_id } => self.on_spam_tick(spam_id).await,
        }
    }

    async fn on_reconnect_due(&mut self, account_id: Uuid) {
        let (account, settings, attempt) = {
            let Some(rs) = self.registry.get(&account_id) else {
                return;
            };
            if rs.machine.state() != ConnectionState::Reconnecting {
                return;
            }
            (rs.account.clone(), rs.settings.clone(), rs.reconnect_attempts)
        };

        info!(
            "reconnect attempt {} for account {} to {}",
            attempt, account_id, settings.server_address
        );
        // Each attempt is a fresh incarnation so leftovers from the dead
        // worker cannot race the new one.
        let session_id = Uuid::new_v4();
        let handle = self.spawn_worker(&account, &settings, session_id);
        if let Some(rs) = self.registry.get_mut(&account_id) {
            rs.session_id = session_id;
            rs.handle = Some(handle);
        }
    }

    // ---------- chat ----------

    /// Queue an outgoing chat line, persist it, and publish it. Fails with
    /// `NotConnected` unless the account is currently connected.
    async fn send_outgoing_chat(&mut self, account_id: Uuid, text: &str) -> Result<(), Error> {
        {
            let Some(rs) = self.registry.get(&account_id) else {
                return Err(Error::NotConnected(account_id));
            };
            if rs.machine.state() != ConnectionState::Connected {
                return Err(Error::NotConnected(account_id));
            }
            let Some(handle) = rs.handle.as_ref() else {
                return Err(Error::NotConnected(account_id));
            };
            if !handle.send(SessionCommand::SendChat(text.to_string())) {
                return Err(Error::Session(format!(
                    "session worker for {} is gone",
                    account_id
                )));
            }
        }

        let record = ChatRecord::new(account_id, text, ChatDirection::Outgoing);
        if let Err(e) = self.chat_log.append(&record).await {
            error!("failed to persist chat for {}: {}", account_id, e);
        }
        self.event_bus.try_publish_chat(&record).await;
        Ok(())
    }

    // ---------- spam jobs ----------

    fn start_spam_job(&mut self, accounts: Vec<Uuid>, text: String, interval: Duration) -> Uuid {
        let spam_id = Uuid::new_v4();
        info!(
            "spam job {} started: {} account(s), every {:?}",
            spam_id,
            accounts.len(),
            interval
        );
        let ticker = timers::spawn_spam_ticker(spam_id, interval, self.timer_tx.clone());
        self.spam_jobs.insert(
            spam_id,
            SpamJob {
                text,
                accounts,
                ticker,
            },
        );
        spam_id
    }

    fn stop_spam_job(&mut self, spam_id: Uuid) -> Result<(), Error> {
        match self.spam_jobs.remove(&spam_id) {
            Some(job) => {
                job.ticker.abort();
                info!("spam job {} stopped", spam_id);
                Ok(())
            }
            None => Err(Error::NotFound(format!("spam job {}", spam_id))),
        }
    }

    async fn on_spam_tick(&mut self, spam_id: Uuid) {
        let (text, targets) = {
            let Some(job) = self.spam_jobs.get(&spam_id) else {
                return;
            };
            (job.text.clone(), job.accounts.clone())
        };

        // A failing account is removed from the job; the rest keep going.
        let mut failed = Vec::new();
        for account_id in targets {
            if let Err(e) = self.send_outgoing_chat(account_id, &text).await {
                failed.push((account_id, e.to_string()));
            }
        }

        if !failed.is_empty() {
            if let Some(job) = self.spam_jobs.get_mut(&spam_id) {
                job.accounts
                    .retain(|id| !failed.iter().any(|(f, _)| f == id));
            }
            for (account_id, reason) in failed {
                warn!(
                    "spam job {} dropped account {}: {}",
                    spam_id, account_id, reason
                );
                self.event_bus
                    .try_publish(BotEvent::SpamAccountFailed {
                        spam_id,
                        account_id,
                        reason,
                    })
                    .await;
            }
        }

        let exhausted = self
            .spam_jobs
            .get(&spam_id)
            .map(|job| job.accounts.is_empty())
            .unwrap_or(false);
        if exhausted {
            if let Some(job) = self.spam_jobs.remove(&spam_id) {
                job.ticker.abort();
                info!("spam job {} stopped: no accounts left", spam_id);
            }
        }
    }

    // ---------- bookkeeping ----------

    /// Record a state change everywhere it is observable: the snapshot
    /// map, the accounts table (`is_online` mirror), and the event bus.
    /// Persistence failures are logged, never allowed to wedge the actor.
    async fn note_state(
        &mut self,
        account_id: Uuid,
        state: ConnectionState,
        error: Option<String>,
    ) {
        let now = Utc::now();
        let last_error = match (&error, state) {
            (Some(e), _) => Some(e.clone()),
            (None, ConnectionState::Connected) => None,
            (None, _) => self
                .statuses
                .get(&account_id)
                .and_then(|s| s.last_error.clone()),
        };

        self.statuses.insert(
            account_id,
            ConnectionSnapshot {
                account_id,
                state,
                last_error: last_error.clone(),
                last_seen: Some(now),
            },
        );

        if let Err(e) = self.accounts.set_online(account_id, state.is_online(), now).await {
            error!("failed to mirror online flag for {}: {}", account_id, e);
        }

        // try_publish so a slow subscriber can never stall the actor; a
        // full subscriber queue loses events, not scheduling.
        self.event_bus
            .try_publish(BotEvent::StatusChanged {
                account_id,
                state,
                last_error,
                timestamp: now,
            })
            .await;
    }

    async fn shutdown_all(&mut self) {
        for (_, job) in self.spam_jobs.drain() {
            job.ticker.abort();
        }
        let ids: Vec<Uuid> = self.registry.keys().copied().collect();
        for account_id in ids {
            let _ = self.handle_disconnect(account_id).await;
        }
    }
}
