//! src/timers.rs
//!
//! Scheduled work for the supervisor: login/world-change message
//! sequences, the anti-idle interval, reconnect backoff, and spam
//! tickers. Timer tasks never touch shared state; they post `TimerFire`
//! messages into the scheduling domain, where the registry and the
//! connection state are re-checked before anything is sent. Cancelling a
//! timer is therefore race-free: an aborted task posts nothing more, and
//! an already-posted fire is dropped once its account is torn down.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use uuid::Uuid;

use afkbot_common::models::settings::TimedMessage;

#[derive(Debug, Clone)]
pub enum TimerFire {
    SendChat { account_id: Uuid, text: String },
    AntiIdle { account_id: Uuid },
    ReconnectDue { account_id: Uuid },
    SpamTick { spam_id: Uuid },
}

/// The cancellable timer group of one account. All handles are aborted
/// before the account leaves the registry.
#[derive(Default)]
pub struct AccountTimers {
    login_sequence: Option<JoinHandle<()>>,
    world_sequence: Option<JoinHandle<()>>,
    anti_idle: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl AccountTimers {
    pub fn start_login_sequence(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.login_sequence.replace(handle) {
            old.abort();
        }
    }

    /// A new world-change firing supersedes a still-pending one.
    pub fn restart_world_sequence(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.world_sequence.replace(handle) {
            old.abort();
        }
    }

    pub fn start_anti_idle(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.anti_idle.replace(handle) {
            old.abort();
        }
    }

    pub fn schedule_reconnect(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.reconnect.replace(handle) {
            old.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for handle in [
            self.login_sequence.take(),
            self.world_sequence.take(),
            self.anti_idle.take(),
            self.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

impl Drop for AccountTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Convert a configured sequence into concrete per-message delays.
pub fn sequence_delays(messages: &[TimedMessage]) -> Vec<(String, Duration)> {
    messages
        .iter()
        .map(|m| (m.text.clone(), Duration::from_secs(m.delay_seconds)))
        .collect()
}

/// Fire a message sequence: one optional initial delay, then each message
/// after its own delay relative to the previous one. Delays are
/// sequential, never offsets from the start of the sequence.
pub fn spawn_message_sequence(
    account_id: Uuid,
    initial_delay: Duration,
    messages: Vec<(String, Duration)>,
    tx: mpsc::Sender<TimerFire>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !initial_delay.is_zero() {
            sleep(initial_delay).await;
        }
        for (text, delay) in messages {
            sleep(delay).await;
            if tx.send(TimerFire::SendChat { account_id, text }).await.is_err() {
                return;
            }
        }
    })
}

pub fn spawn_anti_idle(
    account_id: Uuid,
    interval: Duration,
    tx: mpsc::Sender<TimerFire>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            if tx.send(TimerFire::AntiIdle { account_id }).await.is_err() {
                return;
            }
        }
    })
}

pub fn spawn_reconnect(
    account_id: Uuid,
    delay: Duration,
    tx: mpsc::Sender<TimerFire>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep(delay).await;
        let _ = tx.send(TimerFire::ReconnectDue { account_id }).await;
    })
}

pub fn spawn_spam_ticker(
    spam_id: Uuid,
    interval: Duration,
    tx: mpsc::Sender<TimerFire>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            if tx.send(TimerFire::SpamTick { spam_id }).await.is_err() {
                return;
            }
        }
    })
}

/// Bounded exponential backoff: `base * 2^(attempt-1)`, capped.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << shift).min(cap)
}
