//! src/supervisor/mod.rs
//!
//! The ConnectionSupervisor owns one protocol session per account and is
//! the public contract consumed by the API layer. All state lives inside
//! a single actor task (see `actor`); this handle only posts commands and
//! reads the status snapshot map.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;
use uuid::Uuid;

use afkbot_common::models::connection::{ConnectionSnapshot, ConnectionState};
use afkbot_common::traits::repository_traits::{
    AccountRepository, ChatLogRepository, SettingsRepository,
};

use crate::Error;
use crate::bridge::{self, EventBridge};
use crate::eventbus::EventBus;
use crate::sessions::SessionFactory;

mod actor;

use actor::SupervisorActor;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Capacity of the bridged-event queue; when full, session events are
    /// dropped rather than blocking the I/O threads.
    pub event_queue_size: usize,
    pub anti_idle_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            event_queue_size: 1024,
            anti_idle_interval: Duration::from_secs(60),
            reconnect_base_delay: Duration::from_secs(30),
            reconnect_max_delay: Duration::from_secs(300),
            max_reconnect_attempts: 3,
        }
    }
}

pub(crate) enum SupervisorCommand {
    Connect {
        account_id: Uuid,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Disconnect {
        account_id: Uuid,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    SendChat {
        account_id: Uuid,
        text: String,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    BroadcastChat {
        account_ids: Vec<Uuid>,
        text: String,
        reply: oneshot::Sender<Vec<(Uuid, Result<(), Error>)>>,
    },
    StartSpam {
        account_ids: Vec<Uuid>,
        text: String,
        interval: Duration,
        reply: oneshot::Sender<Result<Uuid, Error>>,
    },
    StopSpam {
        spam_id: Uuid,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct ConnectionSupervisor {
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    statuses: Arc<DashMap<Uuid, ConnectionSnapshot>>,
    bridge: EventBridge,
}

impl ConnectionSupervisor {
    /// Construct the supervisor and start its actor task. Dependencies
    /// are injected; nothing here is an ambient singleton.
    pub fn spawn(
        config: SupervisorConfig,
        accounts: Arc<dyn AccountRepository>,
        settings: Arc<dyn SettingsRepository>,
        chat_log: Arc<dyn ChatLogRepository>,
        factory: Arc<dyn SessionFactory>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let statuses: Arc<DashMap<Uuid, ConnectionSnapshot>> = Arc::new(DashMap::new());
        let (event_bridge, bridge_rx) = bridge::channel(config.event_queue_size);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (timer_tx, timer_rx) = mpsc::channel(256);

        let actor = SupervisorActor::new(
            config,
            accounts,
            settings,
            chat_log,
            factory,
            event_bus,
            Arc::clone(&statuses),
            event_bridge.clone(),
            timer_tx,
        );
        tokio::spawn(actor.run(cmd_rx, bridge_rx, timer_rx));

        Self {
            cmd_tx,
            statuses,
            bridge: event_bridge,
        }
    }

    /// Start connecting `account_id`. Returns once the account is in
    /// `Connecting`; the handshake outcome is observed via `status`.
    pub async fn connect(&self, account_id: Uuid) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::Connect {
            account_id,
            reply: tx,
        })
        .await?;
        Self::recv_reply(rx).await?
    }

    /// Tear the account down to `Disconnected`. Idempotent; unknown
    /// account ids are a no-op.
    pub async fn disconnect(&self, account_id: Uuid) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::Disconnect {
            account_id,
            reply: tx,
        })
        .await?;
        Self::recv_reply(rx).await?
    }

    pub async fn send_chat(&self, account_id: Uuid, text: &str) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::SendChat {
            account_id,
            text: text.to_string(),
            reply: tx,
        })
        .await?;
        Self::recv_reply(rx).await?
    }

    /// Send a slash command; the prefix is added when missing.
    pub async fn send_command(&self, account_id: Uuid, command: &str) -> Result<(), Error> {
        let text = if command.starts_with('/') {
            command.to_string()
        } else {
            format!("/{}", command)
        };
        self.send_chat(account_id, &text).await
    }

    /// Send one message from several accounts, returning the per-account
    /// outcome. One account failing never affects the others.
    pub async fn broadcast_chat(
        &self,
        account_ids: Vec<Uuid>,
        text: &str,
    ) -> Result<Vec<(Uuid, Result<(), Error>)>, Error> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::BroadcastChat {
            account_ids,
            text: text.to_string(),
            reply: tx,
        })
        .await?;
        Self::recv_reply(rx).await
    }

    /// Start a periodic spam job across `account_ids`. The interval is
    /// bounded to [1, 3600] seconds.
    pub async fn start_spam(
        &self,
        account_ids: Vec<Uuid>,
        text: &str,
        interval_seconds: u64,
    ) -> Result<Uuid, Error> {
        if !(1..=3600).contains(&interval_seconds) {
            return Err(Error::SpamValidation(format!(
                "interval must be within [1, 3600] seconds, got {}",
                interval_seconds
            )));
        }
        if account_ids.is_empty() {
            return Err(Error::SpamValidation("no accounts selected".into()));
        }
        if text.trim().is_empty() {
            return Err(Error::SpamValidation("message is empty".into()));
        }

        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::StartSpam {
            account_ids,
            text: text.to_string(),
            interval: Duration::from_secs(interval_seconds),
            reply: tx,
        })
        .await?;
        Self::recv_reply(rx).await?
    }

    pub async fn stop_spam(&self, spam_id: Uuid) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(SupervisorCommand::StopSpam { spam_id, reply: tx })
            .await?;
        Self::recv_reply(rx).await?
    }

    /// Live status of one account. Accounts the supervisor has never seen
    /// read as `Disconnected`.
    pub fn status(&self, account_id: Uuid) -> ConnectionSnapshot {
        self.statuses
            .get(&account_id)
            .map(|s| s.clone())
            .unwrap_or_else(|| ConnectionSnapshot::offline(account_id))
    }

    pub fn statuses(&self) -> Vec<ConnectionSnapshot> {
        self.statuses.iter().map(|s| s.clone()).collect()
    }

    pub fn connected_accounts(&self) -> Vec<Uuid> {
        self.statuses
            .iter()
            .filter(|s| s.state == ConnectionState::Connected)
            .map(|s| s.account_id)
            .collect()
    }

    /// Session events dropped because the bridge queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.bridge.dropped_events()
    }

    /// Disconnect every account, stop all spam jobs, and stop the actor.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .send_cmd(SupervisorCommand::Shutdown { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    async fn send_cmd(&self, cmd: SupervisorCommand) -> Result<(), Error> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::EventBus("supervisor is not running".into()))
    }

    async fn recv_reply<T>(rx: oneshot::Receiver<T>) -> Result<T, Error> {
        rx.await
            .map_err(|_| Error::EventBus("supervisor dropped the request".into()))
    }
}
