//! Shared harness for supervisor integration tests: in-memory database,
//! sqlite repositories, and the scriptable session factory.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use tokio::time::{Duration, sleep};
use uuid::Uuid;

use afkbot_common::models::account::{Account, CredentialKind};
use afkbot_common::models::connection::ConnectionState;
use afkbot_common::models::settings::ServerSettings;
use afkbot_common::traits::repository_traits::{AccountRepository, SettingsRepository};
use afkbot_core::eventbus::EventBus;
use afkbot_core::repositories::sqlite::{
    SqliteAccountRepository, SqliteChatLogRepository, SqliteSettingsRepository,
};
use afkbot_core::test_utils::{FakeSessionFactory, setup_test_database};
use afkbot_core::{ConnectionSupervisor, SupervisorConfig};

pub struct Harness {
    pub supervisor: ConnectionSupervisor,
    pub factory: Arc<FakeSessionFactory>,
    pub accounts: Arc<SqliteAccountRepository>,
    pub chat_log: Arc<SqliteChatLogRepository>,
    pub event_bus: Arc<EventBus>,
}

/// Settings with a reachable address and every optional behavior off.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        server_address: "localhost:25565".into(),
        login_delay_seconds: 0,
        ..ServerSettings::default()
    }
}

/// A reconnect config fast enough for tests.
pub fn fast_reconnect_config(max_attempts: u32) -> SupervisorConfig {
    SupervisorConfig {
        reconnect_base_delay: Duration::from_millis(20),
        reconnect_max_delay: Duration::from_millis(100),
        max_reconnect_attempts: max_attempts,
        ..SupervisorConfig::default()
    }
}

pub async fn harness(settings: ServerSettings, config: SupervisorConfig) -> Harness {
    afkbot_core::utils::init_tracing();
    let db = setup_test_database().await;
    let accounts = Arc::new(SqliteAccountRepository::new(db.pool().clone()));
    let settings_repo = Arc::new(SqliteSettingsRepository::new(db.pool().clone()));
    let chat_log = Arc::new(SqliteChatLogRepository::new(db.pool().clone()));
    settings_repo
        .update_settings(&settings)
        .await
        .expect("seed settings");

    let factory = Arc::new(FakeSessionFactory::new());
    let event_bus = Arc::new(EventBus::new());

    let supervisor = ConnectionSupervisor::spawn(
        config,
        accounts.clone(),
        settings_repo,
        chat_log.clone(),
        factory.clone(),
        event_bus.clone(),
    );

    Harness {
        supervisor,
        factory,
        accounts,
        chat_log,
        event_bus,
    }
}

impl Harness {
    /// Insert a token account and return it.
    pub async fn add_account(&self, nickname: &str) -> Account {
        let account = Account::new(CredentialKind::Token, None, Some(nickname.into()));
        self.accounts
            .create_account(&account)
            .await
            .expect("create account");
        account
    }

    /// Connect an account and wait for it to reach `Connected`.
    pub async fn connect_and_wait(&self, account_id: Uuid) {
        self.supervisor
            .connect(account_id)
            .await
            .expect("connect accepted");
        wait_for_state(&self.supervisor, account_id, ConnectionState::Connected).await;
    }
}

/// Poll until the account reaches `state`, panicking after ~2s.
pub async fn wait_for_state(
    supervisor: &ConnectionSupervisor,
    account_id: Uuid,
    state: ConnectionState,
) {
    for _ in 0..200 {
        if supervisor.status(account_id).state == state {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "account {} stuck in {} waiting for {}",
        account_id,
        supervisor.status(account_id).state,
        state
    );
}

/// Poll until `check` passes, panicking after ~4s.
pub async fn wait_until(mut check: impl FnMut() -> bool, what: &str) {
    for _ in 0..400 {
        if check() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}
