pub mod accounts;
pub mod chat_log;
pub mod settings;

pub use accounts::SqliteAccountRepository;
pub use chat_log::SqliteChatLogRepository;
pub use settings::SqliteSettingsRepository;
