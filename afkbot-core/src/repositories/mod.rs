pub mod sqlite;

pub use afkbot_common::traits::repository_traits::{
    AccountRepository, ChatLogRepository, SettingsRepository,
};
