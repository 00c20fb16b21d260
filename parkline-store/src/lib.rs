pub mod app_config;
pub mod database;
pub mod ledger_repo;
pub mod blynk;
pub mod whatsapp;
pub mod mail_relay;

pub use database::DbClient;
pub use ledger_repo::SqliteLedger;
pub use blynk::BlynkClient;
pub use whatsapp::WhatsAppNotifier;
pub use mail_relay::MailRelayNotifier;
