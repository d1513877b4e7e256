pub mod config;
pub mod events;

pub use config::AppConfig;
pub use events::EventKey;
