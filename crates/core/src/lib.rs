pub mod config;
pub mod error;
pub mod event_bus;
pub mod memory;
pub mod stores;
pub mod types;

pub use config::AppConfig;
pub use error::{LeadflowError, LeadflowResult};
pub use memory::MemoryStore;
