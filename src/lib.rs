pub mod client;
pub mod configuration;
pub mod protocol;
pub mod server;

// Re-export specific items from server
pub use server::services;
