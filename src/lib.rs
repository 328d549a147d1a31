pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod inventory;
pub mod notify;
pub mod pipeline;
pub mod process;
pub mod publish;
pub mod store;
