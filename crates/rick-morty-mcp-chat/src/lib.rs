pub mod agent;
pub mod client;
pub mod config;
pub mod errors;
pub mod llm;
pub mod logging;
pub mod session;
