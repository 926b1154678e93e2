pub mod context;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod security;
pub mod state;
pub mod stream;
