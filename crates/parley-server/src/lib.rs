pub mod auth;
pub mod bridge;
pub mod connection;
pub mod lifecycle;
pub mod pairing;
pub mod registry;
pub mod relay;
pub mod server;

pub use auth::TokenVerifier;
pub use connection::ClientRegistry;
pub use lifecycle::{ChatState, Controller, Phase};
pub use pairing::PairingQueue;
pub use registry::SessionRegistry;
pub use relay::RelayEngine;
pub use server::{start, ServerConfig, ServerHandle};
