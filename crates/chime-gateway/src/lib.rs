pub mod assembler;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod header;
pub mod registry;
pub mod session;
pub mod sink;
pub mod transport;
pub mod window;

pub use config::{AdmissionDelay, GatewayConfig};
pub use engine::Engine;
pub use error::ProtocolError;
pub use sink::MediaStore;
