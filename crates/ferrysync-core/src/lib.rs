pub mod confine;
pub mod config;
pub mod error;
pub mod types;

pub use config::ServerConfig;
pub use confine::Confinement;
pub use error::{FerrysyncError, FerrysyncResult};
pub use types::ClientId;
