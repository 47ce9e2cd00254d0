pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod server;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod validate;

pub use error::{RelayError, Result};

/**
 * \brief SDK prelude with the commonly used modules.
 */
pub mod prelude {
    pub use crate::config;
    pub use crate::config::JsonFile;
    pub use crate::llm;
    pub use crate::models;
    pub use crate::server;
    pub use crate::session;
    pub use crate::state;
    pub use crate::telemetry;
    pub use crate::validate;
}
