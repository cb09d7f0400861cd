pub mod config;
pub mod error;
pub mod permissions;
pub mod scheme;
pub mod types;
pub mod url;

pub use config::*;
pub use error::*;
pub use permissions::*;
pub use scheme::*;
pub use types::*;
pub use url::*;
