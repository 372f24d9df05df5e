//! Auth-domain scope sets, redacted secrets, and token models.

pub mod scope;
pub mod secret;
pub mod token;

pub use scope::*;
pub use secret::*;
pub use token::*;
