//! Gateway identifiers, credentials, cache keys, and token models.

pub mod credential;
pub mod id;
pub mod key;
pub mod secret;
pub mod token;

pub use credential::*;
pub use id::*;
pub use key::*;
pub use secret::*;
pub use token::*;
