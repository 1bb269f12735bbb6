//! Auth-domain identifiers, scope sets, and credential models.

pub mod credential;
pub mod id;
pub mod scope;

pub use credential::*;
pub use id::*;
pub use scope::*;
