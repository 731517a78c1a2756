pub mod model;
pub mod store;

pub use model::Credential;
pub use store::{CredentialStore, MemoryCredentialStore};
