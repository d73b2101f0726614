pub mod broker;
pub mod jwt;
pub mod server;
pub mod sources;
pub mod store;

pub use broker::{CredentialBroker, CACHE_MARGIN_SECS};
pub use server::{start_auth_server, AuthServerHandle};
pub use sources::CredentialSource;
pub use store::CredentialStore;
