//! Provider registry and in-memory sources
//!
//! The registry resolves a stream name to an input for a server stream to
//! play from, and records which streams are being broadcast:
//!
//! ```text
//!                      Arc<ProviderStore>
//!                 ┌────────────────────────┐
//!                 │ vod:  Key -> factory   │──► MemorySource (per request)
//!                 │ live: Key -> LiveSource│──► shared, push mode
//!                 │ broadcasts: Key -> Weak│
//!                 └───────────┬────────────┘
//!                             │ vod_input() / live_input()
//!                             ▼
//!                       [ServerStream]
//! ```

pub mod error;
pub mod key;
pub mod source;
pub mod store;

pub use error::RegistryError;
pub use key::StreamKey;
pub use source::{LiveSource, MemorySource};
pub use store::{ProviderRegistry, ProviderStore};
