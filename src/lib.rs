//! Server-side playlist streams for RTMP servers
//!
//! A [`ServerStream`](stream::ServerStream) plays an ordered list of items,
//! on-demand or live, and sends each media message downstream when its
//! embedded timestamp says it is due. Alongside, it tracks the decoder
//! configuration a late-joining consumer (a recorder) needs to start
//! decoding immediately.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rtmp_playout::playlist::PlayItem;
//! use rtmp_playout::registry::{ProviderStore, StreamKey};
//! use rtmp_playout::scheduling::{TokioClock, TokioTimer};
//! use rtmp_playout::stream::{ServerStream, StreamConfig, StreamServices};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(ProviderStore::new());
//!     store.register_vod(StreamKey::new("vod", "intro"), Vec::new())?;
//!
//!     let services = StreamServices::new(
//!         store,
//!         Arc::new(TokioTimer::current()),
//!         Arc::new(TokioClock::new()),
//!     );
//!     let stream = ServerStream::new(StreamConfig::with_name("channel1").scope("vod"), services);
//!     stream.add_item(PlayItem::new("intro"));
//!     stream.start()?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod media;
pub mod messaging;
pub mod playlist;
pub mod registry;
pub mod scheduling;
pub mod stream;

#[cfg(test)]
mod testing;

pub use error::{Error, PipeError, Result, StreamError};
pub use messaging::{MediaPacket, Message, MessageSink, MessageSource};
pub use playlist::{PlayItem, Playlist};
pub use registry::{ProviderStore, StreamKey};
pub use stream::{PlaybackState, ServerStream, StreamConfig, StreamServices};
