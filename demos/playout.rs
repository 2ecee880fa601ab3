//! Playlist playout example
//!
//! Run with: cargo run --example playout
//!
//! Plays two generated on-demand clips back to back through a sink that
//! logs every message, paced in real time by the tokio timer. Halfway
//! through the first clip a recorder is attached; it receives the AVC
//! decoder configuration before any frame.
//!
//! Set `RUST_LOG=rtmp_playout=trace` to watch the pacing decisions.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use rtmp_playout::error::Result;
use rtmp_playout::messaging::{MediaPacket, Message, MessageSink};
use rtmp_playout::playlist::PlayItem;
use rtmp_playout::registry::{ProviderStore, StreamKey};
use rtmp_playout::scheduling::{TokioClock, TokioTimer};
use rtmp_playout::stream::{
    PlaybackState, RecordingSink, ServerStream, StreamConfig, StreamServices,
};

/// Sink printing what it is sent
struct LoggingSink;

impl MessageSink for LoggingSink {
    fn push(&self, message: Message) -> Result<()> {
        match message {
            Message::Media(packet) => tracing::info!(
                kind = ?packet.kind,
                timestamp = packet.timestamp,
                size = packet.size(),
                "-> media"
            ),
            other => tracing::info!(message = ?other, "-> control"),
        }
        Ok(())
    }
}

/// Recorder that only counts what it would write
#[derive(Default)]
struct CountingRecorder {
    name: Mutex<String>,
    header: Mutex<Option<Bytes>>,
    frames: AtomicUsize,
    recording: AtomicBool,
}

impl RecordingSink for CountingRecorder {
    fn init(&self, scope: &str, name: &str, _append: bool) -> bool {
        *self.name.lock() = format!("{}/{}.flv", scope, name);
        true
    }

    fn set_video_config(&self, config: Bytes) {
        *self.header.lock() = Some(config);
    }

    fn set_audio_config(&self, _config: Bytes) {}

    fn start(&self) {
        self.recording.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.recording.store(false, Ordering::SeqCst);
        tracing::info!(
            file = %self.name.lock(),
            frames = self.frames.load(Ordering::SeqCst),
            header = self.header.lock().is_some(),
            "Recorder finished"
        );
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn file_name(&self) -> String {
        self.name.lock().clone()
    }

    fn packet_received(&self, _stream: &StreamKey, _packet: &MediaPacket) -> Result<()> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// AVC clip: sequence header, then a keyframe every second, 25 fps
fn clip(seconds: u32) -> Vec<Message> {
    let mut messages = vec![Message::Media(MediaPacket::video(
        0,
        Bytes::from_static(&[0x17, 0x00, 0, 0, 0, 0x01, 0x64, 0x00, 0x1F, 0xFF]),
    ))];
    for frame in 0..seconds * 25 {
        let ts = frame * 40;
        let data = if frame % 25 == 0 {
            Bytes::from_static(&[0x17, 0x01, 0, 0, 0, 0x65, 0x88])
        } else {
            Bytes::from_static(&[0x27, 0x01, 0, 0, 0, 0x41, 0x9A])
        };
        messages.push(Message::Media(MediaPacket::video(ts, data)));
    }
    messages
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtmp_playout=debug".parse()?),
        )
        .init();

    let store = Arc::new(ProviderStore::new());
    store.register_vod(StreamKey::new("vod", "intro"), clip(2))?;
    store.register_vod(StreamKey::new("vod", "feature"), clip(5))?;

    let recorder = Arc::new(CountingRecorder::default());
    let factory_recorder = Arc::clone(&recorder);
    let services = StreamServices::new(
        store.clone(),
        Arc::new(TokioTimer::current()),
        Arc::new(TokioClock::new()),
    )
    .recorder(Arc::new(move || {
        Arc::clone(&factory_recorder) as Arc<dyn RecordingSink>
    }));

    let stream = ServerStream::new(StreamConfig::with_name("channel1").scope("vod"), services);
    stream.add_item(PlayItem::new("intro"));
    // play three seconds of the feature, starting one second in
    stream.add_item(PlayItem::new("feature").start(1000).length(3000));
    stream.connect_output(Arc::new(LoggingSink));

    stream.start()?;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    stream.save_as("channel1-archive", false);

    let watch = async {
        while stream.state() == PlaybackState::Playing {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    };

    tokio::select! {
        _ = watch => println!("Playlist finished"),
        _ = tokio::signal::ctrl_c() => println!("\nShutting down..."),
    }

    stream.close();
    Ok(())
}
