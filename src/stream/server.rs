//! Server-side playlist stream
//!
//! A [`ServerStream`] broadcasts a playlist under a published name. Each
//! item is resolved to an on-demand input first and a live input second.
//! On-demand items are paced by their embedded timestamps:
//!
//! ```text
//!   delta = (ts - vod_start) - (now - server_start)
//!
//!   delta <= threshold   send now, pull the next message, repeat
//!   delta >  threshold   hold the message, schedule one job after delta
//! ```
//!
//! All frames already due go out in one pass; only the first frame in the
//! future costs a timer job. Live items are pushed through as they arrive.
//!
//! # Locking
//!
//! Pacing state lives behind one mutex. Public operations take it once and
//! call `*_locked` helpers, so an item ending inside the pacing loop moves
//! on to the next item under the same guard. A timer job carries the
//! sequence number it was scheduled with and does nothing unless that is
//! still the pending job when it gets the lock.
//!
//! Listeners, the output sink and handler hooks are called with the lock
//! held and must not call back into the stream.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StreamError};
use crate::media::{SharedCodecInfo, StreamCodecInfo};
use crate::messaging::pump::{self, pull_next_media};
use crate::messaging::{
    ControlMessage, ListenerSet, MediaPacket, Message, MessageConsumer, MessageSink,
    MessageSource, StreamListener,
};
use crate::playlist::{OrderingPolicy, PlayItem, Playlist, SimplePlaylistController};
use crate::registry::StreamKey;
use crate::scheduling::JobHandle;

use super::config::StreamConfig;
use super::recording::{RecorderListener, RecordingHandle};
use super::services::{StreamAwareHandler, StreamServices};
use super::state::{AtomicState, PlaybackState};

/// Source timestamp and wall-clock time that pacing is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingAnchor {
    /// Timestamp of the first message of the session, in source time
    pub source_ts: i64,
    /// Clock reading when the session (or seek) began
    pub wall_clock: i64,
}

struct PendingJob {
    seq: u64,
    handle: JobHandle,
}

#[derive(Default)]
struct Core {
    input: Option<Arc<dyn MessageSource>>,
    is_live: bool,
    live_job: Option<PendingJob>,
    vod_job: Option<PendingJob>,
    job_seq: u64,
    vod_start_ts: i64,
    server_start_ts: i64,
    next_ts: i64,
    /// Next media message sets `vod_start_ts`
    anchor_pending: bool,
    next_message: Option<MediaPacket>,
    recording: Option<RecordingHandle>,
    sent_since_play: bool,
    /// Consecutive items that ended without sending anything
    empty_items: usize,
}

/// Playlist stream broadcasting under a published name
pub struct ServerStream {
    self_ref: Weak<ServerStream>,
    scope: String,
    published_name: RwLock<Option<String>>,
    wait_threshold: i64,
    state: AtomicState,
    playlist: Playlist,
    controller: RwLock<Option<Arc<dyn OrderingPolicy>>>,
    default_controller: SimplePlaylistController,
    listeners: ListenerSet,
    output: RwLock<Option<Arc<dyn MessageSink>>>,
    codec_info: SharedCodecInfo,
    services: StreamServices,
    core: Mutex<Core>,
}

impl ServerStream {
    /// Create a stream in the UNINIT state
    pub fn new(config: StreamConfig, services: StreamServices) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| {
            let playlist = Playlist::new();
            playlist.set_repeat(config.repeat);
            playlist.set_random(config.random);
            playlist.set_rewind(config.rewind);

            Self {
                self_ref: self_ref.clone(),
                scope: config.scope,
                published_name: RwLock::new(config.published_name),
                wait_threshold: config.wait_threshold,
                state: AtomicState::default(),
                playlist,
                controller: RwLock::new(None),
                default_controller: SimplePlaylistController,
                listeners: ListenerSet::new(),
                output: RwLock::new(None),
                codec_info: StreamCodecInfo::new()
                    .buffer_interframes(config.buffer_interframes)
                    .shared(),
                services,
                core: Mutex::new(Core::default()),
            }
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn published_name(&self) -> Option<String> {
        self.published_name.read().clone()
    }

    pub fn set_published_name(&self, name: impl Into<String>) {
        *self.published_name.write() = Some(name.into());
    }

    /// Key this stream is broadcast under
    pub fn key(&self) -> StreamKey {
        StreamKey::new(
            self.scope.as_str(),
            self.published_name.read().clone().unwrap_or_default(),
        )
    }

    pub fn state(&self) -> PlaybackState {
        self.state.get()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    // Playlist passthroughs

    pub fn add_item(&self, item: PlayItem) {
        self.playlist.add_item(item);
    }

    /// Insert at `index`; see [`Playlist::insert_item`]
    pub fn insert_item(&self, item: PlayItem, index: usize) -> bool {
        self.playlist.insert_item(item, index)
    }

    pub fn remove_item(&self, index: usize) {
        self.playlist.remove_item(index);
    }

    pub fn remove_all_items(&self) {
        self.playlist.remove_all_items();
    }

    pub fn item_size(&self) -> usize {
        self.playlist.size()
    }

    pub fn items(&self) -> Arc<Vec<Arc<PlayItem>>> {
        self.playlist.items()
    }

    pub fn item(&self, index: usize) -> Option<Arc<PlayItem>> {
        self.playlist.item(index)
    }

    pub fn current_index(&self) -> i32 {
        self.playlist.current_index()
    }

    pub fn current_item(&self) -> Option<Arc<PlayItem>> {
        self.playlist.current_item()
    }

    pub fn has_more_items(&self) -> bool {
        self.playlist.has_more_items(self.playlist.is_repeat())
    }

    pub fn is_repeat(&self) -> bool {
        self.playlist.is_repeat()
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.playlist.set_repeat(repeat);
    }

    pub fn is_random(&self) -> bool {
        self.playlist.is_random()
    }

    pub fn set_random(&self, random: bool) {
        self.playlist.set_random(random);
    }

    pub fn is_rewind(&self) -> bool {
        self.playlist.is_rewind()
    }

    pub fn set_rewind(&self, rewind: bool) {
        self.playlist.set_rewind(rewind);
    }

    /// Install an ordering policy; `None` restores the default one
    pub fn set_playlist_controller(&self, controller: Option<Arc<dyn OrderingPolicy>>) {
        *self.controller.write() = controller;
    }

    pub fn add_stream_listener(&self, listener: Arc<dyn StreamListener>) -> bool {
        self.listeners.add(listener)
    }

    pub fn remove_stream_listener(&self, listener: &Arc<dyn StreamListener>) -> bool {
        self.listeners.remove(listener)
    }

    pub fn stream_listeners(&self) -> Arc<Vec<Arc<dyn StreamListener>>> {
        self.listeners.snapshot()
    }

    /// Attach the downstream sink, replacing any previous one
    pub fn connect_output(&self, sink: Arc<dyn MessageSink>) {
        *self.output.write() = Some(sink);
    }

    /// Detach the downstream sink without notifying it
    pub fn disconnect_output(&self) -> Option<Arc<dyn MessageSink>> {
        self.output.write().take()
    }

    /// Decoder state of the media this stream has dispatched
    pub fn codec_info(&self) -> SharedCodecInfo {
        Arc::clone(&self.codec_info)
    }

    pub fn pacing_anchor(&self) -> PacingAnchor {
        let core = self.core.lock();
        PacingAnchor {
            source_ts: core.vod_start_ts,
            wall_clock: core.server_start_ts,
        }
    }

    /// Whether the current item is played from a live input
    pub fn is_live(&self) -> bool {
        self.core.lock().is_live
    }

    /// Start broadcasting from the first item
    ///
    /// Fails unless the stream is UNINIT, has at least one item and has a
    /// published name.
    pub fn start(&self) -> std::result::Result<(), StreamError> {
        let mut core = self.core.lock();

        let state = self.state.get();
        if state != PlaybackState::Uninit {
            return Err(StreamError::InvalidState(state));
        }
        if self.playlist.is_empty() {
            return Err(StreamError::EmptyPlaylist);
        }
        let name = self
            .published_name()
            .ok_or(StreamError::MissingPublishedName)?;

        let key = StreamKey::new(self.scope.as_str(), name);
        if let Some(me) = self.self_ref.upgrade() {
            if !self.services.providers.register_broadcast(&key, &me) {
                tracing::warn!(stream = %key, "Broadcast registration failed");
            }
        }

        self.state
            .transition(&[PlaybackState::Uninit], PlaybackState::Stopped)
            .map_err(StreamError::InvalidState)?;
        tracing::info!(stream = %key, items = self.playlist.size(), "Server stream started");

        self.playlist.set_current_index(-1);
        core.empty_items = 0;
        self.next_item_locked(&mut core);
        Ok(())
    }

    /// Play `item`; does nothing unless STOPPED
    pub fn play(&self, item: Arc<PlayItem>) {
        let mut core = self.core.lock();
        self.play_locked(&mut core, item);
    }

    /// Toggle between PLAYING and PAUSED
    ///
    /// Resuming re-anchors pacing at the current time, so time spent paused
    /// does not count as elapsed.
    pub fn pause(&self) {
        let mut core = self.core.lock();
        match self.state.get() {
            PlaybackState::Playing => {
                if self
                    .state
                    .transition(&[PlaybackState::Playing], PlaybackState::Paused)
                    .is_ok()
                {
                    tracing::debug!(stream = %self.key(), "Paused");
                }
            }
            PlaybackState::Paused => {
                if self
                    .state
                    .transition(&[PlaybackState::Paused], PlaybackState::Playing)
                    .is_err()
                {
                    return;
                }
                tracing::debug!(stream = %self.key(), "Resumed");
                self.reset_anchor(&mut core);
                if !core.is_live {
                    self.schedule_next_locked(&mut core);
                }
            }
            _ => {}
        }
    }

    /// Ask the input to reposition to `position` ms and restart pacing
    ///
    /// Only valid while PLAYING or PAUSED.
    pub fn seek(&self, position: i64) {
        let mut core = self.core.lock();
        if !self.state.get().is_active() {
            return;
        }
        let position = position.max(0);

        if let (Some(input), Some(me)) = (core.input.clone(), self.consumer()) {
            input.send_control(&me, ControlMessage::seek(position));
        }
        tracing::debug!(stream = %self.key(), position = position, "Seek");

        self.reset_anchor(&mut core);
        self.cancel_vod_job(&mut core);
        if let Some(packet) = core.next_message.take() {
            self.send(Message::Media(packet));
        }
        self.send_reset();

        if !core.is_live {
            self.schedule_next_locked(&mut core);
        }
    }

    /// Stop the current item; only valid while PLAYING or PAUSED
    pub fn stop(&self) {
        let mut core = self.core.lock();
        self.stop_locked(&mut core);
    }

    /// Stop, detach the output and move to CLOSED for good
    pub fn close(&self) {
        let mut core = self.core.lock();
        if self.state.get() == PlaybackState::Closed {
            return;
        }
        self.stop_locked(&mut core);

        if let Some(output) = self.output.write().take() {
            output.unsubscribe();
        }
        self.notify("broadcast_close", |h, k| h.stream_broadcast_close(k));
        self.state.close();
        tracing::info!(stream = %self.key(), "Server stream closed");
    }

    pub fn next_item(&self) {
        let mut core = self.core.lock();
        self.next_item_locked(&mut core);
    }

    pub fn previous_item(&self) {
        let mut core = self.core.lock();
        self.stop_locked(&mut core);
        if let Some(item) = self.move_cursor(false) {
            self.play_locked(&mut core, item);
        }
    }

    /// Jump to `index`; out of range is ignored
    pub fn set_item(&self, index: usize) {
        let mut core = self.core.lock();
        let item = match self.playlist.item(index) {
            Some(item) => item,
            None => return,
        };
        self.stop_locked(&mut core);
        self.playlist.set_current_index(index as i32);
        self.play_locked(&mut core, item);
    }

    /// Record this stream as `name`
    ///
    /// Only one recording can be attached at a time. The recorder is handed
    /// the current decoder configurations before it starts, so a recording
    /// opened mid-stream is decodable from its first frame.
    pub fn save_as(&self, name: &str, append: bool) {
        let mut core = self.core.lock();
        let key = self.key();

        if core.recording.as_ref().and_then(|r| r.sink()).is_some() {
            tracing::info!(stream = %key, file = name, "Recording already active");
            return;
        }
        let factory = match self.services.recorder.as_ref() {
            Some(factory) => factory,
            None => {
                tracing::warn!(stream = %key, "No recorder available");
                return;
            }
        };

        let sink = factory.create();
        if !sink.init(&self.scope, name, append) {
            tracing::warn!(stream = %key, file = name, "Recorder failed to initialize");
            return;
        }

        {
            let info = self.codec_info.lock();
            if let Some(config) = info.video_configuration() {
                tracing::debug!(stream = %key, size = config.len(), "Video decoder configuration forwarded");
                sink.set_video_config(config);
            }
            if let Some(config) = info.audio_configuration() {
                tracing::debug!(stream = %key, size = config.len(), "Audio decoder configuration forwarded");
                sink.set_audio_config(config);
            }
        }

        let listener: Arc<dyn StreamListener> = Arc::new(RecorderListener::new(Arc::clone(&sink)));
        core.recording = Some(RecordingHandle::new(&sink, &listener));
        self.listeners.add(listener);
        sink.start();
        tracing::info!(stream = %key, file = %sink.file_name(), "Recording started");
    }

    /// Stop the active recording, if any
    pub fn stop_recording(&self) {
        let mut core = self.core.lock();
        self.stop_recording_locked(&mut core);
    }

    /// File name of the active recording
    pub fn save_filename(&self) -> Option<String> {
        self.core
            .lock()
            .recording
            .as_ref()
            .and_then(|r| r.sink())
            .map(|s| s.file_name())
    }

    pub fn is_recording(&self) -> bool {
        self.core
            .lock()
            .recording
            .as_ref()
            .map(|r| r.is_recording())
            .unwrap_or(false)
    }

    fn consumer(&self) -> Option<Arc<dyn MessageConsumer>> {
        self.self_ref
            .upgrade()
            .map(|me| me as Arc<dyn MessageConsumer>)
    }

    fn now(&self) -> i64 {
        self.services.clock.now_ms()
    }

    fn next_seq(core: &mut Core) -> u64 {
        core.job_seq += 1;
        core.job_seq
    }

    fn reset_anchor(&self, core: &mut Core) {
        core.vod_start_ts = 0;
        core.server_start_ts = self.now();
        core.anchor_pending = true;
    }

    /// Push through the pump, feeding the codec state on the way
    fn dispatch(&self, message: Message) -> Result<()> {
        if let Some(packet) = message.packet() {
            self.codec_info.lock().on_packet(packet);
        }
        let output = self.output.read().clone();
        pump::dispatch(message, output.as_ref(), &self.listeners, &self.key())
    }

    fn send(&self, message: Message) {
        if let Err(e) = self.dispatch(message) {
            tracing::error!(stream = %self.key(), error = %e, "Error while sending message");
        }
    }

    fn send_reset(&self) {
        let output = self.output.read().clone();
        pump::send_reset(output.as_ref(), &self.listeners, &self.key());
    }

    fn notify<F>(&self, hook: &str, call: F)
    where
        F: FnOnce(&dyn StreamAwareHandler, &StreamKey) -> Result<()>,
    {
        if let Some(handler) = self.services.handler.as_ref() {
            let key = self.key();
            if let Err(e) = call(handler.as_ref(), &key) {
                tracing::error!(stream = %key, hook = hook, error = %e, "Stream handler failed");
            }
        }
    }

    fn play_locked(&self, core: &mut Core, item: Arc<PlayItem>) {
        if self.state.get() != PlaybackState::Stopped {
            return;
        }

        let item_key = StreamKey::new(self.scope.as_str(), item.name());
        let providers = &self.services.providers;
        let (input, is_live) = match providers.vod_input(&item_key) {
            Some(input) => (input, false),
            None => match providers.live_input(&item_key, true) {
                Some(input) => (input, true),
                None => {
                    tracing::warn!(stream = %self.key(), item = %item_key, "No on-demand or live input for item");
                    return;
                }
            },
        };

        if self
            .state
            .transition(&[PlaybackState::Stopped], PlaybackState::Playing)
            .is_err()
        {
            return;
        }
        self.playlist.set_current_item(Some(Arc::clone(&item)));
        self.send_reset();

        if let Some(me) = self.consumer() {
            input.subscribe(me, None);
        }
        core.input = Some(Arc::clone(&input));
        core.is_live = is_live;
        core.sent_since_play = false;
        tracing::info!(stream = %self.key(), item = %item, live = is_live, "Playing item");

        if is_live {
            if let Some(length) = item.length_ms() {
                let seq = Self::next_seq(core);
                let weak = self.self_ref.clone();
                let handle = self.services.timer.schedule_once(
                    Duration::from_millis(length),
                    Box::new(move || {
                        if let Some(stream) = weak.upgrade() {
                            stream.on_live_job(seq);
                        }
                    }),
                );
                core.live_job = Some(PendingJob { seq, handle });
            }
        } else {
            let start = item.start_offset().max(0);
            if let Some(me) = self.consumer() {
                input.send_control(&me, ControlMessage::init(start));
            }
            self.start_broadcast_vod(core);
        }
    }

    fn start_broadcast_vod(&self, core: &mut Core) {
        core.next_message = None;
        self.reset_anchor(core);

        let recording = core
            .recording
            .as_ref()
            .map(|r| r.is_recording())
            .unwrap_or(false);
        if recording {
            self.notify("record_start", |h, k| h.stream_record_start(k));
        } else {
            self.notify("publish_start", |h, k| h.stream_publish_start(k));
        }
        self.notify("broadcast_start", |h, k| h.stream_broadcast_start(k));

        self.schedule_next_locked(core);
    }

    /// Send every due message, then defer once for the first one that is not
    fn schedule_next_locked(&self, core: &mut Core) {
        self.cancel_vod_job(core);

        loop {
            let packet = match core.next_message.take() {
                Some(packet) => packet,
                None => {
                    let pulled = match core.input.as_ref() {
                        Some(input) => pull_next_media(input.as_ref()),
                        None => return,
                    };
                    match pulled {
                        Some(packet) => packet,
                        None => {
                            self.on_input_drained(core);
                            return;
                        }
                    }
                }
            };
            if !packet.is_av() {
                continue;
            }

            let ts = packet.timestamp as i64;
            if core.anchor_pending {
                core.vod_start_ts = ts;
                core.anchor_pending = false;
            }
            core.next_ts = ts;
            let delta = ts - core.vod_start_ts - (self.now() - core.server_start_ts);
            core.next_message = Some(packet);

            if delta > self.wait_threshold {
                self.schedule_vod_job(core, delta);
                return;
            }
            if !self.do_push_locked(core) {
                return;
            }
            if self.state.get() != PlaybackState::Playing {
                core.next_message = None;
                return;
            }
        }
    }

    fn schedule_vod_job(&self, core: &mut Core, delta: i64) {
        let seq = Self::next_seq(core);
        let weak = self.self_ref.clone();
        let handle = self.services.timer.schedule_once(
            Duration::from_millis(delta as u64),
            Box::new(move || {
                if let Some(stream) = weak.upgrade() {
                    stream.on_vod_job(seq);
                }
            }),
        );
        tracing::trace!(stream = %self.key(), job = %handle, delay = delta, "Next message deferred");
        core.vod_job = Some(PendingJob { seq, handle });
    }

    fn on_vod_job(&self, seq: u64) {
        let mut core = self.core.lock();
        if core.vod_job.as_ref().map(|job| job.seq) != Some(seq) {
            return;
        }
        core.vod_job = None;

        if self.do_push_locked(&mut core) {
            if self.state.get() == PlaybackState::Playing {
                self.schedule_next_locked(&mut core);
            } else {
                core.next_message = None;
            }
        }
    }

    fn on_live_job(&self, seq: u64) {
        let mut core = self.core.lock();
        if core.live_job.as_ref().map(|job| job.seq) != Some(seq) {
            return;
        }
        core.live_job = None;
        self.end_item_locked(&mut core);
    }

    /// Send the held message unless the current item has run its length
    fn do_push_locked(&self, core: &mut Core) -> bool {
        if let Some(item) = self.playlist.current_item() {
            if let Some(length) = item.length_ms() {
                let start = item.start_offset().max(0);
                if core.next_ts - start > length as i64 {
                    self.defer_item_end(core);
                    return false;
                }
            }
        }

        match core.next_message.take() {
            Some(packet) => {
                self.send(Message::Media(packet));
                core.sent_since_play = true;
                true
            }
            None => false,
        }
    }

    fn on_input_drained(&self, core: &mut Core) {
        if core.sent_since_play {
            core.empty_items = 0;
        } else {
            core.empty_items += 1;
        }
        if core.empty_items > self.playlist.size() {
            tracing::warn!(stream = %self.key(), "No item produced any media, stopping");
            core.empty_items = 0;
            self.stop_locked(core);
            return;
        }
        self.defer_item_end(core);
    }

    /// Move on to the next item from a fresh timer job
    ///
    /// Items end inside the pacing loop; starting the next one there would
    /// nest a pacing loop per item. The job shares the `vod_job` slot, so
    /// stop, seek and resume cancel it like any deferred message.
    fn defer_item_end(&self, core: &mut Core) {
        self.cancel_vod_job(core);
        core.next_message = None;

        let seq = Self::next_seq(core);
        let weak = self.self_ref.clone();
        let handle = self.services.timer.schedule_once(
            Duration::ZERO,
            Box::new(move || {
                if let Some(stream) = weak.upgrade() {
                    stream.on_item_end_job(seq);
                }
            }),
        );
        tracing::trace!(stream = %self.key(), job = %handle, "Item end deferred");
        core.vod_job = Some(PendingJob { seq, handle });
    }

    fn on_item_end_job(&self, seq: u64) {
        let mut core = self.core.lock();
        if core.vod_job.as_ref().map(|job| job.seq) != Some(seq) {
            return;
        }
        core.vod_job = None;
        // paused: resuming pulls again and ends the item then
        if self.state.get() == PlaybackState::Playing {
            self.end_item_locked(&mut core);
        }
    }

    fn end_item_locked(&self, core: &mut Core) {
        tracing::debug!(stream = %self.key(), index = self.playlist.current_index(), "Item ended");
        self.next_item_locked(core);
    }

    fn next_item_locked(&self, core: &mut Core) {
        self.stop_locked(core);
        if let Some(item) = self.move_cursor(true) {
            self.play_locked(core, item);
        }
    }

    /// Move the cursor with the ordering policy; -1 when there is nowhere to go
    fn move_cursor(&self, forward: bool) -> Option<Arc<PlayItem>> {
        let size = self.playlist.size() as i32;
        let mut current = self.playlist.current_index();
        if current >= size {
            current = size - 1;
            self.playlist.set_current_index(current);
        }

        let installed = self.controller.read().clone();
        let policy: &dyn OrderingPolicy = match installed.as_ref() {
            Some(controller) => controller.as_ref(),
            None => &self.default_controller,
        };
        let index = if forward {
            policy.next_index(&self.playlist, current)
        } else {
            policy.previous_index(&self.playlist, current)
        };

        match index.and_then(|i| self.playlist.item(i).map(|item| (i, item))) {
            Some((i, item)) => {
                self.playlist.set_current_index(i as i32);
                Some(item)
            }
            None => {
                self.playlist.set_current_index(-1);
                None
            }
        }
    }

    fn stop_locked(&self, core: &mut Core) {
        if !self.state.get().is_active() {
            return;
        }
        if let Some(job) = core.live_job.take() {
            self.services.timer.cancel(&job.handle);
        }
        self.cancel_vod_job(core);
        if let Some(input) = core.input.take() {
            if let Some(me) = self.consumer() {
                input.unsubscribe(&me);
            }
        }
        core.next_message = None;
        self.stop_recording_locked(core);

        if self
            .state
            .transition(
                &[PlaybackState::Playing, PlaybackState::Paused],
                PlaybackState::Stopped,
            )
            .is_ok()
        {
            tracing::debug!(stream = %self.key(), "Stopped");
        }
    }

    fn cancel_vod_job(&self, core: &mut Core) {
        if let Some(job) = core.vod_job.take() {
            self.services.timer.cancel(&job.handle);
        }
    }

    fn stop_recording_locked(&self, core: &mut Core) {
        let handle = match core.recording.take() {
            Some(handle) => handle,
            None => return,
        };
        let listener = handle.listener();

        if let Some(sink) = handle.sink().filter(|s| s.is_recording()) {
            self.notify("record_stop", |h, k| h.stream_record_stop(k));
            if let Some(listener) = listener.as_ref() {
                self.listeners.remove(listener);
            }
            sink.stop();
            tracing::info!(stream = %self.key(), file = %sink.file_name(), "Recording stopped");
        } else if let Some(listener) = listener.as_ref() {
            self.listeners.remove(listener);
        }
    }
}

impl MessageConsumer for ServerStream {
    /// Live input path: dispatch straight through while PLAYING
    fn push_message(&self, message: Message) -> Result<()> {
        if self.state.get() != PlaybackState::Playing {
            return Ok(());
        }
        self.dispatch(message)
    }
}

impl fmt::Debug for ServerStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerStream")
            .field("key", &self.key())
            .field("state", &self.state.get())
            .field("items", &self.playlist.size())
            .field("current_index", &self.playlist.current_index())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::PipeError;
    use crate::registry::{MemorySource, ProviderStore};
    use crate::stream::RecordingSink;
    use crate::testing::{
        CollectingListener, CollectingSink, EventLog, FailingListener, ManualClock, ManualTimer,
        MockRecorder,
    };

    struct Harness {
        clock: Arc<ManualClock>,
        timer: Arc<ManualTimer>,
        store: Arc<ProviderStore>,
        sink: Arc<CollectingSink>,
        events: Arc<EventLog>,
        recorder: Arc<MockRecorder>,
        stream: Arc<ServerStream>,
    }

    fn harness_with(config: StreamConfig, recorder: MockRecorder) -> Harness {
        let clock = ManualClock::new();
        let timer = ManualTimer::new(clock.clone());
        let store = Arc::new(ProviderStore::new());
        let events = Arc::new(EventLog::default());
        let recorder = Arc::new(recorder);
        let made = recorder.clone();

        let services = StreamServices::new(store.clone(), timer.clone(), clock.clone())
            .recorder(Arc::new(move || made.clone() as Arc<dyn RecordingSink>))
            .handler(events.clone());
        let stream = ServerStream::new(config, services);
        let sink = Arc::new(CollectingSink::default());
        stream.connect_output(sink.clone());

        Harness {
            clock,
            timer,
            store,
            sink,
            events,
            recorder,
            stream,
        }
    }

    fn harness() -> Harness {
        harness_with(
            StreamConfig::with_name("tv").scope("vod"),
            MockRecorder::default(),
        )
    }

    fn video(ts: u32) -> Message {
        Message::Media(MediaPacket::video(ts, Bytes::from_static(&[0x27, 0x01, 0, 0, 0])))
    }

    fn register(h: &Harness, name: &str, timestamps: &[u32]) {
        h.store
            .register_vod(
                StreamKey::new("vod", name),
                timestamps.iter().map(|&ts| video(ts)).collect(),
            )
            .unwrap();
    }

    #[test]
    fn test_start_preconditions() {
        let h = harness();
        assert_eq!(h.stream.start(), Err(StreamError::EmptyPlaylist));

        let unnamed = harness_with(StreamConfig::default(), MockRecorder::default());
        unnamed.stream.add_item(PlayItem::new("a"));
        assert_eq!(unnamed.stream.start(), Err(StreamError::MissingPublishedName));
        assert_eq!(unnamed.stream.state(), PlaybackState::Uninit);

        register(&h, "a", &[0]);
        h.stream.add_item(PlayItem::new("a"));
        tokio_test::assert_ok!(h.stream.start());
        // the single frame is out; the item ends on the next timer run
        h.timer.advance(0);
        let err = tokio_test::assert_err!(h.stream.start());
        assert_eq!(err, StreamError::InvalidState(PlaybackState::Stopped));
        assert_eq!(err.to_string(), "State STOPPED not valid to start");
    }

    #[test]
    fn test_start_registers_broadcast() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        let registered = h.store.broadcast(&StreamKey::new("vod", "tv")).unwrap();
        assert!(Arc::ptr_eq(&registered, &h.stream));
        assert_eq!(h.stream.current_index(), 0);
        assert_eq!(h.stream.state(), PlaybackState::Playing);
    }

    #[test]
    fn test_pacing_sends_due_frames_and_defers_once() {
        let h = harness();
        register(&h, "a", &[0, 40, 100]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        assert_eq!(h.sink.timestamps(), vec![0]);
        assert_eq!(h.timer.delays(), vec![40]);
        assert_eq!(h.timer.pending(), 1);

        h.timer.advance(40);
        assert_eq!(h.sink.timestamps(), vec![0, 40]);
        assert_eq!(h.timer.delays(), vec![40, 60]);

        h.timer.advance(60);
        assert_eq!(h.sink.timestamps(), vec![0, 40, 100]);
        assert_eq!(h.timer.pending(), 0);

        // single item, no rewind: playback ends
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
        assert_eq!(h.stream.current_index(), -1);
        assert_eq!(h.sink.resets(), 1);
    }

    #[test]
    fn test_late_frames_batch_in_one_pass() {
        let h = harness();
        register(&h, "a", &[0, 10, 20, 30, 500]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        // the timer fires late: everything already due goes out together
        h.clock.advance(300);
        h.timer.advance(0);
        assert_eq!(h.sink.timestamps(), vec![0, 10, 20, 30]);
        assert_eq!(h.timer.delays(), vec![10, 200]);

        h.timer.advance(200);
        assert_eq!(h.sink.timestamps(), vec![0, 10, 20, 30, 500]);
    }

    #[test]
    fn test_playlist_advances_to_next_item() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        register(&h, "b", &[1000, 1020]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.add_item(PlayItem::new("b"));
        h.stream.start().unwrap();

        h.timer.advance(40);
        // "b" anchored on its own first timestamp
        assert_eq!(h.stream.current_index(), 1);
        assert_eq!(h.sink.timestamps(), vec![0, 40, 1000]);
        assert_eq!(
            h.stream.pacing_anchor(),
            PacingAnchor {
                source_ts: 1000,
                wall_clock: 40
            }
        );

        h.timer.advance(20);
        assert_eq!(h.sink.timestamps(), vec![0, 40, 1000, 1020]);
        assert_eq!(h.sink.resets(), 2);
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_bounded_item_ends_early() {
        let h = harness();
        register(&h, "a", &[0, 40, 100]);
        register(&h, "b", &[0]);
        h.stream.add_item(PlayItem::new("a").length(50));
        h.stream.add_item(PlayItem::new("b"));
        h.stream.start().unwrap();

        h.timer.advance(100);
        // 100 is past the item length; "b" plays instead
        assert_eq!(h.sink.timestamps(), vec![0, 40, 0]);
        assert_eq!(h.stream.current_index(), -1);
    }

    #[test]
    fn test_start_offset_sent_as_init() {
        let h = harness();
        let source = Arc::new(MemorySource::new(vec![video(0), video(3000), video(3040)]));
        let shared = source.clone();
        h.store
            .register_vod_with(StreamKey::new("vod", "a"), move || {
                shared.clone() as Arc<dyn MessageSource>
            })
            .unwrap();
        h.stream.add_item(PlayItem::new("a").start(3000));
        h.stream.start().unwrap();

        let controls = source.controls();
        assert_eq!(controls[0].service_name, "init");
        assert_eq!(controls[0].get("startTS"), Some(3000));
        assert_eq!(h.sink.timestamps(), vec![3000]);
        assert_eq!(h.timer.delays(), vec![40]);
    }

    #[test]
    fn test_seek_while_paused() {
        let h = harness();
        let source = Arc::new(MemorySource::new(vec![
            video(0),
            video(40),
            video(500),
            video(540),
        ]));
        let shared = source.clone();
        h.store
            .register_vod_with(StreamKey::new("vod", "a"), move || {
                shared.clone() as Arc<dyn MessageSource>
            })
            .unwrap();
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        h.stream.pause();
        assert_eq!(h.stream.state(), PlaybackState::Paused);
        h.clock.set(1000);

        h.stream.seek(500);
        assert_eq!(h.stream.state(), PlaybackState::Paused);

        let seek = &source.controls()[1];
        assert_eq!(seek.service_name, "seek");
        assert_eq!(seek.get("position"), Some(500));
        assert_eq!(
            h.stream.pacing_anchor(),
            PacingAnchor {
                source_ts: 500,
                wall_clock: 1000
            }
        );
        // held frame flushed, reset sent, one frame at the new position
        assert_eq!(h.sink.timestamps(), vec![0, 40, 500]);
        assert_eq!(h.sink.resets(), 2);
        assert_eq!(h.timer.pending(), 0);

        h.clock.set(5000);
        h.stream.pause();
        assert_eq!(h.sink.timestamps(), vec![0, 40, 500, 540]);
        assert_eq!(h.stream.pacing_anchor().wall_clock, 5000);
    }

    #[test]
    fn test_seek_clamps_and_needs_active_state() {
        let h = harness();
        let source = Arc::new(MemorySource::new(vec![video(0), video(40)]));
        let shared = source.clone();
        h.store
            .register_vod_with(StreamKey::new("vod", "a"), move || {
                shared.clone() as Arc<dyn MessageSource>
            })
            .unwrap();
        h.stream.add_item(PlayItem::new("a"));

        h.stream.seek(100);
        assert!(source.controls().is_empty());

        h.stream.start().unwrap();
        h.stream.seek(-20);
        assert_eq!(source.controls()[1].get("position"), Some(0));
    }

    #[test]
    fn test_paused_time_excluded() {
        let h = harness();
        register(&h, "a", &[0, 40, 80]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        h.timer.advance(20);
        h.stream.pause();
        h.clock.advance(10_000);
        h.stream.pause();

        // held frame 40 re-anchors the session and goes out at once
        assert_eq!(h.sink.timestamps(), vec![0, 40]);
        assert_eq!(h.timer.delays().last(), Some(&40));
    }

    #[test]
    fn test_stop_cancels_pending_job() {
        let h = harness();
        let source = Arc::new(MemorySource::new(vec![video(0), video(40)]));
        let shared = source.clone();
        h.store
            .register_vod_with(StreamKey::new("vod", "a"), move || {
                shared.clone() as Arc<dyn MessageSource>
            })
            .unwrap();
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();
        assert_eq!(source.subscriber_count(), 1);

        h.stream.stop();
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
        assert_eq!(h.timer.pending(), 0);
        assert_eq!(source.subscriber_count(), 0);

        h.timer.advance(100);
        assert_eq!(h.sink.timestamps(), vec![0]);
    }

    #[test]
    fn test_close_is_terminal() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        h.stream.close();
        assert_eq!(h.stream.state(), PlaybackState::Closed);
        assert!(h.sink.was_unsubscribed());
        assert_eq!(h.timer.pending(), 0);

        h.stream.close();
        h.stream.pause();
        h.stream.next_item();
        assert_eq!(h.stream.state(), PlaybackState::Closed);
        let closes = h
            .events
            .events()
            .iter()
            .filter(|e| e.starts_with("broadcast_close"))
            .count();
        assert_eq!(closes, 1);
    }

    #[test]
    fn test_live_item_pushes_through() {
        let h = harness();
        h.stream.add_item(PlayItem::new("cam").length(1000));
        h.stream.start().unwrap();
        assert!(h.stream.is_live());
        assert_eq!(h.timer.delays(), vec![1000]);

        let live = h.store.live_source(&StreamKey::new("vod", "cam"));
        assert_eq!(live.subscriber_count(), 1);
        live.publish(video(7));
        live.publish(video(9));
        assert_eq!(h.sink.timestamps(), vec![7, 9]);

        h.timer.advance(1000);
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
        assert_eq!(live.subscriber_count(), 0);
        live.publish(video(11));
        assert_eq!(h.sink.timestamps(), vec![7, 9]);
    }

    #[test]
    fn test_live_pause_drops_frames() {
        let h = harness();
        h.stream.add_item(PlayItem::new("cam"));
        h.stream.start().unwrap();
        assert_eq!(h.timer.pending(), 0);

        let live = h.store.live_source(&StreamKey::new("vod", "cam"));
        h.stream.pause();
        live.publish(video(1));
        h.stream.pause();
        live.publish(video(2));
        assert_eq!(h.sink.timestamps(), vec![2]);
    }

    #[test]
    fn test_empty_items_do_not_spin() {
        let h = harness_with(
            StreamConfig::with_name("tv").scope("vod").rewind(true),
            MockRecorder::default(),
        );
        register(&h, "a", &[]);
        register(&h, "b", &[]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.add_item(PlayItem::new("b"));
        h.stream.start().unwrap();
        assert_eq!(h.timer.pending(), 1);

        h.timer.advance(0);
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_single_frame_item_rewinds_through_timer() {
        let h = harness_with(
            StreamConfig::with_name("tv").scope("vod").rewind(true),
            MockRecorder::default(),
        );
        register(&h, "slate", &[0]);
        h.stream.add_item(PlayItem::new("slate"));
        h.stream.start().unwrap();

        assert_eq!(h.sink.timestamps(), vec![0]);
        assert_eq!(h.timer.pending(), 1);

        for _ in 0..3 {
            assert!(h.timer.run_next());
        }
        assert_eq!(h.sink.timestamps(), vec![0, 0, 0, 0]);
        assert_eq!(h.sink.resets(), 4);
        assert_eq!(h.stream.current_index(), 0);
        assert_eq!(h.stream.state(), PlaybackState::Playing);
        assert_eq!(h.timer.pending(), 1);

        h.stream.stop();
        assert_eq!(h.timer.pending(), 0);
        assert!(!h.timer.run_next());
    }

    #[test]
    fn test_all_due_item_repeats_through_timer() {
        let h = harness_with(
            StreamConfig::with_name("tv").scope("vod").repeat(true),
            MockRecorder::default(),
        );
        register(&h, "a", &[0, 0]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();
        assert_eq!(h.sink.timestamps(), vec![0, 0]);

        assert!(h.timer.run_next());
        assert!(h.timer.run_next());
        assert_eq!(h.sink.timestamps(), vec![0, 0, 0, 0, 0, 0]);
        assert_eq!(h.timer.pending(), 1);
        assert_eq!(h.timer.delays(), vec![0, 0, 0]);

        h.stream.close();
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_item_end_waits_while_paused() {
        let h = harness();
        register(&h, "a", &[0]);
        register(&h, "b", &[0]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.add_item(PlayItem::new("b"));
        h.stream.start().unwrap();

        // the end job fires while paused and does not move on
        h.stream.pause();
        h.timer.advance(0);
        assert_eq!(h.stream.current_index(), 0);
        assert_eq!(h.stream.state(), PlaybackState::Paused);

        h.stream.pause();
        h.timer.advance(0);
        assert_eq!(h.sink.timestamps(), vec![0, 0]);
        assert_eq!(h.stream.current_index(), -1);
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_navigation() {
        let h = harness();
        for name in ["a", "b", "c"] {
            register(&h, name, &[0, 1000]);
            h.stream.add_item(PlayItem::new(name));
        }
        h.stream.start().unwrap();
        assert_eq!(h.stream.current_item().unwrap().name(), "a");

        h.stream.next_item();
        assert_eq!(h.stream.current_index(), 1);
        h.stream.set_item(2);
        assert_eq!(h.stream.current_item().unwrap().name(), "c");
        h.stream.previous_item();
        assert_eq!(h.stream.current_index(), 1);

        // out of range: nothing changes, playback continues
        h.stream.set_item(9);
        assert_eq!(h.stream.current_index(), 1);
        assert_eq!(h.stream.state(), PlaybackState::Playing);

        h.stream.set_item(2);
        h.stream.next_item();
        assert_eq!(h.stream.current_index(), -1);
        assert_eq!(h.stream.state(), PlaybackState::Stopped);
        // one pending job at most, ever
        assert_eq!(h.timer.pending(), 0);
    }

    #[test]
    fn test_installed_policy_used() {
        struct Backwards;
        impl OrderingPolicy for Backwards {
            fn next_index(&self, playlist: &Playlist, current: i32) -> Option<usize> {
                if current <= 0 {
                    Some(playlist.size() - 1)
                } else {
                    Some(current as usize - 1)
                }
            }
            fn previous_index(&self, _playlist: &Playlist, _current: i32) -> Option<usize> {
                None
            }
        }

        let h = harness();
        for name in ["a", "b", "c"] {
            register(&h, name, &[0, 1000]);
            h.stream.add_item(PlayItem::new(name));
        }
        h.stream.set_playlist_controller(Some(Arc::new(Backwards)));
        h.stream.start().unwrap();
        assert_eq!(h.stream.current_index(), 2);

        h.stream.next_item();
        assert_eq!(h.stream.current_index(), 1);
        h.stream.previous_item();
        assert_eq!(h.stream.current_index(), -1);
    }

    #[test]
    fn test_missing_input_stays_stopped() {
        struct NoProviders;
        impl crate::registry::ProviderRegistry for NoProviders {
            fn vod_input(&self, _key: &StreamKey) -> Option<Arc<dyn MessageSource>> {
                None
            }
            fn live_input(&self, _key: &StreamKey, _create: bool) -> Option<Arc<dyn MessageSource>> {
                None
            }
            fn register_broadcast(&self, _key: &StreamKey, _stream: &Arc<ServerStream>) -> bool {
                true
            }
        }

        let clock = ManualClock::new();
        let timer = ManualTimer::new(clock.clone());
        let services = StreamServices::new(Arc::new(NoProviders), timer, clock);
        let stream = ServerStream::new(StreamConfig::with_name("tv"), services);
        stream.add_item(PlayItem::new("ghost"));

        assert!(stream.start().is_ok());
        assert_eq!(stream.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_failing_listener_isolated() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        let failing: Arc<dyn StreamListener> = Arc::new(FailingListener);
        let collecting = Arc::new(CollectingListener::default());
        h.stream.add_stream_listener(failing);
        h.stream.add_stream_listener(collecting.clone());
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();
        h.timer.advance(40);

        assert_eq!(collecting.timestamps(), vec![0, 40]);
        assert_eq!(h.sink.timestamps(), vec![0, 40]);
    }

    #[test]
    fn test_sink_failure_keeps_pacing() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        h.stream.add_item(PlayItem::new("a"));
        let listener = Arc::new(CollectingListener::default());
        h.stream.add_stream_listener(listener.clone());
        h.stream.start().unwrap();

        h.sink.fail_next();
        h.timer.advance(40);
        assert_eq!(h.sink.timestamps(), vec![0]);
        assert_eq!(listener.timestamps(), vec![0, 40]);
    }

    #[test]
    fn test_live_push_returns_sink_error() {
        let h = harness();
        h.stream.add_item(PlayItem::new("cam"));
        h.stream.start().unwrap();

        h.sink.fail_next();
        let result = h.stream.push_message(video(3));
        assert!(matches!(
            result,
            Err(crate::error::Error::Pipe(PipeError::Push(_)))
        ));
    }

    #[test]
    fn test_save_as_forwards_decoder_configuration() {
        let h = harness();
        h.stream.add_item(PlayItem::new("cam"));
        h.stream.start().unwrap();

        let avc_config = Bytes::from_static(&[0x17, 0x00, 0, 0, 0, 0x01, 0x64, 0x00, 0x1F]);
        let aac_config = Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]);
        let live = h.store.live_source(&StreamKey::new("vod", "cam"));
        live.publish(Message::Media(MediaPacket::video(0, avc_config.clone())));
        live.publish(Message::Media(MediaPacket::audio(0, aac_config.clone())));

        h.stream.save_as("archive", false);
        assert!(h.stream.is_recording());
        assert_eq!(h.recorder.video_config(), Some(avc_config));
        assert_eq!(h.recorder.audio_config(), Some(aac_config));
        assert_eq!(h.stream.save_filename().as_deref(), Some("archive.flv"));

        live.publish(video(33));
        assert_eq!(h.recorder.timestamps(), vec![33]);

        // second attach is ignored
        h.stream.save_as("other", true);
        assert_eq!(h.stream.save_filename().as_deref(), Some("archive.flv"));
        assert_eq!(h.stream.stream_listeners().len(), 1);

        h.stream.stop_recording();
        assert!(h.recorder.was_stopped());
        assert!(h.stream.stream_listeners().is_empty());
        assert!(h.stream.save_filename().is_none());
        assert!(h.events.events().contains(&"record_stop vod/tv".to_string()));
    }

    #[test]
    fn test_save_as_init_failure() {
        let h = harness_with(
            StreamConfig::with_name("tv").scope("vod"),
            MockRecorder::refusing(),
        );
        h.stream.save_as("archive", false);

        assert!(!h.stream.is_recording());
        assert!(h.stream.save_filename().is_none());
        assert!(h.stream.stream_listeners().is_empty());
    }

    #[test]
    fn test_stop_ends_recording() {
        let h = harness();
        register(&h, "a", &[0, 40]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();
        h.stream.save_as("archive", false);

        h.stream.stop();
        assert!(h.recorder.was_stopped());
        assert!(!h.stream.is_recording());
    }

    #[test]
    fn test_broadcast_hooks() {
        let h = harness();
        register(&h, "a", &[0]);
        h.stream.add_item(PlayItem::new("a"));
        h.stream.start().unwrap();

        assert_eq!(
            h.events.events(),
            vec![
                "publish_start vod/tv".to_string(),
                "broadcast_start vod/tv".to_string()
            ]
        );
    }
}
