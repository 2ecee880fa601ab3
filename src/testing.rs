//! Test doubles shared by the unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{PipeError, Result};
use crate::messaging::{
    ControlMessage, MediaPacket, Message, MessageConsumer, MessageSink, MessageSource,
    StreamListener,
};
use crate::registry::StreamKey;
use crate::scheduling::{Clock, Job, JobHandle, Timer};
use crate::stream::{RecordingSink, StreamAwareHandler};

/// Clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct ScheduledJob {
    due: i64,
    handle: JobHandle,
    job: Job,
}

/// Timer driven by [`ManualTimer::advance`]
///
/// Due jobs run on the calling thread, in due order, with no timer lock
/// held so they may schedule further jobs.
pub struct ManualTimer {
    clock: Arc<ManualClock>,
    jobs: Mutex<Vec<ScheduledJob>>,
    delays: Mutex<Vec<u64>>,
    next_id: AtomicU64,
}

impl ManualTimer {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            jobs: Mutex::new(Vec::new()),
            delays: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Jobs scheduled and not yet run or cancelled
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Every delay ever requested, in milliseconds
    pub fn delays(&self) -> Vec<u64> {
        self.delays.lock().clone()
    }

    /// Move the clock forward by `ms`, running jobs as they fall due
    pub fn advance(&self, ms: i64) {
        let target = self.clock.now_ms() + ms;
        loop {
            let next = {
                let mut jobs = self.jobs.lock();
                let earliest = jobs
                    .iter()
                    .enumerate()
                    .filter(|(_, j)| j.due <= target)
                    .min_by_key(|(_, j)| j.due)
                    .map(|(i, _)| i);
                earliest.map(|i| jobs.remove(i))
            };
            match next {
                Some(scheduled) => {
                    if scheduled.due > self.clock.now_ms() {
                        self.clock.set(scheduled.due);
                    }
                    (scheduled.job)();
                }
                None => break,
            }
        }
        self.clock.set(target);
    }

    /// Run the earliest job already due, leaving the clock alone
    ///
    /// Returns `false` when nothing is due.
    pub fn run_next(&self) -> bool {
        let now = self.clock.now_ms();
        let next = {
            let mut jobs = self.jobs.lock();
            let earliest = jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| j.due <= now)
                .min_by_key(|(_, j)| j.due)
                .map(|(i, _)| i);
            earliest.map(|i| jobs.remove(i))
        };
        match next {
            Some(scheduled) => {
                (scheduled.job)();
                true
            }
            None => false,
        }
    }
}

impl Timer for ManualTimer {
    fn schedule_once(&self, delay: Duration, job: Job) -> JobHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = JobHandle::new(format!("ManualJob_{}", id));
        let delay_ms = delay.as_millis() as u64;
        self.delays.lock().push(delay_ms);
        self.jobs.lock().push(ScheduledJob {
            due: self.clock.now_ms() + delay_ms as i64,
            handle: handle.clone(),
            job,
        });
        handle
    }

    fn cancel(&self, handle: &JobHandle) {
        self.jobs.lock().retain(|j| &j.handle != handle);
    }
}

/// Sink recording everything pushed to it
#[derive(Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<Message>>,
    fail_next: AtomicBool,
    unsubscribed: AtomicBool,
}

impl CollectingSink {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Timestamps of the media messages received
    pub fn timestamps(&self) -> Vec<u32> {
        self.messages
            .lock()
            .iter()
            .filter_map(|m| m.packet().map(|p| p.timestamp))
            .collect()
    }

    pub fn resets(&self) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| matches!(m, Message::Reset))
            .count()
    }

    /// Make the next push fail
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn was_unsubscribed(&self) -> bool {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

impl MessageSink for CollectingSink {
    fn push(&self, message: Message) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PipeError::Push("sink refused message".into()).into());
        }
        self.messages.lock().push(message);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.unsubscribed.store(true, Ordering::SeqCst);
    }
}

/// Listener recording packet timestamps
#[derive(Default)]
pub struct CollectingListener {
    timestamps: Mutex<Vec<u32>>,
}

impl CollectingListener {
    pub fn timestamps(&self) -> Vec<u32> {
        self.timestamps.lock().clone()
    }
}

impl StreamListener for CollectingListener {
    fn packet_received(&self, _stream: &StreamKey, packet: &MediaPacket) -> Result<()> {
        self.timestamps.lock().push(packet.timestamp);
        Ok(())
    }
}

/// Listener failing on every packet
pub struct FailingListener;

impl StreamListener for FailingListener {
    fn packet_received(&self, _stream: &StreamKey, _packet: &MediaPacket) -> Result<()> {
        Err(PipeError::Listener("listener exploded".into()).into())
    }
}

/// Source whose pulls always fail
pub struct FailingSource;

impl MessageSource for FailingSource {
    fn pull(&self) -> Result<Option<Message>> {
        Err(PipeError::Pull("source unavailable".into()).into())
    }

    fn subscribe(
        &self,
        _consumer: Arc<dyn MessageConsumer>,
        _params: Option<HashMap<String, String>>,
    ) -> bool {
        true
    }

    fn unsubscribe(&self, _consumer: &Arc<dyn MessageConsumer>) -> bool {
        true
    }

    fn send_control(&self, _consumer: &Arc<dyn MessageConsumer>, _message: ControlMessage) {}
}

/// Consumer recording pushed messages
#[derive(Default)]
pub struct CollectingConsumer {
    messages: Mutex<Vec<Message>>,
}

impl CollectingConsumer {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }
}

impl MessageConsumer for CollectingConsumer {
    fn push_message(&self, message: Message) -> Result<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// In-memory recording sink
#[derive(Default)]
pub struct MockRecorder {
    refuse_init: bool,
    file_name: Mutex<String>,
    video_config: Mutex<Option<Bytes>>,
    audio_config: Mutex<Option<Bytes>>,
    timestamps: Mutex<Vec<u32>>,
    recording: AtomicBool,
    stopped: AtomicBool,
}

impl MockRecorder {
    /// Recorder whose `init` fails
    pub fn refusing() -> Self {
        Self {
            refuse_init: true,
            ..Default::default()
        }
    }

    pub fn video_config(&self) -> Option<Bytes> {
        self.video_config.lock().clone()
    }

    pub fn audio_config(&self) -> Option<Bytes> {
        self.audio_config.lock().clone()
    }

    pub fn timestamps(&self) -> Vec<u32> {
        self.timestamps.lock().clone()
    }

    pub fn was_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl RecordingSink for MockRecorder {
    fn init(&self, _scope: &str, name: &str, append: bool) -> bool {
        if self.refuse_init {
            return false;
        }
        let suffix = if append { "+" } else { "" };
        *self.file_name.lock() = format!("{}.flv{}", name, suffix);
        true
    }

    fn set_video_config(&self, config: Bytes) {
        *self.video_config.lock() = Some(config);
    }

    fn set_audio_config(&self, config: Bytes) {
        *self.audio_config.lock() = Some(config);
    }

    fn start(&self) {
        self.recording.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.recording.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    fn file_name(&self) -> String {
        self.file_name.lock().clone()
    }

    fn packet_received(&self, _stream: &StreamKey, packet: &MediaPacket) -> Result<()> {
        self.timestamps.lock().push(packet.timestamp);
        Ok(())
    }
}

/// Handler logging every hook as "<hook> <stream>"
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn log(&self, hook: &str, stream: &StreamKey) -> Result<()> {
        self.events.lock().push(format!("{} {}", hook, stream));
        Ok(())
    }
}

impl StreamAwareHandler for EventLog {
    fn stream_publish_start(&self, stream: &StreamKey) -> Result<()> {
        self.log("publish_start", stream)
    }

    fn stream_record_start(&self, stream: &StreamKey) -> Result<()> {
        self.log("record_start", stream)
    }

    fn stream_broadcast_start(&self, stream: &StreamKey) -> Result<()> {
        self.log("broadcast_start", stream)
    }

    fn stream_broadcast_close(&self, stream: &StreamKey) -> Result<()> {
        self.log("broadcast_close", stream)
    }

    fn stream_record_stop(&self, stream: &StreamKey) -> Result<()> {
        self.log("record_stop", stream)
    }
}
