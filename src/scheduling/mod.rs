//! Timers and clocks used to pace playback

pub mod clock;
pub mod timer;

pub use clock::{Clock, TokioClock};
pub use timer::{Job, JobHandle, Timer, TokioTimer};
