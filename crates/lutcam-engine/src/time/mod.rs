//! Frame timing for render threads.

mod present_clock;

pub use present_clock::{FrameTime, PresentClock};
