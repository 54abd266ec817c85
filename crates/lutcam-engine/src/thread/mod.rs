//! Dedicated render threads.
//!
//! Each pipeline owns one [`RenderThread`]. The thread owns the graphics
//! session; the owner only flips lifecycle flags through the shared
//! [`Scheduler`] and waits for the thread to acknowledge them. The thread's
//! behaviour is a fixed, ordered table of transition rules over those flags
//! (see [`Lifecycle`]); the observable phase is [`RenderState`].

mod render_thread;
mod scheduler;
mod state;

pub use render_thread::{RenderEvent, RenderRequester, RenderThread, Renderer, ThreadError};
pub use scheduler::{Scheduler, SlotId};
pub use state::{Lifecycle, RenderState, RenderStats};
