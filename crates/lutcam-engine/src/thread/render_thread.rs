use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::Mutex;
use thiserror::Error;

use crate::device::{
    ConfigSpec, GraphicsContextSession, GraphicsPlatform, SessionError, SurfaceError, SwapStatus,
};
use crate::gpu::GpuApi;
use crate::time::PresentClock;

use super::state::{Flow, LoopLocals, SessionOps};
use super::{Lifecycle, RenderState, RenderStats, Scheduler, SlotId};

/// Drawing callbacks, invoked on the render thread with the context current.
///
/// The thread only holds a weak reference; once the renderer is dropped the
/// thread keeps presenting without drawing until it is told to exit.
pub trait Renderer: Send + Sync {
    fn on_context_created(&self, gpu: &mut dyn GpuApi, requester: &RenderRequester);

    fn on_draw_frame(&self, gpu: &mut dyn GpuApi);

    /// The context is about to be destroyed; its objects are already dead
    /// from the renderer's point of view.
    fn on_context_released(&self) {}
}

/// Work to run on the render thread before the next draw.
pub type RenderEvent = Box<dyn FnOnce(&mut dyn GpuApi) + Send>;

/// Cloneable handle that asks a render thread for another frame.
#[derive(Clone)]
pub struct RenderRequester {
    link: Option<(Scheduler, SlotId)>,
}

impl RenderRequester {
    pub(crate) fn attached(scheduler: Scheduler, slot: SlotId) -> Self {
        Self {
            link: Some((scheduler, slot)),
        }
    }

    /// A requester bound to no thread; requests are dropped.
    pub fn detached() -> Self {
        Self { link: None }
    }

    pub fn request_render(&self) {
        if let Some((scheduler, slot)) = &self.link {
            scheduler.update(*slot, |lc| lc.request_render = true);
        }
    }
}

impl fmt::Debug for RenderRequester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRequester")
            .field("slot", &self.link.as_ref().map(|(_, slot)| slot.index()))
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("a render thread cannot wait for its own exit")]
    CalledFromRenderThread,

    #[error("failed to spawn render thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("render thread panicked")]
    Panicked,
}

struct Shared<T> {
    target: Mutex<Option<T>>,
    events: Mutex<VecDeque<RenderEvent>>,
    failure: Mutex<Option<SessionError>>,
}

/// Owner-side handle of a dedicated render thread.
///
/// Every method except the render request helpers blocks until the thread
/// has acknowledged the change, so when one returns the flag it set has been
/// acted upon (or the thread has exited).
pub struct RenderThread<P: GraphicsPlatform> {
    scheduler: Scheduler,
    slot: SlotId,
    shared: Arc<Shared<P::Target>>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl<P: GraphicsPlatform> RenderThread<P> {
    /// Starts the thread with an output target already available.
    pub fn spawn(
        platform: P,
        spec: ConfigSpec,
        target: P::Target,
        (width, height): (u32, u32),
        renderer: Weak<dyn Renderer>,
        scheduler: Scheduler,
    ) -> Result<Self, ThreadError> {
        let slot = scheduler.register(Lifecycle::new(width, height, true));
        let shared = Arc::new(Shared {
            target: Mutex::new(Some(target)),
            events: Mutex::new(VecDeque::new()),
            failure: Mutex::new(None),
        });

        let worker = Worker {
            scheduler: scheduler.clone(),
            slot,
            shared: shared.clone(),
            session: GraphicsContextSession::new(platform, spec),
            renderer,
            clock: PresentClock::new(),
        };

        let spawned = thread::Builder::new()
            .name(format!("lutcam-render-{}", slot.index()))
            .spawn(move || worker.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                scheduler.unregister(slot);
                return Err(e.into());
            }
        };
        let thread_id = handle.thread().id();

        Ok(Self {
            scheduler,
            slot,
            shared,
            handle: Some(handle),
            thread_id,
        })
    }

    fn on_render_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Asks for one more frame. Requests made before the frame starts
    /// coalesce into it.
    pub fn request_render(&self) {
        self.scheduler.update(self.slot, |lc| lc.request_render = true);
    }

    pub fn requester(&self) -> RenderRequester {
        RenderRequester::attached(self.scheduler.clone(), self.slot)
    }

    /// Requests a frame and blocks until it has been presented. Returns
    /// `false` without waiting for a frame when the thread cannot draw
    /// (paused, no usable surface, exited).
    pub fn request_render_and_wait(&self) -> bool {
        if self.on_render_thread() {
            log::warn!("request_render_and_wait on the render thread would deadlock");
            return false;
        }
        self.scheduler.update_and_wait(
            self.slot,
            |lc| {
                lc.want_render_notification = true;
                lc.render_complete = false;
                lc.request_render = true;
            },
            |lc| {
                lc.exited
                    || lc.render_complete
                    || lc.paused
                    || !lc.has_surface
                    || lc.surface_is_bad
                    || lc.width == 0
                    || lc.height == 0
            },
        );
        self.scheduler
            .snapshot(self.slot)
            .is_some_and(|lc| lc.render_complete)
    }

    /// A new output target is available. Blocks until the thread has
    /// noticed it. Repeating the call for a target the thread already
    /// uses changes nothing; replacing it needs `surface_destroyed` first.
    pub fn surface_created(&self, target: P::Target) {
        *self.shared.target.lock() = Some(target);
        self.scheduler.update_and_wait(
            self.slot,
            |lc| {
                if !lc.has_surface || lc.waiting_for_surface {
                    lc.finished_creating_surface = false;
                }
                lc.has_surface = true;
            },
            |lc| !lc.waiting_for_surface || lc.finished_creating_surface || lc.exited,
        );
    }

    /// The output target is going away. Blocks until the thread no longer
    /// uses it.
    pub fn surface_destroyed(&self) {
        self.scheduler.update_and_wait(
            self.slot,
            |lc| lc.has_surface = false,
            |lc| lc.waiting_for_surface || lc.exited,
        );
        *self.shared.target.lock() = None;
    }

    /// Blocks until the thread is paused; surface and context are released
    /// by then.
    pub fn on_pause(&self) {
        self.scheduler.update_and_wait(
            self.slot,
            |lc| lc.request_paused = true,
            |lc| lc.exited || lc.paused,
        );
    }

    /// Blocks until the thread has left the paused state or finished a frame.
    pub fn on_resume(&self) {
        self.scheduler.update_and_wait(
            self.slot,
            |lc| {
                lc.request_paused = false;
                lc.request_render = true;
                lc.render_complete = false;
            },
            |lc| lc.exited || !lc.paused || lc.render_complete,
        );
    }

    /// Drops surface and context at the next opportunity; they are recreated
    /// on a later render request.
    pub fn release_context(&self) {
        self.scheduler
            .update(self.slot, |lc| lc.should_release_context = true);
    }

    /// Runs `event` on the render thread before the next draw.
    pub fn queue_event(&self, event: impl FnOnce(&mut dyn GpuApi) + Send + 'static) {
        self.shared.events.lock().push_back(Box::new(event));
        self.request_render();
    }

    /// Stops the thread and joins it. Idempotent; refuses to run on the
    /// render thread itself.
    pub fn request_exit_and_wait(&mut self) -> Result<(), ThreadError> {
        if self.on_render_thread() {
            return Err(ThreadError::CalledFromRenderThread);
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.scheduler.update_and_wait(
            self.slot,
            |lc| lc.should_exit = true,
            |lc| lc.exited,
        );
        handle.join().map_err(|_| ThreadError::Panicked)
    }

    pub fn state(&self) -> RenderState {
        self.scheduler
            .snapshot(self.slot)
            .map_or(RenderState::Exited, |lc| lc.state())
    }

    pub fn stats(&self) -> RenderStats {
        self.scheduler
            .snapshot(self.slot)
            .map(|lc| lc.stats())
            .unwrap_or_default()
    }

    /// The fatal error that stopped the thread, if any.
    pub fn take_failure(&self) -> Option<SessionError> {
        self.shared.failure.lock().take()
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl<P: GraphicsPlatform> Drop for RenderThread<P> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.request_exit_and_wait() {
                log::error!("render thread not joined: {e}");
                self.scheduler.update(self.slot, |lc| lc.should_exit = true);
            }
        }
        self.scheduler.unregister(self.slot);
    }
}

/// Thread-side state. Lives entirely on the render thread.
struct Worker<P: GraphicsPlatform> {
    scheduler: Scheduler,
    slot: SlotId,
    shared: Arc<Shared<P::Target>>,
    session: GraphicsContextSession<P>,
    renderer: Weak<dyn Renderer>,
    clock: PresentClock,
}

/// Marks the thread exited when dropped, including during a panic unwind.
struct ExitSignal {
    scheduler: Scheduler,
    slot: SlotId,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.scheduler.update(self.slot, |lc| lc.exited = true);
    }
}

/// Lets the lifecycle rules drive the session and tell the renderer when
/// its context goes away.
struct SessionHooks<'a, P: GraphicsPlatform> {
    session: &'a mut GraphicsContextSession<P>,
    renderer: &'a Weak<dyn Renderer>,
}

impl<P: GraphicsPlatform> SessionOps for SessionHooks<'_, P> {
    fn start(&mut self) -> Result<(), SessionError> {
        self.session.start()
    }

    fn destroy_surface(&mut self) {
        self.session.destroy_surface();
    }

    fn finish(&mut self) {
        if let Some(renderer) = self.renderer.upgrade() {
            renderer.on_context_released();
        }
        if let Err(e) = self.session.finish() {
            log::error!("context teardown failed: {e}");
        }
    }
}

impl<P: GraphicsPlatform> Worker<P> {
    fn run(mut self) {
        let _exit = ExitSignal {
            scheduler: self.scheduler.clone(),
            slot: self.slot,
        };
        log::info!("render thread started");

        let result = self.render_loop();
        self.teardown();

        if let Err(e) = result {
            log::error!("render thread stopped: {e}");
            *self.shared.failure.lock() = Some(e);
        }
        log::info!("render thread exiting");
    }

    fn teardown(&mut self) {
        let mut guard = self.scheduler.lock();
        let mut hooks = SessionHooks {
            session: &mut self.session,
            renderer: &self.renderer,
        };
        if let Some(lc) = guard.lifecycle(self.slot) {
            lc.stop_surface(&mut hooks);
            lc.stop_context(&mut hooks);
        }
        drop(guard);
        if let Err(e) = self.session.finish() {
            log::error!("session teardown failed: {e}");
        }
    }

    fn render_loop(&mut self) -> Result<(), SessionError> {
        let mut locals = LoopLocals::default();
        let requester = RenderRequester::attached(self.scheduler.clone(), self.slot);

        loop {
            {
                let mut guard = self.scheduler.lock();
                loop {
                    let Some(lc) = guard.lifecycle(self.slot) else {
                        return Ok(());
                    };
                    let mut hooks = SessionHooks {
                        session: &mut self.session,
                        renderer: &self.renderer,
                    };
                    let step = lc.advance(&mut locals, &mut hooks)?;
                    if step.notify {
                        guard.notify_all();
                    }
                    match step.flow {
                        Flow::Exit => return Ok(()),
                        Flow::Draw => break,
                        Flow::Continue | Flow::Wait => guard.wait(),
                    }
                }
            }

            if std::mem::take(&mut locals.resumed) {
                self.clock.reset();
            }

            if locals.create_surface {
                let target = self.shared.target.lock().clone();
                let created = match &target {
                    Some(target) => self.session.create_surface(target),
                    None => Err(SurfaceError::BadNativeWindow),
                };
                let ok = created.is_ok();
                self.scheduler.update(self.slot, |lc| {
                    lc.finished_creating_surface = true;
                    if ok {
                        lc.stats.surfaces_created += 1;
                    } else {
                        lc.surface_is_bad = true;
                    }
                });
                if !ok {
                    continue;
                }
                locals.create_surface = false;
            }

            if locals.create_gl {
                self.session.create_gl();
                locals.create_gl = false;
            }

            self.draw(&mut locals, &requester);

            match self.session.swap() {
                SwapStatus::Success => {
                    let frame = self.clock.tick();
                    let fps = self.clock.frames_per_second();
                    self.scheduler.update(self.slot, |lc| {
                        lc.stats.frames_presented += 1;
                        lc.stats.last_frame_dt = frame.dt;
                        lc.stats.frames_per_second = fps;
                    });
                }
                SwapStatus::ContextLost => {
                    log::warn!("graphics context lost; recreating");
                    locals.lost_context = true;
                }
                SwapStatus::BadSurface(reason) => {
                    log::warn!("swap_buffers failed: {reason}; waiting for a new surface");
                    self.scheduler
                        .update(self.slot, |lc| lc.surface_is_bad = true);
                }
            }

            if locals.want_render_notification {
                locals.do_render_notification = true;
            }
        }
    }

    fn draw(&mut self, locals: &mut LoopLocals, requester: &RenderRequester) {
        let Some(gl) = self.session.gl_mut() else {
            log::warn!("no GL entry points for the current surface");
            return;
        };
        let renderer = self.renderer.upgrade();

        if std::mem::take(&mut locals.create_context) {
            if let Some(renderer) = &renderer {
                renderer.on_context_created(gl, requester);
            }
        }

        let events: Vec<RenderEvent> = self.shared.events.lock().drain(..).collect();
        for event in events {
            event(gl);
        }

        match &renderer {
            Some(renderer) => renderer.on_draw_frame(gl),
            None => log::trace!("renderer dropped; presenting without drawing"),
        }
    }
}
