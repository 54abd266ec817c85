use crate::device::SessionError;

/// Observable phase of a render thread, derived from its lifecycle flags.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RenderState {
    /// No context; waiting for a surface, a size or a render request.
    Idle,
    /// Context alive, no window surface.
    ContextOnly,
    /// Surface requested and not usable yet: creation is still in flight or
    /// failed, and a new output target is needed.
    SurfacePending,
    /// Context and surface ready; draws whenever a render is requested.
    Ready,
    Paused,
    Exiting,
    Exited,
}

/// Presentation counters kept alongside the lifecycle.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frames_presented: u64,
    pub contexts_created: u64,
    pub surfaces_created: u64,
    /// Seconds between the last two presented frames.
    pub last_frame_dt: f32,
    pub frames_per_second: f32,
}

/// Flags shared between a render thread and its owner. Only read or written
/// with the scheduler lock held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lifecycle {
    pub(crate) should_exit: bool,
    pub(crate) exited: bool,
    pub(crate) request_paused: bool,
    pub(crate) paused: bool,
    /// The owner has an output target for us.
    pub(crate) has_surface: bool,
    pub(crate) surface_is_bad: bool,
    pub(crate) waiting_for_surface: bool,
    pub(crate) have_context: bool,
    /// Surface acquired from the lifecycle's point of view; creation may
    /// still be in flight (see `finished_creating_surface`).
    pub(crate) have_surface: bool,
    pub(crate) finished_creating_surface: bool,
    pub(crate) should_release_context: bool,
    pub(crate) request_render: bool,
    pub(crate) want_render_notification: bool,
    pub(crate) render_complete: bool,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) stats: RenderStats,
}

impl Lifecycle {
    pub(crate) fn new(width: u32, height: u32, has_surface: bool) -> Self {
        Self {
            has_surface,
            request_render: true,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn state(&self) -> RenderState {
        if self.exited {
            RenderState::Exited
        } else if self.should_exit {
            RenderState::Exiting
        } else if self.paused {
            RenderState::Paused
        } else if self.have_surface && (!self.finished_creating_surface || self.surface_is_bad) {
            RenderState::SurfacePending
        } else if self.have_surface {
            RenderState::Ready
        } else if self.have_context {
            RenderState::ContextOnly
        } else {
            RenderState::Idle
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub(crate) fn ready_to_draw(&self) -> bool {
        !self.paused
            && self.has_surface
            && !self.surface_is_bad
            && self.width > 0
            && self.height > 0
            && self.request_render
    }

    /// A surface implies a context.
    pub(crate) fn is_consistent(&self) -> bool {
        !self.have_surface || self.have_context
    }

    pub(crate) fn stop_surface<S: SessionOps>(&mut self, session: &mut S) {
        if self.have_surface {
            self.have_surface = false;
            session.destroy_surface();
        }
    }

    pub(crate) fn stop_context<S: SessionOps>(&mut self, session: &mut S) {
        if self.have_context {
            session.finish();
            self.have_context = false;
        }
    }

    /// Runs the transition rules in order until one decides what the thread
    /// does next.
    pub(crate) fn advance<S: SessionOps>(
        &mut self,
        locals: &mut LoopLocals,
        session: &mut S,
    ) -> Result<Step, SessionError> {
        let mut notify = false;
        // Both only hold for the pass that set them.
        locals.pausing = false;
        locals.asked_to_release_context = false;
        for (name, rule) in rules::<S>() {
            let flow = rule(self, locals, session, &mut notify)?;
            debug_assert!(self.is_consistent(), "rule `{name}` broke the lifecycle");
            if flow != Flow::Continue {
                log::trace!("rule `{name}` -> {flow:?}");
                return Ok(Step { flow, notify });
            }
        }
        Ok(Step {
            flow: Flow::Wait,
            notify,
        })
    }
}

/// Session operations the rules perform while holding the lock.
pub(crate) trait SessionOps {
    fn start(&mut self) -> Result<(), SessionError>;
    fn destroy_surface(&mut self);
    fn finish(&mut self);
}

/// Per-thread state that lives across loop iterations but is never shared.
#[derive(Debug, Default)]
pub(crate) struct LoopLocals {
    pub(crate) create_context: bool,
    pub(crate) create_surface: bool,
    pub(crate) create_gl: bool,
    pub(crate) lost_context: bool,
    pub(crate) want_render_notification: bool,
    pub(crate) do_render_notification: bool,
    pub(crate) asked_to_release_context: bool,
    pub(crate) pausing: bool,
    /// Set when the thread leaves the paused state; cleared by the loop.
    pub(crate) resumed: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Flow {
    /// Rule did not apply; try the next one.
    Continue,
    Exit,
    /// Leave the lock and draw a frame.
    Draw,
    /// Nothing to do until notified.
    Wait,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Step {
    pub(crate) flow: Flow,
    /// Waiters must be woken before the thread waits or leaves the lock.
    pub(crate) notify: bool,
}

type Rule<S> =
    fn(&mut Lifecycle, &mut LoopLocals, &mut S, &mut bool) -> Result<Flow, SessionError>;

fn rules<S: SessionOps>() -> [(&'static str, Rule<S>); 11] {
    [
        ("exit", exit::<S>),
        ("pause-toggle", pause_toggle::<S>),
        ("release-context", release_context::<S>),
        ("lost-context", lost_context::<S>),
        ("pausing-surface", pausing_surface::<S>),
        ("pausing-context", pausing_context::<S>),
        ("lost-output-target", lost_output_target::<S>),
        ("acquired-output-target", acquired_output_target::<S>),
        ("render-notification", render_notification::<S>),
        ("ready-to-draw", ready_to_draw::<S>),
        ("wait", wait::<S>),
    ]
}

fn exit<S>(
    lc: &mut Lifecycle,
    _: &mut LoopLocals,
    _: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    Ok(if lc.should_exit { Flow::Exit } else { Flow::Continue })
}

fn pause_toggle<S>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    _: &mut S,
    notify: &mut bool,
) -> Result<Flow, SessionError> {
    if lc.paused != lc.request_paused {
        locals.pausing = lc.request_paused;
        locals.resumed = !lc.request_paused;
        lc.paused = lc.request_paused;
        *notify = true;
        log::debug!("{}", if lc.paused { "paused" } else { "resumed" });
    }
    Ok(Flow::Continue)
}

fn release_context<S: SessionOps>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    session: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    if lc.should_release_context {
        lc.stop_surface(session);
        lc.stop_context(session);
        lc.should_release_context = false;
        locals.asked_to_release_context = true;
    }
    Ok(Flow::Continue)
}

fn lost_context<S: SessionOps>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    session: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    if locals.lost_context {
        lc.stop_surface(session);
        lc.stop_context(session);
        locals.lost_context = false;
    }
    Ok(Flow::Continue)
}

fn pausing_surface<S: SessionOps>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    session: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    if locals.pausing && lc.have_surface {
        lc.stop_surface(session);
    }
    Ok(Flow::Continue)
}

fn pausing_context<S: SessionOps>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    session: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    if locals.pausing && lc.have_context {
        lc.stop_context(session);
    }
    Ok(Flow::Continue)
}

fn lost_output_target<S: SessionOps>(
    lc: &mut Lifecycle,
    _: &mut LoopLocals,
    session: &mut S,
    notify: &mut bool,
) -> Result<Flow, SessionError> {
    if !lc.has_surface && !lc.waiting_for_surface {
        if lc.have_surface {
            lc.stop_surface(session);
        }
        lc.waiting_for_surface = true;
        lc.surface_is_bad = false;
        *notify = true;
    }
    Ok(Flow::Continue)
}

fn acquired_output_target<S>(
    lc: &mut Lifecycle,
    _: &mut LoopLocals,
    _: &mut S,
    notify: &mut bool,
) -> Result<Flow, SessionError> {
    if lc.has_surface && lc.waiting_for_surface {
        lc.waiting_for_surface = false;
        *notify = true;
    }
    Ok(Flow::Continue)
}

fn render_notification<S>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    _: &mut S,
    notify: &mut bool,
) -> Result<Flow, SessionError> {
    if locals.do_render_notification {
        locals.want_render_notification = false;
        locals.do_render_notification = false;
        lc.want_render_notification = false;
        lc.render_complete = true;
        *notify = true;
    }
    Ok(Flow::Continue)
}

fn ready_to_draw<S: SessionOps>(
    lc: &mut Lifecycle,
    locals: &mut LoopLocals,
    session: &mut S,
    notify: &mut bool,
) -> Result<Flow, SessionError> {
    if !lc.ready_to_draw() {
        return Ok(Flow::Continue);
    }

    if !lc.have_context {
        if locals.asked_to_release_context {
            locals.asked_to_release_context = false;
        } else {
            session.start()?;
            lc.have_context = true;
            lc.stats.contexts_created += 1;
            locals.create_context = true;
            *notify = true;
        }
    }

    if lc.have_context && !lc.have_surface {
        lc.have_surface = true;
        lc.finished_creating_surface = false;
        locals.create_surface = true;
        locals.create_gl = true;
    }

    if lc.have_surface {
        lc.request_render = false;
        *notify = true;
        if lc.want_render_notification {
            locals.want_render_notification = true;
        }
        return Ok(Flow::Draw);
    }
    Ok(Flow::Continue)
}

fn wait<S>(
    _: &mut Lifecycle,
    _: &mut LoopLocals,
    _: &mut S,
    _: &mut bool,
) -> Result<Flow, SessionError> {
    Ok(Flow::Wait)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct FakeSession {
        calls: Vec<&'static str>,
        fail_start: bool,
    }

    impl SessionOps for FakeSession {
        fn start(&mut self) -> Result<(), SessionError> {
            self.calls.push("start");
            if self.fail_start {
                Err(SessionError::NoConfig("test".into()))
            } else {
                Ok(())
            }
        }

        fn destroy_surface(&mut self) {
            self.calls.push("destroy_surface");
        }

        fn finish(&mut self) {
            self.calls.push("finish");
        }
    }

    fn drawing() -> (Lifecycle, LoopLocals, FakeSession) {
        let mut lc = Lifecycle::new(8, 8, true);
        let mut locals = LoopLocals::default();
        let mut session = FakeSession::default();
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step.flow, Flow::Draw);
        lc.finished_creating_surface = true;
        (lc, locals, session)
    }

    // ── start-up ──────────────────────────────────────────────────────────

    #[test]
    fn first_pass_creates_context_and_draws() {
        let mut lc = Lifecycle::new(8, 8, true);
        let mut locals = LoopLocals::default();
        let mut session = FakeSession::default();

        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step, Step { flow: Flow::Draw, notify: true });
        assert_eq!(session.calls, ["start"]);
        assert!(locals.create_context && locals.create_surface && locals.create_gl);
        assert!(lc.have_context && lc.have_surface);
        assert!(!lc.request_render);
        assert_eq!(lc.state(), RenderState::SurfacePending);
        assert_eq!(lc.stats.contexts_created, 1);
    }

    #[test]
    fn zero_size_never_draws() {
        let mut lc = Lifecycle::new(0, 8, true);
        let step = lc
            .advance(&mut LoopLocals::default(), &mut FakeSession::default())
            .unwrap();
        assert_eq!(step.flow, Flow::Wait);
        assert_eq!(lc.state(), RenderState::Idle);
    }

    #[test]
    fn start_failure_propagates() {
        let mut lc = Lifecycle::new(8, 8, true);
        let mut session = FakeSession {
            fail_start: true,
            ..Default::default()
        };
        assert!(lc.advance(&mut LoopLocals::default(), &mut session).is_err());
        assert!(!lc.have_context);
    }

    // ── render requests ───────────────────────────────────────────────────

    #[test]
    fn requests_coalesce_into_one_draw() {
        let (mut lc, mut locals, mut session) = drawing();
        assert_eq!(lc.state(), RenderState::Ready);
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Wait);

        for _ in 0..5 {
            lc.request_render = true;
        }
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Draw);
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Wait);
        assert_eq!(session.calls, ["start"]);
    }

    #[test]
    fn render_notification_follows_the_draw() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.want_render_notification = true;
        lc.request_render = true;
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Draw);
        assert!(locals.want_render_notification);
        assert!(!lc.render_complete);

        // the loop hands this over after swapping
        locals.do_render_notification = true;
        locals.want_render_notification = false;
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert!(step.notify);
        assert!(lc.render_complete);
        assert!(!lc.want_render_notification);
    }

    // ── pause / resume ────────────────────────────────────────────────────

    #[test]
    fn pausing_releases_surface_then_context() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.request_paused = true;
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step, Step { flow: Flow::Wait, notify: true });
        assert_eq!(session.calls, ["start", "destroy_surface", "finish"]);
        assert_eq!(lc.state(), RenderState::Paused);
        assert!(!lc.have_context && !lc.have_surface);

        lc.request_paused = false;
        lc.request_render = true;
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step.flow, Flow::Draw);
        assert!(locals.resumed);
        assert_eq!(lc.stats.contexts_created, 2);
    }

    #[test]
    fn pause_without_surface_still_toggles() {
        let mut lc = Lifecycle::new(8, 8, false);
        let mut locals = LoopLocals::default();
        let mut session = FakeSession::default();
        lc.request_paused = true;
        assert!(lc.advance(&mut locals, &mut session).unwrap().notify);
        assert!(lc.paused);
        lc.request_paused = false;
        lc.advance(&mut locals, &mut session).unwrap();
        assert!(!lc.paused);
        assert!(session.calls.is_empty());
    }

    // ── output target ─────────────────────────────────────────────────────

    #[test]
    fn losing_the_target_drops_surface_keeps_context() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.has_surface = false;
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step, Step { flow: Flow::Wait, notify: true });
        assert!(lc.waiting_for_surface);
        assert!(!lc.have_surface && lc.have_context);
        assert_eq!(lc.state(), RenderState::ContextOnly);
        assert_eq!(session.calls, ["start", "destroy_surface"]);

        lc.has_surface = true;
        lc.request_render = true;
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Draw);
        assert!(!lc.waiting_for_surface);
        assert_eq!(session.calls, ["start", "destroy_surface"]);
    }

    #[test]
    fn bad_surface_blocks_drawing_until_a_new_target() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.surface_is_bad = true;
        lc.request_render = true;
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Wait);

        lc.has_surface = false;
        lc.advance(&mut locals, &mut session).unwrap();
        assert!(!lc.surface_is_bad);
    }

    #[test]
    fn failed_surface_is_not_reported_ready() {
        let (mut lc, _, _) = drawing();
        assert_eq!(lc.state(), RenderState::Ready);

        lc.surface_is_bad = true;
        assert_eq!(lc.state(), RenderState::SurfacePending);

        lc.paused = true;
        assert_eq!(lc.state(), RenderState::Paused);
    }

    // ── context loss / release ────────────────────────────────────────────

    #[test]
    fn lost_context_is_recreated_on_next_draw() {
        let (mut lc, mut locals, mut session) = drawing();
        locals.lost_context = true;
        lc.request_render = true;
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Draw);
        assert_eq!(session.calls, ["start", "destroy_surface", "finish", "start"]);
        assert!(locals.create_context);
    }

    #[test]
    fn released_context_skips_one_recreation() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.should_release_context = true;
        lc.request_render = true;
        let step = lc.advance(&mut locals, &mut session).unwrap();
        assert_eq!(step.flow, Flow::Wait);
        assert_eq!(session.calls, ["start", "destroy_surface", "finish"]);
        assert!(!locals.asked_to_release_context);

        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Draw);
        assert_eq!(session.calls.last(), Some(&"start"));
    }

    // ── exit ──────────────────────────────────────────────────────────────

    #[test]
    fn exit_wins_over_everything() {
        let (mut lc, mut locals, mut session) = drawing();
        lc.should_exit = true;
        lc.request_render = true;
        lc.request_paused = true;
        assert_eq!(lc.advance(&mut locals, &mut session).unwrap().flow, Flow::Exit);
        assert_eq!(lc.state(), RenderState::Exiting);
        assert_eq!(session.calls, ["start"]);
    }

    #[test]
    fn surface_implies_context_after_every_step() {
        let (mut lc, mut locals, mut session) = drawing();
        let toggles: [fn(&mut Lifecycle); 4] = [
            |lc| lc.request_paused = !lc.request_paused,
            |lc| lc.has_surface = !lc.has_surface,
            |lc| lc.should_release_context = true,
            |lc| lc.request_render = true,
        ];
        for toggle in toggles {
            for _ in 0..3 {
                toggle(&mut lc);
                lc.advance(&mut locals, &mut session).unwrap();
                lc.finished_creating_surface = true;
                assert!(lc.is_consistent(), "{lc:?}");
            }
        }
    }
}
