mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::Duration;

use parking_lot::Mutex;

use common::{CountingRenderer, RecordingPlatform, init_test_logging, wait_until};
use lutcam_engine::backend::headless::{HeadlessPlatform, HeadlessTarget};
use lutcam_engine::device::{
    ConfigAttribs, ConfigSpec, GraphicsPlatform, Renderable, SessionError,
};
use lutcam_engine::thread::{RenderState, RenderThread, Renderer, Scheduler, ThreadError};

fn spawn<P: GraphicsPlatform>(
    platform: P,
    target: P::Target,
    renderer: &Arc<CountingRenderer>,
) -> RenderThread<P> {
    init_test_logging();
    let renderer: Arc<dyn Renderer> = renderer.clone();
    RenderThread::spawn(
        platform,
        ConfigSpec::new(true, 3),
        target,
        (4, 4),
        Arc::downgrade(&renderer),
        Scheduler::new(),
    )
    .unwrap()
}

// ── ordering ──────────────────────────────────────────────────────────────

#[test]
fn bring_up_and_teardown_happen_in_order() {
    let (platform, log) = RecordingPlatform::new(HeadlessPlatform::new());
    let renderer = CountingRenderer::new();
    let mut thread = spawn(platform, HeadlessTarget::new(4, 4), &renderer);

    assert!(thread.request_render_and_wait());
    thread.request_exit_and_wait().unwrap();

    let log = log.lock().clone();
    assert_eq!(
        &log[..8],
        &[
            "get_display",
            "initialize",
            "configs",
            "create_context",
            "create_surface",
            "make_current",
            "create_gl",
            "swap",
        ]
    );
    assert!(log.ends_with(&[
        "release_current",
        "destroy_surface",
        "destroy_context",
        "terminate"
    ]));
    assert_eq!(renderer.created(), 1);
    assert_eq!(renderer.released(), 1);
    assert!(renderer.draws() >= 1);
}

#[test]
fn presented_frame_reaches_the_target() {
    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    let thread = spawn(HeadlessPlatform::new(), target.clone(), &renderer);

    assert!(thread.request_render_and_wait());
    assert_eq!(thread.state(), RenderState::Ready);
    assert!(target.frames_presented() >= 1);
    assert_eq!(target.last_frame().unwrap().pixel(3, 3), [0, 255, 0, 255]);
    assert!(thread.stats().frames_presented >= 1);
}

#[test]
fn exit_is_idempotent() {
    let renderer = CountingRenderer::new();
    let mut thread = spawn(HeadlessPlatform::new(), HeadlessTarget::new(4, 4), &renderer);
    thread.request_exit_and_wait().unwrap();
    thread.request_exit_and_wait().unwrap();
    assert_eq!(thread.state(), RenderState::Exited);
    assert!(!thread.request_render_and_wait());
}

// ── coalescing ────────────────────────────────────────────────────────────

#[test]
fn requests_during_a_draw_coalesce_into_one_frame() {
    let renderer = CountingRenderer::gated();
    let thread = spawn(HeadlessPlatform::new(), HeadlessTarget::new(4, 4), &renderer);

    assert!(wait_until(|| renderer.draws_started.load(Ordering::SeqCst) == 1));
    for _ in 0..5 {
        thread.request_render();
    }
    renderer.open_gate();

    assert!(wait_until(|| renderer.draws() == 2));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(renderer.draws(), 2);
}

// ── pause / surface ───────────────────────────────────────────────────────

#[test]
fn pause_releases_everything_and_resume_rebuilds_it() {
    let platform = HeadlessPlatform::new();
    let monitor = platform.monitor();
    let renderer = CountingRenderer::new();
    let thread = spawn(platform, HeadlessTarget::new(4, 4), &renderer);
    assert!(thread.request_render_and_wait());

    thread.on_pause();
    assert_eq!(thread.state(), RenderState::Paused);
    assert_eq!(monitor.contexts_alive(), 0);
    assert_eq!(monitor.surfaces_alive(), 0);
    assert_eq!(renderer.released(), 1);
    assert!(!thread.request_render_and_wait());

    thread.on_resume();
    assert!(thread.request_render_and_wait());
    assert_eq!(thread.state(), RenderState::Ready);
    assert_eq!(monitor.contexts_alive(), 1);
    assert_eq!(monitor.contexts_created(), 2);
    assert_eq!(renderer.created(), 2);
    assert_eq!(thread.stats().contexts_created, 2);
}

#[test]
fn destroyed_surface_keeps_the_context() {
    let platform = HeadlessPlatform::new();
    let monitor = platform.monitor();
    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    let thread = spawn(platform, target.clone(), &renderer);
    assert!(thread.request_render_and_wait());

    thread.surface_destroyed();
    assert_eq!(thread.state(), RenderState::ContextOnly);
    assert_eq!(monitor.contexts_alive(), 1);
    assert_eq!(monitor.surfaces_alive(), 0);
    assert!(!thread.request_render_and_wait());

    thread.surface_created(target);
    assert!(thread.request_render_and_wait());
    assert_eq!(renderer.created(), 1);
    let stats = thread.stats();
    assert_eq!(stats.contexts_created, 1);
    assert_eq!(stats.surfaces_created, 2);
}

#[test]
fn resume_without_a_surface_returns() {
    let renderer = CountingRenderer::new();
    let thread = spawn(HeadlessPlatform::new(), HeadlessTarget::new(4, 4), &renderer);
    assert!(thread.request_render_and_wait());

    thread.surface_destroyed();
    thread.on_pause();
    thread.on_resume();
    assert_eq!(thread.state(), RenderState::Idle);
    assert_eq!(renderer.released(), 1);
}

#[test]
fn repeated_surface_created_keeps_the_live_surface() {
    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    let thread = spawn(HeadlessPlatform::new(), target.clone(), &renderer);
    assert!(thread.request_render_and_wait());

    thread.surface_created(target.clone());
    thread.surface_created(target.clone());
    assert_eq!(thread.state(), RenderState::Ready);
    assert!(thread.request_render_and_wait());
    assert_eq!(thread.state(), RenderState::Ready);
    assert_eq!(thread.stats().surfaces_created, 1);
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Pause,
    Resume,
    Destroy,
    Create,
    Render,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frames {
    Same,
    More,
    Any,
}

#[test]
fn pause_resume_and_surface_calls_settle_in_any_order() {
    use Call::*;
    use Frames::*;
    use RenderState::*;

    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    let thread = spawn(HeadlessPlatform::new(), target.clone(), &renderer);
    assert!(thread.request_render_and_wait());

    // state checked after the call returns; `None` while a resumed frame
    // may still be in flight
    let sequence = [
        (Pause, Some(Paused), Same),
        (Pause, Some(Paused), Same),
        (Render, Some(Paused), Same),
        (Resume, None, Any),
        (Resume, None, Any),
        (Render, Some(Ready), More),
        (Destroy, Some(ContextOnly), Same),
        (Destroy, Some(ContextOnly), Same),
        (Pause, Some(Paused), Same),
        (Create, Some(Paused), Same),
        (Render, Some(Paused), Same),
        (Resume, None, Any),
        (Render, Some(Ready), More),
        (Create, Some(Ready), Same),
        (Render, Some(Ready), More),
        (Destroy, Some(ContextOnly), Same),
        (Pause, Some(Paused), Same),
        (Resume, Some(Idle), Same),
        (Render, Some(Idle), Same),
        (Create, None, Any),
        (Render, Some(Ready), More),
    ];

    for (i, (call, state, frames)) in sequence.into_iter().enumerate() {
        let before = thread.stats().frames_presented;
        match call {
            Pause => thread.on_pause(),
            Resume => thread.on_resume(),
            Destroy => thread.surface_destroyed(),
            Create => thread.surface_created(target.clone()),
            Render => {
                let drew = thread.request_render_and_wait();
                assert_eq!(drew, frames == More, "step {i} {call:?}");
            }
        }
        let after = thread.stats().frames_presented;

        if let Some(state) = state {
            assert_eq!(thread.state(), state, "step {i} {call:?}");
        }
        match frames {
            Same => assert_eq!(after, before, "step {i} {call:?}"),
            More => assert!(after > before, "step {i} {call:?}"),
            Any => assert!(after >= before, "step {i} {call:?}"),
        }
    }

    let stats = thread.stats();
    assert_eq!(stats.contexts_created, 4);
    assert_eq!(stats.surfaces_created, 4);
}

#[test]
fn released_context_is_recreated_on_the_next_frame() {
    let platform = HeadlessPlatform::new();
    let monitor = platform.monitor();
    let renderer = CountingRenderer::new();
    let thread = spawn(platform, HeadlessTarget::new(4, 4), &renderer);
    assert!(thread.request_render_and_wait());

    thread.release_context();
    assert!(wait_until(|| monitor.contexts_alive() == 0));
    assert!(thread.request_render_and_wait());
    assert_eq!(monitor.contexts_created(), 2);
    assert_eq!(renderer.created(), 2);
}

// ── failures ──────────────────────────────────────────────────────────────

#[test]
fn lost_context_is_rebuilt() {
    let platform = HeadlessPlatform::new();
    let monitor = platform.monitor();
    let trigger = platform.context_loss_trigger();
    let renderer = CountingRenderer::new();
    let thread = spawn(platform, HeadlessTarget::new(4, 4), &renderer);
    assert!(thread.request_render_and_wait());

    trigger.lose();
    thread.request_render_and_wait();
    assert!(thread.request_render_and_wait());

    assert_eq!(monitor.contexts_created(), 2);
    assert_eq!(monitor.contexts_alive(), 1);
    assert_eq!(renderer.created(), 2);
    assert_eq!(renderer.released(), 1);
}

#[test]
fn bad_swap_waits_for_a_new_surface() {
    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    let thread = spawn(HeadlessPlatform::new(), target.clone(), &renderer);
    assert!(thread.request_render_and_wait());
    let presented = target.frames_presented();

    target.invalidate();
    thread.request_render_and_wait();
    assert!(!thread.request_render_and_wait());
    assert_eq!(target.frames_presented(), presented);

    target.restore();
    thread.surface_destroyed();
    thread.surface_created(target.clone());
    assert!(thread.request_render_and_wait());
    assert!(target.frames_presented() > presented);
    assert_eq!(thread.stats().surfaces_created, 2);
}

#[test]
fn unusable_target_is_reported_bad_without_drawing() {
    let renderer = CountingRenderer::new();
    let target = HeadlessTarget::new(4, 4);
    target.invalidate();
    let thread = spawn(HeadlessPlatform::new(), target.clone(), &renderer);

    assert!(!thread.request_render_and_wait());
    assert_eq!(thread.state(), RenderState::SurfacePending);
    assert_eq!(renderer.draws(), 0);
    assert_eq!(target.frames_presented(), 0);
}

#[test]
fn start_failure_stops_the_thread_and_is_reported() {
    let platform = HeadlessPlatform::with_configs(vec![ConfigAttribs {
        red: 5,
        green: 6,
        blue: 5,
        alpha: 0,
        depth: 16,
        stencil: 0,
        renderable: Renderable::GLES3,
    }]);
    let renderer = CountingRenderer::new();
    let mut thread = spawn(platform, HeadlessTarget::new(4, 4), &renderer);

    assert!(wait_until(|| thread.state() == RenderState::Exited));
    assert!(!thread.request_render_and_wait());
    assert!(matches!(
        thread.take_failure(),
        Some(SessionError::NoConfig(_))
    ));
    thread.request_exit_and_wait().unwrap();
    assert_eq!(renderer.draws(), 0);
}

#[test]
fn exit_cannot_be_awaited_from_the_render_thread() {
    let renderer = CountingRenderer::new();
    let thread = Arc::new(Mutex::new(spawn(
        HeadlessPlatform::new(),
        HeadlessTarget::new(4, 4),
        &renderer,
    )));
    let (tx, rx) = mpsc::channel();

    let handle = thread.clone();
    thread.lock().queue_event(move |_gpu| {
        let mut thread = handle.lock();
        let refused = matches!(
            thread.request_exit_and_wait(),
            Err(ThreadError::CalledFromRenderThread)
        );
        let no_wait = !thread.request_render_and_wait();
        tx.send(refused && no_wait).ok();
    });

    assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok(true));
    thread.lock().request_exit_and_wait().unwrap();
}

#[test]
fn dropped_renderer_keeps_presenting() {
    init_test_logging();
    let target = HeadlessTarget::new(4, 4);
    let renderer: Arc<dyn Renderer> = CountingRenderer::new();
    let weak = Arc::downgrade(&renderer);
    drop(renderer);

    let thread = RenderThread::spawn(
        HeadlessPlatform::new(),
        ConfigSpec::new(false, 2),
        target.clone(),
        (4, 4),
        weak,
        Scheduler::new(),
    )
    .unwrap();
    assert!(thread.request_render_and_wait());
    assert!(target.frames_presented() >= 1);
}
