use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use stream_protocol::{
    ChannelEvent, EventHandler, EventSource, ExecutionLauncher, LaunchRequest, RunId,
};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::LaunchError;
use crate::lock_unpoisoned;
use crate::metrics::Clock;
use crate::session::{ExecutionSession, SessionHost, StartRequest};
use crate::subscriptions::RunSubscriptions;

/// Bridges channel callbacks, which may fire on any thread, into the session.
///
/// Subscription handlers only enqueue. Queued events are applied to the
/// session, in arrival order, by [`RuntimeController::flush_pending_events`]
/// or by a running [`Ticker`].
pub struct RuntimeController {
    session: Arc<Mutex<ExecutionSession>>,
    pending_events: Arc<Mutex<VecDeque<ChannelEvent>>>,
    source: Arc<dyn EventSource>,
    launcher: Arc<dyn ExecutionLauncher>,
    clock: Arc<dyn Clock>,
    render_requests: AtomicUsize,
}

impl RuntimeController {
    pub fn new(
        session: ExecutionSession,
        source: Arc<dyn EventSource>,
        launcher: Arc<dyn ExecutionLauncher>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session: Arc::new(Mutex::new(session)),
            pending_events: Arc::new(Mutex::new(VecDeque::new())),
            source,
            launcher,
            clock,
            render_requests: AtomicUsize::new(0),
        })
    }

    pub fn session(&self) -> MutexGuard<'_, ExecutionSession> {
        lock_unpoisoned(&self.session)
    }

    pub fn start(self: &Arc<Self>, request: StartRequest) -> Result<RunId, LaunchError> {
        let mut host = Arc::clone(self);
        let mut session = lock_unpoisoned(&self.session);
        session.start(request, &mut host)
    }

    /// Applies already-delivered events, then stops the run.
    pub fn stop(&self) -> bool {
        self.flush_pending_events();
        let stopped = lock_unpoisoned(&self.session).stop(self.clock.now());
        if stopped {
            self.bump_render();
        }
        stopped
    }

    /// Applies already-delivered events, then detaches from the run.
    pub fn detach(&self, confirm: impl FnOnce() -> bool) -> bool {
        self.flush_pending_events();
        lock_unpoisoned(&self.session).detach(confirm)
    }

    /// Samples elapsed time and requests a render when it moved.
    pub fn tick(&self) -> bool {
        let changed = lock_unpoisoned(&self.session).tick(self.clock.now());
        if changed {
            self.bump_render();
        }
        changed
    }

    pub fn pending_event_count(&self) -> usize {
        lock_unpoisoned(&self.pending_events).len()
    }

    /// Drains queued channel events into the session and schedules a render.
    pub fn flush_pending_events(&self) -> usize {
        let mut drained = 0usize;

        loop {
            let event = {
                let mut pending_events = lock_unpoisoned(&self.pending_events);
                pending_events.pop_front()
            };

            match event {
                Some(event) => {
                    let now = self.clock.now();
                    lock_unpoisoned(&self.session).apply(event, now);
                    drained += 1;
                }
                None => break,
            }
        }

        if drained > 0 {
            self.bump_render();
        }

        drained
    }

    /// Number of renders requested so far.
    pub fn render_requests(&self) -> usize {
        self.render_requests.load(Ordering::SeqCst)
    }

    /// Flushes events and samples elapsed time every `interval` on a
    /// background thread until the returned handle is stopped or dropped.
    pub fn spawn_ticker(self: &Arc<Self>, interval: Duration) -> std::io::Result<Ticker> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_worker = Arc::clone(&stop);
        let controller = Arc::clone(self);
        let join_handle = thread::Builder::new()
            .name("run-engine-ticker".to_string())
            .spawn(move || {
                while !stop_for_worker.load(Ordering::SeqCst) {
                    controller.flush_pending_events();
                    controller.tick();
                    thread::sleep(interval);
                }
                debug!("ticker stopped");
            })?;

        Ok(Ticker {
            stop,
            join_handle: Some(join_handle),
        })
    }

    fn bump_render(&self) {
        self.render_requests.fetch_add(1, Ordering::SeqCst);
    }
}

impl SessionHost for Arc<RuntimeController> {
    fn launch(&mut self, request: &LaunchRequest) -> Result<RunId, String> {
        self.launcher.start_execution(request)
    }

    fn subscribe_run(&mut self, run_id: RunId) -> Result<RunSubscriptions, LaunchError> {
        let queue = Arc::clone(&self.pending_events);
        let handler: EventHandler = Arc::new(move |event: ChannelEvent| {
            lock_unpoisoned(&queue).push_back(event);
        });
        RunSubscriptions::acquire(&*self.source, run_id, handler)
    }

    fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    fn request_render(&mut self) {
        self.bump_render();
    }
}

/// Handle for the background tick loop. Dropping it stops the loop.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
