use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::context::SimulationContext;
use crate::input::KeyEvent;
use crate::sync::FrameSnapshot;

/// Something the host wants done, delivered between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Key(KeyEvent),
    SpawnSphere { radius: f32, position: [f32; 3] },
    ResetProps,
}

impl HostEvent {
    /// `down <key>`, `up <key>`, `sphere [radius]`, `reset`.
    pub fn parse_line(line: &str) -> Option<Self> {
        if let Some(key) = KeyEvent::parse_line(line) {
            return Some(HostEvent::Key(key));
        }
        let mut words = line.split_whitespace();
        match words.next()? {
            "sphere" => {
                let radius = match words.next() {
                    Some(r) => r.parse().ok()?,
                    None => 0.5,
                };
                Some(HostEvent::SpawnSphere { radius, position: [0.0, 8.0, 4.0] })
            }
            "reset" => Some(HostEvent::ResetProps),
            _ => None,
        }
    }
}

/// Measures wall time between frames. The first frame reports zero.
#[derive(Debug, Default)]
pub struct FrameClock {
    last: Option<Instant>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&mut self) -> f32 {
        let now = Instant::now();
        let dt = self.last.map(|t| (now - t).as_secs_f32()).unwrap_or(0.0);
        self.last = Some(now);
        dt
    }
}

fn handle_event(ctx: &mut SimulationContext, event: HostEvent) {
    match event {
        HostEvent::Key(key) => ctx.handle_key(&key),
        HostEvent::SpawnSphere { radius, position } => {
            if let Err(err) = ctx.spawn_sphere(radius, position) {
                warn!(%err, "sphere not spawned");
            }
        }
        HostEvent::ResetProps => {
            ctx.reset_props();
        }
    }
}

/// Runs one tick per frame interval until the render side hangs up or
/// `max_ticks` is reached. Host events queued since the last frame are
/// applied before the tick. Hands the context back when done.
pub async fn run_frame_loop(
    mut ctx: SimulationContext,
    mut events: UnboundedReceiver<HostEvent>,
    frames: UnboundedSender<FrameSnapshot>,
    frame_interval: Duration,
    max_ticks: Option<u64>,
) -> SimulationContext {
    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut clock = FrameClock::new();

    info!(interval_ms = frame_interval.as_millis() as u64, "frame loop started");

    loop {
        ticker.tick().await;

        while let Ok(event) = events.try_recv() {
            debug!(?event, "host event");
            handle_event(&mut ctx, event);
        }

        let snapshot = ctx.tick(clock.elapsed());
        if frames.send(snapshot).is_err() {
            info!(tick = ctx.tick_count(), "render side closed, stopping");
            break;
        }

        if max_ticks.is_some_and(|max| ctx.tick_count() >= max) {
            break;
        }
    }
    ctx
}
