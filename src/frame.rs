use crate::animation::AnimationRegistry;
use crate::clock::{ClockSource, FrameClock};
use crate::config::{LOGGING_ENABLED, LOGGING_TIMESTEP, MINIMAL_LOGGING, STATS_UPDATE_INTERVAL};
use crate::context::SceneContext;
use crate::renderer::Renderer;

const STATS_WINDOW: usize = 60;

// ======================================
// === FRAME STATS ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsSample {
    pub fps: f32,
    pub frame_ms: f32,
}

/// Rolling frame-time average, sampled every `STATS_UPDATE_INTERVAL` seconds.
#[derive(Debug, Clone)]
pub struct FrameStats {
    frame_times: [f32; STATS_WINDOW],
    frame_index: usize,
    filled: usize,
    update_timer: f32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frame_times: [0.0; STATS_WINDOW],
            frame_index: 0,
            filled: 0,
            update_timer: 0.0,
        }
    }
}

impl FrameStats {
    pub fn record(&mut self, delta: f32) -> Option<StatsSample> {
        self.frame_times[self.frame_index] = delta;
        self.frame_index = (self.frame_index + 1) % STATS_WINDOW;
        self.filled = (self.filled + 1).min(STATS_WINDOW);
        self.update_timer += delta;

        if self.update_timer < STATS_UPDATE_INTERVAL {
            return None;
        }
        self.update_timer = 0.0;

        let avg = self.frame_times[..self.filled].iter().sum::<f32>() / self.filled as f32;
        if avg <= 0.0 {
            return None;
        }
        Some(StatsSample {
            fps: 1.0 / avg,
            frame_ms: avg * 1000.0,
        })
    }
}

// ======================================
// === FRAME LOOP ===
// ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub delta: f32,
    pub completions: usize,
    pub players_advanced: usize,
    pub camera_moved: bool,
    pub rendered: bool,
    pub stats: Option<StatsSample>,
}

pub struct FrameLoop {
    state: FrameState,
    clock: Box<dyn ClockSource>,
    frame_clock: FrameClock,
    players: AnimationRegistry,
    stats: FrameStats,
    frame_count: u64,
}

impl FrameLoop {
    pub fn new(clock: Box<dyn ClockSource>) -> Self {
        Self {
            state: FrameState::Idle,
            clock,
            frame_clock: FrameClock::new(),
            players: AnimationRegistry::new(),
            stats: FrameStats::default(),
            frame_count: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // Current clock reading, for timestamping host input.
    pub fn now(&self) -> f64 {
        self.clock.elapsed_seconds()
    }

    pub fn players(&self) -> &AnimationRegistry {
        &self.players
    }

    pub fn players_mut(&mut self) -> &mut AnimationRegistry {
        &mut self.players
    }

    /// Runs one frame: apply arrived loads, measure delta, advance players,
    /// update the camera, render. Never waits on pending loads.
    pub fn tick(&mut self, ctx: &mut SceneContext, renderer: Option<&mut dyn Renderer>) -> FrameReport {
        if self.state == FrameState::Idle {
            log::info!("Frame loop running");
            self.state = FrameState::Running;
        }

        let completions = ctx.drain_loads(&mut self.players);

        let delta = self.frame_clock.advance(self.clock.elapsed_seconds());
        let players_advanced = self.players.advance_all(&mut ctx.graph, delta);
        let camera_moved = ctx.camera.update();

        let rendered = match renderer {
            Some(renderer) => match renderer.render(&ctx.graph, &ctx.camera.camera) {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("Frame {} not rendered: {}", self.frame_count, err);
                    false
                }
            },
            None => false,
        };

        self.frame_count += 1;
        if LOGGING_ENABLED && self.frame_count % LOGGING_TIMESTEP == 0 {
            log::debug!(
                "Frame {}: dt {:.4}s, {} player(s), {} pending load(s)",
                self.frame_count,
                delta,
                self.players.len(),
                ctx.pending()
            );
        }

        let stats = self.stats.record(delta);
        if let Some(sample) = stats {
            if MINIMAL_LOGGING {
                log::info!(
                    "FPS: {:.1}, Frame: {:.2}ms, Players: {}, Nodes: {}",
                    sample.fps,
                    sample.frame_ms,
                    self.players.len(),
                    ctx.graph.len()
                );
            }
        }

        FrameReport {
            frame: self.frame_count,
            delta,
            completions,
            players_advanced,
            camera_moved,
            rendered,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::renderer::recording::RecordingRenderer;
    use crate::viewport::ViewportState;
    use approx::assert_relative_eq;
    use std::rc::Rc;

    #[test]
    fn first_tick_starts_the_loop_with_zero_delta() {
        let clock = Rc::new(ManualClock::new(5.0));
        let mut frames = FrameLoop::new(Box::new(Rc::clone(&clock)));
        let mut ctx = SceneContext::new(ViewportState::default()).unwrap();
        assert_eq!(frames.state(), FrameState::Idle);

        let report = frames.tick(&mut ctx, None);
        assert_eq!(frames.state(), FrameState::Running);
        assert_eq!(report.delta, 0.0);
        assert!(!report.rendered);

        clock.advance(0.25);
        assert_relative_eq!(frames.tick(&mut ctx, None).delta, 0.25);
    }

    #[test]
    fn render_errors_do_not_stop_the_loop() {
        let clock = Rc::new(ManualClock::new(0.0));
        let mut frames = FrameLoop::new(Box::new(Rc::clone(&clock)));
        let mut ctx = SceneContext::new(ViewportState::default()).unwrap();
        let mut renderer = RecordingRenderer {
            fail_renders: true,
            ..Default::default()
        };

        for _ in 0..3 {
            clock.advance(0.016);
            let report = frames.tick(&mut ctx, Some(&mut renderer));
            assert!(!report.rendered);
        }
        assert_eq!(renderer.renders(), 3);
        assert_eq!(frames.frame_count(), 3);
    }

    #[test]
    fn stats_sample_after_interval() {
        let mut stats = FrameStats::default();
        let samples: Vec<_> = (0..60).filter_map(|_| stats.record(1.0 / 60.0)).collect();
        assert_eq!(samples.len(), 1);
        assert_relative_eq!(samples[0].fps, 60.0, epsilon = 1e-2);
        assert_eq!(stats.record(0.0), None);
    }
}
