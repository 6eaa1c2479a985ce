//! Headless playback run over a project's program track.
//!
//! Stands in for a real surface: every load and seek is answered at once,
//! and the surface clock advances by a fixed step while playing.

use anyhow::{bail, Result};
use cutline_core::{PlaybackConfig, ProgramTime, RationalTime, SourceTime};
use cutline_playback::{
    PlaybackCommand, PlaybackEvent, PlaybackState, PlaybackSynchronizer, RecordingSurface,
    SurfaceCall,
};
use cutline_timeline::{translate, Project};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// What happened during a run.
#[derive(Debug, Default, Serialize)]
pub struct SimulationReport {
    pub steps: usize,
    pub loads: usize,
    pub seeks: usize,
    pub seamless_transitions: usize,
    pub reloads: usize,
    pub errors: Vec<String>,
    pub final_playhead_secs: f64,
}

impl SimulationReport {
    fn record(&mut self, events: &[PlaybackEvent]) {
        for event in events {
            match event {
                PlaybackEvent::SeamlessTransition { from, to } => {
                    info!(from, to, "Seamless transition");
                    self.seamless_transitions += 1;
                }
                PlaybackEvent::ReloadStarted { index, source } => {
                    info!(index, source = %source, "Reload");
                    self.reloads += 1;
                }
                PlaybackEvent::Error(message) => {
                    warn!(error = %message, "Playback error");
                    self.errors.push(message.clone());
                }
                PlaybackEvent::StateChanged(state) => debug!(state = %state, "State"),
                PlaybackEvent::PlayheadMoved(_) | PlaybackEvent::Ended => {}
            }
        }
    }
}

/// Play `project` from the start to the end of its program track.
pub fn run(project: &mut Project, config: &PlaybackConfig, step_ms: u64) -> Result<SimulationReport> {
    if step_ms == 0 {
        bail!("step must be at least 1ms");
    }
    let clips = project.timeline.program_clips();
    let total = translate::active_total(clips);
    if total.is_zero() {
        bail!("program track is empty");
    }
    let max_steps =
        (total.to_seconds_f64() * 1000.0 / step_ms as f64).ceil() as usize + 4 * clips.len() + 16;
    let step = RationalTime::from_millis(step_ms as i64);

    let mut sync = PlaybackSynchronizer::new(RecordingSurface::new(), config.clone());
    let mut report = SimulationReport::default();
    let mut clock = SourceTime::ZERO;
    let mut queue = VecDeque::from([
        PlaybackCommand::Seek(ProgramTime::ZERO),
        PlaybackCommand::Play,
    ]);

    while sync.state() != PlaybackState::Ended {
        if let Some(command) = queue.pop_front() {
            let events = sync.handle(&mut project.timeline, &project.registry, command)?;
            report.record(&events);
            for call in sync.surface_mut().take_calls() {
                match call {
                    SurfaceCall::Load { path, generation } => {
                        debug!(path = %path.display(), generation = %generation, "Load");
                        report.loads += 1;
                        queue.push_back(PlaybackCommand::ResourceReady(generation));
                    }
                    SurfaceCall::Seek {
                        position,
                        generation,
                    } => {
                        report.seeks += 1;
                        clock = position;
                        queue.push_back(PlaybackCommand::SeekCompleted(generation));
                    }
                    SurfaceCall::Play | SurfaceCall::Pause => {}
                }
            }
            continue;
        }

        if !sync.state().is_playing() {
            bail!("playback stalled in state {}", sync.state());
        }
        if report.steps >= max_steps {
            bail!("playback did not reach the end after {} steps", report.steps);
        }
        report.steps += 1;
        clock = clock + step;
        queue.push_back(PlaybackCommand::TimeAdvance(clock));
    }

    report.final_playhead_secs = project.timeline.playhead().to_seconds_f64();
    info!(
        steps = report.steps,
        seamless = report.seamless_transitions,
        reloads = report.reloads,
        "Simulation finished"
    );
    Ok(report)
}
