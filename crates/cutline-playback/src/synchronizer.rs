//! Playback synchronizer.
//!
//! Drives one [`PlaybackSurface`] through the program track. Every load and
//! seek carries a fresh [`Generation`]; a completion is applied only if it
//! answers the request still outstanding, so superseded loads and seeks
//! simply fall away. The timeline's playhead stays authoritative: progress
//! from the surface is translated into program time and written back,
//! coalesced so listeners are not flooded.

use cutline_core::{CutlineError, PlaybackConfig, ProgramTime, RationalTime, Result, SourceTime};
use cutline_timeline::{translate, ClipRegistry, InstanceId, SourceClipId, Timeline};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::scrub::{ProgressCoalescer, ScrubThrottle};
use crate::state::{PlaybackCommand, PlaybackEvent, PlaybackEvents, PlaybackState};
use crate::surface::{Generation, PlaybackSurface};

#[derive(Debug, Clone)]
struct PendingLoad {
    generation: Generation,
    index: usize,
    instance_id: InstanceId,
    source_id: SourceClipId,
    /// Where to position the resource once it is ready.
    seek_to: SourceTime,
    auto_resume: bool,
}

#[derive(Debug, Clone, Copy)]
struct PendingSeek {
    generation: Generation,
    index: usize,
    position: ProgramTime,
    /// Playback should be running once the seek lands.
    resume: bool,
}

#[derive(Debug, Clone)]
struct ScrubSession {
    /// Play again on release.
    resume: bool,
    throttle: ScrubThrottle,
    started_at: Instant,
}

/// How an async completion relates to the outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Current,
    Stale,
}

fn classify(outstanding: Option<Generation>, received: Generation) -> Completion {
    if outstanding == Some(received) {
        Completion::Current
    } else {
        Completion::Stale
    }
}

/// Instance index and active offset for `p` on the program track. Past the
/// end this is the last instance's active end.
fn resolve(timeline: &Timeline, p: ProgramTime) -> Option<(usize, RationalTime)> {
    let clips = timeline.program_clips();
    if let Some(loc) = translate::locate_program(clips, p) {
        return Some((loc.index, loc.offset));
    }
    let last = clips.len().checked_sub(1)?;
    Some((last, clips[last].active_duration()))
}

/// State machine turning commands into surface requests.
#[derive(Debug)]
pub struct PlaybackSynchronizer<S> {
    surface: S,
    config: PlaybackConfig,
    state: PlaybackState,
    generation: Generation,
    /// Source whose resource is loaded and ready on the surface.
    loaded_source: Option<SourceClipId>,
    current_index: usize,
    /// Exact program position of the surface, before coalescing.
    position: ProgramTime,
    /// Instance on screen and the surface's time in its source.
    presented: Option<(InstanceId, SourceTime)>,
    pending_load: Option<PendingLoad>,
    pending_seek: Option<PendingSeek>,
    scrub: Option<ScrubSession>,
    coalescer: ProgressCoalescer,
    last_good: (usize, ProgramTime),
}

impl<S: PlaybackSurface> PlaybackSynchronizer<S> {
    pub fn new(surface: S, config: PlaybackConfig) -> Self {
        Self {
            surface,
            coalescer: ProgressCoalescer::new(config.progress_interval()),
            config,
            state: PlaybackState::Idle,
            generation: Generation::default(),
            loaded_source: None,
            current_index: 0,
            position: ProgramTime::ZERO,
            presented: None,
            pending_load: None,
            pending_seek: None,
            scrub: None,
            last_good: (0, ProgramTime::ZERO),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Generation of the most recent request.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Exact program position of the surface.
    pub fn position(&self) -> ProgramTime {
        self.position
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn into_surface(self) -> S {
        self.surface
    }

    /// Consume one command.
    ///
    /// Invalid input (negative seek, scrub commands outside a scrub, play on
    /// an empty program) is rejected before anything changes. Resource
    /// failures are not errors here: they come back as
    /// [`PlaybackEvent::Error`] with playback paused.
    pub fn handle(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        command: PlaybackCommand,
    ) -> Result<PlaybackEvents> {
        let mut events = PlaybackEvents::new();
        match command {
            PlaybackCommand::Play => self.play(timeline, registry, &mut events)?,
            PlaybackCommand::Pause => self.pause(timeline, &mut events)?,
            PlaybackCommand::Seek(position) => self.seek(timeline, registry, position, &mut events)?,
            PlaybackCommand::BeginScrub { at } => self.begin_scrub(timeline, at, &mut events)?,
            PlaybackCommand::ScrubTo { position, at } => {
                self.scrub_to(timeline, registry, position, at, &mut events)?
            }
            PlaybackCommand::EndScrub => self.end_scrub(timeline, registry, &mut events)?,
            PlaybackCommand::BoundaryCrossed | PlaybackCommand::SurfaceEnded => {
                if self.state.is_playing() {
                    self.cross_boundary(timeline, registry, &mut events)?;
                }
            }
            PlaybackCommand::ResourceReady(generation) => {
                self.on_ready(timeline, registry, generation, &mut events)?
            }
            PlaybackCommand::ResourceFailed {
                generation,
                message,
            } => {
                let outstanding = self.pending_load.as_ref().map(|p| p.generation);
                match classify(outstanding, generation) {
                    Completion::Current => self.fail(timeline, message, &mut events)?,
                    Completion::Stale => self.log_stale("load failure", generation),
                }
            }
            PlaybackCommand::SeekCompleted(generation) => self.on_seek_completed(generation),
            PlaybackCommand::SeekFailed {
                generation,
                message,
            } => {
                let outstanding = self.pending_seek.map(|s| s.generation);
                match classify(outstanding, generation) {
                    Completion::Current => self.fail(timeline, message, &mut events)?,
                    Completion::Stale => self.log_stale("seek failure", generation),
                }
            }
            PlaybackCommand::TimeAdvance(source_time) => {
                self.on_time_advance(timeline, registry, source_time, &mut events)?
            }
            PlaybackCommand::PlayheadChanged => {
                self.on_playhead_changed(timeline, registry, &mut events)?
            }
        }
        Ok(events)
    }

    // ── Transport ───────────────────────────────────────────────

    fn play(&mut self, timeline: &mut Timeline, registry: &ClipRegistry, events: &mut PlaybackEvents) -> Result<()> {
        match self.state {
            PlaybackState::Playing { .. } => Ok(()),
            PlaybackState::Loading { .. } => {
                if let Some(pending) = self.pending_load.as_mut() {
                    pending.auto_resume = true;
                }
                Ok(())
            }
            PlaybackState::Scrubbing => {
                if let Some(scrub) = self.scrub.as_mut() {
                    scrub.resume = true;
                }
                Ok(())
            }
            PlaybackState::Ended => self.restart(timeline, registry, events),
            PlaybackState::Idle | PlaybackState::Paused { .. } => {
                let clips = timeline.program_clips();
                if clips.is_empty() {
                    return Err(CutlineError::validation("nothing to play"));
                }
                let playhead = timeline.playhead();
                if playhead.as_rational() >= translate::active_total(clips) {
                    return self.restart(timeline, registry, events);
                }
                let Some((index, offset)) = resolve(timeline, playhead) else {
                    return Err(CutlineError::validation("nothing to play"));
                };
                if self.can_resume_in_place(timeline, index) {
                    self.surface.play();
                    if let Some(seek) = self.pending_seek.as_mut() {
                        seek.resume = true;
                    }
                    debug!(index, position = %self.position, "Resuming in place");
                    self.set_state(PlaybackState::Playing { index }, events);
                    return Ok(());
                }
                self.go_to(timeline, registry, index, offset, true, events)
            }
        }
    }

    /// The paused surface can simply continue when it shows the loaded
    /// source at the model playhead, as derived from the current edits.
    fn can_resume_in_place(&self, timeline: &Timeline, index: usize) -> bool {
        let in_sync = self
            .derived_position(timeline)
            .map(|p| (timeline.playhead() - p).abs() <= self.config.resync_tolerance())
            .unwrap_or(false);
        self.state == (PlaybackState::Paused { index })
            && self.pending_load.is_none()
            && in_sync
            && timeline
                .program_clips()
                .get(index)
                .map(|c| Some(c.source_clip_id) == self.loaded_source)
                .unwrap_or(false)
    }

    fn restart(&mut self, timeline: &mut Timeline, registry: &ClipRegistry, events: &mut PlaybackEvents) -> Result<()> {
        if timeline.program_clips().is_empty() {
            return Err(CutlineError::validation("nothing to play"));
        }
        debug!("Restarting from the beginning");
        self.go_to(timeline, registry, 0, RationalTime::ZERO, true, events)
    }

    fn pause(&mut self, timeline: &mut Timeline, events: &mut PlaybackEvents) -> Result<()> {
        match self.state {
            PlaybackState::Playing { index } => {
                self.surface.pause();
                if let Some(seek) = self.pending_seek.as_mut() {
                    seek.resume = false;
                }
                // Coalescing may have held back the last few ticks.
                self.move_playhead(timeline, self.position, events)?;
                self.set_state(PlaybackState::Paused { index }, events);
            }
            PlaybackState::Loading { .. } => {
                if let Some(pending) = self.pending_load.as_mut() {
                    pending.auto_resume = false;
                }
            }
            PlaybackState::Scrubbing => {
                if let Some(scrub) = self.scrub.as_mut() {
                    scrub.resume = false;
                }
            }
            PlaybackState::Idle | PlaybackState::Paused { .. } | PlaybackState::Ended => {}
        }
        Ok(())
    }

    fn seek(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        position: ProgramTime,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        if position < ProgramTime::ZERO {
            return Err(CutlineError::validation(format!("negative seek target {position}")));
        }
        if timeline.program_clips().is_empty() {
            timeline.set_playhead(position)?;
            return Ok(());
        }
        let resume = self.wants_playback();
        let total = translate::active_total(timeline.program_clips());
        if resume && position.as_rational() >= total {
            self.current_index = timeline.program_clips().len() - 1;
            return self.finish(timeline, events);
        }
        let Some((index, offset)) = resolve(timeline, position) else {
            return Ok(());
        };
        self.go_to(timeline, registry, index, offset, resume, events)
    }

    /// Whether playback should be running once the current transition lands.
    fn wants_playback(&self) -> bool {
        match self.state {
            PlaybackState::Playing { .. } => true,
            PlaybackState::Loading { .. } => self
                .pending_load
                .as_ref()
                .map(|p| p.auto_resume)
                .unwrap_or(false),
            _ => false,
        }
    }

    // ── Scrubbing ───────────────────────────────────────────────

    fn begin_scrub(&mut self, timeline: &Timeline, at: Instant, events: &mut PlaybackEvents) -> Result<()> {
        if timeline.program_clips().is_empty() {
            return Err(CutlineError::validation("nothing to scrub"));
        }
        if self.scrub.is_some() {
            return Ok(());
        }
        let resume = self.wants_playback();
        if self.state.is_playing() {
            self.surface.pause();
        }
        if let Some(pending) = self.pending_load.as_mut() {
            pending.auto_resume = false;
        }
        if let Some(seek) = self.pending_seek.as_mut() {
            seek.resume = false;
        }
        self.scrub = Some(ScrubSession {
            resume,
            throttle: ScrubThrottle::new(self.config.scrub_seek_interval()),
            started_at: at,
        });
        self.set_state(PlaybackState::Scrubbing, events);
        Ok(())
    }

    fn scrub_to(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        position: ProgramTime,
        at: Instant,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        let Some(scrub) = self.scrub.as_mut() else {
            return Err(CutlineError::validation("not scrubbing"));
        };
        if position < ProgramTime::ZERO {
            return Err(CutlineError::validation(format!("negative scrub position {position}")));
        }
        let seek_allowed = scrub.throttle.allow(at);

        // On-screen feedback is never throttled.
        let target = position.min(ProgramTime::new(timeline.program_duration()));
        self.move_playhead(timeline, target, events)?;

        if seek_allowed {
            if let Some((index, offset)) = resolve(timeline, target) {
                self.go_to(timeline, registry, index, offset, false, events)?;
            }
        }
        Ok(())
    }

    fn end_scrub(&mut self, timeline: &mut Timeline, registry: &ClipRegistry, events: &mut PlaybackEvents) -> Result<()> {
        let Some(scrub) = self.scrub.take() else {
            return Err(CutlineError::validation("not scrubbing"));
        };
        debug!(
            elapsed_ms = scrub.started_at.elapsed().as_millis() as u64,
            resume = scrub.resume,
            "Scrub released"
        );
        match resolve(timeline, timeline.playhead()) {
            Some((index, offset)) => self.go_to(timeline, registry, index, offset, scrub.resume, events),
            None => {
                self.set_state(PlaybackState::Idle, events);
                Ok(())
            }
        }
    }

    // ── Transitions ─────────────────────────────────────────────

    /// Point the surface at `offset` into instance `index`'s active region.
    ///
    /// Reuses the loaded resource when it is the same source (seek only),
    /// folds into an outstanding load of the same source, and otherwise
    /// starts a new load.
    fn go_to(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        index: usize,
        offset: RationalTime,
        resume: bool,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        let clip = timeline
            .program_clips()
            .get(index)
            .ok_or_else(|| CutlineError::NotFound(format!("program instance {index}")))?;
        let instance_id = clip.instance_id;
        let source_id = clip.source_clip_id;
        let seek_to = clip.source_at(offset);
        let position = translate::cumulative_offset(clip) + offset;
        let path = registry.require(source_id)?.file_path.clone();

        self.current_index = index;
        self.presented = Some((instance_id, seek_to));
        let scrubbing = self.scrub.is_some();
        let loaded = self.loaded_source == Some(source_id) && self.pending_load.is_none();

        let state = if loaded {
            let generation = self.bump();
            self.surface.seek(seek_to, generation);
            self.pending_seek = Some(PendingSeek {
                generation,
                index,
                position,
                resume: resume && !scrubbing,
            });
            if resume && !scrubbing {
                if self.surface.is_paused() {
                    self.surface.play();
                }
            } else if !self.surface.is_paused() {
                self.surface.pause();
            }
            debug!(index, seek_to = %seek_to, generation = %generation, "Seek issued");
            match (scrubbing, resume) {
                (true, _) => PlaybackState::Scrubbing,
                (false, true) => PlaybackState::Playing { index },
                (false, false) => PlaybackState::Paused { index },
            }
        } else if let Some(pending) = self
            .pending_load
            .as_mut()
            .filter(|p| p.source_id == source_id)
        {
            pending.index = index;
            pending.instance_id = instance_id;
            pending.seek_to = seek_to;
            pending.auto_resume = resume && !scrubbing;
            debug!(index, generation = %pending.generation, "Retargeted outstanding load");
            if scrubbing {
                PlaybackState::Scrubbing
            } else {
                PlaybackState::Loading { index }
            }
        } else {
            let generation = self.bump();
            self.loaded_source = None;
            self.pending_seek = None;
            self.pending_load = Some(PendingLoad {
                generation,
                index,
                instance_id,
                source_id,
                seek_to,
                auto_resume: resume && !scrubbing,
            });
            self.surface.load(&path, generation);
            info!(
                index,
                source = %source_id,
                path = %path.display(),
                generation = %generation,
                "Loading resource"
            );
            events.push(PlaybackEvent::ReloadStarted {
                index,
                source: source_id,
            });
            if scrubbing {
                PlaybackState::Scrubbing
            } else {
                PlaybackState::Loading { index }
            }
        };

        self.move_playhead(timeline, position, events)?;
        self.set_state(state, events);
        Ok(())
    }

    fn cross_boundary(&mut self, timeline: &mut Timeline, registry: &ClipRegistry, events: &mut PlaybackEvents) -> Result<()> {
        let from = self.current_index;
        let to = from + 1;
        let Some(next) = timeline.program_clips().get(to) else {
            return self.finish(timeline, events);
        };
        if self.loaded_source == Some(next.source_clip_id) && self.pending_load.is_none() {
            debug!(from, to, "Seamless transition");
            events.push(PlaybackEvent::SeamlessTransition { from, to });
        }
        self.go_to(timeline, registry, to, RationalTime::ZERO, true, events)
    }

    /// Stop at the end of the program.
    fn finish(&mut self, timeline: &mut Timeline, events: &mut PlaybackEvents) -> Result<()> {
        self.bump();
        self.pending_load = None;
        self.pending_seek = None;
        if !self.surface.is_paused() {
            self.surface.pause();
        }
        let end = ProgramTime::new(timeline.program_duration());
        self.move_playhead(timeline, end, events)?;
        self.last_good = (self.current_index, end);
        info!(position = %end, "Playback ended");
        self.set_state(PlaybackState::Ended, events);
        events.push(PlaybackEvent::Ended);
        Ok(())
    }

    // ── Completions ─────────────────────────────────────────────

    fn on_ready(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        generation: Generation,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        let outstanding = self.pending_load.as_ref().map(|p| p.generation);
        if classify(outstanding, generation) == Completion::Stale {
            self.log_stale("ready", generation);
            return Ok(());
        }
        let Some(pending) = self.pending_load.take() else {
            return Ok(());
        };
        self.loaded_source = Some(pending.source_id);

        let current = timeline
            .program_clips()
            .get(pending.index)
            .map(|c| c.instance_id);
        if current != Some(pending.instance_id) {
            // The model moved on while loading; position from the playhead.
            debug!(index = pending.index, "Loaded instance no longer in place");
            return match resolve(timeline, timeline.playhead()) {
                Some((index, offset)) => {
                    self.go_to(timeline, registry, index, offset, pending.auto_resume, events)
                }
                None => {
                    self.set_state(PlaybackState::Idle, events);
                    Ok(())
                }
            };
        }

        let seek_generation = self.bump();
        self.surface.seek(pending.seek_to, seek_generation);
        self.pending_seek = Some(PendingSeek {
            generation: seek_generation,
            index: pending.index,
            position: self.position,
            resume: pending.auto_resume,
        });
        let state = if self.scrub.is_some() {
            PlaybackState::Scrubbing
        } else if pending.auto_resume {
            self.surface.play();
            PlaybackState::Playing {
                index: pending.index,
            }
        } else {
            PlaybackState::Paused {
                index: pending.index,
            }
        };
        debug!(index = pending.index, generation = %generation, "Resource ready");
        self.set_state(state, events);
        Ok(())
    }

    fn on_seek_completed(&mut self, generation: Generation) {
        let Some(seek) = self.pending_seek.filter(|s| s.generation == generation) else {
            self.log_stale("seek", generation);
            return;
        };
        self.pending_seek = None;
        if seek.resume && self.state.is_playing() && self.surface.is_paused() {
            debug!(generation = %generation, "Seek left the surface paused; resuming");
            self.surface.play();
        }
        self.last_good = (seek.index, seek.position);
    }

    /// A load or seek failed: pause at the last good position.
    fn fail(&mut self, timeline: &mut Timeline, message: String, events: &mut PlaybackEvents) -> Result<()> {
        warn!(error = %message, "Playback resource failure");
        self.bump();
        self.pending_load = None;
        self.pending_seek = None;
        self.loaded_source = None;
        self.presented = None;
        self.scrub = None;
        if !self.surface.is_paused() {
            self.surface.pause();
        }
        let (index, position) = self.last_good;
        self.current_index = index;
        self.move_playhead(timeline, position, events)?;
        self.set_state(PlaybackState::Paused { index }, events);
        events.push(PlaybackEvent::Error(message));
        Ok(())
    }

    fn log_stale(&self, kind: &str, generation: Generation) {
        debug!(
            kind,
            generation = %generation,
            current = %self.generation,
            "Stale completion ignored"
        );
    }

    // ── Progress and external changes ───────────────────────────

    fn on_time_advance(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        source_time: SourceTime,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        if !self.state.is_playing() || self.pending_seek.is_some() || self.pending_load.is_some() {
            return Ok(());
        }
        let Some(clip) = timeline.program_clips().get(self.current_index) else {
            return Ok(());
        };
        let offset = clip.offset_of(source_time).max(RationalTime::ZERO);
        if offset >= clip.active_duration() {
            return self.cross_boundary(timeline, registry, events);
        }
        let position = translate::cumulative_offset(clip) + offset;
        self.presented = Some((clip.instance_id, source_time));
        self.position = position;
        self.last_good = (self.current_index, position);
        if self.coalescer.should_report(position) {
            let before = timeline.playhead();
            let stored = timeline.set_playhead(position)?;
            if stored != before {
                events.push(PlaybackEvent::PlayheadMoved(stored));
            }
        }
        Ok(())
    }

    fn on_playhead_changed(
        &mut self,
        timeline: &mut Timeline,
        registry: &ClipRegistry,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        if !matches!(self.state, PlaybackState::Paused { .. }) || self.pending_load.is_some() {
            return Ok(());
        }
        let model = timeline.playhead();
        let derived = self.derived_position(timeline);
        let in_sync = derived
            .map(|p| (model - p).abs() <= self.config.resync_tolerance())
            .unwrap_or(false);
        if in_sync && self.loaded_source.is_some() {
            return Ok(());
        }

        let Some((index, offset)) = resolve(timeline, model) else {
            self.set_state(PlaybackState::Idle, events);
            return Ok(());
        };
        debug!(model = %model, surface = ?derived, index, "Resyncing paused surface");
        self.go_to(timeline, registry, index, offset, false, events)
    }

    // ── Helpers ─────────────────────────────────────────────────

    /// Program position of what the surface shows, under the current model.
    /// `None` once the presented instance has left the program track.
    fn derived_position(&self, timeline: &Timeline) -> Option<ProgramTime> {
        let (instance_id, source_time) = self.presented?;
        let clip = timeline
            .program_clips()
            .iter()
            .find(|c| c.instance_id == instance_id)?;
        Some(translate::cumulative_offset(clip) + clip.offset_of(source_time))
    }

    fn bump(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    fn set_state(&mut self, state: PlaybackState, events: &mut PlaybackEvents) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Playback state changed");
            self.state = state;
            events.push(PlaybackEvent::StateChanged(state));
        }
    }

    /// Write an exact position to the model and report it.
    fn move_playhead(
        &mut self,
        timeline: &mut Timeline,
        position: ProgramTime,
        events: &mut PlaybackEvents,
    ) -> Result<()> {
        let before = timeline.playhead();
        let stored = timeline.set_playhead(position)?;
        self.position = stored;
        self.coalescer.reset(stored);
        if stored != before {
            events.push(PlaybackEvent::PlayheadMoved(stored));
        }
        Ok(())
    }
}
