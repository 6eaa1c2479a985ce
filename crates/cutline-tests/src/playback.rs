//! Integration tests for playback over an edited timeline.
//!
//! The recording surface stands in for a decoder; completions are fed back
//! by hand so every ordering can be reproduced.

use cutline_core::{PlaybackConfig, ProgramTime, RationalTime, SourceTime};
use cutline_playback::{
    Generation, PlaybackCommand, PlaybackEvent, PlaybackEvents, PlaybackState,
    PlaybackSynchronizer, RecordingSurface, SurfaceCall,
};
use cutline_timeline::{Project, SourceClip, SourceClipId, TimelineEdit};
use std::time::{Duration, Instant};

// ── Helpers ────────────────────────────────────────────────────

fn secs(s: i64) -> RationalTime {
    RationalTime::from_secs(s)
}

struct Session {
    project: Project,
    sync: PlaybackSynchronizer<RecordingSurface>,
    events: Vec<PlaybackEvent>,
}

impl Session {
    fn new(project: Project) -> Self {
        Self {
            project,
            sync: PlaybackSynchronizer::new(RecordingSurface::new(), PlaybackConfig::default()),
            events: Vec::new(),
        }
    }

    fn send(&mut self, command: PlaybackCommand) -> PlaybackEvents {
        let events = self
            .sync
            .handle(&mut self.project.timeline, &self.project.registry, command)
            .unwrap();
        self.events.extend(events.iter().cloned());
        events
    }

    /// Answer every outstanding request until the surface is quiet.
    fn settle(&mut self) {
        loop {
            let calls = self.sync.surface_mut().take_calls();
            let replies: Vec<_> = calls
                .into_iter()
                .filter_map(|call| match call {
                    SurfaceCall::Load { generation, .. } => {
                        Some(PlaybackCommand::ResourceReady(generation))
                    }
                    SurfaceCall::Seek { generation, .. } => {
                        Some(PlaybackCommand::SeekCompleted(generation))
                    }
                    SurfaceCall::Play | SurfaceCall::Pause => None,
                })
                .collect();
            if replies.is_empty() {
                return;
            }
            for reply in replies {
                self.send(reply);
            }
        }
    }

    fn advance_to(&mut self, source_secs: f64) -> PlaybackEvents {
        self.send(PlaybackCommand::TimeAdvance(SourceTime::from_seconds_f64(
            source_secs,
        )))
    }

    fn reloads(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::ReloadStarted { .. }))
            .count()
    }
}

fn project_with(sources: &[i64]) -> (Project, Vec<SourceClipId>) {
    let mut project = Project::new("Playback");
    let ids = sources
        .iter()
        .enumerate()
        .map(|(i, own)| {
            project
                .registry
                .register(SourceClip::new(format!("media/{i}.mp4"), secs(*own)))
                .unwrap()
        })
        .collect();
    (project, ids)
}

// ── Boundary crossings ─────────────────────────────────────────

#[test]
fn same_source_boundary_is_seek_only() {
    let (mut project, ids) = project_with(&[60]);
    let track = project.timeline.program_track().id;
    project.add_clip(track, ids[0], Some((secs(0), secs(5)))).unwrap();
    project.add_clip(track, ids[0], Some((secs(30), secs(40)))).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Play);
    session.settle();
    assert_eq!(session.reloads(), 1);

    let events = session.advance_to(5.0);
    assert!(events.contains(&PlaybackEvent::SeamlessTransition { from: 0, to: 1 }));
    assert_eq!(session.reloads(), 1);
    assert_eq!(
        session.sync.surface().last_seek().map(|(at, _)| at),
        Some(SourceTime::from_secs(30))
    );
    assert_eq!(session.project.timeline.playhead(), ProgramTime::from_secs(5));
}

#[test]
fn different_source_boundary_reloads_exactly_once() {
    let (mut project, ids) = project_with(&[10, 10]);
    let track = project.timeline.program_track().id;
    project.add_clip(track, ids[0], None).unwrap();
    project.add_clip(track, ids[1], Some((secs(4), secs(8)))).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Play);
    session.settle();

    session.advance_to(10.0);
    assert_eq!(session.sync.state(), PlaybackState::Loading { index: 1 });
    let load = session.sync.surface().last_load().unwrap();
    // A duplicate ready signal must not seek twice.
    session.send(PlaybackCommand::ResourceReady(load));
    let seeks = session.sync.surface().seek_count();
    session.send(PlaybackCommand::ResourceReady(load));
    assert_eq!(session.sync.surface().seek_count(), seeks);
    session.settle();

    assert_eq!(session.reloads(), 2);
    assert_eq!(session.sync.state(), PlaybackState::Playing { index: 1 });
    assert!(!session
        .events
        .iter()
        .any(|e| matches!(e, PlaybackEvent::SeamlessTransition { .. })));
}

#[test]
fn split_fragments_cross_seamlessly() {
    let (mut project, ids) = project_with(&[20]);
    let track = project.timeline.program_track().id;
    let id = project.add_clip(track, ids[0], None).unwrap();
    project
        .timeline
        .apply(TimelineEdit::Split {
            instance_id: id,
            at: ProgramTime::from_secs(8),
        })
        .unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Play);
    session.settle();
    let events = session.advance_to(8.0);
    assert!(events.contains(&PlaybackEvent::SeamlessTransition { from: 0, to: 1 }));
    assert_eq!(session.reloads(), 1);

    session.settle();
    let events = session.advance_to(20.0);
    assert!(events.contains(&PlaybackEvent::Ended));
    assert_eq!(session.project.timeline.playhead(), ProgramTime::from_secs(20));
}

#[test]
fn ended_playback_restarts_from_zero() {
    let (mut project, ids) = project_with(&[10, 10]);
    let track = project.timeline.program_track().id;
    project.add_clip(track, ids[0], Some((secs(2), secs(4)))).unwrap();
    project.add_clip(track, ids[1], Some((secs(0), secs(3)))).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Play);
    session.settle();
    session.advance_to(4.0);
    session.settle();
    session.advance_to(3.0);
    assert_eq!(session.sync.state(), PlaybackState::Ended);
    assert_eq!(session.project.timeline.playhead(), ProgramTime::from_secs(5));

    session.send(PlaybackCommand::Play);
    assert_eq!(session.project.timeline.playhead(), ProgramTime::ZERO);
    assert_eq!(session.sync.state(), PlaybackState::Loading { index: 0 });
    session.settle();
    assert_eq!(
        session.sync.surface().last_seek().map(|(at, _)| at),
        Some(SourceTime::from_secs(2))
    );
}

// ── Stale completions ──────────────────────────────────────────

#[test]
fn ready_for_a_moved_instance_resolves_from_playhead() {
    let (mut project, ids) = project_with(&[10, 10]);
    let track = project.timeline.program_track().id;
    let first = project.add_clip(track, ids[0], None).unwrap();
    project.add_clip(track, ids[1], None).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Seek(ProgramTime::from_secs(3)));
    let load = session.sync.surface().last_load().unwrap();

    // The instance being loaded is deleted before the load completes.
    session
        .project
        .timeline
        .apply(TimelineEdit::RemoveClip { instance_id: first })
        .unwrap();
    session.send(PlaybackCommand::ResourceReady(load));
    session.settle();

    assert_eq!(session.sync.state(), PlaybackState::Paused { index: 0 });
    assert_eq!(
        session.sync.surface().last_seek().map(|(at, _)| at),
        Some(SourceTime::from_secs(3))
    );
    assert_eq!(session.reloads(), 2);
}

#[test]
fn late_failure_of_superseded_load_is_ignored() {
    let (mut project, ids) = project_with(&[10, 10]);
    let track = project.timeline.program_track().id;
    project.add_clip(track, ids[0], None).unwrap();
    project.add_clip(track, ids[1], None).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Play);
    let stale = session.sync.surface().last_load().unwrap();
    session.send(PlaybackCommand::Seek(ProgramTime::from_secs(12)));

    let events = session.send(PlaybackCommand::ResourceFailed {
        generation: stale,
        message: "gone".into(),
    });
    assert!(events.is_empty());
    session.settle();
    assert_eq!(session.sync.state(), PlaybackState::Playing { index: 1 });
    assert!(session.sync.generation() > Generation::default());
}

// ── Scrubbing ──────────────────────────────────────────────────

#[test]
fn rapid_scrub_seeks_at_most_once_per_window() {
    let (mut project, ids) = project_with(&[10]);
    let track = project.timeline.program_track().id;
    project.add_clip(track, ids[0], None).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Seek(ProgramTime::ZERO));
    session.settle();

    let t0 = Instant::now();
    session.send(PlaybackCommand::BeginScrub { at: t0 });
    let mut seek_times = Vec::new();
    // 5 seconds of program time in 500 pointer events, 1ms apart.
    for i in 0..500u64 {
        let at = t0 + Duration::from_millis(i);
        let before = session.sync.surface().seek_count();
        session.send(PlaybackCommand::ScrubTo {
            position: ProgramTime::new(RationalTime::from_millis(10 * i as i64)),
            at,
        });
        if session.sync.surface().seek_count() > before {
            seek_times.push(at);
        }
        // UI feedback follows every event.
        assert_eq!(
            session.project.timeline.playhead(),
            ProgramTime::new(RationalTime::from_millis(10 * i as i64))
        );
    }
    assert_eq!(seek_times.len(), 10);
    for pair in seek_times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(50));
    }

    session.send(PlaybackCommand::EndScrub);
    assert_eq!(session.sync.state(), PlaybackState::Paused { index: 0 });
    assert_eq!(
        session.sync.surface().last_seek().map(|(at, _)| at),
        Some(SourceTime::new(RationalTime::from_millis(4990)))
    );
}

// ── External playhead changes ──────────────────────────────────

#[test]
fn edit_under_paused_surface_resyncs_it() {
    let (mut project, ids) = project_with(&[10, 10]);
    let track = project.timeline.program_track().id;
    let first = project.add_clip(track, ids[0], None).unwrap();
    project.add_clip(track, ids[1], None).unwrap();

    let mut session = Session::new(project);
    session.send(PlaybackCommand::Seek(ProgramTime::from_secs(12)));
    session.settle();
    assert_eq!(session.sync.state(), PlaybackState::Paused { index: 1 });

    // Trimming the first instance shortens the program; the playhead now
    // addresses a different spot in the second source.
    session
        .project
        .timeline
        .apply(TimelineEdit::Trim {
            instance_id: first,
            handle: cutline_timeline::TrimHandle::End,
            delta: secs(-6),
        })
        .unwrap();
    session.send(PlaybackCommand::PlayheadChanged);
    session.settle();

    assert_eq!(session.sync.state(), PlaybackState::Paused { index: 1 });
    assert_eq!(
        session.sync.surface().last_seek().map(|(at, _)| at),
        Some(SourceTime::from_secs(8))
    );
}
