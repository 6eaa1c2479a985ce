//! Integration tests for the timeline subsystem.
//!
//! Exercises the registry, timeline model, placement engine and translator
//! together through the project API.

use cutline_core::{PlacementTime, ProgramTime, RationalTime};
use cutline_timeline::{
    translate, ClipInstance, ClipRegistry, InstanceId, Project, ProjectFile, SourceClip,
    SourceClipId, Timeline, TimelineEdit, TrimHandle,
};
use proptest::prelude::*;

// ── Helpers ────────────────────────────────────────────────────

fn secs(s: i64) -> RationalTime {
    RationalTime::from_secs(s)
}

fn source(project: &mut Project, name: &str, own: i64) -> SourceClipId {
    project
        .registry
        .register(SourceClip::new(format!("media/{name}.mp4"), secs(own)))
        .unwrap()
}

/// A (own 30, trim [5, 15]) followed by B (own 10, full).
fn a_then_b() -> (Project, InstanceId, InstanceId) {
    let mut project = Project::new("Scenario");
    let a_src = source(&mut project, "a", 30);
    let b_src = source(&mut project, "b", 10);
    let track = project.timeline.program_track().id;
    let a = project
        .add_clip(track, a_src, Some((secs(5), secs(15))))
        .unwrap();
    let b = project.add_clip(track, b_src, None).unwrap();
    (project, a, b)
}

/// A (own 10, full) followed by B (own 30, trim [5, 15]). Visual spans
/// never overlap an active region, so translation is one-to-one.
fn b_then_a() -> Project {
    let mut project = Project::new("Round trip");
    let a_src = source(&mut project, "a", 10);
    let b_src = source(&mut project, "b", 30);
    let track = project.timeline.program_track().id;
    project.add_clip(track, a_src, None).unwrap();
    project
        .add_clip(track, b_src, Some((secs(5), secs(15))))
        .unwrap();
    project
}

fn start_of(timeline: &Timeline, id: InstanceId) -> PlacementTime {
    timeline.find_instance(id).unwrap().1.start_time
}

// ── Placement scenarios ────────────────────────────────────────

#[test]
fn trimmed_instance_places_successor_by_active_duration() {
    let (project, a, b) = a_then_b();
    let timeline = &project.timeline;
    assert_eq!(start_of(timeline, a), PlacementTime::ZERO);
    assert_eq!(start_of(timeline, b), PlacementTime::from_secs(10));
    assert_eq!(timeline.program_duration(), secs(20));
}

#[test]
fn drop_inside_visual_span_swaps_before() {
    let (mut project, a, b) = a_then_b();
    let track = project.timeline.program_track().id;
    project
        .timeline
        .apply(TimelineEdit::Reposition {
            instance_id: b,
            from_track: track,
            to_track: track,
            target_time: PlacementTime::from_secs(2),
        })
        .unwrap();

    let order: Vec<_> = project
        .timeline
        .program_clips()
        .iter()
        .map(|c| c.instance_id)
        .collect();
    assert_eq!(order, vec![b, a]);
    assert_eq!(start_of(&project.timeline, b), PlacementTime::ZERO);
    assert_eq!(start_of(&project.timeline, a), PlacementTime::from_secs(10));
    assert_eq!(project.timeline.program_duration(), secs(20));

    assert!(project.timeline.undo());
    assert_eq!(project.timeline.program_clips()[0].instance_id, a);
}

#[test]
fn trim_clamps_to_minimum_active_duration() {
    let (mut project, a, b) = a_then_b();
    let eps = RationalTime::from_millis(100);
    project
        .timeline
        .apply(TimelineEdit::Trim {
            instance_id: a,
            handle: TrimHandle::Start,
            delta: secs(50),
        })
        .unwrap();
    let clip = project.timeline.find_instance(a).unwrap().1;
    assert_eq!(clip.trim_start, clip.trim_end - eps);
    assert_eq!(clip.trim_end, secs(15));

    project
        .timeline
        .apply(TimelineEdit::Trim {
            instance_id: b,
            handle: TrimHandle::End,
            delta: secs(-50),
        })
        .unwrap();
    let clip = project.timeline.find_instance(b).unwrap().1;
    assert_eq!(clip.trim_start, RationalTime::ZERO);
    assert_eq!(clip.trim_end, eps);
    assert!(project.timeline.is_placement_consistent());
}

#[test]
fn snap_to_nearby_active_edges() {
    // Active edges at 0, 5, 12 and 20 seconds.
    let mut project = Project::new("Snap");
    let x = source(&mut project, "x", 12);
    let y = source(&mut project, "y", 20);
    let v1 = project.timeline.program_track().id;
    let v2 = project.timeline.add_track("V2");
    project.add_clip(v1, x, Some((secs(5), secs(12)))).unwrap();
    project.add_clip(v2, y, None).unwrap();

    let hit = project
        .timeline
        .find_snap_point(PlacementTime::from_seconds_f64(12.05), None);
    assert_eq!(hit.time, PlacementTime::from_secs(12));
    assert!(hit.snapped);

    let miss = project
        .timeline
        .find_snap_point(PlacementTime::from_secs(8), None);
    assert_eq!(miss.time, PlacementTime::from_secs(8));
    assert!(!miss.snapped);
}

// ── Translation ────────────────────────────────────────────────

#[test]
fn program_placement_round_trip() {
    let project = b_then_a();
    let clips = project.timeline.program_clips();
    for half_secs in 0..=40 {
        let p = ProgramTime::new(RationalTime::new(half_secs, 2));
        let v = translate::program_to_placement(clips, p);
        let (_, back) = translate::placement_to_program(clips, v).unwrap();
        assert_eq!(back, p, "round trip of {p}");
    }
}

#[test]
fn trimmed_head_maps_forward_to_active_start() {
    let (project, _, _) = a_then_b();
    let clips = project.timeline.program_clips();
    // Placement 2s lies in A's trimmed-out head.
    let (index, p) = translate::placement_to_program(clips, PlacementTime::from_secs(2)).unwrap();
    assert_eq!(index, 0);
    assert_eq!(p, ProgramTime::ZERO);
}

#[test]
fn split_fragments_play_the_same_source_span() {
    let (mut project, a, _) = a_then_b();
    let before = project.export_segments().unwrap();
    let affected = project
        .timeline
        .apply(TimelineEdit::Split {
            instance_id: a,
            at: ProgramTime::from_secs(4),
        })
        .unwrap();
    assert_eq!(affected.len(), 2);
    assert_eq!(project.timeline.program_duration(), secs(20));

    let after = project.export_segments().unwrap();
    assert_eq!(after.len(), 3);
    assert_eq!(after[0].source_start, before[0].source_start);
    assert_eq!(after[0].source_end, after[1].source_start);
    assert_eq!(after[1].source_end, before[0].source_end);
    assert_eq!(after[2], before[1]);
}

// ── Library and persistence ────────────────────────────────────

#[test]
fn deleting_a_source_removes_its_instances_everywhere() {
    let (mut project, _, b) = a_then_b();
    let a_src = project.timeline.program_clips()[0].source_clip_id;
    let v2 = project.timeline.add_track("V2");
    project.add_clip(v2, a_src, None).unwrap();

    assert_eq!(project.delete_source(a_src).unwrap(), 2);
    assert!(project.registry.get(a_src).is_none());
    assert_eq!(project.timeline.program_clips().len(), 1);
    assert_eq!(start_of(&project.timeline, b), PlacementTime::ZERO);
    assert!(project.timeline.track(v2).unwrap().is_empty());
    assert_eq!(project.timeline.program_duration(), secs(10));
}

#[test]
fn project_survives_serialization_roundtrip() {
    let (mut project, a, _) = a_then_b();
    project
        .timeline
        .apply(TimelineEdit::Split {
            instance_id: a,
            at: ProgramTime::from_secs(3),
        })
        .unwrap();
    project.timeline.set_playhead(ProgramTime::from_secs(7)).unwrap();

    let json = ProjectFile::new(project).to_json().unwrap();
    let loaded = ProjectFile::from_json(&json).unwrap().project;
    assert_eq!(loaded.timeline.program_clips().len(), 3);
    assert!(loaded.timeline.program_clips()[0].is_split());
    assert!(loaded.timeline.is_placement_consistent());
    assert_eq!(loaded.timeline.playhead(), ProgramTime::from_secs(7));
    assert_eq!(loaded.export_segments().unwrap().len(), 3);
}

// ── Placement invariant under arbitrary edits ──────────────────

#[derive(Debug, Clone)]
enum Op {
    Add { source: usize, start: i64, len: i64 },
    Trim { index: usize, start: bool, delta_ms: i64 },
    Move { index: usize, target: i64 },
    Remove { index: usize },
    Split { index: usize, permille: i64 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..10i64, 1..10i64).prop_map(|(source, start, len)| Op::Add {
            source,
            start,
            len
        }),
        (0..8usize, any::<bool>(), -5000..5000i64).prop_map(|(index, start, delta_ms)| {
            Op::Trim {
                index,
                start,
                delta_ms,
            }
        }),
        (0..8usize, 0..60i64).prop_map(|(index, target)| Op::Move { index, target }),
        (0..8usize).prop_map(|index| Op::Remove { index }),
        (0..8usize, 0..1000i64).prop_map(|(index, permille)| Op::Split { index, permille }),
    ]
}

fn to_edit(timeline: &Timeline, registry: &ClipRegistry, sources: &[SourceClipId], op: &Op) -> Option<TimelineEdit> {
    let track = timeline.program_track().id;
    let clips = timeline.program_clips();
    let pick = |index: usize| clips.get(index % clips.len().max(1));
    match *op {
        Op::Add { source, start, len } => {
            let source = registry.get(sources[source])?;
            let instance = ClipInstance::with_trim(source, secs(start), secs(start + len)).ok()?;
            Some(TimelineEdit::AddClip {
                track_id: track,
                instance,
            })
        }
        Op::Trim {
            index,
            start,
            delta_ms,
        } => pick(index).map(|c| TimelineEdit::Trim {
            instance_id: c.instance_id,
            handle: if start { TrimHandle::Start } else { TrimHandle::End },
            delta: RationalTime::from_millis(delta_ms),
        }),
        Op::Move { index, target } => pick(index).map(|c| TimelineEdit::Reposition {
            instance_id: c.instance_id,
            from_track: track,
            to_track: track,
            target_time: PlacementTime::from_secs(target),
        }),
        Op::Remove { index } => pick(index).map(|c| TimelineEdit::RemoveClip {
            instance_id: c.instance_id,
        }),
        Op::Split { index, permille } => pick(index).map(|c| TimelineEdit::Split {
            instance_id: c.instance_id,
            at: translate::cumulative_offset(c) + c.active_duration() * permille / 1000,
        }),
    }
}

proptest! {
    #[test]
    fn placement_invariant_holds_after_any_edits(ops in prop::collection::vec(op(), 1..40)) {
        let mut project = Project::new("Fuzz");
        let sources: Vec<_> = ["p", "q", "r"]
            .iter()
            .map(|name| source(&mut project, name, 20))
            .collect();

        for op in &ops {
            if let Some(edit) = to_edit(&project.timeline, &project.registry, &sources, op) {
                // Splits too close to an edge are rejected; that is fine.
                let _ = project.timeline.apply(edit);
            }
            prop_assert!(project.timeline.is_placement_consistent());
            prop_assert_eq!(
                project.timeline.program_duration(),
                translate::active_total(project.timeline.program_clips())
            );
            prop_assert!(project.timeline.playhead().as_rational() <= project.timeline.program_duration());
        }

        while project.timeline.undo() {
            prop_assert!(project.timeline.is_placement_consistent());
        }
        prop_assert!(project.timeline.program_clips().is_empty());
    }
}
