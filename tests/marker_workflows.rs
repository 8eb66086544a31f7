mod common;

use beatstretch::analysis::bpm::fix_beats;
use beatstretch::io::{read_session_json, write_session_json, MarkerSession};
use beatstretch::markers::{calculate_segments, validate_markers, BeatFixEdit, SegmentKind, StretchEdit};
use beatstretch::{
    analyze_bpm, apply_time_stretch_to_markers, AnalysisOptions, EditHistory, EditorState, Marker,
    MarkerData, MarkerStretchEngine,
};
use common::{gen_impulse_train, gen_ramp, gen_sine, init_logging, moved_marker, Lcg};

const SR: u32 = 44_100;

fn assert_end_marker_invariant(markers: &[Marker]) {
    let ends: Vec<_> = markers.iter().filter(|m| m.is_end_marker).collect();
    assert_eq!(ends.len(), 1, "exactly one end marker: {:?}", markers);
    let last = markers.last().unwrap();
    assert!(last.is_end_marker);
    assert!(markers.iter().all(|m| m.position <= last.position));
    for pair in markers.windows(2) {
        assert!(pair[0].position <= pair[1].position, "unsorted: {:?}", markers);
    }
}

#[test]
fn test_empty_inputs_pass_through() {
    let audio = vec![gen_ramp(500)];
    let markers = vec![moved_marker(0, 0, SR), moved_marker(250, 300, SR)];

    let result = apply_time_stretch_to_markers(&[], &markers, SR);
    assert!(result.audio.is_empty());
    assert_eq!(result.markers, markers);

    let result = apply_time_stretch_to_markers(&audio, &[], SR);
    assert_eq!(result.audio, audio);
    assert!(result.markers.is_empty());
}

#[test]
fn test_three_marker_remap() {
    init_logging();
    let audio = vec![gen_ramp(3_000)];
    let markers = vec![
        moved_marker(0, 0, SR),
        moved_marker(1_000, 1_500, SR),
        moved_marker(2_000, 2_000, SR),
    ];
    let result = apply_time_stretch_to_markers(&audio, &markers, SR);

    // 1000 * 1.5, then the 1000-sample middle squeezed into the remaining 500
    assert_eq!(result.len(), 3_000);
    let positions: Vec<i64> = result.markers.iter().map(|m| m.position).collect();
    assert_eq!(positions, vec![0, 1_500, 2_999]);
    assert_end_marker_invariant(&result.markers);
}

#[test]
fn test_end_marker_invariant_over_random_layouts() {
    let mut rng = Lcg::new(0x5eed);
    for round in 0..200 {
        let len = rng.range(1, 6_000) as usize;
        let count = rng.range(1, 6) as usize;
        let markers: Vec<Marker> = (0..count)
            .map(|_| {
                let original = rng.range(-100, len as i64 + 100);
                let position = rng.range(0, len as i64 + 100);
                moved_marker(original, position, SR)
            })
            .collect();
        let audio = vec![gen_sine(440.0, SR, len, |_| 0.5), gen_ramp(len)];
        let preserve_pitch = round % 2 == 0;
        let result = MarkerStretchEngine::new()
            .with_preserve_pitch(preserve_pitch)
            .apply_time_stretch(&audio, &markers, SR);

        assert_end_marker_invariant(&result.markers);
        assert_eq!(result.audio.len(), 2);
        let end = result.markers.last().unwrap().position;
        assert!(end <= (result.len() as i64 - 1).max(0) || end == result.markers[result.markers.len() - 2].position);
    }
}

#[test]
fn test_segment_plan_covers_timeline() {
    let markers = vec![
        moved_marker(4_410, 4_000, SR),
        moved_marker(22_050, 22_050, SR),
        moved_marker(33_075, 36_000, SR),
    ];
    let plan = calculate_segments(&markers, SR as usize);
    let kinds: Vec<SegmentKind> = plan.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![SegmentKind::Lead, SegmentKind::Inner, SegmentKind::Inner, SegmentKind::Tail]
    );
    assert_eq!(plan.first().unwrap().start, 0);
    assert_eq!(plan.last().unwrap().end, SR as usize);
    for pair in plan.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert!(validate_markers(&markers, SR as usize).is_ok());
}

#[test]
fn test_stretch_and_beat_fix_undo_cleanly() {
    init_logging();
    let samples = gen_impulse_train(22_050, 12 * 22_050, 0.8);
    let analysis = analyze_bpm(&samples, SR, &AnalysisOptions::default());
    assert!(analysis.is_detected());

    let mut state = EditorState {
        audio: vec![samples.clone()],
        sample_rate: SR,
        markers: vec![Marker::fixed(0, SR), moved_marker(44_100, 50_000, SR)],
        beats: analysis.beats.clone(),
        grid_start_sample: analysis.grid_start_sample,
        bpm: analysis.bpm,
        beats_aligned: false,
    };
    let original = state.clone();
    let mut history = EditHistory::default();

    let fixed = fix_beats(&state.audio[0], &analysis);
    history.push(Box::new(BeatFixEdit::new(&state, vec![fixed])), &mut state);
    assert!(state.beats_aligned);
    assert!((state.bpm - 120.0).abs() < 1.0);

    let result = MarkerStretchEngine::new().apply_time_stretch(&state.audio, &state.markers, SR);
    let stretched_len = result.len();
    history.push(Box::new(StretchEdit::new(&state, result)), &mut state);
    assert_eq!(state.audio[0].len(), stretched_len);
    assert_eq!(state.markers[1].position, state.markers[1].original_position);

    assert!(history.undo(&mut state));
    assert!(history.undo(&mut state));
    assert_eq!(state, original);

    assert!(history.redo(&mut state));
    assert!(history.redo(&mut state));
    assert_eq!(state.audio[0].len(), stretched_len);
}

#[test]
fn test_session_round_trip_after_stretch() {
    let audio = vec![gen_ramp(10_000)];
    let markers = vec![
        Marker::from(MarkerData::fixed(0, SR)),
        moved_marker(5_000, 6_000, SR),
        Marker::end(9_999, SR),
    ];
    let result = apply_time_stretch_to_markers(&audio, &markers, SR);

    let session = MarkerSession::new(SR, 128.0, result.markers.iter().map(|m| m.data).collect());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("markers.json");
    write_session_json(&path, &session).unwrap();
    let loaded = read_session_json(&path).unwrap();

    assert_eq!(loaded, session);
    let restored = loaded.to_markers();
    assert_eq!(restored.len(), result.markers.len());
    assert_end_marker_invariant(&restored);
}
