//! Snapshot-based undo/redo for stretch and beat-fix edits.

use std::collections::VecDeque;

use crate::analysis::bpm::{average_bpm_from_beats, BeatInfo};
use crate::markers::engine::MarkerStretchResult;
use crate::markers::model::Marker;

/// Default number of undo steps kept.
pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// Everything an edit can replace.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditorState {
    pub audio: Vec<Vec<f32>>,
    pub sample_rate: u32,
    pub markers: Vec<Marker>,
    pub beats: Vec<BeatInfo>,
    pub grid_start_sample: usize,
    pub bpm: f64,
    pub beats_aligned: bool,
}

/// A reversible edit. Commands hold full before/after snapshots, so `apply`
/// and `revert` can be repeated any number of times.
pub trait EditCommand: Send + Sync {
    fn apply(&self, state: &mut EditorState);

    fn revert(&self, state: &mut EditorState);

    /// Label for an edit menu.
    fn name(&self) -> &str;
}

/// Replaces audio and markers with the output of a marker stretch.
#[derive(Debug, Clone)]
pub struct StretchEdit {
    old_audio: Vec<Vec<f32>>,
    new_audio: Vec<Vec<f32>>,
    old_markers: Vec<Marker>,
    new_markers: Vec<Marker>,
    label: String,
}

impl StretchEdit {
    /// Snapshots `before` and pairs it with the stretch `result`.
    pub fn new(before: &EditorState, result: MarkerStretchResult) -> Self {
        Self {
            old_audio: before.audio.clone(),
            new_audio: result.audio,
            old_markers: before.markers.clone(),
            new_markers: result.markers,
            label: "Time Stretch".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl EditCommand for StretchEdit {
    fn apply(&self, state: &mut EditorState) {
        state.audio = self.new_audio.clone();
        state.markers = self.new_markers.clone();
    }

    fn revert(&self, state: &mut EditorState) {
        state.audio = self.old_audio.clone();
        state.markers = self.old_markers.clone();
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// Swaps in beat-reinforced audio and marks the beats as aligned.
///
/// Applying recomputes the tempo from the mean beat spacing when more than
/// two beats are known; reverting restores the tempo captured at creation.
#[derive(Debug, Clone)]
pub struct BeatFixEdit {
    original_audio: Vec<Vec<f32>>,
    fixed_audio: Vec<Vec<f32>>,
    beats: Vec<BeatInfo>,
    grid_start_sample: usize,
    bpm: f64,
}

impl BeatFixEdit {
    pub fn new(before: &EditorState, fixed_audio: Vec<Vec<f32>>) -> Self {
        Self {
            original_audio: before.audio.clone(),
            fixed_audio,
            beats: before.beats.clone(),
            grid_start_sample: before.grid_start_sample,
            bpm: before.bpm,
        }
    }

    fn aligned_bpm(&self, sample_rate: u32) -> f64 {
        if self.beats.len() > 2 {
            average_bpm_from_beats(&self.beats, sample_rate).unwrap_or(self.bpm)
        } else {
            self.bpm
        }
    }
}

impl EditCommand for BeatFixEdit {
    fn apply(&self, state: &mut EditorState) {
        state.audio = self.fixed_audio.clone();
        state.beats = self.beats.clone();
        state.grid_start_sample = self.grid_start_sample;
        state.bpm = self.aligned_bpm(state.sample_rate);
        state.beats_aligned = true;
    }

    fn revert(&self, state: &mut EditorState) {
        state.audio = self.original_audio.clone();
        state.beats = self.beats.clone();
        state.grid_start_sample = self.grid_start_sample;
        state.bpm = self.bpm;
        state.beats_aligned = false;
    }

    fn name(&self) -> &str {
        "Align Beats"
    }
}

/// Bounded undo/redo stacks. Pushing a new edit clears the redo stack; the
/// oldest edit is dropped once `max_depth` is exceeded.
pub struct EditHistory {
    undo_stack: VecDeque<Box<dyn EditCommand>>,
    redo_stack: Vec<Box<dyn EditCommand>>,
    max_depth: usize,
}

impl std::fmt::Debug for EditHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditHistory")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Default for EditHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl EditHistory {
    /// A depth of 0 is treated as 1.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Applies `command` to `state` and records it.
    pub fn push(&mut self, command: Box<dyn EditCommand>, state: &mut EditorState) {
        log::debug!("history: apply '{}'", command.name());
        command.apply(state);
        self.undo_stack.push_back(command);
        self.redo_stack.clear();
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
    }

    /// Reverts the latest edit; `false` when there is nothing to undo.
    pub fn undo(&mut self, state: &mut EditorState) -> bool {
        let Some(command) = self.undo_stack.pop_back() else {
            return false;
        };
        log::debug!("history: undo '{}'", command.name());
        command.revert(state);
        self.redo_stack.push(command);
        true
    }

    /// Re-applies the latest undone edit; `false` when there is nothing to redo.
    pub fn redo(&mut self, state: &mut EditorState) -> bool {
        let Some(command) = self.redo_stack.pop() else {
            return false;
        };
        log::debug!("history: redo '{}'", command.name());
        command.apply(state);
        self.undo_stack.push_back(command);
        true
    }

    #[inline]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[inline]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_name(&self) -> Option<&str> {
        self.undo_stack.back().map(|c| c.name())
    }

    pub fn redo_name(&self) -> Option<&str> {
        self.redo_stack.last().map(|c| c.name())
    }

    /// Number of edits that can be undone.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::model::MarkerData;

    fn beat(position: usize) -> BeatInfo {
        BeatInfo {
            position,
            expected_position: position,
            confidence: 1.0,
            deviation: 0.0,
            energy: 1.0,
        }
    }

    fn state() -> EditorState {
        EditorState {
            audio: vec![vec![0.1; 100]],
            sample_rate: 1000,
            markers: vec![Marker::new(0, 1000), Marker::end(99, 1000)],
            beats: vec![beat(0), beat(400), beat(800)],
            grid_start_sample: 0,
            bpm: 140.0,
            beats_aligned: false,
        }
    }

    fn stretched(len: usize) -> MarkerStretchResult {
        MarkerStretchResult {
            audio: vec![vec![0.2; len]],
            markers: vec![
                MarkerData::new(0, 1000).into(),
                MarkerData::end(len as i64 - 1, 1000).into(),
            ],
        }
    }

    #[test]
    fn test_stretch_edit_undo_redo() {
        let mut state = state();
        let original = state.clone();
        let mut history = EditHistory::default();

        let edit = StretchEdit::new(&state, stretched(150));
        history.push(Box::new(edit), &mut state);
        assert_eq!(state.audio[0].len(), 150);
        assert_eq!(state.markers[1].position, 149);
        assert_eq!(history.undo_name(), Some("Time Stretch"));

        assert!(history.undo(&mut state));
        assert_eq!(state, original);
        assert!(!history.can_undo());
        assert!(history.can_redo());

        assert!(history.redo(&mut state));
        assert_eq!(state.audio[0].len(), 150);
        assert!(!history.redo(&mut state));
    }

    #[test]
    fn test_beat_fix_recomputes_bpm() {
        let mut state = state();
        let mut history = EditHistory::default();
        let edit = BeatFixEdit::new(&state, vec![vec![0.3; 100]]);
        history.push(Box::new(edit), &mut state);

        // 400-sample spacing at 1 kHz
        assert!((state.bpm - 150.0).abs() < 1e-9);
        assert!(state.beats_aligned);
        assert_eq!(state.audio[0][0], 0.3);

        history.undo(&mut state);
        assert_eq!(state.bpm, 140.0);
        assert!(!state.beats_aligned);
        assert_eq!(state.audio[0][0], 0.1);

        history.redo(&mut state);
        assert!((state.bpm - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_beat_fix_keeps_bpm_with_few_beats() {
        let mut state = state();
        state.beats.truncate(2);
        let edit = BeatFixEdit::new(&state, state.audio.clone());
        edit.apply(&mut state);
        assert_eq!(state.bpm, 140.0);
        assert_eq!(edit.name(), "Align Beats");
    }

    #[test]
    fn test_push_clears_redo_and_bounds_depth() {
        let mut state = state();
        let mut history = EditHistory::new(2);
        for len in [110, 120, 130] {
            let edit = StretchEdit::new(&state, stretched(len)).with_label(format!("stretch {}", len));
            history.push(Box::new(edit), &mut state);
        }
        assert_eq!(history.len(), 2);
        assert!(history.undo(&mut state));
        assert!(history.undo(&mut state));
        assert!(!history.undo(&mut state));
        // oldest edit was dropped, so state is the first edit's result
        assert_eq!(state.audio[0].len(), 110);

        history.redo(&mut state);
        let edit = StretchEdit::new(&state, stretched(200));
        history.push(Box::new(edit), &mut state);
        assert!(!history.can_redo());
        assert_eq!(history.redo_name(), None);

        history.clear();
        assert!(history.is_empty());
    }
}
