//! Marker-driven non-uniform time stretching.
//!
//! Markers split the timeline into segments. Each segment is stretched by the
//! ratio of its current span (between marker `position`s) to its original
//! span (between `original_position`s), the pieces are concatenated, and a
//! fresh marker sequence is emitted in which every marker's original position
//! equals its new position.

use crate::error::MarkerError;
use crate::markers::model::{DragState, Marker, MarkerData};
use crate::stretch::processor::TimeStretchProcessor;

/// Segments compressed below this factor are rejected by [`validate_markers`].
pub const MIN_STRETCH_FACTOR: f32 = 0.1;

/// Which part of the timeline a segment covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Audio before the first marker.
    Lead,
    /// Audio between two consecutive markers.
    Inner,
    /// Audio after the last marker.
    Tail,
}

/// One planned stretch over original-audio samples `start..end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchSegment {
    pub start: usize,
    pub end: usize,
    pub factor: f32,
    pub kind: SegmentKind,
    /// Index, in `original_position` order, of the marker that closes the
    /// segment. The tail is closed by the last marker.
    pub marker_index: usize,
}

impl StretchSegment {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// New audio and markers after a marker-driven stretch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarkerStretchResult {
    pub audio: Vec<Vec<f32>>,
    pub markers: Vec<Marker>,
}

impl MarkerStretchResult {
    /// Output length, taken from channel 0.
    pub fn len(&self) -> usize {
        self.audio.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Applies marker edits to audio.
#[derive(Debug, Default)]
pub struct MarkerStretchEngine {
    processor: TimeStretchProcessor,
    simple_interpolation: bool,
}

impl MarkerStretchEngine {
    /// Pitch-preserving engine with the default frame layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given processor for every segment.
    pub fn with_processor(mut self, processor: TimeStretchProcessor) -> Self {
        self.processor = processor;
        self
    }

    /// Chooses WSOLA (`true`) or plain resampling (`false`).
    pub fn with_preserve_pitch(mut self, preserve_pitch: bool) -> Self {
        self.simple_interpolation = !preserve_pitch;
        self
    }

    #[inline]
    pub fn preserve_pitch(&self) -> bool {
        !self.simple_interpolation
    }

    /// Stretches `audio` so every marker lands on its `position`.
    ///
    /// Empty audio (no channels, or an empty channel 0) and an empty marker
    /// list pass through unchanged. Channel 0 sets the timeline length; the
    /// returned markers are sorted by position and end with exactly one
    /// end marker.
    pub fn apply_time_stretch(
        &mut self,
        audio: &[Vec<f32>],
        markers: &[Marker],
        sample_rate: u32,
    ) -> MarkerStretchResult {
        let audio_len = audio.first().map_or(0, Vec::len);
        if audio_len == 0 || markers.is_empty() {
            log::debug!(
                "marker stretch: passthrough ({} samples, {} markers)",
                audio_len,
                markers.len()
            );
            return MarkerStretchResult {
                audio: audio.to_vec(),
                markers: markers.to_vec(),
            };
        }

        let sorted = sorted_by_original(markers);
        let last_index = sorted.len() - 1;
        let mut output = vec![Vec::new(); audio.len()];
        let mut cumulative = 0usize;
        let mut emitted = Vec::with_capacity(sorted.len() + 1);

        let mut segments = plan_segments(&sorted, audio_len).into_iter().peekable();
        if let Some(lead) = segments.next_if(|s| s.kind == SegmentKind::Lead) {
            cumulative += self.append_segment(audio, &lead, &mut output);
        }

        let first = &sorted[0];
        let first_position = if first.original_position == 0 {
            0
        } else {
            cumulative as i64
        };
        emitted.push(relocated(first, first_position, sample_rate));

        for segment in segments {
            cumulative += self.append_segment(audio, &segment, &mut output);
            if segment.kind == SegmentKind::Inner && segment.marker_index < last_index {
                emitted.push(relocated(&sorted[segment.marker_index], cumulative as i64, sample_rate));
            }
        }

        let floor = emitted.last().map_or(0, |m: &Marker| m.position);
        let end_position = (cumulative as i64 - 1).max(0).max(floor);
        let mut end = relocated(&sorted[last_index], end_position, sample_rate);
        end.is_end_marker = true;
        emitted.push(end);

        log::debug!(
            "marker stretch: {} -> {} samples, {} markers",
            audio_len,
            cumulative,
            emitted.len()
        );
        MarkerStretchResult {
            audio: output,
            markers: emitted,
        }
    }

    /// Stretches every channel's `segment.start..segment.end`, clamped to
    /// that channel's length.
    pub fn process_stretch_segment(&mut self, audio: &[Vec<f32>], segment: &StretchSegment) -> Vec<Vec<f32>> {
        let preserve_pitch = self.preserve_pitch();
        audio
            .iter()
            .map(|channel| {
                let end = segment.end.min(channel.len());
                let start = segment.start.min(end);
                self.processor
                    .process_segment(&channel[start..end], segment.factor, preserve_pitch)
            })
            .collect()
    }

    /// Appends the processed segment to `output`; returns channel 0's added length.
    fn append_segment(&mut self, audio: &[Vec<f32>], segment: &StretchSegment, output: &mut [Vec<f32>]) -> usize {
        log::debug!(
            "marker stretch: {:?} segment {}..{} factor {:.4}",
            segment.kind,
            segment.start,
            segment.end,
            segment.factor
        );
        let processed = self.process_stretch_segment(audio, segment);
        let added = processed.first().map_or(0, Vec::len);
        for (out, piece) in output.iter_mut().zip(processed) {
            out.extend(piece);
        }
        added
    }
}

/// Applies marker edits with a pitch-preserving default engine.
pub fn apply_time_stretch_to_markers(audio: &[Vec<f32>], markers: &[Marker], sample_rate: u32) -> MarkerStretchResult {
    MarkerStretchEngine::new().apply_time_stretch(audio, markers, sample_rate)
}

/// The segment plan [`MarkerStretchEngine::apply_time_stretch`] executes.
///
/// Markers are ordered by `original_position` (stably) first; spans with a
/// non-positive original length or an empty slice after clamping to
/// `0..audio_len` are left out.
pub fn calculate_segments(markers: &[Marker], audio_len: usize) -> Vec<StretchSegment> {
    if markers.is_empty() || audio_len == 0 {
        return Vec::new();
    }
    plan_segments(&sorted_by_original(markers), audio_len)
}

/// Ratio of current to original span between two markers, or `None` when
/// the original span is not positive.
pub fn calculate_stretch_factor(start: &MarkerData, end: &MarkerData) -> Option<f32> {
    let original = end.original_position - start.original_position;
    if original <= 0 {
        return None;
    }
    Some((end.position - start.position) as f32 / original as f32)
}

/// Checks that a marker set can drive a meaningful stretch: at least two
/// markers, all positions inside the audio, and no segment compressed below
/// [`MIN_STRETCH_FACTOR`].
pub fn validate_markers(markers: &[Marker], audio_len: usize) -> Result<(), MarkerError> {
    if markers.len() < 2 {
        return Err(MarkerError::TooFewMarkers(markers.len()));
    }
    let in_bounds = |p: i64| p >= 0 && p <= audio_len as i64;
    for (index, marker) in markers.iter().enumerate() {
        for position in [marker.position, marker.original_position] {
            if !in_bounds(position) {
                return Err(MarkerError::OutOfBounds {
                    index,
                    position,
                    audio_len,
                });
            }
        }
    }
    let sorted = sorted_by_original(markers);
    for (index, pair) in sorted.windows(2).enumerate() {
        if let Some(factor) = calculate_stretch_factor(&pair[0], &pair[1]) {
            if factor < MIN_STRETCH_FACTOR {
                return Err(MarkerError::FactorTooSmall {
                    index,
                    factor,
                    minimum: MIN_STRETCH_FACTOR,
                });
            }
        }
    }
    Ok(())
}

fn sorted_by_original(markers: &[Marker]) -> Vec<Marker> {
    let mut sorted = markers.to_vec();
    sorted.sort_by_key(|m| m.original_position);
    sorted
}

#[inline]
fn clamp_to_audio(position: i64, audio_len: usize) -> usize {
    position.clamp(0, audio_len as i64) as usize
}

/// Plans lead, inner and tail segments over markers already sorted by
/// original position.
fn plan_segments(sorted: &[Marker], audio_len: usize) -> Vec<StretchSegment> {
    let mut plan = Vec::with_capacity(sorted.len() + 1);
    let (Some(first), Some(last)) = (sorted.first(), sorted.last()) else {
        return plan;
    };

    if first.original_position > 0 {
        plan.push(StretchSegment {
            start: 0,
            end: clamp_to_audio(first.original_position, audio_len),
            factor: first.position as f32 / first.original_position as f32,
            kind: SegmentKind::Lead,
            marker_index: 0,
        });
    }

    for (i, pair) in sorted.windows(2).enumerate() {
        let Some(factor) = calculate_stretch_factor(&pair[0], &pair[1]) else {
            log::debug!(
                "marker stretch: skipping segment {} (original span {} <= 0)",
                i,
                pair[1].original_position - pair[0].original_position
            );
            continue;
        };
        let segment = StretchSegment {
            start: clamp_to_audio(pair[0].original_position, audio_len),
            end: clamp_to_audio(pair[1].original_position, audio_len),
            factor,
            kind: SegmentKind::Inner,
            marker_index: i + 1,
        };
        if segment.is_empty() {
            log::debug!("marker stretch: skipping segment {} (outside audio)", i);
            continue;
        }
        plan.push(segment);
    }

    let tail_start = clamp_to_audio(last.original_position, audio_len);
    if tail_start < audio_len {
        let remaining = (audio_len - tail_start) as i64;
        plan.push(StretchSegment {
            start: tail_start,
            end: audio_len,
            factor: (remaining + last.displacement()) as f32 / remaining as f32,
            kind: SegmentKind::Tail,
            marker_index: sorted.len() - 1,
        });
    }
    plan
}

/// Copy of `marker` placed at `position` on the new timeline, with the end
/// flag and drag state cleared.
fn relocated(marker: &Marker, position: i64, sample_rate: u32) -> Marker {
    let mut data = marker.data;
    data.position = position;
    data.original_position = position;
    data.is_end_marker = false;
    data.update_time_from_samples(sample_rate);
    Marker {
        data,
        drag: DragState::default(),
    }
}
