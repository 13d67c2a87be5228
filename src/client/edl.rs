// src/client/edl.rs
//! Merge of the backend's commercial-break and cut mark lists into one
//! ordered, capacity-bounded skip list.

/// Point-event kinds as stored by the backend. Values are either frame counts
/// or milliseconds, never mixed within one merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkKind {
    BreakStart,
    BreakEnd,
    CutStart,
    CutEnd,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EditMark {
    pub kind: MarkKind,
    pub value: i64,
}

impl EditMark {
    pub const fn new(kind: MarkKind, value: i64) -> Self {
        Self { kind, value }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdlKind {
    CommercialBreak,
    Cut,
    SceneMarker,
}

/// One skip interval in output milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdlInterval {
    pub start_ms: i64,
    pub end_ms: i64,
    pub kind: EdlKind,
}

/// Output buffer bound. Hitting it truncates, it is not an error.
pub const EDL_CAPACITY: usize = 32;

/// A list whose first element is an "end" lost its opening mark before the
/// data window; a list ending on a "start" never saw its close. Patch both
/// boundaries so the pairing scan sees balanced lists.
fn correct_boundaries(marks: &[EditMark], start: MarkKind, end: MarkKind, limit: i64) -> Vec<EditMark> {
    let mut out = Vec::with_capacity(marks.len() + 2);
    if let Some(first) = marks.first() {
        if first.kind == end {
            out.push(EditMark::new(start, 0));
        }
    }
    out.extend_from_slice(marks);
    if let Some(last) = marks.last() {
        if last.kind == start {
            out.push(EditMark::new(end, limit));
        }
    }
    out
}

/// Merge the two chronological mark lists into typed intervals.
///
/// `total_duration_secs` bounds an unterminated trailing interval; `rate`
/// converts mark values to seconds (frame rate for frame-based marks, 1000.0
/// for millisecond marks). With `scene_only`, each break collapses to a
/// zero-length scene marker at its end point.
pub fn merge(
    break_marks: &[EditMark],
    cut_marks: &[EditMark],
    total_duration_secs: i64,
    rate: f64,
    scene_only: bool,
) -> Vec<EdlInterval> {
    let limit = (total_duration_secs as f64 * rate) as i64;
    let mut marks = correct_boundaries(break_marks, MarkKind::BreakStart, MarkKind::BreakEnd, limit);
    marks.extend(correct_boundaries(cut_marks, MarkKind::CutStart, MarkKind::CutEnd, limit));

    let mut out = Vec::new();
    let mut pending: Option<EditMark> = None;
    for mark in marks {
        if out.len() >= EDL_CAPACITY {
            break;
        }
        match mark.kind {
            MarkKind::BreakStart | MarkKind::CutStart => pending = Some(mark),
            MarkKind::BreakEnd => {
                if let Some(start) = pending.take() {
                    // A non-increasing pair is malformed and dropped
                    if start.kind == MarkKind::BreakStart && mark.value > start.value {
                        let start_ms = to_ms(start.value, rate);
                        let end_ms = to_ms(mark.value, rate);
                        out.push(if scene_only {
                            EdlInterval { start_ms: end_ms, end_ms, kind: EdlKind::SceneMarker }
                        } else {
                            EdlInterval { start_ms, end_ms, kind: EdlKind::CommercialBreak }
                        });
                    }
                }
            }
            MarkKind::CutEnd => {
                if let Some(start) = pending.take() {
                    if start.kind == MarkKind::CutStart && mark.value > start.value {
                        out.push(EdlInterval {
                            start_ms: to_ms(start.value, rate),
                            end_ms: to_ms(mark.value, rate),
                            kind: EdlKind::Cut,
                        });
                    }
                }
            }
        }
    }
    out
}

fn to_ms(value: i64, rate: f64) -> i64 {
    ((value as f64 / rate) * 1000.0) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(kind: MarkKind, value: i64) -> EditMark {
        EditMark::new(kind, value)
    }

    #[test]
    fn leading_end_gets_implicit_start() {
        let breaks = [mark(MarkKind::BreakEnd, 100)];
        let out = merge(&breaks, &[], 1000, 1.0, false);
        assert_eq!(
            out,
            vec![EdlInterval { start_ms: 0, end_ms: 100_000, kind: EdlKind::CommercialBreak }]
        );
    }

    #[test]
    fn trailing_start_gets_implicit_end() {
        let cuts = [mark(MarkKind::CutStart, 200)];
        let out = merge(&[], &cuts, 500, 1.0, false);
        assert_eq!(
            out,
            vec![EdlInterval { start_ms: 200_000, end_ms: 500_000, kind: EdlKind::Cut }]
        );
    }

    #[test]
    fn non_increasing_pair_is_discarded() {
        let breaks = [mark(MarkKind::BreakStart, 50), mark(MarkKind::BreakEnd, 30)];
        assert!(merge(&breaks, &[], 1000, 1.0, false).is_empty());
    }

    #[test]
    fn cross_category_pair_does_not_emit() {
        // A cut end cannot close a break start
        let breaks = [mark(MarkKind::BreakStart, 10), mark(MarkKind::CutEnd, 40)];
        assert!(merge(&breaks, &[], 1000, 1.0, false).is_empty());
    }

    #[test]
    fn implicit_cut_start_pairs_with_lone_end() {
        let cuts = [mark(MarkKind::CutEnd, 40)];
        let out = merge(&[], &cuts, 1000, 1.0, false);
        assert_eq!(out, vec![EdlInterval { start_ms: 0, end_ms: 40_000, kind: EdlKind::Cut }]);
    }

    #[test]
    fn frame_marks_convert_through_rate() {
        let breaks = [mark(MarkKind::BreakStart, 250), mark(MarkKind::BreakEnd, 500)];
        let out = merge(&breaks, &[], 60, 25.0, false);
        assert_eq!(
            out,
            vec![EdlInterval { start_ms: 10_000, end_ms: 20_000, kind: EdlKind::CommercialBreak }]
        );
    }

    #[test]
    fn scene_mode_collapses_breaks_only() {
        let breaks = [mark(MarkKind::BreakStart, 10), mark(MarkKind::BreakEnd, 20)];
        let cuts = [mark(MarkKind::CutStart, 30), mark(MarkKind::CutEnd, 40)];
        let out = merge(&breaks, &cuts, 1000, 1.0, true);
        assert_eq!(out[0], EdlInterval { start_ms: 20_000, end_ms: 20_000, kind: EdlKind::SceneMarker });
        assert_eq!(out[1].kind, EdlKind::Cut);
    }

    #[test]
    fn output_is_capacity_bounded() {
        let mut breaks = Vec::new();
        for i in 0..(EDL_CAPACITY as i64 + 8) {
            breaks.push(mark(MarkKind::BreakStart, i * 10));
            breaks.push(mark(MarkKind::BreakEnd, i * 10 + 5));
        }
        let out = merge(&breaks, &[], 10_000, 1.0, false);
        assert_eq!(out.len(), EDL_CAPACITY);
    }
}
