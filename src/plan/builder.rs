use crate::models::Segment;

/// Shortest focus stretch worth putting a break boundary around (25 minutes).
pub const MIN_FOCUS_CHUNK_SECS: u64 = 25 * 60;

/// Splits a session of `total_focus_secs` into `focus, break, ..., focus`.
///
/// Focus segments share the non-break time equally; the integer-division
/// remainder is dropped, so the plan can be up to `breaks` seconds short.
pub fn build_plan(total_focus_secs: u64, break_secs: u64, max_breaks: u32) -> Vec<Segment> {
    let total = total_focus_secs.max(1);

    // A zero-length break is not a segment, and a break too long to add to a
    // focus chunk never fits.
    let break_count = match MIN_FOCUS_CHUNK_SECS.checked_add(break_secs) {
        Some(per_break) if break_secs > 0 => u64::from(max_breaks).min(total / per_break),
        _ => 0,
    };

    let total_break = break_count * break_secs;
    let focus_chunk = (total - total_break) / (break_count + 1);

    let mut segments = Vec::with_capacity((break_count * 2 + 1) as usize);
    for i in 0..=break_count {
        segments.push(Segment::focus(focus_chunk));
        if i < break_count {
            segments.push(Segment::break_of(break_secs));
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentKind;

    fn shape(segments: &[Segment]) -> Vec<(SegmentKind, u64)> {
        segments
            .iter()
            .map(|segment| (segment.kind(), segment.total_duration()))
            .collect()
    }

    #[test]
    fn ninety_minutes_with_five_minute_breaks() {
        use SegmentKind::{Break, Focus};

        let plan = build_plan(5400, 300, 4);

        assert_eq!(
            shape(&plan),
            vec![
                (Focus, 1125),
                (Break, 300),
                (Focus, 1125),
                (Break, 300),
                (Focus, 1125),
                (Break, 300),
                (Focus, 1125),
            ]
        );
        assert!(plan.iter().all(|segment| !segment.has_progress()));
    }

    #[test]
    fn short_session_has_no_breaks() {
        let plan = build_plan(1200, 300, 4);
        assert_eq!(shape(&plan), vec![(SegmentKind::Focus, 1200)]);
    }

    #[test]
    fn break_count_follows_chunk_plus_break_division() {
        // 2000 / (1500 + 300) = 1, so one break even though the focus halves
        // come out under the minimum chunk.
        let plan = build_plan(2000, 300, 4);
        assert_eq!(
            shape(&plan),
            vec![
                (SegmentKind::Focus, 850),
                (SegmentKind::Break, 300),
                (SegmentKind::Focus, 850),
            ]
        );
    }

    #[test]
    fn zero_max_breaks_is_one_focus_segment() {
        let plan = build_plan(10_000, 300, 0);
        assert_eq!(shape(&plan), vec![(SegmentKind::Focus, 10_000)]);
    }

    #[test]
    fn zero_break_duration_is_one_focus_segment() {
        let plan = build_plan(6000, 0, 4);
        assert_eq!(shape(&plan), vec![(SegmentKind::Focus, 6000)]);
    }

    #[test]
    fn oversized_break_is_one_focus_segment() {
        let plan = build_plan(10_000, u64::MAX, 4);
        assert_eq!(shape(&plan), vec![(SegmentKind::Focus, 10_000)]);

        let plan = build_plan(u64::MAX, u64::MAX - MIN_FOCUS_CHUNK_SECS, 4);
        assert_eq!(
            shape(&plan),
            vec![
                (SegmentKind::Focus, 750),
                (SegmentKind::Break, u64::MAX - MIN_FOCUS_CHUNK_SECS),
                (SegmentKind::Focus, 750),
            ]
        );
    }

    #[test]
    fn non_positive_total_is_clamped() {
        let plan = build_plan(0, 300, 4);
        assert_eq!(shape(&plan), vec![(SegmentKind::Focus, 1)]);
    }

    #[test]
    fn plan_invariants_hold_across_inputs() {
        for total in (60..=6 * 3600).step_by(337) {
            for break_secs in [1, 60, 300, 600, 900] {
                for max_breaks in 0..=6 {
                    let plan = build_plan(total, break_secs, max_breaks);
                    let breaks = plan
                        .iter()
                        .filter(|segment| segment.kind() == SegmentKind::Break)
                        .count() as u64;

                    assert_eq!(plan.first().map(Segment::kind), Some(SegmentKind::Focus));
                    assert_eq!(plan.last().map(Segment::kind), Some(SegmentKind::Focus));
                    assert!(plan.windows(2).all(|pair| pair[0].kind() != pair[1].kind()));

                    assert!(breaks <= u64::from(max_breaks));
                    if total < MIN_FOCUS_CHUNK_SECS + break_secs {
                        assert_eq!(breaks, 0, "total={total} break={break_secs}");
                    }

                    let sum: u64 = plan.iter().map(Segment::total_duration).sum();
                    assert!(sum <= total);
                    assert!(total - sum < breaks + 1);
                }
            }
        }
    }
}
