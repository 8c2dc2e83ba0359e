//! Frame-range and handle arithmetic.
//!
//! Everything here is a pure function over the arena; the driver and the
//! collation builder call in, nothing calls out.

use crate::{
    export::options::{ExportOptions, RetimeMethod},
    foundation::core::FrameSpan,
    timeline::item::TrackItem,
    timeline::model::{Sequence, Track, Transition},
    timeline::tags::handles_from_tag,
};

/// What a range query is about: one item or a whole sequence.
#[derive(Clone, Copy, Debug)]
pub enum RangeTarget<'a> {
    Item(&'a TrackItem),
    Sequence(&'a Sequence),
}

/// Effective handle counts in source frames, as an `(in, out)` pair.
///
/// Freeze frames take no handles. The counts are clamped to the budget and
/// to the media slack each side of the cut; for collated targets the copies
/// already consumed their slack during collation, so only the budget clamp
/// applies. Baked reversed playback swaps the slack sides, because the
/// output head then plays from the source tail.
pub fn output_handles(
    cut_handles: Option<i64>,
    item: &TrackItem,
    retime_method: RetimeMethod,
    collated: bool,
) -> (i64, i64) {
    let Some(budget) = cut_handles else {
        return (0, 0);
    };
    let budget = budget.max(0);
    if item.is_freeze() {
        return (0, 0);
    }
    if collated {
        return (budget, budget);
    }
    let (slack_in, slack_out) =
        if item.playback_speed < 0.0 && !retime_method.preserves_retimes() {
            (item.handle_out_length(), item.handle_in_length())
        } else {
            (item.handle_in_length(), item.handle_out_length())
        };
    (budget.min(slack_in), budget.min(slack_out))
}

/// Inclusive output bounds for an item or a sequence.
///
/// Item ranges start from the absolute source cut. Handles widen the range
/// unless `ignore_handles`; baking retimes (`ignore_retimes` on a retimed
/// item) scales positions by `1/|speed|` rounding outward; `clamp_to_source`
/// pins the result inside the clip's media. Sequence-time output and the
/// custom start frame are applied last, in that order.
///
/// An unrequested negative start clamps to zero with a warning; a start
/// frame the user explicitly set below zero is honoured.
pub fn output_range(
    options: &ExportOptions,
    target: RangeTarget<'_>,
    ignore_handles: bool,
    ignore_retimes: bool,
    clamp_to_source: bool,
) -> (i64, i64) {
    let (mut first, mut last) = match target {
        RangeTarget::Item(item) => item_range(options, item, ignore_handles, ignore_retimes, clamp_to_source),
        RangeTarget::Sequence(sequence) => sequence_range(sequence),
    };

    if let Some(start) = options.start_frame {
        // The remapped end lands one past the inclusive end; downstream
        // consumers bake this in, so it is kept bit-compatible.
        let len = last - first + 1;
        first = start;
        last = start + len;
    }

    let user_requested_negative = options.start_frame.is_some_and(|s| s < 0);
    if first < 0 && !user_requested_negative {
        tracing::warn!(first, last, "clamping negative output start to 0");
        first = 0;
        if last < first {
            last = first;
        }
    }

    (first, last)
}

fn item_range(
    options: &ExportOptions,
    item: &TrackItem,
    ignore_handles: bool,
    ignore_retimes: bool,
    clamp_to_source: bool,
) -> (i64, i64) {
    let clip = &item.source;
    let cut = item.source_span_absolute();
    let mut first = cut.first;
    let mut last = cut.last;

    if !ignore_handles {
        let (handle_in, handle_out) = output_handles(
            options.effective_cut_handles(),
            item,
            options.retime_method,
            false,
        );
        first -= handle_in;
        last += handle_out;
    }

    if ignore_retimes && item.is_retimed() {
        let rate = item.playback_speed.abs();
        first = ((first as f64) / rate).floor() as i64;
        last = ((last as f64) / rate).ceil() as i64;
    }

    if clamp_to_source {
        let lo = clip.source_in;
        let hi = clip.source_in + clip.duration - 1;
        first = first.clamp(lo, hi);
        last = last.clamp(lo, hi);
    }

    if options.output_sequence_time {
        let delta = item.timeline_in - (item.source_in + clip.source_in);
        first += delta;
        last += delta;
    }

    (first, last)
}

fn sequence_range(sequence: &Sequence) -> (i64, i64) {
    let first = sequence.in_time.unwrap_or(0);
    let last = sequence
        .out_time
        .unwrap_or_else(|| (sequence.duration() - 1).max(first));
    (first, last.max(first))
}

/// Timeline span an item occupies for assembly purposes.
///
/// Straight items cover their cut. Items rebuilt from a prior export carry
/// handle counts on their tag; the media extends that far beyond the cut,
/// so the span widens accordingly. Transitions touching the item widen the
/// span too, since the dissolve needs those frames from both sides.
pub fn timeline_range(track: &Track, item: &TrackItem) -> FrameSpan {
    let mut span = item.timeline_span();

    for transition in [
        track.transition_into(&item.guid),
        track.transition_out_of(&item.guid),
    ]
    .into_iter()
    .flatten()
    {
        span = span.union(transition.timeline_span());
    }

    if let Some((start_handle, end_handle)) =
        item.tags.iter().find_map(handles_from_tag)
    {
        span = span.with_handles(start_handle.max(0), end_handle.max(0));
    }

    span
}

/// Derive `source_in`/`source_out` on `dst` from `src`'s cut.
///
/// `dst`'s media is a render of `src` (retimes baked, handles included).
/// With explicit `expected_handles` those are taken as-is; otherwise the
/// surplus media length is attributed to the transitions covering `src`,
/// and any remainder (or all of it, without transitions) splits evenly.
pub fn copy_timing(
    dst: &mut TrackItem,
    src: &TrackItem,
    in_transition: Option<&Transition>,
    out_transition: Option<&Transition>,
    expected_handles: Option<(i64, i64)>,
) {
    let cut_len = src.duration();
    let surplus = (dst.source.duration - cut_len).max(0);

    let (handle_in, handle_out) = match expected_handles {
        Some((h_in, h_out)) => (h_in.max(0), h_out.max(0)),
        None => {
            let in_share = in_transition
                .map(|t| (src.timeline_in - t.timeline_in).max(0))
                .unwrap_or(0);
            let out_share = out_transition
                .map(|t| (t.timeline_out - src.timeline_out).max(0))
                .unwrap_or(0);
            if in_share + out_share > 0 {
                let h_in = in_share.min(surplus);
                (h_in, surplus - h_in)
            } else {
                let h_in = surplus / 2;
                (h_in, surplus - h_in)
            }
        }
    };

    let last = dst.source.last_frame();
    dst.source_in = handle_in.clamp(0, last);
    dst.source_out = (last - handle_out).clamp(dst.source_in, last);
    dst.playback_speed = 1.0;
}

#[cfg(test)]
#[path = "../../tests/unit/export/range.rs"]
mod tests;
