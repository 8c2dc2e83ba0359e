//! Collated sequence construction.
//!
//! Collation copies every item that should ship with a master item into a
//! synthetic sequence, shifted into head-room space so custom start frames
//! below zero stay representable. The shift is negated exactly once, by the
//! range calculator during emission; nothing here knows about nodes.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    export::options::{ExportOptions, ReformatKind, parse_reformat_kind},
    export::progress::ProgressSink,
    export::range::{output_handles, timeline_range},
    foundation::core::{COLLATE_HEAD_ROOM, derive_guid},
    foundation::error::{ShotgraphError, ShotgraphResult},
    timeline::effects::{EffectNode, FormatChange, MainThreadToken},
    timeline::item::{Format, ItemReformatState, TrackItem},
    timeline::model::{Sequence, SubTrack, Track, Transition},
};

#[derive(Clone, Debug)]
/// Bookkeeping for one item copied into the synthetic sequence.
pub struct CopiedItem {
    /// Guid of the item on the original sequence.
    pub original_guid: String,
    /// Guid assigned to the copy.
    pub copy_guid: String,
    /// In-handle frames the copy absorbed.
    pub handle_in: i64,
    /// Out-handle frames the copy absorbed.
    pub handle_out: i64,
    /// Shifted cut-in, before handle widening.
    pub cut_timeline_in: i64,
}

#[derive(Debug)]
/// A synthetic sequence plus the facts assembly and tagging need about it.
pub struct CollatedSequence {
    pub sequence: Sequence,
    /// Guid of the master item's copy.
    pub master_guid: String,
    /// Source-to-timeline offset folded into every shifted position.
    pub offset: i64,
    /// Largest in-handle absorbed by any copy.
    pub in_handle: i64,
    /// Largest out-handle absorbed by any copy.
    pub out_handle: i64,
    /// Whether the synthetic format departed from the original sequence's.
    pub format_changed: bool,
    /// One record per inserted copy, master first.
    pub copies: Vec<CopiedItem>,
    /// Collision and option problems collected while building; non-fatal.
    pub errors: Vec<String>,
}

/// Whether this export calls for a synthetic sequence at all. True for any
/// collate option, and whenever items assigned to other views overlap the
/// master's range.
pub fn needs_collation(sequence: &Sequence, master_guid: &str, options: &ExportOptions) -> bool {
    if options.wants_collation() {
        return true;
    }
    match locate_master(sequence, master_guid) {
        Ok((track_idx, master)) => !other_view_items(sequence, track_idx, master).is_empty(),
        Err(_) => false,
    }
}

/// Build the synthetic sequence around `master_guid`.
///
/// Collisions caused by handle expansion skip the colliding item and record
/// an error string; only cancellation aborts the build.
#[tracing::instrument(skip_all, fields(master = master_guid))]
pub fn build_collated_sequence(
    sequence: &Sequence,
    master_guid: &str,
    options: &ExportOptions,
    token: &MainThreadToken,
    progress: &dyn ProgressSink,
) -> ShotgraphResult<CollatedSequence> {
    let (master_track, master) = locate_master(sequence, master_guid)?;
    let cut_handles = options.effective_cut_handles();
    let mut errors = Vec::new();

    let selected = select_candidates(sequence, master_track, master, options);
    let offset = compute_offset(master, cut_handles, options, &mut errors);
    let shift = COLLATE_HEAD_ROOM + offset;

    let mut shells: Vec<Track> = sequence.tracks.iter().map(track_shell).collect();
    let mut has_copy = vec![false; shells.len()];
    let mut copies: Vec<CopiedItem> = Vec::new();
    // original item guid -> (copy guid, handle_in, handle_out)
    let mut copy_map: BTreeMap<String, (String, i64, i64)> = BTreeMap::new();
    let (mut max_in, mut max_out) = (0i64, 0i64);

    for &(track_idx, item) in &selected {
        if progress.is_cancelled() {
            return Err(ShotgraphError::Cancelled);
        }
        let (handle_in, handle_out) =
            output_handles(cut_handles, item, options.retime_method, false);
        let cut_in = item.timeline_in + shift;
        // the shifted in-point must stay at or above frame zero
        let handle_in = handle_in.min(cut_in.max(0));

        let mut copy = item.clone();
        copy.guid = derive_guid(&item.guid, "collate");
        copy.timeline_in = cut_in - handle_in;
        copy.timeline_out = item.timeline_out + shift + handle_out;
        copy.source_in = item.source_in - handle_in;
        copy.source_out = item.source_out + handle_out;

        let shell = &mut shells[track_idx];
        if let Some(existing) = shell
            .items
            .iter()
            .find(|e| e.timeline_span().intersects(copy.timeline_span()))
        {
            errors.push(format!(
                "collated item '{}' ({}..{}) overlaps '{}' ({}..{}) on track '{}'",
                copy.name,
                copy.timeline_in,
                copy.timeline_out,
                existing.name,
                existing.timeline_in,
                existing.timeline_out,
                shell.name,
            ));
            continue;
        }
        copies.push(CopiedItem {
            original_guid: item.guid.clone(),
            copy_guid: copy.guid.clone(),
            handle_in,
            handle_out,
            cut_timeline_in: cut_in,
        });
        copy_map.insert(item.guid.clone(), (copy.guid.clone(), handle_in, handle_out));
        shell.items.push(copy);
        has_copy[track_idx] = true;
        max_in = max_in.max(handle_in);
        max_out = max_out.max(handle_out);
    }

    let (format, format_changed) = output_format(sequence, master, &copies, options, &mut errors);

    copy_transitions(sequence, &mut shells, &copy_map, shift);
    copy_subtrack_content(
        sequence,
        &mut shells,
        &has_copy,
        &copy_map,
        shift,
        token,
        |node| {
            if format_changed {
                FormatChange {
                    from: sequence.format.clone(),
                    to: format.clone(),
                }
                .apply(node);
                if let (ReformatKind::ToFormat, Some(custom)) = (
                    parse_reformat_kind(&options.reformat.to_type).unwrap_or(ReformatKind::None),
                    options.reformat.format.as_ref(),
                ) {
                    FormatChange {
                        from: format.clone(),
                        to: custom.clone(),
                    }
                    .apply(node);
                }
            }
        },
    );

    let first = copies.iter().map(|c| c.cut_timeline_in - c.handle_in).min();
    let last = shells
        .iter()
        .flat_map(|t| t.items.iter().map(|i| i.timeline_out))
        .max();

    let master_copy = copy_map
        .get(&master.guid)
        .map(|(guid, _, _)| guid.clone())
        .ok_or_else(|| {
            ShotgraphError::collation(format!(
                "master item '{}' did not survive collation",
                master.name
            ))
        })?;

    let sequence = Sequence {
        guid: derive_guid(&sequence.guid, "collated"),
        name: sequence.name.clone(),
        format,
        framerate: sequence.framerate,
        drop_frame: sequence.drop_frame,
        timecode_start: sequence.timecode_start - shift,
        in_time: first.map(|f| f.max(0)),
        out_time: last,
        views: sequence.views.clone(),
        tracks: shells
            .into_iter()
            .zip(has_copy)
            .filter_map(|(track, keep)| keep.then_some(track))
            .collect(),
        tags: sequence.tags.clone(),
    };

    Ok(CollatedSequence {
        sequence,
        master_guid: master_copy,
        offset,
        in_handle: max_in,
        out_handle: max_out,
        format_changed,
        copies,
        errors,
    })
}

fn locate_master<'a>(seq: &'a Sequence, guid: &str) -> ShotgraphResult<(usize, &'a TrackItem)> {
    seq.find_item(guid).ok_or_else(|| {
        ShotgraphError::collation(format!(
            "master item {guid} is not on sequence '{}'",
            seq.name
        ))
    })
}

/// Items on tracks assigned to a different view than the master's, where
/// they overlap the master's range. These ride along even when no collate
/// option is set.
fn other_view_items<'a>(
    seq: &'a Sequence,
    master_track: usize,
    master: &TrackItem,
) -> Vec<(usize, &'a TrackItem)> {
    let master_view = seq.tracks[master_track].view.as_deref();
    let master_range = timeline_range(&seq.tracks[master_track], master);
    let mut found = Vec::new();
    for (idx, track) in seq.tracks.iter().enumerate() {
        if idx == master_track || !track.enabled {
            continue;
        }
        if track.view.is_none() || track.view.as_deref() == master_view {
            continue;
        }
        for item in &track.items {
            if item.enabled && timeline_range(track, item).intersects(master_range) {
                found.push((idx, item));
            }
        }
    }
    found
}

/// Candidate selection: sequence-wide, or master plus name matches, range
/// intersections (to a fixpoint) and other-view items. The master sorts
/// first so it wins collisions; the rest follow in track/time order.
fn select_candidates<'a>(
    sequence: &'a Sequence,
    master_track: usize,
    master: &'a TrackItem,
    options: &ExportOptions,
) -> Vec<(usize, &'a TrackItem)> {
    let mut picked: Vec<(usize, &'a TrackItem)> = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    if options.collate_sequence {
        for (idx, track) in sequence.tracks.iter().enumerate() {
            if !track.enabled {
                continue;
            }
            for item in &track.items {
                if item.enabled && seen.insert(&item.guid) {
                    picked.push((idx, item));
                }
            }
        }
    } else {
        seen.insert(&master.guid);
        picked.push((master_track, master));

        if options.collate_shot_names {
            for (idx, track) in sequence.tracks.iter().enumerate() {
                if !track.enabled {
                    continue;
                }
                for item in &track.items {
                    if item.enabled && item.name == master.name && seen.insert(&item.guid) {
                        picked.push((idx, item));
                    }
                }
            }
        }

        if options.collate_tracks {
            // grow until no unselected item overlaps a selected range
            loop {
                let ranges: Vec<_> = picked
                    .iter()
                    .map(|&(idx, item)| timeline_range(&sequence.tracks[idx], item))
                    .collect();
                let mut grew = false;
                for (idx, track) in sequence.tracks.iter().enumerate() {
                    if !track.enabled {
                        continue;
                    }
                    for item in &track.items {
                        if !item.enabled || seen.contains(item.guid.as_str()) {
                            continue;
                        }
                        let range = timeline_range(track, item);
                        if ranges.iter().any(|r| r.intersects(range)) {
                            seen.insert(&item.guid);
                            picked.push((idx, item));
                            grew = true;
                        }
                    }
                }
                if !grew {
                    break;
                }
            }
        }

        for (idx, item) in other_view_items(sequence, master_track, master) {
            if seen.insert(&item.guid) {
                picked.push((idx, item));
            }
        }
    }

    picked.sort_by_key(|&(idx, item)| (item.guid != master.guid, idx, item.timeline_in));
    picked
}

/// The offset folded into every shifted position. Zero for sequence-time
/// output; otherwise the master's absolute source in minus its timeline in,
/// unless a custom start frame with cut handles pins the first emitted
/// frame instead.
fn compute_offset(
    master: &TrackItem,
    cut_handles: Option<i64>,
    options: &ExportOptions,
    errors: &mut Vec<String>,
) -> i64 {
    if options.output_sequence_time {
        return 0;
    }
    let absolute_source_in = master.source.source_in + master.source_in;
    match (cut_handles, options.start_frame) {
        (Some(_), Some(start)) => {
            let (handle_in, _) =
                output_handles(cut_handles, master, options.retime_method, false);
            start - master.timeline_in + handle_in
        }
        (None, Some(_)) => {
            // ambiguous combination; keep source frames and flag it
            errors.push(
                "custom start frame requires cut handles when collating; keeping source frames"
                    .to_owned(),
            );
            tracing::warn!("collate: start frame without cut handles, keeping source frames");
            absolute_source_in - master.timeline_in
        }
        _ => absolute_source_in - master.timeline_in,
    }
}

fn track_shell(track: &Track) -> Track {
    Track {
        guid: track.guid.clone(),
        name: track.name.clone(),
        view: track.view.clone(),
        blend_mode: track.blend_mode.clone(),
        blend_enabled: track.blend_enabled,
        mask_enabled: track.mask_enabled,
        enabled: track.enabled,
        items: Vec::new(),
        subtracks: vec![SubTrack::default(); track.subtracks.len()],
        transitions: Vec::new(),
    }
}

/// Synthetic sequence format. Disabled-reformat items bid their source
/// format upward; plate and explicit-format presets take the master's
/// source format outright.
fn output_format(
    sequence: &Sequence,
    master: &TrackItem,
    copies: &[CopiedItem],
    options: &ExportOptions,
    errors: &mut Vec<String>,
) -> (Format, bool) {
    let mut format = sequence.format.clone();
    let mut changed = false;

    let copied: BTreeSet<&str> = copies.iter().map(|c| c.original_guid.as_str()).collect();
    for track in &sequence.tracks {
        for item in &track.items {
            if !copied.contains(item.guid.as_str()) {
                continue;
            }
            if item.reformat_state == ItemReformatState::Disabled
                && item.source.format.area() > format.area()
            {
                format = item.source.format.clone();
                changed = true;
            }
        }
    }

    match parse_reformat_kind(&options.reformat.to_type) {
        Ok(ReformatKind::Plate | ReformatKind::ToFormat) => {
            changed = changed || master.source.format != sequence.format;
            format = master.source.format.clone();
        }
        Ok(_) => {}
        Err(err) => errors.push(err.to_string()),
    }
    (format, changed)
}

/// Transitions touching a copied item move with the same shift, endpoints
/// remapped onto copy guids.
fn copy_transitions(
    sequence: &Sequence,
    shells: &mut [Track],
    copy_map: &BTreeMap<String, (String, i64, i64)>,
    shift: i64,
) {
    for (idx, track) in sequence.tracks.iter().enumerate() {
        for transition in &track.transitions {
            let from = transition
                .from_item
                .as_deref()
                .and_then(|g| copy_map.get(g));
            let to = transition.to_item.as_deref().and_then(|g| copy_map.get(g));
            if from.is_none() && to.is_none() {
                continue;
            }
            shells[idx].transitions.push(Transition {
                guid: derive_guid(&transition.guid, "collate"),
                from_item: from.map(|(g, _, _)| g.clone()),
                to_item: to.map(|(g, _, _)| g.clone()),
                timeline_in: transition.timeline_in + shift,
                timeline_out: transition.timeline_out + shift,
            });
        }
    }
}

/// Copy effects and annotations onto the surviving shells: linked content
/// first, widened in lockstep with its item's handles, then unlinked
/// content with a plain shift. Animation curves move by the same shift;
/// `fixup` rescales unlinked spatial knobs when the output format changed.
fn copy_subtrack_content(
    sequence: &Sequence,
    shells: &mut [Track],
    has_copy: &[bool],
    copy_map: &BTreeMap<String, (String, i64, i64)>,
    shift: i64,
    token: &MainThreadToken,
    fixup: impl Fn(&mut EffectNode),
) {
    for (idx, track) in sequence.tracks.iter().enumerate() {
        if !has_copy[idx] {
            continue;
        }
        for (sub_idx, subtrack) in track.subtracks.iter().enumerate() {
            for effect in &subtrack.effects {
                let Some(copy) = relocate_linked(effect.linked_item.as_deref(), copy_map) else {
                    continue;
                };
                let (copy_guid, handle_in, handle_out) = copy;
                let mut node = effect.node(token).clone();
                node.shift_animation(shift);
                let span = effect
                    .timeline_span()
                    .shift(shift)
                    .with_handles(handle_in, handle_out);
                shells[idx].subtracks[sub_idx].effects.push(effect.clone_with(
                    derive_guid(&effect.guid, "collate"),
                    span,
                    Some(copy_guid),
                    node,
                ));
            }
            for annotation in &subtrack.annotations {
                let Some(copy) = relocate_linked(annotation.linked_item.as_deref(), copy_map)
                else {
                    continue;
                };
                let (copy_guid, handle_in, handle_out) = copy;
                let mut node = annotation.node(token).clone();
                node.shift_animation(shift);
                let span = annotation
                    .timeline_span()
                    .shift(shift)
                    .with_handles(handle_in, handle_out);
                shells[idx].subtracks[sub_idx].annotations.push(
                    annotation.clone_with(
                        derive_guid(&annotation.guid, "collate"),
                        span,
                        Some(copy_guid),
                        node,
                    ),
                );
            }
        }
        // unlinked content second, so linked copies keep sub-track order
        for (sub_idx, subtrack) in track.subtracks.iter().enumerate() {
            for effect in &subtrack.effects {
                if effect.linked_item.is_some() {
                    continue;
                }
                let mut node = effect.node(token).clone();
                node.shift_animation(shift);
                fixup(&mut node);
                shells[idx].subtracks[sub_idx].effects.push(effect.clone_with(
                    derive_guid(&effect.guid, "collate"),
                    effect.timeline_span().shift(shift),
                    None,
                    node,
                ));
            }
            for annotation in &subtrack.annotations {
                if annotation.linked_item.is_some() {
                    continue;
                }
                let mut node = annotation.node(token).clone();
                node.shift_animation(shift);
                shells[idx].subtracks[sub_idx].annotations.push(
                    annotation.clone_with(
                        derive_guid(&annotation.guid, "collate"),
                        annotation.timeline_span().shift(shift),
                        None,
                        node,
                    ),
                );
            }
        }
    }
}

fn relocate_linked(
    linked: Option<&str>,
    copy_map: &BTreeMap<String, (String, i64, i64)>,
) -> Option<(String, i64, i64)> {
    let (guid, handle_in, handle_out) = copy_map.get(linked?)?;
    Some((guid.clone(), *handle_in, *handle_out))
}

#[cfg(test)]
#[path = "../../tests/unit/collate/builder.rs"]
mod tests;
