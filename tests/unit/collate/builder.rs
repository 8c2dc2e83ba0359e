use super::*;
use crate::{
    AnimCurve, Clip, Fps, FrameSpan, KnobValue, MediaSource, NullProgress, SoftEffect,
};

fn clip(duration: i64) -> Clip {
    Clip {
        name: "plate".to_owned(),
        media: MediaSource {
            path: "/media/plate.####.dpx".to_owned(),
            online: true,
        },
        format: hd(),
        framerate: None,
        timecode_start: 0,
        duration,
        source_in: 0,
        colorspace: None,
    }
}

fn hd() -> Format {
    Format {
        width: 1920,
        height: 1080,
        pixel_aspect: 1.0,
        name: "HD_1080".to_owned(),
    }
}

fn item(guid: &str, name: &str, timeline: (i64, i64), source: (i64, i64)) -> TrackItem {
    TrackItem {
        guid: guid.to_owned(),
        name: name.to_owned(),
        timeline_in: timeline.0,
        timeline_out: timeline.1,
        source_in: source.0,
        source_out: source.1,
        playback_speed: 1.0,
        reformat_state: ItemReformatState::ToSequence,
        enabled: true,
        source: clip(1000),
        tags: Vec::new(),
    }
}

fn track(guid: &str, name: &str, items: Vec<TrackItem>) -> Track {
    Track {
        guid: guid.to_owned(),
        name: name.to_owned(),
        view: None,
        blend_mode: None,
        blend_enabled: false,
        mask_enabled: false,
        enabled: true,
        items,
        subtracks: Vec::new(),
        transitions: Vec::new(),
    }
}

fn sequence(tracks: Vec<Track>) -> Sequence {
    Sequence {
        guid: "seq-1".to_owned(),
        name: "reel_01".to_owned(),
        format: hd(),
        framerate: Fps::new(24, 1).unwrap(),
        drop_frame: false,
        timecode_start: 0,
        in_time: None,
        out_time: None,
        views: Vec::new(),
        tracks,
        tags: Vec::new(),
    }
}

fn master_item() -> TrackItem {
    item("master", "SH010", (100, 149), (10, 59))
}

fn build(
    seq: &Sequence,
    options: &ExportOptions,
) -> CollatedSequence {
    let token = MainThreadToken::acquire();
    build_collated_sequence(seq, "master", options, &token, &NullProgress).unwrap()
}

#[test]
fn collation_is_opt_in_but_forced_by_other_views() {
    let seq = sequence(vec![track("v1", "Video 1", vec![master_item()])]);
    let options = ExportOptions::default();
    assert!(!needs_collation(&seq, "master", &options));

    let options = ExportOptions {
        collate_tracks: true,
        ..ExportOptions::default()
    };
    assert!(needs_collation(&seq, "master", &options));

    let mut left = track("v1", "Video 1", vec![master_item()]);
    left.view = Some("left".to_owned());
    let mut right = track(
        "v2",
        "Video 2",
        vec![item("other", "SH010_r", (120, 139), (0, 19))],
    );
    right.view = Some("right".to_owned());
    let stereo = sequence(vec![left, right]);
    assert!(needs_collation(&stereo, "master", &ExportOptions::default()));
}

#[test]
fn shift_folds_head_room_and_source_offset() {
    let seq = sequence(vec![
        track("v1", "Video 1", vec![master_item()]),
        track("v2", "Video 2", vec![item("fg", "FG", (120, 139), (0, 19))]),
    ]);
    let options = ExportOptions {
        collate_tracks: true,
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);

    // absolute source in 10 minus timeline in 100
    assert_eq!(collated.offset, -90);
    let shift = COLLATE_HEAD_ROOM + collated.offset;
    assert_eq!(shift, 910);

    assert_eq!(collated.copies[0].original_guid, "master");
    assert_eq!(collated.copies[0].cut_timeline_in, 100 + shift);
    assert_eq!(collated.master_guid, derive_guid("master", "collate"));
    assert_eq!(collated.sequence.timecode_start, -shift);
    assert_eq!(collated.sequence.in_time, Some(1010));
    assert_eq!(collated.sequence.out_time, Some(1059));
    assert_eq!(collated.sequence.tracks.len(), 2);
    assert!(collated.errors.is_empty());

    let master_copy = &collated.sequence.tracks[0].items[0];
    assert_eq!(master_copy.timeline_in - 100, shift);
    assert_eq!(master_copy.timeline_out - 149, shift);
    assert_eq!((master_copy.source_in, master_copy.source_out), (10, 59));
}

#[test]
fn copies_absorb_their_handles() {
    let seq = sequence(vec![track("v1", "Video 1", vec![master_item()])]);
    let options = ExportOptions {
        collate_tracks: true,
        cut_handles: Some(10),
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);

    let copy = &collated.sequence.tracks[0].items[0];
    assert_eq!((copy.source_in, copy.source_out), (0, 69));
    assert_eq!(copy.timeline_in, 1000);
    assert_eq!(copy.timeline_out, 1069);
    assert_eq!((collated.in_handle, collated.out_handle), (10, 10));
    assert_eq!(collated.copies[0].handle_in, 10);
}

#[test]
fn handle_collisions_skip_the_loser_and_record_an_error() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![master_item(), item("next", "SH020", (150, 199), (10, 59))],
    )]);
    let options = ExportOptions {
        collate_sequence: true,
        cut_handles: Some(10),
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);

    // master widens to 1000..1069; the next cut would start at 1050
    assert_eq!(collated.copies.len(), 1);
    assert_eq!(collated.copies[0].original_guid, "master");
    assert_eq!(collated.errors.len(), 1);
    assert!(collated.errors[0].contains("SH020"));
    assert!(collated.errors[0].contains("SH010"));
}

#[test]
fn name_collation_picks_matching_shots_only() {
    let seq = sequence(vec![
        track("v1", "Video 1", vec![master_item()]),
        track(
            "v2",
            "Video 2",
            vec![
                item("same", "SH010", (300, 319), (0, 19)),
                item("other", "SH020", (340, 359), (0, 19)),
            ],
        ),
    ]);
    let options = ExportOptions {
        collate_shot_names: true,
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);
    let originals: Vec<_> = collated
        .copies
        .iter()
        .map(|c| c.original_guid.as_str())
        .collect();
    assert_eq!(originals, vec!["master", "same"]);
}

#[test]
fn disabled_reformat_items_bid_the_format_upward() {
    let mut uhd = item("fg", "FG", (120, 139), (0, 19));
    uhd.reformat_state = ItemReformatState::Disabled;
    uhd.source.format = Format {
        width: 3840,
        height: 2160,
        pixel_aspect: 1.0,
        name: "UHD_4K".to_owned(),
    };
    let seq = sequence(vec![
        track("v1", "Video 1", vec![master_item()]),
        track("v2", "Video 2", vec![uhd]),
    ]);
    let options = ExportOptions {
        collate_tracks: true,
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);
    assert!(collated.format_changed);
    assert_eq!(collated.sequence.format.width, 3840);
}

#[test]
fn transitions_move_with_the_shift() {
    let mut video = track(
        "v1",
        "Video 1",
        vec![master_item(), item("next", "SH020", (150, 199), (10, 59))],
    );
    video.transitions.push(Transition {
        guid: "t1".to_owned(),
        from_item: Some("master".to_owned()),
        to_item: Some("next".to_owned()),
        timeline_in: 145,
        timeline_out: 154,
    });
    let seq = sequence(vec![video]);
    let options = ExportOptions {
        collate_sequence: true,
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);

    let moved = &collated.sequence.tracks[0].transitions[0];
    assert_eq!(moved.timeline_in, 145 + 910);
    assert_eq!(moved.timeline_out, 154 + 910);
    assert_eq!(
        moved.from_item.as_deref(),
        Some(derive_guid("master", "collate").as_str())
    );
    assert_eq!(
        moved.to_item.as_deref(),
        Some(derive_guid("next", "collate").as_str())
    );
}

#[test]
fn linked_effects_relocate_and_widen_with_their_item() {
    let token = MainThreadToken::acquire();
    let mut video = track("v1", "Video 1", vec![master_item()]);
    let mut node = EffectNode {
        class: "Grade".to_owned(),
        knobs: Vec::new(),
    };
    node.set_knob(
        "white",
        KnobValue::Curve(AnimCurve::from_keys(vec![(110, 2.0)])),
    );
    video.subtracks.push(SubTrack {
        effects: vec![SoftEffect::new(
            "fx-1",
            "grade",
            FrameSpan { first: 100, last: 149 },
            Some("master".to_owned()),
            node,
        )],
        annotations: Vec::new(),
    });
    let seq = sequence(vec![video]);
    let options = ExportOptions {
        collate_tracks: true,
        cut_handles: Some(10),
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);

    let effect = &collated.sequence.tracks[0].subtracks[0].effects[0];
    assert_eq!((effect.timeline_in, effect.timeline_out), (1000, 1069));
    assert_eq!(
        effect.linked_item.as_deref(),
        Some(derive_guid("master", "collate").as_str())
    );
    let moved = effect.node(&token);
    assert_eq!(
        moved.knob("white"),
        Some(&KnobValue::Curve(AnimCurve::from_keys(vec![(1020, 2.0)])))
    );
}

#[test]
fn sequence_time_output_drops_the_source_offset() {
    let seq = sequence(vec![track("v1", "Video 1", vec![master_item()])]);
    let options = ExportOptions {
        collate_tracks: true,
        output_sequence_time: true,
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);
    assert_eq!(collated.offset, 0);
    assert_eq!(collated.sequence.tracks[0].items[0].timeline_in, 1100);
}

#[test]
fn start_frame_without_handles_keeps_source_frames() {
    let seq = sequence(vec![track("v1", "Video 1", vec![master_item()])]);
    let options = ExportOptions {
        collate_tracks: true,
        start_frame: Some(1001),
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);
    assert_eq!(collated.offset, -90);
    assert_eq!(collated.errors.len(), 1);
}

#[test]
fn start_frame_with_handles_pins_the_first_emitted_frame() {
    let seq = sequence(vec![track("v1", "Video 1", vec![master_item()])]);
    let options = ExportOptions {
        collate_tracks: true,
        cut_handles: Some(10),
        start_frame: Some(1001),
        ..ExportOptions::default()
    };
    let collated = build(&seq, &options);
    // 1001 - 100 + in-handle 10
    assert_eq!(collated.offset, 911);
}

#[test]
fn missing_master_is_an_error() {
    let seq = sequence(vec![track("v1", "Video 1", Vec::new())]);
    let token = MainThreadToken::acquire();
    let err = build_collated_sequence(
        &seq,
        "master",
        &ExportOptions::default(),
        &token,
        &NullProgress,
    )
    .unwrap_err();
    assert!(err.to_string().contains("master"));
}
