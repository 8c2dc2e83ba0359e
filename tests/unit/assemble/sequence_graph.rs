use super::*;
use crate::{
    Annotation, Clip, EffectNode, Fps, FrameSpan, MediaSource, NullProgress, SoftEffect, SubTrack,
};

fn hd() -> Format {
    Format {
        width: 1920,
        height: 1080,
        pixel_aspect: 1.0,
        name: "HD_1080".to_owned(),
    }
}

fn clip(duration: i64) -> Clip {
    Clip {
        name: "plate_A".to_owned(),
        media: MediaSource {
            path: "/media/SH010_plate.####.dpx".to_owned(),
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

fn assemble(
    seq: &Sequence,
    options: &ExportOptions,
    master: Option<&str>,
    handles: (i64, i64),
) -> ShotgraphResult<AssembledScript> {
    let cache = EffectNodeCache::default();
    Assembler::new(AssemblySpec {
        sequence: seq,
        master,
        shot_guid: master,
        handles,
        collated: false,
        options,
        effect_nodes: &cache,
        script_path: Path::new("/exports/reel_01.nk"),
        progress: &NullProgress,
    })
    .assemble()
}

fn nodes_of(script: &Script, class: &NodeClass) -> Vec<NodeId> {
    script
        .nodes()
        .filter(|(_, n)| &n.class == class)
        .map(|(id, _)| id)
        .collect()
}

#[test]
fn single_item_export_remaps_onto_the_start_frame() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let options = ExportOptions {
        cut_handles: Some(10),
        start_frame: Some(1001),
        ..ExportOptions::default()
    };
    let assembled = assemble(&seq, &options, Some("item-1"), (10, 10)).unwrap();
    assert_eq!((assembled.first_frame, assembled.last_frame), (1001, 1071));

    let script = &assembled.script;
    let root = script.node(script.root_node().unwrap());
    assert_eq!(root.knob_value("first_frame"), Some(&KnobValue::Int(1001)));
    assert_eq!(root.knob_value("last_frame"), Some(&KnobValue::Int(1071)));
    assert_eq!(
        root.knob_value("name"),
        Some(&KnobValue::Text("/exports/reel_01.nk".to_owned()))
    );
    let knob_names: Vec<_> = root.user_knobs.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(knob_names, vec!["shot_guid", "in_handle", "out_handle"]);

    let reads = nodes_of(script, &NodeClass::Read);
    assert_eq!(reads.len(), 1);
    let read = script.node(reads[0]);
    assert_eq!(read.knob_value("first"), Some(&KnobValue::Int(0)));
    assert_eq!(read.knob_value("last"), Some(&KnobValue::Int(69)));
    assert_eq!(read.knob_value("frame"), Some(&KnobValue::Int(1001)));

    // source timecode of the first emitted frame: 90 frames at 24fps
    let timecode = nodes_of(script, &NodeClass::AddTimeCode);
    assert_eq!(timecode.len(), 1);
    assert_eq!(
        script.node(timecode[0]).knob_value("startcode"),
        Some(&KnobValue::Text("00:00:03:18".to_owned()))
    );
}

#[test]
fn tracks_merge_bottom_up_around_stack_markers() {
    let seq = sequence(vec![
        track("v1", "Video 1", vec![item("a", "SH010", (0, 9), (0, 9))]),
        track("v2", "Video 2", vec![item("b", "SH020", (0, 9), (0, 9))]),
    ]);
    let assembled = assemble(&seq, &ExportOptions::default(), None, (0, 0)).unwrap();
    let script = &assembled.script;

    let merges = nodes_of(script, &NodeClass::Merge);
    assert_eq!(merges.len(), 1);
    let merge = script.node(merges[0]);
    // the top track was emitted first and feeds input 0
    let reads = nodes_of(script, &NodeClass::Read);
    assert_eq!(merge.inputs, vec![Some(reads[0]), Some(reads[1])]);

    let sets = nodes_of(script, &NodeClass::Set);
    let pushes = nodes_of(script, &NodeClass::Push);
    assert_eq!(sets.len(), 1);
    assert_eq!(pushes.len(), 1);
    assert!(sets[0] < pushes[0] && pushes[0] < merges[0]);

    // shared tail: metadata, timecode, viewer
    let metadata = nodes_of(script, &NodeClass::Metadata);
    assert_eq!(metadata.len(), 1);
    match script.node(metadata[0]).knob_value("metadata") {
        Some(KnobValue::Pairs(pairs)) => {
            assert_eq!(pairs[0], ("hiero/project".to_owned(), "reel_01".to_owned()));
            assert_eq!(pairs[1].0, "hiero/project_guid");
        }
        other => panic!("unexpected metadata knob {other:?}"),
    }
    let viewers = nodes_of(script, &NodeClass::Viewer);
    assert_eq!(viewers.len(), 1);
    let timecode = nodes_of(script, &NodeClass::AddTimeCode);
    assert_eq!(
        script.node(viewers[0]).inputs,
        vec![Some(timecode[0])]
    );
}

#[test]
fn gaps_fill_with_lifetimed_constants() {
    let mut seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("a", "SH010", (10, 19), (0, 9))],
    )]);
    seq.in_time = Some(0);
    seq.out_time = Some(29);
    let assembled = assemble(&seq, &ExportOptions::default(), None, (0, 0)).unwrap();
    let script = &assembled.script;

    let constants = nodes_of(script, &NodeClass::Constant);
    assert_eq!(constants.len(), 2);
    let leading = script.node(constants[0]);
    assert_eq!(leading.knob_value("lifetime_start"), Some(&KnobValue::Int(0)));
    assert_eq!(leading.knob_value("lifetime_end"), Some(&KnobValue::Int(9)));
    let trailing = script.node(constants[1]);
    assert_eq!(trailing.knob_value("lifetime_start"), Some(&KnobValue::Int(20)));
    assert_eq!(trailing.knob_value("lifetime_end"), Some(&KnobValue::Int(29)));
    assert_eq!(nodes_of(script, &NodeClass::Merge).len(), 2);
}

#[test]
fn transitions_become_dissolves() {
    let mut video = track(
        "v1",
        "Video 1",
        vec![
            item("a", "SH010", (0, 9), (0, 9)),
            item("b", "SH020", (10, 19), (0, 9)),
        ],
    );
    video.transitions.push(Transition {
        guid: "t1".to_owned(),
        from_item: Some("a".to_owned()),
        to_item: Some("b".to_owned()),
        timeline_in: 8,
        timeline_out: 11,
    });
    let seq = sequence(vec![video]);
    let assembled = assemble(&seq, &ExportOptions::default(), None, (0, 0)).unwrap();
    let script = &assembled.script;

    let dissolves = nodes_of(script, &NodeClass::Dissolve);
    assert_eq!(dissolves.len(), 1);
    assert_eq!(
        script.node(dissolves[0]).knob_value("which"),
        Some(&KnobValue::Curve(AnimCurve::from_keys(vec![
            (8, 0.0),
            (11, 1.0)
        ])))
    );
    assert!(nodes_of(script, &NodeClass::Merge).is_empty());
}

#[test]
fn item_lifetimes_land_in_output_frames() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![
            item("a", "SH010", (0, 9), (0, 9)),
            item("b", "SH020", (10, 19), (0, 9)),
        ],
    )]);
    let options = ExportOptions {
        start_frame: Some(1001),
        ..ExportOptions::default()
    };
    let assembled = assemble(&seq, &options, None, (0, 0)).unwrap();
    let script = &assembled.script;
    let reads = nodes_of(script, &NodeClass::Read);
    assert_eq!(
        script.node(reads[0]).knob_value("lifetime_start"),
        Some(&KnobValue::Int(1001))
    );
    assert_eq!(
        script.node(reads[1]).knob_value("lifetime_start"),
        Some(&KnobValue::Int(1011))
    );
}

#[test]
fn disconnected_tracks_ride_the_viewers_spare_inputs() {
    let seq = sequence(vec![
        track("v1", "Video 1", vec![item("a", "SH010", (0, 9), (0, 9))]),
        track("v2", "Video 2", vec![item("b", "SH020", (0, 9), (0, 9))]),
    ]);
    let options = ExportOptions {
        connect_tracks: false,
        ..ExportOptions::default()
    };
    let assembled = assemble(&seq, &options, None, (0, 0)).unwrap();
    let script = &assembled.script;

    assert!(nodes_of(script, &NodeClass::Merge).is_empty());
    let reads = nodes_of(script, &NodeClass::Read);
    let viewers = nodes_of(script, &NodeClass::Viewer);
    let viewer = script.node(viewers[0]);
    assert_eq!(viewer.inputs.len(), 2);
    // the top track never joined the stream; it hangs off input 1
    assert_eq!(viewer.inputs[1], Some(reads[0]));
}

#[test]
fn write_fan_out_keeps_the_timeline_write_on_the_main_branch() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("a", "SH010", (0, 9), (0, 9))],
    )]);
    let options = ExportOptions {
        write_paths: vec![
            WriteNodeSpec {
                path: "renders/a.mov".to_owned(),
                name: None,
                file_type: None,
                colorspace: None,
                burn_in: None,
            },
            WriteNodeSpec {
                path: "renders/b.mov".to_owned(),
                name: None,
                file_type: None,
                colorspace: None,
                burn_in: None,
            },
        ],
        timeline_write_node: "renders/b.mov".to_owned(),
        ..ExportOptions::default()
    };
    let assembled = assemble(&seq, &options, None, (0, 0)).unwrap();
    assert_eq!(
        assembled.write_paths,
        vec!["renders/a.mov".to_owned(), "renders/b.mov".to_owned()]
    );

    let script = &assembled.script;
    let writes = nodes_of(script, &NodeClass::Write);
    assert_eq!(writes.len(), 2);
    assert_eq!(nodes_of(script, &NodeClass::Dot).len(), 1);

    let main_write = writes
        .iter()
        .copied()
        .find(|&id| {
            script.node(id).knob_value("file")
                == Some(&KnobValue::Text("renders/b.mov".to_owned()))
        })
        .unwrap();
    assert_eq!(
        script.node(main_write).knob_value("file_type"),
        Some(&KnobValue::Text("mov".to_owned()))
    );
    let viewers = nodes_of(script, &NodeClass::Viewer);
    assert_eq!(script.node(viewers[0]).inputs[0], Some(main_write));
}

#[test]
fn unresolvable_write_paths_are_errors_not_failures() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("a", "SH010", (0, 9), (0, 9))],
    )]);
    let options = ExportOptions {
        write_paths: vec![WriteNodeSpec {
            path: "renders/{nope}.mov".to_owned(),
            name: None,
            file_type: None,
            colorspace: None,
            burn_in: None,
        }],
        ..ExportOptions::default()
    };
    let assembled = assemble(&seq, &options, None, (0, 0)).unwrap();
    assert!(assembled.write_paths.is_empty());
    assert_eq!(assembled.errors.len(), 1);
    assert!(assembled.errors[0].contains("{nope}"));
}

#[test]
fn annotation_keys_collect_on_a_noop_and_feed_precomps() {
    let mut video = track("v1", "Video 1", vec![item("a", "SH010", (0, 9), (0, 9))]);
    let node = EffectNode {
        class: "RotoPaint".to_owned(),
        knobs: Vec::new(),
    };
    video.subtracks.push(SubTrack {
        effects: Vec::new(),
        annotations: vec![Annotation::new(
            "ann-1",
            FrameSpan { first: 5, last: 5 },
            None,
            node.clone(),
        )],
    });
    let seq = sequence(vec![video]);
    let options = ExportOptions {
        include_annotations: true,
        annotations_pre_comp_paths: vec!["ann/{sequence}.nk".to_owned()],
        ..ExportOptions::default()
    };
    let mut cache = EffectNodeCache::default();
    cache.insert("ann-1".to_owned(), node);
    let assembled = Assembler::new(AssemblySpec {
        sequence: &seq,
        master: None,
        shot_guid: None,
        handles: (0, 0),
        collated: false,
        options: &options,
        effect_nodes: &cache,
        script_path: Path::new("/exports/reel_01.nk"),
        progress: &NullProgress,
    })
    .assemble()
    .unwrap();
    let script = &assembled.script;

    let keys = script.find_node_by_name("AnnotationsKeys").unwrap();
    let keys_node = script.node(keys);
    assert_eq!(keys_node.class, NodeClass::NoOp);
    assert_eq!(
        keys_node.user_knobs[0].value.as_deref(),
        Some("{curve x5 1}")
    );

    let precomps = nodes_of(script, &NodeClass::Precomp);
    assert_eq!(precomps.len(), 1);
    let precomp = script.node(precomps[0]);
    assert_eq!(
        precomp.knob_value("file"),
        Some(&KnobValue::Text("ann/reel_01.nk".to_owned()))
    );
    let linked: Vec<_> = precomp
        .user_knobs
        .iter()
        .map(|k| (k.typecode, k.name.as_str()))
        .collect();
    assert_eq!(
        linked,
        vec![(41, "annotation_key_info"), (22, "prev_key"), (22, "next_key")]
    );
}

#[test]
fn pure_effect_tracks_apply_above_the_merged_stream() {
    let mut fx = track("fx", "Effects", Vec::new());
    fx.subtracks.push(SubTrack {
        effects: vec![SoftEffect::new(
            "fx-1",
            "master_grade",
            FrameSpan { first: 0, last: 9 },
            None,
            EffectNode {
                class: "Grade".to_owned(),
                knobs: Vec::new(),
            },
        )],
        annotations: Vec::new(),
    });
    let seq = sequence(vec![
        track("v1", "Video 1", vec![item("a", "SH010", (0, 9), (0, 9))]),
        fx,
    ]);
    let mut cache = EffectNodeCache::default();
    cache.insert(
        "fx-1".to_owned(),
        EffectNode {
            class: "Grade".to_owned(),
            knobs: Vec::new(),
        },
    );
    let assembled = Assembler::new(AssemblySpec {
        sequence: &seq,
        master: None,
        shot_guid: None,
        handles: (0, 0),
        collated: false,
        options: &ExportOptions::default(),
        effect_nodes: &cache,
        script_path: Path::new("/exports/reel_01.nk"),
        progress: &NullProgress,
    })
    .assemble()
    .unwrap();
    let script = &assembled.script;

    let grade = script.find_node_by_name("master_grade").unwrap();
    let reads = nodes_of(script, &NodeClass::Read);
    assert_eq!(script.node(grade).inputs, vec![Some(reads[0])]);
    // the shared tail hangs off the grade, not the bare read
    let metadata = nodes_of(script, &NodeClass::Metadata);
    assert_eq!(script.node(metadata[0]).inputs, vec![Some(grade)]);
}

#[test]
fn an_all_offline_sequence_has_nothing_to_export() {
    let mut offline = item("a", "SH010", (0, 9), (0, 9));
    offline.source.media.online = false;
    let seq = sequence(vec![track("v1", "Video 1", vec![offline])]);
    let err = assemble(&seq, &ExportOptions::default(), None, (0, 0)).unwrap_err();
    assert!(err.to_string().contains("nothing to export"));
}
