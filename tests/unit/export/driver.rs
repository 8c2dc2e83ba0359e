use super::*;
use crate::{
    Clip, Fps, ItemReformatState, MediaSource, NullProgress, SharedProgress, TagKey, Track,
};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "shotgraph_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
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
        source: Clip {
            name: "plate_A".to_owned(),
            media: MediaSource {
                path: "/media/SH010_plate.####.dpx".to_owned(),
                online: true,
            },
            format: hd(),
            framerate: None,
            timecode_start: 0,
            duration: 1000,
            source_in: 0,
            colorspace: None,
        },
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

fn preset(options: ExportOptions) -> ExportPreset {
    ExportPreset {
        id: "preset-1".to_owned(),
        name: "Shot Export".to_owned(),
        options,
    }
}

#[test]
fn script_extension_follows_the_license() {
    let path = Path::new("/exports/shot.nk");
    assert_eq!(
        normalize_script_extension(path, LicenseMode::Commercial),
        PathBuf::from("/exports/shot.nk")
    );
    assert_eq!(
        normalize_script_extension(path, LicenseMode::NonCommercial),
        PathBuf::from("/exports/shot.nknc")
    );
    assert_eq!(
        normalize_script_extension(path, LicenseMode::Indie),
        PathBuf::from("/exports/shot.nkind")
    );
}

#[test]
fn item_export_writes_the_script_and_builds_the_tag() {
    let tmp = temp_dir("driver_item_export");
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let preset = preset(ExportOptions {
        cut_handles: Some(10),
        start_frame: Some(1001),
        ..ExportOptions::default()
    });
    let template = format!("{}/{{sequence}}/{{shot}}_{{version}}.{{ext}}", tmp.display());
    let token = MainThreadToken::acquire();

    let target = ExportTarget::Item {
        sequence: &seq,
        item_guid: "item-1",
    };
    let outcome = ExportTask::new(target, &preset, &template, &token, &NullProgress)
        .unwrap()
        .with_localtime("2026/08/29 12:00:00")
        .run()
        .unwrap();

    assert!(!outcome.skipped);
    assert_eq!((outcome.first_frame, outcome.last_frame), (1001, 1071));
    let script_path = outcome.script_path.as_deref().unwrap();
    assert_eq!(script_path, tmp.join("reel_01/SH010_v1.nk"));
    let text = std::fs::read_to_string(script_path).unwrap();
    assert!(text.starts_with("Root {"));

    let tag = outcome.tag.as_ref().unwrap();
    assert_eq!(tag.name, "Shot Export");
    assert_eq!(tag.get(TagKey::PresetId), Some("preset-1"));
    assert_eq!(tag.get(TagKey::Script), script_path.to_str());
    assert_eq!(tag.get(TagKey::PathTemplate), Some(template.as_str()));
    assert_eq!(tag.get(TagKey::Localtime), Some("2026/08/29 12:00:00"));
    assert_eq!(tag.get(TagKey::StartFrame), Some("1001"));
    assert_eq!(tag.get(TagKey::Duration), Some("71"));
    assert_eq!(tag.get(TagKey::StartHandle), Some("10"));
    assert_eq!(tag.get(TagKey::EndHandle), Some("10"));
    assert_eq!(tag.get(TagKey::FrameOffset), Some("911"));
    assert_eq!(tag.get(TagKey::SourceRetime), Some("1"));
    assert_eq!(tag.get(TagKey::AppliedRetimes), Some("0"));

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn sequence_exports_carry_no_tag() {
    let tmp = temp_dir("driver_sequence_export");
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let preset = preset(ExportOptions::default());
    let template = format!("{}/{{sequence}}.{{ext}}", tmp.display());
    let token = MainThreadToken::acquire();

    let outcome = ExportTask::new(
        ExportTarget::Sequence(&seq),
        &preset,
        &template,
        &token,
        &NullProgress,
    )
    .unwrap()
    .run()
    .unwrap();

    assert!(outcome.tag.is_none());
    assert_eq!((outcome.first_frame, outcome.last_frame), (0, 149));
    let script_path = outcome.script_path.as_deref().unwrap();
    assert_eq!(script_path, tmp.join("reel_01.nk"));
    assert!(script_path.is_file());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn stages_advance_in_fixed_order() {
    let tmp = temp_dir("driver_stages");
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let preset = preset(ExportOptions::default());
    let template = format!("{}/{{sequence}}.{{ext}}", tmp.display());
    let token = MainThreadToken::acquire();

    let mut task = ExportTask::new(
        ExportTarget::Sequence(&seq),
        &preset,
        &template,
        &token,
        &NullProgress,
    )
    .unwrap();

    let mut stages = vec![task.stage()];
    while task.task_step().unwrap() {
        stages.push(task.stage());
    }
    stages.push(task.stage());
    assert_eq!(
        stages,
        vec![
            TaskStage::Resolve,
            TaskStage::Collate,
            TaskStage::Assemble,
            TaskStage::Layout,
            TaskStage::Serialize,
            TaskStage::PostProcess,
            TaskStage::Tag,
            TaskStage::Done,
        ]
    );

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn offline_media_skips_the_task() {
    let mut offline = item("item-1", "SH010", (100, 149), (10, 59));
    offline.source.media.online = false;
    let seq = sequence(vec![track("v1", "Video 1", vec![offline])]);
    let preset = preset(ExportOptions::default());
    let token = MainThreadToken::acquire();

    let outcome = ExportTask::new(
        ExportTarget::Item {
            sequence: &seq,
            item_guid: "item-1",
        },
        &preset,
        "/nonexistent/{sequence}.{ext}",
        &token,
        &NullProgress,
    )
    .unwrap()
    .run()
    .unwrap();

    assert!(outcome.skipped);
    assert!(outcome.script_path.is_none());
    assert!(outcome.tag.is_none());
}

#[test]
fn cancellation_aborts_the_task() {
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let preset = preset(ExportOptions::default());
    let token = MainThreadToken::acquire();
    let progress = SharedProgress::new();
    progress.cancel();

    let task = ExportTask::new(
        ExportTarget::Sequence(&seq),
        &preset,
        "/nonexistent/{sequence}.{ext}",
        &token,
        &progress,
    )
    .unwrap();
    let err = task.run().unwrap_err();
    assert!(matches!(err, ShotgraphError::Cancelled));
}

#[test]
fn failing_post_processor_is_a_warning_not_an_error() {
    struct Failing;
    impl ScriptPostProcessor for Failing {
        fn post_process(&self, _path: &Path) -> Result<(), String> {
            Err("boom".to_owned())
        }
    }

    let tmp = temp_dir("driver_post_process");
    let seq = sequence(vec![track(
        "v1",
        "Video 1",
        vec![item("item-1", "SH010", (100, 149), (10, 59))],
    )]);
    let preset = preset(ExportOptions::default());
    let template = format!("{}/{{sequence}}.{{ext}}", tmp.display());
    let token = MainThreadToken::acquire();
    let hook = Failing;

    let outcome = ExportTask::new(
        ExportTarget::Sequence(&seq),
        &preset,
        &template,
        &token,
        &NullProgress,
    )
    .unwrap()
    .with_post_processor(&hook)
    .run()
    .unwrap();

    assert_eq!(
        outcome.warnings,
        vec!["post-processor failed: boom".to_owned()]
    );
    // the script stays on disk regardless
    assert!(outcome.script_path.unwrap().is_file());

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn collation_pulls_overlapping_tracks_into_the_script() {
    let tmp = temp_dir("driver_collate");
    let seq = sequence(vec![
        track(
            "v1",
            "Video 1",
            vec![item("item-1", "SH010", (100, 149), (10, 59))],
        ),
        track(
            "v2",
            "Video 2",
            vec![item("item-2", "SH010_fg", (120, 139), (0, 19))],
        ),
    ]);
    let template = format!("{}/{{shot}}.{{ext}}", tmp.display());
    let token = MainThreadToken::acquire();
    let target = ExportTarget::Item {
        sequence: &seq,
        item_guid: "item-1",
    };

    // without collation only the master item lands in the script
    let plain = preset(ExportOptions {
        cut_handles: Some(0),
        ..ExportOptions::default()
    });
    let outcome = ExportTask::new(target, &plain, &template, &token, &NullProgress)
        .unwrap()
        .run()
        .unwrap();
    let text = std::fs::read_to_string(outcome.script_path.unwrap()).unwrap();
    assert_eq!(text.matches("Read {").count(), 1);

    let collating = preset(ExportOptions {
        cut_handles: Some(0),
        collate_tracks: true,
        ..ExportOptions::default()
    });
    let outcome = ExportTask::new(target, &collating, &template, &token, &NullProgress)
        .unwrap()
        .run()
        .unwrap();
    assert!(outcome.errors.is_empty());
    let tag = outcome.tag.as_ref().unwrap();
    assert_eq!(tag.get(TagKey::StartHandle), Some("0"));
    let text = std::fs::read_to_string(outcome.script_path.unwrap()).unwrap();
    assert_eq!(text.matches("Read {").count(), 2);

    std::fs::remove_dir_all(&tmp).ok();
}

#[test]
fn unknown_items_are_rejected_up_front() {
    let seq = sequence(vec![track("v1", "Video 1", Vec::new())]);
    let preset = preset(ExportOptions::default());
    let token = MainThreadToken::acquire();
    let err = ExportTask::new(
        ExportTarget::Item {
            sequence: &seq,
            item_guid: "missing",
        },
        &preset,
        "/exports/{sequence}.{ext}",
        &token,
        &NullProgress,
    )
    .unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[test]
fn export_tags_replace_per_preset() {
    let mut shot = item("item-1", "SH010", (100, 149), (10, 59));
    let mut fields = ExportTagFields {
        preset_id: "preset-1".to_owned(),
        script_path: "/exports/a.nk".to_owned(),
        ..ExportTagFields::default()
    };
    apply_export_tag(&mut shot, build_export_tag(&fields));
    fields.script_path = "/exports/b.nk".to_owned();
    apply_export_tag(&mut shot, build_export_tag(&fields));

    assert_eq!(shot.tags.len(), 1);
    assert_eq!(shot.tags[0].get(TagKey::Script), Some("/exports/b.nk"));
}

#[test]
fn format_descriptor_names_the_resolution() {
    assert_eq!(format_descriptor(&hd()), "1920x1080 HD_1080");
    let bare = Format {
        name: String::new(),
        ..hd()
    };
    assert_eq!(format_descriptor(&bare), "1920x1080");
}
