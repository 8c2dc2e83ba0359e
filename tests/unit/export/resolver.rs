use super::*;
use crate::{Clip, Fps, Format, ItemReformatState, MediaSource};

fn fixture() -> (Sequence, Track, TrackItem) {
    let item = TrackItem {
        guid: "item-1".to_owned(),
        name: "SH010".to_owned(),
        timeline_in: 100,
        timeline_out: 149,
        source_in: 10,
        source_out: 59,
        playback_speed: 1.0,
        reformat_state: ItemReformatState::default(),
        enabled: true,
        source: Clip {
            name: "plate_A".to_owned(),
            media: MediaSource {
                path: "/media/SH010_plate.mov".to_owned(),
                online: true,
            },
            format: Format {
                width: 1920,
                height: 1080,
                pixel_aspect: 1.0,
                name: "HD_1080".to_owned(),
            },
            framerate: None,
            timecode_start: 0,
            duration: 1000,
            source_in: 0,
            colorspace: None,
        },
        tags: Vec::new(),
    };
    let track = Track {
        guid: "v1".to_owned(),
        name: "Video 1".to_owned(),
        view: None,
        blend_mode: None,
        blend_enabled: false,
        mask_enabled: false,
        enabled: true,
        items: vec![item.clone()],
        subtracks: Vec::new(),
        transitions: Vec::new(),
    };
    let sequence = Sequence {
        guid: "seq-1".to_owned(),
        name: "reel_01".to_owned(),
        format: Format {
            width: 1920,
            height: 1080,
            pixel_aspect: 1.0,
            name: "HD_1080".to_owned(),
        },
        framerate: Fps::new(24, 1).unwrap(),
        drop_frame: false,
        timecode_start: 0,
        in_time: None,
        out_time: None,
        views: Vec::new(),
        tracks: vec![track.clone()],
        tags: Vec::new(),
    };
    (sequence, track, item)
}

#[test]
fn item_resolver_expands_standard_tokens() {
    let (sequence, track, item) = fixture();
    let resolver = PathResolver::for_item(&sequence, &track, &item);
    let resolved = resolver
        .resolve("{sequence}/{track}/{shot}/{clip}_{event}_{fps}_{filename}.{ext}")
        .unwrap();
    assert_eq!(resolved, "reel_01/Video 1/SH010/plate_A_1_24_SH010_plate.nk");
}

#[test]
fn sequence_resolver_has_no_item_tokens() {
    let (sequence, ..) = fixture();
    let resolver = PathResolver::for_sequence(&sequence);
    assert!(resolver.resolve("{sequence}.{ext}").is_ok());
    assert!(resolver.resolve("{shot}.{ext}").is_err());
}

#[test]
fn unknown_token_names_the_offender() {
    let resolver = PathResolver::new();
    let err = resolver.resolve("out/{mystery}/x").unwrap_err().to_string();
    assert!(err.contains("{mystery}"), "{err}");
}

#[test]
fn unterminated_token_is_an_error() {
    let resolver = PathResolver::new();
    assert!(resolver.resolve("out/{shot").is_err());
}

#[test]
fn custom_entries_override_defaults() {
    let (sequence, ..) = fixture();
    let mut resolver = PathResolver::for_sequence(&sequence);
    resolver.set_entry("version", "v12");
    assert_eq!(resolver.resolve("{version}").unwrap(), "v12");
}

#[test]
fn plain_paths_pass_through() {
    let resolver = PathResolver::new();
    assert_eq!(
        resolver.resolve("/no/tokens/here.nk").unwrap(),
        "/no/tokens/here.nk"
    );
}
