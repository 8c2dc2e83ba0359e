use super::*;
use crate::{AnimCurve, Fps, Track, ViewInfo};

fn node_with_curve() -> EffectNode {
    EffectNode {
        class: "Transform".to_owned(),
        knobs: vec![
            (
                "rotate".to_owned(),
                KnobValue::Curve(AnimCurve::from_keys(vec![(10, 0.0), (20, 90.0)])),
            ),
            ("translate".to_owned(), KnobValue::Xy(100.0, 50.0)),
            ("scale".to_owned(), KnobValue::Float(2.0)),
        ],
    }
}

fn format(width: u32, height: u32) -> Format {
    Format {
        width,
        height,
        pixel_aspect: 1.0,
        name: String::new(),
    }
}

#[test]
fn set_knob_replaces_in_place() {
    let mut node = node_with_curve();
    node.set_knob("scale", KnobValue::Float(3.0));
    assert_eq!(node.knob("scale"), Some(&KnobValue::Float(3.0)));
    assert_eq!(node.knobs.len(), 3);
    node.set_knob("mix", KnobValue::Float(0.5));
    assert_eq!(node.knobs.len(), 4);
}

#[test]
fn shift_animation_moves_only_curves() {
    let mut node = node_with_curve();
    node.shift_animation(990);
    let KnobValue::Curve(curve) = node.knob("rotate").unwrap() else {
        panic!("rotate should stay a curve");
    };
    assert_eq!(curve.keys, vec![(1000, 0.0), (1010, 90.0)]);
    assert_eq!(node.knob("translate"), Some(&KnobValue::Xy(100.0, 50.0)));
}

#[test]
fn format_change_rescales_spatial_knobs() {
    let mut node = node_with_curve();
    let change = FormatChange {
        from: format(1920, 1080),
        to: format(3840, 2160),
    };
    change.apply(&mut node);
    assert_eq!(node.knob("translate"), Some(&KnobValue::Xy(200.0, 100.0)));
    // relative knobs stay untouched
    assert_eq!(node.knob("scale"), Some(&KnobValue::Float(2.0)));
}

#[test]
fn format_change_same_format_is_identity() {
    let mut node = node_with_curve();
    let before = node.clone();
    FormatChange {
        from: format(1920, 1080),
        to: format(1920, 1080),
    }
    .apply(&mut node);
    assert_eq!(node, before);
}

#[test]
fn effect_validation() {
    let token = MainThreadToken::acquire();
    let effect = SoftEffect::new(
        "fx-1",
        "grade",
        crate::FrameSpan::new(0, 10).unwrap(),
        None,
        node_with_curve(),
    );
    assert!(effect.validate().is_ok());
    assert_eq!(effect.node(&token).class, "Transform");

    let bad = SoftEffect::new(
        "fx-2",
        "empty",
        crate::FrameSpan::new(0, 10).unwrap(),
        None,
        EffectNode {
            class: String::new(),
            knobs: Vec::new(),
        },
    );
    assert!(bad.validate().is_err());
}

#[test]
fn materialize_collects_every_effect_and_annotation() {
    let token = MainThreadToken::acquire();
    let mut track = Track {
        guid: "v1".to_owned(),
        name: "Video 1".to_owned(),
        view: None,
        blend_mode: None,
        blend_enabled: false,
        mask_enabled: false,
        enabled: true,
        items: Vec::new(),
        subtracks: Vec::new(),
        transitions: Vec::new(),
    };
    track.subtracks.push(crate::SubTrack {
        effects: vec![SoftEffect::new(
            "fx-1",
            "grade",
            crate::FrameSpan::new(0, 10).unwrap(),
            None,
            node_with_curve(),
        )],
        annotations: vec![Annotation::new(
            "anno-1",
            crate::FrameSpan::new(5, 5).unwrap(),
            None,
            node_with_curve(),
        )],
    });
    let sequence = Sequence {
        guid: "seq-1".to_owned(),
        name: "seq".to_owned(),
        format: format(1920, 1080),
        framerate: Fps::new(24, 1).unwrap(),
        drop_frame: false,
        timecode_start: 0,
        in_time: None,
        out_time: None,
        views: Vec::<ViewInfo>::new(),
        tracks: vec![track],
        tags: Vec::new(),
    };

    let cache = materialize_effect_nodes(&sequence, &token);
    assert_eq!(cache.len(), 2);
    assert!(cache.get("fx-1").is_some());
    assert!(cache.get("anno-1").is_some());
    assert!(cache.get("ghost").is_none());
}
