use super::*;

#[test]
fn floats_render_integral_without_fraction() {
    assert_eq!(fmt_f64(1.0), "1");
    assert_eq!(fmt_f64(-24.0), "-24");
    assert_eq!(fmt_f64(0.5), "0.5");
    assert_eq!(fmt_f64(23.976), "23.976");
}

#[test]
fn quoting_covers_whitespace_and_metacharacters() {
    assert_eq!(quote_if_needed("plate_A"), "plate_A");
    assert_eq!(quote_if_needed("Video 1"), "\"Video 1\"");
    assert_eq!(quote_if_needed(""), "\"\"");
    assert_eq!(quote_if_needed("a{b}"), "\"a{b}\"");
    assert_eq!(quote_if_needed("say \"hi\""), "\"say \\\"hi\\\"\"");
}

#[test]
fn curve_keys_stay_sorted() {
    let mut curve = AnimCurve::from_keys(vec![(20, 0.0), (10, 1.0)]);
    assert_eq!(curve.keys, vec![(10, 1.0), (20, 0.0)]);
    curve.push_key(15, 0.5);
    curve.push_key(10, 2.0);
    assert_eq!(curve.keys, vec![(10, 2.0), (15, 0.5), (20, 0.0)]);
}

#[test]
fn curve_renders_wire_form() {
    let curve = AnimCurve::from_keys(vec![(10, 1.0), (20, 0.0)]);
    assert_eq!(curve.render(), "{curve x10 1 x20 0}");
}

#[test]
fn curve_shift_moves_frames_not_values() {
    let mut curve = AnimCurve::from_keys(vec![(10, 1.0), (20, 0.25)]);
    curve.shift_frames(-10);
    assert_eq!(curve.keys, vec![(0, 1.0), (10, 0.25)]);
}

#[test]
fn knob_value_rendering() {
    assert_eq!(KnobValue::Int(42).render(), "42");
    assert_eq!(KnobValue::Float(2.5).render(), "2.5");
    assert_eq!(KnobValue::Bool(true).render(), "true");
    assert_eq!(KnobValue::Text("Video 1".to_owned()).render(), "\"Video 1\"");
    assert_eq!(KnobValue::Raw("{a b}".to_owned()).render(), "{a b}");
    assert_eq!(KnobValue::Xy(12.0, 34.5).render(), "{12 34.5}");
}

#[test]
fn pairs_render_as_set_block() {
    let value = KnobValue::Pairs(vec![
        ("hiero/shot".to_owned(), "SH010".to_owned()),
        ("hiero/project".to_owned(), "My Show".to_owned()),
    ]);
    assert_eq!(
        value.render(),
        "{ {set hiero/shot SH010} {set hiero/project \"My Show\"} }"
    );
}

#[test]
fn format_spec_appends_name_only_when_present() {
    let named = Format {
        width: 1920,
        height: 1080,
        pixel_aspect: 1.0,
        name: "HD_1080".to_owned(),
    };
    assert_eq!(render_format(&named), "\"1920 1080 0 0 1920 1080 1 HD_1080\"");
    let anonymous = Format {
        name: String::new(),
        ..named
    };
    assert_eq!(render_format(&anonymous), "\"1920 1080 0 0 1920 1080 1\"");
}

#[test]
fn user_knob_declarations() {
    let text = UserKnob::text("shot", "SH010");
    assert_eq!(text.render_declaration(), "addUserKnob {1 shot}");
    assert_eq!(text.render_value_line(), Some("shot SH010".to_owned()));

    let int = UserKnob::integer("first", 1001);
    assert_eq!(int.render_declaration(), "addUserKnob {3 first}");
    assert_eq!(int.render_value_line(), Some("first 1001".to_owned()));

    let button = UserKnob::pyscript("rebuild", "Rebuild", "print('x')");
    assert_eq!(
        button.render_declaration(),
        "addUserKnob {22 rebuild l Rebuild T print('x')}"
    );
    assert_eq!(button.render_value_line(), None);

    let link = UserKnob::linked("first_frame", "Read1.first");
    assert_eq!(
        link.render_declaration(),
        "addUserKnob {41 first_frame T Read1.first}"
    );
}

#[test]
fn animated_user_knob_carries_curve_value() {
    let curve = AnimCurve::from_keys(vec![(11, 1.0)]);
    let knob = UserKnob::animated("annotation_key", &curve);
    assert_eq!(
        knob.render_value_line(),
        Some("annotation_key {curve x11 1}".to_owned())
    );
}
