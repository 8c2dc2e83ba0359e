use std::fmt::Write as _;

use crate::timeline::item::Format;

/// An animation curve: `(frame, value)` keys kept sorted by frame.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AnimCurve {
    /// Keys as `(frame, value)`, ascending by frame.
    pub keys: Vec<(i64, f64)>,
}

impl AnimCurve {
    pub fn from_keys(mut keys: Vec<(i64, f64)>) -> Self {
        keys.sort_by_key(|(frame, _)| *frame);
        Self { keys }
    }

    /// Insert a key, keeping frame order. A key at the same frame is replaced.
    pub fn push_key(&mut self, frame: i64, value: f64) {
        match self.keys.binary_search_by_key(&frame, |(f, _)| *f) {
            Ok(pos) => self.keys[pos] = (frame, value),
            Err(pos) => self.keys.insert(pos, (frame, value)),
        }
    }

    pub fn shift_frames(&mut self, delta: i64) {
        for (frame, _) in &mut self.keys {
            *frame += delta;
        }
    }

    pub fn scale_values(&mut self, factor: f64) {
        for (_, value) in &mut self.keys {
            *value *= factor;
        }
    }

    /// Wire form: `{curve x10 1 x20 0}`.
    pub fn render(&self) -> String {
        let mut out = String::from("{curve");
        for (frame, value) in &self.keys {
            let _ = write!(out, " x{frame} {}", fmt_f64(*value));
        }
        out.push('}');
        out
    }
}

/// A typed knob value. Rendering rules follow the script wire format; every
/// variant renders deterministically.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnobValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Free text, quoted on emission when it contains metacharacters.
    Text(String),
    /// Pre-rendered fragment emitted verbatim.
    Raw(String),
    /// A 2D value such as `translate {12 34}`.
    Xy(f64, f64),
    /// A format spec: `"1920 1080 0 0 1920 1080 1 HD_1080"`.
    Format(Format),
    /// An animated value.
    Curve(AnimCurve),
    /// A metadata block: `{ {set key value} ... }`.
    Pairs(Vec<(String, String)>),
}

impl KnobValue {
    pub fn render(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => fmt_f64(*v),
            Self::Bool(v) => v.to_string(),
            Self::Text(v) => quote_if_needed(v),
            Self::Raw(v) => v.clone(),
            Self::Xy(x, y) => format!("{{{} {}}}", fmt_f64(*x), fmt_f64(*y)),
            Self::Format(f) => render_format(f),
            Self::Curve(c) => c.render(),
            Self::Pairs(pairs) => {
                let mut out = String::from("{");
                for (key, value) in pairs {
                    let _ = write!(out, " {{set {} {}}}", key, quote_if_needed(value));
                }
                out.push_str(" }");
                out
            }
        }
    }

    pub fn as_curve_mut(&mut self) -> Option<&mut AnimCurve> {
        match self {
            Self::Curve(c) => Some(c),
            _ => None,
        }
    }
}

/// A user knob declaration. Serialized as one `addUserKnob` line; integer
/// knobs additionally emit their value as a plain knob line.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UserKnob {
    /// Wire typecode: 1 = text, 3 = integer, 22 = pyscript button,
    /// 41 = linked knob.
    pub typecode: u8,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Knob value, button script, or link target depending on typecode.
    #[serde(default)]
    pub value: Option<String>,
}

impl UserKnob {
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self {
            typecode: 3,
            name: name.into(),
            label: None,
            value: Some(value.to_string()),
        }
    }

    /// Integer knob whose value is an animation curve.
    pub fn animated(name: impl Into<String>, curve: &AnimCurve) -> Self {
        Self {
            typecode: 3,
            name: name.into(),
            label: None,
            value: Some(curve.render()),
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            typecode: 1,
            name: name.into(),
            label: None,
            value: Some(value.into()),
        }
    }

    pub fn pyscript(
        name: impl Into<String>,
        label: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            typecode: 22,
            name: name.into(),
            label: Some(label.into()),
            value: Some(script.into()),
        }
    }

    pub fn linked(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            typecode: 41,
            name: name.into(),
            label: None,
            value: Some(target.into()),
        }
    }

    /// The `addUserKnob {...}` declaration line.
    pub fn render_declaration(&self) -> String {
        let mut out = format!("addUserKnob {{{} {}", self.typecode, self.name);
        if let Some(label) = &self.label {
            let _ = write!(out, " l {}", quote_if_needed(label));
        }
        // Button scripts and link targets live inside the declaration.
        if !matches!(self.typecode, 1 | 3)
            && let Some(value) = &self.value
        {
            let _ = write!(out, " T {}", quote_if_needed(value));
        }
        out.push('}');
        out
    }

    /// Text and integer knobs carry their value as a separate knob line.
    pub fn render_value_line(&self) -> Option<String> {
        let value = self.value.as_ref()?;
        match self.typecode {
            1 => Some(format!("{} {}", self.name, quote_if_needed(value))),
            3 => Some(format!("{} {}", self.name, value)),
            _ => None,
        }
    }
}

/// Format spec rendering; the name is appended only when present.
pub fn render_format(format: &Format) -> String {
    let mut out = format!(
        "\"{w} {h} 0 0 {w} {h} {pa}",
        w = format.width,
        h = format.height,
        pa = fmt_f64(format.pixel_aspect),
    );
    if !format.name.is_empty() {
        let _ = write!(out, " {}", format.name);
    }
    out.push('"');
    out
}

/// Render a float the way the wire format expects: integral values without
/// a fraction, everything else with Rust's shortest round-trip form.
pub fn fmt_f64(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Quote a value when it is empty or contains whitespace or wire
/// metacharacters. Inner quotes are backslash-escaped.
pub fn quote_if_needed(s: &str) -> String {
    let needs_quotes = s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"'));
    if !needs_quotes {
        return s.to_owned();
    }
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
#[path = "../../tests/unit/script/knob.rs"]
mod tests;
