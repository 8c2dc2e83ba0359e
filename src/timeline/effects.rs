use std::collections::BTreeMap;

use crate::{
    foundation::core::FrameSpan,
    foundation::error::{ShotgraphError, ShotgraphResult},
    script::knob::KnobValue,
    timeline::item::Format,
    timeline::model::Sequence,
};

/// Capability proving the caller runs on the host's main control thread.
///
/// Effect node records are lazy host objects; reading one off the control
/// thread is undefined on the host side. Only the export driver acquires a
/// token, and everything downstream of materialization works from the
/// [`EffectNodeCache`] instead.
pub struct MainThreadToken(());

impl MainThreadToken {
    /// Acquire the capability. Callers assert they are on the host's main
    /// control thread; there is nothing to check from inside this crate.
    pub fn acquire() -> Self {
        Self(())
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// The host node record behind a soft effect or annotation: a class name
/// plus ordered knobs.
pub struct EffectNode {
    /// Host node class ("Transform", "Grade", ...).
    pub class: String,
    /// Knobs in declaration order.
    #[serde(default)]
    pub knobs: Vec<(String, KnobValue)>,
}

impl EffectNode {
    pub fn knob(&self, name: &str) -> Option<&KnobValue> {
        self.knobs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Replace a knob value, or append it when absent.
    pub fn set_knob(&mut self, name: impl Into<String>, value: KnobValue) {
        let name = name.into();
        if let Some(slot) = self.knobs.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.knobs.push((name, value));
        }
    }

    /// Shift every animation curve by `delta` frames. Collation uses this to
    /// relocate effects into head-room space.
    pub fn shift_animation(&mut self, delta: i64) {
        for (_, value) in &mut self.knobs {
            if let Some(curve) = value.as_curve_mut() {
                curve.shift_frames(delta);
            }
        }
    }
}

/// Rescales an effect node's spatial knobs when the owning sequence changes
/// format. Positional knobs scale with the resolution; relative knobs
/// (scale factors) do not.
pub struct FormatChange {
    pub from: Format,
    pub to: Format,
}

impl FormatChange {
    const SPATIAL_KNOBS: [&'static str; 2] = ["translate", "center"];

    pub fn apply(&self, node: &mut EffectNode) {
        if self.from.width == 0 || self.from.height == 0 {
            return;
        }
        let sx = f64::from(self.to.width) / f64::from(self.from.width);
        let sy = f64::from(self.to.height) / f64::from(self.from.height);
        if sx == 1.0 && sy == 1.0 {
            return;
        }
        for (name, value) in &mut node.knobs {
            if !Self::SPATIAL_KNOBS.contains(&name.as_str()) {
                continue;
            }
            if let KnobValue::Xy(x, y) = value {
                *x *= sx;
                *y *= sy;
            }
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A non-destructive effect riding a sub-track, optionally linked to one item.
pub struct SoftEffect {
    /// Stable identifier.
    pub guid: String,
    /// Effect name for authoring/debugging.
    pub name: String,
    /// First timeline frame covered.
    pub timeline_in: i64,
    /// Last timeline frame covered.
    pub timeline_out: i64,
    /// Invalid effects are skipped at export.
    #[serde(default = "default_true")]
    pub valid: bool,
    /// Disabled effects are skipped at export.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Guid of the item this effect is linked to, when any.
    #[serde(default)]
    pub linked_item: Option<String>,
    node: EffectNode,
}

fn default_true() -> bool {
    true
}

impl SoftEffect {
    pub fn new(
        guid: impl Into<String>,
        name: impl Into<String>,
        span: FrameSpan,
        linked_item: Option<String>,
        node: EffectNode,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            timeline_in: span.first,
            timeline_out: span.last,
            valid: true,
            enabled: true,
            linked_item,
            node,
        }
    }

    /// Read the underlying host node record. Main-thread only; use
    /// [`materialize_effect_nodes`] once and read the cache afterwards.
    pub fn node(&self, _token: &MainThreadToken) -> &EffectNode {
        &self.node
    }

    /// Copy for a synthetic sequence with a replacement node record.
    pub fn clone_with(
        &self,
        guid: String,
        span: FrameSpan,
        linked_item: Option<String>,
        node: EffectNode,
    ) -> Self {
        Self {
            guid,
            name: self.name.clone(),
            timeline_in: span.first,
            timeline_out: span.last,
            valid: self.valid,
            enabled: self.enabled,
            linked_item,
            node,
        }
    }

    pub fn timeline_span(&self) -> FrameSpan {
        FrameSpan {
            first: self.timeline_in,
            last: self.timeline_out,
        }
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if self.guid.is_empty() {
            return Err(ShotgraphError::validation(format!(
                "effect '{}' must carry a guid",
                self.name
            )));
        }
        if self.timeline_in > self.timeline_out {
            return Err(ShotgraphError::validation(format!(
                "effect '{}' timeline range is reversed",
                self.name
            )));
        }
        if self.node.class.is_empty() {
            return Err(ShotgraphError::validation(format!(
                "effect '{}' has an empty node class",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A drawn overlay tied to timeline frames, exported as timestamped keys.
pub struct Annotation {
    /// Stable identifier.
    pub guid: String,
    /// First timeline frame covered.
    pub timeline_in: i64,
    /// Last timeline frame covered.
    pub timeline_out: i64,
    /// Invalid annotations are skipped at export.
    #[serde(default = "default_true")]
    pub valid: bool,
    /// Guid of the item this annotation is linked to, when any.
    #[serde(default)]
    pub linked_item: Option<String>,
    node: EffectNode,
}

impl Annotation {
    pub fn new(
        guid: impl Into<String>,
        span: FrameSpan,
        linked_item: Option<String>,
        node: EffectNode,
    ) -> Self {
        Self {
            guid: guid.into(),
            timeline_in: span.first,
            timeline_out: span.last,
            valid: true,
            linked_item,
            node,
        }
    }

    /// Read the underlying host node record. Main-thread only.
    pub fn node(&self, _token: &MainThreadToken) -> &EffectNode {
        &self.node
    }

    /// Copy for a synthetic sequence with a replacement node record.
    pub fn clone_with(
        &self,
        guid: String,
        span: FrameSpan,
        linked_item: Option<String>,
        node: EffectNode,
    ) -> Self {
        Self {
            guid,
            timeline_in: span.first,
            timeline_out: span.last,
            valid: self.valid,
            linked_item,
            node,
        }
    }

    pub fn timeline_span(&self) -> FrameSpan {
        FrameSpan {
            first: self.timeline_in,
            last: self.timeline_out,
        }
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if self.guid.is_empty() {
            return Err(ShotgraphError::validation(
                "annotation must carry a guid".to_owned(),
            ));
        }
        if self.timeline_in > self.timeline_out {
            return Err(ShotgraphError::validation(format!(
                "annotation '{}' timeline range is reversed",
                self.guid
            )));
        }
        Ok(())
    }
}

/// Materialized node records, guid-indexed. Built once on the main thread;
/// every later read is pure.
#[derive(Clone, Debug, Default)]
pub struct EffectNodeCache {
    nodes: BTreeMap<String, EffectNode>,
}

impl EffectNodeCache {
    pub fn get(&self, guid: &str) -> Option<&EffectNode> {
        self.nodes.get(guid)
    }

    pub fn insert(&mut self, guid: String, node: EffectNode) {
        self.nodes.insert(guid, node);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Force every effect and annotation node record on the sequence into a
/// cache. The token pins this to the host's control thread; collation and
/// assembly read only the cache afterwards.
pub fn materialize_effect_nodes(sequence: &Sequence, token: &MainThreadToken) -> EffectNodeCache {
    let mut cache = EffectNodeCache::default();
    for track in &sequence.tracks {
        for effect in track.all_effects() {
            cache.insert(effect.guid.clone(), effect.node(token).clone());
        }
        for annotation in track.all_annotations() {
            cache.insert(annotation.guid.clone(), annotation.node(token).clone());
        }
    }
    cache
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/effects.rs"]
mod tests;
