//! Per-item node chains.
//!
//! One track item becomes a vertical run of nodes: the Read, optional
//! per-shot metadata and timecode, a retime when playback speed survives,
//! a reformat when the item is fitted to the sequence, per-shot user nodes,
//! and finally the effects and annotations linked to the item. The chain is
//! appended to whatever layout context the caller has open.

use crate::{
    export::options::{
        AdditionalNodeScope, ExportOptions, ReformatKind, ReformatOptions, parse_reformat_kind,
    },
    export::resolver::PathResolver,
    foundation::core::{Fps, frames_to_timecode},
    foundation::error::ShotgraphResult,
    script::graph::Script,
    script::knob::KnobValue,
    script::node::{Node, NodeClass, NodeId},
    timeline::effects::{EffectNode, EffectNodeCache},
    timeline::item::{Format, ItemReformatState, TrackItem},
    timeline::model::{Sequence, Track},
};

/// Everything one item chain needs to emit itself.
pub struct ItemChainSpec<'a> {
    pub sequence: &'a Sequence,
    pub track: &'a Track,
    pub item: &'a TrackItem,
    pub options: &'a ExportOptions,
    pub effect_nodes: &'a EffectNodeCache,
    pub resolver: &'a PathResolver,
    /// Applied `(in, out)` handle counts for this item.
    pub handles: (i64, i64),
    /// Added to timeline frames to produce output frames.
    pub frame_offset: i64,
    /// Output frame the Read's first source frame must land on, when it
    /// differs from the source numbering.
    pub read_start: Option<i64>,
}

/// What came out of emitting one chain.
pub struct ItemChain {
    /// The Read (or replacement Read) at the top of the chain.
    pub entry: NodeId,
    /// Last node of the chain; the caller wires it onward.
    pub tail: NodeId,
    /// Source format forced by a custom read path, when one applied.
    pub forced_format: Option<Format>,
    /// Whether a retime node was emitted.
    pub applied_retime: bool,
    /// Output frames carrying an annotation key.
    pub annotation_frames: Vec<i64>,
    pub warnings: Vec<String>,
}

impl ItemChainSpec<'_> {
    pub fn emit(&self, script: &mut Script) -> ShotgraphResult<ItemChain> {
        let item = self.item;
        let clip = &item.source;
        let (handle_in, handle_out) = self.handles;
        let mut warnings = Vec::new();

        let abs_first = clip.source_in + item.source_in - handle_in;
        let abs_last = clip.source_in + item.source_out + handle_out;

        // custom read path replaces the clip media outright
        let custom_read = self.resolve_read_path(&mut warnings);
        let include_effects = self.options.include_effects
            && (custom_read.is_none() || self.options.apply_effects_to_read_paths);
        let include_annotations = self.options.include_annotations
            && (custom_read.is_none() || self.options.apply_effects_to_read_paths);

        let mut read = Node::new(NodeClass::Read);
        match &custom_read {
            Some((path, colorspace)) => {
                read.set_knob("file", KnobValue::Text(path.clone()));
                read.set_knob("format", KnobValue::Format(clip.format.clone()));
                if let Some(colorspace) = colorspace {
                    read.set_knob("colorspace", KnobValue::Text(colorspace.clone()));
                }
            }
            None => {
                read.set_knob("file", KnobValue::Text(clip.media.path.clone()));
                read.set_knob("format", KnobValue::Format(clip.format.clone()));
                if let Some(colorspace) = &clip.colorspace {
                    read.set_knob("colorspace", KnobValue::Text(colorspace.clone()));
                }
            }
        }
        read.set_knob("first", KnobValue::Int(abs_first));
        read.set_knob("last", KnobValue::Int(abs_last));
        read.set_knob("origfirst", KnobValue::Int(clip.source_in));
        read.set_knob(
            "origlast",
            KnobValue::Int(clip.source_in + clip.last_frame()),
        );
        if item.is_freeze() {
            read.set_knob("before", KnobValue::Raw("hold".to_owned()));
            read.set_knob("after", KnobValue::Raw("hold".to_owned()));
        }
        if let Some(start) = self.read_start
            && start != abs_first
        {
            read.set_knob("frame_mode", KnobValue::Text("start at".to_owned()));
            read.set_knob("frame", KnobValue::Int(start));
        }
        let entry = script.add_node(read);
        let mut tail = entry;

        if self.options.include_shot_metadata {
            let mut node = Node::new(NodeClass::Metadata);
            node.set_knob(
                "metadata",
                KnobValue::Pairs(vec![
                    ("hiero/shot".to_owned(), item.name.clone()),
                    ("hiero/shot_guid".to_owned(), item.guid.clone()),
                ]),
            );
            tail = append(script, tail, node);
        }

        if self.options.include_source_timecode {
            let fps = self.clip_fps();
            let drop_frame = self.sequence.drop_frame && fps.supports_drop_frame();
            let start_tc = clip.timecode_start + (abs_first - clip.source_in);
            let mut node = Node::new(NodeClass::AddTimeCode);
            node.set_knob(
                "startcode",
                KnobValue::Text(frames_to_timecode(start_tc, fps, drop_frame)),
            );
            node.set_knob("frame", KnobValue::Int(abs_first));
            tail = append(script, tail, node);
        }

        let mut applied_retime = false;
        if item.is_retimed()
            && !item.is_freeze()
            && self.options.retime_method.preserves_retimes()
        {
            let mut node = Node::new(NodeClass::Retime);
            node.set_knob("speed", KnobValue::Float(item.playback_speed.abs()));
            if item.playback_speed < 0.0 {
                node.set_knob("reverse", KnobValue::Bool(true));
            }
            if let Some(filter) = self.options.retime_method.filter_knob() {
                node.set_knob("filter", KnobValue::Text(filter.to_owned()));
            }
            tail = append(script, tail, node);
            applied_retime = true;
        }

        // fit-to-sequence reformat driven by the item's own state; the
        // preset reformat rides the write branches instead
        if custom_read.is_none()
            && item.reformat_state == ItemReformatState::ToSequence
            && clip.format != self.sequence.format
        {
            let node = format_reformat(&self.sequence.format, &self.options.reformat);
            tail = append(script, tail, node);
        }

        if self.options.additional_nodes_enabled {
            for entry in &self.options.additional_nodes {
                if entry.scope != AdditionalNodeScope::PerShot {
                    continue;
                }
                let mut node = Node::new(NodeClass::Custom(entry.class.clone()));
                for (name, value) in &entry.knobs {
                    node.set_knob(name.clone(), value.clone());
                }
                node.label = entry.label.clone();
                tail = append(script, tail, node);
            }
        }

        if include_effects {
            for effect in self.track.linked_effects_of(&item.guid) {
                if !effect.valid || !effect.enabled {
                    continue;
                }
                let Some(record) = self.effect_nodes.get(&effect.guid) else {
                    warnings.push(format!(
                        "effect '{}' has no materialized node, skipping",
                        effect.name
                    ));
                    continue;
                };
                let mut node = effect_chain_node(record, self.frame_offset);
                node.name = effect.name.clone();
                set_lifetime(
                    &mut node,
                    effect.timeline_in + self.frame_offset,
                    effect.timeline_out + self.frame_offset,
                );
                tail = append(script, tail, node);
            }
        }

        let mut annotation_frames = Vec::new();
        if include_annotations {
            for annotation in self.track.linked_annotations_of(&item.guid) {
                if !annotation.valid {
                    continue;
                }
                let Some(record) = self.effect_nodes.get(&annotation.guid) else {
                    continue;
                };
                let mut node = effect_chain_node(record, self.frame_offset);
                set_lifetime(
                    &mut node,
                    annotation.timeline_in + self.frame_offset,
                    annotation.timeline_out + self.frame_offset,
                );
                tail = append(script, tail, node);
                annotation_frames.push(annotation.timeline_in + self.frame_offset);
            }
        }

        Ok(ItemChain {
            entry,
            tail,
            forced_format: custom_read.map(|_| clip.format.clone()),
            applied_retime,
            annotation_frames,
            warnings,
        })
    }

    /// Resolve the first configured read path and its colorspace. A sibling
    /// write preset with the same template lends its colorspace; otherwise
    /// the clip's own is used.
    fn resolve_read_path(&self, warnings: &mut Vec<String>) -> Option<(String, Option<String>)> {
        let template = self.options.read_paths.first()?;
        match self.resolver.resolve(template) {
            Ok(path) => {
                let colorspace = self
                    .options
                    .write_paths
                    .iter()
                    .find(|w| &w.path == template)
                    .and_then(|w| w.colorspace.clone())
                    .or_else(|| self.item.source.colorspace.clone());
                Some((path, colorspace))
            }
            Err(err) => {
                warnings.push(format!("read path '{template}' did not resolve: {err}"));
                None
            }
        }
    }

    fn clip_fps(&self) -> Fps {
        match self.item.source.framerate {
            Some(fps) if fps.as_f64().is_finite() && fps.as_f64() > 0.0 => fps,
            _ => self.sequence.framerate,
        }
    }
}

/// Wire a node under `tail` and return the new tail.
pub(crate) fn append(script: &mut Script, tail: NodeId, mut node: Node) -> NodeId {
    node.set_input(0, Some(tail));
    script.add_node(node)
}

/// Restrict a node's contribution to an output frame window.
pub(crate) fn set_lifetime(node: &mut Node, first: i64, last: i64) {
    node.set_knob("lifetime_start", KnobValue::Int(first));
    node.set_knob("lifetime_end", KnobValue::Int(last));
    node.set_knob("useLifetime", KnobValue::Bool(true));
}

/// Instantiate a materialized effect record as a chain node, moving its
/// animation into output frames.
pub(crate) fn effect_chain_node(record: &EffectNode, frame_offset: i64) -> Node {
    let mut node = Node::new(NodeClass::Custom(record.class.clone()));
    for (name, value) in &record.knobs {
        let mut value = value.clone();
        if let Some(curve) = value.as_curve_mut() {
            curve.shift_frames(frame_offset);
        }
        node.set_knob(name.clone(), value);
    }
    node
}

/// The reformat node a preset asks for, if any. Unknown `to_type` values
/// surface as a warning and omit the node.
pub(crate) fn preset_reformat_node(
    options: &ExportOptions,
    sequence_format: &Format,
    plate_format: &Format,
    warnings: &mut Vec<String>,
) -> Option<Node> {
    let kind = match parse_reformat_kind(&options.reformat.to_type) {
        Ok(kind) => kind,
        Err(err) => {
            warnings.push(err.to_string());
            return None;
        }
    };
    match kind {
        ReformatKind::None => None,
        ReformatKind::ToSequence => Some(format_reformat(sequence_format, &options.reformat)),
        ReformatKind::Plate => Some(format_reformat(plate_format, &options.reformat)),
        ReformatKind::ToFormat => match &options.reformat.format {
            Some(format) => Some(format_reformat(format, &options.reformat)),
            None => {
                warnings.push("reformat 'to format' without a format, omitting".to_owned());
                None
            }
        },
        ReformatKind::ToScale => {
            let scale = options.reformat.scale.unwrap_or(1.0);
            let mut node = Node::new(NodeClass::Reformat);
            node.set_knob("type", KnobValue::Text("scale".to_owned()));
            node.set_knob("scale", KnobValue::Float(scale));
            apply_reformat_common(&mut node, &options.reformat);
            Some(node)
        }
    }
}

fn format_reformat(target: &Format, opts: &ReformatOptions) -> Node {
    let mut node = Node::new(NodeClass::Reformat);
    node.set_knob("type", KnobValue::Text("to format".to_owned()));
    node.set_knob("format", KnobValue::Format(target.clone()));
    apply_reformat_common(&mut node, opts);
    node
}

fn apply_reformat_common(node: &mut Node, opts: &ReformatOptions) {
    node.set_knob("resize", KnobValue::Text(opts.resize.clone()));
    node.set_knob("center", KnobValue::Bool(opts.center));
    if let Some(filter) = &opts.filter {
        node.set_knob("filter", KnobValue::Text(filter.clone()));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/item_graph.rs"]
mod tests;
