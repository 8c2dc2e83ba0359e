//! Whole-script assembly.
//!
//! The assembler turns one sequence (or one item on it) into a connected
//! node graph inside a [`Script`]. Tracks are walked top index first, each
//! item becomes a chain from [`super::item_graph`], gaps become `Constant`
//! fillers, transitions become `Dissolve` nodes, and the running stream is
//! folded together with `Merge` nodes until the bottom track closes the
//! main branch. A shared tail (metadata, timecode, write fan-out, viewer)
//! finishes the script.
//!
//! Stack markers (`Set` / `Push`) are emitted around every join so the
//! serialized script reads the way the host application writes its own.

use std::path::Path;

use crate::{
    assemble::item_graph::{
        ItemChainSpec, append, effect_chain_node, preset_reformat_node, set_lifetime,
    },
    export::options::{
        AdditionalNodeScope, ExportOptions, ReformatKind, WriteNodeSpec, parse_reformat_kind,
    },
    export::progress::ProgressSink,
    export::range::{RangeTarget, output_range},
    export::resolver::PathResolver,
    foundation::core::{COLLATE_HEAD_ROOM, frames_to_timecode},
    foundation::error::{ShotgraphError, ShotgraphResult},
    script::graph::{ContextData, LayoutContextKind, Script},
    script::knob::{AnimCurve, KnobValue, UserKnob},
    script::node::{Node, NodeClass, NodeId},
    timeline::effects::EffectNodeCache,
    timeline::item::{Format, ItemReformatState, TrackItem},
    timeline::model::{Sequence, Track, Transition},
};

/// Jump the viewer to the previous annotated frame.
const PREV_KEY_SCRIPT: &str = "p = [k.x for k in nuke.thisNode()['annotation_key_info'].animation(0).keys() if k.x < nuke.frame()]; p and nuke.frame(int(max(p)))";
/// Jump the viewer to the next annotated frame.
const NEXT_KEY_SCRIPT: &str = "n = [k.x for k in nuke.thisNode()['annotation_key_info'].animation(0).keys() if k.x > nuke.frame()]; n and nuke.frame(int(min(n)))";

/// Everything one assembly run needs.
pub struct AssemblySpec<'a> {
    pub sequence: &'a Sequence,
    /// Item export: guid of the item to export. On a collated sequence this
    /// is the master's copy guid. `None` exports the whole sequence.
    pub master: Option<&'a str>,
    /// Original item guid recorded on the Root of shot exports.
    pub shot_guid: Option<&'a str>,
    /// Handle counts applied to the master, recorded on the Root.
    pub handles: (i64, i64),
    /// Whether `sequence` came out of collation and sits in head-room space.
    pub collated: bool,
    pub options: &'a ExportOptions,
    pub effect_nodes: &'a EffectNodeCache,
    /// Destination of the serialized script; the Root's `name` knob.
    pub script_path: &'a Path,
    pub progress: &'a dyn ProgressSink,
}

/// An assembled, not yet laid out, script.
#[derive(Debug)]
pub struct AssembledScript {
    pub script: Script,
    pub first_frame: i64,
    pub last_frame: i64,
    /// Format recorded on the Root.
    pub format: Format,
    /// Resolved write file paths, emission order.
    pub write_paths: Vec<String>,
    /// Whether any retime node made it into the graph.
    pub applied_retimes: bool,
    pub warnings: Vec<String>,
    /// Non-fatal failures; the affected write or item was skipped.
    pub errors: Vec<String>,
}

/// Closing arguments of an assembly, handed to the shared tail emitter.
struct TailArgs {
    first: i64,
    last: i64,
    format: Format,
    /// Source format the `plate` reformat preset resolves against.
    plate: Format,
    /// Last node of the assembled content stream.
    stream: NodeId,
    /// Timecode, in frames, of the first output frame.
    timecode_frames: i64,
    resolver: PathResolver,
}

pub struct Assembler<'a> {
    spec: AssemblySpec<'a>,
    script: Script,
    warnings: Vec<String>,
    errors: Vec<String>,
    annotation_frames: Vec<i64>,
    applied_retimes: bool,
    write_paths: Vec<String>,
    /// Tails of tracks that never joined the main stream; the viewer picks
    /// them up on its spare inputs so the script loads with every track
    /// visible.
    disconnected_tails: Vec<NodeId>,
    stream_labels: u32,
}

impl<'a> Assembler<'a> {
    pub fn new(spec: AssemblySpec<'a>) -> Self {
        Self {
            spec,
            script: Script::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            annotation_frames: Vec::new(),
            applied_retimes: false,
            write_paths: Vec::new(),
            disconnected_tails: Vec::new(),
            stream_labels: 0,
        }
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn assemble(self) -> ShotgraphResult<AssembledScript> {
        match self.spec.master {
            Some(guid) if !self.spec.collated => self.assemble_item(guid),
            _ => self.assemble_sequence(),
        }
    }

    /// Single-item script: one chain, then the tail.
    fn assemble_item(mut self, guid: &str) -> ShotgraphResult<AssembledScript> {
        let seq = self.spec.sequence;
        let options = self.spec.options;
        let (track_idx, item) = seq.find_item(guid).ok_or_else(|| {
            ShotgraphError::assembly(format!(
                "item {guid} is not on sequence '{}'",
                seq.name
            ))
        })?;
        let track = &seq.tracks[track_idx];
        let (handle_in, handle_out) = self.spec.handles;

        let (first, last) = output_range(options, RangeTarget::Item(item), false, true, false);
        // Maps a timeline frame to its output frame.
        let frame_offset = first - (item.timeline_in - handle_in);

        self.script.push_layout_context(
            LayoutContextKind::Track,
            track.name.clone(),
            ContextData {
                track_guid: Some(track.guid.clone()),
                ..ContextData::default()
            },
        );
        self.script.push_layout_context(
            LayoutContextKind::Clip,
            item.name.clone(),
            ContextData::default(),
        );
        let resolver = self.item_resolver(track, item);
        let chain = ItemChainSpec {
            sequence: seq,
            track,
            item,
            options,
            effect_nodes: self.spec.effect_nodes,
            resolver: &resolver,
            handles: (handle_in, handle_out),
            frame_offset,
            read_start: Some(first),
        }
        .emit(&mut self.script)?;
        self.script.pop_layout_context();
        self.script.pop_layout_context();

        self.warnings.extend(chain.warnings);
        self.annotation_frames.extend(chain.annotation_frames);
        self.applied_retimes |= chain.applied_retime;

        let format = self.output_format(chain.forced_format, Some(item));
        let timecode_frames = seq.timecode_start + (item.timeline_in - handle_in);
        self.finish(TailArgs {
            first,
            last,
            format,
            plate: item.source.format.clone(),
            stream: chain.tail,
            timecode_frames,
            resolver,
        })
    }

    /// Multi-track script: one chain per item, merged bottom-up.
    fn assemble_sequence(mut self) -> ShotgraphResult<AssembledScript> {
        let seq = self.spec.sequence;
        let options = self.spec.options;

        let timeline_first = seq.in_time.unwrap_or(0);
        let timeline_last = seq
            .out_time
            .unwrap_or_else(|| (seq.duration() - 1).max(timeline_first))
            .max(timeline_first);

        let (mut first, mut last, emit_shift);
        if self.spec.collated {
            // The collation offset folded the start frame in already; undo
            // only the head room here.
            emit_shift = -COLLATE_HEAD_ROOM;
            first = timeline_first + emit_shift;
            last = timeline_last + emit_shift;
        } else {
            let range = output_range(options, RangeTarget::Sequence(seq), false, false, false);
            first = range.0;
            last = range.1;
            emit_shift = first - timeline_first;
        }
        if first < 0 && !options.start_frame.is_some_and(|s| s < 0) {
            tracing::warn!(first, "clamping negative output start to 0");
            first = 0;
            if last < first {
                last = first;
            }
        }

        let master_track = self
            .spec
            .master
            .and_then(|guid| seq.find_item(guid).map(|(idx, _)| idx));
        // The branch the viewer ends up on when tracks stay disconnected.
        let main_track = master_track.or_else(|| {
            (0..seq.tracks.len()).find(|&idx| {
                let track = &seq.tracks[idx];
                track.enabled && !track.items.is_empty() && !track.has_only_subtrack_items()
            })
        });

        let view_label = seq
            .hero_view()
            .map_or_else(|| "main".to_owned(), |v| v.name.clone());
        self.script.push_layout_context(
            LayoutContextKind::View,
            view_label,
            ContextData {
                disconnected: !options.connect_tracks,
                ..ContextData::default()
            },
        );

        let mut main: Option<NodeId> = None;
        let mut effect_tracks: Vec<usize> = Vec::new();
        for track_idx in (0..seq.tracks.len()).rev() {
            let track = &seq.tracks[track_idx];
            if !track.enabled {
                continue;
            }
            if track.has_only_subtrack_items() {
                effect_tracks.push(track_idx);
                continue;
            }
            if track.items.is_empty() {
                continue;
            }
            let connect = options.connect_tracks || main_track == Some(track_idx);

            let mut merge_label = None;
            if connect && main.is_some() {
                let label = self.next_stream_label();
                self.add_stack(NodeClass::Set, &label);
                merge_label = Some(label);
            }
            let tail = self.emit_track(
                track_idx,
                (timeline_first, timeline_last),
                emit_shift,
                !connect,
            )?;
            let Some(tail) = tail else { continue };
            if !connect {
                // Disconnected tracks terminate at their own output; the
                // viewer still picks them up on a spare input.
                self.disconnected_tails.push(tail);
                continue;
            }
            main = Some(match main {
                None => tail,
                Some(current) => {
                    if let Some(label) = merge_label.take() {
                        self.add_stack(NodeClass::Push, &label);
                    }
                    self.script.push_layout_context(
                        LayoutContextKind::Merge,
                        String::new(),
                        ContextData {
                            merge_input_b: Some(tail),
                            ..ContextData::default()
                        },
                    );
                    let mut merge = Node::new(NodeClass::Merge);
                    merge.set_input(0, Some(current));
                    merge.set_input(1, Some(tail));
                    if track.blend_enabled
                        && let Some(mode) = &track.blend_mode
                    {
                        merge.set_knob("operation", KnobValue::Text(mode.clone()));
                    }
                    let id = self.script.add_node(merge);
                    self.script.pop_layout_context();
                    id
                }
            });
        }

        // Pure effect tracks sit above everything and apply bottom-up.
        for &track_idx in effect_tracks.iter().rev() {
            let Some(current) = main else { break };
            main = Some(self.emit_effects_track(track_idx, current, emit_shift));
        }
        main = self.emit_additional_nodes(AdditionalNodeScope::PerSequence, main);

        self.script.pop_layout_context();

        let stream = main.ok_or_else(|| {
            ShotgraphError::assembly(format!("sequence '{}' has nothing to export", seq.name))
        })?;

        let master_item = master_track
            .and_then(|idx| self.spec.master.and_then(|guid| seq.tracks[idx].item(guid)));
        let plate = master_item
            .map_or_else(|| seq.format.clone(), |item| item.source.format.clone());
        let format = self.output_format(None, master_item);
        let timecode_frames = seq.timecode_start + (first - emit_shift);
        let resolver = self.sequence_resolver();
        self.finish(TailArgs {
            first,
            last,
            format,
            plate,
            stream,
            timecode_frames,
            resolver,
        })
    }

    /// One track's chains, gap fillers, transitions, and sub-track effects.
    /// Returns the stream tail, or `None` when nothing was emitted.
    fn emit_track(
        &mut self,
        track_idx: usize,
        window: (i64, i64),
        emit_shift: i64,
        disconnected: bool,
    ) -> ShotgraphResult<Option<NodeId>> {
        let seq = self.spec.sequence;
        let options = self.spec.options;
        let track = &seq.tracks[track_idx];

        self.script.push_layout_context(
            LayoutContextKind::Track,
            track.name.clone(),
            ContextData {
                track_guid: Some(track.guid.clone()),
                disconnected,
                ..ContextData::default()
            },
        );

        let mut order: Vec<usize> = (0..track.items.len()).collect();
        order.sort_by_key(|&idx| track.items[idx].timeline_in);

        let mut stream: Option<NodeId> = None;
        let mut prev: Option<&TrackItem> = None;
        for idx in order {
            let item = &track.items[idx];
            if !item.enabled {
                continue;
            }
            if !item.source.media.online {
                self.warnings
                    .push(format!("media offline for '{}', item skipped", item.name));
                continue;
            }

            let mut join_label = if stream.is_some() {
                let label = self.next_stream_label();
                self.add_stack(NodeClass::Set, &label);
                Some(label)
            } else {
                None
            };

            self.script.push_layout_context(
                LayoutContextKind::Clip,
                item.name.clone(),
                ContextData::default(),
            );

            // Black filler over any gap in front of this cut.
            let gap_first = prev.map_or(window.0, |p| p.timeline_out + 1);
            let gap_last = item.timeline_in - 1;
            let mut gap = None;
            if gap_first <= gap_last {
                let mut constant = Node::new(NodeClass::Constant);
                constant.set_knob("format", KnobValue::Format(seq.format.clone()));
                set_lifetime(&mut constant, gap_first + emit_shift, gap_last + emit_shift);
                gap = Some(self.script.add_node(constant));
                if join_label.is_none() {
                    // The filler opens the track; label it for the join.
                    let label = self.next_stream_label();
                    self.add_stack(NodeClass::Set, &label);
                    join_label = Some(label);
                }
            }

            let resolver = self.item_resolver(track, item);
            let chain = ItemChainSpec {
                sequence: seq,
                track,
                item,
                options,
                effect_nodes: self.spec.effect_nodes,
                resolver: &resolver,
                handles: (0, 0),
                frame_offset: emit_shift,
                read_start: Some(item.timeline_in + emit_shift),
            }
            .emit(&mut self.script)?;
            self.warnings.extend(chain.warnings);
            self.annotation_frames.extend(chain.annotation_frames);
            self.applied_retimes |= chain.applied_retime;
            set_lifetime(
                self.script.node_mut(chain.tail),
                item.timeline_in + emit_shift,
                item.timeline_out + emit_shift,
            );

            self.script.pop_layout_context();

            if let Some(gap) = gap {
                stream = Some(match stream {
                    None => gap,
                    Some(current) => {
                        if let Some(label) = join_label.take() {
                            self.add_stack(NodeClass::Push, &label);
                        }
                        let merged = self.join(current, gap, None);
                        let label = self.next_stream_label();
                        self.add_stack(NodeClass::Set, &label);
                        join_label = Some(label);
                        merged
                    }
                });
            }

            let dissolve = track
                .transition_into(&item.guid)
                .filter(|t| match &t.from_item {
                    None => true,
                    Some(from) => prev.is_some_and(|p| &p.guid == from),
                });
            stream = Some(match stream {
                None => chain.tail,
                Some(current) => {
                    if let Some(label) = join_label.take() {
                        self.add_stack(NodeClass::Push, &label);
                    }
                    let curve = dissolve.map(|t| dissolve_curve(t, emit_shift));
                    self.join(current, chain.tail, curve)
                }
            });

            // A transition out with no incoming item fades to black.
            if let Some(t) = track.transition_out_of(&item.guid)
                && t.to_item.is_none()
                && let Some(current) = stream
            {
                let label = self.next_stream_label();
                self.add_stack(NodeClass::Set, &label);
                let mut constant = Node::new(NodeClass::Constant);
                constant.set_knob("format", KnobValue::Format(seq.format.clone()));
                set_lifetime(&mut constant, t.timeline_in + emit_shift, t.timeline_out + emit_shift);
                let filler = self.script.add_node(constant);
                self.add_stack(NodeClass::Push, &label);
                stream = Some(self.join(current, filler, Some(dissolve_curve(t, emit_shift))));
            }

            prev = Some(item);
        }

        // Trailing filler up to the out point.
        if let Some(p) = prev
            && p.timeline_out < window.1
            && let Some(current) = stream
        {
            let label = self.next_stream_label();
            self.add_stack(NodeClass::Set, &label);
            let mut constant = Node::new(NodeClass::Constant);
            constant.set_knob("format", KnobValue::Format(seq.format.clone()));
            set_lifetime(
                &mut constant,
                p.timeline_out + 1 + emit_shift,
                window.1 + emit_shift,
            );
            let filler = self.script.add_node(constant);
            self.add_stack(NodeClass::Push, &label);
            stream = Some(self.join(current, filler, None));
        }

        if let Some(current) = stream {
            stream = Some(self.chain_unlinked_subtracks(track, current, emit_shift));
        }
        stream = self.emit_additional_nodes(AdditionalNodeScope::PerTrack, stream);

        self.script.pop_layout_context();
        Ok(stream)
    }

    /// A track that carries only effects and annotations, applied onto the
    /// running stream inside its own layout context.
    fn emit_effects_track(&mut self, track_idx: usize, input: NodeId, emit_shift: i64) -> NodeId {
        let seq = self.spec.sequence;
        let track = &seq.tracks[track_idx];
        self.script.push_layout_context(
            LayoutContextKind::EffectsTrack,
            track.name.clone(),
            ContextData {
                track_guid: Some(track.guid.clone()),
                ..ContextData::default()
            },
        );
        let tail = self.chain_unlinked_subtracks(track, input, emit_shift);
        self.script.pop_layout_context();
        tail
    }

    /// Effects and annotations not linked to any item, chained in sub-track
    /// order onto `tail`.
    fn chain_unlinked_subtracks(&mut self, track: &Track, mut tail: NodeId, emit_shift: i64) -> NodeId {
        let options = self.spec.options;
        if options.include_effects {
            for effect in track.all_effects() {
                if effect.linked_item.is_some() || !effect.valid || !effect.enabled {
                    continue;
                }
                let Some(record) = self.spec.effect_nodes.get(&effect.guid) else {
                    self.warnings.push(format!(
                        "effect '{}' has no materialized node, skipping",
                        effect.name
                    ));
                    continue;
                };
                let mut node = effect_chain_node(record, emit_shift);
                node.name = effect.name.clone();
                set_lifetime(
                    &mut node,
                    effect.timeline_in + emit_shift,
                    effect.timeline_out + emit_shift,
                );
                tail = append(&mut self.script, tail, node);
            }
        }
        if options.include_annotations {
            for annotation in track.all_annotations() {
                if annotation.linked_item.is_some() || !annotation.valid {
                    continue;
                }
                let Some(record) = self.spec.effect_nodes.get(&annotation.guid) else {
                    continue;
                };
                let mut node = effect_chain_node(record, emit_shift);
                set_lifetime(
                    &mut node,
                    annotation.timeline_in + emit_shift,
                    annotation.timeline_out + emit_shift,
                );
                tail = append(&mut self.script, tail, node);
                self.annotation_frames
                    .push(annotation.timeline_in + emit_shift);
            }
        }
        tail
    }

    /// Root node, project metadata, timecode, annotation keys, the write
    /// fan-out, the viewer, and free-standing extras.
    fn finish(mut self, args: TailArgs) -> ShotgraphResult<AssembledScript> {
        let seq = self.spec.sequence;
        let options = self.spec.options;

        let mut root = Node::new(NodeClass::Root);
        root.set_knob(
            "name",
            KnobValue::Text(self.spec.script_path.display().to_string()),
        );
        root.set_knob("first_frame", KnobValue::Int(args.first));
        root.set_knob("last_frame", KnobValue::Int(args.last));
        root.set_knob("fps", KnobValue::Raw(seq.framerate.script_value()));
        root.set_knob("format", KnobValue::Format(args.format.clone()));
        if !seq.views.is_empty() {
            let views: Vec<String> = seq
                .views
                .iter()
                .map(|v| format!("{} {}", v.name, v.color))
                .collect();
            root.set_knob("views", KnobValue::Text(views.join("\n")));
            if let Some(hero) = seq.hero_view() {
                root.set_knob("hero_view", KnobValue::Text(hero.name.clone()));
            }
        }
        root.set_knob("proxy_type", KnobValue::Text("scale".to_owned()));
        if let Some(guid) = self.spec.shot_guid {
            // Downstream tools rebuild the source item from these.
            root.user_knobs.push(UserKnob::text("shot_guid", guid));
            root.user_knobs
                .push(UserKnob::integer("in_handle", self.spec.handles.0));
            root.user_knobs
                .push(UserKnob::integer("out_handle", self.spec.handles.1));
        }
        self.script.add_node(root);

        let mut tail = args.stream;

        let mut pairs = vec![
            ("hiero/project".to_owned(), seq.name.clone()),
            ("hiero/project_guid".to_owned(), seq.guid.clone()),
            (
                "input/frame_rate".to_owned(),
                seq.framerate.script_value(),
            ),
        ];
        for tag in &seq.tags {
            for (key, value) in &tag.metadata {
                pairs.push((key.clone(), value.clone()));
            }
        }
        let mut metadata = Node::new(NodeClass::Metadata);
        metadata.set_knob("metadata", KnobValue::Pairs(pairs));
        tail = append(&mut self.script, tail, metadata);

        let drop = seq.drop_frame && seq.framerate.supports_drop_frame();
        let mut timecode = Node::new(NodeClass::AddTimeCode);
        timecode.set_knob(
            "startcode",
            KnobValue::Text(frames_to_timecode(args.timecode_frames, seq.framerate, drop)),
        );
        timecode.set_knob("useFrame", KnobValue::Bool(true));
        timecode.set_knob("frame", KnobValue::Int(args.first));
        tail = append(&mut self.script, tail, timecode);

        if options.include_annotations && !self.annotation_frames.is_empty() {
            let mut frames = std::mem::take(&mut self.annotation_frames);
            frames.sort_unstable();
            frames.dedup();
            let curve = AnimCurve::from_keys(frames.iter().map(|&f| (f, 1.0)).collect());
            let mut keys = Node::new(NodeClass::NoOp);
            keys.name = "AnnotationsKeys".to_owned();
            keys.user_knobs
                .push(UserKnob::animated("annotation_key_info", &curve));
            tail = append(&mut self.script, tail, keys);
        }

        let main_end = self.emit_writes(tail, &args.plate, &args.resolver)?;

        let mut viewer = Node::new(NodeClass::Viewer);
        viewer.set_input(0, Some(main_end));
        for (slot, tail) in std::mem::take(&mut self.disconnected_tails).into_iter().enumerate() {
            viewer.set_input(slot + 1, Some(tail));
        }
        self.script.add_node(viewer);

        for template in &options.annotations_pre_comp_paths {
            let path = match args.resolver.resolve(template) {
                Ok(path) => path,
                Err(err) => {
                    self.warnings
                        .push(format!("precomp path '{template}' did not resolve: {err}"));
                    continue;
                }
            };
            let mut precomp = Node::new(NodeClass::Precomp);
            precomp.set_knob("file", KnobValue::Text(path));
            precomp
                .user_knobs
                .push(UserKnob::linked("annotation_key_info", "AnnotationsKeys.annotation_key_info"));
            precomp
                .user_knobs
                .push(UserKnob::pyscript("prev_key", "prev", PREV_KEY_SCRIPT));
            precomp
                .user_knobs
                .push(UserKnob::pyscript("next_key", "next", NEXT_KEY_SCRIPT));
            self.script.add_node(precomp);
        }

        self.emit_additional_nodes(AdditionalNodeScope::Unconnected, None);

        Ok(AssembledScript {
            script: self.script,
            first_frame: args.first,
            last_frame: args.last,
            format: args.format,
            write_paths: self.write_paths,
            applied_retimes: self.applied_retimes,
            warnings: self.warnings,
            errors: self.errors,
        })
    }

    /// The write fan-out. The branch matching the timeline write node stays
    /// on the main stream; every other branch taps it through a daisy-chain
    /// of dots. Returns the node the viewer should look at.
    fn emit_writes(
        &mut self,
        source: NodeId,
        plate: &Format,
        resolver: &PathResolver,
    ) -> ShotgraphResult<NodeId> {
        let options = self.spec.options;
        let writes = &options.write_paths;
        if writes.is_empty() {
            return Ok(source);
        }
        self.script.push_layout_context(
            LayoutContextKind::Write,
            "writes".to_owned(),
            ContextData::default(),
        );

        let main_index = writes
            .iter()
            .position(|w| w.path == options.timeline_write_node)
            .unwrap_or(0);

        self.add_stack(NodeClass::Set, "main_branch");
        let mut last_branch = "main_branch".to_owned();
        let mut branch_source = source;
        let mut branch_counter = 0usize;
        let mut main_end: Option<NodeId> = None;

        for (idx, write) in writes.iter().enumerate() {
            if self.spec.progress.is_cancelled() {
                return Err(ShotgraphError::Cancelled);
            }
            let path = match resolver.resolve(&write.path) {
                Ok(path) => path,
                Err(err) => {
                    self.errors
                        .push(format!("write path '{}' did not resolve: {err}", write.path));
                    continue;
                }
            };
            let colorspace = match &write.colorspace {
                Some(template) => match resolver.resolve(template) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        self.errors.push(format!(
                            "colorspace for '{path}' did not resolve: {err}, write skipped"
                        ));
                        continue;
                    }
                },
                None => None,
            };
            if idx == main_index {
                self.add_stack(NodeClass::Push, "main_branch");
                let end = self.emit_write_branch(source, write, &path, colorspace, plate);
                self.add_stack(NodeClass::Set, "main_end");
                main_end = Some(end);
            } else {
                self.add_stack(NodeClass::Push, &last_branch);
                let mut dot = Node::new(NodeClass::Dot);
                dot.set_input(0, Some(branch_source));
                let dot_id = self.script.add_node(dot);
                let label = format!("branch_{branch_counter}");
                branch_counter += 1;
                self.add_stack(NodeClass::Set, &label);
                self.emit_write_branch(dot_id, write, &path, colorspace, plate);
                last_branch = label;
                branch_source = dot_id;
            }
        }

        if main_end.is_some() {
            self.add_stack(NodeClass::Push, "main_end");
        }
        self.script.pop_layout_context();
        Ok(main_end.unwrap_or(source))
    }

    /// One write branch: preset reformat, burn-in, then the Write itself.
    fn emit_write_branch(
        &mut self,
        input: NodeId,
        spec: &WriteNodeSpec,
        path: &str,
        colorspace: Option<String>,
        plate: &Format,
    ) -> NodeId {
        let mut tail = input;
        if let Some(node) = preset_reformat_node(
            self.spec.options,
            &self.spec.sequence.format,
            plate,
            &mut self.warnings,
        ) {
            tail = append(&mut self.script, tail, node);
        }
        if let Some(class) = &spec.burn_in {
            let node = Node::new(NodeClass::Custom(class.clone()));
            tail = append(&mut self.script, tail, node);
        }

        let mut write = Node::new(NodeClass::Write);
        write.set_knob("file", KnobValue::Text(path.to_owned()));
        let file_type = spec.file_type.clone().or_else(|| {
            Path::new(path)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_owned)
        });
        if let Some(file_type) = file_type {
            write.set_knob("file_type", KnobValue::Text(file_type));
        }
        if let Some(colorspace) = colorspace {
            write.set_knob("colorspace", KnobValue::Text(colorspace));
        }
        if let Some(name) = &spec.name {
            if self.script.find_node_by_name(name).is_some() {
                self.warnings
                    .push(format!("duplicate write node name '{name}', renaming"));
            }
            write.name = name.clone();
        }
        tail = append(&mut self.script, tail, write);
        self.write_paths.push(path.to_owned());
        tail
    }

    /// User-configured extra nodes for one scope. Connected scopes chain
    /// onto `input`; the unconnected scope drops free-standing nodes.
    fn emit_additional_nodes(
        &mut self,
        scope: AdditionalNodeScope,
        input: Option<NodeId>,
    ) -> Option<NodeId> {
        if !self.spec.options.additional_nodes_enabled {
            return input;
        }
        let entries: Vec<_> = self
            .spec
            .options
            .additional_nodes
            .iter()
            .filter(|entry| entry.scope == scope)
            .cloned()
            .collect();
        let mut tail = input;
        for entry in entries {
            let mut node = Node::new(NodeClass::Custom(entry.class));
            for (name, value) in entry.knobs {
                node.set_knob(name, value);
            }
            node.label = entry.label;
            match tail {
                Some(current) => tail = Some(append(&mut self.script, current, node)),
                None => {
                    self.script.add_node(node);
                }
            }
        }
        tail
    }

    /// The format recorded on the Root, in preset precedence order.
    fn output_format(&self, forced: Option<Format>, item: Option<&TrackItem>) -> Format {
        if let Some(format) = forced {
            return format;
        }
        let options = self.spec.options;
        match parse_reformat_kind(&options.reformat.to_type).unwrap_or(ReformatKind::None) {
            ReformatKind::ToFormat => {
                if let Some(format) = &options.reformat.format {
                    return format.clone();
                }
            }
            ReformatKind::Plate => {
                if let Some(item) = item {
                    return item.source.format.clone();
                }
            }
            _ => {}
        }
        match item {
            Some(item) if item.reformat_state == ItemReformatState::Disabled => {
                item.source.format.clone()
            }
            _ => self.spec.sequence.format.clone(),
        }
    }

    fn join(&mut self, a: NodeId, b: NodeId, dissolve: Option<AnimCurve>) -> NodeId {
        let mut node = match dissolve {
            Some(curve) => {
                let mut node = Node::new(NodeClass::Dissolve);
                node.set_knob("which", KnobValue::Curve(curve));
                node
            }
            None => Node::new(NodeClass::Merge),
        };
        node.set_input(0, Some(a));
        node.set_input(1, Some(b));
        self.script.add_node(node)
    }

    fn item_resolver(&self, track: &Track, item: &TrackItem) -> PathResolver {
        let mut resolver = PathResolver::for_item(self.spec.sequence, track, item);
        self.seed_resolver(&mut resolver);
        resolver
    }

    fn sequence_resolver(&self) -> PathResolver {
        let mut resolver = PathResolver::for_sequence(self.spec.sequence);
        self.seed_resolver(&mut resolver);
        resolver
    }

    fn seed_resolver(&self, resolver: &mut PathResolver) {
        let options = self.spec.options;
        resolver.set_entry("version", options.version.clone());
        resolver.set_entry("ext", options.license_mode.script_extension());
    }

    fn next_stream_label(&mut self) -> String {
        self.stream_labels += 1;
        format!("stream_{}", self.stream_labels)
    }

    fn add_stack(&mut self, class: NodeClass, label: &str) {
        let mut node = Node::new(class);
        node.set_knob("label", KnobValue::Raw(label.to_owned()));
        self.script.add_node(node);
    }
}

fn dissolve_curve(transition: &Transition, emit_shift: i64) -> AnimCurve {
    AnimCurve::from_keys(vec![
        (transition.timeline_in + emit_shift, 0.0),
        (transition.timeline_out + emit_shift, 1.0),
    ])
}

#[cfg(test)]
#[path = "../../tests/unit/assemble/sequence_graph.rs"]
mod tests;
