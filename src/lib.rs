//! Shotgraph turns timeline selections into deterministic compositor scripts.
//!
//! Given an edit-decision model (a `Sequence` of tracks, items, soft effects,
//! annotations and transitions) plus an `ExportOptions` record, shotgraph
//! produces a node-graph script (`.nk` text) that renders frames equivalent
//! to the selection: handles, retimes, reformats, effects, annotations and
//! multi-track collation included.
//!
//! # Pipeline overview
//!
//! 1. **Collate** (optional): `Sequence + master item + options -> CollatedSequence`
//!    (a synthetic sequence gathering related items under a head-room shift)
//! 2. **Assemble**: `sequence-or-item + options -> Script` (typed nodes, layout contexts)
//! 3. **Layout**: `Script -> Script` (every node receives canvas coordinates, backdrops attached)
//! 4. **Serialize**: `Script -> text` written to disk, then handed to the post-processor
//! 5. **Tag**: an export-artifact tag is written back onto the original item
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-default**: assembly and layout are pure and stable for
//!   a given input; no output path iterates an unordered container.
//! - **Host objects are read-only**: the only mutation is the export tag the
//!   driver hands back for the caller to apply.
#![forbid(unsafe_code)]

mod assemble;
mod collate;
mod export;
mod foundation;
mod layout;
mod script;
mod timeline;

pub use assemble::item_graph::{ItemChain, ItemChainSpec};
pub use assemble::sequence_graph::{AssembledScript, Assembler, AssemblySpec};
pub use collate::builder::{
    CollatedSequence, CopiedItem, build_collated_sequence, needs_collation,
};
pub use export::driver::{
    ExportOutcome, ExportTarget, ExportTask, ScriptPostProcessor, TaskStage, apply_export_tag,
    normalize_script_extension,
};
pub use export::options::{
    AdditionalNodeScope, AdditionalNodesEntry, ExportOptions, ExportPreset, LicenseMode,
    ReformatKind, ReformatOptions, RetimeMethod, WriteNodeSpec,
};
pub use export::progress::{NullProgress, ProgressSink, SharedProgress};
pub use export::range::{
    RangeTarget, copy_timing, output_handles, output_range, timeline_range,
};
pub use export::resolver::PathResolver;
pub use foundation::core::{
    COLLATE_HEAD_ROOM, Fps, FrameSpan, Point, Rect, Size, Vec2, derive_guid, frames_to_timecode,
};
pub use foundation::error::{ShotgraphError, ShotgraphResult};
pub use layout::engine::{LayoutMetrics, layout_script};
pub use script::graph::{ContextData, ContextId, LayoutContext, LayoutContextKind, Script};
pub use script::knob::{AnimCurve, KnobValue, UserKnob};
pub use script::node::{AlignAxis, AlignHint, Node, NodeClass, NodeId};
pub use script::writer::{ensure_parent_dir, render_script, write_script};
pub use timeline::effects::{
    Annotation, EffectNode, EffectNodeCache, FormatChange, MainThreadToken, SoftEffect,
    materialize_effect_nodes,
};
pub use timeline::item::{Clip, Format, ItemReformatState, MediaSource, TrackItem};
pub use timeline::model::{Sequence, SubTrack, Track, Transition, ViewInfo};
pub use timeline::tags::{
    ExportTagFields, LEGACY_HANDLES_KEY, Tag, TagKey, build_export_tag, handles_from_tag,
    merge_export_tag,
};
