use crate::{
    export::resolver::PathResolver,
    foundation::error::{ShotgraphError, ShotgraphResult},
    script::knob::KnobValue,
    timeline::item::Format,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
/// How retimed items are exported.
pub enum RetimeMethod {
    /// Bake the retime: the exporter resamples the range, no retime node.
    #[default]
    None,
    /// Motion-estimated resampling.
    Motion,
    /// Nearest-frame sampling.
    Frame,
    /// Frame blending.
    Blend,
}

impl RetimeMethod {
    /// Whether retimes are preserved as nodes rather than baked.
    pub fn preserves_retimes(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Filter knob value on the emitted retime node.
    pub fn filter_knob(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Motion => Some("motion"),
            Self::Frame => Some("nearest"),
            Self::Blend => Some("linear"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// License tier of the target compositor; selects the script extension.
pub enum LicenseMode {
    #[default]
    Commercial,
    NonCommercial,
    Indie,
}

impl LicenseMode {
    pub fn script_extension(self) -> &'static str {
        match self {
            Self::Commercial => "nk",
            Self::NonCommercial => "nknc",
            Self::Indie => "nkind",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Parsed `reformat.to_type` value.
pub enum ReformatKind {
    None,
    ToSequence,
    Plate,
    ToFormat,
    ToScale,
}

/// Parse the wire spelling of a reformat type. Unknown spellings come back
/// as an error the assembler surfaces as a task warning.
pub fn parse_reformat_kind(value: &str) -> ShotgraphResult<ReformatKind> {
    match value {
        "None" | "" => Ok(ReformatKind::None),
        "to sequence" => Ok(ReformatKind::ToSequence),
        "plate" => Ok(ReformatKind::Plate),
        "to format" => Ok(ReformatKind::ToFormat),
        "to scale" => Ok(ReformatKind::ToScale),
        other => Err(ShotgraphError::validation(format!(
            "unknown reformat type '{other}'"
        ))),
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Reformat behaviour of the export.
pub struct ReformatOptions {
    /// One of `None`, `to sequence`, `plate`, `to format`, `to scale`.
    /// Kept as the wire spelling; parsed at assembly time.
    pub to_type: String,
    /// Target format for `to format`.
    pub format: Option<Format>,
    /// Scale factor for `to scale`.
    pub scale: Option<f64>,
    /// Resize mode knob on the emitted node.
    pub resize: String,
    /// Whether the reformat centers the image.
    pub center: bool,
    /// Filter knob on the emitted node, when any.
    pub filter: Option<String>,
}

impl Default for ReformatOptions {
    fn default() -> Self {
        Self {
            to_type: "None".to_owned(),
            format: None,
            scale: None,
            resize: "width".to_owned(),
            center: true,
            filter: None,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
/// One write output of the export.
pub struct WriteNodeSpec {
    /// Output path template; resolver tokens allowed.
    pub path: String,
    /// Node-name override. Duplicates surface as warnings.
    #[serde(default)]
    pub name: Option<String>,
    /// Container/file type ("dpx", "exr"...); also feeds the `{ext}` token.
    #[serde(default)]
    pub file_type: Option<String>,
    /// Output colorspace; resolver tokens allowed.
    #[serde(default)]
    pub colorspace: Option<String>,
    /// Burn-in gizmo class placed before the write, when any.
    #[serde(default)]
    pub burn_in: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// Where user-defined nodes are injected.
pub enum AdditionalNodeScope {
    PerShot,
    PerTrack,
    PerSequence,
    Unconnected,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
/// A user-defined node injected at a given scope.
pub struct AdditionalNodesEntry {
    pub scope: AdditionalNodeScope,
    /// Node class to emit.
    pub class: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub knobs: Vec<(String, KnobValue)>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
/// The complete export options record. Unknown keys are rejected at the
/// deserialization boundary; legacy property migration happens before this
/// record is built, not inside it.
pub struct ExportOptions {
    /// Handle frames added each side of the cut; `None` exports the cut
    /// with no handle extension (the whole clip stays visible to the Read).
    pub cut_handles: Option<i64>,
    /// When set, output frame numbering starts here.
    pub start_frame: Option<i64>,
    /// Output ranges in sequence time instead of source time.
    pub output_sequence_time: bool,
    /// Retime handling.
    pub retime_method: RetimeMethod,
    /// Reformat behaviour.
    pub reformat: ReformatOptions,
    /// Collate items overlapping the master item's range.
    pub collate_tracks: bool,
    /// Collate items sharing the master item's name.
    pub collate_shot_names: bool,
    /// Collate every item on the sequence.
    pub collate_sequence: bool,
    /// Merge every track into the write, or leave non-master tracks
    /// disconnected.
    pub connect_tracks: bool,
    /// Emit soft-effect nodes.
    pub include_effects: bool,
    /// Emit annotation nodes; forces zero handles on the annotations pass.
    pub include_annotations: bool,
    /// Keep effects/annotations on chains whose Read was replaced by a
    /// sibling-export path. Default keeps the historical behaviour: the
    /// sibling render already baked them in, so they are omitted.
    pub apply_effects_to_read_paths: bool,
    /// Sibling-export paths whose renders replace item Reads.
    pub read_paths: Vec<String>,
    /// Write outputs.
    pub write_paths: Vec<WriteNodeSpec>,
    /// Path of the write placed on the main branch; empty selects the first.
    pub timeline_write_node: String,
    /// Master switch for `additional_nodes`.
    pub additional_nodes_enabled: bool,
    /// User-defined nodes injected at scope.
    pub additional_nodes: Vec<AdditionalNodesEntry>,
    /// Run the external post-processor after writing the script.
    pub post_process_script: bool,
    /// Sibling annotation exports loaded as Precomp nodes.
    pub annotations_pre_comp_paths: Vec<String>,
    /// Per-item timecode nodes in single-item chains.
    pub include_source_timecode: bool,
    /// Per-item shot metadata nodes in single-item chains.
    pub include_shot_metadata: bool,
    /// Offline master media turns the task into a no-op.
    pub skip_offline: bool,
    /// License tier; normalizes the script extension.
    pub license_mode: LicenseMode,
    /// Value of the `{version}` token.
    pub version: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            cut_handles: None,
            start_frame: None,
            output_sequence_time: false,
            retime_method: RetimeMethod::None,
            reformat: ReformatOptions::default(),
            collate_tracks: false,
            collate_shot_names: false,
            collate_sequence: false,
            connect_tracks: true,
            include_effects: true,
            include_annotations: false,
            apply_effects_to_read_paths: false,
            read_paths: Vec::new(),
            write_paths: Vec::new(),
            timeline_write_node: String::new(),
            additional_nodes_enabled: false,
            additional_nodes: Vec::new(),
            post_process_script: true,
            annotations_pre_comp_paths: Vec::new(),
            include_source_timecode: false,
            include_shot_metadata: false,
            skip_offline: true,
            license_mode: LicenseMode::Commercial,
            version: "v1".to_owned(),
        }
    }
}

impl ExportOptions {
    /// Whether any collation trigger is set.
    pub fn wants_collation(&self) -> bool {
        self.collate_tracks || self.collate_shot_names || self.collate_sequence
    }

    /// Handle count after the annotations rule: the annotations pass pins
    /// handles to zero so keys land on exact source frames.
    pub fn effective_cut_handles(&self) -> Option<i64> {
        if self.include_annotations {
            Some(0)
        } else {
            self.cut_handles
        }
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if let Some(handles) = self.cut_handles
            && handles < 0
        {
            return Err(ShotgraphError::validation(
                "cut_handles must be >= 0 when set",
            ));
        }
        if let Some(scale) = self.reformat.scale
            && (!scale.is_finite() || scale <= 0.0)
        {
            return Err(ShotgraphError::validation(
                "reformat.scale must be finite and > 0",
            ));
        }
        for write in &self.write_paths {
            if write.path.trim().is_empty() {
                return Err(ShotgraphError::validation(
                    "write_paths entries must carry a non-empty path",
                ));
            }
        }
        if self.version.trim().is_empty() {
            return Err(ShotgraphError::validation("version must be non-empty"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
/// A named, identified options record; what the host persists and the task
/// registry instantiates tasks from.
pub struct ExportPreset {
    /// Stable preset identifier; export tags de-duplicate on this.
    pub id: String,
    /// Display name; becomes the export tag name.
    pub name: String,
    #[serde(default)]
    pub options: ExportOptions,
}

impl ExportPreset {
    /// A fresh preset with default option values.
    pub fn init_default_properties(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            options: ExportOptions::default(),
        }
    }

    /// Path-valued properties that track element renames.
    pub fn properties_for_path_callbacks(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::new();
        paths.extend(self.options.read_paths.iter().map(String::as_str));
        paths.extend(self.options.write_paths.iter().map(|w| w.path.as_str()));
        paths.extend(
            self.options
                .annotations_pre_comp_paths
                .iter()
                .map(String::as_str),
        );
        paths
    }

    /// Rewrite path references when an element moves in the export
    /// structure.
    pub fn on_element_path_changed(&mut self, old: &str, new: &str) {
        let rewrite = |s: &mut String| {
            if s == old {
                *s = new.to_owned();
            }
        };
        for path in &mut self.options.read_paths {
            rewrite(path);
        }
        for write in &mut self.options.write_paths {
            rewrite(&mut write.path);
        }
        for path in &mut self.options.annotations_pre_comp_paths {
            rewrite(path);
        }
        if !self.options.timeline_write_node.is_empty() {
            rewrite(&mut self.options.timeline_write_node);
        }
    }

    /// Preset-specific resolver tokens on top of the item-derived ones.
    pub fn add_custom_resolve_entries(&self, resolver: &mut PathResolver) {
        resolver.set_entry("version", self.options.version.clone());
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/options.rs"]
mod tests;
