use std::collections::BTreeMap;

/// Metadata keys written onto export-artifact tags. Downstream consumers
/// depend on the exact strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagKey {
    PresetId,
    Path,
    Format,
    Script,
    Localtime,
    PathTemplate,
    StartFrame,
    Duration,
    SourceRetime,
    AppliedRetimes,
    FrameOffset,
    StartHandle,
    EndHandle,
    ScriptAnnotations,
}

impl TagKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PresetId => "tag.presetid",
            Self::Path => "tag.path",
            Self::Format => "tag.format",
            Self::Script => "tag.script",
            Self::Localtime => "tag.localtime",
            Self::PathTemplate => "tag.pathtemplate",
            Self::StartFrame => "tag.startframe",
            Self::Duration => "tag.duration",
            Self::SourceRetime => "tag.sourceretime",
            Self::AppliedRetimes => "tag.appliedretimes",
            Self::FrameOffset => "tag.frameoffset",
            Self::StartHandle => "tag.starthandle",
            Self::EndHandle => "tag.endhandle",
            Self::ScriptAnnotations => "tag.scriptannotations",
        }
    }
}

/// Legacy single-value handle key, split into start/end on read.
pub const LEGACY_HANDLES_KEY: &str = "tag.handles";

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A named tag with string metadata. Export artifacts are tags whose
/// metadata carries the [`TagKey`] entries.
pub struct Tag {
    /// Tag name; export tags carry the preset name.
    pub name: String,
    /// String metadata, stable ordering.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Hidden tags exist for machines, not for the timeline UI.
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_true() -> bool {
    true
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
            visible: true,
        }
    }

    pub fn get(&self, key: TagKey) -> Option<&str> {
        self.metadata.get(key.as_str()).map(String::as_str)
    }

    pub fn set(&mut self, key: TagKey, value: impl Into<String>) {
        self.metadata.insert(key.as_str().to_owned(), value.into());
    }

    /// Whether this tag is an export artifact for the given preset.
    pub fn is_export_tag_for(&self, preset_id: &str) -> bool {
        self.get(TagKey::PresetId) == Some(preset_id)
    }
}

/// Handle counts recorded on an export tag.
///
/// Current tags carry `tag.starthandle`/`tag.endhandle`; historical tags
/// carry a single `tag.handles` value that applies to both sides.
pub fn handles_from_tag(tag: &Tag) -> Option<(i64, i64)> {
    let parse = |s: &str| s.trim().parse::<i64>().ok();
    match (tag.get(TagKey::StartHandle), tag.get(TagKey::EndHandle)) {
        (Some(start), Some(end)) => Some((parse(start)?, parse(end)?)),
        _ => {
            let both = parse(tag.metadata.get(LEGACY_HANDLES_KEY)?)?;
            Some((both, both))
        }
    }
}

/// Everything an export writes back onto the original item.
#[derive(Clone, Debug, Default)]
pub struct ExportTagFields {
    pub preset_id: String,
    pub preset_name: String,
    pub script_path: String,
    pub path_template: String,
    /// Resolved write outputs, one path per write node.
    pub write_paths: Vec<String>,
    /// Output format specs matching `write_paths`.
    pub formats: Vec<String>,
    pub start_frame: i64,
    pub duration: i64,
    pub start_handle: i64,
    pub end_handle: i64,
    pub applied_retimes: bool,
    pub source_retime: f64,
    pub frame_offset: i64,
    /// Wall-clock stamp supplied by the caller.
    pub localtime: String,
    /// Annotation script path, present only on annotations re-exports.
    pub script_annotations: Option<String>,
}

/// Build the export-artifact tag from driver outputs.
pub fn build_export_tag(fields: &ExportTagFields) -> Tag {
    let mut tag = Tag::new(fields.preset_name.clone());
    tag.visible = true;
    tag.set(TagKey::PresetId, &fields.preset_id);
    tag.set(TagKey::Script, &fields.script_path);
    tag.set(TagKey::Path, fields.write_paths.join(";"));
    tag.set(TagKey::Format, fields.formats.join(";"));
    tag.set(TagKey::PathTemplate, &fields.path_template);
    tag.set(TagKey::Localtime, &fields.localtime);
    tag.set(TagKey::StartFrame, fields.start_frame.to_string());
    tag.set(TagKey::Duration, fields.duration.to_string());
    tag.set(TagKey::StartHandle, fields.start_handle.to_string());
    tag.set(TagKey::EndHandle, fields.end_handle.to_string());
    tag.set(
        TagKey::AppliedRetimes,
        if fields.applied_retimes { "1" } else { "0" },
    );
    tag.set(
        TagKey::SourceRetime,
        crate::script::knob::fmt_f64(fields.source_retime),
    );
    tag.set(TagKey::FrameOffset, fields.frame_offset.to_string());
    if let Some(annotations) = &fields.script_annotations {
        tag.set(TagKey::ScriptAnnotations, annotations);
    }
    tag
}

/// Attach an export tag, replacing any previous tag with the same preset id.
/// Running the same preset twice therefore updates in place.
pub fn merge_export_tag(tags: &mut Vec<Tag>, tag: Tag) {
    let preset_id = tag.get(TagKey::PresetId).unwrap_or_default().to_owned();
    if let Some(existing) = tags
        .iter_mut()
        .find(|t| t.is_export_tag_for(&preset_id))
    {
        *existing = tag;
    } else {
        tags.push(tag);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/tags.rs"]
mod tests;
