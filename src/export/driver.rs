//! Export orchestration.
//!
//! One [`ExportTask`] turns a target (an item or a whole sequence) plus a
//! preset into a script on disk, stepping through fixed stages so a host
//! can pump [`ExportTask::task_step`] from its own loop: resolve, collate,
//! assemble, lay out, serialize, post-process, tag. Everything runs on the
//! host's control thread; the [`MainThreadToken`] witnesses that.

use std::path::{Path, PathBuf};

use crate::{
    assemble::sequence_graph::{AssembledScript, Assembler, AssemblySpec},
    collate::builder::{CollatedSequence, build_collated_sequence, needs_collation},
    export::options::{ExportOptions, ExportPreset, LicenseMode},
    export::progress::ProgressSink,
    export::range::{RangeTarget, output_handles, output_range},
    export::resolver::PathResolver,
    foundation::error::{ShotgraphError, ShotgraphResult},
    layout::engine::layout_script,
    timeline::effects::{EffectNodeCache, MainThreadToken, materialize_effect_nodes},
    timeline::item::{Format, TrackItem},
    timeline::model::Sequence,
    timeline::tags::{ExportTagFields, Tag, build_export_tag, merge_export_tag},
};

/// What one task exports.
#[derive(Clone, Copy)]
pub enum ExportTarget<'a> {
    /// A single item on the sequence, addressed by guid.
    Item {
        sequence: &'a Sequence,
        item_guid: &'a str,
    },
    /// The whole sequence.
    Sequence(&'a Sequence),
}

impl<'a> ExportTarget<'a> {
    pub fn sequence(&self) -> &'a Sequence {
        match *self {
            Self::Item { sequence, .. } | Self::Sequence(sequence) => sequence,
        }
    }

    pub fn item_guid(&self) -> Option<&'a str> {
        match *self {
            Self::Item { item_guid, .. } => Some(item_guid),
            Self::Sequence(_) => None,
        }
    }

    fn item(&self) -> Option<&'a TrackItem> {
        match *self {
            Self::Item {
                sequence,
                item_guid,
            } => sequence.find_item(item_guid).map(|(_, item)| item),
            Self::Sequence(_) => None,
        }
    }
}

/// Fixed pipeline position of a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStage {
    Resolve,
    Collate,
    Assemble,
    Layout,
    Serialize,
    PostProcess,
    Tag,
    Done,
}

/// Hook run against the script file after serialization. A failure is
/// logged and surfaced as a warning; the file stays on disk.
pub trait ScriptPostProcessor {
    fn post_process(&self, path: &Path) -> Result<(), String>;
}

/// Everything a finished (or skipped) task has to show for itself.
#[derive(Debug, Default)]
pub struct ExportOutcome {
    pub script_path: Option<PathBuf>,
    /// Resolved write destinations, emission order.
    pub write_paths: Vec<String>,
    pub first_frame: i64,
    pub last_frame: i64,
    /// Export tag for the original item; `None` for sequence exports and
    /// skipped tasks.
    pub tag: Option<Tag>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// True when offline media turned the task into a no-op.
    pub skipped: bool,
}

pub struct ExportTask<'a> {
    target: ExportTarget<'a>,
    preset: &'a ExportPreset,
    /// Script path template, kept verbatim for the tag.
    script_template: String,
    token: &'a MainThreadToken,
    progress: &'a dyn ProgressSink,
    post_processor: Option<&'a dyn ScriptPostProcessor>,
    /// Timestamp recorded on the tag, supplied by the host.
    localtime: String,
    stage: TaskStage,
    script_path: PathBuf,
    handles: (i64, i64),
    collated: Option<CollatedSequence>,
    effect_nodes: Option<EffectNodeCache>,
    assembled: Option<AssembledScript>,
    outcome: ExportOutcome,
}

impl std::fmt::Debug for ExportTask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTask")
            .field("script_template", &self.script_template)
            .field("stage", &self.stage)
            .field("script_path", &self.script_path)
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl<'a> ExportTask<'a> {
    pub fn new(
        target: ExportTarget<'a>,
        preset: &'a ExportPreset,
        script_template: impl Into<String>,
        token: &'a MainThreadToken,
        progress: &'a dyn ProgressSink,
    ) -> ShotgraphResult<Self> {
        preset.options.validate()?;
        target.sequence().validate()?;
        if let ExportTarget::Item {
            sequence,
            item_guid,
        } = target
            && sequence.find_item(item_guid).is_none()
        {
            return Err(ShotgraphError::validation(format!(
                "item {item_guid} is not on sequence '{}'",
                sequence.name
            )));
        }
        Ok(Self {
            target,
            preset,
            script_template: script_template.into(),
            token,
            progress,
            post_processor: None,
            localtime: String::new(),
            stage: TaskStage::Resolve,
            script_path: PathBuf::new(),
            handles: (0, 0),
            collated: None,
            effect_nodes: None,
            assembled: None,
            outcome: ExportOutcome::default(),
        })
    }

    pub fn with_post_processor(mut self, hook: &'a dyn ScriptPostProcessor) -> Self {
        self.post_processor = Some(hook);
        self
    }

    /// Timestamp written into the tag's `tag.localtime` field.
    pub fn with_localtime(mut self, localtime: impl Into<String>) -> Self {
        self.localtime = localtime.into();
        self
    }

    fn options(&self) -> &'a ExportOptions {
        &self.preset.options
    }

    pub fn stage(&self) -> TaskStage {
        self.stage
    }

    pub fn outcome(&self) -> &ExportOutcome {
        &self.outcome
    }

    /// Whether this task would export the given item.
    pub fn is_exporting_item(&self, guid: &str) -> bool {
        match self.target {
            ExportTarget::Item { item_guid, .. } => item_guid == guid,
            ExportTarget::Sequence(sequence) => sequence.find_item(guid).is_some(),
        }
    }

    /// Inclusive output bounds for the target under the current options.
    pub fn output_range(&self) -> (i64, i64) {
        match self.target.item() {
            Some(item) => output_range(self.options(), RangeTarget::Item(item), false, true, false),
            None => output_range(
                self.options(),
                RangeTarget::Sequence(self.target.sequence()),
                false,
                false,
                false,
            ),
        }
    }

    /// Effective handles for the target item; zero for sequence exports.
    pub fn output_handles(&self) -> (i64, i64) {
        match self.target.item() {
            Some(item) => output_handles(
                self.options().effective_cut_handles(),
                item,
                self.options().retime_method,
                false,
            ),
            None => (0, 0),
        }
    }

    pub fn views(&self) -> Vec<String> {
        self.target.sequence().view_names()
    }

    /// Advance one stage. Returns `false` once the task is done. Only
    /// cancellation and IO failures come back as errors; everything else
    /// lands in the outcome's warning and error lists.
    pub fn task_step(&mut self) -> ShotgraphResult<bool> {
        if self.progress.is_cancelled() {
            return Err(ShotgraphError::Cancelled);
        }
        match self.stage {
            TaskStage::Resolve => self.step_resolve()?,
            TaskStage::Collate => self.step_collate()?,
            TaskStage::Assemble => self.step_assemble()?,
            TaskStage::Layout => self.step_layout(),
            TaskStage::Serialize => self.step_serialize()?,
            TaskStage::PostProcess => self.step_post_process(),
            TaskStage::Tag => self.step_tag(),
            TaskStage::Done => return Ok(false),
        }
        Ok(self.stage != TaskStage::Done)
    }

    /// Run all stages to completion.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn run(mut self) -> ShotgraphResult<ExportOutcome> {
        while self.task_step()? {}
        Ok(self.outcome)
    }

    fn step_resolve(&mut self) -> ShotgraphResult<()> {
        self.progress.set_message("resolving paths");
        self.progress.set_progress(5);

        // Offline media short-circuits the whole task when asked to.
        if self.options().skip_offline
            && let Some(item) = self.target.item()
            && !item.source.media.online
        {
            tracing::warn!(item = %item.name, "media offline, skipping export");
            self.outcome.skipped = true;
            self.stage = TaskStage::Done;
            return Ok(());
        }

        let resolver = self.make_resolver();
        let resolved = resolver.resolve(&self.script_template)?;
        self.script_path =
            normalize_script_extension(Path::new(&resolved), self.options().license_mode);
        self.handles = self.output_handles();

        // Lazy host node records must be touched here, on the control
        // thread, before collation or assembly read them.
        self.effect_nodes = Some(materialize_effect_nodes(self.target.sequence(), self.token));

        self.stage = TaskStage::Collate;
        Ok(())
    }

    fn step_collate(&mut self) -> ShotgraphResult<()> {
        self.progress.set_message("collating tracks");
        self.progress.set_progress(25);
        self.stage = TaskStage::Assemble;

        let Some(master) = self.target.item_guid() else {
            return Ok(());
        };
        let options = self.options();
        let sequence = self.target.sequence();
        if !needs_collation(sequence, master, options) {
            return Ok(());
        }
        let collated =
            build_collated_sequence(sequence, master, options, self.token, self.progress)?;
        self.outcome.errors.extend(collated.errors.iter().cloned());
        // Copies carry fresh guids; re-materialize against them.
        self.effect_nodes = Some(materialize_effect_nodes(&collated.sequence, self.token));
        self.handles = (collated.in_handle, collated.out_handle);
        self.collated = Some(collated);
        Ok(())
    }

    fn step_assemble(&mut self) -> ShotgraphResult<()> {
        self.progress.set_message("assembling script");
        self.progress.set_progress(40);

        let sequence = self
            .collated
            .as_ref()
            .map_or(self.target.sequence(), |c| &c.sequence);
        let master = match (&self.collated, self.target.item_guid()) {
            (Some(collated), Some(_)) => Some(collated.master_guid.as_str()),
            (None, Some(guid)) => Some(guid),
            _ => None,
        };
        let effect_nodes = self.effect_nodes.as_ref().ok_or_else(|| {
            ShotgraphError::assembly("effect nodes were not materialized before assembly")
        })?;

        let assembled = Assembler::new(AssemblySpec {
            sequence,
            master,
            shot_guid: self.target.item_guid(),
            handles: self.handles,
            collated: self.collated.is_some(),
            options: self.options(),
            effect_nodes,
            script_path: &self.script_path,
            progress: self.progress,
        })
        .assemble()?;

        self.outcome.warnings.extend(assembled.warnings.iter().cloned());
        self.outcome.errors.extend(assembled.errors.iter().cloned());
        self.outcome.write_paths = assembled.write_paths.clone();
        self.outcome.first_frame = assembled.first_frame;
        self.outcome.last_frame = assembled.last_frame;
        self.assembled = Some(assembled);
        self.stage = TaskStage::Layout;
        Ok(())
    }

    fn step_layout(&mut self) {
        self.progress.set_message("laying out nodes");
        self.progress.set_progress(70);
        if let Some(assembled) = &mut self.assembled {
            layout_script(&mut assembled.script);
        }
        self.stage = TaskStage::Serialize;
    }

    fn step_serialize(&mut self) -> ShotgraphResult<()> {
        self.progress.set_message("writing script");
        self.progress.set_progress(85);
        let Some(assembled) = &self.assembled else {
            self.stage = TaskStage::Done;
            return Ok(());
        };
        assembled.script.write_to_disk(&self.script_path)?;
        self.outcome.script_path = Some(self.script_path.clone());
        self.stage = TaskStage::PostProcess;
        Ok(())
    }

    fn step_post_process(&mut self) {
        self.progress.set_message("post-processing");
        self.progress.set_progress(95);
        self.stage = TaskStage::Tag;
        if !self.options().post_process_script {
            return;
        }
        let Some(hook) = self.post_processor else {
            return;
        };
        if let Err(err) = hook.post_process(&self.script_path) {
            // The script stays on disk regardless.
            tracing::warn!(error = %err, "script post-processor failed");
            self.outcome
                .warnings
                .push(format!("post-processor failed: {err}"));
        }
    }

    fn step_tag(&mut self) {
        self.progress.set_progress(100);
        self.stage = TaskStage::Done;
        let Some(item) = self.target.item() else {
            return;
        };
        let Some(assembled) = &self.assembled else {
            return;
        };
        let descriptor = format_descriptor(&assembled.format);
        let script_path = self.script_path.display().to_string();
        let script_annotations = (!self.options().annotations_pre_comp_paths.is_empty())
            .then(|| script_path.clone());
        let fields = ExportTagFields {
            preset_id: self.preset.id.clone(),
            preset_name: self.preset.name.clone(),
            script_path,
            path_template: self.script_template.clone(),
            write_paths: assembled.write_paths.clone(),
            formats: assembled.write_paths.iter().map(|_| descriptor.clone()).collect(),
            start_frame: assembled.first_frame,
            duration: assembled.last_frame - assembled.first_frame + 1,
            start_handle: self.handles.0,
            end_handle: self.handles.1,
            applied_retimes: assembled.applied_retimes,
            source_retime: item.playback_speed,
            frame_offset: assembled.first_frame - (item.timeline_in - self.handles.0),
            localtime: self.localtime.clone(),
            script_annotations,
        };
        self.outcome.tag = Some(build_export_tag(&fields));
    }

    fn make_resolver(&self) -> PathResolver {
        let sequence = self.target.sequence();
        let mut resolver = match self.target {
            ExportTarget::Item {
                sequence,
                item_guid,
            } => match sequence.find_item(item_guid) {
                Some((track_idx, item)) => {
                    PathResolver::for_item(sequence, &sequence.tracks[track_idx], item)
                }
                None => PathResolver::for_sequence(sequence),
            },
            ExportTarget::Sequence(_) => PathResolver::for_sequence(sequence),
        };
        resolver.set_entry("version", self.options().version.clone());
        resolver.set_entry("ext", self.options().license_mode.script_extension());
        resolver
    }
}

/// Force the script extension the license allows.
pub fn normalize_script_extension(path: &Path, license: LicenseMode) -> PathBuf {
    path.with_extension(license.script_extension())
}

/// Attach the export-artifact tag to the original item, replacing any
/// earlier tag from the same preset.
pub fn apply_export_tag(item: &mut TrackItem, tag: Tag) {
    merge_export_tag(&mut item.tags, tag);
}

/// Human-readable format note recorded on tags.
fn format_descriptor(format: &Format) -> String {
    let mut out = format!("{}x{}", format.width, format.height);
    if !format.name.is_empty() {
        out.push(' ');
        out.push_str(&format.name);
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/export/driver.rs"]
mod tests;
