use std::path::Path;

use crate::{
    foundation::core::FrameSpan,
    foundation::error::{ShotgraphError, ShotgraphResult},
    timeline::tags::Tag,
};

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
/// An image format: dimensions, pixel aspect and a display name.
pub struct Format {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel aspect ratio (1.0 for square pixels).
    #[serde(default = "default_pixel_aspect")]
    pub pixel_aspect: f64,
    /// Display name ("HD_1080" etc). May be empty.
    #[serde(default)]
    pub name: String,
}

fn default_pixel_aspect() -> f64 {
    1.0
}

impl Format {
    /// Pixel area, used when deciding whether one format is "larger".
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ShotgraphError::validation("format width/height must be > 0"));
        }
        if !self.pixel_aspect.is_finite() || self.pixel_aspect <= 0.0 {
            return Err(ShotgraphError::validation(
                "format pixel_aspect must be finite and > 0",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// An addressable piece of media on disk.
pub struct MediaSource {
    /// File path; frame sequences carry `####`-style padding.
    pub path: String,
    /// Whether the media is reachable. Offline media can short-circuit a task.
    #[serde(default = "default_true")]
    pub online: bool,
}

fn default_true() -> bool {
    true
}

impl MediaSource {
    /// File stem without directory or extension, used by the `{filename}` token.
    pub fn filename_stem(&self) -> String {
        Path::new(&self.path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A clip wraps a media source with format, rate and addressing information.
pub struct Clip {
    /// Clip name for authoring/debugging.
    pub name: String,
    /// The underlying media.
    pub media: MediaSource,
    /// Native image format of the media.
    pub format: Format,
    /// Native frame rate; `None` (or an invalid rate) falls back to the
    /// parent sequence rate.
    #[serde(default)]
    pub framerate: Option<crate::foundation::core::Fps>,
    /// Timecode of the clip's first media frame, in frames.
    #[serde(default)]
    pub timecode_start: i64,
    /// Total media length in frames.
    pub duration: i64,
    /// The clip's own first frame number in media space.
    #[serde(default)]
    pub source_in: i64,
    /// Colorspace the media was written in, when the host knows it.
    #[serde(default)]
    pub colorspace: Option<String>,
}

impl Clip {
    /// Last addressable media frame in clip-relative space.
    pub fn last_frame(&self) -> i64 {
        self.duration - 1
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        self.format.validate()?;
        if self.duration <= 0 {
            return Err(ShotgraphError::validation(format!(
                "clip '{}' duration must be > 0",
                self.name
            )));
        }
        if self.media.path.is_empty() {
            return Err(ShotgraphError::validation(format!(
                "clip '{}' has an empty media path",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
/// How an item adapts its source format to the sequence format.
pub enum ItemReformatState {
    /// No adaption; the source format passes through.
    Disabled,
    /// Scale to fit the sequence format.
    #[default]
    ToSequence,
    /// Free scale set on the item itself.
    Scale,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// One edit on a track: a source range of a clip placed on the timeline.
///
/// `timeline_in..=timeline_out` and `source_in..=source_out` are both
/// inclusive; `source_*` is clip-relative (frame 0 is the clip's first
/// frame). `playback_speed` is signed and 0 means a freeze frame.
pub struct TrackItem {
    /// Stable identifier used for cross-references.
    pub guid: String,
    /// Shot name; collation by name matches on this.
    pub name: String,
    /// First frame occupied on the timeline.
    pub timeline_in: i64,
    /// Last frame occupied on the timeline.
    pub timeline_out: i64,
    /// First source frame of the cut, clip-relative.
    pub source_in: i64,
    /// Last source frame of the cut, clip-relative.
    pub source_out: i64,
    /// Signed playback speed; 1.0 plays straight, 0.0 freezes.
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,
    /// Source-to-sequence format adaption state.
    #[serde(default)]
    pub reformat_state: ItemReformatState,
    /// Disabled items do not render.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The clip this item cuts into.
    pub source: Clip,
    /// Tags attached to this item (export artifacts land here).
    #[serde(default)]
    pub tags: Vec<Tag>,
}

fn default_playback_speed() -> f64 {
    1.0
}

impl TrackItem {
    /// Frames occupied on the timeline.
    pub fn duration(&self) -> i64 {
        self.timeline_out - self.timeline_in + 1
    }

    /// Frames of source media covered by the cut.
    pub fn source_duration(&self) -> i64 {
        self.source_out - self.source_in + 1
    }

    /// Timeline placement as a span.
    pub fn timeline_span(&self) -> FrameSpan {
        FrameSpan {
            first: self.timeline_in,
            last: self.timeline_out,
        }
    }

    /// Source cut in absolute media frames (clip addressing applied).
    pub fn source_span_absolute(&self) -> FrameSpan {
        FrameSpan {
            first: self.source.source_in + self.source_in,
            last: self.source.source_in + self.source_out,
        }
    }

    /// Media slack available before the cut, in frames.
    pub fn handle_in_length(&self) -> i64 {
        self.source_in.max(0)
    }

    /// Media slack available after the cut, in frames.
    pub fn handle_out_length(&self) -> i64 {
        (self.source.last_frame() - self.source_out).max(0)
    }

    /// A freeze frame holds one source frame for the whole item.
    pub fn is_freeze(&self) -> bool {
        self.playback_speed == 0.0
    }

    /// Whether playback deviates from straight forward speed.
    pub fn is_retimed(&self) -> bool {
        !self.is_freeze() && self.playback_speed != 1.0
    }

    /// Map a clip-relative source frame to its timeline frame.
    ///
    /// Freeze frames collapse onto `timeline_in`; reversed items map the
    /// source range back-to-front.
    pub fn map_source_to_timeline(&self, source_frame: i64) -> i64 {
        if self.is_freeze() {
            return self.timeline_in;
        }
        let progress = if self.playback_speed < 0.0 {
            self.source_out - source_frame
        } else {
            source_frame - self.source_in
        };
        self.timeline_in + ((progress as f64) / self.playback_speed.abs()).floor() as i64
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if self.guid.is_empty() {
            return Err(ShotgraphError::validation(format!(
                "item '{}' must carry a guid",
                self.name
            )));
        }
        if self.timeline_in > self.timeline_out {
            return Err(ShotgraphError::validation(format!(
                "item '{}' timeline range is reversed ({}..{})",
                self.name, self.timeline_in, self.timeline_out
            )));
        }
        if self.source_in > self.source_out {
            return Err(ShotgraphError::validation(format!(
                "item '{}' source range is reversed ({}..{}); reversed playback \
                 is expressed through a negative speed",
                self.name, self.source_in, self.source_out
            )));
        }
        if self.source_in < 0 {
            return Err(ShotgraphError::validation(format!(
                "item '{}' source_in must be >= 0",
                self.name
            )));
        }
        if !self.playback_speed.is_finite() {
            return Err(ShotgraphError::validation(format!(
                "item '{}' playback_speed must be finite",
                self.name
            )));
        }
        if self.source_out > self.source.last_frame() {
            return Err(ShotgraphError::validation(format!(
                "item '{}' source_out {} exceeds clip media range 0..{}",
                self.name,
                self.source_out,
                self.source.last_frame()
            )));
        }
        self.source.validate()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/item.rs"]
mod tests;
