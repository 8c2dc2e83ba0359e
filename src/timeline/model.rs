use crate::{
    foundation::core::{Fps, FrameSpan},
    foundation::error::{ShotgraphError, ShotgraphResult},
    timeline::effects::{Annotation, SoftEffect},
    timeline::item::{Format, TrackItem},
    timeline::tags::Tag,
};

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A named view (colour channel) used for stereo/multi-view timelines.
pub struct ViewInfo {
    /// View name ("left", "right", "main"...).
    pub name: String,
    /// Display colour as `#rrggbb`.
    #[serde(default = "default_view_color")]
    pub color: String,
    /// Whether this is the hero view.
    #[serde(default)]
    pub hero: bool,
}

fn default_view_color() -> String {
    "#ffffff".to_owned()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Shape of a transition, derived from which sides it references.
pub enum TransitionKind {
    /// Both sides present: crossfade between two items.
    Dissolve,
    /// Only an incoming item: fade from black.
    FadeIn,
    /// Only an outgoing item: fade to black.
    FadeOut,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A transition spanning the boundary between two items (or one item and
/// black). Referenced items live on the same track.
pub struct Transition {
    /// Stable identifier.
    pub guid: String,
    /// Guid of the outgoing item, when present.
    #[serde(default)]
    pub from_item: Option<String>,
    /// Guid of the incoming item, when present.
    #[serde(default)]
    pub to_item: Option<String>,
    /// First timeline frame covered.
    pub timeline_in: i64,
    /// Last timeline frame covered.
    pub timeline_out: i64,
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match (&self.from_item, &self.to_item) {
            (Some(_), Some(_)) => TransitionKind::Dissolve,
            (None, Some(_)) => TransitionKind::FadeIn,
            _ => TransitionKind::FadeOut,
        }
    }

    pub fn timeline_span(&self) -> FrameSpan {
        FrameSpan {
            first: self.timeline_in,
            last: self.timeline_out,
        }
    }

    /// Frames the transition covers.
    pub fn duration(&self) -> i64 {
        self.timeline_out - self.timeline_in + 1
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        if self.from_item.is_none() && self.to_item.is_none() {
            return Err(ShotgraphError::validation(format!(
                "transition '{}' references no items",
                self.guid
            )));
        }
        if self.timeline_in > self.timeline_out {
            return Err(ShotgraphError::validation(format!(
                "transition '{}' timeline range is reversed",
                self.guid
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
/// One sub-track channel: soft effects and annotations riding above the
/// items of their parent track.
pub struct SubTrack {
    /// Soft effects on this channel.
    #[serde(default)]
    pub effects: Vec<SoftEffect>,
    /// Annotations on this channel.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A video track: ordered items plus sub-track channels.
pub struct Track {
    /// Stable identifier.
    pub guid: String,
    /// Track name ("Video 1"...).
    pub name: String,
    /// View this track belongs to, for multi-view timelines.
    #[serde(default)]
    pub view: Option<String>,
    /// Optional compositing blend mode for this track.
    #[serde(default)]
    pub blend_mode: Option<String>,
    /// Whether blending is active.
    #[serde(default)]
    pub blend_enabled: bool,
    /// Whether the blend masks through the alpha of the track below.
    #[serde(default)]
    pub mask_enabled: bool,
    /// Disabled tracks do not render.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Items in timeline order.
    #[serde(default)]
    pub items: Vec<TrackItem>,
    /// Sub-track channels (effects/annotations).
    #[serde(default)]
    pub subtracks: Vec<SubTrack>,
    /// Transitions between items on this track.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

fn default_true() -> bool {
    true
}

impl Track {
    pub fn item(&self, guid: &str) -> Option<&TrackItem> {
        self.items.iter().find(|i| i.guid == guid)
    }

    /// 1-based editorial event number of an item on this track.
    pub fn event_number(&self, guid: &str) -> Option<usize> {
        self.items.iter().position(|i| i.guid == guid).map(|p| p + 1)
    }

    pub fn all_effects(&self) -> impl Iterator<Item = &SoftEffect> {
        self.subtracks.iter().flat_map(|s| s.effects.iter())
    }

    pub fn all_annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.subtracks.iter().flat_map(|s| s.annotations.iter())
    }

    /// Effects linked to the given item, in sub-track order.
    pub fn linked_effects_of(&self, item_guid: &str) -> Vec<&SoftEffect> {
        self.all_effects()
            .filter(|e| e.linked_item.as_deref() == Some(item_guid))
            .collect()
    }

    /// Annotations linked to the given item, in sub-track order.
    pub fn linked_annotations_of(&self, item_guid: &str) -> Vec<&Annotation> {
        self.all_annotations()
            .filter(|a| a.linked_item.as_deref() == Some(item_guid))
            .collect()
    }

    /// Transition whose incoming side is the given item.
    pub fn transition_into(&self, item_guid: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.to_item.as_deref() == Some(item_guid))
    }

    /// Transition whose outgoing side is the given item.
    pub fn transition_out_of(&self, item_guid: &str) -> Option<&Transition> {
        self.transitions
            .iter()
            .find(|t| t.from_item.as_deref() == Some(item_guid))
    }

    /// A pure sub-track track carries no items, only effects/annotations.
    pub fn has_only_subtrack_items(&self) -> bool {
        self.items.is_empty()
            && self.subtracks.iter().any(|s| !s.effects.is_empty() || !s.annotations.is_empty())
    }

    /// Bounding timeline span of the items on this track.
    pub fn timeline_extent(&self) -> Option<FrameSpan> {
        let first = self.items.iter().map(|i| i.timeline_in).min()?;
        let last = self.items.iter().map(|i| i.timeline_out).max()?;
        Some(FrameSpan { first, last })
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        for item in &self.items {
            item.validate()?;
        }
        for pair in self.items.windows(2) {
            if pair[1].timeline_in <= pair[0].timeline_out {
                return Err(ShotgraphError::validation(format!(
                    "track '{}': items '{}' and '{}' overlap ({}..{} vs {}..{})",
                    self.name,
                    pair[0].name,
                    pair[1].name,
                    pair[0].timeline_in,
                    pair[0].timeline_out,
                    pair[1].timeline_in,
                    pair[1].timeline_out,
                )));
            }
        }
        for transition in &self.transitions {
            transition.validate()?;
            for side in [&transition.from_item, &transition.to_item] {
                if let Some(guid) = side
                    && self.item(guid).is_none()
                {
                    return Err(ShotgraphError::validation(format!(
                        "transition '{}' references item '{}' not on track '{}'",
                        transition.guid, guid, self.name
                    )));
                }
            }
        }
        for subtrack in &self.subtracks {
            for effect in &subtrack.effects {
                effect.validate()?;
            }
            for annotation in &subtrack.annotations {
                annotation.validate()?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// A timeline: the arena every guid cross-reference resolves through.
pub struct Sequence {
    /// Stable identifier.
    pub guid: String,
    /// Sequence name; the `{sequence}` token resolves to this.
    pub name: String,
    /// Output format of the sequence.
    pub format: Format,
    /// Timeline frame rate.
    pub framerate: Fps,
    /// Whether timecode counts drop frames.
    #[serde(default)]
    pub drop_frame: bool,
    /// Timecode of timeline frame 0, in frames.
    #[serde(default)]
    pub timecode_start: i64,
    /// Optional in point restricting the export range.
    #[serde(default)]
    pub in_time: Option<i64>,
    /// Optional out point restricting the export range.
    #[serde(default)]
    pub out_time: Option<i64>,
    /// Views for stereo/multi-view timelines; empty means single-view.
    #[serde(default)]
    pub views: Vec<ViewInfo>,
    /// Video tracks, index 0 at the bottom of the stack.
    #[serde(default)]
    pub tracks: Vec<Track>,
    /// Tags attached to the sequence.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Sequence {
    /// Locate an item anywhere on the sequence.
    pub fn find_item(&self, guid: &str) -> Option<(usize, &TrackItem)> {
        self.tracks
            .iter()
            .enumerate()
            .find_map(|(idx, t)| t.item(guid).map(|i| (idx, i)))
    }

    pub fn track_of_item(&self, guid: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.item(guid).is_some())
    }

    /// Total timeline length in frames.
    pub fn duration(&self) -> i64 {
        self.tracks
            .iter()
            .flat_map(|t| t.items.iter())
            .map(|i| i.timeline_out + 1)
            .max()
            .unwrap_or(0)
    }

    /// View names, defaulting to the single "main" view when none are set.
    pub fn view_names(&self) -> Vec<String> {
        if self.views.is_empty() {
            vec!["main".to_owned()]
        } else {
            self.views.iter().map(|v| v.name.clone()).collect()
        }
    }

    pub fn hero_view(&self) -> Option<&ViewInfo> {
        self.views.iter().find(|v| v.hero)
    }

    pub fn validate(&self) -> ShotgraphResult<()> {
        self.format.validate()?;
        Fps::new(self.framerate.num, self.framerate.den)?;

        let mut seen_views = std::collections::BTreeSet::new();
        for view in &self.views {
            if view.name.is_empty() {
                return Err(ShotgraphError::validation("view names must be non-empty"));
            }
            if !seen_views.insert(view.name.as_str()) {
                return Err(ShotgraphError::validation(format!(
                    "duplicate view name '{}'",
                    view.name
                )));
            }
        }

        let mut seen_guids = std::collections::BTreeSet::new();
        for track in &self.tracks {
            track.validate()?;
            if let Some(view) = &track.view
                && !self.views.is_empty()
                && !self.views.iter().any(|v| &v.name == view)
            {
                return Err(ShotgraphError::validation(format!(
                    "track '{}' is assigned to unknown view '{}'",
                    track.name, view
                )));
            }
            for item in &track.items {
                if !seen_guids.insert(item.guid.as_str()) {
                    return Err(ShotgraphError::validation(format!(
                        "duplicate item guid '{}'",
                        item.guid
                    )));
                }
            }
        }

        if let (Some(in_time), Some(out_time)) = (self.in_time, self.out_time)
            && in_time > out_time
        {
            return Err(ShotgraphError::validation(format!(
                "sequence in/out points are reversed ({in_time}..{out_time})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/timeline/model.rs"]
mod tests;
