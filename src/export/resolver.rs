use std::collections::BTreeMap;

use crate::{
    foundation::error::{ShotgraphError, ShotgraphResult},
    timeline::item::TrackItem,
    timeline::model::{Sequence, Track},
};

/// Expands `{token}` references in path templates.
///
/// The standard tokens are `{shot}`, `{clip}`, `{track}`, `{sequence}`,
/// `{event}`, `{fps}`, `{filename}`, `{version}` and `{ext}`; presets and
/// tasks may add custom entries on top.
#[derive(Clone, Debug, Default)]
pub struct PathResolver {
    entries: BTreeMap<String, String>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver for a track-item export.
    pub fn for_item(sequence: &Sequence, track: &Track, item: &TrackItem) -> Self {
        let mut resolver = Self::for_sequence(sequence);
        resolver.set_entry("shot", item.name.clone());
        resolver.set_entry("clip", item.source.name.clone());
        resolver.set_entry("track", track.name.clone());
        resolver.set_entry("filename", item.source.media.filename_stem());
        if let Some(event) = track.event_number(&item.guid) {
            resolver.set_entry("event", event.to_string());
        }
        resolver
    }

    /// Resolver for a whole-sequence export.
    pub fn for_sequence(sequence: &Sequence) -> Self {
        let mut resolver = Self::new();
        resolver.set_entry("sequence", sequence.name.clone());
        resolver.set_entry("fps", sequence.framerate.script_value());
        resolver.set_entry("version", "v1".to_owned());
        resolver.set_entry("ext", "nk".to_owned());
        resolver
    }

    pub fn set_entry(&mut self, token: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(token.into(), value.into());
    }

    pub fn entry(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(String::as_str)
    }

    /// Expand every token in `path`. Unknown or unterminated tokens are
    /// resolve errors naming the offender.
    pub fn resolve(&self, path: &str) -> ShotgraphResult<String> {
        let mut out = String::with_capacity(path.len());
        let mut rest = path;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(ShotgraphError::resolve(format!(
                    "unterminated token in path '{path}'"
                )));
            };
            let token = &after[..close];
            match self.entries.get(token) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(ShotgraphError::resolve(format!(
                        "unknown token '{{{token}}}' in path '{path}'"
                    )));
                }
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/resolver.rs"]
mod tests;
