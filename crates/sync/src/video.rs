//! Per-item state for the publish pipeline
//!
//! A [`VideoItem`] is created per pipeline run, owned by that run, and
//! discarded once the item is published or updated. The local media file is
//! deleted in all terminal paths, success or failure.

use crate::gateway::Location;
use crate::platform::TagPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest path component generated from a title
const MAX_SLUG_LEN: usize = 30;

/// Description lines kept before truncation
const MAX_DESCRIPTION_LINES: usize = 10;

/// Source metadata for an item; absent for a record-only reprocess where
/// the platform no longer serves the item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SourceVideoMetadata {
    /// Best thumbnail the platform serves for this item
    pub source_thumbnail_url: Option<String>,
    pub default_language: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub tags: Vec<String>,
    /// Platform category, already mapped to a human-readable tag
    pub category: Option<String>,
    pub duration_secs: f64,
}

/// One content item moving through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoItem {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Unix timestamp of the original publication
    pub published_at: i64,
    pub source_channel_id: String,
    /// Canonical URL of the item on the source platform
    pub source_url: String,
    /// Base directory under which per-item media directories are created
    pub dir: PathBuf,
    /// Local media size; known only after download, or resolved from the
    /// claim during reprocess.
    pub size: Option<u64>,
    /// Set once the thumbnail has been mirrored
    pub thumbnail_url: Option<String>,
    pub metadata: Option<SourceVideoMetadata>,
}

/// Languages, locations and tags resolved for claim metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedMetadata {
    pub languages: Vec<String>,
    pub locations: Vec<Location>,
    pub tags: Vec<String>,
}

impl VideoItem {
    /// Directory holding this item's media file
    pub fn video_dir(&self) -> PathBuf {
        self.dir.join(&self.id)
    }

    /// Deterministic local path for the downloaded media.
    ///
    /// Derived from the title slug; an all-symbol title slugs to nothing and
    /// falls back to the raw source id.
    pub fn full_path(&self) -> PathBuf {
        let slug = title_slug(&self.title);
        let name = if slug.is_empty() { &self.id } else { &slug };
        self.video_dir().join(format!("{}.mp4", name))
    }

    /// Description with long bodies truncated and a source backlink appended
    pub fn abbreviated_description(&self) -> String {
        let description = self.description.trim();
        if description.matches('\n').count() < MAX_DESCRIPTION_LINES {
            return description.to_string();
        }
        let kept: Vec<&str> = description.lines().take(MAX_DESCRIPTION_LINES).collect();
        format!("{}\n...\n{}", kept.join("\n"), self.source_url)
    }

    /// Resolve languages, locations and tags for claim metadata.
    ///
    /// Tags pass through the external sanitation policy; a record-only item
    /// without source metadata resolves to sanitized-empty everything.
    pub fn resolve_metadata(&self, policy: &dyn TagPolicy) -> ResolvedMetadata {
        let mut resolved = ResolvedMetadata::default();
        let raw_tags = match &self.metadata {
            Some(meta) => {
                if let Some(language) = &meta.default_language {
                    resolved.languages.push(language.clone());
                }
                if let (Some(lat), Some(long)) = (meta.latitude, meta.longitude) {
                    resolved.locations.push(Location {
                        latitude: Some(format!("{:.7}", lat)),
                        longitude: Some(format!("{:.7}", long)),
                        ..Default::default()
                    });
                }
                meta.tags.clone()
            }
            None => Vec::new(),
        };
        resolved.tags = policy.sanitize(raw_tags, &self.source_channel_id);
        if let Some(category) = self.metadata.as_ref().and_then(|m| m.category.clone()) {
            resolved.tags.push(category);
        }
        resolved
    }
}

/// Slug a title into a filesystem/claim-name component: lowercase,
/// non-alphanumeric runs collapsed to `-`, whole chunks added until the
/// next one would push past the length budget.
pub fn title_slug(title: &str) -> String {
    let mut collapsed = String::with_capacity(title.len());
    let mut last_was_sep = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            collapsed.extend(c.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            collapsed.push('-');
            last_was_sep = true;
        }
    }
    let collapsed = collapsed.trim_matches('-');
    if collapsed.is_empty() {
        return String::new();
    }

    let mut chunks = collapsed.split('-');
    let first = chunks.next().unwrap_or_default();
    let mut name: String = first.chars().take(MAX_SLUG_LEN).collect();
    for chunk in chunks {
        if name.len() + 1 + chunk.len() > MAX_SLUG_LEN {
            break;
        }
        name.push('-');
        name.push_str(chunk);
    }
    name
}

/// Map legacy language codes the ledger rejects to their current form
pub fn normalize_language(code: &str) -> &str {
    match code {
        "iw" => "he",
        other => other,
    }
}
