//! HTTP clients for the external sync collaborators
//!
//! Three REST services back the trait seams in [`crate::platform`] and
//! [`crate::records`]: the source-platform data API, the thumbnail mirror
//! and the sync record store. Decoding is lenient the same way the wallet
//! gateway's is: unknown fields are ignored and missing optionals map to
//! `None` rather than an error.

use crate::platform::{
    ChannelSnippet, PlatformError, SourceFormat, SourceMediaInfo, SourcePlatform, ThumbnailMirror,
};
use crate::records::{ChannelRecord, RecordError, RecordStore, SyncedVideoRecord};
use crate::video::{SourceVideoMetadata, VideoItem};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// REST client for the source-platform data API
pub struct RemoteSourcePlatform {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    /// Base directory items download into
    videos_dir: PathBuf,
}

impl RemoteSourcePlatform {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, videos_dir: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url.into()),
            api_key: api_key.into(),
            videos_dir,
        }
    }

    async fn get(&self, path: &str) -> Result<Value, PlatformError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "{} replied {}",
                path,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PlatformError::Api(e.to_string()))
    }
}

#[async_trait]
impl SourcePlatform for RemoteSourcePlatform {
    async fn video_count(&self, channel_id: &str) -> Result<u64, PlatformError> {
        let result = self.get(&format!("/channels/{}", channel_id)).await?;
        result
            .get("video_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| PlatformError::Api("channel reply has no video_count".to_string()))
    }

    async fn list_videos(
        &self,
        channel_id: &str,
        limit: u64,
    ) -> Result<Vec<VideoItem>, PlatformError> {
        let result = self
            .get(&format!("/channels/{}/videos?limit={}", channel_id, limit))
            .await?;
        let items = result
            .get("items")
            .and_then(Value::as_array)
            .or_else(|| result.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| parse_video_item(item, channel_id, &self.videos_dir))
                    .collect()
            })
            .unwrap_or_default();
        Ok(items)
    }

    async fn channel_snippet(
        &self,
        channel_id: &str,
    ) -> Result<Option<ChannelSnippet>, PlatformError> {
        let result = match self.get(&format!("/channels/{}/snippet", channel_id)).await {
            Ok(result) => result,
            Err(PlatformError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(parse_snippet(&result))
    }

    async fn media_info(&self, video_id: &str) -> Result<SourceMediaInfo, PlatformError> {
        let result = self.get(&format!("/videos/{}/formats", video_id)).await?;
        Ok(parse_media_info(&result))
    }

    async fn download_format(
        &self,
        video_id: &str,
        format: &SourceFormat,
        dest: &Path,
    ) -> Result<(), PlatformError> {
        let response = self
            .client
            .get(format!(
                "{}/videos/{}/download?format={}",
                self.base_url, video_id, format.id
            ))
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PlatformError::NotFound(video_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "download of {} replied {}",
                video_id,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        std::fs::write(dest, &bytes)?;
        Ok(())
    }
}

/// REST client for the thumbnail mirror service
pub struct RemoteThumbnailMirror {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteThumbnailMirror {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url.into()),
        }
    }
}

#[async_trait]
impl ThumbnailMirror for RemoteThumbnailMirror {
    async fn mirror(&self, source_url: &str, key: &str) -> Result<String, PlatformError> {
        let response = self
            .client
            .post(format!("{}/thumbnails", self.base_url))
            .json(&json!({"source_url": source_url, "name": key}))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PlatformError::Api(format!(
                "thumbnail mirror replied {}",
                response.status()
            )));
        }
        let reply: Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Api(e.to_string()))?;
        reply
            .get("url")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| PlatformError::Api("mirror reply has no url".to_string()))
    }
}

/// REST client for the sync record store
pub struct RemoteRecordStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl RemoteRecordStore {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: trim_base(base_url.into()),
            auth_token: auth_token.into(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value, RecordError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
            .send()
            .await
            .map_err(|e| RecordError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RecordError::Api(format!(
                "{} replied {}",
                path,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| RecordError::Api(e.to_string()))
    }

    async fn put(&self, path: &str, body: Value) -> Result<(), RecordError> {
        let response = self
            .client
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RecordError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RecordError::Api(format!(
                "{} replied {}",
                path,
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn synced_videos(
        &self,
        channel_id: &str,
    ) -> Result<Vec<SyncedVideoRecord>, RecordError> {
        let result = self.get(&format!("/channels/{}/videos", channel_id)).await?;
        let items = result
            .get("items")
            .cloned()
            .unwrap_or_else(|| result.clone());
        serde_json::from_value(items).map_err(|e| RecordError::Api(e.to_string()))
    }

    async fn channel_record(&self, channel_id: &str) -> Result<ChannelRecord, RecordError> {
        let result = self.get(&format!("/channels/{}", channel_id)).await?;
        serde_json::from_value(result).map_err(|e| RecordError::Api(e.to_string()))
    }

    async fn set_channel_claim_id(
        &self,
        channel_id: &str,
        claim_id: &str,
    ) -> Result<(), RecordError> {
        self.put(
            &format!("/channels/{}/claim", channel_id),
            json!({"claim_id": claim_id}),
        )
        .await
    }

    async fn set_video_record(
        &self,
        channel_id: &str,
        record: &SyncedVideoRecord,
    ) -> Result<(), RecordError> {
        let body = serde_json::to_value(record).map_err(|e| RecordError::Api(e.to_string()))?;
        self.put(
            &format!("/channels/{}/videos/{}", channel_id, record.video_id),
            body,
        )
        .await
    }
}

fn trim_base(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn parse_video_item(item: &Value, channel_id: &str, videos_dir: &Path) -> Option<VideoItem> {
    let id = item.get("id")?.as_str()?.to_string();
    Some(VideoItem {
        title: item
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: item
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        published_at: item
            .get("published_at")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        source_channel_id: channel_id.to_string(),
        source_url: item
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        dir: videos_dir.to_path_buf(),
        size: None,
        thumbnail_url: None,
        metadata: Some(parse_video_metadata(item)),
        id,
    })
}

fn parse_video_metadata(item: &Value) -> SourceVideoMetadata {
    SourceVideoMetadata {
        source_thumbnail_url: item
            .get("thumbnail_url")
            .and_then(Value::as_str)
            .map(String::from),
        default_language: item
            .get("language")
            .and_then(Value::as_str)
            .map(String::from),
        latitude: item.pointer("/location/latitude").and_then(Value::as_f64),
        longitude: item.pointer("/location/longitude").and_then(Value::as_f64),
        tags: item
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default(),
        category: item.get("category").and_then(Value::as_str).map(String::from),
        duration_secs: item
            .get("duration_secs")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    }
}

fn parse_snippet(result: &Value) -> Option<ChannelSnippet> {
    Some(ChannelSnippet {
        title: result.get("title")?.as_str()?.to_string(),
        description: result
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        thumbnail_url: result
            .get("thumbnail_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        banner_url: result
            .get("banner_url")
            .and_then(Value::as_str)
            .map(String::from),
        default_language: result
            .get("language")
            .and_then(Value::as_str)
            .map(String::from),
        country: result
            .get("country")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

fn parse_media_info(result: &Value) -> SourceMediaInfo {
    SourceMediaInfo {
        duration_secs: result
            .get("duration_secs")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        formats: result
            .get("formats")
            .and_then(Value::as_array)
            .map(|formats| {
                formats
                    .iter()
                    .filter_map(|f| {
                        Some(SourceFormat {
                            id: f.get("id")?.as_str()?.to_string(),
                            codec: f
                                .get("codec")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            container: f
                                .get("container")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
    }
}
