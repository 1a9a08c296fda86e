//! Media metadata model: streams, chapters, and per-file information.
//!
//! All types here are passive snapshots produced by a probe call. Edits never
//! mutate in place; the chapter editor returns fresh sequences.

use crate::timecode::serde_secs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Snapshot of one stream inside a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Position of the stream within its kind, 0-based. This matches ffmpeg
    /// stream specifiers: the second audio stream is `0:a:1`.
    pub index: u32,
    /// Stream kind.
    pub kind: StreamKind,
    /// Codec name as reported by the probe (e.g. "h264", "aac", "subrip").
    pub codec: String,
    /// ISO 639 language tag, when the container carries one.
    pub language: Option<String>,
    /// Stream title, when present.
    pub title: Option<String>,
    /// Whether this is the default stream of its kind.
    pub default: bool,
    /// Whether this stream is flagged forced (subtitles).
    pub forced: bool,
    /// Width in pixels (video only).
    pub width: Option<u32>,
    /// Height in pixels (video only).
    pub height: Option<u32>,
    /// Channel count (audio only).
    pub channels: Option<u32>,
}

/// One chapter in a file's chapter sequence.
///
/// Indices are always contiguous from 0 in start-time order; `start < end`
/// and entries never overlap (touching boundaries are fine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub index: u32,
    #[serde(with = "serde_secs")]
    pub start: Duration,
    #[serde(with = "serde_secs")]
    pub end: Duration,
    pub title: String,
}

impl ChapterEntry {
    /// Create an entry with a placeholder index; the chapter editor assigns
    /// real indices when the entry joins a sequence.
    pub fn new(start: Duration, end: Duration, title: impl Into<String>) -> Self {
        Self {
            index: 0,
            start,
            end,
            title: title.into(),
        }
    }
}

/// Selects one stream of a kind, by kind-relative index or language tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackSelector {
    Index(u32),
    Language(String),
}

impl std::fmt::Display for TrackSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "index {i}"),
            Self::Language(l) => write!(f, "language {l}"),
        }
    }
}

impl TrackSelector {
    fn matches(&self, stream: &StreamInfo) -> bool {
        match self {
            Self::Index(i) => stream.index == *i,
            Self::Language(lang) => stream
                .language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(lang)),
        }
    }
}

/// Information about a media file, produced fresh by each probe call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFileInfo {
    /// Path to the media file.
    pub path: PathBuf,
    /// Container format name (e.g. "matroska,webm", "mov,mp4,m4a,3gp,3g2,mj2").
    pub container: String,
    /// File size in bytes.
    pub size: u64,
    /// Total duration, when the container reports one.
    #[serde(default, with = "crate::timecode::serde_secs_opt")]
    pub duration: Option<Duration>,
    /// Overall bit rate in bits per second, when reported.
    pub bit_rate: Option<u64>,
    /// Streams in original file order.
    pub streams: Vec<StreamInfo>,
    /// Chapter sequence, ordered by start time.
    pub chapters: Vec<ChapterEntry>,
}

impl MediaFileInfo {
    /// Iterate over streams of one kind, in file order.
    pub fn streams_of(&self, kind: StreamKind) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    /// Get the first video stream.
    pub fn primary_video(&self) -> Option<&StreamInfo> {
        self.streams_of(StreamKind::Video).next()
    }

    /// Number of audio streams.
    pub fn audio_count(&self) -> usize {
        self.streams_of(StreamKind::Audio).count()
    }

    /// Number of subtitle streams.
    pub fn subtitle_count(&self) -> usize {
        self.streams_of(StreamKind::Subtitle).count()
    }

    /// Find an audio stream matching the selector.
    pub fn find_audio(&self, selector: &TrackSelector) -> Option<&StreamInfo> {
        self.streams_of(StreamKind::Audio)
            .find(|s| selector.matches(s))
    }

    /// Find a subtitle stream matching the selector.
    pub fn find_subtitle(&self, selector: &TrackSelector) -> Option<&StreamInfo> {
        self.streams_of(StreamKind::Subtitle)
            .find(|s| selector.matches(s))
    }
}
