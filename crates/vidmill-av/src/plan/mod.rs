//! Command planning: maps operation requests onto ffmpeg argument vectors.
//!
//! Planning is pure. [`build`] never touches the filesystem or spawns
//! anything; it validates parameters, renders argument vectors (and the
//! contents of any scratch files the command needs), and leaves
//! materialization and execution to the caller. Identical input always
//! produces identical output, in the same order.

mod audio;
mod chapter;
mod subtitle;
mod video;

use crate::media::{ChapterEntry, MediaFileInfo, TrackSelector};
use crate::timecode::{serde_secs, serde_secs_opt};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use video::{FormatProfile, ResolutionProfile, RESOLUTION_LADDER};

// Per-operation execution ceilings.
pub(crate) const TIMEOUT_THUMBNAIL: Duration = Duration::from_secs(60);
pub(crate) const TIMEOUT_COPY: Duration = Duration::from_secs(300);
pub(crate) const TIMEOUT_TRANSFORM: Duration = Duration::from_secs(600);
pub(crate) const TIMEOUT_FILTER: Duration = Duration::from_secs(1800);
pub(crate) const TIMEOUT_ENCODE: Duration = Duration::from_secs(3600);

/// A half-open time range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "serde_secs")]
    pub start: Duration,
    #[serde(with = "serde_secs")]
    pub end: Duration,
}

/// Target container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    Mkv,
    Webm,
    Mov,
    Avi,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Webm => "webm",
            Self::Mov => "mov",
            Self::Avi => "avi",
        }
    }
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Target audio codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Ac3,
    Eac3,
    Mp3,
    Flac,
    Opus,
    Vorbis,
}

impl AudioCodec {
    /// Encoder name passed to `-c:a`.
    pub fn encoder(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Mp3 => "libmp3lame",
            Self::Flac => "flac",
            Self::Opus => "libopus",
            Self::Vorbis => "libvorbis",
        }
    }

    /// Standalone file extension for the codec.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::Opus => "opus",
            Self::Vorbis => "ogg",
        }
    }
}

/// Compression target formats, each mapped to a codec/container profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Hevc,
    Webm,
}

/// The fixed catalogue of media operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Remove the given ranges from the file, keeping the rest.
    Cut { ranges: Vec<TimeRange> },
    /// Keep only `[start, end)`, stream-copied.
    Trim {
        #[serde(with = "serde_secs")]
        start: Duration,
        #[serde(with = "serde_secs")]
        end: Duration,
    },
    /// Re-encode each range into its own `_partNNN` output file.
    SplitSegments { ranges: Vec<TimeRange> },
    /// Join all inputs into one file, optionally with crossfade transitions.
    Concat {
        container: Container,
        #[serde(default, with = "serde_secs_opt")]
        transition: Option<Duration>,
    },
    /// Produce a ladder of compressed renditions per target format.
    Compress {
        formats: Vec<OutputFormat>,
        #[serde(default)]
        keep_original_quality: bool,
        #[serde(default)]
        two_pass: bool,
    },
    /// Rewrap into another container without re-encoding.
    Remux { container: Container },
    /// Extract the audio track into a standalone file.
    AudioExtract {
        codec: AudioCodec,
        bitrate_kbps: u32,
    },
    /// Convert an audio file to another codec.
    AudioConvert {
        codec: AudioCodec,
        bitrate_kbps: u32,
    },
    /// Drop all audio streams.
    AudioRemove,
    /// Keep only the selected audio track.
    AudioChoose {
        selector: TrackSelector,
        #[serde(default)]
        make_default: bool,
    },
    /// Mux the second input's audio under the first input's video.
    MergeVideoAudio,
    /// Add a subtitle file as a soft track, or burn it into the video.
    SubtitleAdd {
        language: String,
        #[serde(default)]
        default: bool,
        #[serde(default)]
        forced: bool,
        #[serde(default)]
        burn: bool,
    },
    /// Keep only the selected subtitle track, or burn it in.
    SubtitleChoose {
        selector: TrackSelector,
        #[serde(default)]
        make_default: bool,
        #[serde(default)]
        burn: bool,
    },
    /// Extract every subtitle track into standalone files.
    SubtitleExtract,
    /// Drop all subtitle and attachment streams.
    SubtitleRemove,
    /// Capture a single frame as a JPEG.
    Thumbnail {
        #[serde(with = "serde_secs")]
        at: Duration,
        width: u32,
    },
    /// Merge a full chapter sequence into the file's metadata.
    WriteChapters { entries: Vec<ChapterEntry> },
    /// Add chapters to the probed sequence, then persist.
    ChapterAdd { entries: Vec<ChapterEntry> },
    /// Edit one probed chapter, then persist.
    ChapterEdit {
        index: usize,
        #[serde(default, with = "serde_secs_opt")]
        new_start: Option<Duration>,
        #[serde(default, with = "serde_secs_opt")]
        new_end: Option<Duration>,
        #[serde(default)]
        new_title: Option<String>,
    },
    /// Split one probed chapter at a point, then persist.
    ChapterSplit {
        index: usize,
        #[serde(with = "serde_secs")]
        at: Duration,
    },
    /// Remove one chapter (or all of them), then persist.
    ChapterRemove {
        #[serde(default)]
        index: Option<usize>,
    },
}

impl Operation {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cut { .. } => "cut",
            Self::Trim { .. } => "trim",
            Self::SplitSegments { .. } => "split_segments",
            Self::Concat { .. } => "concat",
            Self::Compress { .. } => "compress",
            Self::Remux { .. } => "remux",
            Self::AudioExtract { .. } => "audio_extract",
            Self::AudioConvert { .. } => "audio_convert",
            Self::AudioRemove => "audio_remove",
            Self::AudioChoose { .. } => "audio_choose",
            Self::MergeVideoAudio => "merge_video_audio",
            Self::SubtitleAdd { .. } => "subtitle_add",
            Self::SubtitleChoose { .. } => "subtitle_choose",
            Self::SubtitleExtract => "subtitle_extract",
            Self::SubtitleRemove => "subtitle_remove",
            Self::Thumbnail { .. } => "thumbnail",
            Self::WriteChapters { .. } => "write_chapters",
            Self::ChapterAdd { .. } => "chapter_add",
            Self::ChapterEdit { .. } => "chapter_edit",
            Self::ChapterSplit { .. } => "chapter_split",
            Self::ChapterRemove { .. } => "chapter_remove",
        }
    }

    /// Whether planning needs probe metadata for the primary input.
    pub fn needs_probe(&self) -> bool {
        matches!(
            self,
            Self::Cut { .. }
                | Self::Compress { .. }
                | Self::AudioChoose { .. }
                | Self::SubtitleAdd { burn: false, .. }
                | Self::SubtitleChoose { .. }
                | Self::SubtitleExtract
                | Self::ChapterAdd { .. }
                | Self::ChapterEdit { .. }
                | Self::ChapterSplit { .. }
                | Self::ChapterRemove { index: Some(_) }
        )
    }

    /// Whether planning needs probe metadata for every input.
    pub fn needs_source_probes(&self) -> bool {
        matches!(
            self,
            Self::Concat {
                transition: Some(_),
                ..
            }
        )
    }
}

/// One high-level request against a file (or files, for multi-input ops).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// Input path(s). The first is the primary input; merge and subtitle-add
    /// take the secondary stream from the second entry, concat uses them all.
    pub inputs: Vec<PathBuf>,
    /// Base name for the output artifact(s), extension-free.
    pub output_name: String,
    pub operation: Operation,
}

impl OperationRequest {
    /// The primary input path.
    pub fn input(&self) -> &Path {
        self.inputs
            .first()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }
}

/// A scratch file the command references; rendered at plan time and
/// materialized by the caller just before spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchFile {
    pub path: PathBuf,
    pub contents: String,
}

/// One argument vector ready for the executor, with its declared artifact
/// and timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCommand {
    /// Argument vector, program name excluded.
    pub args: Vec<String>,
    /// The artifact this command must produce; verified post-exit. `None`
    /// for commands with no artifact (e.g. a two-pass analysis pass).
    pub output: Option<PathBuf>,
    /// Scratch file the arguments reference, if any.
    pub scratch: Option<ScratchFile>,
    /// Execution ceiling for this command.
    pub timeout: Duration,
}

/// Ordered set of commands realizing one operation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandPlan {
    pub commands: Vec<PlannedCommand>,
}

impl CommandPlan {
    fn single(command: PlannedCommand) -> Self {
        Self {
            commands: vec![command],
        }
    }

    /// All declared artifacts, in command order.
    pub fn outputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.commands.iter().filter_map(|c| c.output.as_ref())
    }
}

/// Context the builder plans against. Probe data is supplied by the caller
/// for operations that validate track or chapter indices.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    /// Directory all artifacts and scratch files land in.
    pub output_dir: &'a Path,
    /// Probe of the primary input, when the operation needs one.
    pub media: Option<&'a MediaFileInfo>,
    /// Probes of all inputs, for concat transitions.
    pub sources: &'a [MediaFileInfo],
    /// Thread count hint forwarded to ffmpeg.
    pub threads: usize,
}

impl<'a> BuildContext<'a> {
    pub fn new(output_dir: &'a Path) -> Self {
        Self {
            output_dir,
            media: None,
            sources: &[],
            threads: 4,
        }
    }

    pub fn with_media(mut self, media: &'a MediaFileInfo) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_sources(mut self, sources: &'a [MediaFileInfo]) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    fn require_media(&self) -> Result<&'a MediaFileInfo> {
        self.media
            .ok_or_else(|| Error::invalid_parameters("operation requires probe metadata"))
    }
}

/// Build the command plan for a request.
///
/// # Errors
///
/// Returns [`Error::InvalidParameters`] for malformed or contradictory
/// parameters and [`Error::ChapterIndexOutOfRange`] for stale chapter
/// indices. Planning never spawns a process.
pub fn build(request: &OperationRequest, ctx: &BuildContext<'_>) -> Result<CommandPlan> {
    if request.inputs.is_empty() {
        return Err(Error::invalid_parameters("at least one input is required"));
    }
    if request.output_name.trim().is_empty() {
        return Err(Error::invalid_parameters("output name must not be empty"));
    }

    match &request.operation {
        Operation::Cut { ranges } => video::cut(request, ctx, ranges),
        Operation::Trim { start, end } => video::trim(request, ctx, *start, *end),
        Operation::SplitSegments { ranges } => video::split_segments(request, ctx, ranges),
        Operation::Concat {
            container,
            transition,
        } => video::concat(request, ctx, *container, *transition),
        Operation::Compress {
            formats,
            keep_original_quality,
            two_pass,
        } => video::compress(request, ctx, formats, *keep_original_quality, *two_pass),
        Operation::Remux { container } => video::remux(request, ctx, *container),
        Operation::Thumbnail { at, width } => video::thumbnail(request, ctx, *at, *width),
        Operation::AudioExtract {
            codec,
            bitrate_kbps,
        } => audio::extract(request, ctx, *codec, *bitrate_kbps),
        Operation::AudioConvert {
            codec,
            bitrate_kbps,
        } => audio::convert(request, ctx, *codec, *bitrate_kbps),
        Operation::AudioRemove => audio::remove(request, ctx),
        Operation::AudioChoose {
            selector,
            make_default,
        } => audio::choose(request, ctx, selector, *make_default),
        Operation::MergeVideoAudio => audio::merge_video_audio(request, ctx),
        Operation::SubtitleAdd {
            language,
            default,
            forced,
            burn,
        } => subtitle::add(request, ctx, language, *default, *forced, *burn),
        Operation::SubtitleChoose {
            selector,
            make_default,
            burn,
        } => subtitle::choose(request, ctx, selector, *make_default, *burn),
        Operation::SubtitleExtract => subtitle::extract(request, ctx),
        Operation::SubtitleRemove => subtitle::remove(request, ctx),
        Operation::WriteChapters { entries } => chapter::write(request, ctx, entries),
        Operation::ChapterAdd { entries } => chapter::add(request, ctx, entries),
        Operation::ChapterEdit {
            index,
            new_start,
            new_end,
            new_title,
        } => chapter::edit(request, ctx, *index, *new_start, *new_end, new_title.as_deref()),
        Operation::ChapterSplit { index, at } => chapter::split(request, ctx, *index, *at),
        Operation::ChapterRemove { index } => chapter::remove(request, ctx, *index),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers for the builder submodules
// ---------------------------------------------------------------------------

pub(crate) fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn push_strs(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Require exactly `n` inputs for the operation.
pub(crate) fn expect_inputs<'r>(request: &'r OperationRequest, n: usize) -> Result<&'r [PathBuf]> {
    if request.inputs.len() != n {
        return Err(Error::invalid_parameters(format!(
            "{} expects {} input(s), got {}",
            request.operation.kind(),
            n,
            request.inputs.len()
        )));
    }
    Ok(&request.inputs)
}

/// Output path carrying the primary input's extension.
pub(crate) fn output_like_input(ctx: &BuildContext<'_>, request: &OperationRequest) -> PathBuf {
    let ext = request
        .input()
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    ctx.output_dir
        .join(format!("{}{}", request.output_name, ext))
}

/// Output path with an explicit extension.
pub(crate) fn output_with_ext(
    ctx: &BuildContext<'_>,
    request: &OperationRequest,
    ext: &str,
) -> PathBuf {
    ctx.output_dir
        .join(format!("{}.{}", request.output_name, ext))
}

pub(crate) fn is_mp4(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"))
}

/// Append `-movflags +faststart` when the output is an MP4.
pub(crate) fn push_faststart(args: &mut Vec<String>, output: &Path) {
    if is_mp4(output) {
        push_strs(args, &["-movflags", "+faststart"]);
    }
}

/// Validate, sort, and coalesce overlapping ranges.
pub(crate) fn normalize_ranges(ranges: &[TimeRange]) -> Result<Vec<TimeRange>> {
    if ranges.is_empty() {
        return Err(Error::invalid_parameters("range list must not be empty"));
    }
    for range in ranges {
        if range.start >= range.end {
            return Err(Error::invalid_parameters(
                "range end must be after range start",
            ));
        }
    }

    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|r| r.start);

    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    Ok(merged)
}
