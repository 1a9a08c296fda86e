//! FFprobe-based media probing.
//!
//! Runs the probing executable with JSON output and parses the report into
//! [`MediaFileInfo`]. Parsing is split from execution so the schema mapping
//! is unit-testable against canned reports.

use crate::media::{ChapterEntry, MediaFileInfo, StreamInfo, StreamKind};
use crate::{chapters, Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

/// Probe calls are metadata-only and should never take this long.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    chapters: Vec<FfprobeChapter>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    channels: Option<u32>,
    #[serde(default)]
    disposition: FfprobeDisposition,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeDisposition {
    #[serde(default)]
    default: u8,
    #[serde(default)]
    forced: u8,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeChapter {
    start_time: String,
    end_time: String,
    #[serde(default)]
    tags: FfprobeTags,
}

/// Invokes the probing executable and parses its report.
#[derive(Debug, Clone)]
pub struct Prober {
    ffprobe: PathBuf,
}

impl Prober {
    pub fn new(ffprobe: PathBuf) -> Self {
        Self { ffprobe }
    }

    /// Probe a media file.
    ///
    /// Idempotent: probing an unchanged file yields structurally equal
    /// results.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutableNotFound`] if the probe tool cannot be spawned.
    /// - [`Error::ProcessFailed`] if the tool exits nonzero.
    /// - [`Error::ProbeParse`] if the report does not match the schema.
    pub async fn probe(&self, path: &Path) -> Result<MediaFileInfo> {
        let child = tokio::process::Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-show_chapters",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::executable_not_found(self.ffprobe.to_string_lossy())
                } else {
                    Error::Io(e)
                }
            })?;

        // On timeout the future is dropped and kill_on_drop reaps the child.
        let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| Error::ProcessTimedOut {
                after: PROBE_TIMEOUT,
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProcessFailed {
                exit_code: output.status.code(),
                stderr_tail: stderr.trim().to_string(),
            });
        }

        parse_report(path, &output.stdout)
    }
}

fn parse_report(path: &Path, report: &[u8]) -> Result<MediaFileInfo> {
    let output: FfprobeOutput = serde_json::from_slice(report)
        .map_err(|e| Error::probe_parse(format!("invalid probe report: {e}")))?;

    let duration = output
        .format
        .duration
        .as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64);

    let mut streams = Vec::with_capacity(output.streams.len());
    let mut video_index = 0u32;
    let mut audio_index = 0u32;
    let mut subtitle_index = 0u32;
    let mut other_index = 0u32;

    for stream in output.streams {
        let (kind, index) = match stream.codec_type.as_str() {
            "video" => (StreamKind::Video, &mut video_index),
            "audio" => (StreamKind::Audio, &mut audio_index),
            "subtitle" => (StreamKind::Subtitle, &mut subtitle_index),
            _ => (StreamKind::Other, &mut other_index),
        };
        streams.push(StreamInfo {
            index: *index,
            kind,
            codec: stream.codec_name.unwrap_or_default(),
            language: stream.tags.language,
            title: stream.tags.title,
            default: stream.disposition.default == 1,
            forced: stream.disposition.forced == 1,
            width: stream.width,
            height: stream.height,
            channels: stream.channels,
        });
        *index += 1;
    }

    let mut parsed_chapters = Vec::with_capacity(output.chapters.len());
    for (i, chapter) in output.chapters.into_iter().enumerate() {
        let start = parse_chapter_time(&chapter.start_time, i, "start_time")?;
        let end = parse_chapter_time(&chapter.end_time, i, "end_time")?;
        if end <= start {
            return Err(Error::probe_parse(format!(
                "chapter {i} ends at or before its start"
            )));
        }
        parsed_chapters.push(ChapterEntry::new(
            start,
            end,
            chapter.tags.title.unwrap_or_else(|| format!("Chapter {}", i + 1)),
        ));
    }
    let parsed_chapters = chapters::reindex(parsed_chapters);
    for pair in parsed_chapters.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(Error::probe_parse(format!(
                "chapters '{}' and '{}' overlap",
                pair[0].title, pair[1].title
            )));
        }
    }

    Ok(MediaFileInfo {
        path: path.to_path_buf(),
        container: output.format.format_name,
        size: output
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        duration,
        bit_rate: output.format.bit_rate.as_deref().and_then(|s| s.parse().ok()),
        streams,
        chapters: parsed_chapters,
    })
}

fn parse_chapter_time(value: &str, index: usize, field: &str) -> Result<Duration> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| Error::probe_parse(format!("chapter {index} has invalid {field}: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUR_STREAM_REPORT: &str = r#"{
        "format": {
            "format_name": "matroska,webm",
            "duration": "1425.375000",
            "size": "734003200",
            "bit_rate": "4118000"
        },
        "streams": [
            {
                "index": 0,
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "disposition": {"default": 1, "forced": 0}
            },
            {
                "index": 1,
                "codec_type": "audio",
                "codec_name": "aac",
                "channels": 6,
                "disposition": {"default": 1, "forced": 0},
                "tags": {"language": "eng"}
            },
            {
                "index": 2,
                "codec_type": "audio",
                "codec_name": "ac3",
                "channels": 2,
                "tags": {"language": "jpn", "title": "Commentary"}
            },
            {
                "index": 3,
                "codec_type": "subtitle",
                "codec_name": "subrip",
                "disposition": {"default": 0, "forced": 1},
                "tags": {"language": "eng"}
            }
        ],
        "chapters": [
            {"start_time": "0.000000", "end_time": "300.000000", "tags": {"title": "Intro"}},
            {"start_time": "300.000000", "end_time": "900.000000"}
        ]
    }"#;

    #[test]
    fn parses_streams_in_original_order() {
        let info = parse_report(Path::new("/media/show.mkv"), FOUR_STREAM_REPORT.as_bytes())
            .unwrap();

        assert_eq!(info.streams.len(), 4);
        let kinds: Vec<StreamKind> = info.streams.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamKind::Video,
                StreamKind::Audio,
                StreamKind::Audio,
                StreamKind::Subtitle
            ]
        );
        // Kind-relative indices.
        assert_eq!(info.streams[1].index, 0);
        assert_eq!(info.streams[2].index, 1);
        assert_eq!(info.streams[3].index, 0);
        assert!(info.streams[3].forced);
        assert_eq!(info.streams[2].title.as_deref(), Some("Commentary"));
    }

    #[test]
    fn parses_format_fields() {
        let info = parse_report(Path::new("/media/show.mkv"), FOUR_STREAM_REPORT.as_bytes())
            .unwrap();
        assert_eq!(info.container, "matroska,webm");
        assert_eq!(info.size, 734003200);
        assert_eq!(info.bit_rate, Some(4118000));
        assert_eq!(info.duration, Some(Duration::from_secs_f64(1425.375)));
    }

    #[test]
    fn parses_chapters_with_default_titles() {
        let info = parse_report(Path::new("/media/show.mkv"), FOUR_STREAM_REPORT.as_bytes())
            .unwrap();
        assert_eq!(info.chapters.len(), 2);
        assert_eq!(info.chapters[0].title, "Intro");
        assert_eq!(info.chapters[0].index, 0);
        assert_eq!(info.chapters[1].title, "Chapter 2");
        assert_eq!(info.chapters[1].index, 1);
    }

    #[test]
    fn missing_optional_fields_are_tolerated() {
        let report = r#"{
            "format": {"format_name": "mp3"},
            "streams": [{"index": 0, "codec_type": "audio", "codec_name": "mp3"}]
        }"#;
        let info = parse_report(Path::new("/media/track.mp3"), report.as_bytes()).unwrap();
        assert_eq!(info.duration, None);
        assert_eq!(info.size, 0);
        assert!(info.streams[0].language.is_none());
        assert!(!info.streams[0].default);
    }

    #[test]
    fn structural_garbage_is_probe_parse_error() {
        let result = parse_report(Path::new("/media/x.mkv"), b"not json at all");
        assert!(matches!(result, Err(Error::ProbeParse(_))));

        // Missing the format section entirely.
        let result = parse_report(Path::new("/media/x.mkv"), br#"{"streams": []}"#);
        assert!(matches!(result, Err(Error::ProbeParse(_))));
    }

    #[test]
    fn degenerate_chapter_is_rejected() {
        let report = r#"{
            "format": {"format_name": "matroska,webm"},
            "chapters": [{"start_time": "10.0", "end_time": "10.0"}]
        }"#;
        let result = parse_report(Path::new("/media/x.mkv"), report.as_bytes());
        assert!(matches!(result, Err(Error::ProbeParse(_))));
    }

    #[test]
    fn unparsable_chapter_time_is_rejected() {
        let report = r#"{
            "format": {"format_name": "matroska,webm"},
            "chapters": [{"start_time": "abc", "end_time": "10.0"}]
        }"#;
        let result = parse_report(Path::new("/media/x.mkv"), report.as_bytes());
        assert!(matches!(result, Err(Error::ProbeParse(_))));
    }

    #[test]
    fn repeated_parses_are_structurally_equal() {
        let a = parse_report(Path::new("/media/show.mkv"), FOUR_STREAM_REPORT.as_bytes())
            .unwrap();
        let b = parse_report(Path::new("/media/show.mkv"), FOUR_STREAM_REPORT.as_bytes())
            .unwrap();
        assert_eq!(a, b);
    }
}
