//! Builders for subtitle-track operations.

use super::*;
use crate::media::StreamKind;

/// File extension for an extracted subtitle track, by probe codec name.
fn subtitle_extension(codec: &str) -> &'static str {
    match codec {
        "ass" | "ssa" => "ass",
        "webvtt" => "vtt",
        "hdmv_pgs_subtitle" => "sup",
        "dvd_subtitle" => "sub",
        // subrip, mov_text, tx3g and anything else text-like
        _ => "srt",
    }
}

/// Codec passed to `-c:s` when soft-muxing a subtitle file, or `None` when
/// the container cannot carry that format as a soft track.
fn soft_codec(output_is_mp4: bool, sub_ext: &str) -> Option<&'static str> {
    if output_is_mp4 {
        match sub_ext {
            "srt" | "vtt" => Some("mov_text"),
            _ => None,
        }
    } else {
        match sub_ext {
            "ass" | "ssa" => Some("ass"),
            "vtt" => Some("webvtt"),
            _ => Some("srt"),
        }
    }
}

/// Quote a path for use inside an ffmpeg filter expression.
fn filter_quote(path: &Path) -> String {
    format!("'{}'", arg(path).replace('\'', r"\'"))
}

/// Add a subtitle file as a soft track (or burn it into the video).
pub(super) fn add(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    language: &str,
    default: bool,
    forced: bool,
    burn: bool,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 2)?;
    let video = &inputs[0];
    let subtitle = &inputs[1];
    let output = output_like_input(ctx, request);

    if burn {
        return burn_file(ctx, video, subtitle, output);
    }

    if language.trim().is_empty() {
        return Err(Error::invalid_parameters("subtitle language must be set"));
    }

    let sub_ext = subtitle
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mp4 = is_mp4(&output);
    let codec = soft_codec(mp4, &sub_ext).ok_or_else(|| {
        Error::invalid_parameters(format!(
            "container cannot carry .{sub_ext} as a soft track; use burn"
        ))
    })?;
    if mp4 && default && forced {
        return Err(Error::invalid_parameters(
            "mp4 subtitle disposition cannot be both default and forced",
        ));
    }

    let disposition = match (default, forced) {
        (true, true) => "default+forced".to_string(),
        (true, false) => "default".to_string(),
        (false, true) => "forced".to_string(),
        (false, false) => "0".to_string(),
    };

    // The new track lands after any existing subtitle streams.
    let position = ctx.require_media()?.subtitle_count();

    let mut args = vec![
        "-i".to_string(),
        arg(video),
        "-i".to_string(),
        arg(subtitle),
    ];
    push_strs(
        &mut args,
        &["-map", "0", "-map", "1:0", "-c:v", "copy", "-c:a", "copy", "-c:s", codec],
    );
    args.push(format!("-metadata:s:s:{position}"));
    args.push(format!("language={language}"));
    args.push(format!("-disposition:s:{position}"));
    args.push(disposition);
    push_strs(&mut args, &["-threads"]);
    args.push(ctx.threads.min(4).to_string());
    push_strs(&mut args, &["-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_TRANSFORM,
    }))
}

fn burn_file(
    ctx: &BuildContext<'_>,
    video: &Path,
    subtitle: &Path,
    output: PathBuf,
) -> Result<CommandPlan> {
    let mut args = vec!["-i".to_string(), arg(video), "-vf".to_string()];
    args.push(format!(
        "subtitles={}:force_style='Fontsize=24,Outline=1'",
        filter_quote(subtitle)
    ));
    push_strs(
        &mut args,
        &[
            "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "aac", "-b:a", "192k",
            "-movflags", "+faststart",
        ],
    );
    push_strs(&mut args, &["-threads"]);
    args.push(ctx.threads.min(4).to_string());
    push_strs(&mut args, &["-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_FILTER,
    }))
}

/// Keep only the selected subtitle track (or burn it into the video).
pub(super) fn choose(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    selector: &TrackSelector,
    make_default: bool,
    burn: bool,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let media = ctx.require_media()?;
    let track = media.find_subtitle(selector).ok_or_else(|| {
        Error::invalid_parameters(format!("no subtitle track matching {selector}"))
    })?;
    let output = output_like_input(ctx, request);

    if burn {
        let mut args = vec!["-i".to_string(), arg(&inputs[0]), "-vf".to_string()];
        args.push(format!(
            "subtitles={}:si={}",
            filter_quote(&inputs[0]),
            track.index
        ));
        push_strs(
            &mut args,
            &[
                "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "copy",
                "-movflags", "+faststart",
            ],
        );
        push_strs(&mut args, &["-threads"]);
        args.push(ctx.threads.min(4).to_string());
        push_strs(&mut args, &["-y"]);
        args.push(arg(&output));

        return Ok(CommandPlan::single(PlannedCommand {
            args,
            output: Some(output),
            scratch: None,
            timeout: TIMEOUT_FILTER,
        }));
    }

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-map", "0", "-map"]);
    args.push(format!("0:s:{}", track.index));
    push_strs(&mut args, &["-c", "copy", "-disposition:s:0"]);
    args.push(if make_default { "default" } else { "0" }.to_string());
    push_faststart(&mut args, &output);
    push_strs(&mut args, &["-threads", "2", "-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_COPY,
    }))
}

/// Extract every subtitle track into its own file, one command per track.
pub(super) fn extract(request: &OperationRequest, ctx: &BuildContext<'_>) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let media = ctx.require_media()?;

    let tracks: Vec<_> = media.streams_of(StreamKind::Subtitle).collect();
    if tracks.is_empty() {
        return Err(Error::invalid_parameters("input has no subtitle tracks"));
    }

    let mut commands = Vec::with_capacity(tracks.len());
    for track in tracks {
        let language = track.language.as_deref().unwrap_or("und");
        let output = ctx.output_dir.join(format!(
            "{}_{}_{}.{}",
            request.output_name,
            language,
            track.index,
            subtitle_extension(&track.codec)
        ));

        let mut args = vec!["-i".to_string(), arg(&inputs[0]), "-map".to_string()];
        args.push(format!("0:s:{}", track.index));
        push_strs(&mut args, &["-c:s", "copy", "-y"]);
        args.push(arg(&output));

        commands.push(PlannedCommand {
            args,
            output: Some(output),
            scratch: None,
            timeout: TIMEOUT_COPY,
        });
    }

    Ok(CommandPlan { commands })
}

/// Drop all subtitle and attachment streams.
pub(super) fn remove(request: &OperationRequest, ctx: &BuildContext<'_>) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let output = output_like_input(ctx, request);

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(
        &mut args,
        &["-map", "0", "-map", "-0:s", "-map", "-0:t", "-c:v", "copy", "-c:a", "copy"],
    );
    push_faststart(&mut args, &output);
    push_strs(&mut args, &["-threads", "2", "-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_COPY,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaFileInfo, StreamInfo};

    fn subtitle_stream(index: u32, language: &str, codec: &str, forced: bool) -> StreamInfo {
        StreamInfo {
            index,
            kind: StreamKind::Subtitle,
            codec: codec.into(),
            language: Some(language.into()),
            title: None,
            default: index == 0,
            forced,
            width: None,
            height: None,
            channels: None,
        }
    }

    fn media_with_subs(path: &str, subs: Vec<StreamInfo>) -> MediaFileInfo {
        MediaFileInfo {
            path: PathBuf::from(path),
            container: "matroska,webm".into(),
            size: 1 << 20,
            duration: Some(Duration::from_secs(600)),
            bit_rate: None,
            streams: subs,
            chapters: Vec::new(),
        }
    }

    fn add_request(video: &str, sub: &str, default: bool, forced: bool, burn: bool) -> OperationRequest {
        OperationRequest {
            inputs: vec![PathBuf::from(video), PathBuf::from(sub)],
            output_name: "subbed".into(),
            operation: Operation::SubtitleAdd {
                language: "eng".into(),
                default,
                forced,
                burn,
            },
        }
    }

    #[test]
    fn soft_add_into_mkv_keeps_srt() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs("/media/movie.mkv", vec![]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = add_request("/media/movie.mkv", "/subs/movie.srt", true, false, false);

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-c:s srt"));
        assert!(joined.contains("-metadata:s:s:0 language=eng"));
        assert!(joined.contains("-disposition:s:0 default"));
    }

    #[test]
    fn soft_add_into_mp4_converts_to_mov_text() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs(
            "/media/movie.mp4",
            vec![subtitle_stream(0, "fra", "mov_text", false)],
        );
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = add_request("/media/movie.mp4", "/subs/movie.srt", false, false, false);

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-c:s mov_text"));
        // One subtitle already present, so the new track is position 1.
        assert!(joined.contains("-metadata:s:s:1 language=eng"));
        assert!(joined.contains("-disposition:s:1 0"));
    }

    #[test]
    fn mp4_rejects_default_plus_forced() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs("/media/movie.mp4", vec![]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = add_request("/media/movie.mp4", "/subs/movie.srt", true, true, false);
        assert!(matches!(
            build(&req, &ctx),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn mp4_rejects_ass_soft_track() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs("/media/movie.mp4", vec![]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = add_request("/media/movie.mp4", "/subs/movie.ass", false, false, false);
        let err = build(&req, &ctx).unwrap_err();
        assert!(err.to_string().contains("use burn"));
    }

    #[test]
    fn burn_add_builds_subtitles_filter() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = add_request("/media/movie.mp4", "/subs/movie.ass", false, false, true);

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("subtitles='/subs/movie.ass':force_style"));
        assert!(joined.contains("-c:v libx264"));
    }

    #[test]
    fn choose_duplicates_selected_track() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs(
            "/media/movie.mkv",
            vec![
                subtitle_stream(0, "eng", "subrip", false),
                subtitle_stream(1, "jpn", "ass", true),
            ],
        );
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = OperationRequest {
            inputs: vec![PathBuf::from("/media/movie.mkv")],
            output_name: "picked".into(),
            operation: Operation::SubtitleChoose {
                selector: TrackSelector::Language("jpn".into()),
                make_default: true,
                burn: false,
            },
        };

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map 0:s:1"));
        assert!(joined.contains("-disposition:s:0 default"));
    }

    #[test]
    fn choose_burn_references_track_by_si() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs(
            "/media/movie.mkv",
            vec![
                subtitle_stream(0, "eng", "subrip", false),
                subtitle_stream(1, "jpn", "ass", true),
            ],
        );
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = OperationRequest {
            inputs: vec![PathBuf::from("/media/movie.mkv")],
            output_name: "burned".into(),
            operation: Operation::SubtitleChoose {
                selector: TrackSelector::Index(1),
                make_default: false,
                burn: true,
            },
        };

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains(":si=1"));
        assert!(joined.contains("-c:a copy"));
    }

    #[test]
    fn extract_fans_out_per_track() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs(
            "/media/movie.mkv",
            vec![
                subtitle_stream(0, "eng", "subrip", false),
                subtitle_stream(1, "jpn", "hdmv_pgs_subtitle", false),
            ],
        );
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = OperationRequest {
            inputs: vec![PathBuf::from("/media/movie.mkv")],
            output_name: "movie".into(),
            operation: Operation::SubtitleExtract,
        };

        let plan = build(&req, &ctx).unwrap();
        assert_eq!(plan.commands.len(), 2);
        let outputs: Vec<_> = plan.outputs().collect();
        assert_eq!(outputs[0], &PathBuf::from("/out/movie_eng_0.srt"));
        assert_eq!(outputs[1], &PathBuf::from("/out/movie_jpn_1.sup"));
    }

    #[test]
    fn extract_with_no_tracks_fails() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_subs("/media/movie.mkv", vec![]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = OperationRequest {
            inputs: vec![PathBuf::from("/media/movie.mkv")],
            output_name: "movie".into(),
            operation: Operation::SubtitleExtract,
        };
        assert!(build(&req, &ctx).is_err());
    }

    #[test]
    fn remove_drops_subs_and_attachments() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = OperationRequest {
            inputs: vec![PathBuf::from("/media/movie.mkv")],
            output_name: "clean".into(),
            operation: Operation::SubtitleRemove,
        };

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map 0 -map -0:s -map -0:t"));
    }
}
