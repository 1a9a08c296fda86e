//! Builders for audio-track operations.

use super::*;

fn codec_extras(args: &mut Vec<String>, codec: AudioCodec) {
    match codec {
        AudioCodec::Aac => push_strs(args, &["-aac_coder", "twoloop"]),
        AudioCodec::Opus => push_strs(args, &["-application", "audio"]),
        _ => {}
    }
}

fn encode_audio(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    codec: AudioCodec,
    bitrate_kbps: u32,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    if bitrate_kbps == 0 {
        return Err(Error::invalid_parameters("audio bitrate must be positive"));
    }

    let output = output_with_ext(ctx, request, codec.extension());
    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-vn", "-c:a", codec.encoder(), "-b:a"]);
    args.push(format!("{bitrate_kbps}k"));
    codec_extras(&mut args, codec);
    push_strs(&mut args, &["-threads"]);
    args.push(ctx.threads.min(2).to_string());
    push_strs(&mut args, &["-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_COPY,
    }))
}

/// Extract the audio track of a video file into a standalone file.
pub(super) fn extract(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    codec: AudioCodec,
    bitrate_kbps: u32,
) -> Result<CommandPlan> {
    encode_audio(request, ctx, codec, bitrate_kbps)
}

/// Convert an audio file to another codec. Same template as extraction; the
/// `-vn` flag is harmless on audio-only input.
pub(super) fn convert(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    codec: AudioCodec,
    bitrate_kbps: u32,
) -> Result<CommandPlan> {
    encode_audio(request, ctx, codec, bitrate_kbps)
}

/// Drop all audio streams, stream-copying the video.
pub(super) fn remove(request: &OperationRequest, ctx: &BuildContext<'_>) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let output = output_like_input(ctx, request);

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-map", "0:v", "-map", "-0:a", "-c:v", "copy"]);
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

/// Keep only the selected audio track. The selector is resolved against the
/// probed stream list, so a bad index or language fails before any spawn.
pub(super) fn choose(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    selector: &TrackSelector,
    make_default: bool,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let media = ctx.require_media()?;
    let track = media.find_audio(selector).ok_or_else(|| {
        Error::invalid_parameters(format!("no audio track matching {selector}"))
    })?;

    let output = output_like_input(ctx, request);
    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-map", "0:v", "-map"]);
    args.push(format!("0:a:{}", track.index));
    push_strs(&mut args, &["-c", "copy", "-disposition:a:0"]);
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

/// Mux the second input's audio under the first input's video.
pub(super) fn merge_video_audio(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 2)?;
    let output = output_like_input(ctx, request);

    let mut args = vec![
        "-i".to_string(),
        arg(&inputs[0]),
        "-i".to_string(),
        arg(&inputs[1]),
    ];
    push_strs(
        &mut args,
        &[
            "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-b:a", "192k",
        ],
    );
    push_faststart(&mut args, &output);
    push_strs(&mut args, &["-shortest", "-threads"]);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaFileInfo, StreamInfo, StreamKind};

    fn request(operation: Operation) -> OperationRequest {
        OperationRequest {
            inputs: vec![PathBuf::from("/media/input.mp4")],
            output_name: "out".into(),
            operation,
        }
    }

    fn audio_stream(index: u32, language: &str) -> StreamInfo {
        StreamInfo {
            index,
            kind: StreamKind::Audio,
            codec: "aac".into(),
            language: Some(language.into()),
            title: None,
            default: index == 0,
            forced: false,
            width: None,
            height: None,
            channels: Some(2),
        }
    }

    fn media_two_audios() -> MediaFileInfo {
        MediaFileInfo {
            path: PathBuf::from("/media/input.mp4"),
            container: "mov,mp4,m4a,3gp,3g2,mj2".into(),
            size: 1 << 20,
            duration: Some(Duration::from_secs(600)),
            bit_rate: None,
            streams: vec![audio_stream(0, "eng"), audio_stream(1, "jpn")],
            chapters: Vec::new(),
        }
    }

    #[test]
    fn extract_uses_codec_extension_and_extras() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::AudioExtract {
            codec: AudioCodec::Aac,
            bitrate_kbps: 192,
        });

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-vn -c:a aac -b:a 192k"));
        assert!(joined.contains("-aac_coder twoloop"));
        assert_eq!(
            plan.commands[0].output.as_deref(),
            Some(Path::new("/out/out.aac"))
        );
    }

    #[test]
    fn opus_gets_application_flag() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::AudioConvert {
            codec: AudioCodec::Opus,
            bitrate_kbps: 128,
        });

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.contains("-application audio"));
    }

    #[test]
    fn zero_bitrate_is_invalid() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::AudioExtract {
            codec: AudioCodec::Mp3,
            bitrate_kbps: 0,
        });
        assert!(matches!(
            build(&req, &ctx),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn remove_strips_audio_with_stream_copy() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::AudioRemove);

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map 0:v -map -0:a -c:v copy"));
        // mp4 input keeps faststart
        assert!(joined.contains("+faststart"));
    }

    #[test]
    fn choose_maps_selected_track() {
        let out_dir = PathBuf::from("/out");
        let info = media_two_audios();
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::AudioChoose {
            selector: TrackSelector::Language("jpn".into()),
            make_default: true,
        });

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map 0:a:1"));
        assert!(joined.contains("-disposition:a:0 default"));
    }

    #[test]
    fn choose_unknown_track_fails_before_spawn() {
        let out_dir = PathBuf::from("/out");
        let info = media_two_audios();
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::AudioChoose {
            selector: TrackSelector::Index(7),
            make_default: false,
        });
        assert!(matches!(
            build(&req, &ctx),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn merge_needs_two_inputs() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::MergeVideoAudio);
        assert!(build(&req, &ctx).is_err());

        let req = OperationRequest {
            inputs: vec![
                PathBuf::from("/media/video.mp4"),
                PathBuf::from("/media/track.aac"),
            ],
            output_name: "muxed".into(),
            operation: Operation::MergeVideoAudio,
        };
        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-shortest"));
    }
}
