//! Builders for whole-file video operations.

use super::*;
use crate::timecode::format_seconds;

/// Remove the given ranges, concatenating the kept segments through a
/// trim/concat filter graph and re-encoding.
pub(super) fn cut(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    ranges: &[TimeRange],
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let merged = normalize_ranges(ranges)?;
    let duration = ctx.media.and_then(|m| m.duration);

    let mut filter = String::new();
    let mut concat_inputs = String::new();
    let mut segment = 0usize;
    let mut last_end = Duration::ZERO;

    for range in &merged {
        if last_end < range.start {
            filter.push_str(&format!(
                "[0:v]trim=start={ls}:end={s},setpts=N/FRAME_RATE/TB[v{i}];\
                 [0:a]atrim=start={ls}:end={s},asetpts=N/SR/TB[a{i}];",
                ls = format_seconds(last_end),
                s = format_seconds(range.start),
                i = segment,
            ));
            concat_inputs.push_str(&format!("[v{segment}][a{segment}]"));
            segment += 1;
        }
        last_end = range.end;
    }

    // Keep the tail unless the final range runs to (or past) the end.
    if duration.map_or(true, |d| last_end < d) {
        filter.push_str(&format!(
            "[0:v]trim=start={ls},setpts=N/FRAME_RATE/TB[v{i}];\
             [0:a]atrim=start={ls},asetpts=N/SR/TB[a{i}];",
            ls = format_seconds(last_end),
            i = segment,
        ));
        concat_inputs.push_str(&format!("[v{segment}][a{segment}]"));
        segment += 1;
    }

    if segment == 0 {
        return Err(Error::invalid_parameters(
            "cut ranges would remove the entire file",
        ));
    }

    let filter_complex = format!("{filter}{concat_inputs}concat=n={segment}:v=1:a=1[vout][aout]");
    let output = output_like_input(ctx, request);

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-filter_complex"]);
    args.push(filter_complex);
    push_strs(
        &mut args,
        &[
            "-map", "[vout]", "-map", "[aout]", "-c:v", "libx264", "-preset", "fast", "-crf",
            "23", "-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart",
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

/// Keep only `[start, end)`, stream-copied.
pub(super) fn trim(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    start: Duration,
    end: Duration,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    if end <= start {
        return Err(Error::invalid_parameters("trim end must be after start"));
    }

    let output = output_like_input(ctx, request);
    let mut args = vec![
        "-ss".to_string(),
        format_seconds(start),
        "-i".to_string(),
        arg(&inputs[0]),
        "-to".to_string(),
        format_seconds(end - start),
    ];
    push_strs(&mut args, &["-c", "copy", "-avoid_negative_ts", "make_zero"]);
    push_strs(&mut args, &["-threads", "2", "-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_TRANSFORM,
    }))
}

/// Re-encode each range into its own `_partNNN` output.
pub(super) fn split_segments(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    ranges: &[TimeRange],
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let merged = normalize_ranges(ranges)?;
    let ext = request
        .input()
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".mp4".to_string());

    let mut commands = Vec::with_capacity(merged.len());
    for (i, range) in merged.iter().enumerate() {
        let output = ctx.output_dir.join(format!(
            "{}_part{:03}{}",
            request.output_name,
            i + 1,
            ext
        ));

        let mut args = vec![
            "-ss".to_string(),
            format_seconds(range.start),
            "-i".to_string(),
            arg(&inputs[0]),
            "-to".to_string(),
            format_seconds(range.end - range.start),
        ];
        push_strs(
            &mut args,
            &[
                "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-c:a", "aac", "-b:a",
                "192k", "-movflags", "+faststart", "-avoid_negative_ts", "make_zero", "-y",
            ],
        );
        args.push(arg(&output));

        commands.push(PlannedCommand {
            args,
            output: Some(output),
            scratch: None,
            timeout: TIMEOUT_FILTER,
        });
    }

    Ok(CommandPlan { commands })
}

/// Escape a path for an ffmpeg concat list file.
fn concat_list_entry(path: &Path) -> String {
    format!("file '{}'\n", arg(path).replace('\'', "'\\''"))
}

/// Join all inputs. Without a transition this is a stream-copied list-file
/// concat; with one, a full xfade/acrossfade filter graph re-encode.
pub(super) fn concat(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    container: Container,
    transition: Option<Duration>,
) -> Result<CommandPlan> {
    if request.inputs.len() < 2 {
        return Err(Error::invalid_parameters("concat needs at least two inputs"));
    }

    let output = output_with_ext(ctx, request, container.extension());

    match transition {
        None => {
            let contents: String = request.inputs.iter().map(|p| concat_list_entry(p)).collect();
            let list_path = ctx
                .output_dir
                .join(format!("{}.concat.txt", request.output_name));

            let mut args = vec![
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                arg(&list_path),
            ];
            push_strs(&mut args, &["-c", "copy"]);
            push_faststart(&mut args, &output);
            push_strs(&mut args, &["-threads", "2", "-y"]);
            args.push(arg(&output));

            Ok(CommandPlan::single(PlannedCommand {
                args,
                output: Some(output),
                scratch: Some(ScratchFile {
                    path: list_path,
                    contents,
                }),
                timeout: TIMEOUT_TRANSFORM,
            }))
        }
        Some(fade) => concat_with_transition(request, ctx, output, fade),
    }
}

fn concat_with_transition(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    output: PathBuf,
    fade: Duration,
) -> Result<CommandPlan> {
    if fade.is_zero() {
        return Err(Error::invalid_parameters(
            "transition duration must be positive",
        ));
    }
    if ctx.sources.len() != request.inputs.len() {
        return Err(Error::invalid_parameters(
            "concat transitions require probe metadata for every input",
        ));
    }

    let first_video = ctx.sources[0]
        .primary_video()
        .ok_or_else(|| Error::invalid_parameters("first concat input has no video stream"))?;
    let (width, height) = match (first_video.width, first_video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(Error::invalid_parameters(
                "first concat input has no usable resolution",
            ))
        }
    };

    let n = request.inputs.len();
    let mut args = Vec::new();
    let mut filter = String::new();

    for (i, (input, info)) in request.inputs.iter().zip(ctx.sources).enumerate() {
        if info.duration.is_none() {
            return Err(Error::invalid_parameters(format!(
                "concat input {} has no known duration",
                input.display()
            )));
        }
        args.push("-i".to_string());
        args.push(arg(input));
        filter.push_str(&format!(
            "[{i}:v]scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:-1:-1:color=black[v{i}];"
        ));
        filter.push_str(&format!(
            "[{i}:a]aformat=sample_rates=44100:channel_layouts=stereo[a{i}];"
        ));
    }

    // Chain crossfades pairwise; each stage's offset is where the fade starts
    // in the accumulated stream.
    let mut elapsed = Duration::ZERO;
    for i in 0..n - 1 {
        let duration = ctx.sources[i].duration.unwrap_or_default();
        elapsed += duration;
        let offset = elapsed.saturating_sub(fade.saturating_mul(i as u32 + 1));

        let v_in = if i == 0 {
            format!("[v{i}]")
        } else {
            format!("[vx{}]", i - 1)
        };
        let a_in = if i == 0 {
            format!("[a{i}]")
        } else {
            format!("[ax{}]", i - 1)
        };
        filter.push_str(&format!(
            "{v_in}[v{next}]xfade=transition=fade:duration={d}:offset={o}[vx{i}];",
            next = i + 1,
            d = format_seconds(fade),
            o = format_seconds(offset),
        ));
        filter.push_str(&format!(
            "{a_in}[a{next}]acrossfade=d={d}[ax{i}];",
            next = i + 1,
            d = format_seconds(fade),
        ));
    }

    let final_v = format!("[vx{}]", n - 2);
    let final_a = format!("[ax{}]", n - 2);
    // Drop the trailing semicolon.
    filter.pop();

    push_strs(&mut args, &["-filter_complex"]);
    args.push(filter);
    push_strs(&mut args, &["-map"]);
    args.push(final_v);
    push_strs(&mut args, &["-map"]);
    args.push(final_a);
    push_strs(
        &mut args,
        &[
            "-c:v", "libx264", "-preset", "fast", "-crf", "22", "-c:a", "aac", "-b:a", "192k",
        ],
    );
    push_faststart(&mut args, &output);
    push_strs(&mut args, &["-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_ENCODE,
    }))
}

/// One rung of the compression ladder.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionProfile {
    pub name: &'static str,
    pub scale: u32,
    pub video_bitrate: (u32, u32),
    pub audio_bitrate: &'static str,
    pub crf: u32,
}

/// The fixed resolution ladder, ascending.
pub const RESOLUTION_LADDER: &[ResolutionProfile] = &[
    ResolutionProfile {
        name: "144p",
        scale: 144,
        video_bitrate: (150, 300),
        audio_bitrate: "64k",
        crf: 32,
    },
    ResolutionProfile {
        name: "240p",
        scale: 240,
        video_bitrate: (300, 600),
        audio_bitrate: "64k",
        crf: 28,
    },
    ResolutionProfile {
        name: "360p",
        scale: 360,
        video_bitrate: (600, 1000),
        audio_bitrate: "96k",
        crf: 26,
    },
    ResolutionProfile {
        name: "480p",
        scale: 480,
        video_bitrate: (1000, 1500),
        audio_bitrate: "96k",
        crf: 24,
    },
    ResolutionProfile {
        name: "720p",
        scale: 720,
        video_bitrate: (1500, 3000),
        audio_bitrate: "128k",
        crf: 22,
    },
    ResolutionProfile {
        name: "1080p",
        scale: 1080,
        video_bitrate: (3000, 6000),
        audio_bitrate: "128k",
        crf: 20,
    },
];

/// Encoder profile for one compression target format.
#[derive(Debug, Clone, Copy)]
pub struct FormatProfile {
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    pub extension: &'static str,
    pub preset: &'static str,
    pub tune: &'static str,
    pub profile: &'static str,
    pub container_options: &'static [&'static str],
}

pub(super) fn format_profile(format: OutputFormat) -> FormatProfile {
    match format {
        OutputFormat::Mp4 => FormatProfile {
            video_codec: "libx264",
            audio_codec: "aac",
            extension: "mp4",
            preset: "fast",
            tune: "fastdecode",
            profile: "main",
            container_options: &["-movflags", "+faststart"],
        },
        OutputFormat::Hevc => FormatProfile {
            video_codec: "libx265",
            audio_codec: "aac",
            extension: "mp4",
            preset: "fast",
            tune: "fastdecode",
            profile: "main",
            container_options: &["-tag:v", "hvc1"],
        },
        OutputFormat::Webm => FormatProfile {
            video_codec: "libvpx-vp9",
            audio_codec: "libopus",
            extension: "webm",
            preset: "",
            tune: "",
            profile: "",
            container_options: &[],
        },
    }
}

/// Expand a compression request into one (or two, for two-pass) commands per
/// (format, ladder rung) pair. Rungs above the source height are skipped;
/// the native-height rung joins only with `keep_original_quality`.
pub(super) fn compress(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    formats: &[OutputFormat],
    keep_original_quality: bool,
    two_pass: bool,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    if formats.is_empty() {
        return Err(Error::invalid_parameters("no target formats given"));
    }

    let media = ctx.require_media()?;
    let height = media
        .primary_video()
        .and_then(|v| v.height)
        .filter(|h| *h > 0)
        .ok_or_else(|| Error::invalid_parameters("source height unknown; cannot build ladder"))?;

    let rungs: Vec<&ResolutionProfile> = RESOLUTION_LADDER
        .iter()
        .filter(|p| p.scale < height || (keep_original_quality && p.scale == height))
        .collect();
    if rungs.is_empty() {
        return Err(Error::invalid_parameters(format!(
            "no ladder rung fits a {height}p source"
        )));
    }

    let mut commands = Vec::new();
    for format in formats {
        let fmt = format_profile(*format);
        for rung in &rungs {
            let rendition = format!("{}_{}", request.output_name, rung.name);
            let output = ctx.output_dir.join(format!("{rendition}.{}", fmt.extension));
            let avg = (rung.video_bitrate.0 + rung.video_bitrate.1) / 2;

            let mut args = vec![
                "-hwaccel".to_string(),
                "auto".to_string(),
                "-i".to_string(),
                arg(&inputs[0]),
                "-vf".to_string(),
                format!("scale=-2:{}", rung.scale),
                "-c:v".to_string(),
                fmt.video_codec.to_string(),
                "-b:v".to_string(),
                format!("{avg}k"),
                "-maxrate".to_string(),
                format!("{}k", rung.video_bitrate.1),
                "-minrate".to_string(),
                format!("{}k", rung.video_bitrate.0),
                "-bufsize".to_string(),
                format!("{}k", avg * 2),
                "-c:a".to_string(),
                fmt.audio_codec.to_string(),
                "-b:a".to_string(),
                rung.audio_bitrate.to_string(),
            ];
            push_strs(&mut args, fmt.container_options);

            match format {
                OutputFormat::Mp4 | OutputFormat::Hevc => {
                    let preset = if rung.scale <= 480 { "fast" } else { fmt.preset };
                    push_strs(&mut args, &["-preset", preset]);
                    push_strs(&mut args, &["-crf"]);
                    args.push(rung.crf.to_string());
                    push_strs(&mut args, &["-profile:v", fmt.profile, "-tune", fmt.tune]);
                    let params_flag = if *format == OutputFormat::Mp4 {
                        "-x264-params"
                    } else {
                        "-x265-params"
                    };
                    push_strs(&mut args, &[params_flag]);
                    args.push(format!("log-level=error:threads={}", ctx.threads.min(4)));
                }
                OutputFormat::Webm => {
                    push_strs(&mut args, &["-speed", "4", "-row-mt", "1", "-quality", "good"]);
                    push_strs(&mut args, &["-crf"]);
                    args.push(rung.crf.to_string());
                    push_strs(&mut args, &["-threads"]);
                    args.push(ctx.threads.min(8).to_string());
                }
            }

            if two_pass && rung.scale >= 720 {
                let pass_log = ctx.output_dir.join(format!("ffmpeg2pass_{rendition}"));

                let mut pass1 = args.clone();
                push_strs(&mut pass1, &["-pass", "1", "-passlogfile"]);
                pass1.push(arg(&pass_log));
                push_strs(&mut pass1, &["-f", "null", "-y", "/dev/null"]);
                commands.push(PlannedCommand {
                    args: pass1,
                    output: None,
                    scratch: None,
                    timeout: TIMEOUT_ENCODE,
                });

                let mut pass2 = args;
                push_strs(&mut pass2, &["-pass", "2", "-passlogfile"]);
                pass2.push(arg(&pass_log));
                push_strs(&mut pass2, &["-y"]);
                pass2.push(arg(&output));
                commands.push(PlannedCommand {
                    args: pass2,
                    output: Some(output),
                    scratch: None,
                    timeout: TIMEOUT_ENCODE,
                });
            } else {
                push_strs(&mut args, &["-y"]);
                args.push(arg(&output));
                commands.push(PlannedCommand {
                    args,
                    output: Some(output),
                    scratch: None,
                    timeout: TIMEOUT_ENCODE,
                });
            }
        }
    }

    Ok(CommandPlan { commands })
}

/// Rewrap into another container without re-encoding.
pub(super) fn remux(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    container: Container,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let output = output_with_ext(ctx, request, container.extension());

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-c", "copy"]);
    push_faststart(&mut args, &output);
    push_strs(&mut args, &["-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_COPY,
    }))
}

/// Capture one frame as a JPEG thumbnail.
pub(super) fn thumbnail(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    at: Duration,
    width: u32,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    if width == 0 {
        return Err(Error::invalid_parameters("thumbnail width must be positive"));
    }

    let output = output_with_ext(ctx, request, "jpg");
    let mut args = vec![
        "-ss".to_string(),
        format_seconds(at),
        "-i".to_string(),
        arg(&inputs[0]),
    ];
    push_strs(&mut args, &["-frames:v", "1", "-vf"]);
    args.push(format!("scale={width}:-2:flags=lanczos"));
    push_strs(&mut args, &["-q:v", "3", "-f", "image2", "-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: None,
        timeout: TIMEOUT_THUMBNAIL,
    }))
}
