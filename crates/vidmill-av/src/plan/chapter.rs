//! Builders for chapter-metadata operations.
//!
//! All chapter edits funnel through one template: transform the chapter
//! sequence in memory with the chapter editor, render it as an ffmetadata
//! scratch file, and merge it back with `-map_metadata 1 -c copy`. Clearing
//! every chapter uses `-map_metadata -1` and needs no scratch file.

use super::*;
use crate::chapters;

/// Escape the characters ffmetadata treats specially.
fn escape_metadata(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Render a chapter sequence in ffmetadata form, millisecond timebase.
pub(super) fn render_ffmetadata(entries: &[ChapterEntry]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    for entry in entries {
        out.push_str(&format!(
            "[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n\n",
            entry.start.as_millis(),
            entry.end.as_millis(),
            escape_metadata(&entry.title)
        ));
    }
    out
}

fn merge_metadata_plan(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    entries: Vec<ChapterEntry>,
) -> Result<CommandPlan> {
    let input = request.input();
    let output = output_like_input(ctx, request);
    let meta_path = ctx
        .output_dir
        .join(format!("{}.ffmeta", request.output_name));

    let mut args = vec![
        "-i".to_string(),
        arg(input),
        "-i".to_string(),
        arg(&meta_path),
    ];
    push_strs(&mut args, &["-map_metadata", "1", "-c", "copy"]);
    push_strs(&mut args, &["-threads", "2", "-y"]);
    args.push(arg(&output));

    Ok(CommandPlan::single(PlannedCommand {
        args,
        output: Some(output),
        scratch: Some(ScratchFile {
            path: meta_path,
            contents: render_ffmetadata(&entries),
        }),
        timeout: TIMEOUT_COPY,
    }))
}

fn clear_metadata_plan(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
) -> Result<CommandPlan> {
    let inputs = expect_inputs(request, 1)?;
    let output = output_like_input(ctx, request);

    let mut args = vec!["-i".to_string(), arg(&inputs[0])];
    push_strs(&mut args, &["-map_metadata", "-1", "-c", "copy"]);
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

/// Persist a caller-supplied chapter sequence verbatim (after validation).
pub(super) fn write(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    entries: &[ChapterEntry],
) -> Result<CommandPlan> {
    expect_inputs(request, 1)?;
    let entries = chapters::add(&[], entries)?;
    merge_metadata_plan(request, ctx, entries)
}

/// Add chapters to the probed sequence, then persist.
pub(super) fn add(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    entries: &[ChapterEntry],
) -> Result<CommandPlan> {
    expect_inputs(request, 1)?;
    let existing = &ctx.require_media()?.chapters;
    let merged = chapters::add(existing, entries)?;
    merge_metadata_plan(request, ctx, merged)
}

/// Edit one probed chapter, then persist.
pub(super) fn edit(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    index: usize,
    new_start: Option<Duration>,
    new_end: Option<Duration>,
    new_title: Option<&str>,
) -> Result<CommandPlan> {
    expect_inputs(request, 1)?;
    let existing = &ctx.require_media()?.chapters;
    let edited = chapters::edit(existing, index, new_start, new_end, new_title)?;
    merge_metadata_plan(request, ctx, edited)
}

/// Split one probed chapter at a point, then persist.
pub(super) fn split(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    index: usize,
    at: Duration,
) -> Result<CommandPlan> {
    expect_inputs(request, 1)?;
    let existing = &ctx.require_media()?.chapters;
    let split_out = chapters::split(existing, index, at)?;
    merge_metadata_plan(request, ctx, split_out)
}

/// Remove one chapter (persisting the remainder) or clear them all.
pub(super) fn remove(
    request: &OperationRequest,
    ctx: &BuildContext<'_>,
    index: Option<usize>,
) -> Result<CommandPlan> {
    match index {
        None => clear_metadata_plan(request, ctx),
        Some(index) => {
            expect_inputs(request, 1)?;
            let existing = &ctx.require_media()?.chapters;
            let remaining = chapters::remove_at(existing, index)?;
            if remaining.is_empty() {
                clear_metadata_plan(request, ctx)
            } else {
                merge_metadata_plan(request, ctx, remaining)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaFileInfo;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn entry(start: u64, end: u64, title: &str) -> ChapterEntry {
        ChapterEntry::new(secs(start), secs(end), title)
    }

    fn media_with_chapters(chapters: Vec<ChapterEntry>) -> MediaFileInfo {
        MediaFileInfo {
            path: PathBuf::from("/media/show.mkv"),
            container: "matroska,webm".into(),
            size: 1 << 20,
            duration: Some(secs(1200)),
            bit_rate: None,
            streams: Vec::new(),
            chapters: crate::chapters::reindex(chapters),
        }
    }

    fn request(operation: Operation) -> OperationRequest {
        OperationRequest {
            inputs: vec![PathBuf::from("/media/show.mkv")],
            output_name: "chaptered".into(),
            operation,
        }
    }

    #[test]
    fn ffmetadata_rendering_uses_millisecond_timebase() {
        let rendered = render_ffmetadata(&[entry(0, 300, "Intro")]);
        assert!(rendered.starts_with(";FFMETADATA1\n"));
        assert!(rendered.contains("TIMEBASE=1/1000"));
        assert!(rendered.contains("START=0"));
        assert!(rendered.contains("END=300000"));
        assert!(rendered.contains("title=Intro"));
    }

    #[test]
    fn ffmetadata_escapes_special_characters() {
        let rendered = render_ffmetadata(&[entry(0, 10, "A=B; #1")]);
        assert!(rendered.contains(r"title=A\=B\; \#1"));
    }

    #[test]
    fn add_merges_with_probed_chapters() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![entry(0, 300, "Intro")]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterAdd {
            entries: vec![entry(301, 600, "Part 1")],
        });

        let plan = build(&req, &ctx).unwrap();
        let scratch = plan.commands[0].scratch.as_ref().unwrap();
        assert!(scratch.contents.contains("title=Intro"));
        assert!(scratch.contents.contains("title=Part 1"));
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map_metadata 1 -c copy"));
    }

    #[test]
    fn add_against_empty_sequence_indexes_from_zero() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterAdd {
            entries: vec![entry(0, 300, "Intro"), entry(301, 600, "Part 1")],
        });

        let plan = build(&req, &ctx).unwrap();
        let scratch = plan.commands[0].scratch.as_ref().unwrap();
        let intro = scratch.contents.find("title=Intro").unwrap();
        let part = scratch.contents.find("title=Part 1").unwrap();
        assert!(intro < part);
    }

    #[test]
    fn edit_out_of_range_surfaces_typed_error() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![entry(0, 300, "Intro")]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterEdit {
            index: 4,
            new_start: None,
            new_end: None,
            new_title: Some("Renamed".into()),
        });

        assert!(matches!(
            build(&req, &ctx),
            Err(Error::ChapterIndexOutOfRange { index: 4, len: 1 })
        ));
    }

    #[test]
    fn edit_rewrites_target_only() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![entry(0, 300, "Intro"), entry(301, 600, "Part 1")]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterEdit {
            index: 0,
            new_start: None,
            new_end: Some(secs(240)),
            new_title: None,
        });

        let plan = build(&req, &ctx).unwrap();
        let scratch = plan.commands[0].scratch.as_ref().unwrap();
        assert!(scratch.contents.contains("END=240000"));
        assert!(scratch.contents.contains("START=301000"));
        assert!(scratch.contents.contains("END=600000"));
    }

    #[test]
    fn split_renders_both_parts() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![entry(0, 600, "Feature")]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterSplit {
            index: 0,
            at: secs(250),
        });

        let plan = build(&req, &ctx).unwrap();
        let scratch = plan.commands[0].scratch.as_ref().unwrap();
        assert!(scratch.contents.contains("title=Feature Part 1"));
        assert!(scratch.contents.contains("title=Feature Part 2"));
        assert!(scratch.contents.contains("END=250000"));
    }

    #[test]
    fn remove_all_uses_negative_map_metadata() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::ChapterRemove { index: None });

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map_metadata -1"));
        assert!(plan.commands[0].scratch.is_none());
    }

    #[test]
    fn remove_last_chapter_falls_back_to_clear() {
        let out_dir = PathBuf::from("/out");
        let info = media_with_chapters(vec![entry(0, 300, "Only")]);
        let ctx = BuildContext::new(&out_dir).with_media(&info);
        let req = request(Operation::ChapterRemove { index: Some(0) });

        let plan = build(&req, &ctx).unwrap();
        let joined = plan.commands[0].args.join(" ");
        assert!(joined.contains("-map_metadata -1"));
    }

    #[test]
    fn write_validates_overlap() {
        let out_dir = PathBuf::from("/out");
        let ctx = BuildContext::new(&out_dir);
        let req = request(Operation::WriteChapters {
            entries: vec![entry(0, 300, "A"), entry(200, 500, "B")],
        });
        assert!(matches!(
            build(&req, &ctx),
            Err(Error::InvalidParameters(_))
        ));
    }
}
