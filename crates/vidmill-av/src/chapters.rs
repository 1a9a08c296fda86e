//! Pure transformations over chapter sequences.
//!
//! Every function takes the current sequence by reference and returns a new
//! one. After any edit the result is re-sorted by start time, checked for
//! overlaps, and re-indexed to a contiguous 0-based sequence, so indices are
//! never stale identifiers.

use crate::media::ChapterEntry;
use crate::{Error, Result};
use std::time::Duration;

/// Sort by start time and assign contiguous indices from 0.
pub fn reindex(mut entries: Vec<ChapterEntry>) -> Vec<ChapterEntry> {
    entries.sort_by_key(|e| e.start);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.index = i as u32;
    }
    entries
}

fn validate_entry(entry: &ChapterEntry) -> Result<()> {
    if entry.start >= entry.end {
        return Err(Error::invalid_parameters(format!(
            "chapter '{}' must end after it starts",
            entry.title
        )));
    }
    Ok(())
}

fn validate_sequence(sorted: &[ChapterEntry]) -> Result<()> {
    for pair in sorted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(Error::invalid_parameters(format!(
                "chapters '{}' and '{}' overlap",
                pair[0].title, pair[1].title
            )));
        }
    }
    Ok(())
}

fn check_index(index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(Error::ChapterIndexOutOfRange { index, len });
    }
    Ok(())
}

/// Insert new entries, re-sort and re-index. Fails on any overlap.
pub fn add(existing: &[ChapterEntry], new_entries: &[ChapterEntry]) -> Result<Vec<ChapterEntry>> {
    for entry in new_entries {
        validate_entry(entry)?;
    }

    let mut merged: Vec<ChapterEntry> = existing.to_vec();
    merged.extend_from_slice(new_entries);
    let merged = reindex(merged);
    validate_sequence(&merged)?;
    Ok(merged)
}

/// Apply the provided fields to the chapter at `index`, then re-validate
/// ordering and overlap against its neighbors.
pub fn edit(
    existing: &[ChapterEntry],
    index: usize,
    new_start: Option<Duration>,
    new_end: Option<Duration>,
    new_title: Option<&str>,
) -> Result<Vec<ChapterEntry>> {
    check_index(index, existing.len())?;

    let mut entries = existing.to_vec();
    let entry = &mut entries[index];
    if let Some(start) = new_start {
        entry.start = start;
    }
    if let Some(end) = new_end {
        entry.end = end;
    }
    if let Some(title) = new_title {
        entry.title = title.to_string();
    }
    validate_entry(entry)?;

    let entries = reindex(entries);
    validate_sequence(&entries)?;
    Ok(entries)
}

/// Split the chapter at `index` into two at `at`, which must fall strictly
/// inside the chapter.
pub fn split(existing: &[ChapterEntry], index: usize, at: Duration) -> Result<Vec<ChapterEntry>> {
    check_index(index, existing.len())?;

    let target = &existing[index];
    if at <= target.start || at >= target.end {
        return Err(Error::invalid_parameters(format!(
            "split point must fall inside chapter '{}'",
            target.title
        )));
    }

    let mut entries = existing.to_vec();
    let original = entries.remove(index);
    entries.push(ChapterEntry::new(
        original.start,
        at,
        format!("{} Part 1", original.title),
    ));
    entries.push(ChapterEntry::new(
        at,
        original.end,
        format!("{} Part 2", original.title),
    ));

    Ok(reindex(entries))
}

/// Join the chapter at `index` with its successor, keeping the first title
/// (with any " Part 1" suffix stripped). Inverse of [`split`] on boundaries.
pub fn merge(existing: &[ChapterEntry], index: usize) -> Result<Vec<ChapterEntry>> {
    check_index(index, existing.len())?;
    if index + 1 >= existing.len() {
        return Err(Error::invalid_parameters(
            "merge requires a chapter after the target",
        ));
    }

    let mut entries = existing.to_vec();
    let second = entries.remove(index + 1);
    let first = entries.remove(index);

    let title = first
        .title
        .strip_suffix(" Part 1")
        .unwrap_or(&first.title)
        .to_string();
    entries.push(ChapterEntry::new(first.start, second.end, title));

    Ok(reindex(entries))
}

/// Remove the chapter at `index`, re-indexing the remainder.
pub fn remove_at(existing: &[ChapterEntry], index: usize) -> Result<Vec<ChapterEntry>> {
    check_index(index, existing.len())?;

    let mut entries = existing.to_vec();
    entries.remove(index);
    Ok(reindex(entries))
}

/// Drop the whole chapter sequence.
pub fn clear(_existing: &[ChapterEntry]) -> Vec<ChapterEntry> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn chapter(start: u64, end: u64, title: &str) -> ChapterEntry {
        ChapterEntry::new(secs(start), secs(end), title)
    }

    #[test]
    fn add_to_empty_assigns_contiguous_indices() {
        let added = add(
            &[],
            &[chapter(0, 300, "Intro"), chapter(301, 600, "Part 1")],
        )
        .unwrap();

        assert_eq!(added.len(), 2);
        assert_eq!(added[0].index, 0);
        assert_eq!(added[0].title, "Intro");
        assert_eq!(added[1].index, 1);
        assert_eq!(added[1].title, "Part 1");
    }

    #[test]
    fn add_sorts_by_start_time() {
        let added = add(
            &[chapter(600, 900, "Late")],
            &[chapter(0, 300, "Early")],
        )
        .unwrap();

        assert_eq!(added[0].title, "Early");
        assert_eq!(added[1].title, "Late");
        assert_eq!(added[0].index, 0);
        assert_eq!(added[1].index, 1);
    }

    #[test]
    fn add_rejects_overlap() {
        let existing = [chapter(0, 300, "Intro")];
        let result = add(&existing, &[chapter(200, 400, "Clash")]);
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn add_rejects_degenerate_entry() {
        let result = add(&[], &[chapter(100, 100, "Zero")]);
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn touching_boundaries_are_allowed() {
        let added = add(
            &[chapter(0, 300, "A")],
            &[chapter(300, 600, "B")],
        )
        .unwrap();
        assert_eq!(added.len(), 2);
    }

    #[test]
    fn edit_end_leaves_neighbor_unchanged() {
        let existing = add(
            &[],
            &[chapter(0, 300, "Intro"), chapter(301, 600, "Part 1")],
        )
        .unwrap();

        let edited = edit(&existing, 0, None, Some(secs(240)), None).unwrap();
        assert_eq!(edited[0].end, secs(240));
        assert_eq!(edited[1].start, secs(301));
        assert_eq!(edited[1].end, secs(600));
        assert_eq!(edited[1].index, 1);
    }

    #[test]
    fn edit_out_of_range() {
        let existing = [chapter(0, 300, "Intro")];
        let result = edit(&existing, 5, None, None, Some("Renamed"));
        assert!(matches!(
            result,
            Err(Error::ChapterIndexOutOfRange { index: 5, len: 1 })
        ));
    }

    #[test]
    fn edit_rejects_introduced_overlap() {
        let existing = [chapter(0, 300, "A"), chapter(300, 600, "B")];
        let result = edit(&existing, 0, None, Some(secs(400)), None);
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn split_then_merge_round_trips_boundaries() {
        let existing = [chapter(0, 600, "Feature")];
        let split_out = split(&existing, 0, secs(250)).unwrap();
        assert_eq!(split_out.len(), 2);
        assert_eq!(split_out[0].end, secs(250));
        assert_eq!(split_out[1].start, secs(250));

        let merged = merge(&split_out, 0).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start, existing[0].start);
        assert_eq!(merged[0].end, existing[0].end);
        assert_eq!(merged[0].title, "Feature");
    }

    #[test]
    fn split_requires_interior_point() {
        let existing = [chapter(100, 200, "A")];
        assert!(split(&existing, 0, secs(100)).is_err());
        assert!(split(&existing, 0, secs(200)).is_err());
        assert!(split(&existing, 0, secs(50)).is_err());
    }

    #[test]
    fn indices_always_contiguous_after_edits() {
        let mut entries = add(
            &[],
            &[
                chapter(0, 100, "A"),
                chapter(100, 200, "B"),
                chapter(200, 300, "C"),
            ],
        )
        .unwrap();

        entries = remove_at(&entries, 1).unwrap();
        entries = split(&entries, 1, secs(250)).unwrap();

        let indices: Vec<u32> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(entries.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn clear_drops_everything() {
        let existing = [chapter(0, 100, "A")];
        assert!(clear(&existing).is_empty());
    }
}
