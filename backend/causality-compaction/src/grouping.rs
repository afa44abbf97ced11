//! Greedy batch grouping for a cold partition's small files (spec.md
//! §4.6 step 3): "group them greedily into batches whose summed size
//! approaches (but does not exceed until the last one) `target_size`.
//! Skip batches of fewer than `min_files`."

use causality_objectstore::ObjectSummary;

/// Group `files` (already filtered to those under `target_size`) into
/// batches. Files are consumed in the order given; a batch closes as
/// soon as adding the next file would exceed `target_size`, unless the
/// batch is still empty (a single oversized-relative-to-remaining-budget
/// file still gets its own batch so it isn't stranded forever).
pub fn group_into_batches(
    files: Vec<ObjectSummary>,
    target_size_bytes: u64,
    min_files: usize,
) -> Vec<Vec<ObjectSummary>> {
    let mut batches = Vec::new();
    let mut current: Vec<ObjectSummary> = Vec::new();
    let mut current_size: u64 = 0;

    for file in files {
        if !current.is_empty() && current_size + file.size_bytes > target_size_bytes {
            batches.push(std::mem::take(&mut current));
            current_size = 0;
        }
        current_size += file.size_bytes;
        current.push(file);
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
        .into_iter()
        .filter(|batch| batch.len() >= min_files)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(key: &str, size: u64) -> ObjectSummary {
        ObjectSummary {
            key: key.to_string(),
            size_bytes: size,
        }
    }

    #[test]
    fn groups_small_files_up_to_target_size() {
        let files = vec![
            file("a", 40 * 1024),
            file("b", 40 * 1024),
            file("c", 40 * 1024),
            file("d", 40 * 1024),
        ];
        let batches = group_into_batches(files, 100 * 1024, 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn drops_batches_smaller_than_min_files() {
        let files = vec![file("a", 10 * 1024)];
        let batches = group_into_batches(files, 100 * 1024, 2);
        assert!(batches.is_empty());
    }

    #[test]
    fn ten_small_files_fill_two_batches_at_the_target_size() {
        let files: Vec<_> = (0..10).map(|i| file(&i.to_string(), 20 * 1024)).collect();
        let batches = group_into_batches(files, 100 * 1024, 3);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 5);
        assert_eq!(batches[1].len(), 5);
    }
}
