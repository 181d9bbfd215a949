//! Splits a record collection into size-bounded chunks.
//!
//! Chunks are contiguous, order-preserving slices of the input. A record is
//! never split: one that alone exceeds the limit gets a chunk of its own.

use serde::Serialize;

/// Compact JSON length of `record`, in bytes.
pub fn serialized_size<T: Serialize>(record: &T) -> serde_json::Result<usize> {
    Ok(serde_json::to_vec(record)?.len())
}

/// Greedy first-fit chunking in input order.
///
/// ```rust
/// use resolved_by_directory::chunk_codec::chunk;
///
/// let records = vec!["aaaa", "bbbb", "cccc"]; // 6 bytes each once quoted
/// let chunks = chunk(&records, 12)?;
/// assert_eq!(chunks, vec![&records[0..2], &records[2..3]]);
/// # Ok::<(), serde_json::Error>(())
/// ```
pub fn chunk<T: Serialize>(records: &[T], limit: usize) -> serde_json::Result<Vec<&[T]>> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut current_size = 0usize;

    for (index, record) in records.iter().enumerate() {
        let size = serialized_size(record)?;
        if current_size.saturating_add(size) > limit && index > start {
            chunks.push(&records[start..index]);
            start = index;
            current_size = size;
        } else {
            current_size = current_size.saturating_add(size);
        }
    }

    if start < records.len() {
        chunks.push(&records[start..]);
    }

    Ok(chunks)
}
