//! Chunking: splits the input stream into bounded, in-order slices.
//!
//! Each chunk is at most `max` bytes. When the cut would land inside a UTF-8
//! sequence of otherwise valid text, it backs off to the previous character
//! boundary so the chunk can travel as a plain JSON string.

use bytes::Bytes;

/// Length of the next chunk to cut from the front of `input`.
///
/// Returns 0 only for empty input (or `max == 0`).
pub fn next_chunk_len(input: &[u8], max: usize) -> usize {
    if input.len() <= max {
        return input.len();
    }
    match std::str::from_utf8(&input[..max]) {
        Ok(_) => max,
        // Only a truncated trailing character is wrong: cut before it.
        Err(e) if e.error_len().is_none() && e.valid_up_to() > 0 => e.valid_up_to(),
        Err(_) => max,
    }
}

/// Split the front chunk off `remaining`, or `None` once it is exhausted.
pub fn split_chunk(remaining: &mut Bytes, max: usize) -> Option<Bytes> {
    let len = next_chunk_len(&remaining[..], max);
    if len == 0 {
        return None;
    }
    Some(remaining.split_to(len))
}

/// Iterator over the chunks of a buffer.
pub struct Chunks {
    remaining: Bytes,
    max: usize,
}

impl Iterator for Chunks {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        split_chunk(&mut self.remaining, self.max)
    }
}

/// Chunks of `input`, each at most `max` bytes.
pub fn chunks(input: Bytes, max: usize) -> Chunks {
    Chunks {
        remaining: input,
        max,
    }
}
