//! Line/offset tracking (C2).
//!
//! Maps absolute byte offsets in a seekable stream to 1-based line
//! numbers, and provides the equivalent arithmetic for the in-memory
//! recursion the structured chunker performs once it has read a
//! top-level chunk's text into a string.

use std::io::{Read, Seek, SeekFrom};

/// Counts `\n` bytes in `bytes`.
#[must_use]
pub fn count_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}

/// Computes `(start_line, end_line)` for the byte range
/// `[offset, offset + length)` of `stream`, counting `\n` bytes from
/// the start of the stream. Restores the stream's prior seek position
/// on every exit path.
///
/// `start_line` is `1 + (newlines strictly before offset)`; `end_line`
/// is `start_line + (newlines within the range)`.
///
/// I/O errors degrade to `(1, 1)` rather than propagating, per the
/// spec: line numbers are a best-effort convenience, not load-bearing
/// for correctness of the chunk's `Text`.
pub fn lines_at<S: Read + Seek>(stream: &mut S, offset: u64, length: u64) -> (usize, usize) {
    let result = (|| -> std::io::Result<(usize, usize)> {
        let prior = stream.stream_position()?;
        let restore = |s: &mut S| {
            let _ = s.seek(SeekFrom::Start(prior));
        };

        let before = match read_and_count(stream, 0, offset) {
            Ok(n) => n,
            Err(e) => {
                restore(stream);
                return Err(e);
            }
        };
        let within = match read_and_count(stream, offset, length) {
            Ok(n) => n,
            Err(e) => {
                restore(stream);
                return Err(e);
            }
        };
        restore(stream);
        Ok((1 + before, 1 + before + within))
    })();

    result.unwrap_or((1, 1))
}

/// Seeks to `start` and counts `\n` bytes across the following `len`
/// bytes (or until EOF), reading in fixed-size chunks to avoid
/// buffering the whole prefix in memory.
fn read_and_count<S: Read + Seek>(stream: &mut S, start: u64, len: u64) -> std::io::Result<usize> {
    const BUF_SIZE: usize = 64 * 1024;
    stream.seek(SeekFrom::Start(start))?;
    let mut remaining = len;
    let mut buf = [0u8; BUF_SIZE];
    let mut count = 0usize;
    while remaining > 0 {
        let to_read = remaining.min(BUF_SIZE as u64) as usize;
        let n = stream.read(&mut buf[..to_read])?;
        if n == 0 {
            break;
        }
        count += count_newlines(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(count)
}

/// Computes `(start_line, end_line)` for a sub-range `[offset, offset +
/// length)` of an in-memory string, given the 1-based line number
/// `base_line` that `offset == 0` corresponds to. Used by the
/// structured chunker's text-level recursion (C4 step 7), which
/// operates on an already-read parent chunk's text rather than the
/// original stream.
#[must_use]
pub fn lines_in_text(text: &str, offset: usize, length: usize, base_line: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    let end = (offset + length).min(bytes.len());
    let offset = offset.min(bytes.len());
    let before = count_newlines(&bytes[..offset]);
    let within = count_newlines(&bytes[offset..end]);
    (base_line + before, base_line + before + within)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn single_line_input() {
        let mut stream = Cursor::new(b"Hello, World!".to_vec());
        let (start, end) = lines_at(&mut stream, 0, 13);
        assert_eq!((start, end), (1, 1));
    }

    #[test]
    fn four_line_input_matches_scenario_a() {
        let text = "Hello, World!\nThis is a test.\nLine 3.\nLine 4.";
        let mut stream = Cursor::new(text.as_bytes().to_vec());
        let (start, end) = lines_at(&mut stream, 0, text.len() as u64);
        assert_eq!((start, end), (1, 4));
    }

    #[test]
    fn restores_seek_position() {
        let mut stream = Cursor::new(b"abc\ndef\nghi".to_vec());
        stream.seek(SeekFrom::Start(5)).unwrap_or_default();
        let _ = lines_at(&mut stream, 0, 11);
        assert_eq!(stream.stream_position().unwrap_or_default(), 5);
    }

    #[test]
    fn midstream_range_counts_only_its_own_newlines() {
        let text = "a\nb\nc\nd\ne";
        let mut stream = Cursor::new(text.as_bytes().to_vec());
        // Range covering "c\nd" starts at offset 4, length 3.
        let (start, end) = lines_at(&mut stream, 4, 3);
        assert_eq!((start, end), (3, 4));
    }

    #[test]
    fn lines_in_text_offsets_from_base_line() {
        let text = "one\ntwo\nthree";
        let (start, end) = lines_in_text(text, 4, 3, 5);
        assert_eq!((start, end), (6, 6));
    }
}
