//! Numbered line reader for line-oriented formats.
//!
//! Files are read as bytes and decoded as UTF-8 with invalid sequences
//! dropped, so a stray binary byte never fails a whole line.

use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use super::model::ParseError;
use super::MAX_LINE_SIZE;

/// Decode bytes as UTF-8, ignoring invalid sequences.
pub fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => Cow::Borrowed(s),
        Cow::Owned(s) => Cow::Owned(s.replace(char::REPLACEMENT_CHARACTER, "")),
    }
}

/// Iterator over `(line_number, line)` pairs, 1-based, line endings stripped.
pub struct NumberedLines<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: u64,
    done: bool,
}

impl NumberedLines<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ParseError> {
        let file = File::open(path).map_err(|e| ParseError::io(path, e))?;
        Ok(Self::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

impl<R: BufRead> NumberedLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
            line_number: 0,
            done: false,
        }
    }

    /// Consume through the next newline without buffering. Returns bytes skipped.
    fn skip_rest_of_line(&mut self) -> io::Result<usize> {
        let mut skipped = 0;
        loop {
            let (used, found) = match self.reader.fill_buf() {
                Ok([]) => return Ok(skipped),
                Ok(available) => match available.iter().position(|b| *b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.reader.consume(used);
            skipped += used;
            if found {
                return Ok(skipped);
            }
        }
    }

    fn read_error(&mut self, source: io::Error) -> Option<(u64, Result<String, ParseError>)> {
        // A read error mid-file is terminal for this reader
        self.done = true;
        self.line_number += 1;
        Some((
            self.line_number,
            Err(ParseError::Io { path: String::from("<stream>"), source }),
        ))
    }
}

impl<R: BufRead> Iterator for NumberedLines<R> {
    type Item = (u64, Result<String, ParseError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.buf.clear();
        // Never buffer more than one byte past the cap
        let limit = MAX_LINE_SIZE as u64 + 1;
        match (&mut self.reader).take(limit).read_until(b'\n', &mut self.buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => {
                if self.buf.len() > MAX_LINE_SIZE {
                    let mut size = self.buf.len();
                    if self.buf.last() != Some(&b'\n') {
                        match self.skip_rest_of_line() {
                            Ok(skipped) => size += skipped,
                            Err(e) => return self.read_error(e),
                        }
                    }
                    self.line_number += 1;
                    return Some((self.line_number, Err(ParseError::LineTooLarge(size, MAX_LINE_SIZE))));
                }
                self.line_number += 1;
                let mut end = self.buf.len();
                while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                    end -= 1;
                }
                Some((self.line_number, Ok(decode_lossy(&self.buf[..end]).into_owned())))
            }
            Err(e) => self.read_error(e),
        }
    }
}

/// Read up to `count` trimmed, non-empty lines that are not `#` comments.
/// Never fails: an unreadable file yields an empty sample.
pub fn sample_lines(path: &Path, count: usize) -> Vec<String> {
    let lines = match NumberedLines::open(path) {
        Ok(lines) => lines,
        Err(_) => return Vec::new(),
    };
    lines
        .filter_map(|(_, line)| line.ok())
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take(count)
        .collect()
}

/// Read the first line of a file (at most [`MAX_LINE_SIZE`] bytes).
pub fn first_line(path: &Path) -> Option<String> {
    NumberedLines::open(path)
        .ok()?
        .next()
        .and_then(|(_, line)| line.ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_numbers_are_one_based_and_endings_stripped() {
        let data = b"first\r\nsecond\n\nfourth";
        let lines: Vec<_> = NumberedLines::new(Cursor::new(&data[..]))
            .map(|(n, l)| (n, l.unwrap()))
            .collect();
        assert_eq!(lines, vec![
            (1, "first".to_string()),
            (2, "second".to_string()),
            (3, String::new()),
            (4, "fourth".to_string()),
        ]);
    }

    #[test]
    fn test_invalid_utf8_bytes_are_dropped() {
        let data = b"user=\xFFadmin\n";
        let (_, line) = NumberedLines::new(Cursor::new(&data[..])).next().unwrap();
        assert_eq!(line.unwrap(), "user=admin");
    }

    #[test]
    fn test_oversized_line_is_an_error_and_reading_continues() {
        let mut data = vec![b'X'; MAX_LINE_SIZE + 10];
        data.extend_from_slice(b"\nnext\n");
        let mut lines = NumberedLines::new(Cursor::new(data));
        let (n, first) = lines.next().unwrap();
        assert_eq!(n, 1);
        assert!(matches!(first, Err(ParseError::LineTooLarge(_, _))));
        let (n, second) = lines.next().unwrap();
        assert_eq!(n, 2);
        assert_eq!(second.unwrap(), "next");
    }

    #[test]
    fn test_newline_free_file_is_never_fully_buffered() {
        let data = vec![b'X'; MAX_LINE_SIZE * 4];
        let mut lines = NumberedLines::new(Cursor::new(data));

        let (n, first) = lines.next().unwrap();
        assert_eq!(n, 1);
        assert!(matches!(first, Err(ParseError::LineTooLarge(size, _)) if size == MAX_LINE_SIZE * 4));
        assert!(lines.buf.capacity() <= 2 * (MAX_LINE_SIZE + 1));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_first_line_of_huge_single_line_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.log");
        std::fs::write(&path, vec![b'A'; MAX_LINE_SIZE * 3]).unwrap();
        assert_eq!(first_line(&path), None);
    }

    #[test]
    fn test_sample_lines_skips_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.log");
        std::fs::write(&path, "#Fields: a b\n\nline1\n  line2  \nline3\n").unwrap();
        assert_eq!(sample_lines(&path, 2), vec!["line1", "line2"]);
    }

    #[test]
    fn test_sample_lines_missing_file_is_empty() {
        assert!(sample_lines(Path::new("/definitely/not/here.log"), 10).is_empty());
    }
}
