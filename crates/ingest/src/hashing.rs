//! SHA-256 evidence hashing.
//!
//! Every ingested file is fingerprinted before parsing so findings can be
//! tied back to the exact bytes that produced them.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Hash everything `reader` yields, in fixed-size chunks. Lowercase hex.
pub fn sha256_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sha256_file(path: &Path) -> io::Result<String> {
    sha256_reader(File::open(path)?)
}

/// Compare a file against a recorded hash, ignoring hex case.
pub fn verify_file(path: &Path, expected: &str) -> io::Result<bool> {
    let actual = sha256_file(path)?;
    Ok(actual.eq_ignore_ascii_case(expected.trim()))
}

pub fn sha256_str(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
    const EMPTY: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_sha256_str_known_vectors() {
        assert_eq!(sha256_str("abc"), ABC);
        assert_eq!(sha256_str(""), EMPTY);
    }

    #[test]
    fn test_file_hash_matches_string_hash() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        assert_eq!(sha256_file(file.path()).unwrap(), ABC);
        assert!(verify_file(file.path(), &ABC.to_uppercase()).unwrap());
        assert!(!verify_file(file.path(), EMPTY).unwrap());
    }

    #[test]
    fn test_multi_chunk_input() {
        let data = vec![b'x'; CHUNK_SIZE * 2 + 17];
        let text = String::from_utf8(data.clone()).unwrap();
        assert_eq!(sha256_reader(data.as_slice()).unwrap(), sha256_str(&text));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(sha256_file(Path::new("/nonexistent/evidence.log")).is_err());
    }
}
