/*
 * SHA256 digest helpers. Documents record the digest of their content at the
 * last successful save; comparing it against the digest of the working
 * buffer is how the changed-flag is computed without diffing content.
 */
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

// Digest of an in-memory buffer, hex encoded.
pub fn digest_str(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/*
 * Calculates the SHA256 digest of a file on disk, hex encoded. Reads in
 * chunks so large content files do not need to fit in memory twice. Returns
 * an `io::Error` if the path is not a file or reading fails.
 */
pub fn digest_file(file_path: &Path) -> io::Result<String> {
    log::trace!("ChecksumUtils: Calculating SHA256 digest for {file_path:?}");
    if !file_path.is_file() {
        let err_msg = format!("Path {file_path:?} is not a file, cannot calculate digest.");
        log::warn!("ChecksumUtils: {err_msg}");
        return Err(io::Error::new(io::ErrorKind::InvalidInput, err_msg));
    }

    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0; 1024 * 4];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_digest_str_matches_digest_file() {
        let content = "mov eax, 1\nret\n";
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.as_file_mut().write_all(content.as_bytes()).unwrap();

        let from_file = digest_file(temp_file.path()).unwrap();
        assert_eq!(from_file, digest_str(content));
    }

    #[test]
    fn test_digest_str_empty() {
        // SHA256 of the empty string
        assert_eq!(
            digest_str(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_digest_file_non_existing() {
        let path = Path::new("this_file_should_not_exist_for_digest_test.txt");
        assert!(!path.exists());

        let err = digest_file(path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_digest_file_for_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = digest_file(temp_dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
