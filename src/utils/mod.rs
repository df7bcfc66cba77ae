pub mod detector;
pub mod payload_loader;

use std::fs::File;
use std::io;
use std::io::BufRead;
use std::path::Path;

/// Reads a list file line-by-line, returning non-empty trimmed lines that
/// are not `#` comments.
pub fn read_lines(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push(trimmed.to_string());
    }
    Ok(lines)
}

/// Reads a payload file. Only the line terminator (`\n` or `\r\n`) is
/// removed; whitespace and `#` are payload bytes. Empty lines are skipped.
pub fn read_payload_lines(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_lines_skips_blanks_and_comments() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "  first  ").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "second").unwrap();

        let lines = read_lines(file.path()).unwrap();
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn test_read_payload_lines_keeps_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"' OR 1=1-- \r\n#\n\n  \n' --").unwrap();

        let lines = read_payload_lines(file.path()).unwrap();
        assert_eq!(lines, vec!["' OR 1=1-- ", "#", "  ", "' --"]);
    }

    #[test]
    fn test_read_lines_missing_file() {
        assert!(read_lines(Path::new("/definitely/not/here.txt")).is_err());
    }
}
