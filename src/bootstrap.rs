//! Line oriented bootstrap files.
//!
//! A neighbors file holds one `host:port` per line, a keys file one
//! `key value` pair per line. Blank lines are skipped in both.

use std::fs;
use std::path::Path;

use crate::common::{FormatError, PeerAddress};
use crate::error::NodeError;

/// Parses and resolves one address per non-blank line.
///
/// Stops at the first line that does not resolve.
pub fn parse_neighbors(content: &str) -> Result<Vec<PeerAddress>, FormatError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PeerAddress::resolve)
        .collect()
}

/// Parses one `key value` pair per non-blank line.
///
/// A line with any other number of tokens is a [FormatError::InvalidEntry].
pub fn parse_keys(content: &str) -> Result<Vec<(String, String)>, FormatError> {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut tokens = line.split_whitespace();

            match (tokens.next(), tokens.next(), tokens.next()) {
                (Some(key), Some(value), None) => Ok((key.to_string(), value.to_string())),
                _ => Err(FormatError::InvalidEntry(line.to_string())),
            }
        })
        .collect()
}

/// Reads and parses a neighbors file, see [parse_neighbors].
pub fn read_neighbors(path: impl AsRef<Path>) -> Result<Vec<PeerAddress>, NodeError> {
    let content = fs::read_to_string(path)?;

    Ok(parse_neighbors(&content)?)
}

/// Reads and parses a keys file, see [parse_keys].
pub fn read_keys(path: impl AsRef<Path>) -> Result<Vec<(String, String)>, NodeError> {
    let content = fs::read_to_string(path)?;

    Ok(parse_keys(&content)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn neighbors_skip_blank_lines() {
        let neighbors = parse_neighbors("127.0.0.1:5001\n\n  127.0.0.1:5002  \n").unwrap();

        assert_eq!(
            neighbors,
            vec![
                PeerAddress::resolve("127.0.0.1:5001").unwrap(),
                PeerAddress::resolve("127.0.0.1:5002").unwrap(),
            ]
        );
    }

    #[test]
    fn unresolvable_neighbor() {
        assert!(matches!(
            parse_neighbors("127.0.0.1:5001\nnot an address\n"),
            Err(FormatError::InvalidAddress(_))
        ));
    }

    #[test]
    fn keys() {
        let keys = parse_keys("alpha 1\r\n\nbeta\t2\n").unwrap();

        assert_eq!(
            keys,
            vec![
                ("alpha".to_string(), "1".to_string()),
                ("beta".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn malformed_key_line() {
        assert_eq!(
            parse_keys("alpha 1\nbeta\n"),
            Err(FormatError::InvalidEntry("beta".to_string()))
        );
        assert!(parse_keys("alpha 1 extra").is_err());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_keys("/nonexistent/peersearch/keys.txt"),
            Err(NodeError::IO(_))
        ));
    }
}
