//! Escaped key/value text format backing the hash cache
//!
//! One `key=value` pair per line. Keys may contain spaces, escaped as `\ `.
//! Lines starting with `#` or `!` are comments. A missing file loads as an
//! empty map.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

pub fn load(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut props = BTreeMap::new();

    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(props),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    for line in text.lines() {
        if line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            props.insert(unescape_key(key.trim()), value.trim().to_string());
        }
    }
    Ok(props)
}

pub fn escape_key(key: &str) -> String {
    key.replace(' ', "\\ ")
}

pub fn unescape_key(key: &str) -> String {
    key.replace("\\ ", " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_roundtrip() {
        let key = "1700000000000 42 dir with spaces/file name.txt";
        assert_eq!(unescape_key(&escape_key(key)), key);
        assert_eq!(escape_key("a b"), "a\\ b");
    }

    #[test]
    fn test_load_missing_file_is_empty() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let props = load(&temp_dir.path().join("absent"))?;
        assert!(props.is_empty());
        Ok(())
    }

    #[test]
    fn test_load_skips_comments() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("props");
        std::fs::write(&path, "#header\n!bang comment\nkey=value\n")?;

        let props = load(&path)?;
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("key").map(String::as_str), Some("value"));
        Ok(())
    }

    #[test]
    fn test_load_unescapes_keys() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("props");
        std::fs::write(&path, "123\\ 456\\ a\\ b.txt=abcd\n")?;

        let props = load(&path)?;
        assert_eq!(props.get("123 456 a b.txt").map(String::as_str), Some("abcd"));
        Ok(())
    }

    #[test]
    fn test_load_splits_on_first_equals() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("props");
        std::fs::write(&path, "key=value=with=equals\nno equals sign here\n")?;

        let props = load(&path)?;
        assert_eq!(props.len(), 1);
        assert_eq!(props.get("key").map(String::as_str), Some("value=with=equals"));
        Ok(())
    }
}
