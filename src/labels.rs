use std::path::Path;

use crate::error::{Error, Result};

/// Class names, one per model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    /// Read a label file with one label per line.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let labels = Self::parse(&content);
        if labels.is_empty() {
            return Err(Error::EmptyLabels(path.to_path_buf()));
        }

        log::info!("Loaded {} labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Parse labels from text. Blank lines are kept so that line `i` is always label `i`.
    pub fn parse(content: &str) -> Self {
        // `lines` strips `\r\n` and does not yield an entry after a trailing newline
        let names = content.lines().map(|line| line.to_string()).collect();
        Self { names }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Labels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_positions() {
        let labels = Labels::parse("dummy\r\nkit fox\n\nEnglish setter\n");

        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(1), Some("kit fox"));
        assert_eq!(labels.get(2), Some(""));
        assert_eq!(labels.get(3), Some("English setter"));
        assert_eq!(labels.get(4), None);
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(Labels::from_file(&path), Err(Error::EmptyLabels(_))));
    }
}
