//! Topic sampler: deterministic per-index work items.

use std::io::ErrorKind;
use std::path::Path;

use crate::models::{KothasetError, Result};

/// Maps sample indices onto topic strings.
///
/// Topics come from a file (one per line, `#` comments and blanks skipped)
/// or from a single inline topic. Index-based addressing keeps coverage
/// deterministic and resume-safe: `sample(i)` is total and pure.
#[derive(Debug, Clone)]
pub struct TopicSampler {
    topics: Vec<String>,
}

impl TopicSampler {
    /// Build a sampler from a path or an inline topic.
    ///
    /// The input is a file if it exists as a regular file; otherwise it is
    /// treated as one inline topic. An unreadable path that looks file-like
    /// (contains `/`, `\` or `.`) is an access error rather than a topic.
    pub fn new(input: &str) -> Result<Self> {
        match std::fs::metadata(input) {
            Ok(meta) if meta.is_file() => return Self::from_file(Path::new(input)),
            Ok(_) => {}
            Err(e) if e.kind() != ErrorKind::NotFound && looks_like_path(input) => {
                return Err(KothasetError::InputAccessDenied {
                    path: input.to_string(),
                    source: e,
                });
            }
            Err(_) => {}
        }

        let topic = input.trim();
        if topic.is_empty() {
            return Err(KothasetError::InputEmpty);
        }

        Ok(Self {
            topics: vec![topic.to_string()],
        })
    }

    /// Build a sampler from a topics file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KothasetError::io("reading topics file", e))?;

        let topics: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if topics.is_empty() {
            return Err(KothasetError::InputEmpty);
        }

        Ok(Self { topics })
    }

    /// Topic for the given sample index: `topics[i mod count]`.
    pub fn sample(&self, index: usize) -> &str {
        &self.topics[index % self.topics.len()]
    }

    /// Number of loaded topics. Always at least 1.
    pub fn count(&self) -> usize {
        self.topics.len()
    }

    /// A copy of all loaded topics.
    pub fn topics(&self) -> Vec<String> {
        self.topics.clone()
    }
}

fn looks_like_path(input: &str) -> bool {
    input.contains('/') || input.contains('\\') || input.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as IoWrite;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn reads_topics_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# comment line").unwrap();
        writeln!(file, "rust ownership").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  async runtimes  ").unwrap();
        file.flush().unwrap();

        let sampler = TopicSampler::new(file.path().to_str().unwrap()).unwrap();
        assert_eq!(sampler.count(), 2);
        assert_eq!(sampler.sample(0), "rust ownership");
        assert_eq!(sampler.sample(1), "async runtimes");
    }

    #[test]
    fn wraps_indices_with_modulo() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a\nb\nc").unwrap();
        file.flush().unwrap();

        let sampler = TopicSampler::new(file.path().to_str().unwrap()).unwrap();
        for i in 0..30 {
            assert_eq!(sampler.sample(i), sampler.topics()[i % 3]);
        }
    }

    #[test]
    fn empty_file_is_input_empty() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# only comments\n\n   ").unwrap();
        file.flush().unwrap();

        let err = TopicSampler::new(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, KothasetError::InputEmpty));
    }

    #[test]
    fn nonexistent_plain_string_is_inline_topic() {
        let sampler = TopicSampler::new("gardening tips").unwrap();
        assert_eq!(sampler.count(), 1);
        assert_eq!(sampler.sample(5), "gardening tips");
    }

    #[test]
    fn missing_file_like_path_is_inline_topic_when_not_found() {
        // A path that does not exist falls through to inline handling.
        let sampler = TopicSampler::new("no/such/topics.txt").unwrap();
        assert_eq!(sampler.count(), 1);
    }

    #[test]
    fn blank_inline_input_is_input_empty() {
        let err = TopicSampler::new("   ").unwrap_err();
        assert!(matches!(err, KothasetError::InputEmpty));
    }

    #[test]
    fn inaccessible_file_like_path_is_access_denied() {
        // A path routed through a regular file fails with an OS error that
        // is not "not found", and must not fall back to inline handling.
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "not a directory").unwrap();
        let path = file.join("topics.txt");

        let err = TopicSampler::new(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, KothasetError::InputAccessDenied { .. }));
    }

    #[test]
    fn topics_returns_a_copy() {
        let sampler = TopicSampler::new("solo topic").unwrap();
        let mut copy = sampler.topics();
        copy.push("mutated".to_string());
        assert_eq!(sampler.count(), 1);
    }
}
