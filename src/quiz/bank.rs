//! Question banks loaded from a directory of JSON files, one file per topic.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Separators tried in order when a label is embedded in option text.
const LABEL_SEPARATORS: [char; 3] = ['.', ')', ':'];

/// Longest topic name whose `topic_<name>` button payload fits Telegram's
/// 64-byte callback data limit.
pub const MAX_TOPIC_NAME_BYTES: usize = 64 - crate::quiz::telegram::TOPIC_PREFIX.len();

/// Errors that can occur while loading question banks.
#[derive(Debug)]
pub enum LoadError {
    /// The question root is missing or unreadable.
    Root { path: PathBuf, source: std::io::Error },
    /// The question root exists but is a file.
    NotADirectory(PathBuf),
    /// Failed to read a topic file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse a topic file.
    ParseJson { topic: String, source: serde_json::Error },
    /// A question breaks a bank invariant.
    Invalid { topic: String, question: usize, reason: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root { path, source } => {
                write!(f, "cannot access question directory '{}': {}", path.display(), source)
            }
            Self::NotADirectory(path) => write!(f, "'{}' is not a directory", path.display()),
            Self::ReadFile { path, source } => {
                write!(f, "failed to read topic file '{}': {}", path.display(), source)
            }
            Self::ParseJson { topic, source } => {
                write!(f, "failed to parse topic '{}': {}", topic, source)
            }
            Self::Invalid { topic, question, reason } => {
                write!(f, "topic '{}', question #{}: {}", topic, question, reason)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Root { source, .. } => Some(source),
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::NotADirectory(_) | Self::Invalid { .. } => None,
        }
    }
}

/// Extract the option label from text like `"A. Paris"` or `"b) London"`.
///
/// The first separator of `.`, `)`, `:` that occurs in the text wins (in that
/// order, not by position). Without a separator the first character is used.
pub fn extract_label(text: &str) -> String {
    for sep in LABEL_SEPARATORS {
        if let Some((prefix, _)) = text.split_once(sep) {
            return prefix.trim().to_uppercase();
        }
    }
    text.chars().next().map(|c| c.to_uppercase().collect::<String>()).unwrap_or_default()
}

/// Split a legacy `"A. text"` option into its label and display text.
fn split_prefixed_option(text: &str) -> (String, String) {
    for sep in LABEL_SEPARATORS {
        if let Some((prefix, rest)) = text.split_once(sep) {
            return (prefix.trim().to_uppercase(), rest.trim().to_string());
        }
    }
    (extract_label(text), text.trim().to_string())
}

/// Question identifier as found in the source file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QuestionId {
    Number(i64),
    Text(String),
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOptions {
    Labelled(BTreeMap<String, String>),
    Prefixed(Vec<String>),
}

#[derive(Deserialize)]
struct RawQuestion {
    id: Option<QuestionId>,
    question: String,
    options: RawOptions,
    #[serde(default)]
    correct_answer: Vec<String>,
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    /// `(label, text)` pairs sorted by label.
    pub options: Vec<(String, String)>,
    /// Normalized labels of the correct options.
    pub correct: BTreeSet<String>,
}

impl Question {
    pub fn option_text(&self, label: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(l, _)| l.eq_ignore_ascii_case(label))
            .map(|(_, text)| text.as_str())
    }

    /// Case-insensitive exact match against the correct labels.
    pub fn is_correct(&self, label: &str) -> bool {
        let label = label.trim().to_uppercase();
        !label.is_empty() && self.correct.contains(&label)
    }

    /// The label reported back when an answer is wrong.
    pub fn primary_answer(&self) -> (&str, &str) {
        let label = self.correct.iter().next().map(String::as_str).unwrap_or_default();
        (label, self.option_text(label).unwrap_or_default())
    }

    fn from_raw(topic: &str, index: usize, raw: RawQuestion) -> Result<Self, LoadError> {
        let invalid = |reason: String| LoadError::Invalid {
            topic: topic.to_string(),
            question: index + 1,
            reason,
        };

        if raw.question.trim().is_empty() {
            return Err(invalid("empty question text".into()));
        }

        let mut options: Vec<(String, String)> = match raw.options {
            RawOptions::Labelled(map) => map
                .into_iter()
                .map(|(label, text)| (label.trim().to_uppercase(), text))
                .collect(),
            RawOptions::Prefixed(list) => list.iter().map(|s| split_prefixed_option(s)).collect(),
        };
        options.sort_by(|a, b| a.0.cmp(&b.0));

        if options.is_empty() {
            return Err(invalid("no options".into()));
        }
        let mut seen = HashSet::new();
        for (label, _) in &options {
            if label.is_empty() {
                return Err(invalid("option with empty label".into()));
            }
            if !seen.insert(label.as_str()) {
                return Err(invalid(format!("duplicate option label '{}'", label)));
            }
        }

        // A correct answer is either an option label ("AB", "10") or a
        // prefixed option text ("A. Paris") reduced to its label.
        let correct: BTreeSet<String> = raw
            .correct_answer
            .iter()
            .map(|l| {
                let token = l.trim().to_uppercase();
                if seen.contains(token.as_str()) { token } else { extract_label(l) }
            })
            .collect();
        if correct.is_empty() {
            return Err(invalid("no correct answer".into()));
        }
        if let Some(missing) = correct.iter().find(|l| !seen.contains(l.as_str())) {
            return Err(invalid(format!("correct answer '{}' is not among the options", missing)));
        }

        Ok(Self {
            id: raw.id.unwrap_or(QuestionId::Number(index as i64 + 1)),
            prompt: raw.question,
            options,
            correct,
        })
    }
}

/// A named group of questions sourced from one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub name: String,
    pub questions: Vec<Question>,
}

impl Topic {
    /// Parse and validate one topic source.
    pub fn from_json(name: &str, content: &str) -> Result<Self, LoadError> {
        if name.is_empty() || name.len() > MAX_TOPIC_NAME_BYTES {
            return Err(LoadError::Invalid {
                topic: name.to_string(),
                question: 0,
                reason: format!("topic name must be 1 to {} bytes long", MAX_TOPIC_NAME_BYTES),
            });
        }
        let raw: Vec<RawQuestion> = serde_json::from_str(content).map_err(|e| LoadError::ParseJson {
            topic: name.to_string(),
            source: e,
        })?;
        if raw.is_empty() {
            return Err(LoadError::Invalid {
                topic: name.to_string(),
                question: 0,
                reason: "topic has no questions".into(),
            });
        }
        let questions = raw
            .into_iter()
            .enumerate()
            .map(|(i, q)| Question::from_raw(name, i, q))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { name: name.to_string(), questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// All topics, keyed by name. Read-only once loaded.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    topics: BTreeMap<String, Topic>,
}

impl QuestionBank {
    pub fn new(topics: impl IntoIterator<Item = Topic>) -> Self {
        Self {
            topics: topics.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// Load every `*.json` file directly inside `dir` as a topic.
    ///
    /// Broken topic files are skipped with a warning. Only an inaccessible
    /// root is an error.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LoadError> {
        let dir = dir.as_ref();
        let meta = std::fs::metadata(dir).map_err(|e| LoadError::Root {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if !meta.is_dir() {
            return Err(LoadError::NotADirectory(dir.to_path_buf()));
        }
        let entries = std::fs::read_dir(dir).map_err(|e| LoadError::Root {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut topics = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            if path.is_dir() {
                continue;
            }
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            if !is_json {
                continue;
            }
            match load_topic_file(&path) {
                Ok(topic) => {
                    info!("Loaded topic '{}' ({} questions) from {}", topic.name, topic.len(), path.display());
                    topics.push(topic);
                }
                Err(e) => warn!("Skipping topic file: {}", e),
            }
        }

        Ok(Self::new(topics))
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    /// Topic names in sorted order.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

fn load_topic_file(path: &Path) -> Result<Topic, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Topic::from_json(&name, &content)
}
