use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Session-scoped answer mode, chosen by the caller before each turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Surface the documents most likely to contain the answer.
    DocumentSearch,
    /// Answer the question from retrieved passages.
    Inquiry,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::DocumentSearch => "document search",
            Mode::Inquiry => "inquiry",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the displayed transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RawRole {
    Human,
    Ai,
}

/// History entry fed to the query rewriter. Kept in lockstep with [`Turn`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawHistoryEntry {
    pub role: RawRole,
    pub content: String,
}

impl RawHistoryEntry {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: RawRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: RawRole::Ai,
            content: content.into(),
        }
    }
}

/// Source metadata attached to a passage by the ingestion pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassageMetadata {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Zero-based page index for paginated documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl PassageMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    /// Name to show for this source: `file_name` when present, else `source`.
    pub fn display_name(&self) -> &str {
        match self.file_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.source.is_empty() => self.source.as_str(),
            _ => "Unknown",
        }
    }
}

/// A single retrieved unit of text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    pub text: String,
    pub metadata: PassageMetadata,
    pub score: f32,
    /// The issued query that produced this passage.
    #[serde(skip_serializing)]
    #[serde(default)]
    pub query_origin: String,
}

impl Passage {
    pub fn new(text: impl Into<String>, source: impl Into<String>, score: f32) -> Self {
        Self {
            text: text.into(),
            metadata: PassageMetadata::new(source),
            score,
            query_origin: String::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }

    pub fn source_kind(&self) -> SourceKind {
        SourceKind::of(self.source())
    }
}

/// Deduplicated, ordered passages for one turn.
///
/// Identity is the `(text, source)` pair. Order is first-seen order; a later
/// duplicate may raise the stored score but never moves the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PassageSet {
    passages: Vec<Passage>,
}

impl PassageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a passage, returning `true` if it was not already present.
    pub fn insert(&mut self, passage: Passage) -> bool {
        let existing = self
            .passages
            .iter_mut()
            .find(|p| p.text == passage.text && p.metadata.source == passage.metadata.source);

        match existing {
            Some(current) => {
                if passage.score > current.score {
                    current.score = passage.score;
                    current.query_origin = passage.query_origin;
                }
                false
            }
            None => {
                self.passages.push(passage);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Passage> {
        self.passages.iter()
    }

    pub fn as_slice(&self) -> &[Passage] {
        &self.passages
    }

    /// Display names of every source in the set, in order.
    pub fn source_names(&self) -> Vec<&str> {
        self.passages.iter().map(|p| p.metadata.display_name()).collect()
    }
}

impl FromIterator<Passage> for PassageSet {
    fn from_iter<I: IntoIterator<Item = Passage>>(iter: I) -> Self {
        let mut set = PassageSet::new();
        for passage in iter {
            set.insert(passage);
        }
        set
    }
}

impl<'a> IntoIterator for &'a PassageSet {
    type Item = &'a Passage;
    type IntoIter = std::slice::Iter<'a, Passage>;

    fn into_iter(self) -> Self::IntoIter {
        self.passages.iter()
    }
}

/// Whether a source points at a web page or a stored document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Link,
    Document,
}

impl SourceKind {
    pub fn of(source: &str) -> Self {
        if source.starts_with("http") {
            SourceKind::Link
        } else {
            SourceKind::Document
        }
    }
}

/// Where a passage came from, for attribution.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceLocation {
    pub source: String,
    pub display_name: String,
    /// 1-based page number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub kind: SourceKind,
}

/// Result of one turn, handed back to the caller and committed to the session.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LlmResponse {
    pub answer: String,
    pub context: PassageSet,
    pub input: String,
}

impl LlmResponse {
    /// Distinct source locations in context order. The first one is the
    /// main location for document search.
    pub fn locations(&self) -> Vec<SourceLocation> {
        let mut locations: Vec<SourceLocation> = Vec::new();
        for passage in &self.context {
            let page = passage.metadata.page.map(|p| p + 1);
            let seen = locations
                .iter()
                .any(|l| l.source == passage.metadata.source && l.page == page);
            if seen {
                continue;
            }
            locations.push(SourceLocation {
                source: passage.metadata.source.clone(),
                display_name: passage.metadata.display_name().to_string(),
                page,
                kind: passage.source_kind(),
            });
        }
        locations
    }
}

/// A message in the wire format shared by chat-completion providers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            Role::User => ChatMessage::user(turn.content.clone()),
            Role::Assistant => ChatMessage::assistant(turn.content.clone()),
        }
    }
}

impl From<&RawHistoryEntry> for ChatMessage {
    fn from(entry: &RawHistoryEntry) -> Self {
        match entry.role {
            RawRole::Human => ChatMessage::user(entry.content.clone()),
            RawRole::Ai => ChatMessage::assistant(entry.content.clone()),
        }
    }
}

/// Turn request
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub mode: Mode,
    pub message: String,
}

/// Turn response: the committed result plus attribution.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub mode: Mode,
    #[serde(flatten)]
    pub response: LlmResponse,
    pub locations: Vec<SourceLocation>,
}
