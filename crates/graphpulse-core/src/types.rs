use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::PulseError;

/// Caller-supplied view of a single file: identity, location, content digest.
/// Ephemeral input to diffing; the graph store keeps the last-known copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub file_id: String,
    pub path: String,
    pub content_hash: String,
}

impl FileDescriptor {
    pub fn new(
        file_id: impl Into<String>,
        path: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            path: path.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// A file whose recorded hash differs from the caller's current hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub descriptor: FileDescriptor,
    pub previous_hash: String,
    pub current_hash: String,
}

/// Partition of one diff run. Every file lands in exactly one bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<FileDescriptor>,
    pub modified: Vec<ModifiedFile>,
    pub deleted: Vec<FileDescriptor>,
    pub unchanged: Vec<FileDescriptor>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len() + self.unchanged.len()
    }

    /// File ids whose extraction batches must be written to the store.
    pub fn needs_apply(&self) -> HashSet<String> {
        self.added
            .iter()
            .map(|f| f.file_id.clone())
            .chain(self.modified.iter().map(|m| m.descriptor.file_id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Function,
    Struct,
    Enum,
    Trait,
    Module,
    Class,
    Interface,
    TypeAlias,
    Variable,
    File,
    Other(String),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Function => "function",
            EntityKind::Struct => "struct",
            EntityKind::Enum => "enum",
            EntityKind::Trait => "trait",
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Interface => "interface",
            EntityKind::TypeAlias => "type-alias",
            EntityKind::Variable => "variable",
            EntityKind::File => "file",
            EntityKind::Other(s) => s.as_str(),
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EntityKind {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "function" => Ok(EntityKind::Function),
            "struct" => Ok(EntityKind::Struct),
            "enum" => Ok(EntityKind::Enum),
            "trait" => Ok(EntityKind::Trait),
            "module" => Ok(EntityKind::Module),
            "class" => Ok(EntityKind::Class),
            "interface" => Ok(EntityKind::Interface),
            "type-alias" => Ok(EntityKind::TypeAlias),
            "variable" => Ok(EntityKind::Variable),
            "file" => Ok(EntityKind::File),
            other => Ok(EntityKind::Other(other.to_string())),
        }
    }
}

/// One graph-store-ready entity row produced by the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRow {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// One graph-store-ready relationship row produced by the extractor.
/// The relationship vocabulary belongs to the store's schema, not this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRow {
    pub from_id: String,
    pub to_id: String,
    pub kind: String,
}

/// Per-file output of the extractor: rows ready for the store plus the
/// content hash the rows were derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionBatch {
    pub file: FileDescriptor,
    pub entities: Vec<EntityRow>,
    pub relationships: Vec<RelationshipRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: u64,
    pub entities: u64,
    pub relationships: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
    Moved,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Moved => "moved",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ChangeKind {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(ChangeKind::Created),
            "modified" => Ok(ChangeKind::Modified),
            "deleted" => Ok(ChangeKind::Deleted),
            "renamed" => Ok(ChangeKind::Renamed),
            "moved" => Ok(ChangeKind::Moved),
            other => Err(PulseError::InvalidArgument(format!(
                "unknown change kind: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeSource {
    Filesystem,
    AiGenerated,
    UserEdit,
    Refactor,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeSource::Filesystem => "filesystem",
            ChangeSource::AiGenerated => "ai-generated",
            ChangeSource::UserEdit => "user-edit",
            ChangeSource::Refactor => "refactor",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ChangeSource {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "filesystem" => Ok(ChangeSource::Filesystem),
            "ai-generated" => Ok(ChangeSource::AiGenerated),
            "user-edit" => Ok(ChangeSource::UserEdit),
            "refactor" => Ok(ChangeSource::Refactor),
            other => Err(PulseError::InvalidArgument(format!(
                "unknown change source: {}",
                other
            ))),
        }
    }
}

/// A bounded window of related observed activity. Owned exclusively by the
/// session tracker; at most one session is active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSession {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub query_count: u64,
    pub change_count: u64,
    pub correlation_count: u64,
    pub active_files: HashSet<String>,
    pub active_entities: HashSet<String>,
    pub active_domains: HashSet<String>,
    pub triggered_reindex_count: u64,
    pub entities_reindexed: u64,
}

impl AdaptiveSession {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            started_at: now,
            last_activity_at: now,
            ended_at: None,
            query_count: 0,
            change_count: 0,
            correlation_count: 0,
            active_files: HashSet::new(),
            active_entities: HashSet::new(),
            active_domains: HashSet::new(),
            triggered_reindex_count: 0,
            entities_reindexed: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Caller input for one observed consumer query. The caller's adapter has
/// already extracted entity ids and file paths from the tool result shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryObservation {
    pub session_id: Option<String>,
    pub tool_name: String,
    pub query: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub result_count: u64,
    pub returned_entity_ids: Vec<String>,
    pub returned_files: Vec<String>,
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub inferred_intent: Option<String>,
}

/// Immutable record of one observed consumer query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedQuery {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub tool_name: String,
    pub query: String,
    pub parameters: serde_json::Value,
    pub result_count: u64,
    pub returned_entity_ids: Vec<String>,
    pub returned_files: Vec<String>,
    pub response_time_ms: u64,
    pub cache_hit: bool,
    pub inferred_intent: Option<String>,
}

impl ObservedQuery {
    pub fn from_observation(obs: QueryObservation, session_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id: session_id.into(),
            tool_name: obs.tool_name,
            query: obs.query,
            parameters: obs.parameters,
            result_count: obs.result_count,
            returned_entity_ids: obs.returned_entity_ids,
            returned_files: obs.returned_files,
            response_time_ms: obs.response_time_ms,
            cache_hit: obs.cache_hit,
            inferred_intent: obs.inferred_intent,
        }
    }
}

/// Caller input for one observed graph change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeObservation {
    pub session_id: Option<String>,
    pub kind: ChangeKind,
    pub file_path: String,
    pub previous_file_path: Option<String>,
    pub entities_added: Vec<String>,
    pub entities_modified: Vec<String>,
    pub entities_deleted: Vec<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub source: ChangeSource,
}

/// Immutable record of one observed graph change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedChange {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub kind: ChangeKind,
    pub file_path: String,
    pub previous_file_path: Option<String>,
    pub entities_added: Vec<String>,
    pub entities_modified: Vec<String>,
    pub entities_deleted: Vec<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub source: ChangeSource,
}

impl ObservedChange {
    pub fn from_observation(obs: ChangeObservation, session_id: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            kind: obs.kind,
            file_path: obs.file_path,
            previous_file_path: obs.previous_file_path,
            entities_added: obs.entities_added,
            entities_modified: obs.entities_modified,
            entities_deleted: obs.entities_deleted,
            lines_added: obs.lines_added,
            lines_deleted: obs.lines_deleted,
            source: obs.source,
        }
    }

    /// Every entity id the change touched, across added/modified/deleted.
    pub fn touched_entities(&self) -> impl Iterator<Item = &String> {
        self.entities_added
            .iter()
            .chain(self.entities_modified.iter())
            .chain(self.entities_deleted.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrelationKind {
    QueryThenCreate,
    QueryThenEdit,
    QueryThenDelete,
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CorrelationKind::QueryThenCreate => "query-then-create",
            CorrelationKind::QueryThenEdit => "query-then-edit",
            CorrelationKind::QueryThenDelete => "query-then-delete",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CorrelationKind {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query-then-create" => Ok(CorrelationKind::QueryThenCreate),
            "query-then-edit" => Ok(CorrelationKind::QueryThenEdit),
            "query-then-delete" => Ok(CorrelationKind::QueryThenDelete),
            other => Err(PulseError::InvalidArgument(format!(
                "unknown correlation kind: {}",
                other
            ))),
        }
    }
}

/// A scored, typed link between one observed query and the changes that
/// followed it inside the correlation window. Derived, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticCorrelation {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub query_id: Uuid,
    pub change_ids: Vec<Uuid>,
    pub kind: CorrelationKind,
    pub strength: f64,
    pub confidence: f64,
    pub shared_files: Vec<String>,
    pub shared_entities: Vec<String>,
    pub suggested_reindexing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityFactor {
    pub factor: String,
    pub weight: f64,
    pub value: f64,
}

/// Per-entity freshness priority. Created lazily on first observation;
/// mutated additively within [0, 100], never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingPriority {
    pub entity_id: String,
    pub file_path: Option<String>,
    pub priority_score: f64,
    pub factors: Vec<PriorityFactor>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub last_queried: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub query_count: u64,
    pub modification_count: u64,
    pub correlation_count: u64,
}

pub const BASE_PRIORITY_SCORE: f64 = 50.0;
pub const MAX_PRIORITY_SCORE: f64 = 100.0;

impl IndexingPriority {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            file_path: None,
            priority_score: BASE_PRIORITY_SCORE,
            factors: Vec::new(),
            last_indexed: None,
            last_queried: None,
            last_modified: None,
            query_count: 0,
            modification_count: 0,
            correlation_count: 0,
        }
    }

    /// Bounded additive bump; the score never leaves [0, 100].
    pub fn apply_boost(&mut self, boost: f64) {
        self.priority_score = (self.priority_score + boost).clamp(0.0, MAX_PRIORITY_SCORE);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReindexPriority {
    Low,
    Normal,
    High,
    Immediate,
}

impl ReindexPriority {
    pub fn score(self) -> f64 {
        match self {
            ReindexPriority::Immediate => 100.0,
            ReindexPriority::High => 75.0,
            ReindexPriority::Normal => 50.0,
            ReindexPriority::Low => 25.0,
        }
    }
}

impl fmt::Display for ReindexPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReindexPriority::Immediate => "immediate",
            ReindexPriority::High => "high",
            ReindexPriority::Normal => "normal",
            ReindexPriority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ReindexPriority {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" => Ok(ReindexPriority::Immediate),
            "high" => Ok(ReindexPriority::High),
            "normal" => Ok(ReindexPriority::Normal),
            "low" => Ok(ReindexPriority::Low),
            other => Err(PulseError::InvalidArgument(format!(
                "unknown reindex priority: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One unit of reindex work. Status moves strictly forward:
/// pending -> processing -> completed | failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveReindexRequest {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub session_id: Option<String>,
    pub entity_ids: Vec<String>,
    pub file_paths: Vec<String>,
    pub reason: String,
    pub priority: ReindexPriority,
    pub priority_score: f64,
    pub status: RequestStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl AdaptiveReindexRequest {
    pub fn new(
        session_id: Option<String>,
        entity_ids: Vec<String>,
        file_paths: Vec<String>,
        reason: impl Into<String>,
        priority: ReindexPriority,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            session_id,
            entity_ids,
            file_paths,
            reason: reason.into(),
            priority,
            priority_score: priority.score(),
            status: RequestStatus::Pending,
            completed_at: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_source_round_trip() {
        for s in ["filesystem", "ai-generated", "user-edit", "refactor"] {
            let parsed: ChangeSource = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
        assert!("robot".parse::<ChangeSource>().is_err());
    }

    #[test]
    fn reindex_priority_scores() {
        assert_eq!(ReindexPriority::Immediate.score(), 100.0);
        assert_eq!(ReindexPriority::High.score(), 75.0);
        assert_eq!(ReindexPriority::Normal.score(), 50.0);
        assert_eq!(ReindexPriority::Low.score(), 25.0);
        assert!("urgent".parse::<ReindexPriority>().is_err());
    }

    #[test]
    fn priority_ordering_matches_scores() {
        assert!(ReindexPriority::Immediate > ReindexPriority::High);
        assert!(ReindexPriority::High > ReindexPriority::Normal);
        assert!(ReindexPriority::Normal > ReindexPriority::Low);
    }

    #[test]
    fn priority_score_stays_bounded() {
        let mut p = IndexingPriority::new("e1");
        assert_eq!(p.priority_score, BASE_PRIORITY_SCORE);
        for _ in 0..100 {
            p.apply_boost(10.0);
        }
        assert_eq!(p.priority_score, MAX_PRIORITY_SCORE);
        p.apply_boost(-500.0);
        assert_eq!(p.priority_score, 0.0);
    }

    #[test]
    fn change_set_needs_apply_covers_added_and_modified() {
        let set = ChangeSet {
            added: vec![FileDescriptor::new("f1", "a.rs", "h1")],
            modified: vec![ModifiedFile {
                descriptor: FileDescriptor::new("f2", "b.rs", "h3"),
                previous_hash: "h2".into(),
                current_hash: "h3".into(),
            }],
            deleted: vec![FileDescriptor::new("f3", "c.rs", "h4")],
            unchanged: vec![],
        };
        let apply = set.needs_apply();
        assert!(apply.contains("f1"));
        assert!(apply.contains("f2"));
        assert!(!apply.contains("f3"));
        assert_eq!(set.total(), 3);
        assert!(!set.is_empty());
    }

    #[test]
    fn entity_kind_accepts_unknown_constructs() {
        let parsed: EntityKind = "macro".parse().unwrap();
        assert_eq!(parsed, EntityKind::Other("macro".into()));
        assert_eq!(parsed.to_string(), "macro");
    }

    #[test]
    fn touched_entities_spans_all_buckets() {
        let change = ObservedChange::from_observation(
            ChangeObservation {
                session_id: None,
                kind: ChangeKind::Modified,
                file_path: "src/lib.rs".into(),
                previous_file_path: None,
                entities_added: vec!["a".into()],
                entities_modified: vec!["m".into()],
                entities_deleted: vec!["d".into()],
                lines_added: 3,
                lines_deleted: 1,
                source: ChangeSource::UserEdit,
            },
            None,
        );
        let touched: Vec<&String> = change.touched_entities().collect();
        assert_eq!(touched.len(), 3);
    }
}
