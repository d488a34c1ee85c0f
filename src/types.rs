//! Core types: paths, references, queries, and snapshots.

use crate::error::{CacheError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::time::{SystemTime, UNIX_EPOCH};

/// Field map of a stored document.
pub type Fields = serde_json::Map<String, Value>;

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Slash-separated path into the document tree.
///
/// Empty segments are dropped, so `"users//a/"` and `"users/a"` are the same
/// path and `""` / `"/"` both parse to the root.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// The root path (zero segments).
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(s: &str) -> Self {
        Self {
            segments: s
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path with the last segment removed; `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            segment
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    /// Canonical string form, no leading or trailing slash.
    pub fn canonical_string(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self.canonical_string())
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_string())
    }
}

/// Reference to a single document. Always an even, non-zero segment count.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    path: ResourcePath,
}

impl DocumentRef {
    pub fn new(path: &str) -> Result<Self> {
        Self::from_path(ResourcePath::parse(path))
    }

    pub fn from_path(path: ResourcePath) -> Result<Self> {
        if path.is_root() || path.len() % 2 != 0 {
            return Err(CacheError::InvalidPath(format!(
                "document path must have an even number of segments: '{}'",
                path
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Document id (last path segment).
    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// Collection containing this document.
    pub fn parent(&self) -> CollectionRef {
        CollectionRef {
            path: self.path.parent().unwrap_or_default(),
        }
    }

    /// Subcollection under this document.
    pub fn collection(&self, id: &str) -> Result<CollectionRef> {
        CollectionRef::from_path(self.path.child(id))
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

/// Reference to a collection. An odd segment count, or the root.
///
/// The root is representable so that a malformed reference can reach the
/// collection cache and be rejected there without touching the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    path: ResourcePath,
}

impl CollectionRef {
    pub fn new(path: &str) -> Result<Self> {
        Self::from_path(ResourcePath::parse(path))
    }

    pub fn from_path(path: ResourcePath) -> Result<Self> {
        if !path.is_root() && path.len() % 2 == 0 {
            return Err(CacheError::InvalidPath(format!(
                "collection path must have an odd number of segments: '{}'",
                path
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    pub fn doc(&self, id: &str) -> Result<DocumentRef> {
        DocumentRef::from_path(self.path.child(id))
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.path, f)
    }
}

/// Comparison used by a `where` clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    In,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Equal => "==",
            FilterOp::NotEqual => "!=",
            FilterOp::LessThan => "<",
            FilterOp::LessThanOrEqual => "<=",
            FilterOp::GreaterThan => ">",
            FilterOp::GreaterThanOrEqual => ">=",
            FilterOp::ArrayContains => "array-contains",
            FilterOp::In => "in",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    /// Dotted field path, e.g. `stats.score`.
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// What a query reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuerySource {
    /// Direct children of one collection.
    Collection(CollectionRef),
    /// Every collection in the tree whose id matches.
    CollectionGroup(String),
}

/// A collection read with optional filters, ordering and limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub source: QuerySource,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: CollectionRef) -> Self {
        Self {
            source: QuerySource::Collection(collection),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn collection_group(collection_id: impl Into<String>) -> Self {
        Self {
            source: QuerySource::CollectionGroup(collection_id.into()),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn where_field(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Base path used for diagnostics and access checks.
    ///
    /// For a collection group this is the bare collection id.
    pub fn canonical_path(&self) -> String {
        match &self.source {
            QuerySource::Collection(c) => c.path().canonical_string(),
            QuerySource::CollectionGroup(id) => id.trim_matches('/').to_string(),
        }
    }

    /// Stable textual form; two queries with the same signature read the same data.
    pub fn signature(&self) -> String {
        let mut sig = match &self.source {
            QuerySource::Collection(c) => format!("c:{}", c.path()),
            QuerySource::CollectionGroup(id) => format!("g:{}", id),
        };
        for filter in &self.filters {
            sig.push_str(&format!(
                "|f:{}{}{}",
                filter.field,
                filter.op.as_str(),
                filter.value
            ));
        }
        for order in &self.order_by {
            let dir = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            sig.push_str(&format!("|o:{} {}", order.field, dir));
        }
        if let Some(limit) = self.limit {
            sig.push_str(&format!("|l:{}", limit));
        }
        sig
    }
}

impl From<CollectionRef> for Query {
    fn from(collection: CollectionRef) -> Self {
        Query::collection(collection)
    }
}

/// Anything a live connection can be opened against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Document(DocumentRef),
    Query(Query),
}

impl Target {
    pub fn canonical_path(&self) -> String {
        match self {
            Target::Document(d) => d.path().canonical_string(),
            Target::Query(q) => q.canonical_path(),
        }
    }

    pub fn signature(&self) -> String {
        match self {
            Target::Document(d) => format!("d:{}", d.path()),
            Target::Query(q) => q.signature(),
        }
    }
}

impl From<DocumentRef> for Target {
    fn from(doc: DocumentRef) -> Self {
        Target::Document(doc)
    }
}

impl From<Query> for Target {
    fn from(query: Query) -> Self {
        Target::Query(query)
    }
}

impl From<CollectionRef> for Target {
    fn from(collection: CollectionRef) -> Self {
        Target::Query(Query::collection(collection))
    }
}

/// Operation named in an access-control decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a set write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge into existing fields instead of replacing the document.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A single write against one document.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Set { data: Fields, merge: bool },
    /// Merge into an existing document; fails if it does not exist.
    Update { data: Fields },
    Delete,
}

impl WriteOp {
    /// Operation the access-control layer sees for this write.
    pub fn operation(&self) -> Operation {
        match self {
            WriteOp::Set { merge: true, .. } | WriteOp::Update { .. } => Operation::Update,
            WriteOp::Set { merge: false, .. } => Operation::Create,
            WriteOp::Delete => Operation::Delete,
        }
    }

    /// Payload shown in diagnostics, if any.
    pub fn payload(&self) -> Option<Value> {
        match self {
            WriteOp::Set { data, .. } | WriteOp::Update { data } => {
                Some(Value::Object(data.clone()))
            }
            WriteOp::Delete => None,
        }
    }
}

/// Result of reading one document.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    pub reference: DocumentRef,
    /// `None` if the document does not exist.
    pub data: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn id(&self) -> &str {
        self.reference.id()
    }
}

/// One row of a query result.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryDocument {
    pub reference: DocumentRef,
    pub data: Fields,
}

impl QueryDocument {
    pub fn id(&self) -> &str {
        self.reference.id()
    }
}

/// Result of a query, in server order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QuerySnapshot {
    pub docs: Vec<QueryDocument>,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// What a live connection pushes.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    Document(DocumentSnapshot),
    Query(QuerySnapshot),
}

/// A decoded record together with the id of the document it came from.
///
/// Read-only: write the inner record, not this wrapper.
#[derive(Clone, Debug, PartialEq)]
pub struct WithId<T> {
    pub id: String,
    pub data: T,
}

impl<T: DeserializeOwned> WithId<T> {
    /// Decode a document body.
    ///
    /// The id is merged into the field map under `"id"` before decoding, so
    /// record types may declare an `id` field; the document id wins over any
    /// stored `id` field.
    pub fn decode(id: &str, fields: &Fields) -> Result<Self> {
        let mut merged = fields.clone();
        merged.insert("id".to_string(), Value::String(id.to_string()));
        let data = serde_json::from_value(Value::Object(merged))
            .map_err(|e| CacheError::Decode(format!("document '{}': {}", id, e)))?;
        Ok(Self {
            id: id.to_string(),
            data,
        })
    }
}

impl<T> Deref for WithId<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}
