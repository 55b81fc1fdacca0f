//! Catalog search predicates and FTS5 query building.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::TierflowError;
use crate::models::{EntityKind, TagMap};

/// Page size used when a query sets no limit.
pub const DEFAULT_LIMIT: usize = 100;
/// Largest page a single query may return.
pub const MAX_LIMIT: usize = 1000;

/// Anything outside plain alphanumerics must be quoted in an FTS5 query.
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}]").expect("static regex"));

/// Escape a term for FTS5 queries.
///
/// Terms containing anything other than letters and digits (path separators,
/// dots, hyphens, quotes) are wrapped in quotes.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        let escaped = term.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        term.to_string()
    }
}

/// Build an FTS5 query string from free text.
///
/// Every term must match, each as a prefix:
/// - "quarterly report" → `quarterly* AND report*`
/// - "/hub/a.txt" → `"/hub/a.txt"*`
pub fn build_fts5_query(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .map(escape_fts5_term)
        .filter(|t| !t.is_empty())
        .map(|t| format!("{}*", t))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Columns a search may be sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Name,
    Path,
    ItemType,
    SizeBytes,
    Created,
    Modified,
    LastSynced,
}

impl SortField {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            SortField::Id => "e.id",
            SortField::Name => "e.name",
            SortField::Path => "e.path",
            SortField::ItemType => "e.item_type",
            SortField::SizeBytes => "e.size_bytes",
            SortField::Created => "e.created",
            SortField::Modified => "e.modified",
            SortField::LastSynced => "e.last_synced",
        }
    }
}

impl FromStr for SortField {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" | "insertion" => Ok(SortField::Id),
            "name" => Ok(SortField::Name),
            "path" => Ok(SortField::Path),
            "item_type" | "kind" | "type" => Ok(SortField::ItemType),
            "size" | "size_bytes" => Ok(SortField::SizeBytes),
            "created" => Ok(SortField::Created),
            "modified" => Ok(SortField::Modified),
            "last_synced" => Ok(SortField::LastSynced),
            other => Err(TierflowError::invalid_params(format!(
                "unsupported sort field '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = TierflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(TierflowError::invalid_params(format!(
                "unsupported sort order '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// A catalog search: free text plus AND-ed structured filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    /// Prefix match over name and path.
    pub text: Option<String>,
    pub item_type: Option<EntityKind>,
    pub share_uuid: Option<String>,
    pub volume_uuid: Option<String>,
    pub node_uuid: Option<String>,
    pub path_prefix: Option<String>,
    /// Exact `key = value` tag predicates, all of which must hold.
    pub tags: TagMap,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Insertion order when unset.
    pub sort: Option<SortField>,
    pub order: SortOrder,
}

impl CatalogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.item_type = Some(kind);
        self
    }

    pub fn share(mut self, share_uuid: impl Into<String>) -> Self {
        self.share_uuid = Some(share_uuid.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn sort_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort = Some(field);
        self.order = order;
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub(crate) fn fts_query(&self) -> Option<String> {
        self.text
            .as_deref()
            .map(build_fts5_query)
            .filter(|q| !q.is_empty())
    }

    /// `ORDER BY` clause; ties are always broken by insertion order.
    pub(crate) fn order_clause(&self) -> String {
        match self.sort {
            None | Some(SortField::Id) => format!("e.id {}", self.order.sql()),
            Some(field) => format!("{} {}, e.id ASC", field.column(), self.order.sql()),
        }
    }
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
