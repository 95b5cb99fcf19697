//! List and search plumbing.
//!
//! Turns the raw query parameters of a list request into a parsed
//! [`SearchRequest`], and decides per request whether the filter runs in the
//! backend or in memory ([`SearchPlan`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{EngineResult, InvalidLiteralError},
    evaluate::Evaluator,
    filter::{Filter, ParserLimits, parse_filter_with},
    path::Path,
    projection::ProjectionSpec,
    schema::AttributeSchema,
    translate::{BackendFilter, Translation, translate},
};

/// Default page size when a request names none.
pub const DEFAULT_COUNT: u64 = 100;

/// Largest page size a request may ask for.
pub const MAX_COUNT: u64 = 200;

/// Attributes returned whatever projection a request asks for.
pub const ALWAYS_RETURNED: &[&str] = &["schemas", "id"];

/// Query parameters of a list request (RFC 7644 Section 3.4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Filter expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    /// 1-based index of the first result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_index: Option<i64>,

    /// Requested page size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    /// Attribute to sort by
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,

    /// "ascending" or "descending"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,

    /// Comma-separated attributes to return
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<String>,

    /// Comma-separated attributes to leave out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_attributes: Option<String>,
}

/// Bounds applied when parsing a list request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub parser: ParserLimits,
    pub default_count: u64,
    pub max_count: u64,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            parser: ParserLimits::default(),
            default_count: DEFAULT_COUNT,
            max_count: MAX_COUNT,
        }
    }
}

/// A clamped page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    start_index: u64,
    count: u64,
}

impl Page {
    /// `start_index` below 1 becomes 1; negative `count` becomes 0 and
    /// `count` is capped at `max_count`.
    pub fn new(start_index: i64, count: i64, max_count: u64) -> Self {
        let start_index = u64::try_from(start_index.max(1)).unwrap_or(1);
        let count = u64::try_from(count.max(0)).unwrap_or(0).min(max_count);
        Self { start_index, count }
    }

    /// 1-based index of the first result.
    pub fn start_index(&self) -> u64 {
        self.start_index
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// 0-based offset of the first result.
    pub fn offset(&self) -> u64 {
        self.start_index - 1
    }

    pub fn limit(&self) -> u64 {
        self.count
    }

    /// Cut this page out of a full result list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(self.limit()).unwrap_or(usize::MAX);
        items.into_iter().skip(offset).take(limit).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// Unrecognized text sorts ascending.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.eq_ignore_ascii_case("descending") {
            SortOrder::Descending
        } else {
            if !text.is_empty() && !text.eq_ignore_ascii_case("ascending") {
                tracing::debug!(sort_order = text, "Unrecognized sort order, using ascending");
            }
            SortOrder::Ascending
        }
    }
}

/// Sort requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub path: Path,
    pub order: SortOrder,
}

/// Sort resolved to a backend field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSort {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    /// The backend field to sort on, if the attribute is sortable.
    pub fn resolve(&self, schema: &AttributeSchema) -> Option<BackendSort> {
        let mapping = if self.path.value_filter().is_some() {
            None
        } else {
            schema.lookup(&self.path)
        };
        match mapping {
            Some(mapping) => Some(BackendSort {
                field: mapping.backend_field.clone(),
                order: self.order,
            }),
            None => {
                tracing::debug!(
                    path = %self.path,
                    resource_type = schema.resource_type(),
                    "Sort attribute not in schema, ignoring"
                );
                None
            }
        }
    }
}

/// A parsed list request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub filter: Option<Filter>,
    pub page: Page,
    pub sort: Option<SortSpec>,
    pub projection: ProjectionSpec,
}

impl SearchRequest {
    pub fn from_params(params: &ListParams, limits: &QueryLimits) -> EngineResult<Self> {
        let filter = match non_blank(params.filter.as_deref()) {
            Some(text) => Some(parse_filter_with(text, limits.parser)?),
            None => None,
        };

        let count = params
            .count
            .unwrap_or(i64::try_from(limits.default_count).unwrap_or(i64::MAX));
        let page = Page::new(params.start_index.unwrap_or(1), count, limits.max_count);

        let sort = match non_blank(params.sort_by.as_deref()) {
            Some(text) => Some(SortSpec {
                path: Path::parse(text)?,
                order: params
                    .sort_order
                    .as_deref()
                    .map(SortOrder::parse)
                    .unwrap_or_default(),
            }),
            None => None,
        };

        let projection = ProjectionSpec::from_lists(
            params.attributes.as_deref(),
            params.excluded_attributes.as_deref(),
        )?
        .with_always_returned(ALWAYS_RETURNED.iter().map(|name| Path::build(None, *name)));

        Ok(Self {
            filter,
            page,
            sort,
            projection,
        })
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Where a request's filter runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchPlan {
    /// No filter: fetch the page directly
    Unfiltered,
    /// Filter runs in the backend
    Pushdown(BackendFilter),
    /// Fetch candidates unfiltered, then keep those matching the filter
    InMemory(Filter),
}

impl SearchPlan {
    pub fn for_filter(
        filter: Option<&Filter>,
        schema: &AttributeSchema,
    ) -> Result<Self, InvalidLiteralError> {
        let Some(filter) = filter else {
            return Ok(SearchPlan::Unfiltered);
        };

        let plan = match translate(filter, schema)? {
            Translation::Translated(backend) => SearchPlan::Pushdown(backend),
            Translation::NotTranslatable => SearchPlan::InMemory(filter.clone()),
        };
        tracing::debug!(
            resource_type = schema.resource_type(),
            %filter,
            in_memory = matches!(plan, SearchPlan::InMemory(_)),
            "Planned search"
        );
        Ok(plan)
    }

    pub fn for_request(
        request: &SearchRequest,
        schema: &AttributeSchema,
    ) -> Result<Self, InvalidLiteralError> {
        Self::for_filter(request.filter.as_ref(), schema)
    }

    pub fn backend_filter(&self) -> Option<&BackendFilter> {
        match self {
            SearchPlan::Pushdown(filter) => Some(filter),
            _ => None,
        }
    }

    /// The in-memory step: drop candidates the filter rejects. A no-op unless
    /// the plan is [`SearchPlan::InMemory`].
    pub fn apply_in_memory(&self, candidates: &mut Vec<Value>) {
        if let SearchPlan::InMemory(filter) = self {
            Evaluator::new().retain(filter, candidates);
        }
    }
}
