//! # Query Model and Encoder
//!
//! Purpose: Describe a filter/sort/paging request for the `list` operation and
//! turn it into the JSON document the service consumes.
//!
//! ## Design Principles
//! 1. **Validate Before I/O**: `encode` refuses incomplete queries, so an
//!    invalid query can never reach a transport.
//! 2. **Wire Names Live Here**: Field and enum spellings (`whereType`, `ASC`,
//!    `notEqual`, ...) are pinned with serde attributes in one place.
//! 3. **Opaque Values**: Comparison values are `serde_json::Value` scalars; the
//!    server decides how to compare them.
//!
//! ## Wire Example
//!
//! ```text
//! {"list":"users","count":-1,"page":0,"whereType":"AND",
//!  "where":[{"type":"equal","column":"name","value":"bob"}],
//!  "order":{"type":"ASC","by":"id"}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SwitchError, SwitchResult};

/// Result limit meaning "no limit".
pub const UNLIMITED: i64 = -1;

/// How filter clauses are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Combinator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

/// Comparison applied by a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOp {
    Equal,
    NotEqual,
    Like,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "ASC")]
    Ascending,
    #[serde(rename = "DESC")]
    Descending,
}

/// One `column <op> value` clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub op: FilterOp,
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn new(op: FilterOp, column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            op,
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Single sort clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(rename = "type")]
    pub direction: SortDirection,
    pub by: String,
}

/// Filter/sort/paging request sent to `list`.
///
/// `filters` and `order` are optional at the type level so that a document
/// received from elsewhere can be represented and rejected; [`encode`] requires
/// both. An empty filter list is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub list: String,
    #[serde(default = "unlimited")]
    pub count: i64,
    #[serde(default)]
    pub page: u32,
    #[serde(rename = "whereType", default)]
    pub combinator: Combinator,
    #[serde(rename = "where")]
    pub filters: Option<Vec<Filter>>,
    pub order: Option<Sort>,
}

fn unlimited() -> i64 {
    UNLIMITED
}

impl Query {
    /// Starts a query on `list` with no filters, no limit, first page, and no
    /// sort clause yet.
    pub fn on(list: impl Into<String>) -> Self {
        Query {
            list: list.into(),
            count: UNLIMITED,
            page: 0,
            combinator: Combinator::And,
            filters: Some(Vec::new()),
            order: None,
        }
    }

    /// Appends a filter clause.
    pub fn filter(mut self, op: FilterOp, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters
            .get_or_insert_with(Vec::new)
            .push(Filter::new(op, column, value));
        self
    }

    /// Sets the sort clause, replacing any previous one.
    pub fn order_by(mut self, direction: SortDirection, column: impl Into<String>) -> Self {
        self.order = Some(Sort {
            direction,
            by: column.into(),
        });
        self
    }

    pub fn limit(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Combines filters with OR instead of AND.
    pub fn any_of(mut self) -> Self {
        self.combinator = Combinator::Or;
        self
    }

    /// Checks the fields `encode` requires.
    ///
    /// # Errors
    /// Returns `SwitchError::InvalidQuery` when the list name is empty, the
    /// filter list or sort clause is absent, or a comparison value is not a
    /// scalar.
    pub fn validate(&self) -> SwitchResult<()> {
        if self.list.is_empty() {
            return Err(SwitchError::InvalidQuery("list name is required".into()));
        }
        let filters = self
            .filters
            .as_ref()
            .ok_or_else(|| SwitchError::InvalidQuery("filter list is required".into()))?;
        if self.order.is_none() {
            return Err(SwitchError::InvalidQuery("sort clause is required".into()));
        }
        for filter in filters {
            if matches!(filter.value, Value::Array(_) | Value::Object(_)) {
                return Err(SwitchError::InvalidQuery(format!(
                    "filter on {} must compare against a scalar",
                    filter.column
                )));
            }
        }
        Ok(())
    }
}

/// Validates and serializes a query to its wire form.
pub fn encode(query: &Query) -> SwitchResult<String> {
    query.validate()?;
    serde_json::to_string(query).map_err(|err| SwitchError::InvalidQuery(err.to_string()))
}

/// Parses a wire document back into a query, applying the same validation.
pub fn decode(text: &str) -> SwitchResult<Query> {
    let query: Query =
        serde_json::from_str(text).map_err(|err| SwitchError::InvalidQuery(err.to_string()))?;
    query.validate()?;
    Ok(query)
}
