//! Read query description: select list, filters, ordering and pagination.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Range width used when an offset is given without a limit.
pub const DEFAULT_PAGE_WIDTH: u32 = 10;

/// Comparison operator understood by the data service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    Is,
    /// Any other operator name, forwarded verbatim.
    Other(String),
}

impl Operator {
    pub fn from_name(name: &str) -> Self {
        match name {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "like" => Self::Like,
            "ilike" => Self::Ilike,
            "is" => Self::Is,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Like => "like",
            Self::Ilike => "ilike",
            Self::Is => "is",
            Self::Other(name) => name,
        }
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Column equals the value.
    Eq(Value),
    /// Column is one of the values.
    In(Vec<Value>),
    /// Column compares to the value with an explicit operator.
    Compare { operator: Operator, value: Value },
}

impl Filter {
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::Eq(value.into())
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(values.into_iter().map(Into::into).collect())
    }

    pub fn compare(operator: Operator, value: impl Into<Value>) -> Self {
        Self::Compare {
            operator,
            value: value.into(),
        }
    }
}

/// Loose JSON filters follow the admin UI's conventions: an array means
/// membership, an object with an `operator` field means that comparison, and
/// anything else means equality.
impl From<Value> for Filter {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(values) => Self::In(values),
            Value::Object(mut object) => match object.remove("operator") {
                Some(Value::String(operator)) => Self::Compare {
                    operator: Operator::from_name(&operator),
                    value: object.remove("value").unwrap_or(Value::Null),
                },
                Some(other) => {
                    object.insert("operator".to_string(), other);
                    Self::Eq(Value::Object(object))
                }
                None => Self::Eq(Value::Object(object)),
            },
            scalar => Self::Eq(scalar),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Inclusive row range `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub from: u32,
    pub to: u32,
}

impl RowRange {
    pub fn len(&self) -> u32 {
        self.to.saturating_sub(self.from).saturating_add(1)
    }

    pub fn is_empty(&self) -> bool {
        self.to < self.from
    }
}

/// Options accepted by [`DataClient::optimized_query`](super::DataClient::optimized_query).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub select: String,
    pub filters: BTreeMap<String, Filter>,
    pub order: Vec<Order>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// Serve from and populate the cache.
    pub cache: bool,
    /// Coalesce with identical concurrent reads instead of retrying.
    pub batch: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            select: "*".to_string(),
            filters: BTreeMap::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            cache: true,
            batch: false,
        }
    }
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, select: impl Into<String>) -> Self {
        self.select = select.into();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, filter: impl Into<Filter>) -> Self {
        self.filters.insert(column.into(), filter.into());
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    pub fn batch(mut self, enabled: bool) -> Self {
        self.batch = enabled;
        self
    }

    /// Row range implied by `offset`: `[offset, offset + limit - 1]`, with the
    /// width defaulting to [`DEFAULT_PAGE_WIDTH`]. A zero limit has no range;
    /// it is sent as a plain `limit=0` and matches no rows.
    pub fn range(&self) -> Option<RowRange> {
        let offset = self.offset?;
        let width = self.limit.unwrap_or(DEFAULT_PAGE_WIDTH);
        if width == 0 {
            return None;
        }
        Some(RowRange {
            from: offset,
            to: offset.saturating_add(width - 1),
        })
    }

    pub fn to_request(&self, resource: &str) -> SelectRequest {
        let range = self.range();
        SelectRequest {
            resource: resource.to_string(),
            select: self.select.clone(),
            filters: self.filters.clone(),
            order: self.order.clone(),
            limit: if range.is_some() { None } else { self.limit },
            range,
        }
    }
}

/// A fully resolved read request handed to a [`DataService`](super::DataService).
#[derive(Debug, Clone, PartialEq)]
pub struct SelectRequest {
    pub resource: String,
    pub select: String,
    pub filters: BTreeMap<String, Filter>,
    pub order: Vec<Order>,
    pub range: Option<RowRange>,
    pub limit: Option<u32>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn loose_filters_translate_by_shape() {
        let options = QueryOptions::new()
            .filter("status", json!("published"))
            .filter("tags", json!(["a", "b"]))
            .filter("score", json!({ "operator": "gte", "value": 60 }));

        assert_eq!(options.filters["status"], Filter::eq("published"));
        assert_eq!(options.filters["tags"], Filter::one_of(["a", "b"]));
        assert_eq!(
            options.filters["score"],
            Filter::compare(Operator::Gte, 60)
        );
    }

    #[test]
    fn object_without_operator_is_equality() {
        let filter = Filter::from(json!({ "lang": "en" }));
        assert_eq!(filter, Filter::Eq(json!({ "lang": "en" })));
    }

    #[test]
    fn unknown_operator_is_forwarded() {
        let filter = Filter::from(json!({ "operator": "cs", "value": "{a}" }));
        assert_eq!(
            filter,
            Filter::compare(Operator::Other("cs".to_string()), "{a}")
        );
    }

    #[test]
    fn offset_implies_range_with_default_width() {
        let request = QueryOptions::new().offset(20).to_request("posts");
        assert_eq!(request.range, Some(RowRange { from: 20, to: 29 }));
        assert_eq!(request.limit, None);

        let request = QueryOptions::new().offset(4).limit(2).to_request("posts");
        assert_eq!(request.range, Some(RowRange { from: 4, to: 5 }));
        assert_eq!(request.range.map(|r| r.len()), Some(2));
    }

    #[test]
    fn zero_limit_is_empty_with_or_without_offset() {
        let paged = QueryOptions::new().offset(5).limit(0).to_request("posts");
        let plain = QueryOptions::new().limit(0).to_request("posts");

        assert_eq!(paged.range, None);
        assert_eq!(paged.limit, Some(0));
        assert_eq!((plain.range, plain.limit), (paged.range, paged.limit));
    }

    #[test]
    fn limit_without_offset_is_plain_limit() {
        let request = QueryOptions::new().limit(2).to_request("posts");
        assert_eq!(request.range, None);
        assert_eq!(request.limit, Some(2));
    }
}
