//! Cache key derivation for query results.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::client::{Filter, Order, QueryOptions};

/// Deterministic cache key for a read query.
///
/// Rendered as `<resource>:<json>` where the JSON part serializes the select
/// list, filters (sorted by column), ordering and pagination. Two option sets
/// that would produce the same request always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

#[derive(Serialize)]
struct KeyParts<'a> {
    select: &'a str,
    filters: &'a BTreeMap<String, Filter>,
    order: &'a [Order],
    limit: Option<u32>,
    offset: Option<u32>,
}

impl QueryKey {
    pub fn new(resource: &str, options: &QueryOptions) -> Self {
        let parts = KeyParts {
            select: &options.select,
            filters: &options.filters,
            order: &options.order,
            limit: options.limit,
            offset: options.offset,
        };
        // Serializing plain strings, numbers and sorted maps cannot fail.
        let rendered = serde_json::to_string(&parts).unwrap_or_default();
        Self(format!("{resource}:{rendered}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
