//! GROQ query construction.
//!
//! Values never get spliced into query text; they travel as `$name`
//! parameters, which Sanity expects JSON-encoded in the query string.

use std::collections::BTreeMap;

use canopy_core::TenantScope;
use serde_json::Value;

/// A finished query plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GroqQuery {
    query: String,
    params: BTreeMap<String, Value>,
}

impl GroqQuery {
    /// A query with no parameters.
    pub fn raw(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: BTreeMap::new(),
        }
    }

    /// Combine named sub-queries into one object-valued query.
    ///
    /// Parameter names must not collide across parts; later parts win.
    #[must_use]
    pub fn object(parts: Vec<(&str, GroqQuery)>) -> Self {
        let mut params = BTreeMap::new();
        let fields: Vec<String> = parts
            .into_iter()
            .map(|(name, part)| {
                params.extend(part.params);
                format!("\"{name}\": {}", part.query)
            })
            .collect();

        Self {
            query: format!("{{ {} }}", fields.join(", ")),
            params,
        }
    }

    /// Query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Bound parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    /// URL query pairs for the Sanity query endpoint.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("query".to_string(), self.query.clone())];
        pairs.extend(
            self.params
                .iter()
                .map(|(name, value)| (format!("${name}"), value.to_string())),
        );
        pairs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slice {
    First,
    Range(usize, usize),
}

/// Builder for `*[filter] | order(...) [slice] {projection}` queries.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    filters: Vec<String>,
    params: BTreeMap<String, Value>,
    order: Vec<String>,
    slice: Option<Slice>,
    projection: Option<String>,
}

impl QueryBuilder {
    /// Start a query over documents of one `_type`.
    ///
    /// Document types are schema names, so they are written into the query.
    pub fn documents(doc_type: &'static str) -> Self {
        Self {
            filters: vec![format!("_type == \"{doc_type}\"")],
            params: BTreeMap::new(),
            order: Vec::new(),
            slice: None,
            projection: None,
        }
    }

    /// Add a raw filter expression (ANDed with the rest).
    #[must_use]
    pub fn filter(mut self, expr: impl Into<String>) -> Self {
        self.filters.push(expr.into());
        self
    }

    /// Bind a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Filter `field == $param` and bind the value.
    #[must_use]
    pub fn eq(self, field: &str, param: &str, value: impl Into<Value>) -> Self {
        self.filter(format!("{field} == ${param}"))
            .param(param, value)
    }

    /// Keep documents whose tenant fields cover `scope`.
    ///
    /// A document field left undefined applies to every tenant at that level;
    /// a defined one must equal the request's value.
    #[must_use]
    pub fn scoped(self, scope: &TenantScope) -> Self {
        let levels = [
            ("organizationId", &scope.organization_id),
            ("brandId", &scope.brand_id),
            ("storeId", &scope.store_id),
        ];

        levels
            .into_iter()
            .fold(self, |builder, (field, value)| match value {
                Some(v) => builder
                    .filter(format!("(!defined({field}) || {field} == ${field})"))
                    .param(field, v.as_str()),
                None => builder.filter(format!("!defined({field})")),
            })
    }

    /// Append an ordering term such as `"_createdAt desc"`.
    #[must_use]
    pub fn order(mut self, term: impl Into<String>) -> Self {
        self.order.push(term.into());
        self
    }

    /// Return only the first match (or `null`).
    #[must_use]
    pub fn first(mut self) -> Self {
        self.slice = Some(Slice::First);
        self
    }

    /// Return matches `start..end` (end exclusive).
    #[must_use]
    pub fn range(mut self, start: usize, end: usize) -> Self {
        self.slice = Some(Slice::Range(start, end));
        self
    }

    /// Set the projection body (without braces).
    #[must_use]
    pub fn project(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Render the query.
    #[must_use]
    pub fn build(self) -> GroqQuery {
        let mut query = format!("*[{}]", self.filters.join(" && "));

        if !self.order.is_empty() {
            query.push_str(&format!(" | order({})", self.order.join(", ")));
        }

        match self.slice {
            Some(Slice::First) => query.push_str("[0]"),
            Some(Slice::Range(start, end)) => query.push_str(&format!("[{start}...{end}]")),
            None => {}
        }

        if let Some(projection) = self.projection {
            query.push_str(&format!(" {{{projection}}}"));
        }

        GroqQuery {
            query,
            params: self.params,
        }
    }
}
