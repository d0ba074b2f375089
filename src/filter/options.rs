//! Read and write options: projection, ordering, pagination, transaction scope.

use crate::db::TransactionHandle;
use crate::error::{DataError, Result};
use crate::filter::expr::Search;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Projection: every known column, or exactly the named subset.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Selection {
    #[default]
    All,
    Columns(Vec<String>),
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) if s == "*" => Selection::All,
            Raw::One(s) => Selection::Columns(vec![s]),
            Raw::Many(v) => Selection::Columns(v),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub selected_field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl OrderSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        OrderSpec {
            selected_field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        OrderSpec {
            selected_field: field.into(),
            direction: Direction::Desc,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<OrderSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(OrderSpec),
        Many(Vec<OrderSpec>),
    }
    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::One(o)) => vec![o],
        Some(Raw::Many(v)) => v,
    })
}

/// Options for `find`, `find_one` and `count`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryOptions {
    pub selected_fields: Selection,
    /// ANDed with the search passed to the operation.
    pub filters: Option<Search>,
    #[serde(deserialize_with = "one_or_many")]
    pub order_by: Vec<OrderSpec>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub throw_if_no_result: bool,
    #[serde(skip)]
    pub transaction: Option<TransactionHandle>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from request JSON; shape errors (e.g. a non-numeric limit) become validation errors.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| DataError::validation(format!("invalid query options: {}", e)))
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_fields = Selection::Columns(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn filters(mut self, filters: impl Into<Search>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn order_by(mut self, order: OrderSpec) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn throw_if_no_result(mut self) -> Self {
        self.throw_if_no_result = true;
        self
    }

    pub fn in_transaction(mut self, tx: &TransactionHandle) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}

/// Options for `insert`, `update` and `delete`.
#[derive(Clone, Debug, Default)]
pub struct MutationOptions {
    pub throw_if_no_result: bool,
    pub transaction: Option<TransactionHandle>,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn throw_if_no_result(mut self) -> Self {
        self.throw_if_no_result = true;
        self
    }

    pub fn in_transaction(mut self, tx: &TransactionHandle) -> Self {
        self.transaction = Some(tx.clone());
        self
    }
}
