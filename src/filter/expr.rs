//! Declarative filter tree: scalars, operator sets, per-field alternatives and free text.
//! Parsed from JSON (`{"age": {"$gte": 18}}`) or built directly in Rust.

use crate::error::{DataError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// One filter operator with its typed operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    Eq(Value),
    Neq(Value),
    IsNull(bool),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Like(String),
    NLike(String),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Between(Value, Value),
    NBetween(Value, Value),
}

impl Operator {
    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "$eq",
            Operator::Neq(_) => "$neq",
            Operator::IsNull(_) => "$isNull",
            Operator::In(_) => "$in",
            Operator::Nin(_) => "$nin",
            Operator::Like(_) => "$like",
            Operator::NLike(_) => "$nlike",
            Operator::Lt(_) => "$lt",
            Operator::Lte(_) => "$lte",
            Operator::Gt(_) => "$gt",
            Operator::Gte(_) => "$gte",
            Operator::Between(..) => "$between",
            Operator::NBetween(..) => "$nbetween",
        }
    }

    /// Parse `"$op": operand`. Operand shape is checked here; column typing is checked by the compiler.
    pub fn parse(key: &str, operand: &Value) -> Result<Self> {
        Ok(match key {
            "$eq" => Operator::Eq(operand.clone()),
            "$neq" => Operator::Neq(operand.clone()),
            "$isNull" => Operator::IsNull(
                operand
                    .as_bool()
                    .ok_or_else(|| DataError::validation("$isNull expects a boolean"))?,
            ),
            "$in" => Operator::In(array_operand(key, operand)?),
            "$nin" => Operator::Nin(array_operand(key, operand)?),
            "$like" => Operator::Like(string_operand(key, operand)?),
            "$nlike" => Operator::NLike(string_operand(key, operand)?),
            "$lt" => Operator::Lt(operand.clone()),
            "$lte" => Operator::Lte(operand.clone()),
            "$gt" => Operator::Gt(operand.clone()),
            "$gte" => Operator::Gte(operand.clone()),
            "$between" => {
                let (lo, hi) = range_operand(key, operand)?;
                Operator::Between(lo, hi)
            }
            "$nbetween" => {
                let (lo, hi) = range_operand(key, operand)?;
                Operator::NBetween(lo, hi)
            }
            other => return Err(DataError::validation(format!("unknown operator: {}", other))),
        })
    }
}

fn array_operand(key: &str, operand: &Value) -> Result<Vec<Value>> {
    operand
        .as_array()
        .cloned()
        .ok_or_else(|| DataError::validation(format!("{} expects an array", key)))
}

fn string_operand(key: &str, operand: &Value) -> Result<String> {
    operand
        .as_str()
        .map(String::from)
        .ok_or_else(|| DataError::validation(format!("{} expects a string pattern", key)))
}

fn range_operand(key: &str, operand: &Value) -> Result<(Value, Value)> {
    match operand.as_array().map(Vec::as_slice) {
        Some([lo, hi]) => Ok((lo.clone(), hi.clone())),
        _ => Err(DataError::validation(format!("{} expects a two-element array", key))),
    }
}

/// Condition on a single column.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpression {
    /// Literal meaning equality (`null` meaning IS NULL).
    Scalar(Value),
    /// Operators combined with AND.
    Operators(Vec<Operator>),
}

impl FilterExpression {
    pub fn eq(value: impl Into<Value>) -> Self {
        FilterExpression::Scalar(value.into())
    }

    pub fn ops(ops: impl IntoIterator<Item = Operator>) -> Self {
        FilterExpression::Operators(ops.into_iter().collect())
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                if map.is_empty() {
                    return Err(DataError::validation("empty operator set"));
                }
                let ops = map
                    .iter()
                    .map(|(k, v)| Operator::parse(k, v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(FilterExpression::Operators(ops))
            }
            Value::Array(_) => Err(DataError::validation("nested filter arrays are not supported")),
            scalar => Ok(FilterExpression::Scalar(scalar.clone())),
        }
    }
}

/// What a column maps to inside a search: one expression, or alternatives combined with OR.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldFilter {
    One(FilterExpression),
    AnyOf(Vec<FilterExpression>),
}

impl FieldFilter {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(FieldFilter::AnyOf(
                items.iter().map(FilterExpression::from_json).collect::<Result<_>>()?,
            )),
            other => Ok(FieldFilter::One(FilterExpression::from_json(other)?)),
        }
    }
}

impl From<FilterExpression> for FieldFilter {
    fn from(e: FilterExpression) -> Self {
        FieldFilter::One(e)
    }
}

impl From<Vec<FilterExpression>> for FieldFilter {
    fn from(v: Vec<FilterExpression>) -> Self {
        FieldFilter::AnyOf(v)
    }
}

impl From<Operator> for FieldFilter {
    fn from(op: Operator) -> Self {
        FieldFilter::One(FilterExpression::Operators(vec![op]))
    }
}

/// Free-text clause (`$q`): match `value` against several columns.
#[derive(Clone, Debug, PartialEq)]
pub struct FreeText {
    /// `None` means every known column.
    pub selected_fields: Option<Vec<String>>,
    pub value: Value,
}

impl FreeText {
    pub fn new(value: impl Into<Value>) -> Self {
        FreeText {
            selected_fields: None,
            value: value.into(),
        }
    }

    pub fn in_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let inner = map
                    .get("value")
                    .cloned()
                    .ok_or_else(|| DataError::validation("$q object requires a value"))?;
                let selected_fields = match map.get("selectedFields") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) if s == "*" => None,
                    Some(Value::String(s)) => Some(vec![s.clone()]),
                    Some(Value::Array(items)) => Some(
                        items
                            .iter()
                            .map(|v| {
                                v.as_str()
                                    .map(String::from)
                                    .ok_or_else(|| DataError::validation("$q selectedFields must be strings"))
                            })
                            .collect::<Result<_>>()?,
                    ),
                    Some(_) => return Err(DataError::validation("$q selectedFields must be a string or array")),
                };
                Ok(FreeText {
                    selected_fields,
                    value: inner,
                })
            }
            Value::Array(_) => Err(DataError::validation("$q must be a scalar or an object")),
            scalar => Ok(FreeText::new(scalar.clone())),
        }
    }
}

/// Conjunction of column conditions plus optional free text.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub struct SearchQuery {
    fields: Vec<(String, FieldFilter)>,
    q: Option<FreeText>,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, column: impl Into<String>, filter: impl Into<FieldFilter>) -> Self {
        self.fields.push((column.into(), filter.into()));
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(column, FilterExpression::eq(value))
    }

    pub fn text(mut self, q: FreeText) -> Self {
        self.q = Some(q);
        self
    }

    pub fn fields(&self) -> &[(String, FieldFilter)] {
        &self.fields
    }

    pub fn free_text(&self) -> Option<&FreeText> {
        self.q.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.q.is_none()
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| DataError::validation("search must be a JSON object"))?;
        Self::from_map(map)
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self> {
        let mut out = SearchQuery::new();
        for (key, value) in map {
            if key == "$q" {
                out.q = Some(FreeText::from_json(value)?);
            } else if key.starts_with('$') {
                return Err(DataError::validation(format!("unknown search key: {}", key)));
            } else {
                out.fields.push((key.clone(), FieldFilter::from_json(value)?));
            }
        }
        Ok(out)
    }
}

impl TryFrom<Value> for SearchQuery {
    type Error = DataError;

    fn try_from(value: Value) -> Result<Self> {
        SearchQuery::from_json(&value)
    }
}

/// A single filter set, or several filter sets combined with OR.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Search {
    One(SearchQuery),
    Many(Vec<SearchQuery>),
}

impl Search {
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Search::Many(
                items.iter().map(SearchQuery::from_json).collect::<Result<_>>()?,
            )),
            other => Ok(Search::One(SearchQuery::from_json(other)?)),
        }
    }

    /// Only an empty array is empty; a bare query (even `{}`) counts as a search.
    pub fn is_empty(&self) -> bool {
        matches!(self, Search::Many(v) if v.is_empty())
    }

    pub fn conjunctions(&self) -> &[SearchQuery] {
        match self {
            Search::One(q) => std::slice::from_ref(q),
            Search::Many(v) => v,
        }
    }
}

impl TryFrom<Value> for Search {
    type Error = DataError;

    fn try_from(value: Value) -> Result<Self> {
        Search::from_json(&value)
    }
}

impl From<SearchQuery> for Search {
    fn from(q: SearchQuery) -> Self {
        Search::One(q)
    }
}

impl From<Vec<SearchQuery>> for Search {
    fn from(v: Vec<SearchQuery>) -> Self {
        Search::Many(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_scalars_operators_and_alternatives() {
        let q = SearchQuery::from_json(&json!({
            "name": "ada",
            "age": {"$gte": 18, "$lt": 65},
            "status": [{"$eq": "active"}, "pending"],
        }))
        .unwrap();
        let get = |name: &str| &q.fields().iter().find(|(k, _)| k == name).unwrap().1;
        assert_eq!(q.fields().len(), 3);
        assert_eq!(get("name"), &FieldFilter::One(FilterExpression::eq("ada")));
        match get("age") {
            FieldFilter::One(FilterExpression::Operators(ops)) => {
                assert_eq!(ops.len(), 2);
                assert!(ops.contains(&Operator::Gte(json!(18))));
                assert!(ops.contains(&Operator::Lt(json!(65))));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(get("status"), FieldFilter::AnyOf(v) if v.len() == 2));
    }

    #[test]
    fn rejects_unknown_operators_and_bad_operands() {
        let err = SearchQuery::from_json(&json!({"age": {"$foo": 1}})).unwrap_err();
        assert_eq!(err.key(), "validation_error");
        assert!(SearchQuery::from_json(&json!({"age": {"$between": [1]}})).is_err());
        assert!(SearchQuery::from_json(&json!({"age": {"$in": 3}})).is_err());
        assert!(SearchQuery::from_json(&json!({"age": {}})).is_err());
        assert!(SearchQuery::from_json(&json!({"$where": "1=1"})).is_err());
    }

    #[test]
    fn free_text_accepts_scalar_or_object() {
        let q = SearchQuery::from_json(&json!({"$q": "ada"})).unwrap();
        assert_eq!(q.free_text(), Some(&FreeText::new("ada")));

        let q = SearchQuery::from_json(&json!({"$q": {"selectedFields": ["name", "email"], "value": "ada"}})).unwrap();
        assert_eq!(
            q.free_text().unwrap().selected_fields.as_deref(),
            Some(&["name".to_string(), "email".to_string()][..])
        );
    }

    #[test]
    fn search_emptiness_follows_top_level_shape() {
        assert!(Search::from_json(&json!([])).unwrap().is_empty());
        assert!(!Search::from_json(&json!({})).unwrap().is_empty());
        let many = Search::from_json(&json!([{"a": 1}, {"a": 2}])).unwrap();
        assert_eq!(many.conjunctions().len(), 2);
    }

    #[test]
    fn deserializes_through_serde() {
        let s: Search = serde_json::from_value(json!([{"status": "active"}])).unwrap();
        assert_eq!(s, Search::Many(vec![SearchQuery::new().eq("status", "active")]));
    }
}
