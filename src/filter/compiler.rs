//! Compiles searches into a typed predicate tree, validated against the table's declared columns.
//!
//! Conjunctions inside a `Search::Many` are ORed; field entries inside one conjunction are ANDed;
//! per-field alternatives form a nested OR-group. Operators are gated by column kind:
//! booleans take `$eq/$neq/$isNull`, strings add `$in/$nin/$like/$nlike`, numbers and dates
//! add the range operators.

use crate::error::{DataError, Result};
use crate::filter::expr::{FieldFilter, FilterExpression, FreeText, Operator, Search, SearchQuery};
use crate::filter::options::{OrderSpec, QueryOptions, Selection};
use crate::schema::{ColumnDef, ColumnKind, TableDef};
use serde_json::Value;

pub const DEFAULT_LIMIT: i64 = 100;
pub const DEFAULT_OFFSET: i64 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    pub fn sql(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Neq => "<>",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }
}

/// Compiled, executable form of a filter. Column names are validated against the table.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare { column: String, op: CmpOp, value: Value },
    In { column: String, values: Vec<Value>, negated: bool },
    Like { column: String, pattern: String, negated: bool },
    Between { column: String, low: Value, high: Value, negated: bool },
    Null { column: String, negated: bool },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Const(bool),
}

impl Predicate {
    /// AND-combine, dropping constant-true parts and collapsing single-element groups.
    pub fn and(parts: Vec<Predicate>) -> Predicate {
        let mut kept = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Predicate::Const(true) => {}
                Predicate::Const(false) => return Predicate::Const(false),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Predicate::Const(true),
            1 => kept.remove(0),
            _ => Predicate::And(kept),
        }
    }

    /// OR-combine, dropping constant-false parts and collapsing single-element groups.
    pub fn or(parts: Vec<Predicate>) -> Predicate {
        let mut kept = Vec::with_capacity(parts.len());
        for p in parts {
            match p {
                Predicate::Const(false) => {}
                Predicate::Const(true) => return Predicate::Const(true),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Predicate::Const(false),
            1 => kept.remove(0),
            _ => Predicate::Or(kept),
        }
    }
}

/// Everything a read statement needs after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub selection: Vec<String>,
    /// `None` when the filters match every row.
    pub predicate: Option<Predicate>,
    pub order_by: Vec<OrderSpec>,
    pub limit: i64,
    pub offset: i64,
}

pub struct FilterCompiler<'a> {
    table: &'a TableDef,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(table: &'a TableDef) -> Self {
        FilterCompiler { table }
    }

    /// Compile a read: search (ANDed with `opts.filters`), projection, ordering, pagination.
    pub fn compile_query(&self, search: Option<&Search>, opts: &QueryOptions) -> Result<CompiledQuery> {
        let selection = self.selection(&opts.selected_fields)?;
        let predicate = self.where_clause(search, opts.filters.as_ref())?;
        let order_by = self.ordering(&opts.order_by)?;
        let (limit, offset) = pagination(opts.limit, opts.offset)?;
        Ok(CompiledQuery {
            selection,
            predicate,
            order_by,
            limit,
            offset,
        })
    }

    /// Combined predicate for a search and optional extra filters; `None` matches everything.
    pub fn where_clause(&self, search: Option<&Search>, extra: Option<&Search>) -> Result<Option<Predicate>> {
        let mut parts = Vec::new();
        for s in search.into_iter().chain(extra) {
            parts.push(self.compile_search(s)?);
        }
        Ok(match Predicate::and(parts) {
            Predicate::Const(true) => None,
            p => Some(p),
        })
    }

    /// OR of independently ANDed conjunctions. An empty array imposes no condition.
    pub fn compile_search(&self, search: &Search) -> Result<Predicate> {
        let conjunctions = search.conjunctions();
        if conjunctions.is_empty() {
            return Ok(Predicate::Const(true));
        }
        let compiled = conjunctions
            .iter()
            .map(|q| self.compile_conjunction(q))
            .collect::<Result<Vec<_>>>()?;
        Ok(Predicate::or(compiled))
    }

    pub fn compile_conjunction(&self, query: &SearchQuery) -> Result<Predicate> {
        let mut parts = Vec::with_capacity(query.fields().len() + 1);
        for (name, filter) in query.fields() {
            let column = self.column(name)?;
            parts.push(match filter {
                FieldFilter::One(expr) => self.compile_expression(column, expr)?,
                FieldFilter::AnyOf(alternatives) => Predicate::or(
                    alternatives
                        .iter()
                        .map(|e| self.compile_expression(column, e))
                        .collect::<Result<_>>()?,
                ),
            });
        }
        if let Some(q) = query.free_text() {
            parts.push(self.compile_free_text(q)?);
        }
        Ok(Predicate::and(parts))
    }

    fn compile_expression(&self, column: &ColumnDef, expr: &FilterExpression) -> Result<Predicate> {
        match expr {
            FilterExpression::Scalar(v) => self.compile_operator(column, &Operator::Eq(v.clone())),
            FilterExpression::Operators(ops) => Ok(Predicate::and(
                ops.iter()
                    .map(|op| self.compile_operator(column, op))
                    .collect::<Result<_>>()?,
            )),
        }
    }

    fn compile_operator(&self, column: &ColumnDef, op: &Operator) -> Result<Predicate> {
        if !operator_allowed(column.kind, op) {
            return Err(DataError::validation(format!(
                "operator {} is not allowed on {} column '{}'",
                op.name(),
                kind_name(column.kind),
                column.name
            )));
        }
        let name = column.name.clone();
        Ok(match op {
            Operator::Eq(Value::Null) => Predicate::Null { column: name, negated: false },
            Operator::Neq(Value::Null) => Predicate::Null { column: name, negated: true },
            Operator::Eq(v) => compare(column, CmpOp::Eq, v, op)?,
            Operator::Neq(v) => compare(column, CmpOp::Neq, v, op)?,
            Operator::Lt(v) => compare(column, CmpOp::Lt, v, op)?,
            Operator::Lte(v) => compare(column, CmpOp::Lte, v, op)?,
            Operator::Gt(v) => compare(column, CmpOp::Gt, v, op)?,
            Operator::Gte(v) => compare(column, CmpOp::Gte, v, op)?,
            Operator::IsNull(is_null) => Predicate::Null {
                column: name,
                negated: !is_null,
            },
            Operator::In(values) | Operator::Nin(values) => {
                let negated = matches!(op, Operator::Nin(_));
                if values.is_empty() {
                    // Nothing is IN an empty set; everything is NOT IN it.
                    return Ok(Predicate::Const(negated));
                }
                for v in values {
                    check_operand(column, v, op)?;
                }
                Predicate::In {
                    column: name,
                    values: values.clone(),
                    negated,
                }
            }
            Operator::Like(pattern) => Predicate::Like {
                column: name,
                pattern: pattern.clone(),
                negated: false,
            },
            Operator::NLike(pattern) => Predicate::Like {
                column: name,
                pattern: pattern.clone(),
                negated: true,
            },
            Operator::Between(lo, hi) | Operator::NBetween(lo, hi) => {
                check_operand(column, lo, op)?;
                check_operand(column, hi, op)?;
                Predicate::Between {
                    column: name,
                    low: lo.clone(),
                    high: hi.clone(),
                    negated: matches!(op, Operator::NBetween(..)),
                }
            }
        })
    }

    /// `$q`: OR-group of LIKE/equality across the selected (or all) columns.
    fn compile_free_text(&self, q: &FreeText) -> Result<Predicate> {
        if q.value.is_null() || q.value.is_array() || q.value.is_object() {
            return Err(DataError::validation("$q value must be a scalar"));
        }
        let columns: Vec<&ColumnDef> = match &q.selected_fields {
            Some(names) => names.iter().map(|n| self.column(n)).collect::<Result<_>>()?,
            None => self.table.columns.iter().collect(),
        };
        let text = match &q.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let mut alternatives = Vec::new();
        for column in columns {
            let candidate = match column.kind {
                ColumnKind::String | ColumnKind::Date => Some(Predicate::Like {
                    column: column.name.clone(),
                    pattern: format!("%{}%", text),
                    negated: false,
                }),
                ColumnKind::Number => numeric_value(&q.value).map(|value| Predicate::Compare {
                    column: column.name.clone(),
                    op: CmpOp::Eq,
                    value,
                }),
                ColumnKind::Boolean => boolean_value(&q.value).map(|b| Predicate::Compare {
                    column: column.name.clone(),
                    op: CmpOp::Eq,
                    value: Value::Bool(b),
                }),
            };
            alternatives.extend(candidate);
        }
        Ok(Predicate::or(alternatives))
    }

    /// Columns to project, in caller order (declaration order for `*`).
    pub fn selection(&self, selection: &Selection) -> Result<Vec<String>> {
        match selection {
            Selection::All => Ok(self.table.column_names().map(String::from).collect()),
            Selection::Columns(names) if names.is_empty() => {
                Err(DataError::validation("selectedFields must name at least one column"))
            }
            Selection::Columns(names) => names
                .iter()
                .map(|n| self.column(n).map(|c| c.name.clone()))
                .collect(),
        }
    }

    pub fn ordering(&self, order_by: &[OrderSpec]) -> Result<Vec<OrderSpec>> {
        for o in order_by {
            self.column(&o.selected_field)?;
        }
        Ok(order_by.to_vec())
    }

    pub fn column(&self, name: &str) -> Result<&'a ColumnDef> {
        self.table.get(name).ok_or_else(|| {
            DataError::validation(format!("unknown column '{}' on {}", name, self.table.table_name))
        })
    }
}

/// Validated `(limit, offset)` with defaults applied.
pub fn pagination(limit: Option<i64>, offset: Option<i64>) -> Result<(i64, i64)> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    let offset = offset.unwrap_or(DEFAULT_OFFSET);
    if limit < 1 {
        return Err(DataError::validation(format!("limit must be >= 1, got {}", limit)));
    }
    if offset < 0 {
        return Err(DataError::validation(format!("offset must be >= 0, got {}", offset)));
    }
    Ok((limit, offset))
}

fn operator_allowed(kind: ColumnKind, op: &Operator) -> bool {
    match op {
        Operator::Eq(_) | Operator::Neq(_) | Operator::IsNull(_) => true,
        Operator::In(_) | Operator::Nin(_) | Operator::Like(_) | Operator::NLike(_) => kind != ColumnKind::Boolean,
        Operator::Lt(_)
        | Operator::Lte(_)
        | Operator::Gt(_)
        | Operator::Gte(_)
        | Operator::Between(..)
        | Operator::NBetween(..) => matches!(kind, ColumnKind::Number | ColumnKind::Date),
    }
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::String => "string",
        ColumnKind::Number => "number",
        ColumnKind::Boolean => "boolean",
        ColumnKind::Date => "date",
    }
}

fn compare(column: &ColumnDef, op: CmpOp, value: &Value, source: &Operator) -> Result<Predicate> {
    check_operand(column, value, source)?;
    Ok(Predicate::Compare {
        column: column.name.clone(),
        op,
        value: value.clone(),
    })
}

fn check_operand(column: &ColumnDef, value: &Value, op: &Operator) -> Result<()> {
    let ok = match column.kind {
        ColumnKind::Boolean => value.is_boolean(),
        ColumnKind::Number => value.is_number(),
        ColumnKind::String => value.is_string(),
        ColumnKind::Date => value.is_string() || value.is_number(),
    };
    if ok {
        Ok(())
    } else {
        Err(DataError::validation(format!(
            "{} on {} column '{}' cannot take {}",
            op.name(),
            kind_name(column.kind),
            column.name,
            value
        )))
    }
}

fn numeric_value(v: &Value) -> Option<Value> {
    match v {
        Value::Number(_) => Some(v.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Value::from(i))
            } else {
                s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Value::from)
            }
        }
        _ => None,
    }
}

fn boolean_value(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}
