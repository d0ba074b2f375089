//! Table metadata a repository is bound to: name, primary key and declared columns.
//! Identifiers in generated SQL only ever come from here.

use serde::{Deserialize, Serialize};

/// Primary key type for parsing path/body ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkKind {
    Uuid,
    BigInt,
    Int,
    Text,
}

/// Declared column type; gates which filter operators a column accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    String,
    Number,
    Boolean,
    Date,
}

impl ColumnKind {
    /// PostgreSQL cast used for bound parameters when the column carries no explicit type.
    pub fn default_pg_type(self) -> &'static str {
        match self {
            ColumnKind::String => "text",
            ColumnKind::Number => "numeric",
            ColumnKind::Boolean => "boolean",
            ColumnKind::Date => "timestamptz",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub kind: ColumnKind,
    /// PostgreSQL type name for parameter casts (e.g. "uuid", "int4", "sample.order_status").
    #[serde(default)]
    pub sql_type: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        ColumnDef {
            name: name.into(),
            kind,
            sql_type: None,
        }
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn pg_type(&self) -> &str {
        self.sql_type.as_deref().unwrap_or_else(|| self.kind.default_pg_type())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableDef {
    /// Optional schema qualifier (PostgreSQL schema or attached SQLite database).
    #[serde(default)]
    pub schema_name: Option<String>,
    pub table_name: String,
    pub primary_key: String,
    pub pk_kind: PkKind,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    /// A table whose primary key column is declared first. Its kind follows `pk_kind`.
    pub fn new(table_name: impl Into<String>, primary_key: impl Into<String>, pk_kind: PkKind) -> Self {
        let primary_key = primary_key.into();
        let pk_column = match pk_kind {
            PkKind::Uuid => ColumnDef::new(primary_key.clone(), ColumnKind::String).with_sql_type("uuid"),
            PkKind::BigInt => ColumnDef::new(primary_key.clone(), ColumnKind::Number).with_sql_type("int8"),
            PkKind::Int => ColumnDef::new(primary_key.clone(), ColumnKind::Number).with_sql_type("int4"),
            PkKind::Text => ColumnDef::new(primary_key.clone(), ColumnKind::String),
        };
        TableDef {
            schema_name: None,
            table_name: table_name.into(),
            primary_key,
            pk_kind,
            columns: vec![pk_column],
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    /// Adds a column; redeclaring a name replaces the earlier definition.
    pub fn column(mut self, column: ColumnDef) -> Self {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn pk_column(&self) -> Option<&ColumnDef> {
        self.get(&self.primary_key)
    }
}
