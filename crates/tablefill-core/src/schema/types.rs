use serde::{Deserialize, Serialize};
use std::fmt;

/// A schema-qualified table name. Identity key for every catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Quoted `"schema"."table"` form for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A physical column as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Type name exactly as the catalog reports it (e.g. "character varying").
    pub declared_type: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
        }
    }

    pub fn family(&self) -> TypeFamily {
        TypeFamily::from_declared(&self.declared_type)
    }
}

/// One column pair of a foreign-key constraint on the target table.
///
/// Composite constraints produce one edge per column pair, all carrying the
/// same `constraint` name. Values for those columns must be drawn together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub constraint: String,
    pub column: String,
    pub referenced_table: TableRef,
    pub referenced_column: String,
}

impl ForeignKeyEdge {
    /// A single-column edge, named the way Postgres names it by default.
    pub fn new(
        column: impl Into<String>,
        referenced_table: TableRef,
        referenced_column: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            constraint: format!("{}_fkey", column),
            column,
            referenced_table,
            referenced_column: referenced_column.into(),
        }
    }

    pub fn in_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = constraint.into();
        self
    }
}

/// Closed set of column type families tablefill knows how to generate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeFamily {
    /// tinyint (0–255)
    TinyInt,
    /// smallint, int2
    SmallInt,
    /// integer, int, int4
    Integer,
    /// bigint, int8
    BigInt,
    /// numeric, decimal (with or without precision)
    Numeric,
    /// real, float4
    Real,
    /// double precision, float8
    Double,
    /// character varying, varchar
    VarChar,
    /// text
    Text,
    /// timestamp without time zone
    Timestamp,
    /// timestamp with time zone
    TimestampTz,
    /// time without time zone
    Time,
    /// time with time zone
    TimeTz,
    Date,
    Boolean,
    Uuid,
    Json,
    Jsonb,
    /// bytea
    Bytea,
    /// No generation policy; carries the declared name for reporting.
    Unsupported(String),
}

impl TypeFamily {
    /// Parse a declared SQL type name (case-insensitive).
    pub fn from_declared(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        let normalized = normalized.as_str();

        match normalized {
            "tinyint" => TypeFamily::TinyInt,
            "smallint" | "int2" => TypeFamily::SmallInt,
            "integer" | "int" | "int4" => TypeFamily::Integer,
            "bigint" | "int8" => TypeFamily::BigInt,
            s if s.starts_with("numeric") || s.starts_with("decimal") => TypeFamily::Numeric,
            "real" | "float4" => TypeFamily::Real,
            "double precision" | "float8" => TypeFamily::Double,

            s if s.starts_with("character varying") || s.starts_with("varchar") => {
                TypeFamily::VarChar
            }
            "text" => TypeFamily::Text,

            "timestamp" | "timestamp without time zone" => TypeFamily::Timestamp,
            "timestamptz" | "timestamp with time zone" => TypeFamily::TimestampTz,
            "time" | "time without time zone" => TypeFamily::Time,
            "timetz" | "time with time zone" => TypeFamily::TimeTz,
            "date" => TypeFamily::Date,

            "boolean" | "bool" => TypeFamily::Boolean,
            "uuid" => TypeFamily::Uuid,
            "json" => TypeFamily::Json,
            "jsonb" => TypeFamily::Jsonb,
            "bytea" => TypeFamily::Bytea,

            other => TypeFamily::Unsupported(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, TypeFamily::Unsupported(_))
    }

    /// Structured-text families, whose sampled values are re-serialized as JSON.
    pub fn is_json(&self) -> bool {
        matches!(self, TypeFamily::Json | TypeFamily::Jsonb)
    }
}

impl fmt::Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFamily::TinyInt => write!(f, "tinyint"),
            TypeFamily::SmallInt => write!(f, "smallint"),
            TypeFamily::Integer => write!(f, "integer"),
            TypeFamily::BigInt => write!(f, "bigint"),
            TypeFamily::Numeric => write!(f, "numeric"),
            TypeFamily::Real => write!(f, "real"),
            TypeFamily::Double => write!(f, "double precision"),
            TypeFamily::VarChar => write!(f, "varchar"),
            TypeFamily::Text => write!(f, "text"),
            TypeFamily::Timestamp => write!(f, "timestamp"),
            TypeFamily::TimestampTz => write!(f, "timestamptz"),
            TypeFamily::Time => write!(f, "time"),
            TypeFamily::TimeTz => write!(f, "timetz"),
            TypeFamily::Date => write!(f, "date"),
            TypeFamily::Boolean => write!(f, "boolean"),
            TypeFamily::Uuid => write!(f, "uuid"),
            TypeFamily::Json => write!(f, "json"),
            TypeFamily::Jsonb => write!(f, "jsonb"),
            TypeFamily::Bytea => write!(f, "bytea"),
            TypeFamily::Unsupported(s) => write!(f, "{} (unsupported)", s),
        }
    }
}

/// Quote a SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
