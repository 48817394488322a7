//! Declarative schema entities and field descriptors.
//!
//! A [`SchemaEntity`] names one destination table and lists the
//! [`FieldDescriptor`]s that drive both DDL synthesis and value coercion.
//! Descriptors are plain data: they can be built in code with the builder
//! methods or deserialized from the YAML configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MigrateError;

/// Default expression that marks a row as skipped when the value is absent.
pub const SKIP_DEFAULT: &str = "SKIP";

/// Destination key sentinel meaning "use the primary source key".
pub const SAME_AS_SOURCE: &str = "-";

/// Native type of a field, written with Rust type names.
///
/// `Option<T>` resolves through its pointee, `Vec<T>` becomes an array
/// column and map-like types always become `jsonb`. Any name that is not
/// recognised is passed through verbatim as the SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NativeType {
    String,
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    DateTime,
    Map,
    Optional(Box<NativeType>),
    List(Box<NativeType>),
    Named(String),
}

impl NativeType {
    /// Strip any `Option<..>` wrappers.
    pub fn pointee(&self) -> &NativeType {
        match self {
            NativeType::Optional(inner) => inner.pointee(),
            other => other,
        }
    }

    /// Whether the type is a sequence once optional wrappers are removed.
    pub fn is_sequence(&self) -> bool {
        matches!(self.pointee(), NativeType::List(_))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, NativeType::Optional(_))
    }
}

impl FromStr for NativeType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MigrateError::Config("empty native type".into()));
        }

        if let Some(inner) = generic_arg(s, "Option") {
            return Ok(NativeType::Optional(Box::new(inner.parse()?)));
        }
        if let Some(inner) = generic_arg(s, "Vec") {
            return Ok(NativeType::List(Box::new(inner.parse()?)));
        }
        if generic_arg(s, "HashMap").is_some() || generic_arg(s, "BTreeMap").is_some() {
            return Ok(NativeType::Map);
        }

        Ok(match s {
            "String" | "str" | "&str" => NativeType::String,
            "bool" => NativeType::Bool,
            "i8" | "u8" => NativeType::I8,
            "i16" => NativeType::I16,
            "i32" | "u16" => NativeType::I32,
            "i64" | "u32" | "isize" => NativeType::I64,
            "f32" => NativeType::F32,
            "f64" => NativeType::F64,
            "DateTime" | "DateTime<Utc>" | "DateTime<FixedOffset>" => NativeType::DateTime,
            "Map" | "HashMap" | "BTreeMap" | "Value" => NativeType::Map,
            other => NativeType::Named(other.to_string()),
        })
    }
}

/// Return the argument of `Name<arg>` if `s` has that shape.
fn generic_arg<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .trim_start()
        .strip_prefix('<')?
        .strip_suffix('>')
        .map(str::trim)
}

impl TryFrom<String> for NativeType {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NativeType> for String {
    fn from(value: NativeType) -> Self {
        value.to_string()
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::String => f.write_str("String"),
            NativeType::Bool => f.write_str("bool"),
            NativeType::I8 => f.write_str("i8"),
            NativeType::I16 => f.write_str("i16"),
            NativeType::I32 => f.write_str("i32"),
            NativeType::I64 => f.write_str("i64"),
            NativeType::F32 => f.write_str("f32"),
            NativeType::F64 => f.write_str("f64"),
            NativeType::DateTime => f.write_str("DateTime"),
            NativeType::Map => f.write_str("Map"),
            NativeType::Optional(inner) => write!(f, "Option<{}>", inner),
            NativeType::List(inner) => write!(f, "Vec<{}>", inner),
            NativeType::Named(name) => f.write_str(name),
        }
    }
}

/// One source key or an ordered list of alternates.
///
/// The first key is the primary key used for naming; lookups try each key
/// in order and take the first non-null value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SourceKeysRepr", into = "SourceKeysRepr")]
pub struct SourceKeys(Vec<String>);

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SourceKeysRepr {
    One(String),
    Many(Vec<String>),
}

impl From<SourceKeysRepr> for SourceKeys {
    fn from(value: SourceKeysRepr) -> Self {
        match value {
            SourceKeysRepr::One(key) => SourceKeys(vec![key]),
            SourceKeysRepr::Many(keys) => SourceKeys(keys),
        }
    }
}

impl From<SourceKeys> for SourceKeysRepr {
    fn from(value: SourceKeys) -> Self {
        if value.0.len() == 1 {
            SourceKeysRepr::One(value.0.into_iter().next().unwrap_or_default())
        } else {
            SourceKeysRepr::Many(value.0)
        }
    }
}

impl SourceKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SourceKeys(keys.into_iter().map(Into::into).collect())
    }

    /// The primary source key, if any non-empty key was declared.
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str).filter(|k| !k.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for SourceKeys {
    fn from(value: &str) -> Self {
        SourceKeys(vec![value.to_string()])
    }
}

/// Foreign key target of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ForeignKeyRepr")]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ForeignKeyRepr {
    /// `"table,column"`
    Pair(String),
    Full { table: String, column: String },
}

impl TryFrom<ForeignKeyRepr> for ForeignKeyRef {
    type Error = MigrateError;

    fn try_from(value: ForeignKeyRepr) -> Result<Self, Self::Error> {
        match value {
            ForeignKeyRepr::Pair(s) => s.parse(),
            ForeignKeyRepr::Full { table, column } => Ok(ForeignKeyRef { table, column }),
        }
    }
}

impl FromStr for ForeignKeyRef {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(',') {
            Some((table, column)) if !table.trim().is_empty() && !column.trim().is_empty() => {
                Ok(ForeignKeyRef {
                    table: table.trim().to_string(),
                    column: column.trim().to_string(),
                })
            }
            _ => Err(MigrateError::Config(format!(
                "foreign key '{}' must have the form 'table,column'",
                s
            ))),
        }
    }
}

/// Metadata for one field of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Field name. Memoization and transform binding key.
    pub name: String,

    /// Source key, or alternate source keys in lookup order.
    pub source: SourceKeys,

    /// Destination column. `"-"` copies the primary source key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,

    /// Native type used for SQL type inference.
    #[serde(rename = "type")]
    pub native_type: NativeType,

    /// Explicit SQL type; always wins over inference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,

    /// The source may omit this field.
    #[serde(default)]
    pub omit_empty: bool,

    /// Explicit nullability; overrides the `omit_empty` convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,

    #[serde(default)]
    pub unique: bool,

    /// Default expression, or [`SKIP_DEFAULT`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,

    /// Split comma separated strings into a text array.
    #[serde(default)]
    pub to_list: bool,

    /// Name of a registered transform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,

    /// Exclude from both DDL and inserts.
    #[serde(default)]
    pub omit: bool,

    /// Log every value written to this field.
    #[serde(default)]
    pub log: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, source: impl Into<SourceKeys>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            dest: None,
            native_type,
            sql_type: None,
            omit_empty: false,
            nullable: None,
            unique: false,
            default: None,
            foreign_key: None,
            to_list: false,
            transform: None,
            omit: false,
            log: false,
        }
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn same_dest(self) -> Self {
        self.dest(SAME_AS_SOURCE)
    }

    pub fn sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn to_list(mut self) -> Self {
        self.to_list = true;
        self
    }

    pub fn transform(mut self, name: impl Into<String>) -> Self {
        self.transform = Some(name.into());
        self
    }

    pub fn omit(mut self) -> Self {
        self.omit = true;
        self
    }

    pub fn log(mut self) -> Self {
        self.log = true;
        self
    }

    /// Whether the default expression is the row-skip sentinel.
    pub fn skips_when_absent(&self) -> bool {
        self.default.as_deref().map(str::trim) == Some(SKIP_DEFAULT)
    }
}

/// Per-entity copy options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityOptions {
    /// Emit per-field debug notifications.
    #[serde(default)]
    pub debug: bool,

    /// Skip rows rejected by a foreign key constraint.
    #[serde(default)]
    pub ignore_fk_error: bool,

    /// Skip rows rejected by a unique constraint.
    #[serde(default)]
    pub ignore_unique_error: bool,

    /// Rename the table once all rows are inserted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_to: Option<String>,

    /// Columns of the composite secondary index.
    #[serde(default)]
    pub index_cols: Vec<String>,
}

/// A destination table and the fields that populate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntity {
    /// Table name; also the entity name looked up in the source.
    pub name: String,

    pub fields: Vec<FieldDescriptor>,

    #[serde(default)]
    pub options: EntityOptions,
}

impl SchemaEntity {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
            options: EntityOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EntityOptions) -> Self {
        self.options = options;
        self
    }

    /// Fields that take part in DDL and inserts, in declared order.
    pub fn active_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.omit)
    }

    /// Deterministic name of the composite secondary index.
    pub fn index_name(&self) -> String {
        format!("{}_migindex", self.name)
    }
}

/// A fully resolved destination column, as handed to the target writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub not_null: bool,
    pub unique: bool,
    /// DDL-ready default expression (already quoted where needed).
    pub default: Option<String>,
}
