//! Column registry
//!
//! The closed set of columns a plan may address. Logical names are what callers
//! (and the language model) see; physical names never leave this crate except
//! inside rendered SQL. Adding a column means adding a line to the static map.

use chrono::NaiveDate;
use serde::Serialize;

use super::CompileError;
use crate::data::Value;

/// Declared type of a registry column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Integer,
    Float,
    String,
    Date,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float)
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Date => "date",
        }
    }

    /// Convert a caller-supplied JSON scalar into a typed value for this column.
    ///
    /// Returns `None` when the scalar does not fit the declared type.
    pub fn coerce(self, json: &serde_json::Value) -> Option<Value> {
        match (self, json) {
            (ValueType::Integer, serde_json::Value::Number(n)) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                        .map(|f| f as i64)
                })
                .map(Value::Int64),
            (ValueType::Float, serde_json::Value::Number(n)) => {
                n.as_f64().filter(|f| f.is_finite()).map(Value::Float64)
            }
            (ValueType::String, serde_json::Value::String(s)) => Some(Value::String(s.clone())),
            (ValueType::Date, serde_json::Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            _ => None,
        }
    }
}

/// One allow-listed column
#[derive(Debug)]
pub struct ColumnDef {
    logical: &'static str,
    physical: &'static str,
    value_type: ValueType,
}

impl ColumnDef {
    const fn new(logical: &'static str, physical: &'static str, value_type: ValueType) -> Self {
        Self {
            logical,
            physical,
            value_type,
        }
    }
}

/// Opaque handle to a registry column.
///
/// Only obtainable through [`ColumnRegistry::resolve`], so every column that
/// reaches an expression tree is allow-listed by construction.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRef(&'static ColumnDef);

impl ColumnRef {
    pub fn logical_name(&self) -> &'static str {
        self.0.logical
    }

    pub fn value_type(&self) -> ValueType {
        self.0.value_type
    }

    pub(crate) fn physical_name(&self) -> &'static str {
        self.0.physical
    }
}

impl PartialEq for ColumnRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for ColumnRef {}

/// A fixed data source and the columns it exposes
#[derive(Debug)]
pub struct ColumnRegistry {
    table: &'static str,
    columns: &'static [ColumnDef],
}

static TRANSACTION_COLUMNS: [ColumnDef; 17] = [
    ColumnDef::new("date", "date_mutation", ValueType::Date),
    ColumnDef::new("year", "annee", ValueType::Integer),
    ColumnDef::new("month", "mois", ValueType::Integer),
    ColumnDef::new("inseeCode", "code_insee", ValueType::String),
    ColumnDef::new("communeName", "nom_commune", ValueType::String),
    ColumnDef::new("departmentCode", "code_departement", ValueType::String),
    ColumnDef::new("postalCode", "code_postal", ValueType::String),
    ColumnDef::new("section", "section", ValueType::String),
    ColumnDef::new("propertyTypeCode", "code_type_local", ValueType::Integer),
    ColumnDef::new("propertyTypeLabel", "type_local", ValueType::String),
    ColumnDef::new("price", "valeur_fonciere", ValueType::Float),
    ColumnDef::new("area", "surface_reelle_bati", ValueType::Float),
    ColumnDef::new("landArea", "surface_terrain", ValueType::Float),
    ColumnDef::new("pricePerM2", "prix_m2", ValueType::Float),
    ColumnDef::new("rooms", "nombre_pieces_principales", ValueType::Integer),
    ColumnDef::new("nbApartments", "nb_appartements", ValueType::Integer),
    ColumnDef::new("nbHouses", "nb_maisons", ValueType::Integer),
];

static TRANSACTIONS: ColumnRegistry = ColumnRegistry {
    table: "dvf_transactions",
    columns: &TRANSACTION_COLUMNS,
};

impl ColumnRegistry {
    /// Registry for the flattened property-sale table
    pub fn transactions() -> &'static ColumnRegistry {
        &TRANSACTIONS
    }

    /// Physical table every plan built from this registry reads from
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn resolve(&self, logical_name: &str) -> Result<ColumnRef, CompileError> {
        self.columns
            .iter()
            .find(|c| c.logical == logical_name)
            .map(ColumnRef)
            .ok_or_else(|| CompileError::UnknownColumn(logical_name.to_string()))
    }

    pub fn columns(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.columns.iter().map(ColumnRef)
    }

    pub fn logical_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.logical).collect()
    }
}
