//! Flattened DVF property-sale record

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Value;

/// One property sale, keyed by the same logical names the column registry exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Transaction {
    pub date: Option<NaiveDate>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub insee_code: Option<String>,
    pub commune_name: Option<String>,
    pub department_code: Option<String>,
    pub postal_code: Option<String>,
    pub section: Option<String>,
    pub property_type_code: Option<i64>,
    pub property_type_label: Option<String>,
    pub price: Option<f64>,
    pub area: Option<f64>,
    pub land_area: Option<f64>,
    pub price_per_m2: Option<f64>,
    pub rooms: Option<i64>,
    pub nb_apartments: Option<i64>,
    pub nb_houses: Option<i64>,
}

impl Transaction {
    /// (logical name, value) pairs for every field
    pub fn fields(&self) -> Vec<(&'static str, Value)> {
        fn int(v: Option<i64>) -> Value {
            v.map(Value::Int64).unwrap_or(Value::Null)
        }
        fn float(v: Option<f64>) -> Value {
            Value::finite(v)
        }
        fn text(v: &Option<String>) -> Value {
            v.clone().map(Value::String).unwrap_or(Value::Null)
        }

        vec![
            ("date", self.date.map(Value::Date).unwrap_or(Value::Null)),
            ("year", int(self.year)),
            ("month", int(self.month)),
            ("inseeCode", text(&self.insee_code)),
            ("communeName", text(&self.commune_name)),
            ("departmentCode", text(&self.department_code)),
            ("postalCode", text(&self.postal_code)),
            ("section", text(&self.section)),
            ("propertyTypeCode", int(self.property_type_code)),
            ("propertyTypeLabel", text(&self.property_type_label)),
            ("price", float(self.price)),
            ("area", float(self.area)),
            ("landArea", float(self.land_area)),
            ("pricePerM2", float(self.price_per_m2)),
            ("rooms", int(self.rooms)),
            ("nbApartments", int(self.nb_apartments)),
            ("nbHouses", int(self.nb_houses)),
        ]
    }

    /// Load a JSON array of transactions
    pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<Transaction>, TransactionError> {
        let bytes = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transaction JSON: {0}")]
    Json(#[from] serde_json::Error),
}
