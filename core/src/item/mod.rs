//! Podio items and their fields.
//!
//! An `Item` owns its `ItemField`s. Fields keep the raw slot sequence from
//! the wire; the typed views in [`value`] read and write it.

pub mod field;
pub mod value;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub use field::{FieldKind, ItemField, Slot};
pub use value::{
    AppField, AppReference, CalculationField, CategoryField, CategoryOption, ContactField,
    ContactReference, DateField, DateRange, DurationField, EmailField, FieldValue, LabeledValue,
    Location, LocationField, Money, MoneyField, NumberField, PhoneField, ProgressField, StateField,
    TextField, TypedValue,
};

use crate::types::podio_datetime;

/// A record of a Podio app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub item_id: i64,
    #[serde(default)]
    pub app_item_id: i64,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Vec<ItemField>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default, with = "podio_datetime")]
    pub created_on: Option<NaiveDateTime>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of the create and update item requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field by external id.
    pub fn field(&self, external_id: &str) -> Option<&ItemField> {
        self.fields
            .iter()
            .find(|f| f.external_id.as_deref() == Some(external_id))
    }

    pub fn field_mut(&mut self, external_id: &str) -> Option<&mut ItemField> {
        self.fields
            .iter_mut()
            .find(|f| f.external_id.as_deref() == Some(external_id))
    }

    pub fn field_by_id(&self, field_id: i64) -> Option<&ItemField> {
        self.fields.iter().find(|f| f.field_id == field_id)
    }

    pub fn field_by_id_mut(&mut self, field_id: i64) -> Option<&mut ItemField> {
        self.fields.iter_mut().find(|f| f.field_id == field_id)
    }

    pub fn add_field(&mut self, field: ItemField) -> &mut ItemField {
        let index = self.fields.len();
        self.fields.push(field);
        &mut self.fields[index]
    }

    /// The field with `external_id`, created empty with `kind` if missing.
    pub fn field_or_insert(&mut self, kind: FieldKind, external_id: &str) -> &mut ItemField {
        match self
            .fields
            .iter()
            .position(|f| f.external_id.as_deref() == Some(external_id))
        {
            Some(index) => &mut self.fields[index],
            None => self.add_field(ItemField::new(kind, external_id)),
        }
    }

    /// Outgoing representation: fields keyed by field id, or by external id
    /// for fields created locally without one. Fields with neither are
    /// skipped.
    pub fn payload(&self) -> ItemPayload {
        let mut fields = Map::new();
        for field in &self.fields {
            let key = if field.field_id != 0 {
                field.field_id.to_string()
            } else if let Some(external_id) = &field.external_id {
                external_id.clone()
            } else {
                tracing::debug!(label = ?field.label, "skipping field without id");
                continue;
            };
            fields.insert(key, Value::Array(field.wire_values()));
        }

        ItemPayload {
            external_id: self.external_id.clone(),
            fields,
            tags: self.tags.clone(),
        }
    }
}
