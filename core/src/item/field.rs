//! The base item field: a kind tag plus an ordered sequence of raw slots.
//!
//! # Design
//! Podio sends every field's content as `values: [ {..}, {..} ]`, one JSON
//! object per slot. `ItemField` keeps that sequence untouched (order and
//! duplicates preserved) and offers the primitives the typed views in
//! `value` are written against: presence checks, explicit lazy
//! initialization, and slot replacement. Interpretation of the slot
//! contents belongs to the views, never to this type.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::value::{
    AppField, CalculationField, CategoryField, ContactField, DateField, DurationField, EmailField,
    FieldValue, LocationField, MoneyField, NumberField, PhoneField, ProgressField, StateField,
    TextField, TypedValue,
};
use crate::error::FieldFormatError;

/// One entry of a field's value sequence.
pub type Slot = Map<String, Value>;

/// Declared type of an item field. Unrecognized wire tags map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Money,
    Progress,
    Duration,
    Date,
    Category,
    State,
    App,
    Contact,
    Email,
    Phone,
    Location,
    Calculation,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A single field of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemField {
    #[serde(default)]
    pub field_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ItemField {
    /// A new, empty field addressed by its external id.
    pub fn new(kind: FieldKind, external_id: impl Into<String>) -> Self {
        Self {
            kind,
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }

    /// A new, empty field addressed by its numeric id.
    pub fn with_id(kind: FieldKind, field_id: i64) -> Self {
        Self {
            kind,
            field_id,
            ..Self::default()
        }
    }

    /// Human-readable name used in error messages.
    pub fn name(&self) -> String {
        self.external_id
            .clone()
            .or_else(|| self.label.clone())
            .unwrap_or_else(|| self.field_id.to_string())
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True iff the first slot is an object holding `key` with a non-null
    /// value.
    pub fn has_value(&self, key: &str) -> bool {
        self.values
            .first()
            .and_then(|slot| slot.get(key))
            .is_some_and(|value| !value.is_null())
    }

    /// Make sure a usable first slot exists.
    ///
    /// An empty sequence gets one empty slot. With `force`, a first slot
    /// that is not an object is replaced by an empty one. Slots after the
    /// first are never touched.
    pub fn ensure_values_initialized(&mut self, force: bool) {
        match self.values.first_mut() {
            None => self.values.push(Value::Object(Slot::new())),
            Some(first) if force && !first.is_object() => *first = Value::Object(Slot::new()),
            Some(_) => {}
        }
    }

    /// The first slot, `None` if the field has no value.
    pub fn primary_slot(&self) -> Result<Option<&Slot>, FieldFormatError> {
        match self.values.first() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(slot)) => Ok(Some(slot)),
            Some(_) => Err(FieldFormatError::MalformedSlot { field: self.name() }),
        }
    }

    /// Every slot in wire order. `null` entries are skipped.
    pub fn slots(&self) -> Result<Vec<&Slot>, FieldFormatError> {
        let mut slots = Vec::with_capacity(self.values.len());
        for value in &self.values {
            match value {
                Value::Null => {}
                Value::Object(slot) => slots.push(slot),
                _ => return Err(FieldFormatError::MalformedSlot { field: self.name() }),
            }
        }
        Ok(slots)
    }

    /// Assign `key` in the first slot, creating or repairing it first.
    pub fn set_primary(&mut self, key: &str, value: Value) {
        self.ensure_values_initialized(true);
        if let Some(Value::Object(slot)) = self.values.first_mut() {
            slot.insert(key.to_string(), value);
        }
    }

    /// Replace the whole first slot, creating it if needed.
    pub fn replace_primary_slot(&mut self, slot: Slot) {
        self.ensure_values_initialized(true);
        self.values[0] = Value::Object(slot);
    }

    /// Replace the whole sequence, for multi-value fields.
    pub fn replace_values(&mut self, slots: Vec<Slot>) {
        self.values = slots.into_iter().map(Value::Object).collect();
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Read the field through view `V`.
    pub fn get<V: FieldValue>(&self) -> Result<Option<V::Value>, FieldFormatError> {
        self.check_kind(V::KIND)?;
        V::read(self)
    }

    /// Write the field through view `V`.
    pub fn set<V: FieldValue>(&mut self, value: V::Value) -> Result<(), FieldFormatError> {
        self.check_kind(V::KIND)?;
        V::write(self, value)
    }

    /// Read the field through the view matching its kind. Fields of
    /// `Unknown` kind have no view and read as `None`.
    pub fn typed_value(&self) -> Result<Option<TypedValue>, FieldFormatError> {
        let value = match self.kind {
            FieldKind::Text => TextField::read(self)?.map(TypedValue::Text),
            FieldKind::State => StateField::read(self)?.map(TypedValue::State),
            FieldKind::Number => NumberField::read(self)?.map(TypedValue::Number),
            FieldKind::Money => MoneyField::read(self)?.map(TypedValue::Money),
            FieldKind::Progress => ProgressField::read(self)?.map(TypedValue::Progress),
            FieldKind::Duration => DurationField::read(self)?.map(TypedValue::Duration),
            FieldKind::Date => DateField::read(self)?.map(TypedValue::Date),
            FieldKind::Category => CategoryField::read(self)?.map(TypedValue::Category),
            FieldKind::App => AppField::read(self)?.map(TypedValue::App),
            FieldKind::Contact => ContactField::read(self)?.map(TypedValue::Contact),
            FieldKind::Email => EmailField::read(self)?.map(TypedValue::Email),
            FieldKind::Phone => PhoneField::read(self)?.map(TypedValue::Phone),
            FieldKind::Location => LocationField::read(self)?.map(TypedValue::Location),
            FieldKind::Calculation => CalculationField::read(self)?.map(TypedValue::Calculation),
            FieldKind::Unknown => None,
        };
        Ok(value)
    }

    /// Write `value` through the view matching its kind.
    pub fn set_typed_value(&mut self, value: TypedValue) -> Result<(), FieldFormatError> {
        self.check_kind(value.kind())?;
        match value {
            TypedValue::Text(v) => TextField::write(self, v),
            TypedValue::State(v) => StateField::write(self, v),
            TypedValue::Number(v) => NumberField::write(self, v),
            TypedValue::Money(v) => MoneyField::write(self, v),
            TypedValue::Progress(v) => ProgressField::write(self, v),
            TypedValue::Duration(v) => DurationField::write(self, v),
            TypedValue::Date(v) => DateField::write(self, v),
            TypedValue::Category(v) => CategoryField::write(self, v),
            TypedValue::App(v) => AppField::write(self, v),
            TypedValue::Contact(v) => ContactField::write(self, v),
            TypedValue::Email(v) => EmailField::write(self, v),
            TypedValue::Phone(v) => PhoneField::write(self, v),
            TypedValue::Location(v) => LocationField::write(self, v),
            TypedValue::Calculation(v) => CalculationField::write(self, v),
        }
    }

    /// The slots as sent to Podio: reference objects inside `value`
    /// (category options, app items, contacts) are reduced to their ids.
    pub fn wire_values(&self) -> Vec<Value> {
        let id_key = match self.kind {
            FieldKind::Category => "id",
            FieldKind::App => "item_id",
            FieldKind::Contact => "profile_id",
            _ => return self.values.clone(),
        };
        self.values
            .iter()
            .map(|slot| match slot.get("value").and_then(|inner| inner.get(id_key)) {
                Some(id) => json!({ "value": id }),
                None => slot.clone(),
            })
            .collect()
    }

    fn check_kind(&self, requested: FieldKind) -> Result<(), FieldFormatError> {
        if self.kind == requested || self.kind == FieldKind::Unknown {
            return Ok(());
        }
        Err(FieldFormatError::KindMismatch {
            field: self.name(),
            actual: self.kind,
            requested,
        })
    }
}
