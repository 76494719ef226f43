//! Typed views over item field slots.
//!
//! # Design
//! Each field kind has a zero-sized view type implementing the sealed
//! `FieldValue` trait. Views own no data: `read` interprets the slots of an
//! `ItemField`, `write` rewrites them in place. The set of views is closed;
//! `TypedValue` is the matching union used when dispatching on the field's
//! kind tag at runtime.
//!
//! Every view reads an empty field as `None` and creates the backing slot on
//! write. Multi-value views write one slot per element, so writing an empty
//! list clears the field and it reads back as `None`. Data that is present
//! but of the wrong shape is a `FieldFormatError`, never a panic. So is a
//! write of a value JSON cannot hold, such as NaN.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::field::{FieldKind, ItemField, Slot};
use crate::error::FieldFormatError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod sealed {
    pub trait Sealed {}
}

/// Typed access to the slots of one field kind.
pub trait FieldValue: sealed::Sealed {
    type Value;

    /// The kind this view interprets.
    const KIND: FieldKind;

    fn read(field: &ItemField) -> Result<Option<Self::Value>, FieldFormatError>;

    /// Rewrite the field's slots to hold `value`. Values the wire format
    /// cannot carry are rejected before the field is touched.
    fn write(field: &mut ItemField, value: Self::Value) -> Result<(), FieldFormatError>;
}

/// A field value of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    State(String),
    Number(f64),
    Money(Money),
    Progress(i64),
    Duration(Duration),
    Date(DateRange),
    Category(Vec<CategoryOption>),
    App(Vec<AppReference>),
    Contact(Vec<ContactReference>),
    Email(Vec<LabeledValue>),
    Phone(Vec<LabeledValue>),
    Location(Location),
    Calculation(Value),
}

impl TypedValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            TypedValue::Text(_) => FieldKind::Text,
            TypedValue::State(_) => FieldKind::State,
            TypedValue::Number(_) => FieldKind::Number,
            TypedValue::Money(_) => FieldKind::Money,
            TypedValue::Progress(_) => FieldKind::Progress,
            TypedValue::Duration(_) => FieldKind::Duration,
            TypedValue::Date(_) => FieldKind::Date,
            TypedValue::Category(_) => FieldKind::Category,
            TypedValue::App(_) => FieldKind::App,
            TypedValue::Contact(_) => FieldKind::Contact,
            TypedValue::Email(_) => FieldKind::Email,
            TypedValue::Phone(_) => FieldKind::Phone,
            TypedValue::Location(_) => FieldKind::Location,
            TypedValue::Calculation(_) => FieldKind::Calculation,
        }
    }
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    pub amount: f64,
    pub currency: String,
}

/// A date field value. A missing start time means an all-day date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_date: Option<NaiveDate>,
    pub end_time: Option<NaiveTime>,
}

impl DateRange {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            start_date: date,
            start_time: None,
            end_date: None,
            end_time: None,
        }
    }

    pub fn at(start: NaiveDateTime) -> Self {
        Self {
            start_date: start.date(),
            start_time: Some(start.time()),
            end_date: None,
            end_time: None,
        }
    }

    pub fn until(mut self, end: NaiveDateTime) -> Self {
        self.end_date = Some(end.date());
        self.end_time = Some(end.time());
        self
    }

    pub fn is_all_day(&self) -> bool {
        self.start_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl CategoryOption {
    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            text: None,
            color: None,
        }
    }
}

/// Reference to another item, the value of a relationship field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppReference {
    pub item_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_item_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<i64>,
}

impl AppReference {
    pub fn with_id(item_id: i64) -> Self {
        Self {
            item_id,
            app_item_id: None,
            title: None,
            app_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactReference {
    pub profile_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ContactReference {
    pub fn with_id(profile_id: i64) -> Self {
        Self {
            profile_id,
            user_id: None,
            name: None,
        }
    }
}

/// An email address or phone number with its label (`work`, `home`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl LabeledValue {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// A state field: one string at `value`.
pub struct StateField;

impl sealed::Sealed for StateField {}

impl FieldValue for StateField {
    type Value = String;
    const KIND: FieldKind = FieldKind::State;

    fn read(field: &ItemField) -> Result<Option<String>, FieldFormatError> {
        primary_string(field)
    }

    fn write(field: &mut ItemField, value: String) -> Result<(), FieldFormatError> {
        field.set_primary("value", Value::String(value));
        Ok(())
    }
}

pub struct TextField;

impl sealed::Sealed for TextField {}

impl FieldValue for TextField {
    type Value = String;
    const KIND: FieldKind = FieldKind::Text;

    fn read(field: &ItemField) -> Result<Option<String>, FieldFormatError> {
        primary_string(field)
    }

    fn write(field: &mut ItemField, value: String) -> Result<(), FieldFormatError> {
        field.set_primary("value", Value::String(value));
        Ok(())
    }
}

/// Podio sends numbers as decimal strings (`"12.5000"`); both strings and
/// JSON numbers are accepted.
pub struct NumberField;

impl sealed::Sealed for NumberField {}

impl FieldValue for NumberField {
    type Value = f64;
    const KIND: FieldKind = FieldKind::Number;

    fn read(field: &ItemField) -> Result<Option<f64>, FieldFormatError> {
        match field.primary_slot()? {
            Some(slot) => number_at(field, slot, "value"),
            None => Ok(None),
        }
    }

    fn write(field: &mut ItemField, value: f64) -> Result<(), FieldFormatError> {
        let value = finite(field, value)?;
        field.set_primary("value", value);
        Ok(())
    }
}

/// Percentage in `0..=100`; writes are clamped into that range.
pub struct ProgressField;

impl sealed::Sealed for ProgressField {}

impl FieldValue for ProgressField {
    type Value = i64;
    const KIND: FieldKind = FieldKind::Progress;

    fn read(field: &ItemField) -> Result<Option<i64>, FieldFormatError> {
        match field.primary_slot()? {
            Some(slot) => integer_at(field, slot, "value"),
            None => Ok(None),
        }
    }

    fn write(field: &mut ItemField, value: i64) -> Result<(), FieldFormatError> {
        field.set_primary("value", Value::from(value.clamp(0, 100)));
        Ok(())
    }
}

/// Whole seconds. Writing a duration with a fractional second is an error.
pub struct DurationField;

impl sealed::Sealed for DurationField {}

impl FieldValue for DurationField {
    type Value = Duration;
    const KIND: FieldKind = FieldKind::Duration;

    fn read(field: &ItemField) -> Result<Option<Duration>, FieldFormatError> {
        let Some(slot) = field.primary_slot()? else {
            return Ok(None);
        };
        match integer_at(field, slot, "value")? {
            Some(secs) if secs < 0 => Err(FieldFormatError::Unparseable {
                field: field.name(),
                value: secs.to_string(),
                expected: "non-negative seconds",
            }),
            Some(secs) => Ok(Some(Duration::from_secs(secs as u64))),
            None => Ok(None),
        }
    }

    fn write(field: &mut ItemField, value: Duration) -> Result<(), FieldFormatError> {
        if value.subsec_nanos() != 0 || i64::try_from(value.as_secs()).is_err() {
            return Err(unparseable(field, &format!("{value:?}"), "whole seconds"));
        }
        field.set_primary("value", Value::from(value.as_secs()));
        Ok(())
    }
}

pub struct MoneyField;

impl sealed::Sealed for MoneyField {}

impl FieldValue for MoneyField {
    type Value = Money;
    const KIND: FieldKind = FieldKind::Money;

    fn read(field: &ItemField) -> Result<Option<Money>, FieldFormatError> {
        let Some(slot) = field.primary_slot()? else {
            return Ok(None);
        };
        let Some(amount) = number_at(field, slot, "value")? else {
            return Ok(None);
        };
        let currency = string_at(field, slot, "currency")?.unwrap_or_default();
        Ok(Some(Money { amount, currency }))
    }

    fn write(field: &mut ItemField, value: Money) -> Result<(), FieldFormatError> {
        let amount = finite(field, value.amount)?;
        let mut slot = Slot::new();
        slot.insert("value".to_string(), amount);
        slot.insert("currency".to_string(), Value::String(value.currency));
        field.replace_primary_slot(slot);
        Ok(())
    }
}

/// Reads the split `start_date`/`start_time`/`end_date`/`end_time` keys,
/// falling back to the combined `start`/`end` timestamps. Writes the split
/// keys.
pub struct DateField;

impl sealed::Sealed for DateField {}

impl FieldValue for DateField {
    type Value = DateRange;
    const KIND: FieldKind = FieldKind::Date;

    fn read(field: &ItemField) -> Result<Option<DateRange>, FieldFormatError> {
        let Some(slot) = field.primary_slot()? else {
            return Ok(None);
        };

        if let Some(start_date) = date_at(field, slot, "start_date")? {
            return Ok(Some(DateRange {
                start_date,
                start_time: time_at(field, slot, "start_time")?,
                end_date: date_at(field, slot, "end_date")?,
                end_time: time_at(field, slot, "end_time")?,
            }));
        }

        let Some((start_date, start_time)) = timestamp_at(field, slot, "start")? else {
            return Ok(None);
        };
        let (end_date, end_time) = match timestamp_at(field, slot, "end")? {
            Some((date, time)) => (Some(date), time),
            None => (None, None),
        };
        Ok(Some(DateRange {
            start_date,
            start_time,
            end_date,
            end_time,
        }))
    }

    fn write(field: &mut ItemField, value: DateRange) -> Result<(), FieldFormatError> {
        let mut slot = Slot::new();
        slot.insert(
            "start_date".to_string(),
            Value::String(value.start_date.format(DATE_FORMAT).to_string()),
        );
        if let Some(time) = value.start_time {
            slot.insert(
                "start_time".to_string(),
                Value::String(time.format(TIME_FORMAT).to_string()),
            );
        }
        if let Some(date) = value.end_date {
            slot.insert(
                "end_date".to_string(),
                Value::String(date.format(DATE_FORMAT).to_string()),
            );
        }
        if let Some(time) = value.end_time {
            slot.insert(
                "end_time".to_string(),
                Value::String(time.format(TIME_FORMAT).to_string()),
            );
        }
        field.replace_primary_slot(slot);
        Ok(())
    }
}

/// Selected options, one slot each. `value` is either the option object or
/// a bare option id.
pub struct CategoryField;

impl sealed::Sealed for CategoryField {}

impl FieldValue for CategoryField {
    type Value = Vec<CategoryOption>;
    const KIND: FieldKind = FieldKind::Category;

    fn read(field: &ItemField) -> Result<Option<Vec<CategoryOption>>, FieldFormatError> {
        references(field, CategoryOption::with_id, |inner| {
            Ok(CategoryOption {
                id: required_integer(field, inner, "id")?,
                text: string_at(field, inner, "text")?,
                color: string_at(field, inner, "color")?,
            })
        })
    }

    fn write(field: &mut ItemField, value: Vec<CategoryOption>) -> Result<(), FieldFormatError> {
        let slots = value
            .into_iter()
            .map(|option| {
                let mut inner = Slot::new();
                inner.insert("id".to_string(), Value::from(option.id));
                insert_opt(&mut inner, "text", option.text.map(Value::String));
                insert_opt(&mut inner, "color", option.color.map(Value::String));
                value_slot(inner)
            })
            .collect();
        field.replace_values(slots);
        Ok(())
    }
}

/// Relationship field: referenced items, one slot each.
pub struct AppField;

impl sealed::Sealed for AppField {}

impl FieldValue for AppField {
    type Value = Vec<AppReference>;
    const KIND: FieldKind = FieldKind::App;

    fn read(field: &ItemField) -> Result<Option<Vec<AppReference>>, FieldFormatError> {
        references(field, AppReference::with_id, |inner| {
            let app_id = match object_at(field, inner, "app")? {
                Some(app) => integer_at(field, app, "app_id")?,
                None => None,
            };
            Ok(AppReference {
                item_id: required_integer(field, inner, "item_id")?,
                app_item_id: integer_at(field, inner, "app_item_id")?,
                title: string_at(field, inner, "title")?,
                app_id,
            })
        })
    }

    fn write(field: &mut ItemField, value: Vec<AppReference>) -> Result<(), FieldFormatError> {
        let slots = value
            .into_iter()
            .map(|reference| {
                let mut inner = Slot::new();
                inner.insert("item_id".to_string(), Value::from(reference.item_id));
                insert_opt(&mut inner, "app_item_id", reference.app_item_id.map(Value::from));
                insert_opt(&mut inner, "title", reference.title.map(Value::String));
                if let Some(app_id) = reference.app_id {
                    let mut app = Slot::new();
                    app.insert("app_id".to_string(), Value::from(app_id));
                    inner.insert("app".to_string(), Value::Object(app));
                }
                value_slot(inner)
            })
            .collect();
        field.replace_values(slots);
        Ok(())
    }
}

pub struct ContactField;

impl sealed::Sealed for ContactField {}

impl FieldValue for ContactField {
    type Value = Vec<ContactReference>;
    const KIND: FieldKind = FieldKind::Contact;

    fn read(field: &ItemField) -> Result<Option<Vec<ContactReference>>, FieldFormatError> {
        references(field, ContactReference::with_id, |inner| {
            Ok(ContactReference {
                profile_id: required_integer(field, inner, "profile_id")?,
                user_id: integer_at(field, inner, "user_id")?,
                name: string_at(field, inner, "name")?,
            })
        })
    }

    fn write(field: &mut ItemField, value: Vec<ContactReference>) -> Result<(), FieldFormatError> {
        let slots = value
            .into_iter()
            .map(|contact| {
                let mut inner = Slot::new();
                inner.insert("profile_id".to_string(), Value::from(contact.profile_id));
                insert_opt(&mut inner, "user_id", contact.user_id.map(Value::from));
                insert_opt(&mut inner, "name", contact.name.map(Value::String));
                value_slot(inner)
            })
            .collect();
        field.replace_values(slots);
        Ok(())
    }
}

pub struct EmailField;

impl sealed::Sealed for EmailField {}

impl FieldValue for EmailField {
    type Value = Vec<LabeledValue>;
    const KIND: FieldKind = FieldKind::Email;

    fn read(field: &ItemField) -> Result<Option<Vec<LabeledValue>>, FieldFormatError> {
        read_labeled(field)
    }

    fn write(field: &mut ItemField, value: Vec<LabeledValue>) -> Result<(), FieldFormatError> {
        write_labeled(field, value);
        Ok(())
    }
}

pub struct PhoneField;

impl sealed::Sealed for PhoneField {}

impl FieldValue for PhoneField {
    type Value = Vec<LabeledValue>;
    const KIND: FieldKind = FieldKind::Phone;

    fn read(field: &ItemField) -> Result<Option<Vec<LabeledValue>>, FieldFormatError> {
        read_labeled(field)
    }

    fn write(field: &mut ItemField, value: Vec<LabeledValue>) -> Result<(), FieldFormatError> {
        write_labeled(field, value);
        Ok(())
    }
}

pub struct LocationField;

impl sealed::Sealed for LocationField {}

impl FieldValue for LocationField {
    type Value = Location;
    const KIND: FieldKind = FieldKind::Location;

    fn read(field: &ItemField) -> Result<Option<Location>, FieldFormatError> {
        let Some(slot) = field.primary_slot()? else {
            return Ok(None);
        };
        let Some(address) = string_at(field, slot, "value")? else {
            return Ok(None);
        };
        Ok(Some(Location {
            address,
            lat: number_at(field, slot, "lat")?,
            lng: number_at(field, slot, "lng")?,
            city: string_at(field, slot, "city")?,
            country: string_at(field, slot, "country")?,
        }))
    }

    fn write(field: &mut ItemField, value: Location) -> Result<(), FieldFormatError> {
        let lat = value.lat.map(|lat| finite(field, lat)).transpose()?;
        let lng = value.lng.map(|lng| finite(field, lng)).transpose()?;
        let mut slot = Slot::new();
        slot.insert("value".to_string(), Value::String(value.address));
        insert_opt(&mut slot, "lat", lat);
        insert_opt(&mut slot, "lng", lng);
        insert_opt(&mut slot, "city", value.city.map(Value::String));
        insert_opt(&mut slot, "country", value.country.map(Value::String));
        field.replace_primary_slot(slot);
        Ok(())
    }
}

/// Computed by Podio; the raw `value` is passed through untouched.
pub struct CalculationField;

impl sealed::Sealed for CalculationField {}

impl FieldValue for CalculationField {
    type Value = Value;
    const KIND: FieldKind = FieldKind::Calculation;

    fn read(field: &ItemField) -> Result<Option<Value>, FieldFormatError> {
        Ok(field
            .primary_slot()?
            .and_then(|slot| slot.get("value"))
            .filter(|value| !value.is_null())
            .cloned())
    }

    fn write(field: &mut ItemField, value: Value) -> Result<(), FieldFormatError> {
        field.set_primary("value", value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Slot accessors
// ---------------------------------------------------------------------------

fn json_type(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

fn unexpected(field: &ItemField, key: &str, expected: &'static str, found: String) -> FieldFormatError {
    FieldFormatError::UnexpectedType {
        field: field.name(),
        key: key.to_string(),
        expected,
        found,
    }
}

fn unparseable(field: &ItemField, value: &str, expected: &'static str) -> FieldFormatError {
    FieldFormatError::Unparseable {
        field: field.name(),
        value: value.to_string(),
        expected,
    }
}

/// JSON has no NaN or infinity; `Value::from` would turn them into `null`.
fn finite(field: &ItemField, value: f64) -> Result<Value, FieldFormatError> {
    if value.is_finite() {
        Ok(Value::from(value))
    } else {
        Err(unparseable(field, &value.to_string(), "finite number"))
    }
}

fn primary_string(field: &ItemField) -> Result<Option<String>, FieldFormatError> {
    match field.primary_slot()? {
        Some(slot) => string_at(field, slot, "value"),
        None => Ok(None),
    }
}

fn string_at(field: &ItemField, slot: &Slot, key: &str) -> Result<Option<String>, FieldFormatError> {
    match slot.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(unexpected(field, key, "string", json_type(other))),
    }
}

fn number_at(field: &ItemField, slot: &Slot, key: &str) -> Result<Option<f64>, FieldFormatError> {
    match slot.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| unparseable(field, s, "number")),
        Some(other) => Err(unexpected(field, key, "number", json_type(other))),
    }
}

fn integer_at(field: &ItemField, slot: &Slot, key: &str) -> Result<Option<i64>, FieldFormatError> {
    // `as` saturates; out-of-range floats must not read as i64::MAX.
    let whole = |f: f64| {
        (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
    };
    match slot.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(whole))
            .map(Some)
            .ok_or_else(|| unparseable(field, &n.to_string(), "integer")),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(whole))
                .map(Some)
                .ok_or_else(|| unparseable(field, s, "integer"))
        }
        Some(other) => Err(unexpected(field, key, "integer", json_type(other))),
    }
}

fn required_integer(field: &ItemField, slot: &Slot, key: &str) -> Result<i64, FieldFormatError> {
    integer_at(field, slot, key)?.ok_or_else(|| unexpected(field, key, "integer", "nothing".to_string()))
}

fn object_at<'a>(
    field: &ItemField,
    slot: &'a Slot,
    key: &str,
) -> Result<Option<&'a Slot>, FieldFormatError> {
    match slot.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(inner)) => Ok(Some(inner)),
        Some(other) => Err(unexpected(field, key, "object", json_type(other))),
    }
}

fn date_at(field: &ItemField, slot: &Slot, key: &str) -> Result<Option<NaiveDate>, FieldFormatError> {
    match string_at(field, slot, key)? {
        Some(raw) => NaiveDate::parse_from_str(&raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| unparseable(field, &raw, "date")),
        None => Ok(None),
    }
}

fn time_at(field: &ItemField, slot: &Slot, key: &str) -> Result<Option<NaiveTime>, FieldFormatError> {
    match string_at(field, slot, key)? {
        Some(raw) => NaiveTime::parse_from_str(&raw, TIME_FORMAT)
            .map(Some)
            .map_err(|_| unparseable(field, &raw, "time")),
        None => Ok(None),
    }
}

/// `"YYYY-MM-DD HH:MM:SS"` or a bare `"YYYY-MM-DD"`.
fn timestamp_at(
    field: &ItemField,
    slot: &Slot,
    key: &str,
) -> Result<Option<(NaiveDate, Option<NaiveTime>)>, FieldFormatError> {
    let Some(raw) = string_at(field, slot, key)? else {
        return Ok(None);
    };
    if let Ok(stamp) = NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT) {
        return Ok(Some((stamp.date(), Some(stamp.time()))));
    }
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map(|date| Some((date, None)))
        .map_err(|_| unparseable(field, &raw, "timestamp"))
}

/// Collect the reference held in each slot's `value`: either an object
/// (passed to `from_object`) or a bare id (passed to `from_id`).
fn references<T>(
    field: &ItemField,
    from_id: impl Fn(i64) -> T,
    from_object: impl Fn(&Slot) -> Result<T, FieldFormatError>,
) -> Result<Option<Vec<T>>, FieldFormatError> {
    let mut out = Vec::new();
    for slot in field.slots()? {
        match slot.get("value") {
            None | Some(Value::Null) => {}
            Some(Value::Object(inner)) => out.push(from_object(inner)?),
            Some(Value::Number(_)) | Some(Value::String(_)) => {
                if let Some(id) = integer_at(field, slot, "value")? {
                    out.push(from_id(id));
                }
            }
            Some(other) => return Err(unexpected(field, "value", "object or id", json_type(other))),
        }
    }
    Ok((!out.is_empty()).then_some(out))
}

fn read_labeled(field: &ItemField) -> Result<Option<Vec<LabeledValue>>, FieldFormatError> {
    let mut out = Vec::new();
    for slot in field.slots()? {
        if let Some(value) = string_at(field, slot, "value")? {
            let kind = string_at(field, slot, "type")?.unwrap_or_else(|| "other".to_string());
            out.push(LabeledValue { kind, value });
        }
    }
    Ok((!out.is_empty()).then_some(out))
}

fn write_labeled(field: &mut ItemField, value: Vec<LabeledValue>) {
    let slots = value
        .into_iter()
        .map(|entry| {
            let mut slot = Slot::new();
            slot.insert("type".to_string(), Value::String(entry.kind));
            slot.insert("value".to_string(), Value::String(entry.value));
            slot
        })
        .collect();
    field.replace_values(slots);
}

fn value_slot(inner: Slot) -> Slot {
    let mut slot = Slot::new();
    slot.insert("value".to_string(), Value::Object(inner));
    slot
}

fn insert_opt(slot: &mut Slot, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        slot.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn field(kind: &str, values: Value) -> ItemField {
        serde_json::from_value(json!({
            "field_id": 1,
            "external_id": "f",
            "type": kind,
            "values": values,
        }))
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    // --- state ---

    #[test]
    fn state_reads_none_when_empty() {
        let f = ItemField::new(FieldKind::State, "status");
        assert!(!f.has_value("value"));
        assert_eq!(f.get::<StateField>().unwrap(), None);
    }

    #[test]
    fn state_reads_value() {
        let f = field("state", json!([{"value": "In progress"}]));
        assert_eq!(f.get::<StateField>().unwrap().as_deref(), Some("In progress"));
    }

    #[test]
    fn state_write_initializes_then_reads_back() {
        let mut f = ItemField::new(FieldKind::State, "status");
        f.set::<StateField>("Done".to_string()).unwrap();
        assert_eq!(f.values(), &[json!({"value": "Done"})]);
        assert_eq!(f.get::<StateField>().unwrap().as_deref(), Some("Done"));
    }

    #[test]
    fn state_write_repairs_malformed_slot() {
        let mut f = field("state", json!([42]));
        assert!(f.get::<StateField>().is_err());
        f.set::<StateField>("Open".to_string()).unwrap();
        assert_eq!(f.get::<StateField>().unwrap().as_deref(), Some("Open"));
    }

    #[test]
    fn state_write_does_not_validate_options() {
        let mut f = field("state", json!([{"value": "Open"}]));
        f.set::<StateField>("not-a-configured-state".to_string()).unwrap();
        assert_eq!(
            f.get::<StateField>().unwrap().as_deref(),
            Some("not-a-configured-state")
        );
    }

    #[test]
    fn text_rejects_non_string_value() {
        let f = field("text", json!([{"value": 12}]));
        let err = f.get::<TextField>().unwrap_err();
        assert!(matches!(
            err,
            FieldFormatError::UnexpectedType { expected: "string", ref found, .. } if found == "number"
        ));
    }

    // --- numbers ---

    #[test]
    fn number_accepts_decimal_strings() {
        let f = field("number", json!([{"value": "12.5000"}]));
        assert_eq!(f.get::<NumberField>().unwrap(), Some(12.5));
    }

    #[test]
    fn number_rejects_garbage() {
        let f = field("number", json!([{"value": "twelve"}]));
        assert!(matches!(
            f.get::<NumberField>(),
            Err(FieldFormatError::Unparseable { expected: "number", .. })
        ));
    }

    #[test]
    fn number_round_trip() {
        let mut f = ItemField::new(FieldKind::Number, "amount");
        f.set::<NumberField>(-3.25).unwrap();
        assert_eq!(f.get::<NumberField>().unwrap(), Some(-3.25));
    }

    #[test]
    fn progress_is_clamped() {
        let mut f = ItemField::new(FieldKind::Progress, "done");
        f.set::<ProgressField>(140).unwrap();
        assert_eq!(f.get::<ProgressField>().unwrap(), Some(100));
        f.set::<ProgressField>(35).unwrap();
        assert_eq!(f.get::<ProgressField>().unwrap(), Some(35));
    }

    #[test]
    fn duration_round_trip_and_negative() {
        let mut f = ItemField::new(FieldKind::Duration, "spent");
        f.set::<DurationField>(Duration::from_secs(5400)).unwrap();
        assert_eq!(f.get::<DurationField>().unwrap(), Some(Duration::from_secs(5400)));

        let f = field("duration", json!([{"value": -5}]));
        assert!(f.get::<DurationField>().is_err());
    }

    #[test]
    fn duration_with_fraction_is_not_written() {
        let mut f = ItemField::new(FieldKind::Duration, "spent");
        f.set::<DurationField>(Duration::from_secs(60)).unwrap();
        let err = f.set::<DurationField>(Duration::from_millis(1500)).unwrap_err();
        assert!(matches!(
            err,
            FieldFormatError::Unparseable { expected: "whole seconds", .. }
        ));
        assert_eq!(f.get::<DurationField>().unwrap(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn non_finite_numbers_are_not_written() {
        let mut f = ItemField::new(FieldKind::Number, "amount");
        f.set::<NumberField>(2.0).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = f.set::<NumberField>(bad).unwrap_err();
            assert!(matches!(
                err,
                FieldFormatError::Unparseable { expected: "finite number", .. }
            ));
        }
        assert_eq!(f.get::<NumberField>().unwrap(), Some(2.0));

        let err = f.set_typed_value(TypedValue::Number(f64::NAN)).unwrap_err();
        assert!(matches!(err, FieldFormatError::Unparseable { .. }));
    }

    #[test]
    fn integers_beyond_i64_are_unparseable() {
        let f = field("progress", json!([{"value": "1e20"}]));
        assert!(matches!(
            f.get::<ProgressField>(),
            Err(FieldFormatError::Unparseable { expected: "integer", .. })
        ));
        let f = field("category", json!([{"value": {"id": 1e20}}]));
        assert!(matches!(
            f.get::<CategoryField>(),
            Err(FieldFormatError::Unparseable { expected: "integer", .. })
        ));
        let f = field("progress", json!([{"value": -1e19}]));
        assert!(f.get::<ProgressField>().is_err());
    }

    #[test]
    fn money_reads_podio_shape() {
        let f = field("money", json!([{"value": "199.9900", "currency": "EUR"}]));
        assert_eq!(
            f.get::<MoneyField>().unwrap(),
            Some(Money {
                amount: 199.99,
                currency: "EUR".to_string()
            })
        );
    }

    #[test]
    fn money_round_trip() {
        let mut f = ItemField::new(FieldKind::Money, "price");
        let price = Money {
            amount: 10.5,
            currency: "USD".to_string(),
        };
        f.set::<MoneyField>(price.clone()).unwrap();
        assert_eq!(f.get::<MoneyField>().unwrap(), Some(price));
    }

    #[test]
    fn money_with_nan_amount_is_not_written() {
        let mut f = ItemField::new(FieldKind::Money, "price");
        let err = f
            .set::<MoneyField>(Money {
                amount: f64::NAN,
                currency: "USD".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, FieldFormatError::Unparseable { .. }));
        assert!(f.values().is_empty());
    }

    // --- dates ---

    #[test]
    fn date_reads_split_keys() {
        let f = field(
            "date",
            json!([{
                "start": "2024-03-01 09:30:00",
                "start_date": "2024-03-01",
                "start_time": "09:30:00",
                "end_date": "2024-03-02",
                "end_time": null
            }]),
        );
        let range = f.get::<DateField>().unwrap().unwrap();
        assert_eq!(range.start_date, date(2024, 3, 1));
        assert_eq!(range.start_time, Some(time(9, 30, 0)));
        assert_eq!(range.end_date, Some(date(2024, 3, 2)));
        assert_eq!(range.end_time, None);
    }

    #[test]
    fn date_falls_back_to_combined_keys() {
        let f = field("date", json!([{"start": "2023-12-31 23:00:00", "end": "2024-01-01"}]));
        let range = f.get::<DateField>().unwrap().unwrap();
        assert_eq!(range.start_date, date(2023, 12, 31));
        assert_eq!(range.start_time, Some(time(23, 0, 0)));
        assert_eq!(range.end_date, Some(date(2024, 1, 1)));
        assert_eq!(range.end_time, None);
    }

    #[test]
    fn date_round_trip_replaces_old_keys() {
        let mut f = field("date", json!([{"start": "2020-01-01 00:00:00"}]));
        let range = DateRange::at(date(2025, 6, 1).and_time(time(8, 0, 0)))
            .until(date(2025, 6, 1).and_time(time(17, 0, 0)));
        f.set::<DateField>(range).unwrap();
        assert!(!f.has_value("start"));
        assert_eq!(f.get::<DateField>().unwrap(), Some(range));
    }

    #[test]
    fn all_day_date_round_trip() {
        let mut f = ItemField::new(FieldKind::Date, "deadline");
        let range = DateRange::on(date(2025, 2, 28));
        f.set::<DateField>(range).unwrap();
        assert!(range.is_all_day());
        assert_eq!(f.values(), &[json!({"start_date": "2025-02-28"})]);
        assert_eq!(f.get::<DateField>().unwrap(), Some(range));
    }

    #[test]
    fn date_rejects_bad_format() {
        let f = field("date", json!([{"start_date": "01/03/2024"}]));
        assert!(matches!(
            f.get::<DateField>(),
            Err(FieldFormatError::Unparseable { expected: "date", .. })
        ));
    }

    // --- references ---

    #[test]
    fn category_reads_objects_and_ids() {
        let f = field(
            "category",
            json!([
                {"value": {"id": 3, "text": "High", "color": "F7F0C5", "status": "active"}},
                {"value": 7}
            ]),
        );
        let options = f.get::<CategoryField>().unwrap().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].text.as_deref(), Some("High"));
        assert_eq!(options[1], CategoryOption::with_id(7));
    }

    #[test]
    fn category_round_trip() {
        let mut f = ItemField::new(FieldKind::Category, "priority");
        let options = vec![
            CategoryOption {
                id: 1,
                text: Some("Low".to_string()),
                color: None,
            },
            CategoryOption::with_id(2),
        ];
        f.set::<CategoryField>(options.clone()).unwrap();
        assert_eq!(f.values().len(), 2);
        assert_eq!(f.get::<CategoryField>().unwrap(), Some(options));
    }

    #[test]
    fn writing_an_empty_list_clears_the_field() {
        let mut f = ItemField::new(FieldKind::Category, "priority");
        f.set::<CategoryField>(vec![CategoryOption::with_id(3)]).unwrap();
        f.set::<CategoryField>(Vec::new()).unwrap();
        assert!(f.values().is_empty());
        assert_eq!(f.get::<CategoryField>().unwrap(), None);

        let mut f = ItemField::new(FieldKind::Email, "mail");
        f.set::<EmailField>(Vec::new()).unwrap();
        assert_eq!(f.get::<EmailField>().unwrap(), None);
    }

    #[test]
    fn category_option_without_id_is_an_error() {
        let f = field("category", json!([{"value": {"text": "orphan"}}]));
        assert!(f.get::<CategoryField>().is_err());
    }

    #[test]
    fn app_reads_nested_app_id() {
        let f = field(
            "app",
            json!([{"value": {"item_id": 501, "app_item_id": 12, "title": "Acme", "app": {"app_id": 9}}}]),
        );
        let refs = f.get::<AppField>().unwrap().unwrap();
        assert_eq!(
            refs,
            vec![AppReference {
                item_id: 501,
                app_item_id: Some(12),
                title: Some("Acme".to_string()),
                app_id: Some(9),
            }]
        );
    }

    #[test]
    fn app_round_trip_and_wire_form() {
        let mut f = ItemField::new(FieldKind::App, "customer");
        let refs = vec![
            AppReference {
                app_id: Some(4),
                ..AppReference::with_id(10)
            },
            AppReference::with_id(11),
        ];
        f.set::<AppField>(refs.clone()).unwrap();
        assert_eq!(f.get::<AppField>().unwrap(), Some(refs));
        assert_eq!(f.wire_values(), vec![json!({"value": 10}), json!({"value": 11})]);
    }

    #[test]
    fn contact_round_trip() {
        let mut f = ItemField::new(FieldKind::Contact, "owner");
        let contacts = vec![ContactReference {
            user_id: Some(3),
            name: Some("Ada".to_string()),
            ..ContactReference::with_id(77)
        }];
        f.set::<ContactField>(contacts.clone()).unwrap();
        assert_eq!(f.get::<ContactField>().unwrap(), Some(contacts));
    }

    #[test]
    fn empty_reference_field_reads_none() {
        let f = field("contact", json!([]));
        assert_eq!(f.get::<ContactField>().unwrap(), None);
    }

    // --- labeled, location, calculation ---

    #[test]
    fn email_defaults_label_to_other() {
        let f = field("email", json!([{"value": "a@example.com"}, {"type": "work", "value": "b@example.com"}]));
        let emails = f.get::<EmailField>().unwrap().unwrap();
        assert_eq!(emails[0], LabeledValue::new("other", "a@example.com"));
        assert_eq!(emails[1], LabeledValue::new("work", "b@example.com"));
    }

    #[test]
    fn phone_round_trip() {
        let mut f = ItemField::new(FieldKind::Phone, "phone");
        let phones = vec![
            LabeledValue::new("mobile", "+45 1234"),
            LabeledValue::new("work", "+45 5678"),
        ];
        f.set::<PhoneField>(phones.clone()).unwrap();
        assert_eq!(f.get::<PhoneField>().unwrap(), Some(phones));
    }

    #[test]
    fn location_round_trip() {
        let mut f = ItemField::new(FieldKind::Location, "office");
        let location = Location {
            address: "Vesterbrogade 1, Copenhagen".to_string(),
            lat: Some(55.67),
            lng: Some(12.56),
            city: Some("Copenhagen".to_string()),
            country: None,
        };
        f.set::<LocationField>(location.clone()).unwrap();
        assert_eq!(f.get::<LocationField>().unwrap(), Some(location));
    }

    #[test]
    fn location_with_infinite_coordinate_is_not_written() {
        let mut f = ItemField::new(FieldKind::Location, "office");
        let location = Location {
            address: "Nowhere".to_string(),
            lat: Some(f64::INFINITY),
            lng: Some(0.0),
            city: None,
            country: None,
        };
        assert!(f.set::<LocationField>(location).is_err());
        assert_eq!(f.get::<LocationField>().unwrap(), None);
    }

    #[test]
    fn calculation_passes_raw_value() {
        let f = field("calculation", json!([{"value": "42.0000"}]));
        assert_eq!(f.get::<CalculationField>().unwrap(), Some(json!("42.0000")));
        let f = field("calculation", json!([{"value": null}]));
        assert_eq!(f.get::<CalculationField>().unwrap(), None);
    }

    // --- dispatch ---

    #[test]
    fn every_view_reads_none_on_fresh_field() {
        for kind in [
            FieldKind::Text,
            FieldKind::State,
            FieldKind::Number,
            FieldKind::Money,
            FieldKind::Progress,
            FieldKind::Duration,
            FieldKind::Date,
            FieldKind::Category,
            FieldKind::App,
            FieldKind::Contact,
            FieldKind::Email,
            FieldKind::Phone,
            FieldKind::Location,
            FieldKind::Calculation,
        ] {
            let f = ItemField::new(kind, "fresh");
            assert!(!f.has_value("value"), "{kind:?}");
            assert_eq!(f.typed_value().unwrap(), None, "{kind:?}");
        }
    }

    #[test]
    fn typed_value_dispatches_on_kind() {
        let f = field("state", json!([{"value": "Open"}]));
        assert_eq!(
            f.typed_value().unwrap(),
            Some(TypedValue::State("Open".to_string()))
        );
        let f = field("progress", json!([{"value": 60}]));
        assert_eq!(f.typed_value().unwrap(), Some(TypedValue::Progress(60)));
    }

    #[test]
    fn set_typed_value_round_trips_and_checks_kind() {
        let mut f = ItemField::new(FieldKind::Text, "title");
        f.set_typed_value(TypedValue::Text("Hello".to_string())).unwrap();
        assert_eq!(f.typed_value().unwrap(), Some(TypedValue::Text("Hello".to_string())));

        let err = f.set_typed_value(TypedValue::Number(1.0)).unwrap_err();
        assert!(matches!(err, FieldFormatError::KindMismatch { .. }));
    }
}
