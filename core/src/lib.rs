//! Async client core for the Podio API.
//!
//! # Overview
//! A shared authenticated [`Transport`] executes every call; resource
//! services ([`GrantService`], [`ItemService`]) only compose paths and
//! payloads on top of it. Items carry their fields as raw slot sequences,
//! read and written through typed views ([`StateField`], [`DateField`], ...).
//!
//! # Design
//! - Request building and response classification are pure functions over
//!   plain-data [`HttpRequest`] / [`HttpResponse`] values; only the transport
//!   loop performs I/O.
//! - One token per transport, refreshed at most once per expiry no matter
//!   how many requests hit the 401 concurrently.
//! - Field kinds form a closed set: [`FieldKind`], the sealed [`FieldValue`]
//!   trait and the [`TypedValue`] union.
//! - An empty field reads as `None`; a field in a shape its view cannot
//!   interpret is a [`FieldFormatError`].

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod item;
pub mod services;
pub mod transport;
pub mod types;

pub use auth::{OAuthToken, TokenGrant};
pub use client::PodioClient;
pub use config::{PodioConfig, RetryPolicy};
pub use error::{FieldFormatError, PodioError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use item::{
    AppField, AppReference, CalculationField, CategoryField, CategoryOption, ContactField,
    ContactReference, DateField, DateRange, DurationField, EmailField, FieldKind, FieldValue, Item,
    ItemField, LabeledValue, Location, LocationField, Money, MoneyField, NumberField, PhoneField,
    ProgressField, StateField, TextField, TypedValue,
};
pub use services::{GrantService, ItemService};
pub use transport::Transport;
pub use types::{
    CreatedGrant, CreatedItem, Grant, GrantAction, GrantCount, GrantRef, GrantUser, ItemRevision,
    Ref, RefType,
};
