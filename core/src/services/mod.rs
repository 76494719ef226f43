//! Resource services.
//!
//! A service method composes the resource path, picks the verb, shapes the
//! payload and names the response type. Everything else, including error
//! classification, is the transport's job; errors pass through unchanged.

pub mod grant;
pub mod item;

pub use grant::GrantService;
pub use item::ItemService;
