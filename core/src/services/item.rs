//! Items: fetch, create, update and delete app records.

use crate::error::Result;
use crate::item::Item;
use crate::transport::Transport;
use crate::types::{CreatedItem, ItemRevision};

pub struct ItemService<'a> {
    transport: &'a Transport,
}

impl<'a> ItemService<'a> {
    pub fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    pub async fn get_item(&self, item_id: i64) -> Result<Item> {
        self.transport.get(&format!("/item/{item_id}")).await
    }

    /// Fetch by the item's number within its app.
    pub async fn get_item_by_app_item_id(&self, app_id: i64, app_item_id: i64) -> Result<Item> {
        self.transport
            .get(&format!("/app/{app_id}/item/{app_item_id}"))
            .await
    }

    /// Create `item` in the app. Only the item's fields, external id and
    /// tags are sent.
    pub async fn add_new_item(&self, app_id: i64, item: &Item) -> Result<CreatedItem> {
        self.transport
            .post(&format!("/item/app/{app_id}/"), &item.payload())
            .await
    }

    /// Send the fields of an existing item.
    pub async fn update_item(&self, item: &Item) -> Result<ItemRevision> {
        self.transport
            .put(&format!("/item/{}", item.item_id), &item.payload())
            .await
    }

    pub async fn delete_item(&self, item_id: i64) -> Result<()> {
        self.transport.delete(&format!("/item/{item_id}")).await
    }
}
