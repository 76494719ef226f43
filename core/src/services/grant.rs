//! Grants: sharing an object with people who are not members of its space.

use crate::error::Result;
use crate::transport::Transport;
use crate::types::{CreateGrant, CreatedGrant, Grant, GrantAction, GrantCount, Ref, RefType};

pub struct GrantService<'a> {
    transport: &'a Transport,
}

impl<'a> GrantService<'a> {
    pub fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Number of grants on the object.
    pub async fn count_grants_on_object(&self, ref_type: RefType, ref_id: i64) -> Result<i64> {
        let count: GrantCount = self
            .transport
            .get(&format!("/grant/{ref_type}/{ref_id}/count"))
            .await?;
        Ok(count.count)
    }

    pub async fn get_grants_on_object(&self, ref_type: RefType, ref_id: i64) -> Result<Vec<Grant>> {
        self.transport
            .get(&format!("/grant/{ref_type}/{ref_id}/"))
            .await
    }

    /// The active user's grant on the object, if any.
    pub async fn get_own_grant_information(&self, ref_type: RefType, ref_id: i64) -> Result<Grant> {
        self.transport
            .get(&format!("/grant/{ref_type}/{ref_id}/own"))
            .await
    }

    pub async fn remove_grant(&self, ref_type: RefType, ref_id: i64, user_id: i64) -> Result<()> {
        self.transport
            .delete(&format!("/grant/{ref_type}/{ref_id}/{user_id}"))
            .await
    }

    /// All grants the user holds on objects in the space.
    pub async fn get_grants_to_user_on_space(&self, space_id: i64, user_id: i64) -> Result<Vec<Grant>> {
        self.transport
            .get(&format!("/grant/space/{space_id}/user/{user_id}/"))
            .await
    }

    /// All grants the active user holds in the organization.
    pub async fn get_own_grants_on_org(&self, org_id: i64) -> Result<Vec<Grant>> {
        self.transport
            .get(&format!("/grant/org/{org_id}/own/"))
            .await
    }

    /// Share the object with `people`.
    ///
    /// `action` is what the people are asked to do; `message` is included
    /// in the notification they receive. Both are omitted from the request
    /// when `None`.
    pub async fn create_grant(
        &self,
        ref_type: RefType,
        ref_id: i64,
        people: &[Ref],
        action: Option<GrantAction>,
        message: Option<&str>,
    ) -> Result<CreatedGrant> {
        let body = CreateGrant {
            people,
            action,
            message,
        };
        self.transport
            .post(&format!("/grant/{ref_type}/{ref_id}"), &body)
            .await
    }
}
