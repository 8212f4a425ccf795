//! `core/members`: community member accounts.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{
    ApiRequest, EntityResource, SaveMode,
    base::{apply_text, select_all},
};
use crate::{
    error::ApiError,
    models::{blog_entry::BlogEntry, member::Member},
    store::{EntityStore, Filter, FilterValue},
};

const NO_USERNAME: &str = "1C292/4";
const NO_EMAIL: &str = "1C292/5";
const EMAIL_EXISTS: &str = "1C292/6";
const USERNAME_EXISTS: &str = "1C292/7";

pub struct MembersController {
    members: Arc<dyn EntityStore<Member>>,

    /// Entries authored by a member go with the member
    entries: Arc<dyn EntityStore<BlogEntry>>,
}

impl MembersController {
    pub fn new(
        members: Arc<dyn EntityStore<Member>>,
        entries: Arc<dyn EntityStore<BlogEntry>>,
    ) -> Self {
        Self { members, entries }
    }

    /// Whether another member already uses `value` in `column`.
    async fn taken(&self, column: &'static str, value: &str, id: i64) -> Result<bool, ApiError> {
        let filter = Filter::new()
            .eq(column, FilterValue::Text(value.to_string()))
            .not_eq("id", FilterValue::Int(id));

        Ok(self.members.count(&filter).await? > 0)
    }
}

#[async_trait]
impl EntityResource for MembersController {
    type Entity = Member;

    const INVALID_ID_LOCATOR: &'static str = "2C292/2";
    const AUDIT_DELETES: bool = true;

    fn store(&self) -> Arc<dyn EntityStore<Member>> {
        self.members.clone()
    }

    fn new_entity(&self) -> Member {
        Member::new("", "")
    }

    async fn create_or_update(
        &self,
        member: &mut Member,
        request: &ApiRequest,
        mode: SaveMode,
    ) -> Result<(), ApiError> {
        let params = &request.params;

        apply_text(
            params,
            "name",
            mode,
            &mut member.name,
            ApiError::rejected(StatusCode::BAD_REQUEST, "NO_USERNAME", NO_USERNAME),
        )?;
        apply_text(
            params,
            "email",
            mode,
            &mut member.email,
            ApiError::rejected(StatusCode::BAD_REQUEST, "NO_EMAIL", NO_EMAIL),
        )?;

        if self.taken("email", &member.email, member.id).await? {
            return Err(ApiError::rejected(
                StatusCode::FORBIDDEN,
                "EMAIL_EXISTS",
                EMAIL_EXISTS,
            ));
        }
        if self.taken("name", &member.name, member.id).await? {
            return Err(ApiError::rejected(
                StatusCode::FORBIDDEN,
                "USERNAME_EXISTS",
                USERNAME_EXISTS,
            ));
        }

        Ok(())
    }

    async fn after_save(
        &self,
        member: &Member,
        _request: &ApiRequest,
        mode: SaveMode,
    ) -> Result<(), ApiError> {
        if mode == SaveMode::Create {
            tracing::info!(member_id = member.id, "member registered through the API");
        }

        Ok(())
    }

    async fn after_delete(&self, member: &Member) -> Result<(), ApiError> {
        let filter = Filter::new().eq("author_id", FilterValue::Int(member.id));
        let authored = select_all(&*self.entries, filter).await?;

        for entry in &authored {
            self.entries.delete(entry.id).await?;
        }
        if !authored.is_empty() {
            tracing::info!(
                member_id = member.id,
                entries = authored.len(),
                "removed blog entries of deleted member"
            );
        }

        Ok(())
    }
}
