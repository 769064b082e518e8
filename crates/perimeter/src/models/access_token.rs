use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::validator;

/// A shared-secret token that unlocks the site until `expires_on`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// The token value visitors type in
    #[sea_orm(unique)]
    pub token: String,

    /// Manual kill-switch, independent of expiry
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    /// Last day on which the token is accepted
    pub expires_on: NaiveDate,

    pub created_at: NaiveDateTime,

    pub updated_at: NaiveDateTime,

    /// Who issued the token, for attribution only
    pub created_by: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::access_token_use::Entity")]
    Uses,
}

impl Related<super::access_token_use::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Uses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Active and not past `expires_on`, judged against today (UTC).
    pub fn is_valid(&self) -> bool {
        self.is_valid_on(validator::today())
    }

    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        validator::is_valid_on(self.is_active, self.expires_on, today)
    }

    /// True once the day after `expires_on` has started. Ignores `is_active`.
    pub fn has_expired(&self) -> bool {
        self.has_expired_on(validator::today())
    }

    pub fn has_expired_on(&self, today: NaiveDate) -> bool {
        validator::has_expired_on(self.expires_on, today)
    }

    /// Cache key for this token's value.
    pub fn cache_key(&self) -> String {
        crate::cache::access_token_cache_key(&self.token)
    }
}
