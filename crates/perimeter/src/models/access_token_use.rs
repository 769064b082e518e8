use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One successful redemption of an access token.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_token_uses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub token_id: i32,

    /// Email supplied at redemption, or "unknown"
    pub user_email: String,

    /// Name supplied at redemption, or "unknown"
    pub user_name: String,

    pub client_ip: String,

    pub client_user_agent: String,

    pub timestamp: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::access_token::Entity",
        from = "Column::TokenId",
        to = "super::access_token::Column::Id",
        on_delete = "Cascade"
    )]
    AccessToken,
}

impl Related<super::access_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AccessToken.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
