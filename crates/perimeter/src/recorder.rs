use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::info;

use crate::error::PerimeterError;
use crate::models::{access_token, access_token_use};

/// Placeholder stored for any identity or client field the visitor didn't supply.
pub const UNKNOWN: &str = "unknown";

/// Who redeemed a token, and from where. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct UseDetails {
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub client_ip: Option<String>,
    pub client_user_agent: Option<String>,
}

fn or_unknown(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Append an audit record for a successful redemption of `token`.
pub async fn record_use(
    db: &DatabaseConnection,
    token: &access_token::Model,
    details: UseDetails,
) -> Result<access_token_use::Model, PerimeterError> {
    let model = access_token_use::ActiveModel {
        token_id: Set(token.id),
        user_email: Set(or_unknown(details.user_email)),
        user_name: Set(or_unknown(details.user_name)),
        client_ip: Set(or_unknown(details.client_ip)),
        client_user_agent: Set(or_unknown(details.client_user_agent)),
        timestamp: Set(Utc::now().naive_utc()),
        ..Default::default()
    };

    let saved = model
        .insert(db)
        .await
        .map_err(|e| PerimeterError::Recording(e.to_string()))?;

    info!(
        token_id = token.id,
        use_id = saved.id,
        client_ip = %saved.client_ip,
        "recorded access token use"
    );
    Ok(saved)
}

/// Audit records for one token, newest first.
pub async fn list_uses(
    db: &DatabaseConnection,
    token_id: i32,
) -> Result<Vec<access_token_use::Model>, PerimeterError> {
    Ok(access_token_use::Entity::find()
        .filter(access_token_use::Column::TokenId.eq(token_id))
        .order_by_desc(access_token_use::Column::Timestamp)
        .order_by_desc(access_token_use::Column::Id)
        .all(db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_unknown() {
        assert_eq!(or_unknown(None), "unknown");
        assert_eq!(or_unknown(Some(String::new())), "unknown");
        assert_eq!(or_unknown(Some("   ".to_string())), "unknown");
        assert_eq!(or_unknown(Some(" Hugo ".to_string())), "Hugo");
    }
}
