//! Durable storage of access tokens with a write-through cache.
//!
//! Every write goes through [`TokenStore`], which persists the row and then
//! overwrites (or evicts) the cache entry for that token value in the same
//! call. Reads consult the cache first and fall back to the database.
//!
//! Within one store (and its clones), cache fills after a miss are
//! serialized against writes, so a reader can never put back a row that a
//! concurrent write has already replaced or deleted. Across processes sharing
//! a Redis cache, a fill is confirmed against the database afterwards and
//! writers refresh the entry again once they have committed.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::CacheService;
use crate::config::Config;
use crate::error::PerimeterError;
use crate::models::{access_token, access_token_use};
use crate::validator::{self, TokenLookup};

/// Characters used for generated tokens: digits and uppercase letters,
/// without `0`, `O`, `1` and `I`.
pub const TOKEN_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Generate a random token value of `len` characters from [`TOKEN_ALPHABET`].
pub fn random_token_value(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Expiry date for a token issued today.
pub fn default_expiry(days: i64) -> Result<NaiveDate, PerimeterError> {
    default_expiry_on(validator::today(), days)
}

/// `today + days`. Negative or unrepresentable offsets are a validation error.
pub fn default_expiry_on(today: NaiveDate, days: i64) -> Result<NaiveDate, PerimeterError> {
    if days < 0 {
        return Err(PerimeterError::Validation(format!(
            "expiry must not be in the past ({days} days)"
        )));
    }
    chrono::Duration::try_days(days)
        .and_then(|offset| today.checked_add_signed(offset))
        .ok_or_else(|| PerimeterError::Validation(format!("expiry of {days} days is out of range")))
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Fields for a new access token. Anything left `None` takes its default.
#[derive(Debug, Clone, Default)]
pub struct NewAccessToken {
    /// Token value; generated when absent.
    pub token: Option<String>,
    /// Defaults to `true`.
    pub is_active: Option<bool>,
    /// Defaults to today + `default_expiry_days`.
    pub expires_on: Option<NaiveDate>,
    pub created_by: Option<String>,
}

impl NewAccessToken {
    pub fn with_token(token: impl Into<String>) -> Self {
        NewAccessToken {
            token: Some(token.into()),
            ..Default::default()
        }
    }
}

/// Token persistence plus its cache.
#[derive(Clone)]
pub struct TokenStore {
    db: DatabaseConnection,
    cache: CacheService,
    token_length: usize,
    default_expiry_days: i64,
    cache_ttl: Option<Duration>,
    // Readers hold it across a miss's DB read and cache fill; writers hold it
    // exclusively from their DB write until the cache reflects the commit.
    fill_lock: Arc<RwLock<()>>,
}

impl TokenStore {
    pub fn new(db: DatabaseConnection, cache: CacheService, config: &Config) -> Self {
        TokenStore {
            db,
            cache,
            token_length: config.token_length,
            default_expiry_days: config.default_expiry_days,
            cache_ttl: config.cache_ttl(),
            fill_lock: Arc::new(RwLock::new(())),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn token_length(&self) -> usize {
        self.token_length
    }

    /// Issue and persist a new token, then cache it.
    ///
    /// A supplied token value is used verbatim. If it already exists the
    /// insert fails with [`PerimeterError::DuplicateToken`]; nothing is
    /// overwritten.
    pub async fn create_access_token(
        &self,
        new: NewAccessToken,
    ) -> Result<access_token::Model, PerimeterError> {
        let token = match new.token {
            Some(token) => {
                self.check_token_value(&token)?;
                token
            }
            None => random_token_value(self.token_length),
        };
        let expires_on = match new.expires_on {
            Some(date) => date,
            None => default_expiry(self.default_expiry_days)?,
        };
        let now = now();

        let model = access_token::ActiveModel {
            token: Set(token.clone()),
            is_active: Set(new.is_active.unwrap_or(true)),
            expires_on: Set(expires_on),
            created_at: Set(now),
            updated_at: Set(now),
            created_by: Set(new.created_by),
            ..Default::default()
        };

        let _write = self.fill_lock.write().await;
        let txn = self.db.begin().await?;
        let saved = model
            .insert(&txn)
            .await
            .map_err(|e| duplicate_or_db(e, &token))?;
        self.commit_with_cache(txn, &saved).await?;

        info!(token_id = saved.id, expires_on = %saved.expires_on, "issued access token");
        Ok(saved)
    }

    /// Look a token up by value, cache first.
    ///
    /// Unknown values come back as [`TokenLookup::Empty`]; misses are not
    /// cached.
    pub async fn get_access_token(&self, token: &str) -> Result<TokenLookup, PerimeterError> {
        if let Some(cached) = self.cache.get_token(token).await? {
            return Ok(TokenLookup::Found(cached));
        }

        let _fill = self.fill_lock.read().await;
        let Some(model) = self.find_by_value(token).await? else {
            return Ok(TokenLookup::Empty);
        };
        self.cache.put_token(&model, self.cache_ttl).await?;

        // Another process may have written between our read and our fill.
        match self.find_by_value(token).await? {
            Some(current) if current == model => {
                debug!(token_id = model.id, "cached access token after miss");
                Ok(TokenLookup::Found(model))
            }
            Some(current) => {
                self.cache.put_token(&current, self.cache_ttl).await?;
                Ok(TokenLookup::Found(current))
            }
            None => {
                self.cache.evict_token(token).await?;
                Ok(TokenLookup::Empty)
            }
        }
    }

    /// Persist changes to an existing token and refresh its cache entry.
    ///
    /// `updated_at` is stamped here; `created_at` and `token` are left as
    /// stored.
    pub async fn save(
        &self,
        token: access_token::Model,
    ) -> Result<access_token::Model, PerimeterError> {
        let mut active: access_token::ActiveModel = token.into();
        active.reset(access_token::Column::IsActive);
        active.reset(access_token::Column::ExpiresOn);
        active.reset(access_token::Column::CreatedBy);
        active.updated_at = Set(now());

        let _write = self.fill_lock.write().await;
        let txn = self.db.begin().await?;
        let saved = active.update(&txn).await?;
        self.commit_with_cache(txn, &saved).await?;
        Ok(saved)
    }

    /// Flip the kill-switch on a token.
    pub async fn set_active(
        &self,
        token: &str,
        is_active: bool,
    ) -> Result<access_token::Model, PerimeterError> {
        let mut model = self.find_for_update(token).await?;
        model.is_active = is_active;
        let saved = self.save(model).await?;
        info!(token_id = saved.id, is_active, "access token active flag changed");
        Ok(saved)
    }

    /// Move a token's expiry date.
    pub async fn set_expires_on(
        &self,
        token: &str,
        expires_on: NaiveDate,
    ) -> Result<access_token::Model, PerimeterError> {
        let mut model = self.find_for_update(token).await?;
        model.expires_on = expires_on;
        let saved = self.save(model).await?;
        info!(token_id = saved.id, %expires_on, "access token expiry changed");
        Ok(saved)
    }

    /// All tokens, newest first.
    pub async fn list_access_tokens(&self) -> Result<Vec<access_token::Model>, PerimeterError> {
        Ok(access_token::Entity::find()
            .order_by_desc(access_token::Column::CreatedAt)
            .order_by_desc(access_token::Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Delete a token and its usage history, then evict it from the cache.
    ///
    /// Returns `false` if no such token existed. The cache entry is evicted
    /// either way.
    pub async fn delete(&self, token: &str) -> Result<bool, PerimeterError> {
        let _write = self.fill_lock.write().await;
        let txn = self.db.begin().await?;
        let existing = access_token::Entity::find()
            .filter(access_token::Column::Token.eq(token))
            .one(&txn)
            .await?;

        let deleted = match existing {
            Some(model) => {
                access_token_use::Entity::delete_many()
                    .filter(access_token_use::Column::TokenId.eq(model.id))
                    .exec(&txn)
                    .await?;
                access_token::Entity::delete_by_id(model.id)
                    .exec(&txn)
                    .await?;
                true
            }
            None => false,
        };

        // Evict before committing so a cache failure rolls the delete back,
        // and again afterwards for readers in other processes.
        self.cache.evict_token(token).await?;
        txn.commit().await?;
        self.cache.evict_token(token).await?;
        if deleted {
            info!("deleted access token");
        }
        Ok(deleted)
    }

    async fn find_by_value(&self, token: &str) -> Result<Option<access_token::Model>, DbErr> {
        access_token::Entity::find()
            .filter(access_token::Column::Token.eq(token))
            .one(&self.db)
            .await
    }

    async fn find_for_update(&self, token: &str) -> Result<access_token::Model, PerimeterError> {
        self.find_by_value(token)
            .await?
            .ok_or_else(|| PerimeterError::NotFound(format!("access token {token}")))
    }

    fn check_token_value(&self, token: &str) -> Result<(), PerimeterError> {
        if token.trim().is_empty() {
            return Err(PerimeterError::Validation(
                "token must not be empty".to_string(),
            ));
        }
        // Submitted candidates are trimmed, so padded values could never match.
        if token.trim() != token {
            return Err(PerimeterError::Validation(
                "token must not start or end with whitespace".to_string(),
            ));
        }
        if token.chars().count() > self.token_length {
            return Err(PerimeterError::Validation(format!(
                "token must be at most {} characters",
                self.token_length
            )));
        }
        Ok(())
    }

    /// Write `model` to the cache, then commit `txn`.
    ///
    /// A cache failure drops the transaction, rolling the write back. A
    /// commit failure evicts the entry that was just written. Either way no
    /// caller sees a row without its cache entry or the reverse. The entry is
    /// written once more after the commit so that a fill from another process
    /// that read the old row cannot outlast it.
    async fn commit_with_cache(
        &self,
        txn: DatabaseTransaction,
        model: &access_token::Model,
    ) -> Result<(), PerimeterError> {
        self.cache.put_token(model, self.cache_ttl).await?;

        if let Err(err) = txn.commit().await {
            if let Err(evict_err) = self.cache.evict_token(&model.token).await {
                warn!(error = %evict_err, "failed to evict access token after commit error");
            }
            return Err(err.into());
        }

        if let Err(err) = self.cache.put_token(model, self.cache_ttl).await {
            warn!(token_id = model.id, error = %err, "failed to refresh access token after commit");
        }
        Ok(())
    }
}

fn duplicate_or_db(err: DbErr, token: &str) -> PerimeterError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            warn!("rejected duplicate access token value");
            PerimeterError::DuplicateToken(token.to_string())
        }
        _ => PerimeterError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_random_token_length_and_alphabet() {
        for len in [1, 6, 10, 32] {
            let token = random_token_value(len);
            assert_eq!(token.len(), len);
            assert!(token.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_random_token_avoids_ambiguous_characters() {
        let sample: String = (0..200).map(|_| random_token_value(10)).collect();
        for c in ['0', 'O', '1', 'I', 'a', 'z'] {
            assert!(!sample.contains(c), "unexpected {c:?} in generated tokens");
        }
    }

    #[test]
    fn test_random_tokens_do_not_collide() {
        let tokens: HashSet<String> = (0..10_000).map(|_| random_token_value(10)).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_default_expiry_on() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 28).unwrap();
        assert_eq!(
            default_expiry_on(today, 7).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()
        );
        assert_eq!(default_expiry_on(today, 0).unwrap(), today);
    }

    #[test]
    fn test_default_expiry_out_of_range() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 28).unwrap();
        for days in [-1, 9_999_999_999, i64::MAX] {
            let err = default_expiry_on(today, days).unwrap_err();
            assert!(
                matches!(err, PerimeterError::Validation(_)),
                "{days} days should be rejected, got {err:?}"
            );
        }
    }
}
