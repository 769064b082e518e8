//! Token validity rules.
//!
//! Everything here is a pure function of the token's `is_active` flag, its
//! `expires_on` date and the current date. Dates are compared as calendar
//! days in UTC; time of day never matters. A token is still good on its
//! `expires_on` day and stops working when the next day starts.

use chrono::{NaiveDate, Utc};

use crate::models::access_token;

/// The current date, on the same UTC basis used to compute `expires_on`.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `is_active && expires_on >= today`.
pub fn is_valid_on(is_active: bool, expires_on: NaiveDate, today: NaiveDate) -> bool {
    is_active && !has_expired_on(expires_on, today)
}

/// `expires_on < today`, regardless of whether the token is active.
pub fn has_expired_on(expires_on: NaiveDate, today: NaiveDate) -> bool {
    expires_on < today
}

/// Result of looking a token up by value.
///
/// `Empty` stands in for "no such token" so callers can branch on
/// [`is_valid`](TokenLookup::is_valid) without a separate existence check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenLookup {
    Found(access_token::Model),
    Empty,
}

impl TokenLookup {
    /// Always `false` for `Empty`.
    pub fn is_valid(&self) -> bool {
        self.is_valid_on(today())
    }

    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        match self {
            TokenLookup::Found(token) => token.is_valid_on(today),
            TokenLookup::Empty => false,
        }
    }

    /// `Empty` never had an expiry date, so it has not expired.
    pub fn has_expired(&self) -> bool {
        match self {
            TokenLookup::Found(token) => token.has_expired(),
            TokenLookup::Empty => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TokenLookup::Empty)
    }

    pub fn as_token(&self) -> Option<&access_token::Model> {
        match self {
            TokenLookup::Found(token) => Some(token),
            TokenLookup::Empty => None,
        }
    }

    pub fn into_token(self) -> Option<access_token::Model> {
        match self {
            TokenLookup::Found(token) => Some(token),
            TokenLookup::Empty => None,
        }
    }
}

impl From<Option<access_token::Model>> for TokenLookup {
    fn from(value: Option<access_token::Model>) -> Self {
        value.map_or(TokenLookup::Empty, TokenLookup::Found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn token(is_active: bool, expires_on: NaiveDate) -> access_token::Model {
        let stamp = day(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap();
        access_token::Model {
            id: 1,
            token: "X1A2B3".to_string(),
            is_active,
            expires_on,
            created_at: stamp,
            updated_at: stamp,
            created_by: None,
        }
    }

    #[test]
    fn test_validity_table() {
        let today = day(2025, 6, 15);
        let yesterday = today - Duration::days(1);
        let tomorrow = today + Duration::days(1);

        let cases = [
            (true, yesterday, false),
            (true, today, true),
            (true, tomorrow, true),
            (false, yesterday, false),
            (false, today, false),
            (false, tomorrow, false),
        ];
        for (active, expires, valid) in cases {
            assert_eq!(
                is_valid_on(active, expires, today),
                valid,
                "active={active} expires={expires}"
            );
            assert_eq!(token(active, expires).is_valid_on(today), valid);
        }
    }

    #[test]
    fn test_has_expired_ignores_active_flag() {
        let today = day(2025, 6, 15);
        let yesterday = today - Duration::days(1);
        let tomorrow = today + Duration::days(1);

        for active in [true, false] {
            assert!(token(active, yesterday).has_expired_on(today));
            assert!(!token(active, today).has_expired_on(today));
            assert!(!token(active, tomorrow).has_expired_on(today));
        }
    }

    #[test]
    fn test_deactivated_unexpired_token() {
        let today = day(2025, 6, 15);
        let t = token(false, today + Duration::days(3));
        assert!(!t.is_valid_on(today));
        assert!(!t.has_expired_on(today));
    }

    #[test]
    fn test_empty_lookup_is_never_valid() {
        let lookup = TokenLookup::Empty;
        assert!(!lookup.is_valid());
        assert!(!lookup.is_valid_on(day(1970, 1, 1)));
        assert!(!lookup.has_expired());
        assert!(lookup.is_empty());
        assert!(lookup.into_token().is_none());
    }

    #[test]
    fn test_found_lookup_delegates_to_token() {
        let today = day(2025, 6, 15);
        let lookup = TokenLookup::from(Some(token(true, today)));
        assert!(lookup.is_valid_on(today));
        assert!(!lookup.is_valid_on(today + Duration::days(1)));
        assert_eq!(lookup.as_token().map(|t| t.token.as_str()), Some("X1A2B3"));
    }
}
