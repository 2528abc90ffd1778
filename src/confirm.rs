//! Confirmation tokens for destructive admin commands. The first call
//! describes what will happen and hands out a token; only the matching commit
//! call with that token performs the action.

use crate::backup::BackupDocument;
use crate::error::{Error, Result};
use crate::school::new_id;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub const TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    CloseYear { year: String },
    BulkPromotion { year: String },
    RestoreBackup { document: BackupDocument },
}

impl PendingAction {
    fn kind(&self) -> &'static str {
        match self {
            PendingAction::CloseYear { .. } => kinds::CLOSE_YEAR,
            PendingAction::BulkPromotion { .. } => kinds::BULK_PROMOTION,
            PendingAction::RestoreBackup { .. } => kinds::RESTORE_BACKUP,
        }
    }
}

#[derive(Debug, Default)]
pub struct Confirmations {
    pending: HashMap<String, (PendingAction, DateTime<Utc>)>,
}

impl Confirmations {
    pub fn issue(&mut self, action: PendingAction, now: DateTime<Utc>) -> String {
        self.pending
            .retain(|_, (_, issued)| now - *issued <= Duration::minutes(TOKEN_TTL_MINUTES));
        let token = new_id();
        tracing::debug!(kind = action.kind(), "confirmation token issued");
        self.pending.insert(token.clone(), (action, now));
        token
    }

    /// Removes and returns the action for `token`. Tokens are single use and a
    /// token of the wrong kind is consumed as well.
    pub fn take(&mut self, token: &str, kind: &str, now: DateTime<Utc>) -> Result<PendingAction> {
        let (action, issued) = self.pending.remove(token).ok_or(Error::InvalidToken)?;
        if now - issued > Duration::minutes(TOKEN_TTL_MINUTES) || action.kind() != kind {
            return Err(Error::InvalidToken);
        }
        Ok(action)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

pub mod kinds {
    pub const CLOSE_YEAR: &str = "close_year";
    pub const BULK_PROMOTION: &str = "bulk_promotion";
    pub const RESTORE_BACKUP: &str = "restore_backup";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-31T10:00:00Z")
            .expect("ts")
            .with_timezone(&Utc)
    }

    #[test]
    fn tokens_are_single_use() {
        let mut c = Confirmations::default();
        let action = PendingAction::CloseYear { year: "2025-26".into() };
        let token = c.issue(action.clone(), t0());
        assert_eq!(c.take(&token, kinds::CLOSE_YEAR, t0()).expect("take"), action);
        assert!(matches!(c.take(&token, kinds::CLOSE_YEAR, t0()), Err(Error::InvalidToken)));
    }

    #[test]
    fn wrong_kind_and_expired_tokens_fail() {
        let mut c = Confirmations::default();
        let token = c.issue(PendingAction::BulkPromotion { year: "2025-26".into() }, t0());
        assert!(matches!(c.take(&token, kinds::CLOSE_YEAR, t0()), Err(Error::InvalidToken)));

        let token = c.issue(PendingAction::BulkPromotion { year: "2025-26".into() }, t0());
        let late = t0() + Duration::minutes(TOKEN_TTL_MINUTES + 1);
        assert!(matches!(c.take(&token, kinds::BULK_PROMOTION, late), Err(Error::InvalidToken)));
    }
}
