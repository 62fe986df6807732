use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use thiserror::Error;

use crate::destructive::{DestructiveFinding, StatementAuditor};
use crate::splitter::split_statements_with;

/// Outstanding tokens kept per guard; older ones are evicted first.
pub const MAX_PENDING_CONFIRMATIONS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfirmationToken(String);

impl ConfirmationToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow {
        findings: Vec<DestructiveFinding>,
    },
    RequireConfirmation {
        token: ConfirmationToken,
        findings: Vec<DestructiveFinding>,
    },
}

impl GuardDecision {
    #[must_use]
    pub fn findings(&self) -> &[DestructiveFinding] {
        match self {
            Self::Allow { findings } | Self::RequireConfirmation { findings, .. } => findings,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("confirmation token is invalid or expired")]
    InvalidToken,
    #[error("confirmation token does not match the SQL being executed")]
    SqlMismatch,
}

#[derive(Debug, Clone)]
struct PendingConfirmation {
    token: ConfirmationToken,
    sql_fingerprint: u64,
}

/// Blocks scripts containing unguarded `UPDATE`/`DELETE` until the caller
/// confirms them with a single-use token.
#[derive(Debug, Default)]
pub struct ExecutionGuard {
    enabled: bool,
    nonce: u64,
    auditor: StatementAuditor,
    pending: VecDeque<PendingConfirmation>,
}

impl ExecutionGuard {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auditor(mut self, auditor: StatementAuditor) -> Self {
        self.auditor = auditor;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.pending.clear();
        }
    }

    pub fn evaluate(&mut self, sql: &str) -> GuardDecision {
        let findings = self.auditor.audit(sql);
        if !self.enabled || findings.is_empty() {
            return GuardDecision::Allow { findings };
        }

        self.nonce = self.nonce.saturating_add(1);
        let fingerprint = self.fingerprint(sql);
        let token = ConfirmationToken(format!("confirm-{}-{fingerprint:016x}", self.nonce));
        if self.pending.len() == MAX_PENDING_CONFIRMATIONS {
            if let Some(evicted) = self.pending.pop_front() {
                log::debug!("dropping unconfirmed token {}", evicted.token.as_str());
            }
        }
        self.pending.push_back(PendingConfirmation {
            token: token.clone(),
            sql_fingerprint: fingerprint,
        });
        log::debug!(
            "{} destructive statement(s) awaiting confirmation",
            findings.len()
        );

        GuardDecision::RequireConfirmation { token, findings }
    }

    pub fn confirm(&mut self, token: &ConfirmationToken, sql: &str) -> Result<(), GuardError> {
        let Some(pending) = self
            .pending
            .iter()
            .position(|pending| pending.token == *token)
            .and_then(|index| self.pending.remove(index))
        else {
            return Err(GuardError::InvalidToken);
        };

        if pending.sql_fingerprint != self.fingerprint(sql) {
            return Err(GuardError::SqlMismatch);
        }

        Ok(())
    }

    /// Hash of the statement list, so whitespace around statements does not
    /// invalidate a confirmation.
    fn fingerprint(&self, sql: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        for statement in split_statements_with(sql, self.auditor.scan_options()) {
            statement.query.hash(&mut hasher);
        }
        hasher.finish()
    }
}
