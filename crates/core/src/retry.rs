use async_trait::async_trait;
use thiserror::Error;

use crate::dialect::build_retry_candidates_with;
use crate::scanner::ScanOptions;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DispatchError {
    message: String,
}

impl DispatchError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("query failed after {attempts} attempt(s): {source}")]
    Dispatch {
        attempts: usize,
        #[source]
        source: DispatchError,
    },
}

/// Seam to whatever actually runs SQL.
#[async_trait]
pub trait QueryDispatcher {
    type Output: Send;

    async fn dispatch(&self, sql: &str) -> Result<Self::Output, DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome<T> {
    pub output: T,
    pub executed_sql: String,
    pub attempts: usize,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }
}

/// Runs a query and, when it fails, retries the dialect-rewritten candidates
/// once each. If all of them fail the original error is reported.
#[derive(Debug)]
pub struct RetryingExecutor<D: QueryDispatcher> {
    dispatcher: D,
    active_database: Option<String>,
    scan_options: ScanOptions,
}

impl<D: QueryDispatcher> RetryingExecutor<D> {
    #[must_use]
    pub fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            active_database: None,
            scan_options: ScanOptions::default(),
        }
    }

    #[must_use]
    pub fn with_scan_options(mut self, options: ScanOptions) -> Self {
        self.scan_options = options;
        self
    }

    #[must_use]
    pub fn with_active_database(mut self, database: Option<String>) -> Self {
        self.active_database = database;
        self
    }

    #[must_use]
    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub async fn execute(&self, sql: &str) -> Result<RetryOutcome<D::Output>, RetryError> {
        let original_error = match self.dispatcher.dispatch(sql).await {
            Ok(output) => {
                return Ok(RetryOutcome {
                    output,
                    executed_sql: sql.to_string(),
                    attempts: 1,
                })
            }
            Err(err) => err,
        };

        let candidates = build_retry_candidates_with(
            sql,
            original_error.message(),
            self.active_database.as_deref(),
            self.scan_options,
        );
        let mut attempts = 1;
        for candidate in candidates {
            attempts += 1;
            log::debug!("retrying with rewritten query: {candidate}");
            match self.dispatcher.dispatch(&candidate).await {
                Ok(output) => {
                    return Ok(RetryOutcome {
                        output,
                        executed_sql: candidate,
                        attempts,
                    })
                }
                Err(err) => log::warn!("retry candidate failed: {err}"),
            }
        }

        Err(RetryError::Dispatch {
            attempts,
            source: original_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::{DispatchError, QueryDispatcher, RetryError, RetryingExecutor};
    use crate::scanner::ScanOptions;

    #[derive(Debug, Default)]
    struct FakeDispatcher {
        failures: HashMap<String, String>,
        seen: Mutex<Vec<String>>,
    }

    impl FakeDispatcher {
        fn failing(pairs: &[(&str, &str)]) -> Self {
            Self {
                failures: pairs
                    .iter()
                    .map(|(sql, error)| ((*sql).to_string(), (*error).to_string()))
                    .collect(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl QueryDispatcher for FakeDispatcher {
        type Output = usize;

        async fn dispatch(&self, sql: &str) -> Result<Self::Output, DispatchError> {
            self.seen.lock().expect("seen lock").push(sql.to_string());
            match self.failures.get(sql) {
                Some(message) => Err(DispatchError::new(message.clone())),
                None => Ok(sql.len()),
            }
        }
    }

    #[tokio::test]
    async fn successful_query_is_not_retried() {
        let executor = RetryingExecutor::new(FakeDispatcher::default());

        let outcome = executor.execute("SELECT 1").await.expect("query should run");

        assert_eq!(outcome.executed_sql, "SELECT 1");
        assert_eq!(outcome.output, 8);
        assert!(!outcome.was_retried());
        assert_eq!(executor.dispatcher().seen(), vec!["SELECT 1"]);
    }

    #[tokio::test]
    async fn backtick_query_is_retried_with_double_quotes() {
        let dispatcher = FakeDispatcher::failing(&[(
            "SELECT * FROM `users`",
            "syntax error at or near \"`\"",
        )]);
        let executor = RetryingExecutor::new(dispatcher);

        let outcome = executor
            .execute("SELECT * FROM `users`")
            .await
            .expect("retry should succeed");

        assert_eq!(outcome.executed_sql, r#"SELECT * FROM "users""#);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.was_retried());
    }

    #[tokio::test]
    async fn qualifier_is_stripped_when_relation_is_missing() {
        let dispatcher = FakeDispatcher::failing(&[
            (
                "SELECT * FROM `app`.`users`",
                r#"relation "app.users" does not exist"#,
            ),
            (
                r#"SELECT * FROM "app"."users""#,
                r#"schema "app" does not exist"#,
            ),
        ]);
        let executor =
            RetryingExecutor::new(dispatcher).with_active_database(Some("app".to_string()));

        let outcome = executor
            .execute("SELECT * FROM `app`.`users`")
            .await
            .expect("stripped candidate should succeed");

        assert_eq!(outcome.executed_sql, r#"SELECT * FROM "users""#);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(executor.dispatcher().seen().len(), 3);
    }

    #[tokio::test]
    async fn original_error_is_reported_when_every_candidate_fails() {
        let dispatcher = FakeDispatcher::failing(&[
            ("SELECT `x` FROM t", "column x missing"),
            (r#"SELECT "x" FROM t"#, "still missing"),
        ]);
        let executor = RetryingExecutor::new(dispatcher);

        let err = executor
            .execute("SELECT `x` FROM t")
            .await
            .expect_err("both attempts fail");

        let RetryError::Dispatch { attempts, source } = err;
        assert_eq!(attempts, 2);
        assert_eq!(source.message(), "column x missing");
    }

    #[tokio::test]
    async fn failure_without_candidates_is_final() {
        let dispatcher = FakeDispatcher::failing(&[("SELECT nope", "boom")]);
        let executor = RetryingExecutor::new(dispatcher);

        let err = executor
            .execute("SELECT nope")
            .await
            .expect_err("no candidates to retry");

        assert_eq!(err.to_string(), "query failed after 1 attempt(s): boom");
        assert_eq!(executor.dispatcher().seen(), vec!["SELECT nope"]);
    }

    #[tokio::test]
    async fn scan_options_decide_what_gets_translated() {
        let sql = r"SELECT 'C:\' AS p, `name` FROM t";
        let error = "syntax error at or near \"`\"";

        let executor = RetryingExecutor::new(FakeDispatcher::failing(&[(sql, error)]));
        let err = executor.execute(sql).await.expect_err("backslash hides the backticks");
        assert!(matches!(err, RetryError::Dispatch { attempts: 1, .. }));

        let executor = RetryingExecutor::new(FakeDispatcher::failing(&[(sql, error)]))
            .with_scan_options(ScanOptions::default().with_backslash_escapes(false));
        let outcome = executor.execute(sql).await.expect("translated query runs");
        assert_eq!(outcome.executed_sql, r#"SELECT 'C:\' AS p, "name" FROM t"#);
    }
}
