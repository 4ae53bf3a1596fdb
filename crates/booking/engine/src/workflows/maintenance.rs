//! Periodic maintenance: refresh external profile data for every account.
//! One account failing never aborts the batch.

use super::{WorkflowDeps, REFRESH_PROFILES};
use crate::definition::{Action, ActionError, StepContext, StepSpec, WorkflowDefinition};
use crate::profile::ProfileDirectory;
use async_trait::async_trait;
use booking_types::EventType;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub const REFRESH_ACCOUNTS: &str = "refresh-accounts";

/// Upper bound on a single directory call
pub const DEFAULT_ACCOUNT_TIMEOUT: Duration = Duration::from_secs(30);

pub(super) fn definition(deps: &WorkflowDeps) -> WorkflowDefinition {
    WorkflowDefinition::new(REFRESH_PROFILES, EventType::Maintenance)
        .with_description("Refresh external profile data per account")
        .step(StepSpec::action(
            REFRESH_ACCOUNTS,
            Arc::new(RefreshProfilesAction::new(deps.profiles.clone())),
        ))
}

pub struct RefreshProfilesAction {
    profiles: Arc<dyn ProfileDirectory>,
    account_timeout: Duration,
}

impl RefreshProfilesAction {
    pub fn new(profiles: Arc<dyn ProfileDirectory>) -> Self {
        Self {
            profiles,
            account_timeout: DEFAULT_ACCOUNT_TIMEOUT,
        }
    }

    pub fn with_account_timeout(mut self, timeout: Duration) -> Self {
        self.account_timeout = timeout;
        self
    }
}

#[async_trait]
impl Action for RefreshProfilesAction {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<Value, ActionError> {
        let accounts = tokio::time::timeout(self.account_timeout, self.profiles.list_accounts())
            .await
            .map_err(|_| ActionError::Timeout(self.account_timeout))?
            .map_err(|e| ActionError::Failed(e.to_string()))?;

        let mut refreshed = 0u32;
        let mut failed = 0u32;
        for account in &accounts {
            let refresh = self.profiles.refresh_profile(account);
            match tokio::time::timeout(self.account_timeout, refresh).await {
                Ok(Ok(())) => refreshed += 1,
                Ok(Err(e)) => {
                    failed += 1;
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        account = %account.id,
                        error = %e,
                        "Profile refresh failed"
                    );
                }
                Err(_) => {
                    failed += 1;
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        account = %account.id,
                        timeout = ?self.account_timeout,
                        "Profile refresh timed out"
                    );
                }
            }
        }

        tracing::info!(run_id = %ctx.run_id, refreshed, failed, "Profile refresh finished");
        Ok(json!({ "refreshed": refreshed, "failed": failed }))
    }

    fn bounds_own_work(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{AccountRef, ProfileError};
    use booking_types::{CorrelationKey, RunId, SlotClock, StepHistory};
    use chrono::Utc;

    struct HalfBroken;

    #[async_trait]
    impl ProfileDirectory for HalfBroken {
        async fn list_accounts(&self) -> Result<Vec<AccountRef>, ProfileError> {
            Ok(vec![
                AccountRef::new("a"),
                AccountRef::new("b"),
                AccountRef::new("c"),
            ])
        }

        async fn refresh_profile(&self, account: &AccountRef) -> Result<(), ProfileError> {
            if account.id == "b" {
                return Err(ProfileError::Refresh {
                    account: account.id.clone(),
                    reason: "rate limited".into(),
                });
            }
            Ok(())
        }
    }

    /// Account "b" never answers
    struct Stuck;

    #[async_trait]
    impl ProfileDirectory for Stuck {
        async fn list_accounts(&self) -> Result<Vec<AccountRef>, ProfileError> {
            HalfBroken.list_accounts().await
        }

        async fn refresh_profile(&self, account: &AccountRef) -> Result<(), ProfileError> {
            if account.id == "b" {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_secs(20)).await;
            Ok(())
        }
    }

    async fn run(action: RefreshProfilesAction) -> Result<Value, ActionError> {
        let run_id = RunId::new("r");
        let key = CorrelationKey::new("maintenance");
        let payload = Value::Null;
        let history = StepHistory::new();
        let ctx = StepContext {
            run_id: &run_id,
            correlation_key: &key,
            payload: &payload,
            history: &history,
            now: Utc::now(),
            slots: SlotClock::default(),
        };

        action.execute(&ctx).await
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let result = run(RefreshProfilesAction::new(Arc::new(HalfBroken)))
            .await
            .unwrap();
        assert_eq!(result, json!({"refreshed": 2, "failed": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_account_times_out_alone() {
        let action = RefreshProfilesAction::new(Arc::new(Stuck));
        assert!(action.bounds_own_work());

        // 20s per healthy account: the batch outlasts any step-level limit,
        // each call stays within its own.
        let result = run(action).await.unwrap();
        assert_eq!(result, json!({"refreshed": 2, "failed": 1}));
    }
}
