//! Dynamic source sync (§4.6): pure planning logic, kept separate from the
//! scheduler's registration side effects so it can be tested against a mock
//! `GoalStore` without a running scheduler.

use crate::collaborators::GoalStore;
use crate::error::GoalStoreError;
use crate::trigger::{Trigger, DYNAMIC_TRIGGER_PREFIX};

/// What a sync pass decided to do.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    /// Dynamic triggers to (re-)register, one per active goal with a
    /// review cadence.
    pub to_register: Vec<Trigger>,
    /// Names (already carrying the `okr:` prefix) of dynamic triggers that
    /// are registered but no longer correspond to an active goal, and
    /// should be unregistered and deleted from the store.
    pub to_prune: Vec<String>,
}

/// Asks the goal store for all goals and computes the registration/prune
/// plan (§4.6 steps 1-3). Applying the plan (actually calling
/// `register_trigger`/`unregister_trigger`) is the caller's job.
pub async fn plan_sync(goal_store: &dyn GoalStore, current_dynamic_names: &[String]) -> Result<SyncPlan, GoalStoreError> {
    let goals = goal_store.list_goals().await?;

    let mut to_register = Vec::new();
    let mut active_names = std::collections::HashSet::new();

    for goal in goals.into_iter().filter(|g| g.is_active() && !g.review_cadence_cron.trim().is_empty()) {
        let name = Trigger::dynamic_name(&goal.id);
        active_names.insert(name.clone());
        let trigger = Trigger::new(name, goal.review_cadence_cron.clone(), format!("review goal {}", goal.id)).with_goal_id(goal.id);
        to_register.push(trigger);
    }

    let to_prune = current_dynamic_names
        .iter()
        .filter(|name| name.starts_with(DYNAMIC_TRIGGER_PREFIX) && !active_names.contains(*name))
        .cloned()
        .collect();

    Ok(SyncPlan { to_register, to_prune })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Goal;
    use async_trait::async_trait;

    struct FixedGoalStore(Vec<Goal>);

    #[async_trait]
    impl GoalStore for FixedGoalStore {
        async fn list_goals(&self) -> Result<Vec<Goal>, GoalStoreError> {
            Ok(self.0.clone())
        }
    }

    fn goal(id: &str, status: &str, cron: &str) -> Goal {
        Goal { id: id.to_string(), status: status.to_string(), review_cadence_cron: cron.to_string() }
    }

    #[tokio::test]
    async fn active_goal_with_cadence_is_registered() {
        let store = FixedGoalStore(vec![goal("g1", "active", "0 0 * * 1")]);
        let plan = plan_sync(&store, &[]).await.expect("plan");
        assert_eq!(plan.to_register.len(), 1);
        assert_eq!(plan.to_register[0].name, "okr:g1");
        assert!(plan.to_prune.is_empty());
    }

    #[tokio::test]
    async fn inactive_goal_is_not_registered() {
        let store = FixedGoalStore(vec![goal("g1", "completed", "0 0 * * 1")]);
        let plan = plan_sync(&store, &[]).await.expect("plan");
        assert!(plan.to_register.is_empty());
    }

    #[tokio::test]
    async fn goal_without_cadence_is_not_registered() {
        let store = FixedGoalStore(vec![goal("g1", "active", "")]);
        let plan = plan_sync(&store, &[]).await.expect("plan");
        assert!(plan.to_register.is_empty());
    }

    #[tokio::test]
    async fn deleted_active_goal_is_pruned() {
        let store = FixedGoalStore(vec![]);
        let current = vec!["okr:g1".to_string()];
        let plan = plan_sync(&store, &current).await.expect("plan");
        assert!(plan.to_register.is_empty());
        assert_eq!(plan.to_prune, vec!["okr:g1".to_string()]);
    }

    #[tokio::test]
    async fn static_trigger_names_are_never_pruned() {
        let store = FixedGoalStore(vec![]);
        let current = vec!["daily".to_string(), "__heartbeat__".to_string()];
        let plan = plan_sync(&store, &current).await.expect("plan");
        assert!(plan.to_prune.is_empty());
    }
}
