use async_trait::async_trait;
use bson::doc;
use tracing::info;

use super::{EQUIPMENT, EXERCISES, EXERCISE_CATEGORIES, MUSCLES, SESSIONS};
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::resolve_owner;

/// Reference collections whose rows must all have an owner.
const OWNED: &[&str] = &[EXERCISE_CATEGORIES, MUSCLES, EQUIPMENT, EXERCISES, SESSIONS];

/// Hands every reference row without an owner to the admin.
///
/// Rows inserted outside the seed migrations (imports, manual fixes) may lack `createdBy`.
/// Rows that already have an owner are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignAdminOwnership;

#[async_trait]
impl Migration for AssignAdminOwnership {
    fn id(&self) -> &str {
        "0008_assign_admin_ownership"
    }

    fn description(&self) -> Option<&str> {
        Some("Assign reference rows without an owner to the admin")
    }

    fn requires(&self) -> &'static [Requirement] {
        &[Requirement::Owner]
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        let owner = resolve_owner(ctx).await?;
        for collection in OWNED {
            let outcome = ctx
                .store()
                .update_many(
                    collection,
                    doc! { "createdBy": { "$exists": false } },
                    doc! { "$set": { "createdBy": owner.clone(), "updatedAt": ctx.now_bson() } },
                )
                .await?;
            info!(
                "{}: {collection} assigned={}",
                ctx.id(),
                outcome.modified
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::CreateAdmin;
    use crate::seed::USERS;
    use crate::testing::TestHarness;

    #[tokio::test]
    async fn only_unowned_rows_change_hands() {
        let harness = TestHarness::new(vec![]);
        harness.apply(&CreateAdmin).await.unwrap();
        harness
            .insert(MUSCLES, doc! { "slug": "trapezes", "locale": "fr" })
            .await
            .unwrap();
        harness
            .insert(MUSCLES, doc! { "slug": "biceps", "locale": "fr", "createdBy": "coach-a" })
            .await
            .unwrap();

        harness.apply(&AssignAdminOwnership).await.unwrap();

        let admin = harness.documents(USERS).await.remove(0);
        let muscles = harness.documents(MUSCLES).await;
        assert_eq!(muscles[0].get("createdBy"), admin.get("_id"));
        assert_eq!(muscles[1].get_str("createdBy").unwrap(), "coach-a");
        assert!(muscles[1].get("updatedAt").is_none());
    }
}
