use async_trait::async_trait;
use tracing::info;

use super::TAGS;
use crate::core::{Migration, MigrationContext};
use crate::error::Error;
use crate::store::IndexSpec;

/// Tags are created by coaches, so their natural key includes the owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateTagIndexes;

#[async_trait]
impl Migration for CreateTagIndexes {
    fn id(&self) -> &str {
        "0007_create_tag_indexes"
    }

    fn description(&self) -> Option<&str> {
        Some("Create the per-owner unique tag index")
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        ctx.store()
            .create_indexes(
                TAGS,
                vec![
                    IndexSpec::ascending(&["createdBy", "slug", "locale"]).unique(),
                    IndexSpec::ascending(&["updatedAt"]),
                ],
            )
            .await?;
        info!("{}: ensured indexes on '{TAGS}'", ctx.id());
        Ok(())
    }
}
