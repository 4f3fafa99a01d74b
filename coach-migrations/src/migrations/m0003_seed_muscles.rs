use async_trait::async_trait;

use super::MUSCLES;
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::{seed_reference_collection, ReferenceSeed};

const UPPER: &[(&str, &str)] = &[("region", "upper")];
const LOWER: &[(&str, &str)] = &[("region", "lower")];
const CORE: &[(&str, &str)] = &[("region", "core")];

pub const MUSCLES_SEED: &[ReferenceSeed] = &[
    ReferenceSeed::new("Pectoraux", &[("fr", "Pectoraux"), ("en", "Chest")]).with_attributes(UPPER),
    ReferenceSeed::new("Dorsaux", &[("fr", "Dorsaux"), ("en", "Lats")]).with_attributes(UPPER),
    ReferenceSeed::new("Deltoïdes", &[("fr", "Deltoïdes"), ("en", "Shoulders")]).with_attributes(UPPER),
    ReferenceSeed::new("Biceps", &[("fr", "Biceps"), ("en", "Biceps")]).with_attributes(UPPER),
    ReferenceSeed::new("Triceps", &[("fr", "Triceps"), ("en", "Triceps")]).with_attributes(UPPER),
    ReferenceSeed::new("Abdominaux", &[("fr", "Abdominaux"), ("en", "Abs")]).with_attributes(CORE),
    ReferenceSeed::new("Obliques", &[("fr", "Obliques"), ("en", "Obliques")]).with_attributes(CORE),
    ReferenceSeed::new("Lombaires", &[("fr", "Lombaires"), ("en", "Lower back")]).with_attributes(CORE),
    ReferenceSeed::new("Quadriceps", &[("fr", "Quadriceps"), ("en", "Quadriceps")]).with_attributes(LOWER),
    ReferenceSeed::new("Ischio-jambiers", &[("fr", "Ischio-jambiers"), ("en", "Hamstrings")])
        .with_attributes(LOWER),
    ReferenceSeed::new("Fessiers", &[("fr", "Fessiers"), ("en", "Glutes")]).with_attributes(LOWER),
    ReferenceSeed::new("Mollets", &[("fr", "Mollets"), ("en", "Calves")]).with_attributes(LOWER),
];

/// Seeds the muscle groups exercises target.
#[derive(Debug, Clone, Copy)]
pub struct SeedMuscles {
    seeds: &'static [ReferenceSeed],
}

impl SeedMuscles {
    pub fn with_seeds(seeds: &'static [ReferenceSeed]) -> Self {
        Self { seeds }
    }
}

impl Default for SeedMuscles {
    fn default() -> Self {
        Self::with_seeds(MUSCLES_SEED)
    }
}

#[async_trait]
impl Migration for SeedMuscles {
    fn id(&self) -> &str {
        "0003_seed_muscles"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed muscle groups with their body region")
    }

    fn requires(&self) -> &'static [Requirement] {
        &[Requirement::Owner]
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        seed_reference_collection(ctx, MUSCLES, self.seeds).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::migrations::CreateAdmin;
    use crate::testing::TestHarness;

    #[tokio::test]
    async fn muscles_carry_their_region() {
        let harness = TestHarness::new(vec![]);
        harness.apply(&CreateAdmin).await.unwrap();
        harness.apply(&SeedMuscles::default()).await.unwrap();

        let hamstrings = harness
            .find_one(MUSCLES, doc! { "slug": "ischio-jambiers", "locale": "en" })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hamstrings.get_str("label").unwrap(), "Hamstrings");
        assert_eq!(hamstrings.get_str("region").unwrap(), "lower");
        assert!(harness
            .find_one(MUSCLES, doc! { "slug": "deltoides", "locale": "fr" })
            .await
            .unwrap()
            .is_some());
    }
}
