use async_trait::async_trait;

use super::EXERCISE_CATEGORIES;
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::{seed_reference_collection, ReferenceSeed};

pub const CATEGORIES: &[ReferenceSeed] = &[
    ReferenceSeed::new("Haut du corps", &[("fr", "Haut du corps"), ("en", "Upper body")]),
    ReferenceSeed::new("Bas du corps", &[("fr", "Bas du corps"), ("en", "Lower body")]),
    ReferenceSeed::new("Tronc", &[("fr", "Tronc"), ("en", "Core")]),
    ReferenceSeed::new("Cardio", &[("fr", "Cardio"), ("en", "Cardio")]),
    ReferenceSeed::new("Mobilité", &[("fr", "Mobilité"), ("en", "Mobility")]),
];

/// Seeds the exercise categories referenced by every exercise.
#[derive(Debug, Clone, Copy)]
pub struct SeedExerciseCategories {
    seeds: &'static [ReferenceSeed],
}

impl SeedExerciseCategories {
    pub fn with_seeds(seeds: &'static [ReferenceSeed]) -> Self {
        Self { seeds }
    }
}

impl Default for SeedExerciseCategories {
    fn default() -> Self {
        Self::with_seeds(CATEGORIES)
    }
}

#[async_trait]
impl Migration for SeedExerciseCategories {
    fn id(&self) -> &str {
        "0002_seed_exercise_categories"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed exercise categories")
    }

    fn requires(&self) -> &'static [Requirement] {
        &[Requirement::Owner]
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        seed_reference_collection(ctx, EXERCISE_CATEGORIES, self.seeds).await?;
        Ok(())
    }
}
