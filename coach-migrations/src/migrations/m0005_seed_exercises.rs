use async_trait::async_trait;
use bson::Bson;

use super::{EQUIPMENT, EXERCISES, EXERCISE_CATEGORIES, MUSCLES};
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::{
    ensure_natural_key_indexes, resolve_owner, write_seed_rows, ReferenceSeed, SeedRow,
    SlugLookup, SLUG_LOCALE,
};

/// An exercise and the slugs of the reference rows it points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExerciseSeed {
    pub entry: ReferenceSeed,
    pub category: &'static str,
    pub primary_muscles: &'static [&'static str],
    pub secondary_muscles: &'static [&'static str],
    pub equipment: &'static [&'static str],
}

pub const EXERCISES_SEED: &[ExerciseSeed] = &[
    ExerciseSeed {
        entry: ReferenceSeed::new("Pompes", &[("fr", "Pompes"), ("en", "Push-ups")]),
        category: "haut-du-corps",
        primary_muscles: &["pectoraux"],
        secondary_muscles: &["triceps", "deltoides"],
        equipment: &["poids-du-corps"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Tractions", &[("fr", "Tractions"), ("en", "Pull-ups")]),
        category: "haut-du-corps",
        primary_muscles: &["dorsaux"],
        secondary_muscles: &["biceps"],
        equipment: &["barre-de-traction"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Développé couché", &[("fr", "Développé couché"), ("en", "Bench press")]),
        category: "haut-du-corps",
        primary_muscles: &["pectoraux"],
        secondary_muscles: &["triceps", "deltoides"],
        equipment: &["barre", "banc"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Curl biceps", &[("fr", "Curl biceps"), ("en", "Biceps curl")]),
        category: "haut-du-corps",
        primary_muscles: &["biceps"],
        secondary_muscles: &[],
        equipment: &["halteres"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Squat", &[("fr", "Squat"), ("en", "Squat")]),
        category: "bas-du-corps",
        primary_muscles: &["quadriceps", "fessiers"],
        secondary_muscles: &["ischio-jambiers", "lombaires"],
        equipment: &["poids-du-corps"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Fentes", &[("fr", "Fentes"), ("en", "Lunges")]),
        category: "bas-du-corps",
        primary_muscles: &["quadriceps", "fessiers"],
        secondary_muscles: &["mollets"],
        equipment: &["halteres"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Soulevé de terre", &[("fr", "Soulevé de terre"), ("en", "Deadlift")]),
        category: "bas-du-corps",
        primary_muscles: &["ischio-jambiers", "fessiers"],
        secondary_muscles: &["lombaires", "dorsaux"],
        equipment: &["barre"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Gainage", &[("fr", "Gainage"), ("en", "Plank")]),
        category: "tronc",
        primary_muscles: &["abdominaux"],
        secondary_muscles: &["obliques", "lombaires"],
        equipment: &["tapis"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Kettlebell swing", &[("fr", "Kettlebell swing"), ("en", "Kettlebell swing")]),
        category: "cardio",
        primary_muscles: &["fessiers", "ischio-jambiers"],
        secondary_muscles: &["lombaires", "deltoides"],
        equipment: &["kettlebell"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Burpees", &[("fr", "Burpees"), ("en", "Burpees")]),
        category: "cardio",
        primary_muscles: &["quadriceps", "pectoraux"],
        secondary_muscles: &["abdominaux"],
        equipment: &["poids-du-corps"],
    },
    ExerciseSeed {
        entry: ReferenceSeed::new("Étirements des hanches", &[("fr", "Étirements des hanches"), ("en", "Hip stretch")]),
        category: "mobilite",
        primary_muscles: &["fessiers"],
        secondary_muscles: &["lombaires"],
        equipment: &["tapis", "elastiques"],
    },
];

const REQUIRES: &[Requirement] = &[
    Requirement::Owner,
    Requirement::Slugs {
        collection: EXERCISE_CATEGORIES,
        role: "category",
    },
    Requirement::Slugs {
        collection: MUSCLES,
        role: "primary muscle",
    },
    Requirement::Slugs {
        collection: EQUIPMENT,
        role: "equipment",
    },
];

/// Seeds exercises linked to their category, muscles and equipment.
///
/// Every reference is resolved for every locale before the first write, so a missing category,
/// muscle or equipment slug leaves the collection untouched.
#[derive(Debug, Clone, Copy)]
pub struct SeedExercises {
    seeds: &'static [ExerciseSeed],
}

impl SeedExercises {
    pub fn with_seeds(seeds: &'static [ExerciseSeed]) -> Self {
        Self { seeds }
    }
}

impl Default for SeedExercises {
    fn default() -> Self {
        Self::with_seeds(EXERCISES_SEED)
    }
}

#[async_trait]
impl Migration for SeedExercises {
    fn id(&self) -> &str {
        "0005_seed_exercises"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed exercises with category, muscle and equipment references")
    }

    fn requires(&self) -> &'static [Requirement] {
        REQUIRES
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        ensure_natural_key_indexes(ctx, EXERCISES, SLUG_LOCALE).await?;
        let owner = resolve_owner(ctx).await?;

        let mut rows = Vec::new();
        for locale in ctx.settings().locale_keys() {
            let categories = SlugLookup::load(ctx, EXERCISE_CATEGORIES, &locale).await?;
            let muscles = SlugLookup::load(ctx, MUSCLES, &locale).await?;
            let equipment = SlugLookup::load(ctx, EQUIPMENT, &locale).await?;

            for seed in self.seeds {
                let Some(label) = seed.entry.label(&locale) else {
                    continue;
                };
                let category = categories.require(seed.category, "category")?;
                let primary = muscles.require_all(seed.primary_muscles, "primary muscle")?;
                let secondary = muscles.require_all(seed.secondary_muscles, "secondary muscle")?;
                let gear = equipment.require_all(seed.equipment, "equipment")?;

                rows.push(
                    SeedRow::new(&seed.entry.slug(), &locale, label)
                        .with("category", category)
                        .with("primaryMuscles", Bson::Array(primary))
                        .with("secondaryMuscles", Bson::Array(secondary))
                        .with("equipment", Bson::Array(gear)),
                );
            }
        }

        write_seed_rows(ctx, EXERCISES, rows, &owner).await?;
        Ok(())
    }
}
