use std::fmt;

use async_trait::async_trait;
use bson::{doc, Bson};

use super::{EXERCISES, SESSIONS};
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::{
    ensure_natural_key_indexes, resolve_owner, write_seed_rows, ReferenceSeed, SeedRow,
    SlugLookup, SLUG_LOCALE,
};

/// What a block's `target` counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepUnit {
    Reps,
    Seconds,
}

impl fmt::Display for RepUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reps => write!(f, "reps"),
            Self::Seconds => write!(f, "seconds"),
        }
    }
}

/// One exercise of a session, by exercise slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSeed {
    pub exercise: &'static str,
    pub sets: i32,
    pub target: i32,
    pub unit: RepUnit,
    pub rest_seconds: i32,
}

impl BlockSeed {
    pub const fn reps(exercise: &'static str, sets: i32, reps: i32, rest_seconds: i32) -> Self {
        Self {
            exercise,
            sets,
            target: reps,
            unit: RepUnit::Reps,
            rest_seconds,
        }
    }

    pub const fn timed(exercise: &'static str, sets: i32, seconds: i32, rest_seconds: i32) -> Self {
        Self {
            exercise,
            sets,
            target: seconds,
            unit: RepUnit::Seconds,
            rest_seconds,
        }
    }
}

/// A template session: an ordered list of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSeed {
    pub entry: ReferenceSeed,
    pub level: &'static str,
    pub blocks: &'static [BlockSeed],
}

pub const SESSIONS_SEED: &[SessionSeed] = &[
    SessionSeed {
        entry: ReferenceSeed::new("Découverte poids du corps", &[("fr", "Découverte poids du corps"), ("en", "Bodyweight starter")]),
        level: "beginner",
        blocks: &[
            BlockSeed::reps("squat", 3, 12, 60),
            BlockSeed::reps("pompes", 3, 8, 60),
            BlockSeed::timed("gainage", 3, 30, 45),
        ],
    },
    SessionSeed {
        entry: ReferenceSeed::new("Force haut du corps", &[("fr", "Force haut du corps"), ("en", "Upper body strength")]),
        level: "intermediate",
        blocks: &[
            BlockSeed::reps("developpe-couche", 4, 8, 120),
            BlockSeed::reps("tractions", 4, 6, 120),
            BlockSeed::reps("curl-biceps", 3, 12, 60),
        ],
    },
    SessionSeed {
        entry: ReferenceSeed::new("Force bas du corps", &[("fr", "Force bas du corps"), ("en", "Lower body strength")]),
        level: "intermediate",
        blocks: &[
            BlockSeed::reps("squat", 4, 8, 120),
            BlockSeed::reps("souleve-de-terre", 4, 6, 150),
            BlockSeed::reps("fentes", 3, 10, 90),
        ],
    },
    SessionSeed {
        entry: ReferenceSeed::new("Circuit cardio", &[("fr", "Circuit cardio"), ("en", "Cardio circuit")]),
        level: "advanced",
        blocks: &[
            BlockSeed::timed("burpees", 4, 40, 20),
            BlockSeed::reps("kettlebell-swing", 4, 15, 30),
            BlockSeed::timed("gainage", 4, 45, 20),
        ],
    },
];

const REQUIRES: &[Requirement] = &[
    Requirement::Owner,
    Requirement::Slugs {
        collection: EXERCISES,
        role: "exercise",
    },
];

/// Seeds template sessions built from the seeded exercises.
#[derive(Debug, Clone, Copy)]
pub struct SeedSessions {
    seeds: &'static [SessionSeed],
}

impl SeedSessions {
    pub fn with_seeds(seeds: &'static [SessionSeed]) -> Self {
        Self { seeds }
    }
}

impl Default for SeedSessions {
    fn default() -> Self {
        Self::with_seeds(SESSIONS_SEED)
    }
}

#[async_trait]
impl Migration for SeedSessions {
    fn id(&self) -> &str {
        "0006_seed_sessions"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed template sessions made of exercise blocks")
    }

    fn requires(&self) -> &'static [Requirement] {
        REQUIRES
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        ensure_natural_key_indexes(ctx, SESSIONS, SLUG_LOCALE).await?;
        let owner = resolve_owner(ctx).await?;

        let mut rows = Vec::new();
        for locale in ctx.settings().locale_keys() {
            let exercises = SlugLookup::load(ctx, EXERCISES, &locale).await?;

            for seed in self.seeds {
                let Some(label) = seed.entry.label(&locale) else {
                    continue;
                };
                let mut blocks = Vec::with_capacity(seed.blocks.len());
                for (position, block) in seed.blocks.iter().enumerate() {
                    let exercise = exercises.require(block.exercise, "exercise")?;
                    blocks.push(Bson::Document(doc! {
                        "position": position as i32,
                        "exercise": exercise,
                        "sets": block.sets,
                        "target": block.target,
                        "unit": block.unit.to_string(),
                        "restSeconds": block.rest_seconds,
                    }));
                }

                rows.push(
                    SeedRow::new(&seed.entry.slug(), &locale, label)
                        .with("level", seed.level)
                        .with("blocks", Bson::Array(blocks)),
                );
            }
        }

        write_seed_rows(ctx, SESSIONS, rows, &owner).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;
    use crate::migrations::registry;
    use crate::testing::TestHarness;

    #[tokio::test]
    async fn blocks_keep_their_order_and_resolve_exercises() {
        let harness = TestHarness::new(registry());
        harness.run().await.unwrap();

        let session = harness
            .find_one(SESSIONS, doc! { "slug": "circuit-cardio", "locale": "fr" })
            .await
            .unwrap()
            .unwrap();
        let burpees = harness
            .find_one(EXERCISES, doc! { "slug": "burpees", "locale": "fr" })
            .await
            .unwrap()
            .unwrap();

        let blocks = session.get_array("blocks").unwrap();
        assert_eq!(blocks.len(), 3);
        let Bson::Document(first) = &blocks[0] else {
            panic!("block is not a document");
        };
        assert_eq!(first.get_i32("position").unwrap(), 0);
        assert_eq!(first.get("exercise"), burpees.get("_id"));
        assert_eq!(first.get_str("unit").unwrap(), "seconds");
        assert_eq!(session.get_str("level").unwrap(), "advanced");
    }

    #[tokio::test]
    async fn unknown_exercise_fails_fast() {
        const BROKEN: &[SessionSeed] = &[SessionSeed {
            entry: ReferenceSeed::new("Séance vide", &[("fr", "Séance vide")]),
            level: "beginner",
            blocks: &[BlockSeed::reps("pompes", 3, 10, 60)],
        }];
        let harness = TestHarness::new(vec![]);
        harness.apply(&crate::migrations::CreateAdmin).await.unwrap();

        let err = harness.apply(&SeedSessions::with_seeds(BROKEN)).await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "Missing exercise with slug 'pompes' in 'exercises' (locale fr)"
        );
        assert!(harness.documents(SESSIONS).await.is_empty());
    }
}
