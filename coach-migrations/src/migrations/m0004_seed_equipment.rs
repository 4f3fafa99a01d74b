use async_trait::async_trait;

use super::EQUIPMENT;
use crate::core::{Migration, MigrationContext, Requirement};
use crate::error::Error;
use crate::seed::{seed_reference_collection, ReferenceSeed};

pub const EQUIPMENT_SEED: &[ReferenceSeed] = &[
    ReferenceSeed::new("Poids du corps", &[("fr", "Poids du corps"), ("en", "Bodyweight")]),
    ReferenceSeed::new("Haltères", &[("fr", "Haltères"), ("en", "Dumbbells")]),
    ReferenceSeed::new("Barre", &[("fr", "Barre"), ("en", "Barbell")]),
    ReferenceSeed::new("Kettlebell", &[("fr", "Kettlebell"), ("en", "Kettlebell")]),
    ReferenceSeed::new("Élastiques", &[("fr", "Élastiques"), ("en", "Resistance bands")]),
    ReferenceSeed::new("Banc", &[("fr", "Banc"), ("en", "Bench")]),
    ReferenceSeed::new("Barre de traction", &[("fr", "Barre de traction"), ("en", "Pull-up bar")]),
    ReferenceSeed::new("Tapis", &[("fr", "Tapis"), ("en", "Mat")]),
];

/// Seeds the equipment exercises may need.
#[derive(Debug, Clone, Copy)]
pub struct SeedEquipment {
    seeds: &'static [ReferenceSeed],
}

impl SeedEquipment {
    pub fn with_seeds(seeds: &'static [ReferenceSeed]) -> Self {
        Self { seeds }
    }
}

impl Default for SeedEquipment {
    fn default() -> Self {
        Self::with_seeds(EQUIPMENT_SEED)
    }
}

#[async_trait]
impl Migration for SeedEquipment {
    fn id(&self) -> &str {
        "0004_seed_equipment"
    }

    fn description(&self) -> Option<&str> {
        Some("Seed training equipment")
    }

    fn requires(&self) -> &'static [Requirement] {
        &[Requirement::Owner]
    }

    async fn apply(&self, ctx: &MigrationContext<'_>) -> Result<(), Error> {
        seed_reference_collection(ctx, EQUIPMENT, self.seeds).await?;
        Ok(())
    }
}
