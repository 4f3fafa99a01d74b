//! The migrations shipped with the platform.
//!
//! Ids are zero-padded so lexicographic order is application order. Seed migrations read what
//! earlier ones wrote: categories, muscles and equipment feed exercises, exercises feed
//! sessions, and every seed is owned by the admin created first.
//!
//! Never rename or remove an entry of [registry] once it has shipped; add a corrective migration
//! with a later id instead.

mod m0001_create_admin;
mod m0002_seed_exercise_categories;
mod m0003_seed_muscles;
mod m0004_seed_equipment;
mod m0005_seed_exercises;
mod m0006_seed_sessions;
mod m0007_create_tag_indexes;
mod m0008_assign_admin_ownership;

pub use m0001_create_admin::CreateAdmin;
pub use m0002_seed_exercise_categories::{SeedExerciseCategories, CATEGORIES};
pub use m0003_seed_muscles::{SeedMuscles, MUSCLES_SEED};
pub use m0004_seed_equipment::{SeedEquipment, EQUIPMENT_SEED};
pub use m0005_seed_exercises::{ExerciseSeed, SeedExercises, EXERCISES_SEED};
pub use m0006_seed_sessions::{BlockSeed, RepUnit, SeedSessions, SessionSeed, SESSIONS_SEED};
pub use m0007_create_tag_indexes::CreateTagIndexes;
pub use m0008_assign_admin_ownership::AssignAdminOwnership;

use crate::core::Migration;

pub const EXERCISE_CATEGORIES: &str = "exercise_categories";
pub const MUSCLES: &str = "muscles";
pub const EQUIPMENT: &str = "equipment";
pub const EXERCISES: &str = "exercises";
pub const SESSIONS: &str = "sessions";
pub const TAGS: &str = "tags";

/// Every migration shipped in this build.
pub fn registry() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateAdmin),
        Box::new(SeedExerciseCategories::default()),
        Box::new(SeedMuscles::default()),
        Box::new(SeedEquipment::default()),
        Box::new(SeedExercises::default()),
        Box::new(SeedSessions::default()),
        Box::new(CreateTagIndexes),
        Box::new(AssignAdminOwnership),
    ]
}
