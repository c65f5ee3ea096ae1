use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use rocketry_api::sponsors;
use rocketry_db::Database;
use rocketry_types::models::{NewCourse, NewSponsorTier};

/// Catalog seed file. Courses are upserted by slug; when `sponsor_tiers` is
/// present it replaces the whole tier set.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Seed {
    #[serde(default)]
    pub courses: Vec<NewCourse>,
    #[serde(default)]
    pub sponsor_tiers: Option<Vec<NewSponsorTier>>,
}

pub fn load(path: &Path) -> Result<Seed> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing seed file {}", path.display()))
}

pub fn apply(db: &Database, seed: &Seed) -> Result<()> {
    for course in &seed.courses {
        let row = db
            .upsert_course(course)
            .with_context(|| format!("seeding course {}", course.slug))?;
        info!("Seeded course {} ({})", row.slug, row.id);
    }

    if let Some(tiers) = &seed.sponsor_tiers {
        sponsors::replace_sponsor_tiers(db, tiers).context("seeding sponsor tiers")?;
    }

    Ok(())
}
