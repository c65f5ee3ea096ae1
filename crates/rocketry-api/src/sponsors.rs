use axum::{Json, extract::State};
use tracing::info;

use rocketry_db::Database;
use rocketry_types::api::SponsorTierResponse;
use rocketry_types::models::{NewSponsorTier, SponsorTier};

use crate::auth::AppState;
use crate::error::ApiError;

/// Tiers in display order.
pub fn list_sponsor_tiers(db: &Database) -> anyhow::Result<Vec<SponsorTier>> {
    Ok(db.list_sponsor_tiers()?.into_iter().map(SponsorTier::from).collect())
}

/// Swap the whole tier set atomically. Readers see either the old set or the
/// new one.
pub fn replace_sponsor_tiers(db: &Database, tiers: &[NewSponsorTier]) -> anyhow::Result<usize> {
    if let Some(bad) = tiers.iter().find(|t| t.name.trim().is_empty() || t.price_gbp < 0) {
        anyhow::bail!("invalid sponsor tier {:?}: name must be non-empty and price non-negative", bad.name);
    }

    let count = db.replace_sponsor_tiers(tiers)?;
    info!("Sponsor tiers replaced ({} tiers)", count);
    Ok(count)
}

/// GET /api/sponsors
pub async fn get_sponsor_tiers(
    State(state): State<AppState>,
) -> Result<Json<Vec<SponsorTierResponse>>, ApiError> {
    let tiers = crate::blocking(move || Ok(list_sponsor_tiers(&state.db)?)).await?;
    Ok(Json(tiers.into_iter().map(SponsorTierResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tier(name: &str, price_gbp: i64, order: i64) -> NewSponsorTier {
        NewSponsorTier {
            name: name.into(),
            price_gbp,
            perks: json!({ "logo": "small" }),
            order,
        }
    }

    #[test]
    fn replace_then_list_follows_display_order() {
        let db = Database::open_in_memory().unwrap();
        replace_sponsor_tiers(&db, &[tier("Gold", 2000, 3), tier("Bronze", 250, 1)]).unwrap();

        let tiers = list_sponsor_tiers(&db).unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].name, "Bronze");
        assert_eq!(tiers[0].perks, json!({ "logo": "small" }));
        assert_eq!(tiers[1].order, 3);
    }

    #[test]
    fn replace_with_empty_set_clears_tiers() {
        let db = Database::open_in_memory().unwrap();
        replace_sponsor_tiers(&db, &[tier("Bronze", 250, 1)]).unwrap();
        assert_eq!(replace_sponsor_tiers(&db, &[]).unwrap(), 0);
        assert!(list_sponsor_tiers(&db).unwrap().is_empty());
    }

    #[test]
    fn invalid_tier_leaves_previous_set() {
        let db = Database::open_in_memory().unwrap();
        replace_sponsor_tiers(&db, &[tier("Bronze", 250, 1)]).unwrap();

        assert!(replace_sponsor_tiers(&db, &[tier("Silver", 500, 1), tier(" ", 10, 2)]).is_err());
        assert!(replace_sponsor_tiers(&db, &[tier("Silver", 500, 1), tier("Silver", 900, 2)]).is_err());

        let names: Vec<String> = list_sponsor_tiers(&db).unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Bronze"]);
    }
}
