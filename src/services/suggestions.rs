use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use super::ServiceContext;
use crate::error::Result;

const MIN_QUERY_CHARS: usize = 2;
const BUSINESS_LIMIT: i64 = 8;
const CATEGORY_LIMIT: i64 = 5;
const LOCATION_SCAN_LIMIT: i64 = 150;
const LOCATION_LIMIT: usize = 10;

/// Search-box entry, tagged by what it points at.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Suggestion {
    Category {
        id: i32,
        name: String,
        slug: String,
        icon: Option<String>,
    },
    Business {
        id: Uuid,
        name: String,
        slug: String,
        city: String,
        state: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LocationSuggestion {
    pub city: String,
    pub state: String,
    pub label: String,
}

#[derive(Clone)]
pub struct SuggestionService {
    ctx: ServiceContext,
}

impl SuggestionService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Matching categories first, then matching active businesses.
    pub async fn search_suggestions(&self, raw: &str) -> Result<Vec<Suggestion>> {
        let Some(query) = usable_query(raw) else {
            return Ok(Vec::new());
        };

        let categories = self
            .ctx
            .store
            .category_name_matches(query, CATEGORY_LIMIT)
            .await?;
        let businesses = self
            .ctx
            .store
            .business_name_matches(query, BUSINESS_LIMIT)
            .await?;

        let suggestions = categories
            .into_iter()
            .map(|c| Suggestion::Category {
                id: c.id,
                name: c.name,
                slug: c.slug,
                icon: c.icon,
            })
            .chain(businesses.into_iter().map(|b| Suggestion::Business {
                id: b.id,
                name: b.name,
                slug: b.slug,
                city: b.city,
                state: b.state,
            }))
            .collect();
        Ok(suggestions)
    }

    pub async fn location_suggestions(&self, raw: &str) -> Result<Vec<LocationSuggestion>> {
        let Some(query) = usable_query(raw) else {
            return Ok(Vec::new());
        };
        let rows = self
            .ctx
            .store
            .location_matches(query, LOCATION_SCAN_LIMIT)
            .await?;
        Ok(rank_locations(rows, query))
    }
}

fn usable_query(raw: &str) -> Option<&str> {
    let query = raw.trim();
    (query.chars().count() >= MIN_QUERY_CHARS).then_some(query)
}

/// Unique "City, State" pairs (case-insensitive), cities starting with the
/// query first, then alphabetical. Rows missing either half are dropped.
pub fn rank_locations(rows: Vec<(String, String)>, query: &str) -> Vec<LocationSuggestion> {
    let needle = query.trim().to_lowercase();
    let mut seen = HashSet::new();
    let mut locations: Vec<LocationSuggestion> = rows
        .into_iter()
        .filter_map(|(city, state)| {
            let city = city.trim().to_string();
            let state = state.trim().to_string();
            if city.is_empty() || state.is_empty() {
                return None;
            }
            let label = format!("{city}, {state}");
            seen.insert(label.to_lowercase())
                .then_some(LocationSuggestion { city, state, label })
        })
        .collect();

    locations.sort_by(|a, b| {
        let a_prefix = a.city.to_lowercase().starts_with(&needle);
        let b_prefix = b.city.to_lowercase().starts_with(&needle);
        b_prefix
            .cmp(&a_prefix)
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
            .then_with(|| a.label.cmp(&b.label))
    });
    locations.truncate(LOCATION_LIMIT);
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::tests::listing;
    use crate::services::testing::Fixture;

    fn row(city: &str, state: &str) -> (String, String) {
        (city.to_string(), state.to_string())
    }

    #[test]
    fn prefix_matches_rank_first_then_alphabetical() {
        let ranked = rank_locations(
            vec![
                row("West Springfield", "MA"),
                row("Springfield", "MO"),
                row("Springfield", "IL"),
                row("East Springfield", "PA"),
            ],
            "spring",
        );
        let labels: Vec<_> = ranked.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Springfield, IL",
                "Springfield, MO",
                "East Springfield, PA",
                "West Springfield, MA"
            ]
        );
    }

    #[test]
    fn duplicates_collapse_case_insensitively() {
        let ranked = rank_locations(
            vec![
                row("Austin", "TX"),
                row("austin", "tx"),
                row(" Austin ", "TX"),
                row("", "TX"),
            ],
            "au",
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].label, "Austin, TX");
    }

    #[test]
    fn rows_missing_city_or_state_are_skipped() {
        let ranked = rank_locations(
            vec![row("Boise", ""), row("", "ID"), row("Boise", " "), row("Boise", "ID")],
            "bo",
        );
        let labels: Vec<_> = ranked.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["Boise, ID"]);
    }

    #[test]
    fn at_most_ten_locations() {
        let rows = (0..30).map(|i| row(&format!("Town {i:02}"), "OH")).collect();
        let ranked = rank_locations(rows, "town");
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].label, "Town 00, OH");
    }

    #[actix_rt::test]
    async fn short_queries_return_nothing() {
        let fx = Fixture::new();
        fx.store.seed_business(listing("Pizza Palace", 4.0, true));

        let suggestions = fx.services.suggestions.search_suggestions(" p ").await.unwrap();
        assert!(suggestions.is_empty());
        let locations = fx.services.suggestions.location_suggestions("s").await.unwrap();
        assert!(locations.is_empty());
    }

    #[actix_rt::test]
    async fn categories_come_before_businesses() {
        let fx = Fixture::new();
        fx.store.seed_category("Pizza");
        fx.store.seed_business(listing("Pizza Palace", 4.0, true));
        fx.store.seed_business(listing("Pizza Pending", 0.0, false));

        let suggestions = fx.services.suggestions.search_suggestions("piz").await.unwrap();
        assert_eq!(suggestions.len(), 2);
        assert!(matches!(&suggestions[0], Suggestion::Category { name, .. } if name == "Pizza"));
        assert!(
            matches!(&suggestions[1], Suggestion::Business { name, .. } if name == "Pizza Palace")
        );

        let json = serde_json::to_value(&suggestions[0]).unwrap();
        assert_eq!(json["type"], "category");
    }

    #[actix_rt::test]
    async fn business_matches_are_capped() {
        let fx = Fixture::new();
        for i in 0..12 {
            fx.store.seed_business(listing(&format!("Taco Stand {i}"), 4.0, true));
        }
        let suggestions = fx.services.suggestions.search_suggestions("taco").await.unwrap();
        assert_eq!(suggestions.len(), 8);
    }

    #[actix_rt::test]
    async fn locations_come_from_active_listings() {
        let fx = Fixture::new();
        fx.store.seed_business(listing("One", 4.0, true));
        fx.store.seed_business(listing("Two", 4.0, true));
        let mut hidden = listing("Three", 4.0, false);
        hidden.city = "Springdale".into();
        fx.store.seed_business(hidden);

        let locations = fx.services.suggestions.location_suggestions("spr").await.unwrap();
        assert_eq!(
            locations,
            vec![LocationSuggestion {
                city: "Springfield".into(),
                state: "IL".into(),
                label: "Springfield, IL".into(),
            }]
        );
    }
}
