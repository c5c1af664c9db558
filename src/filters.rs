//! Listing filter pipeline.
//!
//! Raw query-string pairs become [`ListingParams`], which are validated into
//! typed [`ListingFacets`]. Facets plus a [`Visibility`] compile to a
//! [`ListingQuery`]: one predicate tree and one ordering. The same tree renders
//! to parameterised SQL for Postgres and evaluates against in-memory records.

use std::cmp::Ordering;

use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::BUSINESS_COLUMNS;
use crate::error::{DirectoryError, Result};
use crate::models::Business;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_NUMBER: i64 = 100_000;

// ============================================================================
// RAW PARAMETERS
// ============================================================================

/// Query-string values as received. Repeated keys (`city=a&city=b`) and
/// bracketed keys (`category[]=1`) both accumulate.
#[derive(Debug, Clone, Default)]
pub struct ListingParams {
    pub search: Option<String>,
    pub categories: Vec<String>,
    pub cities: Vec<String>,
    pub state: Option<String>,
    pub ratings: Vec<String>,
    pub min_rating: Option<String>,
    pub featured: Option<String>,
    pub public_only: bool,
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListingParams {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut params = Self::default();
        for (key, value) in pairs {
            let key = key.trim_end_matches("[]");
            match key {
                "search" | "q" => params.search = Some(value),
                "category" | "categories" => params.categories.extend(split_list(&value)),
                "city" | "cities" => params.cities.push(value),
                "state" => params.state = Some(value),
                "ratings" | "rating" => params.ratings.extend(split_list(&value)),
                "minRating" | "min_rating" => params.min_rating = Some(value),
                "featured" => params.featured = Some(value),
                "publicOnly" | "public_only" => {
                    params.public_only = matches!(value.trim(), "true" | "1")
                }
                "sort" => params.sort = Some(value),
                "page" => params.page = Some(value),
                "limit" | "pageSize" | "page_size" => params.limit = Some(value),
                _ => {}
            }
        }
        params
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(|part| part.to_string())
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// FACETS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RatingFilter {
    /// Bucket `k < 5` covers `[k, k + 1)`; bucket 5 covers `>= 5`.
    Buckets(Vec<u8>),
    AtLeast(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Relevance,
    Rating,
    Name,
    Views,
    Newest,
    Oldest,
}

impl SortKey {
    /// Unknown keys fall back to relevance.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("rating") => Self::Rating,
            Some("name") => Self::Name,
            Some("views") => Self::Views,
            Some("newest") => Self::Newest,
            Some("oldest") => Self::Oldest,
            _ => Self::Relevance,
        }
    }

    /// ORDER BY body. Always ends with `id` so pages never overlap.
    pub fn order_sql(self) -> &'static str {
        match self {
            Self::Relevance | Self::Rating => {
                "is_featured DESC, rating_average DESC, rating_count DESC, created_at DESC, id ASC"
            }
            Self::Name => "name ASC, id ASC",
            Self::Views => "views DESC, id ASC",
            Self::Newest => "created_at DESC, id ASC",
            Self::Oldest => "created_at ASC, id ASC",
        }
    }

    pub fn compare(self, a: &Business, b: &Business) -> Ordering {
        let primary = match self {
            Self::Relevance | Self::Rating => b
                .is_featured
                .cmp(&a.is_featured)
                .then_with(|| b.rating_average.total_cmp(&a.rating_average))
                .then_with(|| b.rating_count.cmp(&a.rating_count))
                .then_with(|| b.created_at.cmp(&a.created_at)),
            Self::Name => a.name.cmp(&b.name),
            Self::Views => b.views.cmp(&a.views),
            Self::Newest => b.created_at.cmp(&a.created_at),
            Self::Oldest => a.created_at.cmp(&b.created_at),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// Validated facet selections. Every field is optional; an empty value
/// contributes no predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFacets {
    pub search: Option<String>,
    pub categories: Vec<i32>,
    pub cities: Vec<String>,
    pub state: Option<String>,
    pub rating: Option<RatingFilter>,
    pub featured_only: bool,
    pub sort: SortKey,
}

impl ListingFacets {
    pub fn parse(params: &ListingParams) -> Result<Self> {
        let categories = params
            .categories
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| {
                c.parse::<i32>()
                    .map_err(|_| DirectoryError::Validation(format!("Invalid category id '{c}'")))
            })
            .collect::<Result<Vec<_>>>()?;

        let cities = params
            .cities
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();

        let buckets = params
            .ratings
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(|r| match r.parse::<u8>() {
                Ok(k) if (1..=5).contains(&k) => Ok(k),
                _ => Err(DirectoryError::Validation(format!(
                    "Invalid rating bucket '{r}', expected 1-5"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let rating = if !buckets.is_empty() {
            Some(RatingFilter::Buckets(buckets))
        } else if let Some(raw) = present(&params.min_rating) {
            match raw.parse::<f64>() {
                Ok(min) if (0.0..=5.0).contains(&min) => Some(RatingFilter::AtLeast(min)),
                _ => {
                    return Err(DirectoryError::Validation(format!(
                        "Invalid minimum rating '{raw}'"
                    )))
                }
            }
        } else {
            None
        };

        Ok(Self {
            search: present(&params.search).map(str::to_string),
            categories,
            cities,
            state: present(&params.state).map(str::to_string),
            rating,
            featured_only: present(&params.featured) == Some("true"),
            sort: SortKey::parse(present(&params.sort)),
        })
    }
}

// ============================================================================
// PAGINATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Page {
    pub fn new(number: Option<i64>, size: Option<i64>, default_size: i64) -> Self {
        Self {
            number: number.filter(|n| *n > 0).unwrap_or(1).min(MAX_PAGE_NUMBER),
            size: size
                .filter(|s| *s > 0)
                .unwrap_or(default_size)
                .min(MAX_PAGE_SIZE),
        }
    }

    /// Unparseable values fall back to the defaults.
    pub fn from_params(params: &ListingParams, default_size: i64) -> Self {
        let number = present(&params.page).and_then(|p| p.parse().ok());
        let size = present(&params.limit).and_then(|s| s.parse().ok());
        Self::new(number, size, default_size)
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1).saturating_mul(self.size)
    }

    pub fn page_count(&self, total: i64) -> i64 {
        if total <= 0 {
            0
        } else {
            (total + self.size - 1) / self.size
        }
    }
}

// ============================================================================
// PREDICATES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColumn {
    Name,
    Description,
    City,
}

impl TextColumn {
    fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::City => "city",
        }
    }

    fn value(self, business: &Business) -> &str {
        match self {
            Self::Name => &business.name,
            Self::Description => &business.description,
            Self::City => &business.city,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Conjunction; empty is `TRUE`.
    All(Vec<Predicate>),
    /// Disjunction; empty is `FALSE`.
    Any(Vec<Predicate>),
    /// Case-insensitive substring match.
    Contains(TextColumn, String),
    CategoryIn(Vec<i32>),
    StateEquals(String),
    RatingAtLeast(f64),
    /// `[min, max)`
    RatingBetween(f64, f64),
    Featured,
    Active,
    OwnedBy(Uuid),
}

impl Predicate {
    pub fn push_sql(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            Self::All(parts) => push_joined(qb, parts, " AND ", "TRUE"),
            Self::Any(parts) => push_joined(qb, parts, " OR ", "FALSE"),
            Self::Contains(column, needle) => {
                qb.push(column.column()).push(" ILIKE ");
                qb.push_bind(format!("%{}%", escape_like(needle)));
            }
            Self::CategoryIn(ids) => {
                qb.push("category_id = ANY(");
                qb.push_bind(ids.clone());
                qb.push(")");
            }
            Self::StateEquals(state) => {
                qb.push("state = ");
                qb.push_bind(state.clone());
            }
            Self::RatingAtLeast(min) => {
                qb.push("rating_average >= ");
                qb.push_bind(*min);
            }
            Self::RatingBetween(min, max) => {
                qb.push("(rating_average >= ");
                qb.push_bind(*min);
                qb.push(" AND rating_average < ");
                qb.push_bind(*max);
                qb.push(")");
            }
            Self::Featured => {
                qb.push("is_featured = TRUE");
            }
            Self::Active => {
                qb.push("is_active = TRUE");
            }
            Self::OwnedBy(owner) => {
                qb.push("owner_id = ");
                qb.push_bind(*owner);
            }
        }
    }

    pub fn matches(&self, business: &Business) -> bool {
        match self {
            Self::All(parts) => parts.iter().all(|p| p.matches(business)),
            Self::Any(parts) => parts.iter().any(|p| p.matches(business)),
            Self::Contains(column, needle) => column
                .value(business)
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Self::CategoryIn(ids) => ids.contains(&business.category_id),
            Self::StateEquals(state) => business.state == *state,
            Self::RatingAtLeast(min) => business.rating_average >= *min,
            Self::RatingBetween(min, max) => {
                business.rating_average >= *min && business.rating_average < *max
            }
            Self::Featured => business.is_featured,
            Self::Active => business.is_active,
            Self::OwnedBy(owner) => business.owner_id == Some(*owner),
        }
    }
}

fn push_joined(
    qb: &mut QueryBuilder<'_, Postgres>,
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) {
    if parts.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            qb.push(separator);
        }
        part.push_sql(qb);
    }
    qb.push(")");
}

/// Escapes `LIKE` metacharacters so user text only ever matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// ============================================================================
// QUERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Active listings only.
    Public,
    /// The caller's own listings in any status, plus every active listing.
    OwnerAware(Uuid),
    /// Every listing; admin moderation views only.
    Unrestricted,
}

impl Visibility {
    fn predicate(self) -> Option<Predicate> {
        match self {
            Self::Public => Some(Predicate::Active),
            Self::OwnerAware(owner) => Some(Predicate::Any(vec![
                Predicate::OwnedBy(owner),
                Predicate::Active,
            ])),
            Self::Unrestricted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub predicate: Predicate,
    pub sort: SortKey,
}

impl ListingQuery {
    pub fn build(facets: &ListingFacets, visibility: Visibility) -> Self {
        let mut parts: Vec<Predicate> = visibility.predicate().into_iter().collect();

        if let Some(search) = &facets.search {
            parts.push(Predicate::Any(vec![
                Predicate::Contains(TextColumn::Name, search.clone()),
                Predicate::Contains(TextColumn::Description, search.clone()),
            ]));
        }
        if !facets.categories.is_empty() {
            parts.push(Predicate::CategoryIn(facets.categories.clone()));
        }
        if !facets.cities.is_empty() {
            parts.push(Predicate::Any(
                facets
                    .cities
                    .iter()
                    .map(|city| Predicate::Contains(TextColumn::City, city.clone()))
                    .collect(),
            ));
        }
        if let Some(state) = &facets.state {
            parts.push(Predicate::StateEquals(state.clone()));
        }
        match &facets.rating {
            Some(RatingFilter::Buckets(buckets)) => {
                parts.push(Predicate::Any(
                    buckets.iter().map(|k| bucket_predicate(*k)).collect(),
                ));
            }
            Some(RatingFilter::AtLeast(min)) => parts.push(Predicate::RatingAtLeast(*min)),
            None => {}
        }
        if facets.featured_only {
            parts.push(Predicate::Featured);
        }

        Self {
            predicate: Predicate::All(parts),
            sort: facets.sort,
        }
    }

    pub fn select_page(&self, page: Page) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE "));
        self.predicate.push_sql(&mut qb);
        qb.push(" ORDER BY ").push(self.sort.order_sql());
        qb.push(" LIMIT ").push_bind(page.size);
        qb.push(" OFFSET ").push_bind(page.offset());
        qb
    }

    pub fn count(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM businesses WHERE ");
        self.predicate.push_sql(&mut qb);
        qb
    }
}

fn bucket_predicate(k: u8) -> Predicate {
    let lower = f64::from(k);
    if k >= 5 {
        Predicate::RatingAtLeast(lower)
    } else {
        Predicate::RatingBetween(lower, lower + 1.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    pub(crate) fn listing(name: &str, rating: f64, active: bool) -> Business {
        let now = Utc::now();
        Business {
            id: Uuid::new_v4(),
            slug: format!("{}-1", name.to_lowercase().replace(' ', "-")),
            name: name.to_string(),
            description: format!("{name} serving the neighbourhood"),
            category_id: 1,
            address: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: None,
            country: "USA".into(),
            phone: "555-0100".into(),
            email: None,
            website: None,
            hours: None,
            social_links: None,
            rating_average: rating,
            rating_count: 10,
            views: 0,
            is_featured: false,
            owner_id: None,
            is_active: active,
            is_verified: active,
            claimed_at: None,
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            resubmitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn pairs(raw: &[(&str, &str)]) -> ListingParams {
        ListingParams::from_pairs(raw.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn facets(raw: &[(&str, &str)]) -> ListingFacets {
        ListingFacets::parse(&pairs(raw)).expect("valid facets")
    }

    #[test]
    fn repeated_and_bracketed_keys_accumulate() {
        let params = pairs(&[
            ("category[]", "1"),
            ("category", "2,3"),
            ("city", "Springfield"),
            ("city", "Shelbyville"),
            ("q", "pizza"),
        ]);
        assert_eq!(params.categories, vec!["1", "2", "3"]);
        assert_eq!(params.cities.len(), 2);
        assert_eq!(params.search.as_deref(), Some("pizza"));
    }

    #[test]
    fn empty_values_contribute_nothing() {
        let parsed = facets(&[("search", "  "), ("state", ""), ("category", ""), ("ratings", "")]);
        assert_eq!(parsed, ListingFacets::default());

        let query = ListingQuery::build(&parsed, Visibility::Public);
        assert_eq!(query.predicate, Predicate::All(vec![Predicate::Active]));
    }

    #[test]
    fn non_numeric_inputs_are_validation_errors() {
        let err = ListingFacets::parse(&pairs(&[("category", "food")])).unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));

        let err = ListingFacets::parse(&pairs(&[("ratings", "six")])).unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));

        let err = ListingFacets::parse(&pairs(&[("ratings", "0")])).unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));

        let err = ListingFacets::parse(&pairs(&[("minRating", "high")])).unwrap_err();
        assert!(matches!(err, DirectoryError::Validation(_)));
    }

    #[test]
    fn buckets_take_precedence_over_min_rating() {
        let parsed = facets(&[("ratings", "4"), ("minRating", "2")]);
        assert_eq!(parsed.rating, Some(RatingFilter::Buckets(vec![4])));

        let parsed = facets(&[("minRating", "3.5")]);
        assert_eq!(parsed.rating, Some(RatingFilter::AtLeast(3.5)));
    }

    #[test]
    fn rating_buckets_are_half_open() {
        let four = ListingQuery::build(&facets(&[("ratings", "4")]), Visibility::Public);
        let five = ListingQuery::build(&facets(&[("ratings", "5")]), Visibility::Public);

        assert!(four.predicate.matches(&listing("A", 4.2, true)));
        assert!(four.predicate.matches(&listing("B", 4.0, true)));
        assert!(!four.predicate.matches(&listing("C", 5.0, true)));
        assert!(!five.predicate.matches(&listing("A", 4.2, true)));
        assert!(five.predicate.matches(&listing("D", 5.0, true)));

        let both = ListingQuery::build(&facets(&[("ratings", "2,4")]), Visibility::Public);
        assert!(both.predicate.matches(&listing("E", 2.5, true)));
        assert!(!both.predicate.matches(&listing("F", 3.5, true)));
    }

    #[test]
    fn owner_aware_visibility_keeps_other_facets() {
        let owner = Uuid::new_v4();
        let mut own_pending = listing("Owner Bakery", 0.0, false);
        own_pending.owner_id = Some(owner);
        let foreign_pending = listing("Other Bakery", 0.0, false);
        let public_cafe = listing("Public Cafe", 4.0, true);

        let query = ListingQuery::build(&facets(&[("search", "bakery")]), Visibility::OwnerAware(owner));
        assert!(query.predicate.matches(&own_pending));
        assert!(!query.predicate.matches(&foreign_pending));
        // search still narrows: active but not matching
        assert!(!query.predicate.matches(&public_cafe));

        let public = ListingQuery::build(&facets(&[("search", "bakery")]), Visibility::Public);
        assert!(!public.predicate.matches(&own_pending));
    }

    #[test]
    fn cities_match_substrings_with_or() {
        let query = ListingQuery::build(
            &facets(&[("city", "spring"), ("city", "shelby")]),
            Visibility::Unrestricted,
        );
        let mut shelbyville = listing("Moe's", 3.0, true);
        shelbyville.city = "Shelbyville".into();
        let mut capital = listing("Capitol Diner", 3.0, true);
        capital.city = "Capital City".into();

        assert!(query.predicate.matches(&listing("Krusty", 3.0, true)));
        assert!(query.predicate.matches(&shelbyville));
        assert!(!query.predicate.matches(&capital));
    }

    #[test]
    fn state_is_an_exact_match() {
        let query = ListingQuery::build(&facets(&[("state", "IL")]), Visibility::Public);
        let mut lower = listing("A", 3.0, true);
        lower.state = "il".into();
        assert!(query.predicate.matches(&listing("B", 3.0, true)));
        assert!(!query.predicate.matches(&lower));
    }

    #[test]
    fn renders_parameterised_sql() {
        let owner = Uuid::new_v4();
        let query = ListingQuery::build(
            &facets(&[
                ("search", "50%_off"),
                ("category", "1,2"),
                ("ratings", "4"),
                ("featured", "true"),
                ("sort", "views"),
            ]),
            Visibility::OwnerAware(owner),
        );
        let qb = query.select_page(Page::new(Some(2), Some(10), DEFAULT_PAGE_SIZE));
        let sql = qb.sql();

        assert!(sql.starts_with("SELECT id, slug, name"));
        assert!(sql.contains("((owner_id = $1 OR is_active = TRUE) AND (name ILIKE $2 OR description ILIKE $3)"));
        assert!(sql.contains("category_id = ANY($4)"));
        assert!(sql.contains("((rating_average >= $5 AND rating_average < $6))"));
        assert!(sql.contains("is_featured = TRUE"));
        assert!(sql.ends_with("ORDER BY views DESC, id ASC LIMIT $7 OFFSET $8"));

        let count = query.count();
        assert!(count.sql().starts_with("SELECT COUNT(*) FROM businesses WHERE ("));
        assert!(!count.sql().contains("ORDER BY"));
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn unknown_sort_falls_back_to_relevance() {
        assert_eq!(SortKey::parse(Some("random")), SortKey::Relevance);
        assert_eq!(SortKey::parse(None), SortKey::Relevance);
        assert_eq!(SortKey::parse(Some("oldest")), SortKey::Oldest);
        for key in [
            SortKey::Relevance,
            SortKey::Rating,
            SortKey::Name,
            SortKey::Views,
            SortKey::Newest,
            SortKey::Oldest,
        ] {
            assert!(key.order_sql().ends_with("id ASC"));
        }
    }

    #[test]
    fn relevance_ordering_prefers_featured_then_rating() {
        let mut featured = listing("Featured", 3.0, true);
        featured.is_featured = true;
        let top = listing("Top", 4.9, true);
        let mut older = listing("Older", 4.9, true);
        older.created_at = top.created_at - Duration::days(1);

        let mut items = vec![older.clone(), top.clone(), featured.clone()];
        items.sort_by(|a, b| SortKey::Relevance.compare(a, b));
        let names: Vec<_> = items.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Featured", "Top", "Older"]);
    }

    #[test]
    fn page_size_is_bounded() {
        assert_eq!(Page::new(None, None, DEFAULT_PAGE_SIZE), Page { number: 1, size: 10 });
        assert_eq!(Page::new(Some(0), Some(1000), DEFAULT_PAGE_SIZE).size, MAX_PAGE_SIZE);
        assert_eq!(Page::new(Some(3), Some(20), DEFAULT_PAGE_SIZE).offset(), 40);

        let page = Page::from_params(&pairs(&[("page", "abc"), ("limit", "-5")]), 20);
        assert_eq!(page, Page { number: 1, size: 20 });

        let page = Page::new(None, Some(10), DEFAULT_PAGE_SIZE);
        assert_eq!(page.page_count(0), 0);
        assert_eq!(page.page_count(10), 1);
        assert_eq!(page.page_count(11), 2);
    }

    #[test]
    fn huge_page_numbers_are_clamped() {
        let page = Page::from_params(&pairs(&[("page", "9223372036854775807")]), 20);
        assert_eq!(page.number, MAX_PAGE_NUMBER);
        assert_eq!(page.offset(), (MAX_PAGE_NUMBER - 1) * 20);
        assert!(page.offset() > 0);
    }
}
