use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgConnection, PgPool, Row,
};
use uuid::Uuid;

use crate::clients::{ActivityEvent, ActivityLog};
use crate::error::{DirectoryError, Result};
use crate::filters::{escape_like, ListingQuery, Page};
use crate::models::{
    Actor, Business, BusinessStatus, Category, DirectoryStats, LifecycleChange, NewBusiness,
    NewCategory, NewUser, Review, User,
};
use crate::store::DirectoryStore;

pub(crate) const BUSINESS_COLUMNS: &str = "id, slug, name, description, category_id, address, \
    city, state, zip_code, country, phone, email, website, hours, social_links, rating_average, \
    rating_count, views, is_featured, owner_id, is_active, is_verified, claimed_at, approved_at, \
    rejected_at, rejection_reason, resubmitted_at, created_at, updated_at";

const CATEGORY_COLUMNS: &str =
    "id, name, slug, icon, description, display_order, is_active, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, password_hash, name, role, first_name, last_name, phone, \
    city, state, country, business_id, is_active, last_login, created_at, updated_at";

const REVIEW_COLUMNS: &str =
    "id, business_id, user_id, rating, title, comment, is_approved, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        let pool = match pool_options().connect(database_url).await {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;
                pool_options().connect(database_url).await?
            }
            Err(err) => return Err(err),
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Some(Duration::from_secs(600)))
        .test_before_acquire(true)
}

#[async_trait]
impl DirectoryStore for Database {
    // ========================================================================
    // CATEGORIES
    // ========================================================================

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE ($1 = FALSE OR is_active = TRUE) \
             ORDER BY display_order ASC, name ASC"
        );
        let records = sqlx::query_as::<_, Category>(&sql)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn get_category(&self, category_id: i32) -> Result<Option<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1");
        let record = sqlx::query_as::<_, Category>(&sql)
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn categories_by_ids(&self, ids: &[i32]) -> Result<Vec<Category>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ANY($1)");
        let records = sqlx::query_as::<_, Category>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category> {
        let NewCategory {
            name,
            slug,
            icon,
            description,
            display_order,
            is_active,
        } = category;

        let sql = format!(
            r#"
            INSERT INTO categories (name, slug, icon, description, display_order, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Category>(&sql)
            .bind(name)
            .bind(slug)
            .bind(icon)
            .bind(description)
            .bind(display_order)
            .bind(is_active)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let sql = format!(
            r#"
            UPDATE categories
            SET
                name = $2,
                slug = $3,
                icon = $4,
                description = $5,
                display_order = $6,
                is_active = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Category>(&sql)
            .bind(category.id)
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.icon)
            .bind(&category.description)
            .bind(category.display_order)
            .bind(category.is_active)
            .fetch_optional(&self.pool)
            .await?;

        record.ok_or_else(|| DirectoryError::not_found("Category"))
    }

    async fn delete_category(&self, category_id: i32) -> Result<()> {
        let in_use: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM businesses WHERE category_id = $1")
                .bind(category_id)
                .fetch_one(&self.pool)
                .await?;

        if in_use > 0 {
            return Err(category_in_use(in_use));
        }

        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(category_id)
            .execute(&self.pool)
            .await
            .map_err(|err| {
                // a listing was attached between the check and the delete
                let restricted = matches!(
                    &err,
                    sqlx::Error::Database(db_err) if db_err.code() == Some(Cow::Borrowed("23503"))
                );
                if restricted {
                    category_in_use(1)
                } else {
                    DirectoryError::from(err)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("Category"));
        }

        Ok(())
    }

    // ========================================================================
    // USERS
    // ========================================================================

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.email)
            .bind(user.name)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, User>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let records = sqlx::query_as::<_, User>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn update_user_profile(&self, user: User) -> Result<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET
                name = $2,
                first_name = $3,
                last_name = $4,
                phone = $5,
                city = $6,
                state = $7,
                country = $8,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(&user.city)
            .bind(&user.state)
            .bind(&user.country)
            .fetch_optional(&self.pool)
            .await?;

        record.ok_or_else(|| DirectoryError::not_found("User"))
    }

    // ========================================================================
    // LISTINGS
    // ========================================================================

    async fn search_businesses(
        &self,
        query: &ListingQuery,
        page: Page,
    ) -> Result<(Vec<Business>, i64)> {
        let total: i64 = query
            .count()
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        if total == 0 {
            return Ok((Vec::new(), 0));
        }

        let records = query
            .select_page(page)
            .build_query_as::<Business>()
            .fetch_all(&self.pool)
            .await?;

        Ok((records, total))
    }

    async fn get_business(&self, business_id: Uuid) -> Result<Option<Business>> {
        let sql = format!("SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = $1");
        let record = sqlx::query_as::<_, Business>(&sql)
            .bind(business_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn increment_views(&self, business_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE businesses SET views = views + 1 WHERE id = $1")
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn businesses_for_owner(&self, owner_id: Uuid) -> Result<Vec<Business>> {
        let sql = format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE owner_id = $1 \
             ORDER BY created_at DESC, id ASC"
        );
        let records = sqlx::query_as::<_, Business>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn distinct_active_cities(&self) -> Result<Vec<String>> {
        let cities = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT city
            FROM businesses
            WHERE is_active = TRUE AND btrim(city) <> ''
            ORDER BY city COLLATE "C" ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(cities)
    }

    async fn insert_business(&self, business: NewBusiness, creator: &Actor) -> Result<Business> {
        let NewBusiness {
            id,
            slug,
            name,
            description,
            category_id,
            address,
            city,
            state,
            zip_code,
            country,
            phone,
            email,
            website,
            hours,
            social_links,
            owner_id,
            created_at,
        } = business;

        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO businesses (
                id, slug, name, description, category_id, address, city, state,
                zip_code, country, phone, email, website, hours, social_links,
                owner_id, is_active, is_verified, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8,
                $9, $10, $11, $12, $13, $14, $15,
                $16, FALSE, FALSE, $17, $17
            )
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Business>(&sql)
            .bind(id)
            .bind(slug)
            .bind(name)
            .bind(description)
            .bind(category_id)
            .bind(address)
            .bind(city)
            .bind(state)
            .bind(zip_code)
            .bind(country)
            .bind(phone)
            .bind(email)
            .bind(website)
            .bind(hours)
            .bind(social_links)
            .bind(owner_id)
            .bind(created_at)
            .fetch_one(&mut *tx)
            .await?;

        promote_owner(&mut tx, creator.id, record.id).await?;

        tx.commit().await?;

        Ok(record)
    }

    async fn update_business(&self, business: Business) -> Result<Business> {
        let sql = format!(
            r#"
            UPDATE businesses
            SET
                name = $2,
                description = $3,
                category_id = $4,
                address = $5,
                city = $6,
                state = $7,
                zip_code = $8,
                country = $9,
                phone = $10,
                email = $11,
                website = $12,
                hours = $13,
                social_links = $14,
                is_featured = $15,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Business>(&sql)
            .bind(business.id)
            .bind(&business.name)
            .bind(&business.description)
            .bind(business.category_id)
            .bind(&business.address)
            .bind(&business.city)
            .bind(&business.state)
            .bind(&business.zip_code)
            .bind(&business.country)
            .bind(&business.phone)
            .bind(&business.email)
            .bind(&business.website)
            .bind(&business.hours)
            .bind(&business.social_links)
            .bind(business.is_featured)
            .fetch_optional(&self.pool)
            .await?;

        record.ok_or_else(|| DirectoryError::not_found("Business"))
    }

    async fn delete_business(&self, business_id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM businesses WHERE id = $1")
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("Business"));
        }

        Ok(())
    }

    async fn claim_business(
        &self,
        business_id: Uuid,
        claimer: &Actor,
        claimed_at: DateTime<Utc>,
    ) -> Result<Option<Business>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE businesses
            SET owner_id = $2, claimed_at = $3, is_active = FALSE,
                rejected_at = NULL, rejection_reason = NULL, updated_at = NOW()
            WHERE id = $1 AND owner_id IS NULL
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        let claimed = sqlx::query_as::<_, Business>(&sql)
            .bind(business_id)
            .bind(claimer.id)
            .bind(claimed_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(record) = claimed else {
            return Ok(None);
        };

        promote_owner(&mut tx, claimer.id, record.id).await?;

        tx.commit().await?;

        Ok(Some(record))
    }

    async fn transition_business(
        &self,
        business_id: Uuid,
        from: &[BusinessStatus],
        change: &LifecycleChange,
    ) -> Result<Option<Business>> {
        if from.is_empty() {
            return Ok(None);
        }

        let guard = from
            .iter()
            .map(|status| status.sql_condition())
            .collect::<Vec<_>>()
            .join(" OR ");

        let sql = format!(
            r#"
            UPDATE businesses
            SET
                is_active = $2,
                is_verified = COALESCE($3, is_verified),
                approved_at = CASE WHEN $4 THEN approved_at ELSE $5 END,
                rejected_at = $6,
                rejection_reason = $7,
                resubmitted_at = COALESCE($8, resubmitted_at),
                updated_at = NOW()
            WHERE id = $1 AND ({guard})
            RETURNING {BUSINESS_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Business>(&sql)
            .bind(business_id)
            .bind(change.is_active)
            .bind(change.is_verified)
            .bind(change.keep_approved_at)
            .bind(change.approved_at)
            .bind(change.rejected_at)
            .bind(&change.rejection_reason)
            .bind(change.resubmitted_at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    // ========================================================================
    // SUGGESTIONS
    // ========================================================================

    async fn business_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Business>> {
        let sql = format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses \
             WHERE is_active = TRUE AND name ILIKE $1 \
             ORDER BY name ASC, id ASC LIMIT $2"
        );
        let records = sqlx::query_as::<_, Business>(&sql)
            .bind(contains_pattern(fragment))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn category_name_matches(&self, fragment: &str, limit: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories \
             WHERE is_active = TRUE AND name ILIKE $1 \
             ORDER BY name ASC LIMIT $2"
        );
        let records = sqlx::query_as::<_, Category>(&sql)
            .bind(contains_pattern(fragment))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn location_matches(&self, fragment: &str, limit: i64) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT city, state
            FROM businesses
            WHERE is_active = TRUE AND (city ILIKE $1 OR state ILIKE $1)
            LIMIT $2
            "#,
        )
        .bind(contains_pattern(fragment))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ========================================================================
    // REVIEWS
    // ========================================================================

    async fn create_review(&self, review: Review) -> Result<Review> {
        let sql = format!(
            r#"
            INSERT INTO reviews (
                id, business_id, user_id, rating, title, comment, is_approved, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, Review>(&sql)
            .bind(review.id)
            .bind(review.business_id)
            .bind(review.user_id)
            .bind(review.rating)
            .bind(review.title)
            .bind(review.comment)
            .bind(review.is_approved)
            .bind(review.created_at)
            .bind(review.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>> {
        let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1");
        let record = sqlx::query_as::<_, Review>(&sql)
            .bind(review_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn reviews_for_business(
        &self,
        business_id: Uuid,
        include_unapproved: bool,
    ) -> Result<Vec<Review>> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews \
             WHERE business_id = $1 AND ($2 OR is_approved = TRUE) \
             ORDER BY created_at DESC, id ASC"
        );
        let records = sqlx::query_as::<_, Review>(&sql)
            .bind(business_id)
            .bind(include_unapproved)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn approve_review(&self, review_id: Uuid) -> Result<Option<Review>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE reviews SET is_approved = TRUE, updated_at = NOW() \
             WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        );
        let approved = sqlx::query_as::<_, Review>(&sql)
            .bind(review_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(review) = approved else {
            return Ok(None);
        };

        recompute_rating(&mut tx, review.business_id).await?;

        tx.commit().await?;

        Ok(Some(review))
    }

    async fn delete_review(&self, review_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let business_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM reviews WHERE id = $1 RETURNING business_id")
                .bind(review_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(business_id) = business_id else {
            return Err(DirectoryError::not_found("Review"));
        };

        recompute_rating(&mut tx, business_id).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn stats(&self) -> Result<DirectoryStats> {
        let record = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS users,
                (SELECT COUNT(*) FROM categories) AS categories,
                (SELECT COUNT(*) FROM reviews) AS reviews,
                (SELECT COUNT(*) FROM reviews WHERE is_approved = FALSE) AS pending_reviews,
                COUNT(*) AS businesses,
                COUNT(*) FILTER (WHERE is_active = TRUE) AS active_businesses,
                COUNT(*) FILTER (WHERE is_active = FALSE AND rejected_at IS NULL) AS pending_businesses,
                COUNT(*) FILTER (WHERE is_active = FALSE AND rejected_at IS NOT NULL) AS rejected_businesses
            FROM businesses
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DirectoryStats {
            users: record.try_get::<i64, _>("users")?,
            businesses: record.try_get::<i64, _>("businesses")?,
            active_businesses: record.try_get::<i64, _>("active_businesses")?,
            pending_businesses: record.try_get::<i64, _>("pending_businesses")?,
            rejected_businesses: record.try_get::<i64, _>("rejected_businesses")?,
            reviews: record.try_get::<i64, _>("reviews")?,
            pending_reviews: record.try_get::<i64, _>("pending_reviews")?,
            categories: record.try_get::<i64, _>("categories")?,
        })
    }
}

#[async_trait]
impl ActivityLog for Database {
    async fn record(&self, event: ActivityEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO activities (id, event_type, description, actor_id, metadata)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&event.event_type)
            .bind(&event.description)
            .bind(event.actor_id)
            .bind(&event.metadata)
            .execute(&pool)
            .await;

            if let Err(err) = result {
                log::warn!("Failed to record {} activity: {err:?}", event.event_type);
            }
        });
    }
}

/// Links the listing to the user and raises `user` to `business_owner`.
async fn promote_owner(
    conn: &mut PgConnection,
    user_id: Uuid,
    business_id: Uuid,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE users
        SET
            role = CASE WHEN role = 'admin' THEN role ELSE 'business_owner'::user_role END,
            business_id = $2,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .bind(business_id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Rebuilds rating aggregates from approved reviews in one statement.
async fn recompute_rating(
    conn: &mut PgConnection,
    business_id: Uuid,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE businesses
        SET
            rating_average = COALESCE((
                SELECT ROUND(AVG(rating)::numeric, 1)::float8
                FROM reviews
                WHERE business_id = $1 AND is_approved = TRUE
            ), 0),
            rating_count = (
                SELECT COUNT(*)::int
                FROM reviews
                WHERE business_id = $1 AND is_approved = TRUE
            ),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(business_id)
    .execute(conn)
    .await?;

    Ok(())
}

fn contains_pattern(fragment: &str) -> String {
    format!("%{}%", escape_like(fragment))
}

fn category_in_use(listings: i64) -> DirectoryError {
    DirectoryError::Conflict(format!(
        "Category is still used by {listings} business listing(s)"
    ))
}

async fn create_database_if_missing(database_url: &str) -> std::result::Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let database_name = options
        .get_database()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "postgres".to_string());

    if database_name.eq_ignore_ascii_case("postgres") {
        return Ok(());
    }

    let maintenance_options = options.clone().database("postgres");
    let mut connection = PgConnection::connect_with(&maintenance_options).await?;

    let create_stmt = format!("CREATE DATABASE \"{}\"", database_name.replace('"', "\"\""));

    match connection.execute(create_stmt.as_str()).await {
        Ok(_) => {
            log::info!("Created database '{}'", database_name);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("42P04")) => {
            log::info!("Database '{}' already exists", database_name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
