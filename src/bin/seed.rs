//! Inserts an admin profile and a few sample listings. Safe to run repeatedly.

use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

struct SampleBusiness {
    slug: &'static str,
    name: &'static str,
    description: &'static str,
    category_slug: &'static str,
    address: &'static str,
    city: &'static str,
    state: &'static str,
    zip_code: &'static str,
    phone: &'static str,
    email: &'static str,
    website: Option<&'static str>,
    is_featured: bool,
    rating_average: f64,
    rating_count: i32,
}

const SAMPLES: &[SampleBusiness] = &[
    SampleBusiness {
        slug: "downtown-pizza-co",
        name: "Downtown Pizza Co.",
        description: "Authentic Italian pizza with fresh ingredients and traditional recipes.",
        category_slug: "restaurants-dining",
        address: "123 Main Street",
        city: "New York",
        state: "NY",
        zip_code: "10001",
        phone: "(555) 123-4567",
        email: "info@downtownpizza.com",
        website: Some("https://downtownpizza.com"),
        is_featured: true,
        rating_average: 4.5,
        rating_count: 25,
    },
    SampleBusiness {
        slug: "tech-solutions-inc",
        name: "Tech Solutions Inc.",
        description: "Professional IT services and consulting for businesses of all sizes.",
        category_slug: "professional-services",
        address: "456 Tech Avenue",
        city: "San Francisco",
        state: "CA",
        zip_code: "94102",
        phone: "(555) 234-5678",
        email: "contact@techsolutions.com",
        website: Some("https://techsolutions.com"),
        is_featured: true,
        rating_average: 4.8,
        rating_count: 42,
    },
    SampleBusiness {
        slug: "green-thumb-landscaping",
        name: "Green Thumb Landscaping",
        description: "Expert landscaping and garden design services for residential and commercial properties.",
        category_slug: "home-services",
        address: "789 Garden Lane",
        city: "Los Angeles",
        state: "CA",
        zip_code: "90001",
        phone: "(555) 345-6789",
        email: "info@greenthumb.com",
        website: None,
        is_featured: false,
        rating_average: 4.3,
        rating_count: 18,
    },
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let database_url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let admin_email =
        std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@localhost".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role)
        VALUES ($1, $2, 'Admin User', 'admin')
        ON CONFLICT (email) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&admin_email)
    .execute(&pool)
    .await?
    .rows_affected();
    if inserted > 0 {
        log::info!("Created admin profile {admin_email}");
    } else {
        log::info!("Admin profile {admin_email} already exists");
    }

    let mut created = 0;
    for sample in SAMPLES {
        let result = sqlx::query(
            r#"
            INSERT INTO businesses (
                id, slug, name, description, category_id, address, city, state, zip_code,
                phone, email, website, is_featured, rating_average, rating_count,
                is_active, is_verified, approved_at
            )
            SELECT $1, $2, $3, $4, c.id, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                TRUE, TRUE, NOW()
            FROM categories c
            WHERE c.slug = $15
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(sample.slug)
        .bind(sample.name)
        .bind(sample.description)
        .bind(sample.address)
        .bind(sample.city)
        .bind(sample.state)
        .bind(sample.zip_code)
        .bind(sample.phone)
        .bind(sample.email)
        .bind(sample.website)
        .bind(sample.is_featured)
        .bind(sample.rating_average)
        .bind(sample.rating_count)
        .bind(sample.category_slug)
        .execute(&pool)
        .await?;

        if result.rows_affected() == 0 {
            log::info!("Skipping '{}' (already seeded or category missing)", sample.name);
        } else {
            created += 1;
        }
    }

    log::info!("Seed complete: {created} new sample listing(s)");
    Ok(())
}
