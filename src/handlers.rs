use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::DirectoryError;
use crate::filters::ListingParams;
use crate::models::{
    Actor, ApiResponse, CategoryRequest, ContactBusinessRequest, CreateBusinessRequest,
    CreateReviewRequest, RegisterUserRequest, RejectBusinessRequest, SuspendBusinessRequest,
    UpdateBusinessRequest, UpdateProfileRequest, UserRole,
};
use crate::services::Services;

type HandlerResult = Result<HttpResponse, DirectoryError>;

/// Identity forwarded by the gateway. `Ok(None)` when no identity was sent.
fn optional_actor(req: &HttpRequest) -> Result<Option<Actor>, DirectoryError> {
    let Some(raw_id) = req.headers().get("X-Actor-Id") else {
        return Ok(None);
    };

    let id = raw_id
        .to_str()
        .ok()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| DirectoryError::Unauthorized("Invalid X-Actor-Id header".into()))?;

    let role = req
        .headers()
        .get("X-Actor-Role")
        .and_then(|h| h.to_str().ok())
        .and_then(UserRole::parse)
        .ok_or_else(|| DirectoryError::Unauthorized("Missing or invalid X-Actor-Role header".into()))?;

    Ok(Some(Actor { id, role }))
}

fn extract_actor(req: &HttpRequest) -> Result<Actor, DirectoryError> {
    optional_actor(req)?
        .ok_or_else(|| DirectoryError::Unauthorized("Missing X-Actor-Id header".into()))
}

fn ok<T: serde::Serialize>(data: T) -> HandlerResult {
    Ok(HttpResponse::Ok().json(ApiResponse::success(data)))
}

fn created<T: serde::Serialize>(data: T) -> HandlerResult {
    Ok(HttpResponse::Created().json(ApiResponse::success(data)))
}

#[derive(Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct CategoryListQuery {
    #[serde(default, rename = "includeInactive")]
    pub include_inactive: bool,
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "local-business-directory-service",
        "timestamp": chrono::Utc::now()
    }))
}

// ============================================================================
// BUSINESSES
// ============================================================================

#[get("/businesses")]
pub async fn list_businesses(
    req: HttpRequest,
    services: web::Data<Services>,
    query: web::Query<Vec<(String, String)>>,
) -> HandlerResult {
    let actor = optional_actor(&req)?;
    let params = ListingParams::from_pairs(query.into_inner());
    ok(services.listings.list_businesses(&params, actor.as_ref()).await?)
}

#[get("/search")]
pub async fn search_businesses(
    services: web::Data<Services>,
    query: web::Query<Vec<(String, String)>>,
) -> HandlerResult {
    let params = ListingParams::from_pairs(query.into_inner());
    ok(services.listings.search(&params).await?)
}

#[get("/businesses/filter-options")]
pub async fn get_filter_options(services: web::Data<Services>) -> HandlerResult {
    ok(services.listings.filter_options().await?)
}

#[get("/businesses/mine")]
pub async fn list_my_businesses(req: HttpRequest, services: web::Data<Services>) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.listings.my_businesses(&actor).await?)
}

#[get("/businesses/{business_id}")]
pub async fn get_business(
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    ok(services.listings.get_business(business_id.into_inner()).await?)
}

#[post("/businesses")]
pub async fn create_business(
    req: HttpRequest,
    services: web::Data<Services>,
    payload: web::Json<CreateBusinessRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    created(services.listings.create_business(payload.into_inner(), &actor).await?)
}

#[put("/businesses/{business_id}")]
pub async fn update_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
    payload: web::Json<UpdateBusinessRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let detail = services
        .listings
        .update_business(business_id.into_inner(), payload.into_inner(), &actor)
        .await?;
    ok(detail)
}

#[delete("/businesses/{business_id}")]
pub async fn delete_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    services
        .listings
        .delete_business(business_id.into_inner(), &actor)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/businesses/{business_id}/claim")]
pub async fn claim_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.listings.claim_business(business_id.into_inner(), &actor).await?)
}

#[post("/businesses/{business_id}/resubmit")]
pub async fn resubmit_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let business = services
        .lifecycle
        .resubmit(business_id.into_inner(), &actor)
        .await?;
    ok(services.listings.detail(business).await?)
}

#[post("/businesses/{business_id}/contact")]
pub async fn contact_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
    payload: web::Json<ContactBusinessRequest>,
) -> HandlerResult {
    let actor = optional_actor(&req)?;
    services
        .listings
        .contact_business(business_id.into_inner(), payload.into_inner(), actor.as_ref())
        .await?;
    ok(serde_json::json!({ "message": "Your message has been sent" }))
}

// ============================================================================
// REVIEWS
// ============================================================================

#[get("/businesses/{business_id}/reviews")]
pub async fn list_reviews(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = optional_actor(&req)?;
    let reviews = services
        .reviews
        .list_for_business(business_id.into_inner(), actor.as_ref())
        .await?;
    ok(reviews)
}

#[post("/businesses/{business_id}/reviews")]
pub async fn create_review(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
    payload: web::Json<CreateReviewRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let review = services
        .reviews
        .create(business_id.into_inner(), payload.into_inner(), &actor)
        .await?;
    created(review)
}

#[delete("/reviews/{review_id}")]
pub async fn delete_review(
    req: HttpRequest,
    services: web::Data<Services>,
    review_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    services.reviews.delete(review_id.into_inner(), &actor).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ============================================================================
// SUGGESTIONS
// ============================================================================

#[get("/suggestions")]
pub async fn search_suggestions(
    services: web::Data<Services>,
    query: web::Query<SuggestionQuery>,
) -> HandlerResult {
    ok(services.suggestions.search_suggestions(&query.q).await?)
}

#[get("/suggestions/locations")]
pub async fn location_suggestions(
    services: web::Data<Services>,
    query: web::Query<SuggestionQuery>,
) -> HandlerResult {
    ok(services.suggestions.location_suggestions(&query.q).await?)
}

// ============================================================================
// CATEGORIES & USERS
// ============================================================================

#[get("/categories")]
pub async fn list_categories(services: web::Data<Services>) -> HandlerResult {
    ok(services.catalog.list_categories(true).await?)
}

#[get("/categories/{category_id}")]
pub async fn get_category(
    services: web::Data<Services>,
    category_id: web::Path<i32>,
) -> HandlerResult {
    ok(services.catalog.get_category(category_id.into_inner()).await?)
}

#[post("/users")]
pub async fn register_user(
    req: HttpRequest,
    services: web::Data<Services>,
    payload: web::Json<RegisterUserRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    created(services.catalog.register_user(payload.into_inner(), &actor).await?)
}

#[get("/users/me")]
pub async fn get_profile(req: HttpRequest, services: web::Data<Services>) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.catalog.profile(&actor).await?)
}

#[put("/users/me")]
pub async fn update_profile(
    req: HttpRequest,
    services: web::Data<Services>,
    payload: web::Json<UpdateProfileRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.catalog.update_profile(payload.into_inner(), &actor).await?)
}

// ============================================================================
// ADMIN
// ============================================================================

#[get("/admin/businesses")]
pub async fn admin_list_businesses(
    req: HttpRequest,
    services: web::Data<Services>,
    query: web::Query<Vec<(String, String)>>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let params = ListingParams::from_pairs(query.into_inner());
    ok(services.listings.admin_list(&params, &actor).await?)
}

#[put("/admin/businesses/{business_id}/approve")]
pub async fn approve_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let business = services
        .lifecycle
        .approve(business_id.into_inner(), &actor)
        .await?;
    ok(services.listings.detail(business).await?)
}

#[put("/admin/businesses/{business_id}/reject")]
pub async fn reject_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
    payload: web::Json<RejectBusinessRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let business = services
        .lifecycle
        .reject(business_id.into_inner(), &payload.reason, &actor)
        .await?;
    ok(services.listings.detail(business).await?)
}

#[put("/admin/businesses/{business_id}/suspend")]
pub async fn suspend_business(
    req: HttpRequest,
    services: web::Data<Services>,
    business_id: web::Path<Uuid>,
    payload: Option<web::Json<SuspendBusinessRequest>>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let reason = payload.and_then(|p| p.into_inner().reason);
    let business = services
        .lifecycle
        .suspend(business_id.into_inner(), reason.as_deref(), &actor)
        .await?;
    ok(services.listings.detail(business).await?)
}

#[get("/admin/stats")]
pub async fn get_stats(req: HttpRequest, services: web::Data<Services>) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.catalog.stats(&actor).await?)
}

#[get("/admin/categories")]
pub async fn admin_list_categories(
    req: HttpRequest,
    services: web::Data<Services>,
    query: web::Query<CategoryListQuery>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    if !actor.is_admin() {
        return Err(DirectoryError::Forbidden("Admin access required".into()));
    }
    ok(services.catalog.list_categories(!query.include_inactive).await?)
}

#[post("/admin/categories")]
pub async fn create_category(
    req: HttpRequest,
    services: web::Data<Services>,
    payload: web::Json<CategoryRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    created(services.catalog.create_category(payload.into_inner(), &actor).await?)
}

#[put("/admin/categories/{category_id}")]
pub async fn update_category(
    req: HttpRequest,
    services: web::Data<Services>,
    category_id: web::Path<i32>,
    payload: web::Json<CategoryRequest>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    let category = services
        .catalog
        .update_category(category_id.into_inner(), payload.into_inner(), &actor)
        .await?;
    ok(category)
}

#[delete("/admin/categories/{category_id}")]
pub async fn delete_category(
    req: HttpRequest,
    services: web::Data<Services>,
    category_id: web::Path<i32>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    services
        .catalog
        .delete_category(category_id.into_inner(), &actor)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[put("/admin/reviews/{review_id}/approve")]
pub async fn approve_review(
    req: HttpRequest,
    services: web::Data<Services>,
    review_id: web::Path<Uuid>,
) -> HandlerResult {
    let actor = extract_actor(&req)?;
    ok(services.reviews.approve(review_id.into_inner(), &actor).await?)
}

/// Registers every route. Literal paths come before `{id}` captures.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // Health
        .service(health_check)
        // Businesses
        .service(list_businesses)
        .service(search_businesses)
        .service(get_filter_options)
        .service(list_my_businesses)
        .service(get_business)
        .service(create_business)
        .service(update_business)
        .service(delete_business)
        .service(claim_business)
        .service(resubmit_business)
        .service(contact_business)
        // Reviews
        .service(list_reviews)
        .service(create_review)
        .service(delete_review)
        // Suggestions
        .service(search_suggestions)
        .service(location_suggestions)
        // Categories & users
        .service(list_categories)
        .service(get_category)
        .service(register_user)
        .service(get_profile)
        .service(update_profile)
        // Admin
        .service(admin_list_businesses)
        .service(approve_business)
        .service(reject_business)
        .service(suspend_business)
        .service(get_stats)
        .service(admin_list_categories)
        .service(create_category)
        .service(update_category)
        .service(delete_category)
        .service(approve_review);
}
