use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ============================================================================
// ENUMS
// ============================================================================

/// Account role (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    BusinessOwner,
    Admin,
}

impl UserRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "user" => Some(Self::User),
            "business_owner" => Some(Self::BusinessOwner),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Role held after creating or claiming a listing. Admins are never demoted.
    pub fn promoted(self) -> Self {
        match self {
            Self::Admin => Self::Admin,
            Self::User | Self::BusinessOwner => Self::BusinessOwner,
        }
    }
}

/// Observable listing status. Never persisted; always derived from the
/// lifecycle columns of [`Business`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BusinessStatus {
    Pending,
    Active,
    Rejected,
}

impl BusinessStatus {
    pub fn derive(is_active: bool, rejected_at: Option<DateTime<Utc>>) -> Self {
        if is_active {
            Self::Active
        } else if rejected_at.is_some() {
            Self::Rejected
        } else {
            Self::Pending
        }
    }

    /// SQL condition selecting rows whose derived status equals `self`.
    /// Must agree with [`BusinessStatus::derive`].
    pub fn sql_condition(self) -> &'static str {
        match self {
            Self::Active => "is_active = TRUE",
            Self::Rejected => "(is_active = FALSE AND rejected_at IS NOT NULL)",
            Self::Pending => "(is_active = FALSE AND rejected_at IS NULL)",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Rejected => "rejected",
        }
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Authenticated caller as forwarded by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn owns(&self, business: &Business) -> bool {
        business.owner_id == Some(self.id)
    }

    pub fn can_manage(&self, business: &Business) -> bool {
        self.is_admin() || self.owns(business)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub display_order: i32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub name: String,
    pub role: UserRole,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub business_id: Option<Uuid>,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

/// Business listing persisted in database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category_id: i32,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub country: String,
    pub phone: String,
    pub email: Option<String>,
    pub website: Option<String>,
    pub hours: Option<Value>,
    pub social_links: Option<Value>,
    pub rating_average: f64,
    pub rating_count: i32,
    pub views: i32,
    pub is_featured: bool,
    pub owner_id: Option<Uuid>,
    pub is_active: bool,
    pub is_verified: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub resubmitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    pub fn status(&self) -> BusinessStatus {
        BusinessStatus::derive(self.is_active, self.rejected_at)
    }
}

/// Helper struct used when inserting a new listing
#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category_id: i32,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: Option<String>,
    pub country: String,
    pub phone: String,
    pub email: Option<String>,
    pub website: Option<String>,
    pub hours: Option<Value>,
    pub social_links: Option<Value>,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle column values written by a single status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleChange {
    pub is_active: bool,
    pub is_verified: Option<bool>,
    pub approved_at: Option<DateTime<Utc>>,
    pub keep_approved_at: bool,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub resubmitted_at: Option<DateTime<Utc>>,
}

impl LifecycleChange {
    pub fn apply(&self, business: &mut Business) {
        business.is_active = self.is_active;
        if let Some(verified) = self.is_verified {
            business.is_verified = verified;
        }
        if !self.keep_approved_at {
            business.approved_at = self.approved_at;
        }
        business.rejected_at = self.rejected_at;
        business.rejection_reason = self.rejection_reason.clone();
        if self.resubmitted_at.is_some() {
            business.resubmitted_at = self.resubmitted_at;
        }
        business.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub rating: i16,
    pub title: Option<String>,
    pub comment: String,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub users: i64,
    pub businesses: i64,
    pub active_businesses: i64,
    pub pending_businesses: i64,
    pub rejected_businesses: i64,
    pub reviews: i64,
    pub pending_reviews: i64,
    pub categories: i64,
}

// ============================================================================
// REQUEST/RESPONSE DTOs
// ============================================================================

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Payload for submitting a new listing. Lifecycle flags are not accepted;
/// new listings always start pending.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBusinessRequest {
    #[validate(
        length(min = 1, max = 160, message = "Business name is required"),
        custom(function = "non_blank")
    )]
    pub name: String,
    #[validate(
        length(min = 1, message = "Business description is required"),
        custom(function = "non_blank")
    )]
    pub description: String,
    pub category_id: Option<i32>,
    #[validate(length(min = 1, message = "Address is required"), custom(function = "non_blank"))]
    pub address: String,
    #[validate(
        length(min = 1, max = 120, message = "City is required"),
        custom(function = "non_blank")
    )]
    pub city: String,
    #[validate(
        length(min = 1, max = 120, message = "State is required"),
        custom(function = "non_blank")
    )]
    pub state: String,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    #[validate(
        length(min = 1, max = 40, message = "Phone number is required"),
        custom(function = "non_blank")
    )]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 1024))]
    pub website: Option<String>,
    pub hours: Option<Value>,
    pub social_links: Option<Value>,
}

impl CreateBusinessRequest {
    pub fn into_new_business(self, category_id: i32, slug: String, owner_id: Uuid) -> NewBusiness {
        NewBusiness {
            id: Uuid::new_v4(),
            slug,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            category_id,
            address: self.address.trim().to_string(),
            city: self.city.trim().to_string(),
            state: self.state.trim().to_string(),
            zip_code: non_empty(self.zip_code),
            country: non_empty(self.country).unwrap_or_else(|| "USA".to_string()),
            phone: self.phone.trim().to_string(),
            email: non_empty(self.email),
            website: non_empty(self.website),
            hours: self.hours,
            social_links: self.social_links,
            owner_id: Some(owner_id),
            created_at: Utc::now(),
        }
    }
}

/// Partial update of a listing. Slug, ownership and lifecycle columns are not editable here.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 1, max = 160), custom(function = "non_blank"))]
    pub name: Option<String>,
    #[validate(length(min = 1), custom(function = "non_blank"))]
    pub description: Option<String>,
    pub category_id: Option<i32>,
    #[validate(length(min = 1), custom(function = "non_blank"))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 120), custom(function = "non_blank"))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 120), custom(function = "non_blank"))]
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    #[validate(length(min = 1, max = 40), custom(function = "non_blank"))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 1024))]
    pub website: Option<String>,
    pub hours: Option<Value>,
    pub social_links: Option<Value>,
    /// Honoured for admins only.
    pub is_featured: Option<bool>,
}

impl UpdateBusinessRequest {
    pub fn apply_to_existing(self, existing: &mut Business, actor: &Actor) {
        if let Some(name) = self.name {
            existing.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            existing.description = description.trim().to_string();
        }
        if let Some(category_id) = self.category_id {
            existing.category_id = category_id;
        }
        if let Some(address) = self.address {
            existing.address = address.trim().to_string();
        }
        if let Some(city) = self.city {
            existing.city = city.trim().to_string();
        }
        if let Some(state) = self.state {
            existing.state = state.trim().to_string();
        }
        if self.zip_code.is_some() {
            existing.zip_code = non_empty(self.zip_code);
        }
        if let Some(country) = non_empty(self.country) {
            existing.country = country;
        }
        if let Some(phone) = self.phone {
            existing.phone = phone.trim().to_string();
        }
        if self.email.is_some() {
            existing.email = non_empty(self.email);
        }
        if self.website.is_some() {
            existing.website = non_empty(self.website);
        }
        if self.hours.is_some() {
            existing.hours = self.hours;
        }
        if self.social_links.is_some() {
            existing.social_links = self.social_links;
        }
        if actor.is_admin() {
            if let Some(featured) = self.is_featured {
                existing.is_featured = featured;
            }
        }
        existing.updated_at = Utc::now();
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RejectBusinessRequest {
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuspendBusinessRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct ContactBusinessRequest {
    #[validate(
        length(min = 1, max = 120, message = "Name is required"),
        custom(function = "non_blank")
    )]
    pub name: String,
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    pub phone: Option<String>,
    #[validate(
        length(min = 1, max = 4000, message = "Message is required"),
        custom(function = "non_blank")
    )]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 160))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 4000, message = "Comment is required"))]
    pub comment: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    #[validate(length(min = 2, max = 120))]
    pub name: String,
    #[validate(length(max = 60))]
    pub icon: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterUserRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, max = 120, message = "Name is required"))]
    pub name: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 80))]
    pub first_name: Option<String>,
    #[validate(length(max = 80))]
    pub last_name: Option<String>,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    #[validate(length(max = 120))]
    pub state: Option<String>,
    #[validate(length(max = 120))]
    pub country: Option<String>,
}

impl UpdateProfileRequest {
    pub fn apply_to_existing(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if self.first_name.is_some() {
            user.first_name = self.first_name;
        }
        if self.last_name.is_some() {
            user.last_name = self.last_name;
        }
        if self.phone.is_some() {
            user.phone = self.phone;
        }
        if self.city.is_some() {
            user.city = self.city;
        }
        if self.state.is_some() {
            user.state = self.state;
        }
        if self.country.is_some() {
            user.country = self.country;
        }
        user.updated_at = Utc::now();
    }
}

// ============================================================================
// COMPOSITE RESPONSE TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategorySummary {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub icon: Option<String>,
}

impl From<&Category> for CategorySummary {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id,
            name: category.name.clone(),
            slug: category.slug.clone(),
            icon: category.icon.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for OwnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Listing joined with its category and owner summaries
#[derive(Debug, Clone, Serialize)]
pub struct BusinessDetail {
    #[serde(flatten)]
    pub business: Business,
    pub status: BusinessStatus,
    pub category: Option<CategorySummary>,
    pub owner: Option<OwnerSummary>,
}

impl BusinessDetail {
    pub fn new(
        business: Business,
        category: Option<CategorySummary>,
        owner: Option<OwnerSummary>,
    ) -> Self {
        Self {
            status: business.status(),
            business,
            category,
            owner,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPage {
    pub businesses: Vec<BusinessDetail>,
    pub count: usize,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub cities: Vec<String>,
    pub categories: Vec<CategorySummary>,
}

/// Rejects values that are empty once surrounding whitespace is removed.
fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_derived_from_lifecycle_columns() {
        assert_eq!(BusinessStatus::derive(true, None), BusinessStatus::Active);
        assert_eq!(BusinessStatus::derive(false, None), BusinessStatus::Pending);
        assert_eq!(
            BusinessStatus::derive(false, Some(Utc::now())),
            BusinessStatus::Rejected
        );
        // an active flag wins over a stale rejection timestamp
        assert_eq!(
            BusinessStatus::derive(true, Some(Utc::now())),
            BusinessStatus::Active
        );
    }

    #[test]
    fn promotion_never_downgrades_admins() {
        assert_eq!(UserRole::User.promoted(), UserRole::BusinessOwner);
        assert_eq!(UserRole::BusinessOwner.promoted(), UserRole::BusinessOwner);
        assert_eq!(UserRole::Admin.promoted(), UserRole::Admin);
    }

    #[test]
    fn role_header_values_parse() {
        assert_eq!(UserRole::parse("admin"), Some(UserRole::Admin));
        assert_eq!(UserRole::parse(" business_owner "), Some(UserRole::BusinessOwner));
        assert_eq!(UserRole::parse("root"), None);
    }

    #[test]
    fn create_request_defaults_country_and_drops_blank_optionals() {
        let request = CreateBusinessRequest {
            name: "  Corner Deli ".into(),
            description: "Sandwiches".into(),
            category_id: Some(3),
            address: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: Some("  ".into()),
            phone: "555-0100".into(),
            website: Some(String::new()),
            ..Default::default()
        };
        let owner = Uuid::new_v4();
        let new = request.into_new_business(3, "corner-deli-1".into(), owner);
        assert_eq!(new.name, "Corner Deli");
        assert_eq!(new.country, "USA");
        assert_eq!(new.zip_code, None);
        assert_eq!(new.website, None);
        assert_eq!(new.owner_id, Some(owner));
    }

    #[test]
    fn missing_required_fields_fail_validation() {
        let request = CreateBusinessRequest {
            name: "Deli".into(),
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("description"));
        assert!(fields.contains_key("phone"));
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn whitespace_only_required_fields_fail_validation() {
        let request = CreateBusinessRequest {
            name: "   ".into(),
            description: "Sandwiches".into(),
            category_id: Some(3),
            address: "1 Main St".into(),
            city: "   ".into(),
            state: "IL".into(),
            phone: " ".into(),
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("city"));
        assert!(fields.contains_key("phone"));
        assert!(!fields.contains_key("state"));

        let update = UpdateBusinessRequest {
            address: Some("\t ".into()),
            ..Default::default()
        };
        assert!(update.validate().unwrap_err().field_errors().contains_key("address"));
        assert!(UpdateBusinessRequest::default().validate().is_ok());
    }
}
