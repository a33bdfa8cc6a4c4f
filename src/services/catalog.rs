use std::str::FromStr;

use rand::Rng;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    db::models::{ApprovalStatus, Category, CommissionRate, Dish, NotificationType, Role, SellerPlan, User},
    error::{MarketError, ParseError},
    services::notifications,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Price,
    Rating,
    Views,
    Newest,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::Price => "d.price",
            SortField::Rating => "d.rating",
            SortField::Views => "d.view_count",
            SortField::Newest => "d.created_at",
        }
    }
}

/// `price-asc`, `rating-desc`, `views-desc`, `createdAt-desc`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DishSort {
    pub field: SortField,
    pub descending: bool,
}

impl FromStr for DishSort {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (field, direction) = s.split_once('-').unwrap_or((s, "asc"));
        let field = match field.to_lowercase().as_str() {
            "price" => SortField::Price,
            "rating" => SortField::Rating,
            "views" | "viewcount" => SortField::Views,
            "createdat" | "newest" | "date" => SortField::Newest,
            _ => return Err(ParseError::new("sort", s)),
        };
        let descending = match direction.to_lowercase().as_str() {
            "asc" => false,
            "desc" => true,
            _ => return Err(ParseError::new("sort", s)),
        };
        Ok(DishSort { field, descending })
    }
}

/// Catalog query. Only available, approved dishes of active sellers are
/// ever listed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DishFilter {
    pub category: Option<Category>,
    pub seller_id: Option<i64>,
    pub min_rating: Option<i32>,
    pub search: Option<String>,
    pub sort: Option<DishSort>,
    pub limit: Option<i64>,
}

impl DishFilter {
    /// Parses the arguments of `/dishes`: `key=value` pairs (`category`,
    /// `rating`, `sort`, `limit`, `seller`, `search`), a bare category name,
    /// or search words. `category=All` clears the category. Bare words after
    /// `search=` extend the search term.
    pub fn parse(args: &str) -> Result<DishFilter, ParseError> {
        let mut filter = DishFilter::default();
        let mut words = Vec::new();

        for token in args.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) => match key.to_lowercase().as_str() {
                    "category" | "cat" => {
                        filter.category = if value.eq_ignore_ascii_case("all") {
                            None
                        } else {
                            Some(Category::lookup(value).ok_or_else(|| ParseError::new("category", value))?)
                        }
                    }
                    "rating" => {
                        filter.min_rating =
                            Some(value.parse().map_err(|_| ParseError::new("rating", value))?)
                    }
                    "sort" => filter.sort = Some(value.parse()?),
                    "limit" => {
                        filter.limit = Some(
                            value
                                .parse::<i64>()
                                .ok()
                                .filter(|limit| *limit > 0)
                                .ok_or_else(|| ParseError::new("limit", value))?,
                        )
                    }
                    "seller" => {
                        filter.seller_id =
                            Some(value.parse().map_err(|_| ParseError::new("seller", value))?)
                    }
                    "search" | "q" => {
                        if !value.is_empty() {
                            words.push(value)
                        }
                    }
                    _ => return Err(ParseError::new("filter", token)),
                },
                None => match Category::lookup(token) {
                    Some(category) if filter.category.is_none() && words.is_empty() => {
                        filter.category = Some(category)
                    }
                    _ => words.push(token),
                },
            }
        }

        if !words.is_empty() {
            filter.search = Some(words.join(" "));
        }
        Ok(filter)
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub async fn list_dishes(pool: &PgPool, filter: &DishFilter) -> Result<Vec<Dish>, MarketError> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT d.* FROM dishes d JOIN users u ON u.id = d.seller_id \
         WHERE d.is_available AND d.approval_status = 'approved' AND NOT u.is_suspended",
    );

    if let Some(category) = filter.category {
        query.push(" AND d.category = ").push_bind(category.as_str());
    }
    if let Some(seller_id) = filter.seller_id {
        query.push(" AND d.seller_id = ").push_bind(seller_id);
    }
    if let Some(min_rating) = filter.min_rating {
        query.push(" AND d.rating >= ").push_bind(min_rating);
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        query
            .push(" AND d.name ILIKE ")
            .push_bind(format!("%{}%", escape_like(search.trim())));
    }

    match filter.sort {
        Some(sort) => {
            query.push(format!(
                " ORDER BY {} {}",
                sort.field.column(),
                if sort.descending { "DESC" } else { "ASC" }
            ));
        }
        None => {
            query.push(" ORDER BY d.created_at DESC");
        }
    }
    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(limit);
    }

    let dishes = query.build_query_as::<Dish>().fetch_all(pool).await?;
    Ok(dishes)
}

pub async fn get_dish(pool: &PgPool, dish_id: Uuid) -> Result<Dish, MarketError> {
    sqlx::query_as::<_, Dish>("SELECT * FROM dishes WHERE id = $1")
        .bind(dish_id)
        .fetch_optional(pool)
        .await?
        .ok_or(MarketError::NotFound("Dish"))
}

/// Every dish of a seller, including unavailable and unapproved ones.
pub async fn dishes_for_seller(pool: &PgPool, seller_id: i64) -> Result<Vec<Dish>, MarketError> {
    let dishes = sqlx::query_as::<_, Dish>(
        "SELECT * FROM dishes WHERE seller_id = $1 ORDER BY created_at DESC",
    )
    .bind(seller_id)
    .fetch_all(pool)
    .await?;
    Ok(dishes)
}

pub async fn all_dishes(pool: &PgPool) -> Result<Vec<Dish>, MarketError> {
    let dishes = sqlx::query_as::<_, Dish>("SELECT * FROM dishes ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(dishes)
}

/// Bumps the view counter. Failures are only logged so a broken counter never
/// keeps a buyer from seeing the dish.
pub async fn increment_view_count(pool: &PgPool, dish_id: Uuid) {
    if let Err(e) = sqlx::query("UPDATE dishes SET view_count = view_count + 1 WHERE id = $1")
        .bind(dish_id)
        .execute(pool)
        .await
    {
        log::error!("Failed to increment view count for dish {}: {}", dish_id, e);
    }
}

/// Whether a seller on `plan` who already uploaded `uploaded` dishes may add another.
pub fn can_upload(plan: SellerPlan, uploaded: i32, free_limit: i32) -> bool {
    match plan {
        SellerPlan::Pro => true,
        SellerPlan::Free => uploaded < free_limit,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DishDraft {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub original_price: Option<i64>,
    pub category: Category,
    pub delivery_time: String,
    pub images: Vec<String>,
    pub commission: CommissionRate,
    pub tags: Vec<String>,
}

impl DishDraft {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.name.trim().is_empty() {
            return Err(MarketError::Validation("A dish needs a name.".to_string()));
        }
        check_prices(self.price, self.original_price)
    }
}

/// A dish price must be positive and never above its crossed-out original price.
pub fn check_prices(price: i64, original_price: Option<i64>) -> Result<(), MarketError> {
    if price <= 0 {
        return Err(MarketError::Validation("The price must be above zero.".to_string()));
    }
    match original_price {
        Some(original) if original < price => Err(MarketError::Validation(
            "The original price cannot be below the selling price.".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Adds a dish for `seller_id`.
///
/// The seller row is locked while the plan limit is checked and the upload
/// counter is bumped, so concurrent uploads cannot slip past the limit. Buyers
/// are told about the new dish once the transaction commits.
pub async fn add_dish(
    pool: &PgPool,
    seller_id: i64,
    draft: DishDraft,
    free_limit: i32,
) -> Result<Dish, MarketError> {
    draft.validate()?;

    let mut transaction = pool.begin().await?;

    let seller = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(seller_id)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(MarketError::NotRegistered)?;

    if seller.role != Role::Seller {
        return Err(MarketError::Forbidden);
    }
    if seller.is_suspended {
        return Err(MarketError::Suspended);
    }
    if !can_upload(seller.plan_type, seller.product_upload_count, free_limit) {
        return Err(MarketError::UploadLimit(free_limit));
    }

    let rating: i32 = rand::thread_rng().gen_range(3..=5);
    let dish = sqlx::query_as::<_, Dish>(
        "INSERT INTO dishes (id, seller_id, name, description, images, price, original_price, \
         category, delivery_time, commission_percentage, tags, rating, approval_status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(seller_id)
    .bind(draft.name.trim())
    .bind(&draft.description)
    .bind(&draft.images)
    .bind(draft.price)
    .bind(draft.original_price)
    .bind(draft.category.as_str())
    .bind(&draft.delivery_time)
    .bind(i32::from(draft.commission.percent()))
    .bind(&draft.tags)
    .bind(rating)
    .bind(ApprovalStatus::Approved.as_str())
    .fetch_one(&mut *transaction)
    .await?;

    sqlx::query("UPDATE users SET product_upload_count = product_upload_count + 1 WHERE id = $1")
        .bind(seller_id)
        .execute(&mut *transaction)
        .await?;

    transaction.commit().await?;
    log::info!("Seller {} added dish {} ({})", seller_id, dish.name, dish.id);

    announce_dish(pool, &dish, seller.display_name()).await;
    Ok(dish)
}

/// Tells every buyer about a freshly committed dish and returns how many were
/// notified. Failures are logged and count as zero, the dish stays either way.
async fn announce_dish(pool: &PgPool, dish: &Dish, seller_name: &str) -> u64 {
    let message = format!("New dish added: {} by {}", dish.name, seller_name);
    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(e) => {
            log::error!("No connection to notify buyers about dish {}: {}", dish.id, e);
            return 0;
        }
    };
    match notifications::notify_role(&mut conn, Role::Buyer, NotificationType::NewProduct, &message, Some(dish.id))
        .await
    {
        Ok(count) => {
            log::info!("Notified {} buyers about dish {}", count, dish.id);
            count
        }
        Err(e) => {
            log::error!("Failed to notify buyers about dish {}: {}", dish.id, e);
            0
        }
    }
}

/// Partial dish update; `None` fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DishPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub original_price: Option<Option<i64>>,
    pub category: Option<Category>,
    pub delivery_time: Option<String>,
    pub images: Option<Vec<String>>,
    pub commission: Option<CommissionRate>,
    pub tags: Option<Vec<String>>,
    pub is_available: Option<bool>,
    pub approval: Option<(ApprovalStatus, Option<String>)>,
}

impl DishPatch {
    pub fn is_empty(&self) -> bool {
        *self == DishPatch::default()
    }

    /// Builds a patch from `/editdish <id> <field> <value>` arguments.
    pub fn parse(field: &str, value: &str) -> Result<DishPatch, MarketError> {
        let value = value.trim();
        let mut patch = DishPatch::default();
        match field.to_lowercase().as_str() {
            "name" if !value.is_empty() => patch.name = Some(value.to_string()),
            "description" => patch.description = Some(value.to_string()),
            "price" => {
                patch.price = Some(
                    crate::utils::parse_money(value)
                        .filter(|p| *p > 0)
                        .ok_or_else(|| MarketError::Validation(format!("{} is not a price.", value)))?,
                )
            }
            "original" => {
                patch.original_price = Some(if value.is_empty() || value == "-" {
                    None
                } else {
                    Some(crate::utils::parse_money(value).ok_or_else(|| {
                        MarketError::Validation(format!("{} is not a price.", value))
                    })?)
                })
            }
            "category" => {
                patch.category = Some(
                    Category::lookup(value).ok_or_else(|| ParseError::new("category", value))?,
                )
            }
            "time" => patch.delivery_time = Some(value.to_string()),
            "commission" => patch.commission = Some(value.parse()?),
            "tags" => {
                patch.tags = Some(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect(),
                )
            }
            _ => {
                return Err(MarketError::Validation(
                    "Usage: /editdish <id> <name|description|price|original|category|time|commission|tags> <value>"
                        .to_string(),
                ))
            }
        }
        Ok(patch)
    }
}

/// Applies `patch` to a dish. With `owner` set the dish must belong to that
/// seller; admins pass `None`.
///
/// A patch touching `price` or `original_price` locks the row and checks the
/// resulting pair with [`check_prices`] before writing.
pub async fn update_dish(
    pool: &PgPool,
    owner: Option<i64>,
    dish_id: Uuid,
    patch: &DishPatch,
) -> Result<(), MarketError> {
    if patch.is_empty() {
        return Ok(());
    }

    let mut transaction = pool.begin().await?;

    if patch.price.is_some() || patch.original_price.is_some() {
        let (price, original_price) = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT price, original_price FROM dishes \
             WHERE id = $1 AND ($2::BIGINT IS NULL OR seller_id = $2) FOR UPDATE",
        )
        .bind(dish_id)
        .bind(owner)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(MarketError::NotFound("Dish"))?;
        check_prices(
            patch.price.unwrap_or(price),
            patch.original_price.unwrap_or(original_price),
        )?;
    }

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE dishes SET ");
    let mut fields = query.separated(", ");
    if let Some(name) = &patch.name {
        fields.push("name = ").push_bind_unseparated(name.clone());
    }
    if let Some(description) = &patch.description {
        fields.push("description = ").push_bind_unseparated(description.clone());
    }
    if let Some(price) = patch.price {
        fields.push("price = ").push_bind_unseparated(price);
    }
    if let Some(original_price) = patch.original_price {
        fields.push("original_price = ").push_bind_unseparated(original_price);
    }
    if let Some(category) = patch.category {
        fields.push("category = ").push_bind_unseparated(category.as_str());
    }
    if let Some(delivery_time) = &patch.delivery_time {
        fields.push("delivery_time = ").push_bind_unseparated(delivery_time.clone());
    }
    if let Some(images) = &patch.images {
        fields.push("images = ").push_bind_unseparated(images.clone());
    }
    if let Some(commission) = patch.commission {
        fields
            .push("commission_percentage = ")
            .push_bind_unseparated(i32::from(commission.percent()));
    }
    if let Some(tags) = &patch.tags {
        fields.push("tags = ").push_bind_unseparated(tags.clone());
    }
    if let Some(is_available) = patch.is_available {
        fields.push("is_available = ").push_bind_unseparated(is_available);
    }
    if let Some((status, reason)) = &patch.approval {
        fields.push("approval_status = ").push_bind_unseparated(status.as_str());
        fields.push("approval_reason = ").push_bind_unseparated(reason.clone());
    }

    query.push(" WHERE id = ").push_bind(dish_id);
    if let Some(owner) = owner {
        query.push(" AND seller_id = ").push_bind(owner);
    }

    let result = query.build().execute(&mut *transaction).await?;
    if result.rows_affected() == 0 {
        return Err(MarketError::NotFound("Dish"));
    }
    transaction.commit().await?;
    log::info!("Updated dish {}", dish_id);
    Ok(())
}

pub async fn set_availability(
    pool: &PgPool,
    seller_id: i64,
    dish_id: Uuid,
    is_available: bool,
) -> Result<(), MarketError> {
    let patch = DishPatch {
        is_available: Some(is_available),
        ..DishPatch::default()
    };
    update_dish(pool, Some(seller_id), dish_id, &patch).await
}

/// Deletes one of the seller's own dishes.
pub async fn delete_dish(pool: &PgPool, seller_id: i64, dish_id: Uuid) -> Result<(), MarketError> {
    let result = sqlx::query("DELETE FROM dishes WHERE id = $1 AND seller_id = $2")
        .bind(dish_id)
        .bind(seller_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(MarketError::NotFound("Dish"));
    }
    log::info!("Seller {} deleted dish {}", seller_id, dish_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    #[test]
    fn sort_parses_field_and_direction() {
        assert_eq!(
            "price-desc".parse::<DishSort>(),
            Ok(DishSort {
                field: SortField::Price,
                descending: true
            })
        );
        assert_eq!(
            "rating".parse::<DishSort>(),
            Ok(DishSort {
                field: SortField::Rating,
                descending: false
            })
        );
        assert_eq!(
            "createdAt-desc".parse::<DishSort>().map(|s| s.field),
            Ok(SortField::Newest)
        );
        assert!("price-up".parse::<DishSort>().is_err());
        assert!("colour-asc".parse::<DishSort>().is_err());
    }

    #[test]
    fn filter_parses_mixed_arguments() {
        let filter = DishFilter::parse("pizza chicken tikka sort=price-asc rating=4 limit=5").unwrap();
        assert_eq!(filter.category, Some(Category::Pizza));
        assert_eq!(filter.search.as_deref(), Some("chicken tikka"));
        assert_eq!(filter.min_rating, Some(4));
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.sort.map(|s| s.field), Some(SortField::Price));
    }

    #[test]
    fn category_all_means_no_category() {
        let filter = DishFilter::parse("category=All").unwrap();
        assert_eq!(filter, DishFilter::default());
        assert_eq!(DishFilter::parse("").unwrap(), DishFilter::default());
    }

    #[test]
    fn category_words_after_search_terms_are_searched() {
        let filter = DishFilter::parse("beef burger").unwrap();
        assert_eq!(filter.category, None);
        assert_eq!(filter.search.as_deref(), Some("beef burger"));
    }

    #[test]
    fn search_key_takes_the_following_words() {
        let filter = DishFilter::parse("search=kacchi").unwrap();
        assert_eq!(filter.search.as_deref(), Some("kacchi"));

        let filter = DishFilter::parse("search=mutton kacchi sort=price-asc").unwrap();
        assert_eq!(filter.search.as_deref(), Some("mutton kacchi"));
        assert_eq!(filter.category, None);

        let filter = DishFilter::parse("q=firni category=dessert").unwrap();
        assert_eq!(filter.search.as_deref(), Some("firni"));
        assert_eq!(filter.category, Some(Category::Dessert));

        assert_eq!(DishFilter::parse("search=").unwrap(), DishFilter::default());
    }

    #[test]
    fn filter_rejects_bad_values() {
        assert!(DishFilter::parse("limit=0").is_err());
        assert!(DishFilter::parse("rating=high").is_err());
        assert!(DishFilter::parse("category=sushi").is_err());
        assert!(DishFilter::parse("colour=red").is_err());
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
    }

    #[test]
    fn free_plan_is_capped_and_pro_is_not() {
        assert!(can_upload(SellerPlan::Free, 4, 5));
        assert!(!can_upload(SellerPlan::Free, 5, 5));
        assert!(can_upload(SellerPlan::Pro, 500, 5));
    }

    #[test]
    fn draft_validation() {
        let draft = DishDraft {
            name: "Beef Tehari".to_string(),
            description: String::new(),
            price: 18_000,
            original_price: Some(20_000),
            category: Category::Biryani,
            delivery_time: "30-45 min".to_string(),
            images: Vec::new(),
            commission: CommissionRate::default(),
            tags: Vec::new(),
        };
        assert!(draft.validate().is_ok());

        let free = DishDraft { price: 0, ..draft.clone() };
        assert!(free.validate().is_err());

        let discounted_up = DishDraft {
            original_price: Some(10_000),
            ..draft.clone()
        };
        assert!(discounted_up.validate().is_err());

        let nameless = DishDraft {
            name: "  ".to_string(),
            ..draft
        };
        assert!(nameless.validate().is_err());
    }

    #[test]
    fn price_must_not_exceed_the_original() {
        assert!(check_prices(18_000, None).is_ok());
        assert!(check_prices(18_000, Some(18_000)).is_ok());
        assert!(check_prices(25_000, Some(20_000)).is_err());
        assert!(check_prices(0, None).is_err());
    }

    fn sample_dish() -> Dish {
        Dish {
            id: Uuid::new_v4(),
            seller_id: 10,
            name: "Chicken Roast".to_string(),
            description: String::new(),
            images: Vec::new(),
            price: 22_000,
            original_price: None,
            category: Category::SetMenu,
            delivery_time: "30-45 min".to_string(),
            commission_percentage: CommissionRate::default(),
            tags: Vec::new(),
            rating: 4,
            is_available: true,
            approval_status: ApprovalStatus::Approved,
            approval_reason: None,
            view_count: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn announcing_without_a_database_only_logs() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://localhost:1/unreachable")
            .unwrap();
        assert_eq!(announce_dish(&pool, &sample_dish(), "Kitchen 10").await, 0);
    }

    fn draft(name: &str, price: i64, original_price: Option<i64>) -> DishDraft {
        DishDraft {
            name: name.to_string(),
            description: String::new(),
            price,
            original_price,
            category: Category::Biryani,
            delivery_time: "30-45 min".to_string(),
            images: Vec::new(),
            commission: CommissionRate::default(),
            tags: Vec::new(),
        }
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn free_sellers_stop_at_the_upload_limit(pool: PgPool) {
        fixtures::schema(&pool).await;
        fixtures::user(&pool, 10, "seller", "free").await;
        fixtures::user(&pool, 20, "buyer", "free").await;
        fixtures::user(&pool, 21, "buyer", "free").await;

        let first = add_dish(&pool, 10, draft("Tehari", 15_000, None), 2).await.unwrap();
        assert!((3..=5).contains(&first.rating));
        assert_eq!(first.approval_status, ApprovalStatus::Approved);
        add_dish(&pool, 10, draft("Khichuri", 12_000, None), 2).await.unwrap();

        let third = add_dish(&pool, 10, draft("Polao", 10_000, None), 2).await;
        assert!(matches!(third, Err(MarketError::UploadLimit(2))));

        let uploads: i32 = sqlx::query_scalar("SELECT product_upload_count FROM users WHERE id = 10")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(uploads, 2);
        assert_eq!(dishes_for_seller(&pool, 10).await.unwrap().len(), 2);
        assert_eq!(fixtures::notifications_of(&pool, 20, "new-product").await, 2);
        assert_eq!(fixtures::notifications_of(&pool, 21, "new-product").await, 2);
        assert_eq!(fixtures::notifications_of(&pool, 10, "new-product").await, 0);
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn suspended_and_non_sellers_cannot_add_dishes(pool: PgPool) {
        fixtures::schema(&pool).await;
        fixtures::user(&pool, 10, "seller", "pro").await;
        fixtures::user(&pool, 20, "buyer", "free").await;
        sqlx::query("UPDATE users SET is_suspended = TRUE WHERE id = 10")
            .execute(&pool)
            .await
            .unwrap();

        let suspended = add_dish(&pool, 10, draft("Tehari", 15_000, None), 5).await;
        assert!(matches!(suspended, Err(MarketError::Suspended)));
        let buyer = add_dish(&pool, 20, draft("Tehari", 15_000, None), 5).await;
        assert!(matches!(buyer, Err(MarketError::Forbidden)));
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn price_edits_keep_the_original_price_above(pool: PgPool) {
        fixtures::schema(&pool).await;
        fixtures::user(&pool, 10, "seller", "pro").await;
        fixtures::user(&pool, 11, "seller", "pro").await;
        let dish = add_dish(&pool, 10, draft("Beef Tehari", 18_000, Some(20_000)), 5)
            .await
            .unwrap();

        let raise = DishPatch::parse("price", "250").unwrap();
        let rejected = update_dish(&pool, Some(10), dish.id, &raise).await;
        assert!(matches!(rejected, Err(MarketError::Validation(_))));

        let lower_original = DishPatch::parse("original", "150").unwrap();
        let rejected = update_dish(&pool, Some(10), dish.id, &lower_original).await;
        assert!(matches!(rejected, Err(MarketError::Validation(_))));
        assert_eq!(get_dish(&pool, dish.id).await.unwrap().price, 18_000);

        let foreign = update_dish(&pool, Some(11), dish.id, &raise).await;
        assert!(matches!(foreign, Err(MarketError::NotFound("Dish"))));

        let clear_original = DishPatch::parse("original", "-").unwrap();
        update_dish(&pool, Some(10), dish.id, &clear_original).await.unwrap();
        update_dish(&pool, Some(10), dish.id, &raise).await.unwrap();
        let updated = get_dish(&pool, dish.id).await.unwrap();
        assert_eq!((updated.price, updated.original_price), (25_000, None));
    }

    #[test]
    fn dish_patch_parsing() {
        let patch = DishPatch::parse("price", "250.50").unwrap();
        assert_eq!(patch.price, Some(25_050));

        let patch = DishPatch::parse("tags", "spicy, halal,,").unwrap();
        assert_eq!(patch.tags, Some(vec!["spicy".to_string(), "halal".to_string()]));

        let patch = DishPatch::parse("original", "-").unwrap();
        assert_eq!(patch.original_price, Some(None));

        assert!(DishPatch::parse("commission", "6").is_err());
        assert!(DishPatch::parse("price", "free").is_err());
        assert!(DishPatch::parse("colour", "red").is_err());
        assert!(DishPatch::default().is_empty());
    }
}
