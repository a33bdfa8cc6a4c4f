use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    config::Settings,
    db::models::{Role, SellerPlan, User},
    error::MarketError,
};

/// Registers a Telegram user as a buyer, or as an admin when listed in
/// `ADMIN_IDS`. Calling it again keeps the stored profile and role.
pub async fn register(
    pool: &PgPool,
    user_id: i64,
    name: &str,
    settings: &Settings,
) -> Result<(User, bool), MarketError> {
    let role = if settings.is_bootstrap_admin(user_id) {
        Role::Admin
    } else {
        Role::Buyer
    };

    // xmax is zero only for freshly inserted rows
    let created: bool = sqlx::query_scalar(
        "INSERT INTO users (id, name, role) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO UPDATE SET role = CASE WHEN $3 = 'admin' THEN 'admin' ELSE users.role END \
         RETURNING (xmax = 0)",
    )
    .bind(user_id)
    .bind(name)
    .bind(role.as_str())
    .fetch_one(pool)
    .await?;

    if created {
        log::info!("Registered user {} as {}", user_id, role);
    }
    Ok((get_user(pool, user_id).await?, created))
}

pub async fn find_user(pool: &PgPool, user_id: i64) -> Result<Option<User>, MarketError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<User, MarketError> {
    find_user(pool, user_id)
        .await?
        .ok_or(MarketError::NotFound("User"))
}

/// Turns a buyer into a seller with a shop. Admins and moderators keep their
/// role and only get the shop name.
pub async fn become_seller(pool: &PgPool, user_id: i64, shop_name: &str) -> Result<User, MarketError> {
    let shop_name = shop_name.trim();
    if shop_name.is_empty() {
        return Err(MarketError::Validation("Please give your shop a name.".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET shop_name = $2, \
         role = CASE WHEN role = 'buyer' THEN 'seller' ELSE role END \
         WHERE id = $1 RETURNING *",
    )
    .bind(user_id)
    .bind(shop_name)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::NotRegistered)?;

    log::info!("User {} opened shop {}", user_id, shop_name);
    Ok(user)
}

/// Editable profile fields. `None` leaves a field untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub shop_name: Option<String>,
    pub shop_address: Option<String>,
    pub avatar: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == ProfilePatch::default()
    }

    /// Builds a patch from a `field value` pair typed by the user.
    pub fn parse(input: &str) -> Result<ProfilePatch, MarketError> {
        let (field, value) = input
            .trim()
            .split_once(char::is_whitespace)
            .map(|(f, v)| (f, v.trim().to_string()))
            .ok_or_else(|| {
                MarketError::Validation(
                    "Usage: /profile <name|email|phone|shop|address> <value>".to_string(),
                )
            })?;

        let mut patch = ProfilePatch::default();
        match field.to_lowercase().as_str() {
            "name" => patch.name = Some(value),
            "email" => {
                if !value.contains('@') {
                    return Err(MarketError::Validation(format!("{} is not an email address.", value)));
                }
                patch.email = Some(value)
            }
            "phone" => patch.phone = Some(value),
            "shop" => patch.shop_name = Some(value),
            "address" => patch.shop_address = Some(value),
            other => {
                return Err(MarketError::Validation(format!("Unknown profile field: {}", other)))
            }
        }
        Ok(patch)
    }
}

/// Applies `patch`. An empty patch succeeds without touching the database.
pub async fn update_profile(pool: &PgPool, user_id: i64, patch: &ProfilePatch) -> Result<(), MarketError> {
    if patch.is_empty() {
        return Ok(());
    }

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
    let mut fields = query.separated(", ");
    let columns = [
        ("name", &patch.name),
        ("email", &patch.email),
        ("phone", &patch.phone),
        ("shop_name", &patch.shop_name),
        ("shop_address", &patch.shop_address),
        ("avatar", &patch.avatar),
    ];
    for (column, value) in columns {
        if let Some(value) = value {
            fields.push(format!("{} = ", column));
            fields.push_bind_unseparated(value.clone());
        }
    }
    query.push(" WHERE id = ").push_bind(user_id);

    let result = query.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(MarketError::NotRegistered);
    }
    log::info!("Updated profile of user {}", user_id);
    Ok(())
}

pub async fn upgrade_plan(pool: &PgPool, user_id: i64) -> Result<User, MarketError> {
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET plan_type = $2 WHERE id = $1 AND role = 'seller' RETURNING *",
    )
    .bind(user_id)
    .bind(SellerPlan::Pro.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::Forbidden)?;

    log::info!("Seller {} upgraded to pro", user_id);
    Ok(user)
}

pub async fn list_by_role(pool: &PgPool, role: Role) -> Result<Vec<User>, MarketError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = $1 ORDER BY name")
        .bind(role.as_str())
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Sellers that can currently take orders.
pub async fn active_sellers(pool: &PgPool) -> Result<Vec<User>, MarketError> {
    Ok(list_by_role(pool, Role::Seller)
        .await?
        .into_iter()
        .filter(|seller| !seller.is_suspended)
        .collect())
}

pub async fn all_users(pool: &PgPool) -> Result<Vec<User>, MarketError> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

/// Case-insensitive match on name, email or shop name. An empty term matches all.
pub fn search_users<'a>(users: &'a [User], term: &str) -> Vec<&'a User> {
    let term = term.trim().to_lowercase();
    users
        .iter()
        .filter(|user| {
            term.is_empty()
                || user.name.to_lowercase().contains(&term)
                || user
                    .email
                    .as_deref()
                    .is_some_and(|email| email.to_lowercase().contains(&term))
                || user
                    .shop_name
                    .as_deref()
                    .is_some_and(|shop| shop.to_lowercase().contains(&term))
        })
        .collect()
}
