use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    db::models::{AdminLog, ApprovalStatus, LogTarget, NotificationType, Role, User},
    error::MarketError,
    services::{
        catalog::{self, DishPatch},
        notifications::{self, NewNotification},
    },
};

/// Admins and moderators may use the panel.
pub fn ensure_panel_access(actor: &User) -> Result<(), MarketError> {
    if actor.role.can_access_admin_panel() {
        Ok(())
    } else {
        Err(MarketError::Forbidden)
    }
}

/// Destructive user management is reserved to admins.
pub fn ensure_admin(actor: &User) -> Result<(), MarketError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(MarketError::Forbidden)
    }
}

/// Appends an audit entry. A failure here is logged and swallowed so the
/// admin action it records still counts as done.
pub async fn create_log(
    pool: &PgPool,
    actor: &User,
    action: &str,
    target: LogTarget,
    target_id: Option<String>,
) {
    let result = sqlx::query(
        "INSERT INTO admin_logs (id, admin_id, admin_name, action, target_type, target_id) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(actor.id)
    .bind(&actor.name)
    .bind(action)
    .bind(target.as_str())
    .bind(target_id)
    .execute(pool)
    .await;

    match result {
        Ok(_) => log::info!("Admin {}: {}", actor.id, action),
        Err(e) => log::error!("Failed to create admin log for {:?}: {}", action, e),
    }
}

pub async fn list_logs(pool: &PgPool, actor: &User) -> Result<Vec<AdminLog>, MarketError> {
    ensure_panel_access(actor)?;
    let logs = sqlx::query_as::<_, AdminLog>("SELECT * FROM admin_logs ORDER BY timestamp DESC")
        .fetch_all(pool)
        .await?;
    Ok(logs)
}

/// Deletes a user. A seller's dishes, every cart and notification of the
/// user go with them; orders keep their snapshots.
pub async fn delete_user(pool: &PgPool, actor: &User, target_id: i64) -> Result<User, MarketError> {
    ensure_admin(actor)?;

    let mut transaction = pool.begin().await?;
    let target = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(target_id)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(MarketError::NotFound("User"))?;

    if target.role == Role::Admin {
        return Err(MarketError::Validation("Cannot delete an admin account.".to_string()));
    }

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(target_id)
        .execute(&mut *transaction)
        .await?;
    transaction.commit().await?;

    let action = format!(
        "Deleted user {} ({})",
        target.name,
        target.email.as_deref().unwrap_or("no email")
    );
    create_log(pool, actor, &action, LogTarget::User, Some(target_id.to_string())).await;
    Ok(target)
}

pub async fn delete_dish(pool: &PgPool, actor: &User, dish_id: Uuid) -> Result<String, MarketError> {
    ensure_panel_access(actor)?;

    let name: String = sqlx::query_scalar("DELETE FROM dishes WHERE id = $1 RETURNING name")
        .bind(dish_id)
        .fetch_optional(pool)
        .await?
        .ok_or(MarketError::NotFound("Dish"))?;

    create_log(
        pool,
        actor,
        &format!("Deleted dish \"{}\"", name),
        LogTarget::Dish,
        Some(dish_id.to_string()),
    )
    .await;
    Ok(name)
}

/// Lifts a seller's suspension and resets their delivered-order counter.
pub async fn activate_seller(pool: &PgPool, actor: &User, seller_id: i64) -> Result<String, MarketError> {
    ensure_panel_access(actor)?;

    let mut transaction = pool.begin().await?;
    let name: String = sqlx::query_scalar(
        "UPDATE users SET is_suspended = FALSE, delivered_order_count = 0 \
         WHERE id = $1 AND role = 'seller' RETURNING name",
    )
    .bind(seller_id)
    .fetch_optional(&mut *transaction)
    .await?
    .ok_or(MarketError::NotFound("Seller"))?;

    notifications::notify(
        &mut transaction,
        NewNotification::new(
            seller_id,
            NotificationType::AccountActivated,
            "Your account has been re-activated by an admin. You can now resume selling.",
        ),
    )
    .await?;
    transaction.commit().await?;

    create_log(
        pool,
        actor,
        &format!("Activated seller account for {}", name),
        LogTarget::User,
        Some(seller_id.to_string()),
    )
    .await;
    Ok(name)
}

/// Flips the watchlist flag and returns the new state.
pub async fn toggle_watchlist(pool: &PgPool, actor: &User, user_id: i64) -> Result<bool, MarketError> {
    ensure_panel_access(actor)?;

    let (name, on_watchlist): (String, bool) = sqlx::query_as(
        "UPDATE users SET on_watchlist = NOT on_watchlist WHERE id = $1 RETURNING name, on_watchlist",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(MarketError::NotFound("User"))?;

    let change = if on_watchlist { "added to" } else { "removed from" };
    create_log(
        pool,
        actor,
        &format!("{} was {} the watchlist", name, change),
        LogTarget::User,
        Some(user_id.to_string()),
    )
    .await;
    Ok(on_watchlist)
}

/// Approves or rejects a dish. Rejections need a reason the seller can act on.
pub async fn review_dish(
    pool: &PgPool,
    actor: &User,
    dish_id: Uuid,
    status: ApprovalStatus,
    reason: Option<String>,
) -> Result<(), MarketError> {
    ensure_panel_access(actor)?;
    let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    if status == ApprovalStatus::Rejected && reason.is_none() {
        return Err(MarketError::Validation("Please give a reason for the rejection.".to_string()));
    }

    let dish = catalog::get_dish(pool, dish_id).await?;
    let patch = DishPatch {
        approval: Some((status, reason.clone())),
        ..DishPatch::default()
    };
    catalog::update_dish(pool, None, dish_id, &patch).await?;

    let mut action = format!("Marked dish \"{}\" as {}", dish.name, status);
    if let Some(reason) = &reason {
        action.push_str(&format!(": {}", reason));
    }
    create_log(pool, actor, &action, LogTarget::Dish, Some(dish_id.to_string())).await;
    Ok(())
}
