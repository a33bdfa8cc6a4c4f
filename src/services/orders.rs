//! Checkout and the seller order lifecycle.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::models::{DeliveryZone, NotificationType, Order, OrderItem, OrderStatus, Role, SellerPlan, User},
    error::MarketError,
    services::{
        cart,
        notifications::{self, NewNotification},
        pricing,
    },
    utils::{format_money, short_id},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutDetails {
    pub zone: DeliveryZone,
    pub address: String,
    pub contact: String,
}

impl CheckoutDetails {
    pub fn validate(&self) -> Result<(), MarketError> {
        if self.address.trim().len() < 5 {
            return Err(MarketError::Validation("Please enter a full delivery address.".to_string()));
        }
        let digits = self.contact.chars().filter(char::is_ascii_digit).count();
        if !(10..=15).contains(&digits) {
            return Err(MarketError::Validation("Please enter a valid phone number.".to_string()));
        }
        Ok(())
    }
}

/// Turns the buyer's cart into an order.
///
/// Dishes are snapshotted into line items so later price or commission
/// changes do not rewrite history. The cart is emptied and every seller on
/// the order gets a `new-order` notification in the same transaction.
///
/// Returns:
/// - `Ok(Order)` with its snapshotted items.
/// - `Err(MarketError::EmptyCart)` or `Err(MarketError::Unavailable)` when
///   the cart cannot be ordered; the cart is left untouched.
pub async fn checkout(pool: &PgPool, buyer_id: i64, details: CheckoutDetails) -> Result<Order, MarketError> {
    details.validate()?;

    let mut transaction = pool.begin().await?;

    let lines = cart::cart_contents(&mut transaction, buyer_id).await?;
    if lines.is_empty() {
        return Err(MarketError::EmptyCart);
    }
    if let Some(line) = lines.iter().find(|line| !line.is_available) {
        return Err(MarketError::Unavailable(line.name.clone()));
    }

    let order_id = Uuid::new_v4();
    let items: Vec<OrderItem> = lines
        .iter()
        .map(|line| OrderItem {
            order_id,
            dish_id: line.dish_id,
            seller_id: line.seller_id,
            name: line.name.clone(),
            price: line.price,
            quantity: line.quantity,
            commission_percentage: line.commission_percentage,
        })
        .collect();
    let totals = pricing::order_totals(&items, details.zone);

    let mut order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, buyer_id, status, delivery_zone, address, contact, subtotal, \
         shipping_cost, platform_fee, seller_receives, total) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
    )
    .bind(order_id)
    .bind(buyer_id)
    .bind(OrderStatus::Pending.as_str())
    .bind(details.zone.as_str())
    .bind(details.address.trim())
    .bind(details.contact.trim())
    .bind(totals.subtotal)
    .bind(totals.shipping_cost)
    .bind(totals.platform_fee)
    .bind(totals.seller_receives)
    .bind(totals.total)
    .fetch_one(&mut *transaction)
    .await?;

    for item in &items {
        sqlx::query(
            "INSERT INTO order_items (order_id, dish_id, seller_id, name, price, quantity, commission_percentage) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.order_id)
        .bind(item.dish_id)
        .bind(item.seller_id)
        .bind(&item.name)
        .bind(item.price)
        .bind(item.quantity)
        .bind(i32::from(item.commission_percentage.percent()))
        .execute(&mut *transaction)
        .await?;
    }
    order.items = items;

    cart::clear_cart(&mut transaction, buyer_id).await?;

    for share in pricing::split_revenue(&order.items) {
        let message = format!(
            "New order #{}: {} worth of your dishes, you receive {}.",
            short_id(order.id),
            format_money(share.gross),
            format_money(share.seller_receives)
        );
        notifications::notify(
            &mut transaction,
            NewNotification::new(share.seller_id, NotificationType::NewOrder, message).for_order(order.id),
        )
        .await?;
    }

    transaction.commit().await?;
    log::info!(
        "Buyer {} placed order {} ({} items, total {})",
        buyer_id,
        order.id,
        order.items.len(),
        order.total
    );
    Ok(order)
}

/// Who may move `order` into `next`.
///
/// Admins may always; a seller with items on the order may; the buyer may
/// only cancel while the order is still pending.
pub fn authorize_status_change(actor: &User, order: &Order, next: OrderStatus) -> Result<(), MarketError> {
    if actor.role == Role::Admin || order.involves_seller(actor.id) {
        return Ok(());
    }
    if actor.id == order.buyer_id && order.status == OrderStatus::Pending && next == OrderStatus::Cancelled {
        return Ok(());
    }
    Err(MarketError::Forbidden)
}

/// Whether a seller's delivered-order counter reaching `delivered` suspends them.
/// Pro sellers are never suspended; a threshold of zero disables suspension.
pub fn should_suspend(plan: SellerPlan, delivered: i32, threshold: i32) -> bool {
    plan == SellerPlan::Free && threshold > 0 && delivered >= threshold
}

pub fn status_message(order_id: Uuid, status: OrderStatus) -> String {
    format!("Your order #{} is now {}.", short_id(order_id), status)
}

#[derive(Debug)]
pub struct StatusChange {
    pub order: Order,
    pub previous: OrderStatus,
    pub suspended_sellers: Vec<i64>,
}

/// Moves an order to `next` and applies everything that hangs off it, all
/// in one transaction:
///
/// 1. the order row is locked, the actor authorized and the transition checked;
/// 2. the status is written;
/// 3. on delivery every seller on the order gets their delivered counter
///    bumped, and free-plan sellers crossing `suspension_threshold` are
///    suspended and told so;
/// 4. the buyer is notified of the new status.
///
/// Parameters:
/// - `actor`: The user asking for the change, checked with [`authorize_status_change`].
/// - `order_id`: The order to move.
/// - `next`: The requested status.
/// - `suspension_threshold`: Delivered orders after which a free-plan seller
///   is suspended; zero disables suspension.
///
/// Returns:
/// - `Ok(StatusChange)` with the updated order and any sellers suspended by it.
/// - `Err(MarketError)` when the order is missing, the actor may not move it,
///   the transition is not allowed, or a query fails. Nothing is written then.
pub async fn update_order_status(
    pool: &PgPool,
    actor: &User,
    order_id: Uuid,
    next: OrderStatus,
    suspension_threshold: i32,
) -> Result<StatusChange, MarketError> {
    let mut transaction = pool.begin().await?;

    let mut order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(order_id)
        .fetch_optional(&mut *transaction)
        .await?
        .ok_or(MarketError::NotFound("Order"))?;
    order.items = load_items(&mut transaction, &[order_id]).await?.remove(&order_id).unwrap_or_default();

    authorize_status_change(actor, &order, next)?;

    let previous = order.status;
    if !previous.can_transition_to(next) {
        return Err(MarketError::InvalidTransition { from: previous, to: next });
    }

    sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
        .bind(next.as_str())
        .bind(order_id)
        .execute(&mut *transaction)
        .await?;
    order.status = next;

    let mut suspended_sellers = Vec::new();
    if next == OrderStatus::Delivered {
        // seller_ids() is sorted, so concurrent deliveries lock users in the same order
        for seller_id in order.seller_ids() {
            if record_delivery(&mut transaction, seller_id, suspension_threshold).await? {
                suspended_sellers.push(seller_id);
            }
        }
    }

    notifications::notify(
        &mut transaction,
        NewNotification::new(order.buyer_id, NotificationType::OrderStatus, status_message(order_id, next))
            .for_order(order_id),
    )
    .await?;

    transaction.commit().await?;

    log::info!(
        "User {} moved order {} from {} to {}",
        actor.id,
        order_id,
        previous,
        next
    );
    for seller_id in &suspended_sellers {
        log::warn!("Seller {} suspended after reaching {} delivered orders", seller_id, suspension_threshold);
    }

    Ok(StatusChange {
        order,
        previous,
        suspended_sellers,
    })
}

/// Bumps a seller's delivered counter and suspends them when the rule says
/// so. Returns whether the seller was suspended by this call.
async fn record_delivery(conn: &mut PgConnection, seller_id: i64, threshold: i32) -> Result<bool, MarketError> {
    let row = sqlx::query_as::<_, (i32, String, bool)>(
        "UPDATE users SET delivered_order_count = delivered_order_count + 1 \
         WHERE id = $1 RETURNING delivered_order_count, plan_type, is_suspended",
    )
    .bind(seller_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((delivered, plan, already_suspended)) = row else {
        log::warn!("Seller {} no longer exists, skipping delivery count", seller_id);
        return Ok(false);
    };
    let plan: SellerPlan = plan.parse()?;

    if already_suspended || !should_suspend(plan, delivered, threshold) {
        return Ok(false);
    }

    sqlx::query("UPDATE users SET is_suspended = TRUE WHERE id = $1")
        .bind(seller_id)
        .execute(&mut *conn)
        .await?;

    let message = format!(
        "Your shop was suspended after {} delivered orders on the free plan. Upgrade with /upgrade and ask an admin to re-activate it.",
        delivered
    );
    notifications::notify(
        conn,
        NewNotification::new(seller_id, NotificationType::AccountSuspended, message),
    )
    .await?;
    Ok(true)
}

async fn load_items(conn: &mut PgConnection, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>, sqlx::Error> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY name",
    )
    .bind(order_ids)
    .fetch_all(conn)
    .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }
    Ok(by_order)
}

async fn with_items(pool: &PgPool, mut orders: Vec<Order>) -> Result<Vec<Order>, MarketError> {
    let ids: Vec<Uuid> = orders.iter().map(|order| order.id).collect();
    let mut conn = pool.acquire().await?;
    let mut items = load_items(&mut conn, &ids).await?;
    for order in &mut orders {
        order.items = items.remove(&order.id).unwrap_or_default();
    }
    Ok(orders)
}

pub async fn get_order(pool: &PgPool, order_id: Uuid) -> Result<Order, MarketError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(order_id)
        .fetch_optional(pool)
        .await?
        .ok_or(MarketError::NotFound("Order"))?;
    with_items(pool, vec![order])
        .await?
        .pop()
        .ok_or(MarketError::NotFound("Order"))
}

pub async fn orders_for_buyer(pool: &PgPool, buyer_id: i64) -> Result<Vec<Order>, MarketError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC",
    )
    .bind(buyer_id)
    .fetch_all(pool)
    .await?;
    with_items(pool, orders).await
}

/// Orders containing the seller's dishes, each narrowed to the seller's items.
pub async fn orders_for_seller(pool: &PgPool, seller_id: i64) -> Result<Vec<Order>, MarketError> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders o WHERE EXISTS \
         (SELECT 1 FROM order_items i WHERE i.order_id = o.id AND i.seller_id = $1) \
         ORDER BY o.created_at DESC",
    )
    .bind(seller_id)
    .fetch_all(pool)
    .await?;

    Ok(with_items(pool, orders)
        .await?
        .iter()
        .map(|order| order.for_seller(seller_id))
        .collect())
}

pub async fn all_orders(pool: &PgPool) -> Result<Vec<Order>, MarketError> {
    let orders = sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    with_items(pool, orders).await
}
