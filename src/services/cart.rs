use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::models::{ApprovalStatus, CartLine, Dish},
    error::MarketError,
    services::catalog,
};

/// Largest quantity of one dish a cart may hold.
pub const MAX_QUANTITY: i32 = 50;

/// Whether buyers may order `dish` right now. Mirrors the availability
/// column computed by [`cart_contents`].
pub fn is_orderable(dish: &Dish, seller_suspended: bool) -> bool {
    dish.is_available && dish.approval_status == ApprovalStatus::Approved && !seller_suspended
}

/// Adds `quantity` of a dish to the buyer's cart, on top of what is already there.
pub async fn add_to_cart(
    pool: &PgPool,
    buyer_id: i64,
    dish_id: Uuid,
    quantity: i32,
) -> Result<i32, MarketError> {
    if !(1..=MAX_QUANTITY).contains(&quantity) {
        return Err(MarketError::Validation(format!(
            "Quantity must be between 1 and {}.",
            MAX_QUANTITY
        )));
    }

    let dish = catalog::get_dish(pool, dish_id).await?;
    let seller_suspended: bool = sqlx::query_scalar("SELECT is_suspended FROM users WHERE id = $1")
        .bind(dish.seller_id)
        .fetch_optional(pool)
        .await?
        .unwrap_or(true);
    if !is_orderable(&dish, seller_suspended) {
        return Err(MarketError::Unavailable(dish.name));
    }
    if dish.seller_id == buyer_id {
        return Err(MarketError::Validation("You cannot order your own dish.".to_string()));
    }

    let total: i32 = sqlx::query_scalar(
        "INSERT INTO cart_items (buyer_id, dish_id, quantity) VALUES ($1, $2, $3) \
         ON CONFLICT (buyer_id, dish_id) DO UPDATE \
         SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $4) \
         RETURNING quantity",
    )
    .bind(buyer_id)
    .bind(dish_id)
    .bind(quantity)
    .bind(MAX_QUANTITY)
    .fetch_one(pool)
    .await?;

    log::info!("Buyer {} has {} x {} in cart", buyer_id, total, dish_id);
    Ok(total)
}

pub async fn remove_from_cart(pool: &PgPool, buyer_id: i64, dish_id: Uuid) -> Result<(), MarketError> {
    let result = sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1 AND dish_id = $2")
        .bind(buyer_id)
        .bind(dish_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(MarketError::NotFound("Cart item"));
    }
    Ok(())
}

pub async fn clear_cart(conn: &mut PgConnection, buyer_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM cart_items WHERE buyer_id = $1")
        .bind(buyer_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Cart lines joined with the current dish data.
pub async fn cart_contents(conn: &mut PgConnection, buyer_id: i64) -> Result<Vec<CartLine>, sqlx::Error> {
    sqlx::query_as::<_, CartLine>(
        "SELECT c.dish_id, d.seller_id, d.name, d.price, c.quantity, d.commission_percentage, \
         (d.is_available AND d.approval_status = 'approved' AND NOT u.is_suspended) AS is_available \
         FROM cart_items c \
         JOIN dishes d ON d.id = c.dish_id \
         JOIN users u ON u.id = d.seller_id \
         WHERE c.buyer_id = $1 ORDER BY c.added_at",
    )
    .bind(buyer_id)
    .fetch_all(conn)
    .await
}

pub fn cart_subtotal(lines: &[CartLine]) -> i64 {
    lines.iter().map(CartLine::line_total).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        fixtures,
        models::{Category, CommissionRate},
    };
    use chrono::Utc;

    #[test]
    fn subtotal_sums_line_totals() {
        let line = |price: i64, quantity: i32| CartLine {
            dish_id: Uuid::new_v4(),
            seller_id: 1,
            name: "Chicken Roll".to_string(),
            price,
            quantity,
            commission_percentage: CommissionRate::default(),
            is_available: true,
        };
        assert_eq!(cart_subtotal(&[line(12_000, 2), line(5_050, 1)]), 29_050);
        assert_eq!(cart_subtotal(&[]), 0);
    }

    fn dish() -> Dish {
        Dish {
            id: Uuid::new_v4(),
            seller_id: 3,
            name: "Mutton Kacchi".to_string(),
            description: String::new(),
            images: Vec::new(),
            price: 35_000,
            original_price: None,
            category: Category::Biryani,
            delivery_time: "30-45 min".to_string(),
            commission_percentage: CommissionRate::default(),
            tags: Vec::new(),
            rating: 5,
            is_available: true,
            approval_status: ApprovalStatus::Approved,
            approval_reason: None,
            view_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn suspended_sellers_dishes_are_not_orderable() {
        assert!(is_orderable(&dish(), false));
        assert!(!is_orderable(&dish(), true));
        assert!(!is_orderable(&Dish { is_available: false, ..dish() }, false));
        assert!(!is_orderable(
            &Dish {
                approval_status: ApprovalStatus::Rejected,
                ..dish()
            },
            false
        ));
    }

    #[sqlx::test(migrations = false)]
    #[ignore = "needs a Postgres DATABASE_URL"]
    async fn cart_refuses_dishes_of_suspended_sellers(pool: PgPool) {
        fixtures::schema(&pool).await;
        fixtures::user(&pool, 3, "seller", "free").await;
        fixtures::user(&pool, 20, "buyer", "free").await;
        let kacchi = fixtures::dish(&pool, 3, "Mutton Kacchi", 35_000, 10).await;

        assert_eq!(add_to_cart(&pool, 20, kacchi, 2).await.unwrap(), 2);
        assert_eq!(add_to_cart(&pool, 20, kacchi, 60).await.ok(), None);
        assert_eq!(add_to_cart(&pool, 20, kacchi, 49).await.unwrap(), MAX_QUANTITY);

        sqlx::query("UPDATE users SET is_suspended = TRUE WHERE id = 3")
            .execute(&pool)
            .await
            .unwrap();
        let refused = add_to_cart(&pool, 20, kacchi, 1).await;
        assert!(matches!(refused, Err(MarketError::Unavailable(name)) if name == "Mutton Kacchi"));
    }
}
