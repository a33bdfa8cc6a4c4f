use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::Serialize;
use sqlx::PgPool;

use crate::{
    db::models::{Category, Dish, Order, OrderStatus, Role, User},
    error::MarketError,
    services::{catalog, orders, pricing, users},
    utils::month_label,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySales {
    pub month: String,
    pub sales: i64,
}

/// Sums amounts by the calendar month the order was placed in, oldest first.
fn by_month<'a>(entries: impl Iterator<Item = (&'a Order, i64)>) -> Vec<MonthlySales> {
    let mut months: BTreeMap<(i32, u32), MonthlySales> = BTreeMap::new();
    for (order, amount) in entries {
        let key = (order.created_at.year(), order.created_at.month());
        months
            .entry(key)
            .or_insert_with(|| MonthlySales {
                month: month_label(order.created_at),
                sales: 0,
            })
            .sales += amount;
    }
    months.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerDashboard {
    /// Net of commission, delivered orders only.
    pub total_revenue: i64,
    pub total_orders: usize,
    pub average_order_value: i64,
    /// Gross of the seller's items on delivered orders.
    pub monthly_sales: Vec<MonthlySales>,
    pub pending_orders: usize,
}

/// Dashboard numbers for `seller_id`, from orders already narrowed to that
/// seller's items.
pub fn seller_dashboard(seller_id: i64, orders: &[Order]) -> SellerDashboard {
    let delivered: Vec<&Order> = orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .collect();

    let total_revenue: i64 = delivered
        .iter()
        .map(|order| pricing::seller_net(&order.items, seller_id))
        .sum();
    let total_orders = orders.len();
    let average_order_value = if total_orders > 0 {
        total_revenue / total_orders as i64
    } else {
        0
    };

    let monthly_sales = by_month(delivered.iter().map(|order| {
        let gross: i64 = order
            .items
            .iter()
            .filter(|item| item.seller_id == seller_id)
            .map(|item| item.line_total())
            .sum();
        (*order, gross)
    }));

    SellerDashboard {
        total_revenue,
        total_orders,
        average_order_value,
        monthly_sales,
        pending_orders: orders
            .iter()
            .filter(|order| order.status == OrderStatus::Pending)
            .count(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SellerRevenue {
    pub seller_id: i64,
    pub name: String,
    pub revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminStats {
    /// Sum of delivered order totals.
    pub total_revenue: i64,
    pub total_orders: usize,
    pub total_dishes: usize,
    pub total_users: usize,
    pub sales_by_month: Vec<MonthlySales>,
    pub top_sellers: Vec<SellerRevenue>,
    pub category_distribution: Vec<(Category, usize)>,
}

pub const TOP_SELLERS: usize = 5;

pub fn admin_stats(all_orders: &[Order], dishes: &[Dish], all_users: &[User]) -> AdminStats {
    let delivered: Vec<&Order> = all_orders
        .iter()
        .filter(|order| order.status == OrderStatus::Delivered)
        .collect();

    let total_revenue = delivered.iter().map(|order| order.total).sum();
    let sales_by_month = by_month(delivered.iter().map(|order| (*order, order.total)));

    let mut seller_revenue: HashMap<i64, i64> = HashMap::new();
    for order in &delivered {
        for share in pricing::split_revenue(&order.items) {
            *seller_revenue.entry(share.seller_id).or_default() += share.seller_receives;
        }
    }

    let mut top_sellers: Vec<SellerRevenue> = all_users
        .iter()
        .filter(|user| user.role == Role::Seller)
        .map(|seller| SellerRevenue {
            seller_id: seller.id,
            name: seller.display_name().to_string(),
            revenue: seller_revenue.get(&seller.id).copied().unwrap_or(0),
        })
        .collect();
    top_sellers.sort_by(|a, b| b.revenue.cmp(&a.revenue).then(a.seller_id.cmp(&b.seller_id)));
    top_sellers.truncate(TOP_SELLERS);

    let mut categories: BTreeMap<Category, usize> = BTreeMap::new();
    for dish in dishes {
        *categories.entry(dish.category).or_default() += 1;
    }

    AdminStats {
        total_revenue,
        total_orders: all_orders.len(),
        total_dishes: dishes.len(),
        total_users: all_users.len(),
        sales_by_month,
        top_sellers,
        category_distribution: categories.into_iter().collect(),
    }
}

pub async fn load_admin_stats(pool: &PgPool) -> Result<AdminStats, MarketError> {
    let (all_orders, dishes, all_users) = tokio::try_join!(
        orders::all_orders(pool),
        catalog::all_dishes(pool),
        users::all_users(pool)
    )?;
    Ok(admin_stats(&all_orders, &dishes, &all_users))
}

pub async fn load_seller_dashboard(pool: &PgPool, seller_id: i64) -> Result<SellerDashboard, MarketError> {
    let seller_orders = orders::orders_for_seller(pool, seller_id).await?;
    Ok(seller_dashboard(seller_id, &seller_orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        ApprovalStatus, CommissionRate, DeliveryZone, OrderItem, SellerPlan,
    };
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn item(seller_id: i64, price: i64, quantity: i32, commission: u8) -> OrderItem {
        OrderItem {
            order_id: Uuid::nil(),
            dish_id: Uuid::new_v4(),
            seller_id,
            name: "Bhuna Khichuri".to_string(),
            price,
            quantity,
            commission_percentage: CommissionRate::new(commission).unwrap(),
        }
    }

    fn order(status: OrderStatus, month: u32, items: Vec<OrderItem>) -> Order {
        let subtotal: i64 = items.iter().map(OrderItem::line_total).sum();
        Order {
            id: Uuid::new_v4(),
            buyer_id: 1,
            status,
            delivery_zone: DeliveryZone::InsideRangpurCity,
            address: "Jahaj Company More".to_string(),
            contact: "01711000000".to_string(),
            subtotal,
            shipping_cost: 6_000,
            platform_fee: 0,
            seller_receives: 0,
            total: subtotal + 6_000,
            created_at: Utc.with_ymd_and_hms(2026, month, 10, 12, 0, 0).unwrap(),
            items,
        }
    }

    fn seller(id: i64, shop: &str) -> User {
        User {
            id,
            name: format!("seller {}", id),
            email: None,
            phone: None,
            role: Role::Seller,
            avatar: None,
            shop_name: Some(shop.to_string()),
            shop_address: None,
            plan_type: SellerPlan::Free,
            product_upload_count: 0,
            delivered_order_count: 0,
            is_suspended: false,
            on_watchlist: false,
            created_at: Utc::now(),
        }
    }

    fn dish(category: Category) -> Dish {
        Dish {
            id: Uuid::new_v4(),
            seller_id: 10,
            name: "Dish".to_string(),
            description: String::new(),
            images: Vec::new(),
            price: 10_000,
            original_price: None,
            category,
            delivery_time: "30-45 min".to_string(),
            commission_percentage: CommissionRate::default(),
            tags: Vec::new(),
            rating: 4,
            is_available: true,
            approval_status: ApprovalStatus::Approved,
            approval_reason: None,
            view_count: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn seller_dashboard_counts_only_delivered_revenue() {
        let orders = vec![
            order(OrderStatus::Delivered, 9, vec![item(10, 10_000, 2, 10)]),
            order(OrderStatus::Delivered, 10, vec![item(10, 5_000, 1, 5)]),
            order(OrderStatus::Pending, 10, vec![item(10, 50_000, 1, 5)]),
            order(OrderStatus::Cancelled, 10, vec![item(10, 7_000, 1, 5)]),
        ];

        let dashboard = seller_dashboard(10, &orders);
        // 200 tk - 10% + 50 tk - 5%
        assert_eq!(dashboard.total_revenue, 18_000 + 4_750);
        assert_eq!(dashboard.total_orders, 4);
        assert_eq!(dashboard.average_order_value, 22_750 / 4);
        assert_eq!(dashboard.pending_orders, 1);
        assert_eq!(
            dashboard.monthly_sales,
            vec![
                MonthlySales {
                    month: "Sep 2026".to_string(),
                    sales: 20_000
                },
                MonthlySales {
                    month: "Oct 2026".to_string(),
                    sales: 5_000
                },
            ]
        );
    }

    #[test]
    fn empty_dashboard_has_no_average() {
        let dashboard = seller_dashboard(10, &[]);
        assert_eq!(dashboard.average_order_value, 0);
        assert!(dashboard.monthly_sales.is_empty());
    }

    #[test]
    fn admin_stats_rank_sellers_and_count_categories() {
        let orders = vec![
            order(
                OrderStatus::Delivered,
                8,
                vec![item(10, 10_000, 1, 5), item(20, 30_000, 1, 10)],
            ),
            order(OrderStatus::Delivered, 9, vec![item(30, 1_000, 1, 5)]),
            order(OrderStatus::Pending, 9, vec![item(10, 99_000, 1, 5)]),
        ];
        let users = vec![seller(10, "Ruchi"), seller(20, "Kacchi Bhai"), seller(30, "Cha Ghor")];
        let dishes = vec![dish(Category::Pizza), dish(Category::Biryani), dish(Category::Pizza)];

        let stats = admin_stats(&orders, &dishes, &users);

        assert_eq!(stats.total_revenue, 46_000 + 7_000);
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.total_dishes, 3);
        assert_eq!(stats.total_users, 3);
        assert_eq!(
            stats.top_sellers.iter().map(|s| (s.seller_id, s.revenue)).collect::<Vec<_>>(),
            vec![(20, 27_000), (10, 9_500), (30, 950)]
        );
        assert_eq!(stats.top_sellers[0].name, "Kacchi Bhai");
        assert_eq!(
            stats.category_distribution,
            vec![(Category::Pizza, 2), (Category::Biryani, 1)]
        );
        assert_eq!(
            stats.sales_by_month.iter().map(|m| m.month.as_str()).collect::<Vec<_>>(),
            vec!["Aug 2026", "Sep 2026"]
        );
    }

    #[test]
    fn top_sellers_are_capped() {
        let users: Vec<User> = (1..=8).map(|id| seller(id, "Shop")).collect();
        let stats = admin_stats(&[], &[], &users);
        assert_eq!(stats.top_sellers.len(), TOP_SELLERS);
        assert!(stats.top_sellers.iter().all(|s| s.revenue == 0));
    }
}
