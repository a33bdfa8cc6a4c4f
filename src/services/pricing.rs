//! Shipping, commission and revenue arithmetic. All amounts are paisa.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::db::models::{DeliveryZone, OrderItem};

pub fn shipping_cost(zone: DeliveryZone) -> i64 {
    match zone {
        DeliveryZone::InsideRangpurCity => 6_000,
        DeliveryZone::RangpurDivision => 10_000,
        DeliveryZone::OutsideRangpur => 15_000,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub platform_fee: i64,
    pub seller_receives: i64,
    pub total: i64,
}

/// Totals stored on an order: the buyer pays `subtotal + shipping`, the
/// platform keeps the commission on every line and sellers share the rest.
pub fn order_totals(items: &[OrderItem], zone: DeliveryZone) -> OrderTotals {
    let shares = split_revenue(items);
    let subtotal = shares.iter().map(|s| s.gross).sum();
    let platform_fee = shares.iter().map(|s| s.platform_fee).sum();
    let shipping_cost = shipping_cost(zone);

    OrderTotals {
        subtotal,
        shipping_cost,
        platform_fee,
        seller_receives: subtotal - platform_fee,
        total: subtotal + shipping_cost,
    }
}

/// What one seller earns from an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SellerShare {
    pub seller_id: i64,
    pub gross: i64,
    pub platform_fee: i64,
    pub seller_receives: i64,
}

/// Splits line items per seller, ordered by seller id. The commission is
/// applied per line item with that line's own rate.
pub fn split_revenue(items: &[OrderItem]) -> Vec<SellerShare> {
    let mut shares: BTreeMap<i64, SellerShare> = BTreeMap::new();
    for item in items {
        let gross = item.line_total();
        let fee = item.commission_percentage.fee_on(gross);
        let share = shares.entry(item.seller_id).or_insert(SellerShare {
            seller_id: item.seller_id,
            gross: 0,
            platform_fee: 0,
            seller_receives: 0,
        });
        share.gross += gross;
        share.platform_fee += fee;
        share.seller_receives += gross - fee;
    }
    shares.into_values().collect()
}

/// Net amount `seller_id` receives from `items`.
pub fn seller_net(items: &[OrderItem], seller_id: i64) -> i64 {
    split_revenue(items)
        .into_iter()
        .find(|share| share.seller_id == seller_id)
        .map(|share| share.seller_receives)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::CommissionRate;
    use uuid::Uuid;

    fn item(seller_id: i64, price: i64, quantity: i32, commission: u8) -> OrderItem {
        OrderItem {
            order_id: Uuid::nil(),
            dish_id: Uuid::new_v4(),
            seller_id,
            name: format!("dish of {}", seller_id),
            price,
            quantity,
            commission_percentage: CommissionRate::new(commission).unwrap(),
        }
    }

    #[test]
    fn splits_revenue_across_sellers_with_their_own_rates() {
        let items = vec![
            item(2, 20_000, 2, 10), // 400 tk, fee 40 tk
            item(1, 15_000, 1, 5),  // 150 tk, fee 7.50 tk
            item(2, 5_000, 1, 7),   // 50 tk, fee 3.50 tk
        ];

        let shares = split_revenue(&items);
        assert_eq!(
            shares,
            vec![
                SellerShare {
                    seller_id: 1,
                    gross: 15_000,
                    platform_fee: 750,
                    seller_receives: 14_250,
                },
                SellerShare {
                    seller_id: 2,
                    gross: 45_000,
                    platform_fee: 4_350,
                    seller_receives: 40_650,
                },
            ]
        );
        assert_eq!(seller_net(&items, 2), 40_650);
        assert_eq!(seller_net(&items, 99), 0);
    }

    #[test]
    fn order_totals_add_shipping_for_the_zone() {
        let items = vec![item(1, 25_000, 2, 5)];
        let totals = order_totals(&items, DeliveryZone::RangpurDivision);

        assert_eq!(totals.subtotal, 50_000);
        assert_eq!(totals.platform_fee, 2_500);
        assert_eq!(totals.seller_receives, 47_500);
        assert_eq!(totals.shipping_cost, 10_000);
        assert_eq!(totals.total, 60_000);
    }

    #[test]
    fn shipping_grows_with_distance() {
        assert!(
            shipping_cost(DeliveryZone::InsideRangpurCity)
                < shipping_cost(DeliveryZone::RangpurDivision)
        );
        assert!(
            shipping_cost(DeliveryZone::RangpurDivision) < shipping_cost(DeliveryZone::OutsideRangpur)
        );
    }

    #[test]
    fn empty_orders_only_cost_shipping() {
        let totals = order_totals(&[], DeliveryZone::InsideRangpurCity);
        assert_eq!(totals.subtotal, 0);
        assert_eq!(totals.platform_fee, 0);
        assert_eq!(totals.total, 6_000);
    }
}
