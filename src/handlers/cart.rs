use sqlx::PgPool;
use teloxide::{
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup},
};

use crate::{
    config::Settings,
    db::{
        self,
        models::{CartLine, DeliveryZone, Order, OrderStatus, User},
        Lookup,
    },
    error::MarketError,
    handlers::{current_user, reply, split_args},
    services::{
        cart,
        orders::{self, CheckoutDetails},
        pricing,
    },
    utils::{format_day, format_money, short_id},
    MyDialogue, State,
};

pub(crate) fn cart_text(lines: &[CartLine]) -> String {
    if lines.is_empty() {
        return "Your cart is empty. Browse /dishes to add something.".to_string();
    }
    let mut out = vec!["🛒 Your cart:".to_string(), String::new()];
    for line in lines {
        let mut entry = format!(
            "• {} x{} = {}  #{}",
            line.name,
            line.quantity,
            format_money(line.line_total()),
            short_id(line.dish_id)
        );
        if !line.is_available {
            entry.push_str("  (unavailable)");
        }
        out.push(entry);
    }
    out.push(String::new());
    out.push(format!("Subtotal: {}", format_money(cart::cart_subtotal(lines))));
    out.push("Shipping is added at /checkout.".to_string());
    out.join("\n")
}

/// Multi-line view of an order, as buyers, sellers and admins see it.
pub(crate) fn order_summary(order: &Order) -> String {
    let mut out = vec![format!(
        "📦 Order #{} | {} | {}",
        short_id(order.id),
        order.status,
        format_day(order.created_at)
    )];
    for item in &order.items {
        out.push(format!(
            "   {} x{} = {}",
            item.name,
            item.quantity,
            format_money(item.line_total())
        ));
    }
    out.push(format!(
        "   Subtotal {} + shipping {} = {}",
        format_money(order.subtotal),
        format_money(order.shipping_cost),
        format_money(order.total)
    ));
    out.push(format!("   Deliver to: {} ({})", order.address, order.delivery_zone.label()));
    out.join("\n")
}

fn zone_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(
        DeliveryZone::ALL
            .iter()
            .map(|zone| {
                vec![KeyboardButton::new(format!(
                    "{} ({})",
                    zone.label(),
                    format_money(pricing::shipping_cost(*zone))
                ))]
            })
            .collect::<Vec<_>>(),
    )
    .resize_keyboard()
    .one_time_keyboard()
}

/// Accepts a zone label with or without the price suffix the keyboard adds.
fn parse_zone(input: &str) -> Option<DeliveryZone> {
    let label = input.split(" (").next().unwrap_or(input);
    DeliveryZone::from_label(label)
}

async fn add_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let (id, quantity) = split_args(args);
    if id.is_empty() {
        return Err(MarketError::Validation("Usage: /add <dish id> [quantity]".to_string()));
    }
    let quantity = match quantity {
        "" => 1,
        raw => raw
            .parse()
            .map_err(|_| MarketError::Validation(format!("{} is not a quantity.", raw)))?,
    };
    let dish_id = db::resolve_id(pool, Lookup::Dishes, id).await?;
    let total = cart::add_to_cart(pool, user.id, dish_id, quantity).await?;
    Ok(format!("Added to cart. You now have {} of this dish. See /cart.", total))
}

pub async fn add(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = add_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn remove_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /remove <dish id>".to_string()));
    }
    let dish_id = db::resolve_id(pool, Lookup::Dishes, args).await?;
    cart::remove_from_cart(pool, user.id, dish_id).await?;
    Ok("Removed from cart.".to_string())
}

pub async fn remove(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = remove_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn cart_view(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let mut conn = pool.acquire().await?;
    let lines = cart::cart_contents(&mut conn, user.id).await?;
    Ok(cart_text(&lines))
}

pub async fn show_cart(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = cart_view(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

async fn checkout_cart(pool: &PgPool, msg: &Message) -> Result<Vec<CartLine>, MarketError> {
    let user = current_user(pool, msg).await?;
    let mut conn = pool.acquire().await?;
    let lines = cart::cart_contents(&mut conn, user.id).await?;
    if lines.is_empty() {
        return Err(MarketError::EmptyCart);
    }
    Ok(lines)
}

/// Starts the checkout conversation: zone, then address, then phone number.
pub async fn start_checkout(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    dialogue: MyDialogue,
) -> Result<(), crate::Error> {
    match checkout_cart(&pool, &msg).await {
        Ok(lines) => {
            log::info!("Checkout started in chat {}", msg.chat.id);
            bot.send_message(
                msg.chat.id,
                format!(
                    "Subtotal: {}\nWhere should we deliver? Choose a zone (/abort to stop):",
                    format_money(cart::cart_subtotal(&lines))
                ),
            )
            .reply_markup(ReplyMarkup::Keyboard(zone_keyboard()))
            .await?;
            dialogue.update(State::CheckoutZone).await?;
            Ok(())
        }
        Err(e) => reply(&bot, &msg, Err(e)).await,
    }
}

pub async fn receive_zone(bot: Bot, msg: Message, dialogue: MyDialogue) -> Result<(), crate::Error> {
    match msg.text().and_then(parse_zone) {
        Some(zone) => {
            bot.send_message(msg.chat.id, "Send your full delivery address:")
                .reply_markup(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()))
                .await?;
            dialogue.update(State::CheckoutAddress { zone }).await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Please pick one of the delivery zones.")
                .reply_markup(ReplyMarkup::Keyboard(zone_keyboard()))
                .await?;
        }
    }
    Ok(())
}

pub async fn receive_address(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    zone: DeliveryZone,
) -> Result<(), crate::Error> {
    match msg.text().map(str::trim) {
        Some(address) if address.len() >= 5 => {
            bot.send_message(msg.chat.id, "And a phone number we can call:")
                .await?;
            dialogue
                .update(State::CheckoutContact {
                    zone,
                    address: address.to_string(),
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please enter a full delivery address.")
                .await?;
        }
    }
    Ok(())
}

async fn place_order(pool: &PgPool, msg: &Message, details: CheckoutDetails) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let order = orders::checkout(pool, user.id, details).await?;
    log::info!("Buyer {} placed order {}", user.id, order.id);
    Ok(format!(
        "✅ Order placed!\n\n{}\n\nTrack it with /orders.",
        order_summary(&order)
    ))
}

pub async fn receive_contact(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    dialogue: MyDialogue,
    (zone, address): (DeliveryZone, String),
) -> Result<(), crate::Error> {
    let Some(contact) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send your phone number as text.")
            .await?;
        return Ok(());
    };

    let details = CheckoutDetails {
        zone,
        address,
        contact: contact.trim().to_string(),
    };
    if let Err(e) = details.validate() {
        return reply(&bot, &msg, Err(e)).await;
    }

    let outcome = place_order(&pool, &msg, details).await;
    dialogue.exit().await?;
    reply(&bot, &msg, outcome).await
}

async fn orders_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let orders = orders::orders_for_buyer(pool, user.id).await?;
    if orders.is_empty() {
        return Ok("You have no orders yet.".to_string());
    }
    let body = orders.iter().map(order_summary).collect::<Vec<_>>().join("\n\n");
    Ok(format!("Your orders:\n\n{}", body))
}

pub async fn my_orders(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = orders_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

/// The order as `viewer` may see it: buyers and staff see everything, a
/// seller only their own items.
pub(crate) fn visible_order(order: &Order, viewer: &User) -> Option<Order> {
    if viewer.id == order.buyer_id || viewer.role.can_access_admin_panel() {
        Some(order.clone())
    } else if order.involves_seller(viewer.id) {
        Some(order.for_seller(viewer.id))
    } else {
        None
    }
}

async fn order_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /order <order id>".to_string()));
    }
    let order_id = db::resolve_id(pool, Lookup::Orders, args).await?;
    let order = orders::get_order(pool, order_id).await?;
    let order = visible_order(&order, &user).ok_or(MarketError::NotFound("Order"))?;
    Ok(format!("{}\n   Contact: {}", order_summary(&order), order.contact))
}

pub async fn show_order(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = order_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn cancel_text(
    pool: &PgPool,
    msg: &Message,
    settings: &Settings,
    args: &str,
) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /cancel <order id>".to_string()));
    }
    let order_id = db::resolve_id(pool, Lookup::Orders, args).await?;
    let change = orders::update_order_status(
        pool,
        &user,
        order_id,
        OrderStatus::Cancelled,
        settings.suspension_threshold,
    )
    .await?;
    Ok(format!("Order #{} cancelled.", short_id(change.order.id)))
}

pub async fn cancel(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    settings: Settings,
    args: String,
) -> Result<(), crate::Error> {
    let outcome = cancel_text(&pool, &msg, &settings, &args).await;
    reply(&bot, &msg, outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{CommissionRate, OrderItem, Role, SellerPlan};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn zones_parse_from_keyboard_buttons() {
        assert_eq!(
            parse_zone("Rangpur Division (৳100.00)"),
            Some(DeliveryZone::RangpurDivision)
        );
        assert_eq!(parse_zone("outside rangpur"), Some(DeliveryZone::OutsideRangpur));
        assert_eq!(parse_zone("Dhaka"), None);
    }

    #[test]
    fn cart_text_flags_unavailable_lines() {
        let lines = vec![
            CartLine {
                dish_id: Uuid::nil(),
                seller_id: 2,
                name: "Kacchi".to_string(),
                price: 35_000,
                quantity: 2,
                commission_percentage: CommissionRate::default(),
                is_available: true,
            },
            CartLine {
                dish_id: Uuid::nil(),
                seller_id: 3,
                name: "Borhani".to_string(),
                price: 6_000,
                quantity: 1,
                commission_percentage: CommissionRate::default(),
                is_available: false,
            },
        ];
        let text = cart_text(&lines);
        assert!(text.contains("• Kacchi x2 = ৳700.00"));
        assert!(text.contains("Borhani x1 = ৳60.00  #000000  (unavailable)"));
        assert!(text.contains("Subtotal: ৳760.00"));
    }

    #[test]
    fn empty_cart_points_to_the_catalog() {
        assert!(cart_text(&[]).contains("/dishes"));
    }

    #[test]
    fn order_summary_lists_items_and_totals() {
        let order_id = Uuid::nil();
        let order = Order {
            id: order_id,
            buyer_id: 1,
            status: OrderStatus::Preparing,
            delivery_zone: DeliveryZone::InsideRangpurCity,
            address: "House 4, Jail Road".to_string(),
            contact: "01700000000".to_string(),
            subtotal: 35_000,
            shipping_cost: 6_000,
            platform_fee: 1_750,
            seller_receives: 33_250,
            total: 41_000,
            created_at: Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
            items: vec![OrderItem {
                order_id,
                dish_id: Uuid::nil(),
                seller_id: 2,
                name: "Kacchi".to_string(),
                price: 35_000,
                quantity: 1,
                commission_percentage: CommissionRate::default(),
            }],
        };
        let summary = order_summary(&order);
        assert!(summary.starts_with("📦 Order #000000 | Preparing | 16 Oct 2026"));
        assert!(summary.contains("Kacchi x1 = ৳350.00"));
        assert!(summary.contains("Subtotal ৳350.00 + shipping ৳60.00 = ৳410.00"));
        assert!(summary.contains("(Inside Rangpur City)"));
    }

    #[test]
    fn sellers_only_see_their_part_of_an_order() {
        let order_id = Uuid::new_v4();
        let item = |seller_id: i64, name: &str| OrderItem {
            order_id,
            dish_id: Uuid::new_v4(),
            seller_id,
            name: name.to_string(),
            price: 10_000,
            quantity: 1,
            commission_percentage: CommissionRate::default(),
        };
        let order = Order {
            id: order_id,
            buyer_id: 1,
            status: OrderStatus::Pending,
            delivery_zone: DeliveryZone::RangpurDivision,
            address: "Modern More, Rangpur".to_string(),
            contact: "01800000000".to_string(),
            subtotal: 20_000,
            shipping_cost: 10_000,
            platform_fee: 1_000,
            seller_receives: 19_000,
            total: 30_000,
            created_at: Utc::now(),
            items: vec![item(2, "Kacchi"), item(3, "Firni")],
        };
        let viewer = |id: i64, role: Role| User {
            id,
            name: "viewer".to_string(),
            email: None,
            phone: None,
            role,
            avatar: None,
            shop_name: None,
            shop_address: None,
            plan_type: SellerPlan::Free,
            product_upload_count: 0,
            delivered_order_count: 0,
            is_suspended: false,
            on_watchlist: false,
            created_at: Utc::now(),
        };

        assert_eq!(visible_order(&order, &viewer(1, Role::Buyer)).unwrap().items.len(), 2);
        assert_eq!(visible_order(&order, &viewer(9, Role::Moderator)).unwrap().items.len(), 2);
        let seller_view = visible_order(&order, &viewer(3, Role::Seller)).unwrap();
        assert_eq!(seller_view.items.len(), 1);
        assert_eq!(seller_view.items[0].name, "Firni");
        assert!(visible_order(&order, &viewer(4, Role::Buyer)).is_none());
    }
}
