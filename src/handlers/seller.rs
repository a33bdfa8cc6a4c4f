use sqlx::PgPool;
use teloxide::{
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup},
};

use crate::{
    config::Settings,
    db::{
        self,
        models::{Category, CommissionRate, Dish, OrderStatus, Role, SellerPlan, User},
        Lookup,
    },
    error::MarketError,
    handlers::{cart::order_summary, current_user, reply, split_args},
    services::{
        catalog::{self, DishDraft, DishPatch},
        orders, pricing,
        stats::{self, SellerDashboard},
        users,
    },
    utils::{format_money, parse_money, short_id},
    MyDialogue, State,
};

/// Delivery estimate given to dishes created through the bot.
const DEFAULT_DELIVERY_TIME: &str = "30-45 min";

pub(crate) fn dashboard_text(dashboard: &SellerDashboard) -> String {
    let mut lines = vec![
        "📊 Seller dashboard".to_string(),
        String::new(),
        format!("Revenue (after commission): {}", format_money(dashboard.total_revenue)),
        format!("Orders: {}", dashboard.total_orders),
        format!("Average order: {}", format_money(dashboard.average_order_value)),
        format!("Pending orders: {}", dashboard.pending_orders),
    ];
    if !dashboard.monthly_sales.is_empty() {
        lines.push(String::new());
        lines.push("Monthly sales:".to_string());
        for month in &dashboard.monthly_sales {
            lines.push(format!("   {}: {}", month.month, format_money(month.sales)));
        }
    }
    lines.join("\n")
}

fn own_dish_line(dish: &Dish) -> String {
    let mut line = format!(
        "• {} — {} — {} — {} views  #{}",
        dish.name,
        format_money(dish.price),
        dish.approval_status,
        dish.view_count,
        short_id(dish.id)
    );
    if !dish.is_available {
        line.push_str("  (hidden)");
    }
    if let Some(reason) = &dish.approval_reason {
        line.push_str(&format!("\n   Reason: {}", reason));
    }
    line
}

fn parse_toggle(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "on" | "yes" | "true" | "available" => Some(true),
        "off" | "no" | "false" | "hidden" => Some(false),
        _ => None,
    }
}

async fn sell_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let shop_name = args.trim();
    if shop_name.is_empty() {
        return Err(MarketError::Validation("Usage: /sell <shop name>".to_string()));
    }
    let seller = users::become_seller(pool, user.id, shop_name).await?;
    Ok(format!(
        "🏪 {} is open! Add your first dish with /newdish.",
        seller.display_name()
    ))
}

pub async fn sell(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = sell_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn seller_only(pool: &PgPool, msg: &Message) -> Result<User, MarketError> {
    let user = current_user(pool, msg).await?;
    if user.role != Role::Seller {
        return Err(MarketError::Validation(
            "This is for sellers. Open a shop with /sell <shop name>.".to_string(),
        ));
    }
    Ok(user)
}

async fn dashboard_view(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let seller = seller_only(pool, msg).await?;
    let dashboard = stats::load_seller_dashboard(pool, seller.id).await?;
    let mut text = dashboard_text(&dashboard);
    let plan = match seller.plan_type {
        SellerPlan::Free => "Free (/upgrade for unlimited dishes)",
        SellerPlan::Pro => "Pro",
    };
    text.push_str(&format!("\n\nPlan: {}", plan));
    if seller.is_suspended {
        text.push_str("\n⚠️ Your account is suspended.");
    }
    Ok(text)
}

pub async fn dashboard(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = dashboard_view(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

async fn my_dishes_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let seller = seller_only(pool, msg).await?;
    let dishes = catalog::dishes_for_seller(pool, seller.id).await?;
    if dishes.is_empty() {
        return Ok("You have no dishes yet. Add one with /newdish.".to_string());
    }
    let body = dishes.iter().map(own_dish_line).collect::<Vec<_>>().join("\n");
    Ok(format!("Your dishes ({}):\n\n{}", dishes.len(), body))
}

pub async fn my_dishes(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = my_dishes_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

async fn incoming_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let seller = seller_only(pool, msg).await?;
    let orders = orders::orders_for_seller(pool, seller.id).await?;
    if orders.is_empty() {
        return Ok("No orders yet.".to_string());
    }
    let body = orders
        .iter()
        .map(|order| {
            format!(
                "{}\n   You receive: {}\n   Contact: {}",
                order_summary(order),
                format_money(pricing::seller_net(&order.items, seller.id)),
                order.contact
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    let open = orders.iter().filter(|order| !order.status.is_terminal()).count();
    Ok(format!(
        "Orders for your shop ({} open):\n\n{}\n\nUpdate one with /status <order id> <preparing|delivered|cancelled>",
        open, body
    ))
}

pub async fn incoming(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = incoming_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

async fn status_text(
    pool: &PgPool,
    msg: &Message,
    settings: &Settings,
    args: &str,
) -> Result<String, MarketError> {
    let actor = current_user(pool, msg).await?;
    let (id, status) = split_args(args);
    if id.is_empty() || status.is_empty() {
        return Err(MarketError::Validation(
            "Usage: /status <order id> <preparing|delivered|cancelled>".to_string(),
        ));
    }
    let next: OrderStatus = status.parse()?;
    let order_id = db::resolve_id(pool, Lookup::Orders, id).await?;
    let change = orders::update_order_status(pool, &actor, order_id, next, settings.suspension_threshold).await?;

    let mut text = format!(
        "Order #{}: {} → {}. The buyer has been notified.",
        short_id(change.order.id),
        change.previous,
        change.order.status
    );
    if change.suspended_sellers.contains(&actor.id) {
        text.push_str(&format!(
            "\n\n⚠️ You reached {} delivered orders on the free plan and your account is now suspended. Contact an admin.",
            settings.suspension_threshold
        ));
    }
    Ok(text)
}

pub async fn update_status(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    settings: Settings,
    args: String,
) -> Result<(), crate::Error> {
    let outcome = status_text(&pool, &msg, &settings, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn upload_allowed(pool: &PgPool, msg: &Message, settings: &Settings) -> Result<(), MarketError> {
    let seller = seller_only(pool, msg).await?;
    if seller.is_suspended {
        return Err(MarketError::Suspended);
    }
    if !catalog::can_upload(seller.plan_type, seller.product_upload_count, settings.free_plan_upload_limit) {
        return Err(MarketError::UploadLimit(settings.free_plan_upload_limit));
    }
    Ok(())
}

/// Starts the new dish conversation: name, price, category, commission, photo.
pub async fn start_new_dish(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    settings: Settings,
    dialogue: MyDialogue,
) -> Result<(), crate::Error> {
    if let Err(e) = upload_allowed(&pool, &msg, &settings).await {
        return reply(&bot, &msg, Err(e)).await;
    }
    bot.send_message(msg.chat.id, "What is the dish called? (/abort to stop)")
        .await?;
    dialogue.update(State::DishName).await?;
    Ok(())
}

pub async fn receive_dish_name(bot: Bot, msg: Message, dialogue: MyDialogue) -> Result<(), crate::Error> {
    match msg.text().map(str::trim) {
        Some(name) if !name.is_empty() => {
            bot.send_message(msg.chat.id, "Price in taka (e.g. 350 or 349.50):")
                .await?;
            dialogue
                .update(State::DishPrice {
                    name: name.to_string(),
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please send the dish name as text.")
                .await?;
        }
    }
    Ok(())
}

fn category_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(
        Category::ALL
            .chunks(2)
            .map(|row| {
                row.iter()
                    .map(|category| KeyboardButton::new(category.as_str()))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    )
    .resize_keyboard()
    .one_time_keyboard()
}

pub async fn receive_dish_price(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    name: String,
) -> Result<(), crate::Error> {
    match msg.text().and_then(parse_money).filter(|price| *price > 0) {
        Some(price) => {
            bot.send_message(msg.chat.id, "Pick a category:")
                .reply_markup(ReplyMarkup::Keyboard(category_keyboard()))
                .await?;
            dialogue.update(State::DishCategory { name, price }).await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Please send a price above zero, like 350.")
                .await?;
        }
    }
    Ok(())
}

fn commission_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![CommissionRate::ALLOWED
        .iter()
        .map(|percent| KeyboardButton::new(format!("{}%", percent)))
        .collect::<Vec<_>>()])
    .resize_keyboard()
    .one_time_keyboard()
}

pub async fn receive_dish_category(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    (name, price): (String, i64),
) -> Result<(), crate::Error> {
    match msg.text().and_then(Category::lookup) {
        Some(category) => {
            bot.send_message(
                msg.chat.id,
                "Platform commission for this dish? Higher commission dishes get more promotion.",
            )
            .reply_markup(ReplyMarkup::Keyboard(commission_keyboard()))
            .await?;
            dialogue
                .update(State::DishCommission { name, price, category })
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Please pick one of the categories.")
                .reply_markup(ReplyMarkup::Keyboard(category_keyboard()))
                .await?;
        }
    }
    Ok(())
}

pub async fn receive_dish_commission(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    (name, price, category): (String, i64, Category),
) -> Result<(), crate::Error> {
    match msg.text().and_then(|text| text.parse::<CommissionRate>().ok()) {
        Some(commission) => {
            bot.send_message(msg.chat.id, "Send a photo of the dish, or type skip.")
                .reply_markup(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()))
                .await?;
            dialogue
                .update(State::DishPhoto {
                    name,
                    price,
                    category,
                    commission,
                })
                .await?;
        }
        None => {
            bot.send_message(msg.chat.id, "Commission must be 5%, 7% or 10%.")
                .reply_markup(ReplyMarkup::Keyboard(commission_keyboard()))
                .await?;
        }
    }
    Ok(())
}

/// Largest size of the photo Telegram sent, if any.
fn photo_id(msg: &Message) -> Option<String> {
    msg.photo()
        .and_then(|sizes| sizes.last())
        .map(|size| size.file.id.to_string())
}

async fn create_dish(
    pool: &PgPool,
    msg: &Message,
    settings: &Settings,
    draft: DishDraft,
) -> Result<String, MarketError> {
    let seller = current_user(pool, msg).await?;
    let dish = catalog::add_dish(pool, seller.id, draft, settings.free_plan_upload_limit).await?;
    Ok(format!(
        "✅ {} is live at {}.\nID: {}\nAdd a description with /editdish {} description <text>",
        dish.name,
        format_money(dish.price),
        short_id(dish.id),
        short_id(dish.id)
    ))
}

pub async fn receive_dish_photo(
    bot: Bot,
    msg: Message,
    pool: PgPool,
    settings: Settings,
    dialogue: MyDialogue,
    (name, price, category, commission): (String, i64, Category, CommissionRate),
) -> Result<(), crate::Error> {
    let images = match (photo_id(&msg), msg.text()) {
        (Some(id), _) => vec![id],
        (None, Some(text)) if text.trim().eq_ignore_ascii_case("skip") => Vec::new(),
        _ => {
            bot.send_message(msg.chat.id, "Please send a photo, or type skip.")
                .await?;
            return Ok(());
        }
    };

    let draft = DishDraft {
        name,
        description: String::new(),
        price,
        original_price: None,
        category,
        delivery_time: DEFAULT_DELIVERY_TIME.to_string(),
        images,
        commission,
        tags: Vec::new(),
    };
    let outcome = create_dish(&pool, &msg, &settings, draft).await;
    dialogue.exit().await?;
    reply(&bot, &msg, outcome).await
}

async fn edit_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = current_user(pool, msg).await?;
    let (id, rest) = split_args(args);
    let (field, value) = split_args(rest);
    if id.is_empty() || field.is_empty() {
        return Err(MarketError::Validation(
            "Usage: /editdish <id> <name|description|price|original|category|time|commission|tags> <value>"
                .to_string(),
        ));
    }
    let patch = DishPatch::parse(field, value)?;
    let dish_id = db::resolve_id(pool, Lookup::Dishes, id).await?;
    let owner = match actor.role {
        Role::Admin | Role::Moderator => None,
        _ => Some(actor.id),
    };
    catalog::update_dish(pool, owner, dish_id, &patch).await?;
    Ok(format!("Dish #{} updated.", short_id(dish_id)))
}

pub async fn edit_dish(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = edit_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn availability_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let seller = seller_only(pool, msg).await?;
    let (id, toggle) = split_args(args);
    let available = parse_toggle(toggle)
        .filter(|_| !id.is_empty())
        .ok_or_else(|| MarketError::Validation("Usage: /available <dish id> <on|off>".to_string()))?;
    let dish_id = db::resolve_id(pool, Lookup::Dishes, id).await?;
    catalog::set_availability(pool, seller.id, dish_id, available).await?;
    let state = if available { "back on the menu" } else { "hidden from buyers" };
    Ok(format!("Dish #{} is {}.", short_id(dish_id), state))
}

pub async fn set_available(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = availability_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn delete_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let seller = seller_only(pool, msg).await?;
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /deletedish <dish id>".to_string()));
    }
    let dish_id = db::resolve_id(pool, Lookup::Dishes, args).await?;
    catalog::delete_dish(pool, seller.id, dish_id).await?;
    Ok(format!("Dish #{} deleted.", short_id(dish_id)))
}

pub async fn delete_dish(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = delete_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn upgrade_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if user.plan_type == SellerPlan::Pro {
        return Ok("You are already on the Pro plan.".to_string());
    }
    users::upgrade_plan(pool, user.id).await?;
    Ok("🎉 You are now on the Pro plan: unlimited dishes and no delivery cap.".to_string())
}

pub async fn upgrade(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = upgrade_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}
