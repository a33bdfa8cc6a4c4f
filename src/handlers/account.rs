use sqlx::PgPool;
use teloxide::{
    prelude::*,
    types::{KeyboardButton, KeyboardMarkup, ParseMode, ReplyMarkup},
    utils::command::BotCommands,
};

use crate::{
    config::Settings,
    db::{
        self,
        models::{Notification, Role, User},
        Lookup,
    },
    error::MarketError,
    handlers::{current_user, reply, sender_id},
    services::{
        notifications,
        users::{self, ProfilePatch},
    },
    utils::{escape_markdown, format_date, short_id},
    Command,
};

pub const BUTTON_DISHES: &str = "🍽 Browse Dishes";
pub const BUTTON_CART: &str = "🛒 My Cart";
pub const BUTTON_ORDERS: &str = "📦 My Orders";
pub const BUTTON_NOTIFICATIONS: &str = "🔔 Notifications";
pub const BUTTON_DASHBOARD: &str = "📊 Dashboard";
pub const BUTTON_ADMIN: &str = "🛠 Admin Panel";
pub const BUTTON_HELP: &str = "❓ Help";

/// Main menu keyboard; sellers and staff get their extra entry.
pub(crate) fn menu_keyboard(role: Role) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new(BUTTON_DISHES), KeyboardButton::new(BUTTON_CART)],
        vec![KeyboardButton::new(BUTTON_ORDERS), KeyboardButton::new(BUTTON_NOTIFICATIONS)],
    ];
    match role {
        Role::Seller => rows.push(vec![KeyboardButton::new(BUTTON_DASHBOARD)]),
        Role::Admin | Role::Moderator => rows.push(vec![KeyboardButton::new(BUTTON_ADMIN)]),
        Role::Buyer => {}
    }
    rows.push(vec![KeyboardButton::new(BUTTON_HELP)]);
    KeyboardMarkup::new(rows).resize_keyboard()
}

fn welcome_text(user: &User, created: bool) -> String {
    let greeting = if created {
        format!("Welcome to Chef's BD, {}! 🍛", user.name)
    } else {
        format!("Welcome back, {}!", user.name)
    };
    let hint = match user.role {
        Role::Buyer => "Browse home-cooked food with /dishes, or open your own shop with /sell <shop name>.",
        Role::Seller => "Manage your shop with /dashboard, /mydishes and /incoming.",
        Role::Admin | Role::Moderator => "Open the admin panel with /admin.",
    };
    format!("{}\n\n{}", greeting, hint)
}

pub async fn start(bot: Bot, msg: Message, pool: PgPool, settings: Settings) -> Result<(), crate::Error> {
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let name = from.full_name();

    match users::register(&pool, from.id.0 as i64, &name, &settings).await {
        Ok((user, created)) => {
            bot.send_message(msg.chat.id, welcome_text(&user, created))
                .reply_markup(ReplyMarkup::Keyboard(menu_keyboard(user.role)))
                .await?;
            Ok(())
        }
        Err(e) => reply(&bot, &msg, Err(e)).await,
    }
}

pub async fn help(bot: Bot, msg: Message) -> Result<(), crate::Error> {
    let help_text = format!(
        "*Chef's BD Help*\n\n{}\n\nIds can be shortened to their first 6 characters\\.",
        escape_markdown(&Command::descriptions().to_string())
    );
    bot.send_message(msg.chat.id, help_text)
        .parse_mode(ParseMode::MarkdownV2)
        .await?;
    Ok(())
}

pub async fn menu(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    match current_user(&pool, &msg).await {
        Ok(user) => {
            bot.send_message(msg.chat.id, "What would you like to do?")
                .reply_markup(ReplyMarkup::Keyboard(menu_keyboard(user.role)))
                .await?;
            Ok(())
        }
        Err(e) => reply(&bot, &msg, Err(e)).await,
    }
}

pub(crate) fn profile_text(user: &User) -> String {
    let unset = "-";
    let mut lines = vec![
        "👤 Your profile".to_string(),
        String::new(),
        format!("Name: {}", user.name),
        format!("Email: {}", user.email.as_deref().unwrap_or(unset)),
        format!("Phone: {}", user.phone.as_deref().unwrap_or(unset)),
        format!("Role: {}", user.role),
    ];
    if user.role == Role::Seller {
        lines.push(format!("Shop: {}", user.shop_name.as_deref().unwrap_or(unset)));
        lines.push(format!("Address: {}", user.shop_address.as_deref().unwrap_or(unset)));
        lines.push(format!("Plan: {}", user.plan_type));
        lines.push(format!("Dishes uploaded: {}", user.product_upload_count));
    }
    lines.push(format!("Member since: {}", format_date(user.created_at.date_naive())));
    lines.push(String::new());
    lines.push("Change a field with /profile <name|email|phone|shop|address> <value>".to_string());
    lines.join("\n")
}

async fn profile_view(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if args.trim().is_empty() {
        return Ok(profile_text(&user));
    }
    let patch = ProfilePatch::parse(args)?;
    users::update_profile(pool, user.id, &patch).await?;
    let updated = users::get_user(pool, user.id).await?;
    Ok(format!("Profile updated.\n\n{}", profile_text(&updated)))
}

pub async fn profile(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = profile_view(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

fn notification_line(notification: &Notification) -> String {
    let marker = if notification.is_read { " " } else { "•" };
    format!(
        "{} {}  #{}",
        marker,
        notifications::render(notification),
        short_id(notification.id)
    )
}

async fn notifications_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    let unread_only = args.trim().eq_ignore_ascii_case("unread");
    let (items, unread) = tokio::try_join!(
        notifications::list_for_user(pool, user.id, unread_only),
        notifications::unread_count(pool, user.id)
    )?;
    if items.is_empty() {
        return Ok("No notifications.".to_string());
    }
    let body = items.iter().map(notification_line).collect::<Vec<_>>().join("\n");
    Ok(format!(
        "🔔 Notifications ({} unread):\n\n{}\n\nMark one read with /read <id>, or all with /readall.",
        unread, body
    ))
}

pub async fn list_notifications(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = notifications_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn read_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let user = current_user(pool, msg).await?;
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /read <notification id>".to_string()));
    }
    let id = db::resolve_id(pool, Lookup::Notifications, args).await?;
    if notifications::mark_read(pool, user.id, id).await? {
        Ok("Marked as read.".to_string())
    } else {
        Err(MarketError::NotFound("Notification"))
    }
}

pub async fn mark_read(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = read_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn read_all_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    let user_id = sender_id(msg).ok_or(MarketError::NotRegistered)?;
    let count = notifications::mark_all_read(pool, user_id).await?;
    Ok(format!("Marked {} notification(s) as read.", count))
}

pub async fn mark_all_read(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = read_all_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}
