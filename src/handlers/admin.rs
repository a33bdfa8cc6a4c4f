use chrono::Utc;
use sqlx::PgPool;
use teloxide::{prelude::*, types::InputFile};

use crate::{
    db::{
        self,
        models::{AdminLog, ApprovalStatus, Dish, User},
        Lookup,
    },
    error::MarketError,
    handlers::{cart::order_summary, catalog::dish_line, current_user, parse_user_id, reply, split_args},
    services::{
        admin, catalog, orders,
        reports::{self, ExportFormat, ExportKind, Report},
        stats::{self, AdminStats},
        users,
    },
    utils::{format_day, format_money, paginate, short_id},
};

/// Rows per page in the panel listings.
const PER_PAGE: usize = 10;

async fn staff(pool: &PgPool, msg: &Message) -> Result<User, MarketError> {
    let actor = current_user(pool, msg).await?;
    admin::ensure_panel_access(&actor)?;
    Ok(actor)
}

/// A bare number selects a page; anything else is a search term.
fn page_or_term(args: &str) -> (usize, &str) {
    let args = args.trim();
    match args.parse::<usize>() {
        Ok(page) => (page, ""),
        Err(_) => (1, args),
    }
}

fn page_footer(page: usize, pages: usize, command: &str) -> String {
    if pages > 1 {
        format!("\n\nPage {} of {}. Next: /{} {}", page.min(pages), pages, command, (page + 1).min(pages))
    } else {
        String::new()
    }
}

pub(crate) fn stats_text(stats: &AdminStats) -> String {
    let mut lines = vec![
        "🛠 Admin panel".to_string(),
        String::new(),
        format!("Revenue (delivered): {}", format_money(stats.total_revenue)),
        format!("Orders: {}", stats.total_orders),
        format!("Dishes: {}", stats.total_dishes),
        format!("Users: {}", stats.total_users),
    ];
    if !stats.sales_by_month.is_empty() {
        lines.push(String::new());
        lines.push("Sales by month:".to_string());
        for month in &stats.sales_by_month {
            lines.push(format!("   {}: {}", month.month, format_money(month.sales)));
        }
    }
    if !stats.top_sellers.is_empty() {
        lines.push(String::new());
        lines.push("Top sellers:".to_string());
        for (rank, seller) in stats.top_sellers.iter().enumerate() {
            lines.push(format!(
                "   {}. {} ({}) {}",
                rank + 1,
                seller.name,
                seller.seller_id,
                format_money(seller.revenue)
            ));
        }
    }
    if !stats.category_distribution.is_empty() {
        lines.push(String::new());
        lines.push("Dishes by category:".to_string());
        for (category, count) in &stats.category_distribution {
            lines.push(format!("   {}: {}", category, count));
        }
    }
    lines.push(String::new());
    lines.push("/users /allorders /alldishes /logs /export".to_string());
    lines.join("\n")
}

async fn panel_text(pool: &PgPool, msg: &Message) -> Result<String, MarketError> {
    staff(pool, msg).await?;
    let stats = stats::load_admin_stats(pool).await?;
    Ok(stats_text(&stats))
}

pub async fn panel(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = panel_text(&pool, &msg).await;
    reply(&bot, &msg, outcome).await
}

fn user_line(user: &User) -> String {
    let mut flags = Vec::new();
    if user.is_suspended {
        flags.push("suspended");
    }
    if user.on_watchlist {
        flags.push("watchlist");
    }
    let mut line = format!(
        "• {} ({}) {} | {}",
        user.display_name(),
        user.id,
        user.role,
        user.email.as_deref().unwrap_or("-")
    );
    if !flags.is_empty() {
        line.push_str(&format!(" [{}]", flags.join(", ")));
    }
    line
}

async fn users_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    staff(pool, msg).await?;
    let (page, term) = page_or_term(args);
    let everyone = users::all_users(pool).await?;
    let matches = users::search_users(&everyone, term);
    if matches.is_empty() {
        return Ok("No users found.".to_string());
    }
    let (shown, pages) = paginate(&matches, page, PER_PAGE);
    let body = shown.iter().map(|user| user_line(user)).collect::<Vec<_>>().join("\n");
    Ok(format!(
        "Users ({}):\n\n{}{}",
        matches.len(),
        body,
        page_footer(page, pages, "users")
    ))
}

pub async fn list_users(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = users_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn all_orders_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    staff(pool, msg).await?;
    let (page, _) = page_or_term(args);
    let all = orders::all_orders(pool).await?;
    if all.is_empty() {
        return Ok("No orders yet.".to_string());
    }
    let (shown, pages) = paginate(&all, page, PER_PAGE);
    let body = shown
        .iter()
        .map(|order| format!("{}\n   Buyer: {}", order_summary(order), order.buyer_id))
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(format!(
        "All orders ({}):\n\n{}{}",
        all.len(),
        body,
        page_footer(page, pages, "allorders")
    ))
}

pub async fn list_orders(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = all_orders_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

/// Dishes whose name or category contains `term`, ignoring case.
fn search_dishes<'a>(dishes: &'a [Dish], term: &str) -> Vec<&'a Dish> {
    let term = term.trim().to_lowercase();
    dishes
        .iter()
        .filter(|dish| {
            term.is_empty()
                || dish.name.to_lowercase().contains(&term)
                || dish.category.as_str().to_lowercase().contains(&term)
        })
        .collect()
}

async fn all_dishes_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    staff(pool, msg).await?;
    let (page, term) = page_or_term(args);
    let all = catalog::all_dishes(pool).await?;
    let matches = search_dishes(&all, term);
    if matches.is_empty() {
        return Ok("No dishes found.".to_string());
    }
    let (shown, pages) = paginate(&matches, page, PER_PAGE);
    let body = shown
        .iter()
        .map(|dish| format!("{} [{}] seller {}", dish_line(dish), dish.approval_status, dish.seller_id))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!(
        "All dishes ({}):\n\n{}{}",
        matches.len(),
        body,
        page_footer(page, pages, "alldishes")
    ))
}

pub async fn list_dishes(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = all_dishes_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

fn log_line(entry: &AdminLog) -> String {
    let target = match &entry.target_id {
        Some(id) => format!("{} {}", entry.target_type, id),
        None => entry.target_type.to_string(),
    };
    format!(
        "{} {}: {} ({})",
        format_day(entry.timestamp),
        entry.admin_name,
        entry.action,
        target
    )
}

fn logs_page(logs: &[AdminLog], page: usize) -> String {
    if logs.is_empty() {
        return "No admin activity yet.".to_string();
    }
    let (shown, pages) = paginate(logs, page, PER_PAGE);
    let body = shown.iter().map(log_line).collect::<Vec<_>>().join("\n");
    format!(
        "Admin activity ({}):\n\n{}{}",
        logs.len(),
        body,
        page_footer(page, pages, "logs")
    )
}

async fn logs_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let (page, _) = page_or_term(args);
    let logs = admin::list_logs(pool, &actor).await?;
    Ok(logs_page(&logs, page))
}

pub async fn list_logs(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = logs_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn delete_user_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let target_id = parse_user_id(args)?;
    if target_id == actor.id {
        return Err(MarketError::Validation("You cannot delete yourself.".to_string()));
    }
    let deleted = admin::delete_user(pool, &actor, target_id).await?;
    Ok(format!("Deleted {} ({}).", deleted.display_name(), deleted.id))
}

pub async fn delete_user(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = delete_user_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn remove_dish_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let dish_id = db::resolve_id(pool, Lookup::Dishes, args).await?;
    let name = admin::delete_dish(pool, &actor, dish_id).await?;
    Ok(format!("Removed dish \"{}\".", name))
}

pub async fn remove_dish(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = remove_dish_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn activate_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let seller_id = parse_user_id(args)?;
    let name = admin::activate_seller(pool, &actor, seller_id).await?;
    Ok(format!("{} is active again and has been notified.", name))
}

pub async fn activate(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = activate_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn watch_text(pool: &PgPool, msg: &Message, args: &str) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let user_id = parse_user_id(args)?;
    let watched = admin::toggle_watchlist(pool, &actor, user_id).await?;
    Ok(if watched {
        format!("User {} added to the watchlist.", user_id)
    } else {
        format!("User {} removed from the watchlist.", user_id)
    })
}

pub async fn watch(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = watch_text(&pool, &msg, &args).await;
    reply(&bot, &msg, outcome).await
}

async fn review_text(
    pool: &PgPool,
    msg: &Message,
    status: ApprovalStatus,
    args: &str,
) -> Result<String, MarketError> {
    let actor = staff(pool, msg).await?;
    let (id, reason) = split_args(args);
    if id.is_empty() {
        return Err(MarketError::Validation(match status {
            ApprovalStatus::Rejected => "Usage: /reject <dish id> <reason>".to_string(),
            _ => "Usage: /approve <dish id>".to_string(),
        }));
    }
    let dish_id = db::resolve_id(pool, Lookup::Dishes, id).await?;
    let reason = Some(reason.to_string()).filter(|r| !r.is_empty());
    admin::review_dish(pool, &actor, dish_id, status, reason).await?;
    Ok(format!("Dish #{} is now {}.", short_id(dish_id), status))
}

pub async fn approve(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = review_text(&pool, &msg, ApprovalStatus::Approved, &args).await;
    reply(&bot, &msg, outcome).await
}

pub async fn reject(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = review_text(&pool, &msg, ApprovalStatus::Rejected, &args).await;
    reply(&bot, &msg, outcome).await
}

fn parse_export(args: &str) -> Result<(ExportKind, ExportFormat), MarketError> {
    let (kind, format) = split_args(args);
    if kind.is_empty() {
        return Err(MarketError::Validation(
            "Usage: /export <users|dishes|orders> [json]".to_string(),
        ));
    }
    let format = match format.to_lowercase().as_str() {
        "" | "txt" | "table" => ExportFormat::Table,
        "json" => ExportFormat::Json,
        other => return Err(MarketError::Validation(format!("Unknown export format: {}", other))),
    };
    Ok((kind.parse()?, format))
}

async fn build_report(pool: &PgPool, msg: &Message, args: &str) -> Result<Report, MarketError> {
    staff(pool, msg).await?;
    let (kind, format) = parse_export(args)?;
    let now = Utc::now();
    let json = |result: Result<Report, serde_json::Error>| {
        result.map_err(|e| MarketError::Validation(format!("Could not build the export: {}", e)))
    };

    let report = match (kind, format) {
        (ExportKind::Users, ExportFormat::Table) => reports::users_report(&users::all_users(pool).await?, now),
        (ExportKind::Users, ExportFormat::Json) => {
            json(reports::json_report(kind, &users::all_users(pool).await?, now))?
        }
        (ExportKind::Dishes, ExportFormat::Table) => reports::dishes_report(&catalog::all_dishes(pool).await?, now),
        (ExportKind::Dishes, ExportFormat::Json) => {
            json(reports::json_report(kind, &catalog::all_dishes(pool).await?, now))?
        }
        (ExportKind::Orders, ExportFormat::Table) => reports::orders_report(&orders::all_orders(pool).await?, now),
        (ExportKind::Orders, ExportFormat::Json) => {
            json(reports::json_report(kind, &orders::all_orders(pool).await?, now))?
        }
    };
    Ok(report)
}

/// Sends the requested export as a document.
pub async fn export(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    match build_report(&pool, &msg, &args).await {
        Ok(report) => {
            log::info!("Sending export {} to chat {}", report.filename, msg.chat.id);
            bot.send_document(
                msg.chat.id,
                InputFile::memory(report.body.into_bytes()).file_name(report.filename),
            )
            .await?;
            Ok(())
        }
        Err(e) => reply(&bot, &msg, Err(e)).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Category, LogTarget, Role, SellerPlan};
    use crate::services::stats::{MonthlySales, SellerRevenue};
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn numbers_page_and_words_search() {
        assert_eq!(page_or_term("3"), (3, ""));
        assert_eq!(page_or_term(" rahim "), (1, "rahim"));
        assert_eq!(page_or_term(""), (1, ""));
    }

    #[test]
    fn footer_only_when_paged() {
        assert_eq!(page_footer(1, 1, "users"), "");
        assert_eq!(page_footer(1, 3, "users"), "\n\nPage 1 of 3. Next: /users 2");
        assert_eq!(page_footer(3, 3, "users"), "\n\nPage 3 of 3. Next: /users 3");
    }

    #[test]
    fn exports_default_to_tables() {
        assert_eq!(
            parse_export("orders").unwrap(),
            (ExportKind::Orders, ExportFormat::Table)
        );
        assert_eq!(
            parse_export("Users JSON").unwrap(),
            (ExportKind::Users, ExportFormat::Json)
        );
        assert!(parse_export("").is_err());
        assert!(parse_export("logs").is_err());
        assert!(parse_export("dishes pdf").is_err());
    }

    #[test]
    fn user_lines_show_flags() {
        let user = User {
            id: 42,
            name: "Rahim".to_string(),
            email: Some("rahim@example.com".to_string()),
            phone: None,
            role: Role::Seller,
            avatar: None,
            shop_name: Some("Rahim's Kitchen".to_string()),
            shop_address: None,
            plan_type: SellerPlan::Free,
            product_upload_count: 2,
            delivered_order_count: 10,
            is_suspended: true,
            on_watchlist: true,
            created_at: Utc::now(),
        };
        assert_eq!(
            user_line(&user),
            "• Rahim's Kitchen (42) seller | rahim@example.com [suspended, watchlist]"
        );
    }

    #[test]
    fn log_lines_name_actor_and_target() {
        let entry = AdminLog {
            id: Uuid::nil(),
            admin_id: 1,
            admin_name: "Karim".to_string(),
            action: "Deleted dish \"Pasta\"".to_string(),
            target_type: LogTarget::Dish,
            target_id: Some("abc".to_string()),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap(),
        };
        assert_eq!(
            log_line(&entry),
            "16 Oct 2026 Karim: Deleted dish \"Pasta\" (dish abc)"
        );
    }

    fn log_entry(n: u32) -> AdminLog {
        AdminLog {
            id: Uuid::new_v4(),
            admin_id: 1,
            admin_name: "Karim".to_string(),
            action: format!("Action {}", n),
            target_type: LogTarget::System,
            target_id: None,
            timestamp: Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap(),
        }
    }

    #[test]
    fn logs_are_paged_ten_at_a_time() {
        let logs: Vec<AdminLog> = (1..=23).map(log_entry).collect();

        let first = logs_page(&logs, 1);
        assert!(first.starts_with("Admin activity (23):"));
        assert!(first.contains("Action 10 (system)"));
        assert!(!first.contains("Action 11 "));
        assert!(first.ends_with("Page 1 of 3. Next: /logs 2"));

        let last = logs_page(&logs, 3);
        assert!(last.contains("Action 23 (system)"));
        assert!(!last.contains("Action 20 "));

        assert_eq!(logs_page(&[], 1), "No admin activity yet.");
    }

    fn dish(name: &str, category: Category) -> Dish {
        Dish {
            id: Uuid::new_v4(),
            seller_id: 7,
            name: name.to_string(),
            description: String::new(),
            images: Vec::new(),
            price: 20_000,
            original_price: None,
            category,
            delivery_time: "30-45 min".to_string(),
            commission_percentage: crate::db::models::CommissionRate::default(),
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
    fn dish_search_matches_name_or_category() {
        let dishes = vec![
            dish("Mutton Kacchi", Category::Biryani),
            dish("Chicken Tehari", Category::Biryani),
            dish("Borhani", Category::Drinks),
        ];
        let names = |term: &str| -> Vec<String> {
            search_dishes(&dishes, term).iter().map(|d| d.name.clone()).collect()
        };
        assert_eq!(names("kacchi"), vec!["Mutton Kacchi"]);
        assert_eq!(names("BIRYANI"), vec!["Mutton Kacchi", "Chicken Tehari"]);
        assert_eq!(names("drinks"), vec!["Borhani"]);
        assert_eq!(names("").len(), 3);
        assert!(names("pizza").is_empty());
    }

    #[test]
    fn stats_text_ranks_sellers() {
        let stats = AdminStats {
            total_revenue: 120_000,
            total_orders: 4,
            total_dishes: 6,
            total_users: 9,
            sales_by_month: vec![MonthlySales {
                month: "Oct 2026".to_string(),
                sales: 120_000,
            }],
            top_sellers: vec![
                SellerRevenue {
                    seller_id: 7,
                    name: "Dhaba".to_string(),
                    revenue: 80_000,
                },
                SellerRevenue {
                    seller_id: 8,
                    name: "Kacchi Bhai".to_string(),
                    revenue: 30_000,
                },
            ],
            category_distribution: vec![(Category::Biryani, 4), (Category::Drinks, 2)],
        };
        let text = stats_text(&stats);
        assert!(text.contains("Revenue (delivered): ৳1200.00"));
        assert!(text.contains("1. Dhaba (7) ৳800.00"));
        assert!(text.contains("2. Kacchi Bhai (8) ৳300.00"));
        assert!(text.contains("Biryani: 4"));
    }
}
