//! Admin exports of users, dishes and orders.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    db::models::{Dish, Order, User},
    error::ParseError,
    utils::{format_date, format_day, format_money, short_id},
};

/// Rows per page of a table document.
const ROWS_PER_PAGE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Users,
    Dishes,
    Orders,
}

impl ExportKind {
    fn title(&self) -> &'static str {
        match self {
            ExportKind::Users => "User List",
            ExportKind::Dishes => "Dish List",
            ExportKind::Orders => "Order List",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            ExportKind::Users => "users",
            ExportKind::Dishes => "dishes",
            ExportKind::Orders => "orders",
        }
    }
}

impl FromStr for ExportKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "users" => Ok(ExportKind::Users),
            "dishes" => Ok(ExportKind::Dishes),
            "orders" => Ok(ExportKind::Orders),
            _ => Err(ParseError::new("export", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Table,
    Json,
}

impl ExportFormat {
    fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Table => "txt",
            ExportFormat::Json => "json",
        }
    }
}

/// A rendered document ready to be sent as a file.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub filename: String,
    pub body: String,
}

pub fn report_filename(kind: ExportKind, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "chefs_bd_{}_{}.{}",
        kind.slug(),
        now.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Lays rows out as a fixed-width table, split into pages that each end in
/// a `Page i of n` / `Generated on` footer.
pub fn render_table(title: &str, head: &[&str], rows: &[Vec<String>], now: DateTime<Utc>) -> String {
    let mut widths: Vec<usize> = head.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header = render_line(head.iter().copied(), &widths);
    let rule = "-".repeat(header.chars().count());

    let pages: Vec<&[Vec<String>]> = if rows.is_empty() {
        vec![rows]
    } else {
        rows.chunks(ROWS_PER_PAGE).collect()
    };
    let page_count = pages.len();
    let generated = now.format("%d %b %Y, %H:%M UTC");

    let mut out = String::new();
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            out.push('\u{c}');
        }
        out.push_str(title);
        out.push_str("\n\n");
        out.push_str(&header);
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for row in page.iter() {
            out.push_str(&render_line(row.iter().map(String::as_str), &widths));
            out.push('\n');
        }
        out.push_str(&format!(
            "\nPage {} of {}    Generated on: {}\n",
            index + 1,
            page_count,
            generated
        ));
    }
    out
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(" | ")
        .trim_end()
        .to_string()
}

pub fn users_report(users: &[User], now: DateTime<Utc>) -> Report {
    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|user| {
            vec![
                user.name.clone(),
                user.email.clone().unwrap_or_else(|| "-".to_string()),
                user.role.to_string(),
                if user.is_suspended { "Suspended" } else { "Active" }.to_string(),
                format_date(user.created_at.date_naive()),
            ]
        })
        .collect();
    Report {
        filename: report_filename(ExportKind::Users, ExportFormat::Table, now),
        body: render_table(
            ExportKind::Users.title(),
            &["Name", "Email", "Role", "Status", "Joined"],
            &rows,
            now,
        ),
    }
}

pub fn dishes_report(dishes: &[Dish], now: DateTime<Utc>) -> Report {
    let rows: Vec<Vec<String>> = dishes
        .iter()
        .map(|dish| {
            vec![
                dish.name.clone(),
                dish.category.to_string(),
                format_money(dish.price),
                dish.approval_status.to_string(),
                dish.seller_id.to_string(),
            ]
        })
        .collect();
    Report {
        filename: report_filename(ExportKind::Dishes, ExportFormat::Table, now),
        body: render_table(
            ExportKind::Dishes.title(),
            &["Name", "Category", "Price", "Approval", "Seller ID"],
            &rows,
            now,
        ),
    }
}

pub fn orders_report(orders: &[Order], now: DateTime<Utc>) -> Report {
    let rows: Vec<Vec<String>> = orders
        .iter()
        .map(|order| {
            vec![
                format!("#{}", short_id(order.id)),
                format_day(order.created_at),
                format_money(order.total),
                order.status.to_string(),
                order.buyer_id.to_string(),
            ]
        })
        .collect();
    Report {
        filename: report_filename(ExportKind::Orders, ExportFormat::Table, now),
        body: render_table(
            ExportKind::Orders.title(),
            &["Order ID", "Date", "Total", "Status", "Buyer ID"],
            &rows,
            now,
        ),
    }
}

pub fn json_report<T: Serialize>(
    kind: ExportKind,
    records: &[T],
    now: DateTime<Utc>,
) -> Result<Report, serde_json::Error> {
    Ok(Report {
        filename: report_filename(kind, ExportFormat::Json, now),
        body: serde_json::to_string_pretty(records)?,
    })
}
