use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Helper function to format the date
///
/// This function takes a `NaiveDate` and formats it as a string in the "dd-mm-yyyy" format.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

/// Formats a timestamp the way order lists and reports show it, e.g. `16 Oct 2026`.
pub fn format_day(at: DateTime<Utc>) -> String {
    at.format("%d %b %Y").to_string()
}

/// Month bucket label used by the sales charts, e.g. `Oct 2026`.
pub fn month_label(at: DateTime<Utc>) -> String {
    at.format("%b %Y").to_string()
}

/// Helper function to escape special characters for Telegram MarkdownV2
///
/// Every character with a meaning in MarkdownV2 gets a leading backslash so it
/// is rendered literally.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "_*[]()~`>#+-=|{}.!\\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders an amount of paisa as taka, e.g. `৳350.50`.
pub fn format_money(paisa: i64) -> String {
    let sign = if paisa < 0 { "-" } else { "" };
    let abs = paisa.unsigned_abs();
    format!("{}৳{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parses a taka amount typed by a user (`350`, `350.5`, `৳350.50`) into paisa.
pub fn parse_money(input: &str) -> Option<i64> {
    let input = input.trim().trim_start_matches('৳').trim();
    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    if whole.is_empty() || fraction.len() > 2 {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

/// First six hex digits of an id, the form shown to users (`#3f2a9c`).
pub fn short_id(id: Uuid) -> String {
    id.simple().to_string()[..6].to_string()
}

/// One page of `items`, 1-based. Returns the slice and the page count.
pub fn paginate<T>(items: &[T], page: usize, per_page: usize) -> (&[T], usize) {
    let per_page = per_page.max(1);
    let pages = items.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, pages);
    let start = (page - 1) * per_page;
    let end = (start + per_page).min(items.len());
    (&items[start.min(items.len())..end], pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn escapes_markdown_specials() {
        assert_eq!(escape_markdown("Beef (spicy)!"), "Beef \\(spicy\\)\\!");
        assert_eq!(escape_markdown("plain"), "plain");
        assert_eq!(escape_markdown("1.5"), "1\\.5");
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(35_050), "৳350.50");
        assert_eq!(format_money(5), "৳0.05");
        assert_eq!(format_money(-1_200), "-৳12.00");
    }

    #[test]
    fn money_parsing() {
        assert_eq!(parse_money("350"), Some(35_000));
        assert_eq!(parse_money("350.5"), Some(35_050));
        assert_eq!(parse_money("৳ 12.05"), Some(1_205));
        assert_eq!(parse_money("12.345"), None);
        assert_eq!(parse_money("-4"), None);
        assert_eq!(parse_money("abc"), None);
        assert_eq!(parse_money(".5"), None);
    }

    #[test]
    fn short_ids_are_six_hex_digits() {
        let id = Uuid::parse_str("3f2a9c41-0000-4000-8000-000000000000").unwrap();
        assert_eq!(short_id(id), "3f2a9c");
    }

    #[test]
    fn dates_render_for_humans() {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        assert_eq!(format_day(at), "16 Oct 2026");
        assert_eq!(month_label(at), "Oct 2026");
        assert_eq!(format_date(at.date_naive()), "16-10-2026");
    }

    #[test]
    fn pagination_clamps_to_available_pages() {
        let items: Vec<u32> = (1..=23).collect();
        let (page, pages) = paginate(&items, 3, 10);
        assert_eq!(page, &[21, 22, 23]);
        assert_eq!(pages, 3);

        let (page, _) = paginate(&items, 9, 10);
        assert_eq!(page.first(), Some(&21));

        let empty: Vec<u32> = Vec::new();
        let (page, pages) = paginate(&empty, 1, 10);
        assert!(page.is_empty());
        assert_eq!(pages, 1);
    }
}
