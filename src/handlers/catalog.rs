use sqlx::PgPool;
use teloxide::{
    prelude::*,
    types::{InputFile, InputMedia, InputMediaPhoto},
    RequestError,
};

use crate::{
    db::{
        self,
        models::{Category, Dish, User},
        Lookup,
    },
    error::MarketError,
    handlers::{parse_user_id, reply, split_message, MESSAGE_LIMIT},
    services::{
        catalog::{self, DishFilter},
        users,
    },
    utils::{format_money, short_id},
};

/// One-line summary used in every dish list.
pub(crate) fn dish_line(dish: &Dish) -> String {
    format!(
        "• {} — {} — ⭐{} — {}  #{}",
        dish.name,
        format_money(dish.price),
        dish.rating,
        dish.category,
        short_id(dish.id)
    )
}

pub(crate) fn dish_card(dish: &Dish, seller: Option<&User>) -> String {
    let mut lines = vec![format!("🍽 {}", dish.name)];
    match dish.original_price {
        Some(original) if original > dish.price => lines.push(format!(
            "Price: {} (was {})",
            format_money(dish.price),
            format_money(original)
        )),
        _ => lines.push(format!("Price: {}", format_money(dish.price))),
    }
    lines.push(format!("Category: {}", dish.category));
    lines.push(format!("Rating: {}", "⭐".repeat(dish.rating.clamp(0, 5) as usize)));
    lines.push(format!("Delivery: {}", dish.delivery_time));
    if let Some(seller) = seller {
        lines.push(format!("Seller: {} (/seller {})", seller.display_name(), seller.id));
    }
    if !dish.description.is_empty() {
        lines.push(String::new());
        lines.push(dish.description.clone());
    }
    if !dish.tags.is_empty() {
        lines.push(format!("Tags: {}", dish.tags.join(", ")));
    }
    if !dish.images.is_empty() {
        lines.push(format!("📷 {} photo(s)", dish.images.len()));
    }
    if !dish.is_available {
        lines.push("Currently out of stock.".to_string());
    }
    lines.push(String::new());
    lines.push(format!("Add to cart: /add {} 1", short_id(dish.id)));
    lines.join("\n")
}

fn dish_list(title: &str, dishes: &[Dish]) -> String {
    if dishes.is_empty() {
        return "No dishes found.".to_string();
    }
    let body = dishes.iter().map(dish_line).collect::<Vec<_>>().join("\n");
    format!("{} ({}):\n\n{}\n\nUse /dish <id> for details.", title, dishes.len(), body)
}

async fn dishes_text(pool: &PgPool, args: &str) -> Result<String, MarketError> {
    let filter = DishFilter::parse(args)?;
    log::info!("Listing dishes with {:?}", filter);
    let dishes = catalog::list_dishes(pool, &filter).await?;
    let title = match filter.category {
        Some(category) => format!("{} dishes", category),
        None => "Dishes".to_string(),
    };
    Ok(dish_list(&title, &dishes))
}

pub async fn list_dishes(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = dishes_text(&pool, &args).await;
    reply(&bot, &msg, outcome).await
}

/// Telegram's limit for photo captions.
const CAPTION_LIMIT: usize = 1024;
/// Telegram groups at most this many photos into one album.
const ALBUM_LIMIT: usize = 10;

/// Splits a dish card into a photo caption and the overflow that follows as
/// a separate message.
pub(crate) fn split_caption(card: &str) -> (String, Option<String>) {
    let mut chunks = split_message(card, CAPTION_LIMIT).into_iter();
    let caption = chunks.next().unwrap_or_default().trim_end().to_string();
    let rest: String = chunks.collect();
    let rest = rest.trim();
    (caption, (!rest.is_empty()).then(|| rest.to_string()))
}

/// An album of the dish photos with the caption on the first one.
pub(crate) fn photo_album(images: &[String], caption: &str) -> Vec<InputMedia> {
    images
        .iter()
        .take(ALBUM_LIMIT)
        .enumerate()
        .map(|(index, file_id)| {
            let photo = InputMediaPhoto::new(InputFile::file_id(file_id.clone()));
            InputMedia::Photo(if index == 0 { photo.caption(caption) } else { photo })
        })
        .collect()
}

async fn send_with_photos(bot: &Bot, chat_id: ChatId, images: &[String], card: &str) -> Result<(), RequestError> {
    let (caption, rest) = split_caption(card);
    match images {
        [file_id] => {
            bot.send_photo(chat_id, InputFile::file_id(file_id.clone()))
                .caption(caption)
                .await?;
        }
        _ => {
            bot.send_media_group(chat_id, photo_album(images, &caption))
                .await?;
        }
    }
    if let Some(rest) = rest {
        for chunk in split_message(&rest, MESSAGE_LIMIT) {
            bot.send_message(chat_id, chunk).await?;
        }
    }
    Ok(())
}

async fn dish_view(pool: &PgPool, args: &str) -> Result<(Dish, String), MarketError> {
    if args.trim().is_empty() {
        return Err(MarketError::Validation("Usage: /dish <id>".to_string()));
    }
    let dish_id = db::resolve_id(pool, Lookup::Dishes, args).await?;
    let dish = catalog::get_dish(pool, dish_id).await?;
    catalog::increment_view_count(pool, dish_id).await;
    let seller = users::find_user(pool, dish.seller_id).await?;
    let card = dish_card(&dish, seller.as_ref());
    Ok((dish, card))
}

/// Shows a dish card, on top of its photos when the seller uploaded any.
pub async fn show_dish(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    match dish_view(&pool, &args).await {
        Ok((dish, card)) if !dish.images.is_empty() => {
            if let Err(e) = send_with_photos(&bot, msg.chat.id, &dish.images, &card).await {
                log::warn!("Could not send the photos of dish {}: {}", dish.id, e);
                return reply(&bot, &msg, Ok(card)).await;
            }
            Ok(())
        }
        Ok((_, card)) => reply(&bot, &msg, Ok(card)).await,
        Err(e) => reply(&bot, &msg, Err(e)).await,
    }
}

pub async fn list_categories(bot: Bot, msg: Message) -> Result<(), crate::Error> {
    let body = Category::ALL
        .iter()
        .map(|category| format!("• {}  (/dishes category={})", category, category.as_str().replace(' ', "-")))
        .collect::<Vec<_>>()
        .join("\n");
    bot.send_message(msg.chat.id, format!("Categories:\n\n{}", body))
        .await?;
    Ok(())
}

async fn sellers_text(pool: &PgPool) -> Result<String, MarketError> {
    let sellers = users::active_sellers(pool).await?;
    if sellers.is_empty() {
        return Ok("No sellers yet.".to_string());
    }
    let body = sellers
        .iter()
        .map(|seller| format!("• {}  (/seller {})", seller.display_name(), seller.id))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!("Sellers ({}):\n\n{}", sellers.len(), body))
}

pub async fn list_sellers(bot: Bot, msg: Message, pool: PgPool) -> Result<(), crate::Error> {
    let outcome = sellers_text(&pool).await;
    reply(&bot, &msg, outcome).await
}

async fn seller_text(pool: &PgPool, args: &str) -> Result<String, MarketError> {
    let seller_id = parse_user_id(args)?;
    let seller = users::get_user(pool, seller_id).await?;
    if seller.shop_name.is_none() && seller.product_upload_count == 0 {
        return Err(MarketError::NotFound("Seller"));
    }

    let filter = DishFilter {
        seller_id: Some(seller_id),
        ..DishFilter::default()
    };
    let dishes = catalog::list_dishes(pool, &filter).await?;

    let mut lines = vec![format!("🏪 {}", seller.display_name())];
    if let Some(address) = &seller.shop_address {
        lines.push(format!("📍 {}", address));
    }
    if seller.is_suspended {
        lines.push("This shop is temporarily closed.".to_string());
    }
    lines.push(String::new());
    lines.push(dish_list("Menu", &dishes));
    Ok(lines.join("\n"))
}

pub async fn show_seller(bot: Bot, msg: Message, pool: PgPool, args: String) -> Result<(), crate::Error> {
    let outcome = seller_text(&pool, &args).await;
    reply(&bot, &msg, outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ApprovalStatus, CommissionRate};
    use chrono::Utc;
    use uuid::Uuid;

    fn dish() -> Dish {
        Dish {
            id: Uuid::parse_str("c0ffee00-0000-4000-8000-000000000000").unwrap(),
            seller_id: 7,
            name: "Beef Kala Bhuna".to_string(),
            description: "Slow cooked Chittagong style.".to_string(),
            images: vec!["file-1".to_string()],
            price: 32_000,
            original_price: Some(35_000),
            category: Category::SetMenu,
            delivery_time: "40-50 min".to_string(),
            commission_percentage: CommissionRate::default(),
            tags: vec!["spicy".to_string()],
            rating: 4,
            is_available: true,
            approval_status: ApprovalStatus::Approved,
            approval_reason: None,
            view_count: 12,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dish_line_shows_price_rating_and_short_id() {
        assert_eq!(
            dish_line(&dish()),
            "• Beef Kala Bhuna — ৳320.00 — ⭐4 — Set Menu  #c0ffee"
        );
    }

    #[test]
    fn dish_card_shows_discount_and_cart_hint() {
        let card = dish_card(&dish(), None);
        assert!(card.starts_with("🍽 Beef Kala Bhuna"));
        assert!(card.contains("Price: ৳320.00 (was ৳350.00)"));
        assert!(card.contains("Tags: spicy"));
        assert!(card.contains("📷 1 photo(s)"));
        assert!(card.ends_with("/add c0ffee 1"));
        assert!(!card.contains("out of stock"));
    }

    #[test]
    fn short_cards_fit_in_the_caption() {
        let card = dish_card(&dish(), None);
        assert_eq!(split_caption(&card), (card.clone(), None));
    }

    #[test]
    fn long_cards_continue_after_the_photo() {
        let long = Dish {
            description: "Slow cooked with mustard oil and whole spices.\n".repeat(40),
            ..dish()
        };
        let card = dish_card(&long, None);
        let (caption, rest) = split_caption(&card);
        assert!(caption.chars().count() <= CAPTION_LIMIT);
        assert!(caption.starts_with("🍽 Beef Kala Bhuna"));
        let rest = rest.unwrap();
        assert!(rest.ends_with("/add c0ffee 1"));
        assert!(!rest.starts_with('\n'));
    }

    #[test]
    fn albums_carry_the_caption_once() {
        let images: Vec<String> = (0..12).map(|n| format!("file-{}", n)).collect();
        let album = photo_album(&images, "🍽 Beef Kala Bhuna");
        assert_eq!(album.len(), ALBUM_LIMIT);
        let captions: Vec<Option<String>> = album
            .iter()
            .map(|media| match media {
                InputMedia::Photo(photo) => photo.caption.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(captions[0].as_deref(), Some("🍽 Beef Kala Bhuna"));
        assert!(captions[1..].iter().all(Option::is_none));
    }

    #[test]
    fn empty_lists_say_so() {
        assert_eq!(dish_list("Dishes", &[]), "No dishes found.");
    }
}
