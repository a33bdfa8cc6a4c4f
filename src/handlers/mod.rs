use sqlx::PgPool;
use teloxide::prelude::*;

use crate::{db::models::User, error::MarketError, services::users};

pub mod account;
pub mod admin;
pub mod cart;
pub mod catalog;
pub mod seller;

/// Telegram rejects messages longer than this.
pub(crate) const MESSAGE_LIMIT: usize = 4096;

pub(crate) fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0 as i64)
}

/// The registered marketplace user behind `msg`.
pub(crate) async fn current_user(pool: &PgPool, msg: &Message) -> Result<User, MarketError> {
    let id = sender_id(msg).ok_or(MarketError::NotRegistered)?;
    users::find_user(pool, id)
        .await?
        .ok_or(MarketError::NotRegistered)
}

/// Sends the outcome of an operation back to the chat. Internal failures are
/// logged and answered with a generic apology.
pub(crate) async fn reply(
    bot: &Bot,
    msg: &Message,
    outcome: Result<String, MarketError>,
) -> Result<(), crate::Error> {
    let text = match outcome {
        Ok(text) => text,
        Err(e) if e.is_internal() => {
            log::error!("Request in chat {} failed: {}", msg.chat.id, e);
            "Something went wrong, please try again later.".to_string()
        }
        Err(e) => e.to_string(),
    };

    for chunk in split_message(&text, MESSAGE_LIMIT) {
        bot.send_message(msg.chat.id, chunk).await?;
    }
    Ok(())
}

/// Splits `text` on line boundaries into pieces of at most `limit` bytes.
/// A single line longer than `limit` is cut at a char boundary.
pub(crate) fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.split_inclusive('\n') {
        if current.len() + line.len() > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        let mut rest = line;
        while rest.len() > limit {
            let mut cut = limit;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
    }
    if !current.trim().is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::from("-"));
    }
    chunks
}

/// Splits command arguments into the first word and the rest.
pub(crate) fn split_args(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (args, ""),
    }
}

pub(crate) fn parse_user_id(input: &str) -> Result<i64, MarketError> {
    input
        .trim()
        .parse()
        .map_err(|_| MarketError::Validation(format!("{} is not a user id.", input.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_stay_whole() {
        assert_eq!(split_message("hello\nworld", 100), vec!["hello\nworld".to_string()]);
    }

    #[test]
    fn long_messages_split_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        assert_eq!(
            split_message(text, 10),
            vec!["aaaa\nbbbb\n".to_string(), "cccc\n".to_string()]
        );
    }

    #[test]
    fn overlong_lines_are_cut_on_char_boundaries() {
        let text = "৳৳৳৳";
        let chunks = split_message(text, 7);
        assert!(chunks.iter().all(|c| c.len() <= 7));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn empty_text_still_sends_something() {
        assert_eq!(split_message("", 10), vec!["-".to_string()]);
    }

    #[test]
    fn args_split_into_head_and_tail() {
        assert_eq!(split_args("  abc123   2 extra "), ("abc123", "2 extra"));
        assert_eq!(split_args("abc123"), ("abc123", ""));
        assert_eq!(split_args(""), ("", ""));
    }

    #[test]
    fn user_ids_must_be_numeric() {
        assert_eq!(parse_user_id(" 42 ").unwrap(), 42);
        assert!(parse_user_id("bob").is_err());
    }
}
