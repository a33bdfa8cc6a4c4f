use futures::future;
use sqlx::{PgConnection, PgPool};
use teloxide::{prelude::*, RequestError};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::{
    db::models::{Notification, NotificationType, Role},
    error::MarketError,
};

/// Undelivered notifications picked up per dispatcher run.
const DISPATCH_BATCH: i64 = 100;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: i64,
    pub kind: NotificationType,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub dish_id: Option<Uuid>,
}

impl NewNotification {
    pub fn new(user_id: i64, kind: NotificationType, message: impl Into<String>) -> Self {
        NewNotification {
            user_id,
            kind,
            message: message.into(),
            order_id: None,
            dish_id: None,
        }
    }

    pub fn for_order(mut self, order_id: Uuid) -> Self {
        self.order_id = Some(order_id);
        self
    }
}

/// Stores one notification. Takes a connection so it can join the caller's
/// transaction.
pub async fn notify(conn: &mut PgConnection, notification: NewNotification) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, message, order_id, dish_id) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.message)
    .bind(notification.order_id)
    .bind(notification.dish_id)
    .execute(conn)
    .await?;
    Ok(id)
}

/// Sends the same notification to every user with `role` in one statement.
/// Returns how many were created.
pub async fn notify_role(
    conn: &mut PgConnection,
    role: Role,
    kind: NotificationType,
    message: &str,
    dish_id: Option<Uuid>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO notifications (id, user_id, kind, message, dish_id) \
         SELECT gen_random_uuid(), id, $2, $3, $4 FROM users WHERE role = $1",
    )
    .bind(role.as_str())
    .bind(kind.as_str())
    .bind(message)
    .bind(dish_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_for_user(
    pool: &PgPool,
    user_id: i64,
    unread_only: bool,
) -> Result<Vec<Notification>, MarketError> {
    let notifications = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT is_read) \
         ORDER BY created_at DESC LIMIT 20",
    )
    .bind(user_id)
    .bind(unread_only)
    .fetch_all(pool)
    .await?;
    Ok(notifications)
}

pub async fn unread_count(pool: &PgPool, user_id: i64) -> Result<i64, MarketError> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Marks one of `user_id`'s notifications as read. False when it does not
/// exist or belongs to someone else.
pub async fn mark_read(pool: &PgPool, user_id: i64, id: Uuid) -> Result<bool, MarketError> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_read(pool: &PgPool, user_id: i64) -> Result<u64, MarketError> {
    let result =
        sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
            .bind(user_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Text pushed to the user's chat.
pub fn render(notification: &Notification) -> String {
    let icon = match notification.kind {
        NotificationType::NewOrder => "🛒",
        NotificationType::OrderStatus => "📦",
        NotificationType::NewProduct => "🍽",
        NotificationType::AccountSuspended => "⛔",
        NotificationType::AccountActivated => "✅",
    };
    format!("{} {}", icon, notification.message)
}

/// Schedules the dispatcher that pushes stored notifications to Telegram.
///
/// Notifications are written to the database inside the transaction that
/// caused them. This job is what actually delivers them to the users' chats.
///
/// Parameters:
/// - `pool`: A PostgreSQL connection pool for reading and stamping notifications.
/// - `bot`: A Telegram Bot instance for sending the messages.
/// - `schedule`: A six-field cron expression, `*/30 * * * * *` by default.
///
/// The function performs the following steps:
/// 1. Creates a new JobScheduler instance.
/// 2. Defines an asynchronous job that runs on `schedule`.
/// 3. The job calls `dispatch_pending`, which sends up to a batch of
///    undelivered notifications concurrently and stamps `delivered_at` on the
///    ones that went out or were rejected by Telegram for good.
/// 4. Adds the job to the scheduler and starts it in the background.
///
/// Returns:
/// - `Ok(())` if the job is successfully scheduled and started.
/// - `Err(Box<dyn std::error::Error>)` if the cron expression is invalid or
///   the scheduler cannot be created.
pub async fn schedule_dispatch(
    pool: PgPool,
    bot: Bot,
    schedule: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    // Create a new JobScheduler
    let sched = JobScheduler::new().await?;

    // Define the delivery job
    let job = Job::new_async(schedule, move |_uuid, _l| {
        let bot = bot.clone();
        let pool = pool.clone();
        Box::pin(async move {
            match dispatch_pending(&pool, &bot).await {
                Ok(0) => {}
                Ok(sent) => log::info!("Delivered {} notifications", sent),
                Err(e) => log::error!("Error dispatching notifications: {}", e),
            }
        })
    })
    .map_err(|e| {
        log::error!("Failed to create job: {}", e);
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    // Add the job to the scheduler
    sched.add(job).await.map_err(|e| {
        log::error!("Failed to add job to scheduler: {}", e);
        Box::new(e) as Box<dyn std::error::Error>
    })?;

    // Start the scheduler without blocking the caller
    tokio::spawn(async move {
        if let Err(e) = sched.start().await {
            log::error!("Scheduler error: {}", e);
        }
    });

    log::info!("Notification dispatcher scheduled ({})", schedule);
    Ok(())
}

async fn dispatch_pending(pool: &PgPool, bot: &Bot) -> Result<usize, MarketError> {
    let pending = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE delivered_at IS NULL ORDER BY created_at LIMIT $1",
    )
    .bind(DISPATCH_BATCH)
    .fetch_all(pool)
    .await?;

    if pending.is_empty() {
        return Ok(0);
    }

    let sends = pending.iter().map(|notification| async move {
        let result = bot
            .send_message(ChatId(notification.user_id), render(notification))
            .await;
        (notification.id, result)
    });
    let results = future::join_all(sends).await;

    let mut settled = Vec::with_capacity(results.len());
    for (id, result) in results {
        match result {
            Ok(_) => settled.push(id),
            // The chat rejected the message (blocked bot, unknown chat); retrying won't help.
            Err(RequestError::Api(e)) => {
                log::warn!("Dropping notification {}: {}", id, e);
                settled.push(id);
            }
            Err(e) => log::error!("Failed to send notification {}: {}", id, e),
        }
    }

    sqlx::query("UPDATE notifications SET delivered_at = NOW() WHERE id = ANY($1)")
        .bind(&settled)
        .execute(pool)
        .await?;

    Ok(settled.len())
}
