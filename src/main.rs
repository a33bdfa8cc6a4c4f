use dotenvy::dotenv;
use dptree::case;
use envconfig::Envconfig;
use teloxide::{
    dispatching::{
        dialogue::{self, InMemStorage},
        Dispatcher, UpdateFilterExt,
    },
    prelude::*,
    types::{KeyboardRemove, ReplyMarkup},
    utils::command::BotCommands,
};

use crate::{
    config::{Config, Settings},
    db::models::{Category, CommissionRate, DeliveryZone},
    handlers::{account, admin, cart, catalog, seller},
};

mod config;
mod db;
mod error;
mod handlers;
mod services;
mod utils;

type Error = Box<dyn std::error::Error + Send + Sync>;

#[derive(BotCommands, Debug, Clone)]
#[command(rename_rule = "lowercase", description = "Chef's BD commands:")]
pub enum Command {
    #[command(description = "Register and open the main menu.")]
    Start,
    #[command(description = "Show this help.")]
    Help,
    #[command(description = "Show the main menu.")]
    Menu,
    #[command(description = "Browse dishes: [category=..] [seller=..] [rating=..] [search=..] [sort=price-asc]")]
    Dishes(String),
    #[command(description = "Show one dish: <id>")]
    Dish(String),
    #[command(description = "List the food categories.")]
    Categories,
    #[command(description = "List the sellers.")]
    Sellers,
    #[command(description = "Show a seller's shop: <seller id>")]
    Seller(String),
    #[command(description = "Add a dish to your cart: <id> [quantity]")]
    Add(String),
    #[command(description = "Remove a dish from your cart: <id>")]
    Remove(String),
    #[command(description = "Show your cart.")]
    Cart,
    #[command(description = "Place an order for everything in your cart.")]
    Checkout,
    #[command(description = "Show your orders.")]
    Orders,
    #[command(description = "Show one order: <order id>")]
    Order(String),
    #[command(description = "Cancel a pending order: <order id>")]
    Cancel(String),
    #[command(description = "Show your notifications: [unread]")]
    Notifications(String),
    #[command(description = "Mark a notification as read: <id>")]
    Read(String),
    #[command(description = "Mark all notifications as read.")]
    ReadAll,
    #[command(description = "Show or edit your profile: [field value]")]
    Profile(String),
    #[command(description = "Open a shop and become a seller: <shop name>")]
    Sell(String),
    #[command(description = "Seller dashboard.")]
    Dashboard,
    #[command(description = "List your dishes.")]
    MyDishes,
    #[command(description = "Orders for your shop.")]
    Incoming,
    #[command(description = "Update an order: <order id> <preparing|delivered|cancelled>")]
    Status(String),
    #[command(description = "Add a new dish.")]
    NewDish,
    #[command(description = "Edit a dish: <id> <field> <value>")]
    EditDish(String),
    #[command(description = "Show or hide a dish: <id> <on|off>")]
    Available(String),
    #[command(description = "Delete one of your dishes: <id>")]
    DeleteDish(String),
    #[command(description = "Upgrade to the Pro seller plan.")]
    Upgrade,
    #[command(description = "Admin panel overview.")]
    Admin,
    #[command(description = "Admin: list users: [page | search term]")]
    Users(String),
    #[command(description = "Admin: list all orders: [page]")]
    AllOrders(String),
    #[command(description = "Admin: list all dishes: [page | search term]")]
    AllDishes(String),
    #[command(description = "Admin: recent admin activity: [page]")]
    Logs(String),
    #[command(description = "Admin: delete a user: <user id>")]
    DeleteUser(String),
    #[command(description = "Admin: remove any dish: <id>")]
    RemoveDish(String),
    #[command(description = "Admin: re-activate a suspended seller: <user id>")]
    Activate(String),
    #[command(description = "Admin: toggle a user's watchlist flag: <user id>")]
    Watch(String),
    #[command(description = "Admin: approve a dish: <id>")]
    Approve(String),
    #[command(description = "Admin: reject a dish: <id> <reason>")]
    Reject(String),
    #[command(description = "Admin: export records: <users|dishes|orders> [json]")]
    Export(String),
    #[command(description = "Abort the current checkout or new dish.")]
    Abort,
}

#[derive(Clone, PartialEq, Debug, Default)]
pub enum State {
    #[default]
    Start,
    CheckoutZone,
    CheckoutAddress {
        zone: DeliveryZone,
    },
    CheckoutContact {
        zone: DeliveryZone,
        address: String,
    },
    DishName,
    DishPrice {
        name: String,
    },
    DishCategory {
        name: String,
        price: i64,
    },
    DishCommission {
        name: String,
        price: i64,
        category: Category,
    },
    DishPhoto {
        name: String,
        price: i64,
        category: Category,
        commission: CommissionRate,
    },
}

pub type MyDialogue = Dialogue<State, InMemStorage<State>>;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize the logger with default settings or "info" level if not specified
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting the Chef's BD bot...");

    // Load environment variables from a .env file if present
    dotenv().ok();

    // Initialize configuration from environment variables
    let config = Config::init_from_env()?;

    // Connect to Postgres, creating the database and tables when missing
    let pool = db::init_db(&config.database_url).await?;

    // Marketplace rules shared by the handlers
    let settings = Settings::from_config(&config);
    log::info!(
        "Suspension threshold {}, free plan upload limit {}, {} bootstrap admin(s)",
        settings.suspension_threshold,
        settings.free_plan_upload_limit,
        settings.admin_ids.len()
    );

    // Create a new Telegram bot instance with the token from config
    let bot = Bot::new(&config.telegram_bot_token);

    // Push stored notifications on a schedule; the bot still runs without it
    if let Err(e) =
        services::notifications::schedule_dispatch(pool.clone(), bot.clone(), &config.notification_schedule).await
    {
        log::error!("Failed to schedule notification dispatch: {}", e);
    }

    // Set up the message handler for the bot
    let handler = dialogue::enter::<Update, InMemStorage<State>, State, _>()
        // Handle command messages
        .branch(
            Update::filter_message()
                .branch(dptree::entry().filter_command::<Command>().endpoint(answer)),
        )
        // Handle the checkout and new dish dialogue steps
        .branch(
            Update::filter_message()
                .branch(case![State::CheckoutZone].endpoint(cart::receive_zone))
                .branch(case![State::CheckoutAddress { zone }].endpoint(cart::receive_address))
                .branch(case![State::CheckoutContact { zone, address }].endpoint(cart::receive_contact))
                .branch(case![State::DishName].endpoint(seller::receive_dish_name))
                .branch(case![State::DishPrice { name }].endpoint(seller::receive_dish_price))
                .branch(case![State::DishCategory { name, price }].endpoint(seller::receive_dish_category))
                .branch(
                    case![State::DishCommission { name, price, category }]
                        .endpoint(seller::receive_dish_commission),
                )
                .branch(
                    case![State::DishPhoto {
                        name,
                        price,
                        category,
                        commission
                    }]
                    .endpoint(seller::receive_dish_photo),
                ),
        )
        // Handle menu buttons and all other messages
        .branch(Update::filter_message().endpoint(handle_message));

    // Build and run the dispatcher
    Dispatcher::builder(bot, handler)
        // Add dependencies: database pool, dialogue storage and marketplace settings
        .dependencies(dptree::deps![pool, InMemStorage::<State>::new(), settings])
        // Enable handling of Ctrl+C for graceful shutdown
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Shutting down gracefully");
    Ok(())
}

/// Routes a parsed command to its handler.
async fn answer(
    bot: Bot,
    msg: Message,
    cmd: Command,
    pool: sqlx::PgPool,
    dialogue: MyDialogue,
    settings: Settings,
) -> Result<(), Error> {
    log::info!("Received {:?} in chat {}", cmd, msg.chat.id);

    if !matches!(cmd, Command::Abort) && dialogue.get().await?.is_some_and(|state| state != State::Start) {
        dialogue.exit().await?;
    }

    match cmd {
        Command::Start => account::start(bot, msg, pool, settings).await?,
        Command::Help => account::help(bot, msg).await?,
        Command::Menu => account::menu(bot, msg, pool).await?,
        Command::Dishes(args) => catalog::list_dishes(bot, msg, pool, args).await?,
        Command::Dish(args) => catalog::show_dish(bot, msg, pool, args).await?,
        Command::Categories => catalog::list_categories(bot, msg).await?,
        Command::Sellers => catalog::list_sellers(bot, msg, pool).await?,
        Command::Seller(args) => catalog::show_seller(bot, msg, pool, args).await?,
        Command::Add(args) => cart::add(bot, msg, pool, args).await?,
        Command::Remove(args) => cart::remove(bot, msg, pool, args).await?,
        Command::Cart => cart::show_cart(bot, msg, pool).await?,
        Command::Checkout => cart::start_checkout(bot, msg, pool, dialogue).await?,
        Command::Orders => cart::my_orders(bot, msg, pool).await?,
        Command::Order(args) => cart::show_order(bot, msg, pool, args).await?,
        Command::Cancel(args) => cart::cancel(bot, msg, pool, settings, args).await?,
        Command::Notifications(args) => account::list_notifications(bot, msg, pool, args).await?,
        Command::Read(args) => account::mark_read(bot, msg, pool, args).await?,
        Command::ReadAll => account::mark_all_read(bot, msg, pool).await?,
        Command::Profile(args) => account::profile(bot, msg, pool, args).await?,
        Command::Sell(args) => seller::sell(bot, msg, pool, args).await?,
        Command::Dashboard => seller::dashboard(bot, msg, pool).await?,
        Command::MyDishes => seller::my_dishes(bot, msg, pool).await?,
        Command::Incoming => seller::incoming(bot, msg, pool).await?,
        Command::Status(args) => seller::update_status(bot, msg, pool, settings, args).await?,
        Command::NewDish => seller::start_new_dish(bot, msg, pool, settings, dialogue).await?,
        Command::EditDish(args) => seller::edit_dish(bot, msg, pool, args).await?,
        Command::Available(args) => seller::set_available(bot, msg, pool, args).await?,
        Command::DeleteDish(args) => seller::delete_dish(bot, msg, pool, args).await?,
        Command::Upgrade => seller::upgrade(bot, msg, pool).await?,
        Command::Admin => admin::panel(bot, msg, pool).await?,
        Command::Users(args) => admin::list_users(bot, msg, pool, args).await?,
        Command::AllOrders(args) => admin::list_orders(bot, msg, pool, args).await?,
        Command::AllDishes(args) => admin::list_dishes(bot, msg, pool, args).await?,
        Command::Logs(args) => admin::list_logs(bot, msg, pool, args).await?,
        Command::DeleteUser(args) => admin::delete_user(bot, msg, pool, args).await?,
        Command::RemoveDish(args) => admin::remove_dish(bot, msg, pool, args).await?,
        Command::Activate(args) => admin::activate(bot, msg, pool, args).await?,
        Command::Watch(args) => admin::watch(bot, msg, pool, args).await?,
        Command::Approve(args) => admin::approve(bot, msg, pool, args).await?,
        Command::Reject(args) => admin::reject(bot, msg, pool, args).await?,
        Command::Export(args) => admin::export(bot, msg, pool, args).await?,
        Command::Abort => {
            dialogue.exit().await?;
            bot.send_message(msg.chat.id, "Cancelled.")
                .reply_markup(ReplyMarkup::KeyboardRemove(KeyboardRemove::new()))
                .await?;
        }
    };

    Ok(())
}

/// Handles the main menu buttons and any other plain text.
async fn handle_message(bot: Bot, msg: Message, pool: sqlx::PgPool) -> Result<(), Error> {
    if let Some(text) = msg.text() {
        match text {
            account::BUTTON_DISHES => catalog::list_dishes(bot, msg, pool, String::new()).await?,
            account::BUTTON_CART => cart::show_cart(bot, msg, pool).await?,
            account::BUTTON_ORDERS => cart::my_orders(bot, msg, pool).await?,
            account::BUTTON_NOTIFICATIONS => account::list_notifications(bot, msg, pool, String::new()).await?,
            account::BUTTON_DASHBOARD => seller::dashboard(bot, msg, pool).await?,
            account::BUTTON_ADMIN => admin::panel(bot, msg, pool).await?,
            account::BUTTON_HELP => account::help(bot, msg).await?,
            _ => {
                bot.send_message(
                    msg.chat.id,
                    "I don't understand that. Please use the menu or type /help for available commands.",
                )
                .await?;
            }
        }
    }
    Ok(())
}
