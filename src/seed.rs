use chrono::{DateTime, TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

struct SeedUser {
    id: i64,
    name: &'static str,
    role: &'static str,
    shop_name: Option<&'static str>,
    shop_address: Option<&'static str>,
}

struct SeedDish {
    id: Uuid,
    seller_id: i64,
    name: &'static str,
    description: &'static str,
    price: i64,
    original_price: Option<i64>,
    category: &'static str,
    commission: i64,
    tags: Vec<String>,
    rating: i32,
}

struct SeedOrder {
    id: Uuid,
    buyer_id: i64,
    status: &'static str,
    zone: &'static str,
    shipping_cost: i64,
    created_at: DateTime<Utc>,
    /// Index into the dish list and quantity.
    lines: Vec<(usize, i32)>,
}

fn tags(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|t| t.to_string()).collect()
}

fn get_seed_data() -> (Vec<SeedUser>, Vec<SeedDish>, Vec<SeedOrder>) {
    let users = vec![
        SeedUser {
            id: 1001,
            name: "Rahima Begum",
            role: "seller",
            shop_name: Some("Rahima's Kitchen"),
            shop_address: Some("Jail Road, Rangpur"),
        },
        SeedUser {
            id: 1002,
            name: "Tanvir Hasan",
            role: "seller",
            shop_name: Some("Kacchi Ghor"),
            shop_address: Some("Station Road, Rangpur"),
        },
        SeedUser {
            id: 2001,
            name: "Arif Chowdhury",
            role: "buyer",
            shop_name: None,
            shop_address: None,
        },
        SeedUser {
            id: 2002,
            name: "Sadia Islam",
            role: "buyer",
            shop_name: None,
            shop_address: None,
        },
    ];

    let dishes = vec![
        SeedDish {
            id: Uuid::from_u128(0xa1f0_0000_0000_4000_8000_0000_0000_0001),
            seller_id: 1001,
            name: "Beef Kala Bhuna",
            description: "Slow cooked Chittagong style beef with rice.",
            price: 32_000,
            original_price: Some(35_000),
            category: "Set Menu",
            commission: 7,
            tags: tags(&["spicy", "beef"]),
            rating: 5,
        },
        SeedDish {
            id: Uuid::from_u128(0xa1f0_0000_0000_4000_8000_0000_0000_0002),
            seller_id: 1001,
            name: "Shahi Firni",
            description: "Rice pudding with cardamom and pistachio.",
            price: 9_000,
            original_price: None,
            category: "Dessert",
            commission: 5,
            tags: tags(&["sweet"]),
            rating: 4,
        },
        SeedDish {
            id: Uuid::from_u128(0xb2e0_0000_0000_4000_8000_0000_0000_0001),
            seller_id: 1002,
            name: "Mutton Kacchi Biryani",
            description: "Old Dhaka style kacchi with aloo and borhani.",
            price: 35_000,
            original_price: None,
            category: "Biryani",
            commission: 10,
            tags: tags(&["mutton", "bestseller"]),
            rating: 5,
        },
        SeedDish {
            id: Uuid::from_u128(0xb2e0_0000_0000_4000_8000_0000_0000_0002),
            seller_id: 1002,
            name: "Borhani",
            description: "Spiced yoghurt drink.",
            price: 6_000,
            original_price: None,
            category: "Drinks",
            commission: 5,
            tags: Vec::new(),
            rating: 3,
        },
    ];

    let orders = vec![
        SeedOrder {
            id: Uuid::from_u128(0xc3d0_0000_0000_4000_8000_0000_0000_0001),
            buyer_id: 2001,
            status: "Delivered",
            zone: "inside-rangpur-city",
            shipping_cost: 6_000,
            created_at: Utc.with_ymd_and_hms(2026, 9, 12, 13, 30, 0).unwrap(),
            lines: vec![(2, 2), (3, 2)],
        },
        SeedOrder {
            id: Uuid::from_u128(0xc3d0_0000_0000_4000_8000_0000_0000_0002),
            buyer_id: 2002,
            status: "Preparing",
            zone: "rangpur-division",
            shipping_cost: 10_000,
            created_at: Utc.with_ymd_and_hms(2026, 10, 3, 19, 0, 0).unwrap(),
            lines: vec![(0, 1), (1, 2)],
        },
        SeedOrder {
            id: Uuid::from_u128(0xc3d0_0000_0000_4000_8000_0000_0000_0003),
            buyer_id: 2001,
            status: "Pending",
            zone: "outside-rangpur",
            shipping_cost: 15_000,
            created_at: Utc.with_ymd_and_hms(2026, 10, 15, 20, 15, 0).unwrap(),
            lines: vec![(0, 1), (2, 1)],
        },
    ];

    (users, dishes, orders)
}

pub async fn seed_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    let (users, dishes, orders) = get_seed_data();

    sqlx::raw_sql(include_str!("db/schema.sql")).execute(pool).await?;

    for user in &users {
        sqlx::query(
            "INSERT INTO users (id, name, role, shop_name, shop_address) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user.id)
        .bind(user.name)
        .bind(user.role)
        .bind(user.shop_name)
        .bind(user.shop_address)
        .execute(pool)
        .await?;
    }

    for dish in &dishes {
        sqlx::query(
            "INSERT INTO dishes (id, seller_id, name, description, price, original_price, category, \
             commission_percentage, tags, rating) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(dish.id)
        .bind(dish.seller_id)
        .bind(dish.name)
        .bind(dish.description)
        .bind(dish.price)
        .bind(dish.original_price)
        .bind(dish.category)
        .bind(dish.commission as i32)
        .bind(&dish.tags)
        .bind(dish.rating)
        .execute(pool)
        .await?;
    }
    sqlx::query(
        "UPDATE users u SET product_upload_count = (SELECT COUNT(*) FROM dishes d WHERE d.seller_id = u.id)",
    )
    .execute(pool)
    .await?;

    for order in &orders {
        let mut subtotal = 0;
        let mut platform_fee = 0;
        for (index, quantity) in &order.lines {
            let dish = &dishes[*index];
            let amount = dish.price * i64::from(*quantity);
            subtotal += amount;
            platform_fee += (amount * dish.commission + 50) / 100;
        }

        let mut transaction = pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO orders (id, buyer_id, status, delivery_zone, address, contact, subtotal, \
             shipping_cost, platform_fee, seller_receives, total, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) ON CONFLICT (id) DO NOTHING",
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.status)
        .bind(order.zone)
        .bind("House 12, Road 3, Dhap")
        .bind("01700000000")
        .bind(subtotal)
        .bind(order.shipping_cost)
        .bind(platform_fee)
        .bind(subtotal - platform_fee)
        .bind(subtotal + order.shipping_cost)
        .bind(order.created_at)
        .execute(&mut *transaction)
        .await?;

        if inserted.rows_affected() == 0 {
            continue;
        }

        for (index, quantity) in &order.lines {
            let dish = &dishes[*index];
            sqlx::query(
                "INSERT INTO order_items (order_id, dish_id, seller_id, name, price, quantity, commission_percentage) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(order.id)
            .bind(dish.id)
            .bind(dish.seller_id)
            .bind(dish.name)
            .bind(dish.price)
            .bind(*quantity)
            .bind(dish.commission as i32)
            .execute(&mut *transaction)
            .await?;
        }

        if order.status == "Delivered" {
            let mut sellers: Vec<i64> = order.lines.iter().map(|(index, _)| dishes[*index].seller_id).collect();
            sellers.sort_unstable();
            sellers.dedup();
            for seller_id in sellers {
                sqlx::query("UPDATE users SET delivered_order_count = delivered_order_count + 1 WHERE id = $1")
                    .bind(seller_id)
                    .execute(&mut *transaction)
                    .await?;
            }
        }
        transaction.commit().await?;
    }

    log::info!(
        "Seeded {} users, {} dishes and {} orders",
        users.len(),
        dishes.len(),
        orders.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    dotenvy::dotenv().ok();
    let pool = PgPool::connect(&std::env::var("DATABASE_URL")?).await?;
    seed_database(&pool).await?;
    Ok(())
}
