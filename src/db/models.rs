use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use phf::phf_map;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::ParseError;

/// Declares a closed set of values stored as TEXT.
///
/// Generates `as_str`, `Display`, case-insensitive `FromStr`, the
/// `TryFrom<String>` used by `#[sqlx(try_from = "String")]`, and serde
/// impls that go through the same strings.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| ParseError::new($kind, s))
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

text_enum!(Role, "role", {
    Buyer => "buyer",
    Seller => "seller",
    Admin => "admin",
    Moderator => "moderator",
});

impl Role {
    pub fn can_access_admin_panel(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

text_enum!(SellerPlan, "plan", {
    Free => "free",
    Pro => "pro",
});

text_enum!(OrderStatus, "order status", {
    Pending => "Pending",
    Preparing => "Preparing",
    Delivered => "Delivered",
    Cancelled => "Cancelled",
});

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Pending -> Preparing | Cancelled, Preparing -> Delivered | Cancelled.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Preparing) | (Pending, Cancelled) | (Preparing, Delivered) | (Preparing, Cancelled)
        )
    }
}

text_enum!(ApprovalStatus, "approval status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

text_enum!(NotificationType, "notification type", {
    NewOrder => "new-order",
    OrderStatus => "order-status",
    NewProduct => "new-product",
    AccountSuspended => "account-suspended",
    AccountActivated => "account-activated",
});

text_enum!(LogTarget, "log target", {
    User => "user",
    Dish => "dish",
    Order => "order",
    System => "system",
});

text_enum!(Category, "category", {
    Burger => "Burger",
    Pizza => "Pizza",
    Drinks => "Drinks",
    Dessert => "Dessert",
    Biryani => "Biryani",
    Kebab => "Kebab",
    SetMenu => "Set Menu",
    Pasta => "Pasta",
    Soup => "Soup",
    Salad => "Salad",
});

static CATEGORY_ALIASES: phf::Map<&'static str, Category> = phf_map! {
    "burger" => Category::Burger,
    "burgers" => Category::Burger,
    "pizza" => Category::Pizza,
    "drink" => Category::Drinks,
    "drinks" => Category::Drinks,
    "dessert" => Category::Dessert,
    "desserts" => Category::Dessert,
    "biryani" => Category::Biryani,
    "kebab" => Category::Kebab,
    "kebabs" => Category::Kebab,
    "setmenu" => Category::SetMenu,
    "pasta" => Category::Pasta,
    "soup" => Category::Soup,
    "salad" => Category::Salad,
};

impl Category {
    /// Lenient lookup for typed input: `set-menu`, `Set Menu` and `setmenu`
    /// all resolve to the same category.
    pub fn lookup(input: &str) -> Option<Category> {
        let key: String = input
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        CATEGORY_ALIASES.get(key.as_str()).copied()
    }
}

text_enum!(DeliveryZone, "delivery zone", {
    InsideRangpurCity => "inside-rangpur-city",
    RangpurDivision => "rangpur-division",
    OutsideRangpur => "outside-rangpur",
});

impl DeliveryZone {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryZone::InsideRangpurCity => "Inside Rangpur City",
            DeliveryZone::RangpurDivision => "Rangpur Division",
            DeliveryZone::OutsideRangpur => "Outside Rangpur",
        }
    }

    pub fn from_label(label: &str) -> Option<DeliveryZone> {
        DeliveryZone::ALL
            .iter()
            .copied()
            .find(|z| z.label().eq_ignore_ascii_case(label.trim()) || z.as_str() == label.trim())
    }
}

/// Platform commission taken from every line item, in percent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommissionRate(u8);

impl CommissionRate {
    pub const ALLOWED: [u8; 3] = [5, 7, 10];

    pub fn new(percent: u8) -> Result<Self, ParseError> {
        if Self::ALLOWED.contains(&percent) {
            Ok(CommissionRate(percent))
        } else {
            Err(ParseError::new("commission percentage", percent.to_string()))
        }
    }

    pub fn percent(&self) -> u8 {
        self.0
    }

    /// Commission on `amount` paisa, rounded half up.
    pub fn fee_on(&self, amount: i64) -> i64 {
        (amount * i64::from(self.0) + 50) / 100
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        CommissionRate(5)
    }
}

impl TryFrom<i32> for CommissionRate {
    type Error = ParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| ParseError::new("commission percentage", value.to_string()))
            .and_then(CommissionRate::new)
    }
}

impl FromStr for CommissionRate {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_end_matches('%')
            .parse::<u8>()
            .map_err(|_| ParseError::new("commission percentage", s))
            .and_then(CommissionRate::new)
    }
}

impl fmt::Display for CommissionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for CommissionRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for CommissionRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        CommissionRate::new(raw).map_err(serde::de::Error::custom)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub avatar: Option<String>,
    pub shop_name: Option<String>,
    pub shop_address: Option<String>,
    #[sqlx(try_from = "String")]
    pub plan_type: SellerPlan,
    pub product_upload_count: i32,
    pub delivered_order_count: i32,
    pub is_suspended: bool,
    pub on_watchlist: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Shop name for sellers that set one, otherwise the account name.
    pub fn display_name(&self) -> &str {
        self.shop_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Dish {
    pub id: Uuid,
    pub seller_id: i64,
    pub name: String,
    pub description: String,
    pub images: Vec<String>,
    pub price: i64,
    pub original_price: Option<i64>,
    #[sqlx(try_from = "String")]
    pub category: Category,
    pub delivery_time: String,
    #[sqlx(try_from = "i32")]
    pub commission_percentage: CommissionRate,
    pub tags: Vec<String>,
    pub rating: i32,
    pub is_available: bool,
    #[sqlx(try_from = "String")]
    pub approval_status: ApprovalStatus,
    pub approval_reason: Option<String>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a dish taken at checkout.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub order_id: Uuid,
    pub dish_id: Uuid,
    pub seller_id: i64,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
    #[sqlx(try_from = "i32")]
    pub commission_percentage: CommissionRate,
}

impl OrderItem {
    pub fn line_total(&self) -> i64 {
        self.price * i64::from(self.quantity)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: i64,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    #[sqlx(try_from = "String")]
    pub delivery_zone: DeliveryZone,
    pub address: String,
    pub contact: String,
    pub subtotal: i64,
    pub shipping_cost: i64,
    pub platform_fee: i64,
    pub seller_receives: i64,
    pub total: i64,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Distinct sellers with at least one line item, ascending.
    pub fn seller_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.items.iter().map(|item| item.seller_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn involves_seller(&self, seller_id: i64) -> bool {
        self.items.iter().any(|item| item.seller_id == seller_id)
    }

    /// The same order with only `seller_id`'s line items kept.
    pub fn for_seller(&self, seller_id: i64) -> Order {
        let mut order = self.clone();
        order.items.retain(|item| item.seller_id == seller_id);
        order
    }
}

/// A cart row joined with the live dish it points at.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CartLine {
    pub dish_id: Uuid,
    pub seller_id: i64,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
    #[sqlx(try_from = "i32")]
    pub commission_percentage: CommissionRate,
    pub is_available: bool,
}

impl CartLine {
    pub fn line_total(&self) -> i64 {
        self.price * i64::from(self.quantity)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub kind: NotificationType,
    pub message: String,
    pub is_read: bool,
    pub order_id: Option<Uuid>,
    pub dish_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct AdminLog {
    pub id: Uuid,
    pub admin_id: i64,
    pub admin_name: String,
    pub action: String,
    #[sqlx(try_from = "String")]
    pub target_type: LogTarget,
    pub target_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!("delivered".parse::<OrderStatus>(), Ok(OrderStatus::Delivered));
        assert_eq!(" PREPARING ".parse::<OrderStatus>(), Ok(OrderStatus::Preparing));
        assert!("Shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn only_forward_transitions_are_allowed() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Preparing));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Preparing.can_transition_to(Delivered));
        assert!(Preparing.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Preparing));
        assert!(Delivered.is_terminal() && Cancelled.is_terminal());
    }

    #[test]
    fn commission_is_restricted_to_known_rates() {
        assert_eq!(CommissionRate::try_from(7).map(|c| c.percent()), Ok(7));
        assert!(CommissionRate::try_from(6).is_err());
        assert!(CommissionRate::try_from(-5).is_err());
        assert_eq!("10%".parse::<CommissionRate>().map(|c| c.percent()), Ok(10));
        assert_eq!(CommissionRate::default().percent(), 5);
    }

    #[test]
    fn commission_fee_rounds_half_up() {
        let rate = CommissionRate::new(7).unwrap();
        assert_eq!(rate.fee_on(10_000), 700);
        // 7% of 250 paisa is 17.5
        assert_eq!(rate.fee_on(250), 18);
        assert_eq!(CommissionRate::default().fee_on(0), 0);
    }

    #[test]
    fn category_lookup_accepts_loose_spelling() {
        assert_eq!(Category::lookup("set-menu"), Some(Category::SetMenu));
        assert_eq!(Category::lookup("Set Menu"), Some(Category::SetMenu));
        assert_eq!(Category::lookup("Burgers"), Some(Category::Burger));
        assert_eq!(Category::lookup("sushi"), None);
        assert_eq!("Set Menu".parse::<Category>(), Ok(Category::SetMenu));
    }

    #[test]
    fn zones_parse_from_slug_and_label() {
        assert_eq!(
            DeliveryZone::from_label("Rangpur Division"),
            Some(DeliveryZone::RangpurDivision)
        );
        assert_eq!(
            DeliveryZone::from_label("outside-rangpur"),
            Some(DeliveryZone::OutsideRangpur)
        );
        assert_eq!(DeliveryZone::from_label("Dhaka"), None);
    }

    #[test]
    fn enums_serialize_as_their_stored_text() {
        let json = serde_json::to_string(&NotificationType::AccountSuspended).unwrap();
        assert_eq!(json, "\"account-suspended\"");
        let back: NotificationType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NotificationType::AccountSuspended);
    }

    #[test]
    fn seller_view_of_an_order_keeps_only_their_items() {
        let item = |seller_id: i64| OrderItem {
            order_id: Uuid::nil(),
            dish_id: Uuid::new_v4(),
            seller_id,
            name: "Kacchi".to_string(),
            price: 35_000,
            quantity: 1,
            commission_percentage: CommissionRate::default(),
        };
        let order = Order {
            id: Uuid::nil(),
            buyer_id: 1,
            status: OrderStatus::Pending,
            delivery_zone: DeliveryZone::InsideRangpurCity,
            address: "Station Road".to_string(),
            contact: "01700000000".to_string(),
            subtotal: 0,
            shipping_cost: 0,
            platform_fee: 0,
            seller_receives: 0,
            total: 0,
            created_at: Utc::now(),
            items: vec![item(30), item(10), item(30)],
        };

        assert_eq!(order.seller_ids(), vec![10, 30]);
        assert!(order.involves_seller(10));
        assert!(!order.involves_seller(99));
        assert_eq!(order.for_seller(30).items.len(), 2);
    }
}
