pub mod admin;
pub mod cart;
pub mod catalog;
pub mod notifications;
pub mod orders;
pub mod pricing;
pub mod reports;
pub mod stats;
pub mod users;
