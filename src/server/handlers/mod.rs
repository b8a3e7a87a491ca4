pub mod bots;
pub mod chat;
pub mod health;
pub mod knowledge;
pub mod tools;
