pub mod auth;
pub mod daily_tasks;
pub mod health;
pub mod stats;
pub mod sub_tasks;
