pub mod daily_task;
pub mod user;
