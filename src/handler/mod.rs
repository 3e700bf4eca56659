pub mod businesses;
pub mod chat;
pub mod jobs;
pub mod stream;
pub mod users;
