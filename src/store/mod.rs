pub mod chatstore;
pub mod feed;
pub mod jobstore;
pub mod store;
pub mod userstore;
