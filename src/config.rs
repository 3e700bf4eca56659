// config.rs
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub feed_retention: usize,
    pub subscriber_queue_capacity: usize,
    pub allowed_origin: String,
}

impl Config {
    pub fn init() -> Config {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(8000);

        // How many committed events the change feed keeps for replay before
        // a reconnecting subscriber is forced into a full resync.
        let feed_retention = std::env::var("FEED_RETENTION")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(1024);

        let subscriber_queue_capacity = std::env::var("SUBSCRIBER_QUEUE_CAPACITY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .unwrap_or(64);

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        Config {
            port,
            feed_retention,
            subscriber_queue_capacity,
            allowed_origin,
        }
    }
}
