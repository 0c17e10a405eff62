mod database;
mod fallback_sweeper;
mod redis;
mod state_builder;

pub use database::connect_and_migrate;
pub use fallback_sweeper::spawn_fallback_sweeper;
pub use redis::build_redis_client;
pub use state_builder::build_app_state;
