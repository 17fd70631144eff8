pub mod auth;
pub mod cache;
pub mod password;
pub mod proxy;
pub mod rate_limit;
pub mod shared_store;
pub mod token;

pub use auth::AuthService;
pub use cache::ResponseCache;
pub use proxy::ProxyClient;
pub use rate_limit::RateLimiter;
pub use shared_store::{InMemoryStore, RedisStore, SharedStore};
pub use token::TokenCodec;
