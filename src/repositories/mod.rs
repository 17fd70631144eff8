pub mod user;

pub use user::{InMemoryUserStore, PgUserStore, UserStore};
