pub mod gateway;
pub mod health;
pub mod login;
pub mod password_reset;
pub mod register;
pub mod verify;

pub use gateway::{forward_to_auth, rate_limit, response_cache};
pub use health::health_check;
pub use login::login;
pub use password_reset::{forgot_password, reset_password};
pub use register::register;
pub use verify::verify_token;
