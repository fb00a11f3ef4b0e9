pub mod attribute;
pub mod auth;
pub mod recipe;
pub mod user;

pub use attribute::*;
pub use auth::*;
pub use recipe::*;
pub use user::*;
