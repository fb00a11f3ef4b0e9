pub mod attribute;
pub mod image;
pub mod reconciler;
pub mod recipe;
pub mod scope;
pub mod user;

pub use attribute::AttributeService;
pub use image::{FsImageStore, ImageStore};
pub use reconciler::Reconciler;
pub use recipe::RecipeService;
pub use scope::OwnerScope;
pub use user::UserService;
