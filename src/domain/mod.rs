/// Core account types shared by the auth services and the stores

mod role;
mod user;

pub use role::{Role, UnknownRole};
pub use user::{NewUser, User};
