//! Domain models

pub mod user;

pub use user::{CreateUserInput, DirectoryUser, UpdateUserInput, UserView};
