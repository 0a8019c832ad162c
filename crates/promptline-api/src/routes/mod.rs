pub mod docs;
pub mod health;
pub mod index;
pub mod sessions;
