pub mod entry;
pub mod import;
pub mod page;
pub mod user;
