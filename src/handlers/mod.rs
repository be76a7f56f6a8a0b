pub mod entry_handler;
pub mod import_handler;
pub mod page_handler;
pub mod user_handler;
