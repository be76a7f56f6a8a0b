pub mod batch_inserter;
pub mod csv_parser;
pub mod duplicate_reconciler;
pub mod entry_store;
pub mod entry_validator;
pub mod import_service;
