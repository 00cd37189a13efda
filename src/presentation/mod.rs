pub mod app;
pub mod components;
pub mod log_book;
