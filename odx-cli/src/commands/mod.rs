pub mod export;
pub mod images;
pub mod import;
pub mod passwd;
pub mod purge;
