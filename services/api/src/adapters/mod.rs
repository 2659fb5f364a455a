pub mod db;
pub mod file;

pub use db::DbAdapter;
pub use file::JsonFileAdapter;
