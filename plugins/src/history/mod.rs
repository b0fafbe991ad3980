pub mod file;

pub use file::FileHistoryProvider;
