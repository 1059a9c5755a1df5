pub mod core;

pub use self::core::completion_stream;
