pub mod sessions;

pub use sessions::SessionRow;
