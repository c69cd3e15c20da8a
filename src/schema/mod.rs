pub mod save;
pub mod story;
