pub mod actions;
pub mod callback;
pub mod hints;
pub mod notification;
pub mod protocol;
pub mod utils;
