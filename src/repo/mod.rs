pub mod history;
pub mod sessions;
pub mod users;
pub mod videos;
