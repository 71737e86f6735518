pub mod image;
pub mod location;
pub mod notification;
pub mod permission;
pub mod product;
pub mod request_log;
pub mod ticket;
pub mod turn;
pub mod user;
