pub mod prelude;

pub mod cities;
pub mod countries;
pub mod group_permissions;
pub mod groups;
pub mod notification_type_links;
pub mod notification_types;
pub mod notifications;
pub mod products;
pub mod provinces;
pub mod request_logs;
pub mod tickets;
pub mod turns;
pub mod user_groups;
pub mod user_images;
pub mod user_permissions;
pub mod users;
