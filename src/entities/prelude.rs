pub use super::cities::Entity as Cities;
pub use super::countries::Entity as Countries;
pub use super::group_permissions::Entity as GroupPermissions;
pub use super::groups::Entity as Groups;
pub use super::notification_type_links::Entity as NotificationTypeLinks;
pub use super::notification_types::Entity as NotificationTypes;
pub use super::notifications::Entity as Notifications;
pub use super::products::Entity as Products;
pub use super::provinces::Entity as Provinces;
pub use super::request_logs::Entity as RequestLogs;
pub use super::tickets::Entity as Tickets;
pub use super::turns::Entity as Turns;
pub use super::user_groups::Entity as UserGroups;
pub use super::user_images::Entity as UserImages;
pub use super::user_permissions::Entity as UserPermissions;
pub use super::users::Entity as Users;
