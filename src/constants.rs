/// Default role groups, seeded by the migrations.
pub mod groups {
    pub const ADMIN: &str = "admin_user";

    pub const EMPLOYEE: &str = "employee_user";

    pub const COWORKER: &str = "coworker_user";

    pub const END_USER: &str = "end_user";
}

pub mod media {
    /// Sub-directory of the media root holding user images.
    pub const IMAGES_DIR: &str = "images";

    /// URL prefix the media root is served under.
    pub const URL_PREFIX: &str = "/files";
}

pub mod limits {
    pub const USERNAME_MAX: usize = 150;

    pub const NAME_MAX: usize = 150;

    pub const COMPANY_NAME_MAX: usize = 60;

    pub const NATIONAL_CODE_MAX: usize = 10;

    pub const USER_DESCRIPTION_MAX: usize = 1000;

    pub const NOTIFICATION_TEXT_MAX: usize = 1000;

    pub const NOTIFICATION_TYPE_MAX: usize = 20;

    pub const TURN_DESCRIPTION_MAX: usize = 2000;

    pub const TICKET_SUBJECT_MAX: usize = 255;

    pub const TICKET_TEXT_MAX: usize = 20000;

    pub const REQUEST_FIELD_MAX: usize = 255;

    pub const COMMISSION_MAX: i32 = 100;
}

/// Prefix marking a password hash that can never verify.
pub const UNUSABLE_PASSWORD_PREFIX: &str = "!";
