//! Event names pushed by the backend.

pub const COURSES_UPDATE: &str = "courses:update";
pub const ADMIN_USERS_UPDATE: &str = "admin:users:update";
pub const PRODUCTS_UPDATE: &str = "products:update";
pub const ENROLLMENTS_UPDATE: &str = "enrollments:update";

pub const ALL: &[&str] = &[
    COURSES_UPDATE,
    ADMIN_USERS_UPDATE,
    PRODUCTS_UPDATE,
    ENROLLMENTS_UPDATE,
];

pub fn is_known(event: &str) -> bool {
    ALL.contains(&event)
}
