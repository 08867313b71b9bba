//! Ready-made queries and mutations for the LMS dashboards.
//!
//! Every query is keyed `[endpoint, filter]` so an invalidation of the bare
//! endpoint (`["/api/courses"]`) reaches every page and filter combination.
//! Queries are only enabled once the `ApiClient` has a token.

pub mod courses;
pub mod keys;
pub mod products;
pub mod users;

use crate::realtime::{channels, ChannelBinding};

/// Realtime events and the lists they make stale.
pub fn default_bindings() -> Vec<ChannelBinding> {
    vec![
        ChannelBinding::new(channels::COURSES_UPDATE, keys::all_courses()),
        ChannelBinding::new(channels::ADMIN_USERS_UPDATE, keys::all_users()),
        ChannelBinding::new(channels::PRODUCTS_UPDATE, keys::all_products()),
        ChannelBinding::new(channels::ENROLLMENTS_UPDATE, keys::all_courses()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CourseFilter;

    #[test]
    fn test_default_bindings_cover_list_keys() {
        let bindings = default_bindings();
        let courses = bindings
            .iter()
            .find(|b| b.event == channels::COURSES_UPDATE)
            .unwrap();
        assert!(courses
            .invalidates
            .matches(&keys::courses(&CourseFilter::page(2, 10))));
        assert!(!courses.invalidates.matches(&keys::all_products()));
        assert!(bindings.iter().all(|b| channels::is_known(&b.event)));
    }
}
