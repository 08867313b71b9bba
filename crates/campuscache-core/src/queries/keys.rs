//! Cache key builders. Keep these in one place so views and mutations agree
//! on key shapes.

use crate::api::client::{COURSES_ENDPOINT, PRODUCTS_ENDPOINT, USERS_ENDPOINT};
use crate::cache::CacheKey;
use crate::models::{CourseFilter, ProductFilter, UserFilter};

pub fn all_courses() -> CacheKey {
    CacheKey::new(COURSES_ENDPOINT)
}

pub fn courses(filter: &CourseFilter) -> CacheKey {
    all_courses().with(filter)
}

pub fn course(id: &str) -> CacheKey {
    all_courses().with("detail").with(id)
}

pub fn all_users() -> CacheKey {
    CacheKey::new(USERS_ENDPOINT)
}

pub fn users(filter: &UserFilter) -> CacheKey {
    all_users().with(filter)
}

pub fn all_products() -> CacheKey {
    CacheKey::new(PRODUCTS_ENDPOINT)
}

pub fn products(filter: &ProductFilter) -> CacheKey {
    all_products().with(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_course_list_key_shape() {
        let key = courses(&CourseFilter::page(1, 10));
        assert_eq!(key.to_string(), r#"["/api/courses",{"limit":10,"page":1}]"#);
        assert_eq!(
            key,
            CacheKey::new("/api/courses").with(json!({"page": 1, "limit": 10}))
        );
        assert!(key.starts_with(&all_courses()));
    }

    #[test]
    fn test_detail_key_is_under_list_prefix() {
        assert!(course("c-1").starts_with(&all_courses()));
        assert_ne!(course("c-1"), course("c-2"));
    }
}
