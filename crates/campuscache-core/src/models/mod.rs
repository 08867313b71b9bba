//! Typed response models for the LMS backend.
//!
//! Endpoint payloads are decoded into these types at the API boundary so
//! the rest of the crate never handles untyped JSON. This module contains:
//!
//! - `Pagination`, `ListPage`: the list envelope shared by every collection endpoint
//! - `Course`, `CourseStatus`, `CourseFilter`: the course catalog
//! - `User`, `Role`, `UserFilter`: admin user management
//! - `Product`, `ProductFilter`: the store

pub mod course;
pub mod page;
pub mod product;
pub mod user;

pub use course::{Course, CourseFilter, CourseStatus};
pub use page::{ListPage, Pagination};
pub use product::{Product, ProductFilter};
pub use user::{Role, User, UserFilter};
