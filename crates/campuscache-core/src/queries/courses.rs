use crate::api::ApiClient;
use crate::cache::{Mutation, Query, QueryClient};
use crate::models::{Course, CourseFilter, ListPage};

use super::keys;

pub fn courses(api: &ApiClient, filter: CourseFilter) -> Query<ListPage<Course>> {
    let key = keys::courses(&filter);
    let enabled = api.has_token();
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        let filter = filter.clone();
        async move { api.fetch_courses(&filter).await }
    })
    .enabled(enabled)
}

pub fn course(api: &ApiClient, id: impl Into<String>) -> Query<Course> {
    let id: String = id.into();
    let key = keys::course(&id);
    let enabled = api.has_token() && !id.is_empty();
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        let id = id.clone();
        async move { api.fetch_course(&id).await }
    })
    .enabled(enabled)
}

/// Approve a pending course. Refreshes every course list and detail.
pub fn approve_course(client: &QueryClient, api: &ApiClient) -> Mutation<String, Course> {
    let api = api.clone();
    Mutation::new(client, "approve_course", move |id: String| {
        let api = api.clone();
        async move { api.approve_course(&id).await }
    })
    .validate(|id: &String| require_id(id))
    .invalidates(keys::all_courses())
}

/// Reject a pending course with a reason shown to the instructor.
pub fn reject_course(client: &QueryClient, api: &ApiClient) -> Mutation<(String, String), Course> {
    let api = api.clone();
    Mutation::new(client, "reject_course", move |(id, reason): (String, String)| {
        let api = api.clone();
        async move { api.reject_course(&id, &reason).await }
    })
    .validate(|(id, reason): &(String, String)| {
        require_id(id)?;
        if reason.trim().is_empty() {
            return Err("A rejection reason is required".to_string());
        }
        Ok(())
    })
    .invalidates(keys::all_courses())
}

pub(crate) fn require_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err("An id is required".to_string())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::ApiError;
    use crate::auth::StaticToken;
    use crate::cache::CacheConfig;

    #[tokio::test]
    async fn test_query_disabled_without_token() {
        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9", Arc::new(StaticToken::anonymous())).unwrap();

        let query = courses(&api, CourseFilter::default());
        assert!(!query.options().enabled);

        let view = client.subscribe(query).unwrap();
        assert!(view.state().is_idle());
        assert_eq!(client.stats().fetches_started, 0);
    }

    #[tokio::test]
    async fn test_course_list_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/courses"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "courses": [{"_id": "c-6", "title": "Compilers", "status": "published"}],
                "pagination": {"page": 2, "limit": 5, "total": 6}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let api = ApiClient::new(server.uri(), Arc::new(StaticToken::new("tok"))).unwrap();
        let mut view = client.subscribe(courses(&api, CourseFilter::page(2, 5))).unwrap();

        let page = view.wait_settled().await.data.unwrap();
        assert_eq!(page.items[0].title, "Compilers");
        assert_eq!(page.total(), 6);
        assert!(!page.pagination.unwrap().has_next());
    }

    #[tokio::test]
    async fn test_reject_requires_reason() {
        let client = QueryClient::new(CacheConfig::default()).unwrap();
        let api = ApiClient::new("http://127.0.0.1:9", Arc::new(StaticToken::new("tok"))).unwrap();

        let reject = reject_course(&client, &api);
        let err = reject
            .mutate(("c-1".to_string(), " ".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(&*err, ApiError::Validation(m) if m == "A rejection reason is required"));
        assert_eq!(client.stats().invalidations, 0);
    }
}
