use crate::api::ApiClient;
use crate::cache::{Mutation, Query, QueryClient};
use crate::models::{ListPage, Role, User, UserFilter};

use super::courses::require_id;
use super::keys;

pub fn users(api: &ApiClient, filter: UserFilter) -> Query<ListPage<User>> {
    let key = keys::users(&filter);
    let enabled = api.has_token();
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        let filter = filter.clone();
        async move { api.fetch_users(&filter).await }
    })
    .enabled(enabled)
}

pub fn update_user_role(client: &QueryClient, api: &ApiClient) -> Mutation<(String, Role), User> {
    let api = api.clone();
    Mutation::new(client, "update_user_role", move |(id, role): (String, Role)| {
        let api = api.clone();
        async move { api.update_user_role(&id, role).await }
    })
    .validate(|(id, role): &(String, Role)| {
        require_id(id)?;
        if *role == Role::Unknown {
            return Err("Choose a role".to_string());
        }
        Ok(())
    })
    .invalidates(keys::all_users())
}

pub fn set_user_active(client: &QueryClient, api: &ApiClient) -> Mutation<(String, bool), User> {
    let api = api.clone();
    Mutation::new(client, "set_user_active", move |(id, active): (String, bool)| {
        let api = api.clone();
        async move { api.set_user_active(&id, active).await }
    })
    .validate(|(id, _): &(String, bool)| require_id(id))
    .invalidates(keys::all_users())
}
