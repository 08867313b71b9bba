use crate::api::ApiClient;
use crate::cache::{Mutation, Query, QueryClient};
use crate::models::{ListPage, Product, ProductFilter};

use super::courses::require_id;
use super::keys;

pub fn products(api: &ApiClient, filter: ProductFilter) -> Query<ListPage<Product>> {
    let key = keys::products(&filter);
    let enabled = api.has_token();
    let api = api.clone();
    Query::new(key, move || {
        let api = api.clone();
        let filter = filter.clone();
        async move { api.fetch_products(&filter).await }
    })
    .enabled(enabled)
}

pub fn delete_product(client: &QueryClient, api: &ApiClient) -> Mutation<String, ()> {
    let api = api.clone();
    Mutation::new(client, "delete_product", move |id: String| {
        let api = api.clone();
        async move { api.delete_product(&id).await }
    })
    .validate(|id: &String| require_id(id))
    .invalidates(keys::all_products())
}
