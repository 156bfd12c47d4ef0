//! CRUD access to the backend collections managed by the console

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;

use crate::error::Error;
use crate::fetch::ApiRequest;
use crate::http::HttpClient;
use crate::pagination::Page;

/// Client for one REST collection (`classes/`, `plannings/`, ...)
#[derive(Clone)]
pub struct ResourceClient {
    /// Shared authenticated client
    http: HttpClient,

    /// Collection path with its trailing slash
    collection: String,
}

impl ResourceClient {
    /// Create a new ResourceClient
    pub fn new(http: HttpClient, collection: &str) -> Self {
        let collection = collection.trim_matches('/');
        Self {
            http,
            collection: format!("{}/", collection),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn item_path(&self, id: impl Display) -> String {
        format!("{}{}/", self.collection, id)
    }

    /// List the collection, with optional filter or page parameters
    pub async fn list<T: DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> Result<Page<T>, Error> {
        let request = ApiRequest::get(&self.collection).query(params);
        let response = self.http.send_with_retry(request).await?;
        let pagination = response.pagination.clone();
        let data = response.into_json()?;
        Ok(Page { data, pagination })
    }

    /// Fetch a single item
    pub async fn get<T: DeserializeOwned>(&self, id: impl Display) -> Result<T, Error> {
        self.http.get(&self.item_path(id), &[]).await
    }

    /// Create an item
    pub async fn create<B: Serialize, T: DeserializeOwned>(&self, body: &B) -> Result<T, Error> {
        self.http.post(&self.collection, body).await
    }

    /// Replace an item
    pub async fn update<B: Serialize, T: DeserializeOwned>(
        &self,
        id: impl Display,
        body: &B,
    ) -> Result<T, Error> {
        self.http.put(&self.item_path(id), body).await
    }

    /// Partially update an item
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        id: impl Display,
        body: &B,
    ) -> Result<T, Error> {
        self.http.patch(&self.item_path(id), body).await
    }

    /// Delete an item
    pub async fn delete(&self, id: impl Display) -> Result<(), Error> {
        self.http.delete(&self.item_path(id)).await
    }

    fn action_path(&self, sub_path: &str) -> String {
        format!("{}{}", self.collection, sub_path.trim_start_matches('/'))
    }

    /// Call a custom route under the collection with a JSON body, e.g.
    /// `week/` on `plannings/`.
    pub async fn action<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        sub_path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = ApiRequest::new(method, &self.action_path(sub_path)).json(body)?;
        self.http.send_with_retry(request).await?.into_json()
    }

    /// Call a custom route that takes no body, e.g. `admin/valider/{id}/`.
    pub async fn action_empty<T: DeserializeOwned>(
        &self,
        method: Method,
        sub_path: &str,
    ) -> Result<T, Error> {
        let request = ApiRequest::new(method, &self.action_path(sub_path));
        self.http.send_with_retry(request).await?.into_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let http = crate::CampusAdmin::new(crate::config::ClientOptions::default())
            .unwrap()
            .http()
            .clone();
        let classes = ResourceClient::new(http.clone(), "/classes");
        assert_eq!(classes.collection(), "classes/");
        assert_eq!(classes.item_path(12), "classes/12/");

        let plannings = ResourceClient::new(http, "plannings/");
        assert_eq!(plannings.collection(), "plannings/");
        assert_eq!(plannings.item_path("abc"), "plannings/abc/");
        assert_eq!(
            plannings.action_path("/admin/valider/7/"),
            "plannings/admin/valider/7/"
        );
    }
}
