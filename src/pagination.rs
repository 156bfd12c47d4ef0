//! Flattening of the backend's paginated list envelope

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::fetch::{ApiRequest, ApiResponse};
use crate::middleware::{Middleware, Next};

/// Page metadata lifted out of a `{results, count, next, previous, ...}` body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub count: Option<u64>,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub current_page: Option<u64>,
    pub total_pages: Option<u64>,
    pub page_size: Option<u64>,
}

/// A list result: the items plus page metadata when the backend paginated.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Option<Pagination>,
}

/// Splits a paginated envelope into its results and metadata.
///
/// Bodies without a `results` key are returned untouched.
pub fn unwrap_envelope(body: Value) -> (Value, Option<Pagination>) {
    match body {
        Value::Object(mut map) if map.contains_key("results") => {
            let results = map.remove("results").unwrap_or(Value::Null);
            let pagination = Pagination {
                count: map.get("count").and_then(Value::as_u64),
                next: map.get("next").and_then(Value::as_str).map(str::to_string),
                previous: map.get("previous").and_then(Value::as_str).map(str::to_string),
                current_page: map.get("current_page").and_then(Value::as_u64),
                total_pages: map.get("total_pages").and_then(Value::as_u64),
                page_size: map.get("page_size").and_then(Value::as_u64),
            };
            (results, Some(pagination))
        }
        other => (other, None),
    }
}

/// Response transformer applying [`unwrap_envelope`] to successful bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaginationMiddleware;

#[async_trait]
impl Middleware for PaginationMiddleware {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, Error> {
        let mut response = next.run(request).await?;
        if response.is_success() {
            let (body, pagination) = unwrap_envelope(std::mem::take(&mut response.body));
            response.body = body;
            response.pagination = pagination;
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_is_flattened() {
        let (data, pagination) = unwrap_envelope(json!({
            "results": [{"id": 1}, {"id": 2}],
            "count": 42,
            "next": "http://localhost:8000/api/v1/classes/?page=3",
            "previous": null,
            "current_page": 2,
            "total_pages": 21,
            "page_size": 2
        }));

        assert_eq!(data, json!([{"id": 1}, {"id": 2}]));
        let pagination = pagination.unwrap();
        assert_eq!(pagination.count, Some(42));
        assert_eq!(pagination.previous, None);
        assert_eq!(pagination.current_page, Some(2));
        assert_eq!(pagination.total_pages, Some(21));
        assert_eq!(pagination.page_size, Some(2));
        assert!(pagination.next.unwrap().ends_with("page=3"));
    }

    #[test]
    fn test_plain_bodies_pass_through() {
        let body = json!([{"id": 1}]);
        assert_eq!(unwrap_envelope(body.clone()), (body, None));

        let body = json!({"detail": "ok"});
        assert_eq!(unwrap_envelope(body.clone()), (body, None));
    }
}
