use axum::{
    async_trait,
    extract::{
        rejection::JsonRejection,
        FromRequest, FromRequestParts, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;
use serde_path_to_error::Segment;
use tracing::warn;

use crate::error::{ApiError, FieldErrors, NON_FIELD_ERRORS};

/// JSON body whose failures come back as field errors instead of axum's plain-text 4xx.
///
/// Syntax and content-type problems are reported under `non_field_errors`;
/// a value of the wrong shape is reported under the top-level field it sits in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

/// Query string extractor with the same error contract as [`ApiJson`].
#[derive(Debug, Clone, Default)]
pub struct ApiQuery<T>(pub T);

fn json_rejection(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "json body rejected");
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Unsupported media type, expected application/json.".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "JSON parse error.".to_string(),
        other => other.body_text(),
    };
    ApiError::field(NON_FIELD_ERRORS, message)
}

/// Field key for a deserialization error at `path`.
fn field_of(err: &serde_path_to_error::Error<serde_json::Error>) -> String {
    match err.path().iter().next() {
        Some(Segment::Map { key }) => key.clone(),
        _ => NON_FIELD_ERRORS.to_string(),
    }
}

pub(crate) fn from_json_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, ApiError> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let field = field_of(&err);
        warn!(%field, path = %err.path(), error = %err.inner(), "json field rejected");
        ApiError::Validation(FieldErrors::single(&field, err.inner().to_string()))
    })
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<serde_json::Value>::from_request(req, state)
            .await
            .map_err(json_rejection)?;
        from_json_value(value).map(ApiJson)
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => {
                warn!(error = %rejection.body_text(), "query string rejected");
                Err(ApiError::field(NON_FIELD_ERRORS, "Invalid query string."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use serde_json::json;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize)]
    struct Dish {
        #[allow(dead_code)]
        name: String,
        cooking_time: i64,
        #[serde(default)]
        amounts: Vec<i64>,
    }

    #[derive(Debug, Deserialize)]
    struct Search {
        limit: u32,
    }

    fn errors(err: ApiError) -> FieldErrors {
        match err {
            ApiError::Validation(errors) => errors,
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_type_is_keyed_by_field() {
        let err = from_json_value::<Dish>(json!({"name": "soup", "cooking_time": "ten"})).unwrap_err();
        let errors = errors(err);
        let messages = errors.get("cooking_time").unwrap();
        assert!(messages[0].contains("invalid type"), "{messages:?}");
    }

    #[test]
    fn nested_error_is_keyed_by_top_level_field() {
        let err = from_json_value::<Dish>(json!({
            "name": "soup",
            "cooking_time": 10,
            "amounts": [1, "two"]
        }))
        .unwrap_err();
        assert!(errors(err).get("amounts").is_some());
    }

    #[test]
    fn wrong_root_shape_is_a_non_field_error() {
        let err = from_json_value::<Dish>(json!([1, 2, 3])).unwrap_err();
        assert!(errors(err).get(NON_FIELD_ERRORS).is_some());
    }

    #[test]
    fn well_formed_value_deserializes() {
        let dish = from_json_value::<Dish>(json!({"name": "soup", "cooking_time": 10})).unwrap();
        assert_eq!(dish.cooking_time, 10);
        assert!(dish.amounts.is_empty());
    }

    async fn accept_dish(ApiJson(dish): ApiJson<Dish>) -> String {
        dish.cooking_time.to_string()
    }

    async fn accept_search(ApiQuery(search): ApiQuery<Search>) -> impl IntoResponse {
        search.limit.to_string()
    }

    fn router() -> Router {
        Router::new()
            .route("/dish", post(accept_dish))
            .route("/search", get(accept_search))
    }

    async fn body_json(res: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_dish(content_type: Option<&str>, body: &str) -> axum::http::Request<Body> {
        let mut req = axum::http::Request::builder().method("POST").uri("/dish");
        if let Some(ct) = content_type {
            req = req.header(header::CONTENT_TYPE, ct);
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn wrong_typed_body_is_a_400_field_error() {
        let res = router()
            .oneshot(post_dish(
                Some("application/json"),
                r#"{"name":"soup","cooking_time":"ten"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(res).await;
        assert!(body["cooking_time"][0].as_str().unwrap().contains("invalid type"));
    }

    #[tokio::test]
    async fn broken_json_and_missing_content_type_are_non_field_errors() {
        for req in [
            post_dish(Some("application/json"), "{not json"),
            post_dish(None, r#"{"name":"soup","cooking_time":1}"#),
        ] {
            let res = router().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            let body = body_json(res).await;
            assert!(body[NON_FIELD_ERRORS].is_array(), "{body}");
        }
    }

    #[tokio::test]
    async fn malformed_query_is_a_400_field_error() {
        let res = router()
            .oneshot(
                axum::http::Request::builder()
                    .uri("/search?limit=lots")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body[NON_FIELD_ERRORS].is_array());
    }
}
