//! Custom Axum extractors.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

use crate::Error;

/// JSON body extractor whose rejections use the service's `{"error": ...}` shape.
///
/// Malformed JSON, a wrong content type or a body that does not match `T` all become
/// `400 Bad Request`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                tracing::debug!(status = %rejection.status(), "Rejected request body");
                Err(Error::Validation(format!(
                    "invalid request: {}",
                    rejection.body_text()
                )))
            }
        }
    }
}
