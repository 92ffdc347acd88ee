//! Request extractors that report failures as [`ApiError`]

use axum::{
    Json,
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON body that may be left out entirely
///
/// An empty body yields `T::default()`. A body that is present must decode
/// as `T`, otherwise the request fails with 400 before any handler runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for OptionalJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        let Json(value) = Json::<T>::from_bytes(&bytes)?;
        Ok(Self(value))
    }
}
