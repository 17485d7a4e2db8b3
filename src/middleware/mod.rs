use axum::{extract::FromRequestParts, http::request::Parts};

use crate::controllers::error::ApiError;
use crate::models::HolderId;

pub const HOLDER_HEADER: &str = "x-holder-id";
const MAX_HOLDER_LEN: usize = 128;

/// Сессия покупателя из заголовка `X-Holder-Id`.
///
/// Аутентификация вне этого сервиса: шлюз кладёт сюда непрозрачный
/// идентификатор сессии, и все удержания привязываются к нему.
#[derive(Debug, Clone)]
pub struct Holder(pub HolderId);

impl<S> FromRequestParts<S> for Holder
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(HOLDER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .ok_or_else(|| ApiError::unauthorized("заголовок X-Holder-Id обязателен"))?;

        if value.is_empty() || value.len() > MAX_HOLDER_LEN {
            return Err(ApiError::unauthorized("некорректный X-Holder-Id"));
        }

        Ok(Holder(HolderId::new(value)))
    }
}
