use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use quotegate_gateway::GatewayError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Gateway(e) => match e {
                GatewayError::UnknownRole(_) | GatewayError::UnknownProvider(_) => {
                    StatusCode::NOT_FOUND
                }
                GatewayError::Adapter(_)
                | GatewayError::ChainExhausted { .. }
                | GatewayError::Unreachable(_)
                | GatewayError::Remote { .. } => StatusCode::BAD_GATEWAY,
                GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            code: status.as_u16(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
