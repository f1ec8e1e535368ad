use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use gateway_tools::GatewayApiError;
use market_payment_engine::{split::SplitError, OrderStoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The order was rejected. {0}")]
    OrderRejected(String),
    #[error("The request conflicts with the current state of the order. {0}")]
    Conflict(String),
    #[error("The payment gateway call failed. {0}")]
    GatewayError(String),
    #[error("Access denied. {0}")]
    Forbidden(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::OrderRejected(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::GatewayError(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<OrderStoreError> for ServerError {
    fn from(e: OrderStoreError) -> Self {
        match e {
            OrderStoreError::NotFound(_) => Self::NoRecordFound(e.to_string()),
            OrderStoreError::InvalidOrder(_) => Self::OrderRejected(e.to_string()),
            OrderStoreError::DuplicateReference(_) |
            OrderStoreError::InvalidTransition { .. } |
            OrderStoreError::AlreadyAssigned { .. } |
            OrderStoreError::AssignmentForbidden(..) |
            OrderStoreError::PaymentReferenceInUse { .. } => Self::Conflict(e.to_string()),
            OrderStoreError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<SplitError> for ServerError {
    fn from(e: SplitError) -> Self {
        match e {
            SplitError::InvalidFeeSchedule(_) => Self::ConfigurationError(e.to_string()),
            _ => Self::OrderRejected(e.to_string()),
        }
    }
}

impl From<GatewayApiError> for ServerError {
    fn from(e: GatewayApiError) -> Self {
        Self::GatewayError(e.to_string())
    }
}
