use crate::{Envelope, GatewayApiError};

/// Unwraps a gateway envelope, turning `status: false` or a missing `data` field into an error.
pub fn unwrap_envelope<T>(envelope: Envelope<T>, status: u16) -> Result<T, GatewayApiError> {
    if !envelope.status {
        return Err(GatewayApiError::QueryError { status, message: envelope.message });
    }
    envelope.data.ok_or(GatewayApiError::EmptyResponse(envelope.message))
}

/// Gateway error bodies are usually envelopes too. Pull the message out if we can.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<Envelope<serde_json::Value>>(body).map(|e| e.message).unwrap_or_else(|_| body.to_string())
}
