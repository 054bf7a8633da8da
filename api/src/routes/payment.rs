//! Payment log endpoints.
//!
//! `GET /paymentlog` runs the instrumented operation and returns the payload.
//! `GET /error` runs it with a generator that always fails, to demonstrate
//! error recording on the root span.

use crate::operation::OperationError;
use crate::payment::{PaymentLog, RejectingGenerator};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

/// Error response of the payment endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error type.
    pub error: String,
    /// Detailed error message.
    pub message: String,
}

impl From<OperationError> for PaymentError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::Generation(e) => Self {
                error: "generation_failed".to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Creates the payment log routes.
pub fn payment_routes(state: AppState) -> Router {
    Router::new()
        .route("/paymentlog", get(payment_log))
        .route("/error", get(error_demo))
        .with_state(state)
}

/// Handler for payment log generation.
///
/// Returns 200 with the payload, or 500 if it could not be generated.
async fn payment_log(
    State(state): State<AppState>,
) -> Result<Json<PaymentLog>, (StatusCode, Json<PaymentError>)> {
    state
        .operation()
        .handle()
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(e.into())))
}

/// Handler for the demo error route. Always returns 500.
async fn error_demo(State(state): State<AppState>) -> (StatusCode, Json<PaymentError>) {
    let generator = RejectingGenerator::new("demo error route");
    match state.operation().handle_with(&generator) {
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(e.into())),
        Ok(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PaymentError {
                error: "unexpected_success".to_string(),
                message: "The failing generator produced a payload".to_string(),
            }),
        ),
    }
}
