use axum::http::StatusCode;

pub async fn handler() -> StatusCode {
    tracing::trace!("live");
    StatusCode::OK
}
