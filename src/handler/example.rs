use axum::http::header;
use axum::response::IntoResponse;

pub async fn handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "This is an example server.\n",
    )
}
