use axum::{
    body::Body,
    http::{header, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
pub struct Assets;

pub async fn static_handler(path: axum::extract::Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    if path.is_empty() || path == "index.html" {
        return serve_asset("index.html").into_response();
    }

    match serve_asset(path) {
        Ok(response) => response.into_response(),
        Err(status) => (status, "404 Not Found").into_response(),
    }
}

pub async fn index_handler() -> impl IntoResponse {
    match serve_asset("index.html") {
        Ok(response) => response.into_response(),
        Err(status) => (status, "Form page missing from the build").into_response(),
    }
}

fn serve_asset(path: &str) -> Result<Response<Body>, StatusCode> {
    let asset = Assets::get(path).ok_or(StatusCode::NOT_FOUND)?;
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type =
        HeaderValue::from_str(mime.as_ref()).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(asset.data.into_owned()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_embedded_as_html() {
        let response = serve_asset("index.html").unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
    }

    #[test]
    fn test_unknown_asset_is_not_found() {
        assert_eq!(
            serve_asset("nope.js").unwrap_err(),
            StatusCode::NOT_FOUND
        );
    }
}
