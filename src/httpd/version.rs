use axum::Json;
use vcc_json::Versions;

fn versions() -> Versions {
    Versions {
        vcc_httpd_git: git_version::git_version!(fallback = "unknown").to_string(),
        vcc_httpd_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub async fn get_versions() -> Json<Versions> {
    Json(versions())
}
