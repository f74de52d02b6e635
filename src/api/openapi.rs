use super::handlers::{auth, health, users};
use utoipa::openapi::{InfoBuilder, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both
/// served and documented. Routes added outside (like `/` or `OPTIONS
/// /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("PIN verification and session issuance".to_string());

    let mut two_fa_tag = Tag::new("2fa");
    two_fa_tag.description = Some("One-time email codes".to_string());

    let mut users_tag = Tag::new("users");
    users_tag.description = Some("First-time-setup collaborator calls".to_string());

    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![auth_tag, two_fa_tag, users_tag]);

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(auth::pin_login::pin_verify))
        .routes(routes!(auth::two_fa::setup))
        .routes(routes!(auth::two_fa::set_email))
        .routes(routes!(auth::two_fa::send_code))
        .routes(routes!(auth::two_fa::verify))
        .routes(routes!(auth::two_fa::disable))
        .routes(routes!(users::mark_verified))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum defaults.
    let info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(Some(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    OpenApiBuilder::new().info(info).build()
}
