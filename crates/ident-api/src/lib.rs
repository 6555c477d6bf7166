//! JSON HTTP API for identity resolution.
//!
//! Exposes an axum [`Router`] driving an [`ident_core::resolver::Resolver`]
//! over any [`ContactStore`]. Binding, TLS and auth are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = ident_api::api_router(Resolver::new(Arc::new(store)));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod identify;
pub mod wire;

use axum::{
  Router,
  routing::{get, post},
};
use ident_core::{resolver::Resolver, store::ContactStore};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Build the API router for `resolver`.
///
/// | Method | Path | Notes |
/// |--------|------|-------|
/// | `POST` | `/identify` | Resolve and, if needed, link or merge |
/// | `GET`  | `/lookup`   | Read-only; 404 when nothing matches |
pub fn api_router<S>(resolver: Resolver<S>) -> Router<()>
where
  S: ContactStore + 'static,
{
  Router::new()
    .route("/identify", post(identify::identify::<S>))
    .route("/lookup", get(identify::lookup::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(resolver)
}
