//! Handlers for `/identify` and `/lookup`.

use axum::{
  Json,
  extract::{
    Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
};
use ident_core::{resolver::Resolver, store::ContactStore};
use tracing::debug;

use crate::{
  error::ApiError,
  wire::{IdentifyRequest, IdentifyResponse, LookupParams, PhoneNumber},
};

/// `POST /identify` — body: `{"email":"..","phoneNumber":".."}`
pub async fn identify<S>(
  State(resolver): State<Resolver<S>>,
  body: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: ContactStore + 'static,
{
  let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let phone_number = req.phone_number.map(PhoneNumber::into_string);

  let resolution = resolver.resolve(req.email, phone_number).await?;
  debug!(
    primary = resolution.view.primary_contact_id,
    outcome = ?resolution.outcome,
    "identified contact"
  );
  Ok(Json(IdentifyResponse::ok(resolution.view)))
}

/// `GET /lookup?email=..&phoneNumber=..` — never writes.
pub async fn lookup<S>(
  State(resolver): State<Resolver<S>>,
  params: Result<Query<LookupParams>, QueryRejection>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: ContactStore + 'static,
{
  let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let view = resolver
    .lookup(params.email, params.phone_number)
    .await?
    .ok_or(ApiError::NotFound)?;
  Ok(Json(IdentifyResponse::ok(view)))
}
