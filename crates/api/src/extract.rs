//! Request extractors for the caller identity and idempotency keys.
//!
//! The identity layer in front of this service authenticates the caller and
//! forwards it as `x-actor-role` plus `x-actor-id` (a user UUID, or a
//! component name for `system`).

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use common::{Actor, AdminId, AgentId, BuyerId, Role, VendorId};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = header(parts, ACTOR_ROLE_HEADER)?
            .parse::<Role>()
            .map_err(ApiError::Unauthenticated)?;
        let id = header(parts, ACTOR_ID_HEADER)?;
        parse_actor(role, id).map(Caller)
    }
}

fn parse_actor(role: Role, id: &str) -> Result<Actor, ApiError> {
    fn invalid(e: impl std::fmt::Display) -> ApiError {
        ApiError::Unauthenticated(format!("invalid {ACTOR_ID_HEADER}: {e}"))
    }

    Ok(match role {
        Role::Buyer => Actor::Buyer(id.parse::<BuyerId>().map_err(invalid)?),
        Role::Vendor => Actor::Vendor(id.parse::<VendorId>().map_err(invalid)?),
        Role::Agent => Actor::Agent(id.parse::<AgentId>().map_err(invalid)?),
        Role::Admin => Actor::Admin(id.parse::<AdminId>().map_err(invalid)?),
        Role::System => Actor::system(id),
    })
}

/// Value of the `Idempotency-Key` header, required on wallet mutations.
#[derive(Debug, Clone)]
pub struct IdempotencyKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for IdempotencyKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing Idempotency-Key header".into()))?;
        Ok(IdempotencyKey(key.to_string()))
    }
}

/// JSON request body whose rejection renders like every other API error.
#[derive(Debug, Clone)]
pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Body(value))
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {name} header")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn caller(headers: &[(&str, &str)]) -> Result<Actor, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await.map(|c| c.0)
    }

    #[tokio::test]
    async fn test_parses_each_role() {
        let buyer = BuyerId::new();
        let actor = caller(&[("x-actor-role", "buyer"), ("x-actor-id", &buyer.to_string())])
            .await
            .unwrap();
        assert_eq!(actor, Actor::Buyer(buyer));

        let actor = caller(&[("x-actor-role", "system"), ("x-actor-id", "payment-gateway")])
            .await
            .unwrap();
        assert_eq!(actor, Actor::system("payment-gateway"));
    }

    #[tokio::test]
    async fn test_rejects_missing_or_bad_identity() {
        assert!(matches!(
            caller(&[]).await,
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            caller(&[("x-actor-role", "courier"), ("x-actor-id", "x")]).await,
            Err(ApiError::Unauthenticated(_))
        ));
        assert!(matches!(
            caller(&[("x-actor-role", "vendor"), ("x-actor-id", "not-a-uuid")]).await,
            Err(ApiError::Unauthenticated(_))
        ));
    }
}
