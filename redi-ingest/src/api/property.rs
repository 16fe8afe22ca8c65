//! Property inspection endpoint
//!
//! Returns the full linked view: the property plus every owner, phone,
//! and life event merged onto its APN.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::models::{LifeEvent, Owner, Phone, Property};
use crate::store;
use crate::validators::clean_apn;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct PropertyView {
    #[serde(flatten)]
    pub property: Property,
    pub owners: Vec<Owner>,
    pub phones: Vec<Phone>,
    pub life_events: Vec<LifeEvent>,
}

/// GET /properties/:apn
///
/// The path APN is canonicalized first, so `/properties/12345` and
/// `/properties/0000012345` address the same record.
pub async fn get_property(
    State(state): State<AppState>,
    Path(apn): Path<String>,
) -> ApiResult<Json<PropertyView>> {
    let apn = clean_apn(&apn)
        .ok_or_else(|| ApiError::BadRequest(format!("Not a valid APN: {}", apn)))?;

    let property = store::properties::get_property(&state.db, &apn)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No property with APN {}", apn)))?;

    let owners = store::owners::list_owners_for_apn(&state.db, &apn).await?;
    let phones = store::phones::list_phones_for_apn(&state.db, &apn).await?;
    let life_events = store::life_events::list_events_for_apn(&state.db, &apn).await?;

    Ok(Json(PropertyView {
        property,
        owners,
        phones,
        life_events,
    }))
}

/// Build property routes
pub fn property_routes() -> Router<AppState> {
    Router::new().route("/properties/:apn", get(get_property))
}
