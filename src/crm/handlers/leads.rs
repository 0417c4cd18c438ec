use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use super::{created, ok, optional_json, run_blocking};
use crate::core::shared::state::AppState;
use crate::crm::error::CrmError;
use crate::crm::response::ApiResponse;
use crate::crm::types::{
    ConvertLeadRequest, CreateLeadRequest, CreateQuoteRequest, CustomerJourney, Lead,
    ListLeadsQuery, MarkLostRequest, Project, Quote, UpdateLeadRequest,
};
use crate::security::AuthenticatedUser;

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    params: Result<Query<ListLeadsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Lead>>>, CrmError> {
    let Query(query) = params?;
    let leads = run_blocking(move || state.entities.list_leads(user.user_id, query.status)).await?;
    Ok(ok(leads))
}

pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Lead>>), CrmError> {
    let Json(req) = payload?;
    let lead = run_blocking(move || state.entities.create_lead(user.user_id, req)).await?;
    Ok(created(lead))
}

pub async fn get_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Lead>>, CrmError> {
    let Path(lead_id) = path?;
    let lead = run_blocking(move || state.entities.get_lead(user.user_id, lead_id)).await?;
    Ok(ok(lead))
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateLeadRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Lead>>, CrmError> {
    let Path(lead_id) = path?;
    let Json(req) = payload?;
    let lead =
        run_blocking(move || state.entities.update_lead(user.user_id, lead_id, req)).await?;
    Ok(ok(lead))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, CrmError> {
    let Path(lead_id) = path?;
    run_blocking(move || state.entities.delete_lead(user.user_id, lead_id)).await?;
    Ok(ok(serde_json::json!({ "id": lead_id, "deleted": true })))
}

pub async fn create_quote_from_lead(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateQuoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Quote>>), CrmError> {
    let Path(lead_id) = path?;
    let Json(req) = payload?;
    let quote = run_blocking(move || {
        state
            .workflow
            .create_quote_from_lead(user.user_id, lead_id, req)
    })
    .await?;
    Ok(created(quote))
}

pub async fn convert_lead_to_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Project>>), CrmError> {
    let Path(lead_id) = path?;
    let req: ConvertLeadRequest = optional_json(&body)?;
    let project = run_blocking(move || {
        state
            .workflow
            .convert_lead_to_project(user.user_id, lead_id, req)
    })
    .await?;
    Ok(created(project))
}

pub async fn mark_lead_as_lost(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<Json<ApiResponse<Lead>>, CrmError> {
    let Path(lead_id) = path?;
    let req: MarkLostRequest = optional_json(&body)?;
    let lead =
        run_blocking(move || state.workflow.mark_lead_as_lost(user.user_id, lead_id, req)).await?;
    Ok(ok(lead))
}

pub async fn get_customer_journey(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<CustomerJourney>>, CrmError> {
    let Path(lead_id) = path?;
    let journey =
        run_blocking(move || state.workflow.get_customer_journey(user.user_id, lead_id)).await?;
    Ok(ok(journey))
}
