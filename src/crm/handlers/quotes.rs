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
    ConvertQuoteRequest, CreateInvoiceRequest, Invoice, ListQuotesQuery, Project, Quote,
    UpdateQuoteItemsRequest, UpdateQuoteStatusRequest,
};
use crate::security::AuthenticatedUser;

pub async fn list_quotes(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    params: Result<Query<ListQuotesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Quote>>>, CrmError> {
    let Query(query) = params?;
    let quotes =
        run_blocking(move || state.entities.list_quotes(user.user_id, query.lead_id)).await?;
    Ok(ok(quotes))
}

pub async fn get_quote(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Quote>>, CrmError> {
    let Path(quote_id) = path?;
    let quote = run_blocking(move || state.entities.get_quote(user.user_id, quote_id)).await?;
    Ok(ok(quote))
}

pub async fn delete_quote(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<serde_json::Value>>, CrmError> {
    let Path(quote_id) = path?;
    run_blocking(move || state.entities.delete_quote(user.user_id, quote_id)).await?;
    Ok(ok(serde_json::json!({ "id": quote_id, "deleted": true })))
}

pub async fn update_quote_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateQuoteStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Quote>>, CrmError> {
    let Path(quote_id) = path?;
    let Json(req) = payload?;
    let quote = run_blocking(move || {
        state
            .entities
            .update_quote_status(user.user_id, quote_id, req.status)
    })
    .await?;
    Ok(ok(quote))
}

pub async fn update_quote_items(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateQuoteItemsRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Quote>>, CrmError> {
    let Path(quote_id) = path?;
    let Json(req) = payload?;
    let quote = run_blocking(move || {
        state
            .entities
            .update_quote_items(user.user_id, quote_id, req)
    })
    .await?;
    Ok(ok(quote))
}

pub async fn convert_quote_to_project(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Project>>), CrmError> {
    let Path(quote_id) = path?;
    let req: ConvertQuoteRequest = optional_json(&body)?;
    let project = run_blocking(move || {
        state
            .workflow
            .convert_quote_to_project(user.user_id, quote_id, req)
    })
    .await?;
    Ok(created(project))
}

pub async fn create_invoice_from_quote(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<Invoice>>), CrmError> {
    let Path(quote_id) = path?;
    let req: CreateInvoiceRequest = optional_json(&body)?;
    let invoice = run_blocking(move || {
        state
            .workflow
            .create_invoice_from_quote(user.user_id, quote_id, req)
    })
    .await?;
    Ok(created(invoice))
}
