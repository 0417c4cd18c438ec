use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use super::{created, ok, run_blocking};
use crate::core::shared::state::AppState;
use crate::crm::error::CrmError;
use crate::crm::response::ApiResponse;
use crate::crm::types::{
    Invoice, ListInvoicesQuery, Payment, RecordPaymentRequest, UpdateInvoiceStatusRequest,
};
use crate::security::AuthenticatedUser;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub invoice: Invoice,
    pub payment: Payment,
}

pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    params: Result<Query<ListInvoicesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Invoice>>>, CrmError> {
    let Query(query) = params?;
    let invoices =
        run_blocking(move || state.entities.list_invoices(user.user_id, query.project_id))
            .await?;
    Ok(ok(invoices))
}

pub async fn get_invoice(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Invoice>>, CrmError> {
    let Path(invoice_id) = path?;
    let invoice =
        run_blocking(move || state.entities.get_invoice(user.user_id, invoice_id)).await?;
    Ok(ok(invoice))
}

pub async fn update_invoice_status(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateInvoiceStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Invoice>>, CrmError> {
    let Path(invoice_id) = path?;
    let Json(req) = payload?;
    let invoice = run_blocking(move || {
        state
            .entities
            .update_invoice_status(user.user_id, invoice_id, req.status)
    })
    .await?;
    Ok(ok(invoice))
}

pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<Payment>>>, CrmError> {
    let Path(invoice_id) = path?;
    let payments =
        run_blocking(move || state.entities.list_payments(user.user_id, invoice_id)).await?;
    Ok(ok(payments))
}

pub async fn record_payment(
    State(state): State<Arc<AppState>>,
    user: AuthenticatedUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<RecordPaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentReceipt>>), CrmError> {
    let Path(invoice_id) = path?;
    let Json(req) = payload?;
    let (invoice, payment) = run_blocking(move || {
        state
            .entities
            .record_payment(user.user_id, invoice_id, req)
    })
    .await?;
    Ok(created(PaymentReceipt { invoice, payment }))
}
