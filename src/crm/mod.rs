//! Contractor CRM: leads, quotes, projects and invoices, and the customer
//! journey that ties them together.

pub mod entities;
pub mod error;
pub mod handlers;
pub mod pricing;
pub mod response;
pub mod store;
pub mod types;
pub mod workflow;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::core::shared::state::AppState;
use handlers::{invoices, leads, projects, quotes};

pub fn configure_crm_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/leads", get(leads::list_leads).post(leads::create_lead))
        .route(
            "/leads/:lead_id",
            get(leads::get_lead)
                .patch(leads::update_lead)
                .delete(leads::delete_lead),
        )
        .route("/leads/:lead_id/quotes", post(leads::create_quote_from_lead))
        .route("/leads/:lead_id/project", post(leads::convert_lead_to_project))
        .route("/leads/:lead_id/lost", post(leads::mark_lead_as_lost))
        .route("/leads/:lead_id/journey", get(leads::get_customer_journey))
        .route("/quotes", get(quotes::list_quotes))
        .route(
            "/quotes/:quote_id",
            get(quotes::get_quote).delete(quotes::delete_quote),
        )
        .route("/quotes/:quote_id/status", patch(quotes::update_quote_status))
        .route("/quotes/:quote_id/line-items", put(quotes::update_quote_items))
        .route(
            "/quotes/:quote_id/project",
            post(quotes::convert_quote_to_project),
        )
        .route(
            "/quotes/:quote_id/invoices",
            post(quotes::create_invoice_from_quote),
        )
        .route("/projects", get(projects::list_projects))
        .route(
            "/projects/ready-for-invoicing",
            get(projects::ready_for_invoicing),
        )
        .route(
            "/projects/:project_id",
            get(projects::get_project)
                .patch(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/:project_id/milestones",
            get(projects::list_milestones).post(projects::add_milestone),
        )
        .route(
            "/projects/:project_id/invoices",
            post(projects::create_invoice_from_project),
        )
        .route(
            "/milestones/:milestone_id/complete",
            post(projects::complete_milestone),
        )
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices/:invoice_id", get(invoices::get_invoice))
        .route(
            "/invoices/:invoice_id/status",
            patch(invoices::update_invoice_status),
        )
        .route(
            "/invoices/:invoice_id/payments",
            get(invoices::list_payments).post(invoices::record_payment),
        )
}
