//! Runs against a real Postgres when DATABASE_URL is set; skipped otherwise.

use std::sync::Arc;

use uuid::Uuid;

use crmserver::core::shared::utils::{create_conn, run_migrations};
use crmserver::crm::entities::EntityService;
use crmserver::crm::error::{CrmError, LEAD_HAS_PROJECT};
use crmserver::crm::store::{in_transaction, JourneyStore, PgStore};
use crmserver::crm::types::{
    CreateLeadRequest, CreateQuoteRequest, LeadStatus, LineItemInput, MarkLostRequest,
    QuoteStatus,
};
use crmserver::crm::workflow::{WorkflowService, WorkflowSettings};

fn pg_store() -> Option<Arc<dyn JourneyStore>> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => url,
        _ => {
            println!("Skipping test - DATABASE_URL not set");
            return None;
        }
    };
    let pool = match create_conn(&url, 2) {
        Ok(pool) => pool,
        Err(e) => {
            println!("Skipping test - cannot connect to Postgres: {e}");
            return None;
        }
    };
    if let Err(e) = run_migrations(&pool) {
        println!("Skipping test - migrations failed: {e}");
        return None;
    }
    Some(Arc::new(PgStore::new(pool)))
}

fn quote_request() -> CreateQuoteRequest {
    CreateQuoteRequest {
        title: "Siding".into(),
        description: Some("North and east walls".into()),
        line_items: vec![LineItemInput {
            description: "Vinyl siding".into(),
            quantity: 2.0,
            unit_price: 2500.0,
            line_total: None,
        }],
        tax: Some(8.5),
        discount: Some(0.0),
        valid_days: None,
    }
}

#[test]
fn test_pg_quote_conversion_and_constraints() {
    let Some(store) = pg_store() else {
        return;
    };
    let entities = EntityService::new(store.clone());
    let workflow = WorkflowService::new(store.clone(), WorkflowSettings::default());
    let user_id = Uuid::new_v4();

    let lead = entities
        .create_lead(
            user_id,
            CreateLeadRequest {
                contact_name: "Sam Okafor".into(),
                address: "12 Birch Rd".into(),
                ..Default::default()
            },
        )
        .unwrap();
    let quote = workflow
        .create_quote_from_lead(user_id, lead.id, quote_request())
        .unwrap();
    assert_eq!(quote.total, 5425.0);

    let reloaded = entities.get_quote(user_id, quote.id).unwrap();
    assert_eq!(reloaded.line_items, quote.line_items);

    entities
        .update_quote_status(user_id, quote.id, QuoteStatus::Accepted)
        .unwrap();
    let project = workflow
        .convert_quote_to_project(user_id, quote.id, Default::default())
        .unwrap();
    assert_eq!(project.estimated_budget, 5425.0);
    assert_eq!(
        entities.get_lead(user_id, lead.id).unwrap().status,
        LeadStatus::Won
    );

    // A second project row for the same lead trips the unique constraint.
    let mut duplicate = project.clone();
    duplicate.id = Uuid::new_v4();
    let err = in_transaction(store.as_ref(), |tx| tx.insert_project(&duplicate)).unwrap_err();
    assert!(matches!(err, CrmError::InvalidState(ref msg) if msg == LEAD_HAS_PROJECT));

    let invoice = workflow
        .create_invoice_from_project(user_id, project.id, Default::default())
        .unwrap();
    assert_eq!(invoice.quote_id, Some(quote.id));
    assert_eq!(invoice.invoice_number, "INV-000001");

    let journey = workflow.get_customer_journey(user_id, lead.id).unwrap();
    assert_eq!(journey.metrics.total_invoiced, 5425.0);
    assert_eq!(journey.invoices.len(), 1);
}

#[test]
fn test_pg_failed_transition_rolls_back() {
    let Some(store) = pg_store() else {
        return;
    };
    let entities = EntityService::new(store.clone());
    let workflow = WorkflowService::new(store, WorkflowSettings::default());
    let user_id = Uuid::new_v4();

    let lead = entities
        .create_lead(
            user_id,
            CreateLeadRequest {
                contact_name: "Rita Gomez".into(),
                address: "4 Mill St".into(),
                notes: Some("Referral".into()),
                ..Default::default()
            },
        )
        .unwrap();
    workflow
        .mark_lead_as_lost(
            user_id,
            lead.id,
            MarkLostRequest {
                reason: Some("Timeline".into()),
            },
        )
        .unwrap();

    assert!(workflow
        .create_quote_from_lead(user_id, lead.id, quote_request())
        .is_err());
    assert!(entities.list_quotes(user_id, Some(lead.id)).unwrap().is_empty());

    let lead = entities.get_lead(user_id, lead.id).unwrap();
    assert_eq!(lead.status, LeadStatus::Lost);
    assert_eq!(lead.notes.as_deref(), Some("Referral\n---\nLost: Timeline"));
}
