//! Persistence seam for the customer journey.
//!
//! A [`JourneyStore`] opens units of work; everything inside one unit of work
//! goes through a [`JourneyTx`] and either commits as a whole or not at all.
//! Reads are scoped by the owning `user_id`; child rows (milestones,
//! payments) are reached through an already-authorized parent.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use uuid::Uuid;

use super::error::CrmError;
use super::types::{
    Invoice, Lead, LeadStatus, Milestone, Payment, Project, ProjectStatus, Quote, Task,
};

pub trait JourneyTx {
    fn find_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError>;

    /// Like `find_lead`, but holds a row lock until the unit of work ends.
    fn lock_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError>;

    fn list_leads(
        &mut self,
        user_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, CrmError>;

    fn insert_lead(&mut self, lead: &Lead) -> Result<(), CrmError>;

    fn update_lead(&mut self, lead: &Lead) -> Result<(), CrmError>;

    /// Detaches the lead's quotes and project and removes its tasks.
    fn delete_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<bool, CrmError>;

    fn find_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<Option<Quote>, CrmError>;

    fn list_quotes(
        &mut self,
        user_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> Result<Vec<Quote>, CrmError>;

    fn quotes_for_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Quote>, CrmError>;

    fn insert_quote(&mut self, quote: &Quote) -> Result<(), CrmError>;

    fn update_quote(&mut self, quote: &Quote) -> Result<(), CrmError>;

    fn delete_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<bool, CrmError>;

    fn find_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, CrmError>;

    fn project_for_lead(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Project>, CrmError>;

    /// An empty `statuses` slice means every status.
    fn list_projects(
        &mut self,
        user_id: Uuid,
        statuses: &[ProjectStatus],
    ) -> Result<Vec<Project>, CrmError>;

    /// Fails with `InvalidState` when the lead already has a project.
    fn insert_project(&mut self, project: &Project) -> Result<(), CrmError>;

    fn update_project(&mut self, project: &Project) -> Result<(), CrmError>;

    fn delete_project(&mut self, user_id: Uuid, project_id: Uuid) -> Result<bool, CrmError>;

    fn find_invoice(
        &mut self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError>;

    fn invoice_for_quote(
        &mut self,
        user_id: Uuid,
        quote_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError>;

    fn list_invoices(
        &mut self,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Invoice>, CrmError>;

    fn next_invoice_sequence(&mut self, user_id: Uuid) -> Result<i32, CrmError>;

    /// Fails with `InvalidState` when another invoice references the same quote.
    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError>;

    fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError>;

    fn payments_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<Payment>, CrmError>;

    fn insert_payment(&mut self, payment: &Payment) -> Result<(), CrmError>;

    fn milestones_for_project(&mut self, project_id: Uuid) -> Result<Vec<Milestone>, CrmError>;

    fn find_milestone(&mut self, milestone_id: Uuid) -> Result<Option<Milestone>, CrmError>;

    fn insert_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError>;

    fn update_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError>;

    /// Open tasks attached to the lead, or to its project when one is given.
    fn open_tasks(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CrmError>;

    fn insert_task(&mut self, task: &Task) -> Result<(), CrmError>;
}

pub type TxBody<'a> = dyn FnMut(&mut dyn JourneyTx) -> Result<(), CrmError> + 'a;

pub trait JourneyStore: Send + Sync {
    /// Runs `body` as one atomic unit of work. Any error rolls back every
    /// write made through the transaction.
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<(), CrmError>;

    fn backend(&self) -> &'static str;
}

/// Typed wrapper over [`JourneyStore::transaction`].
pub fn in_transaction<T, F>(store: &dyn JourneyStore, f: F) -> Result<T, CrmError>
where
    F: FnOnce(&mut dyn JourneyTx) -> Result<T, CrmError>,
{
    let mut f = Some(f);
    let mut output = None;
    store.transaction(&mut |tx: &mut dyn JourneyTx| {
        let body = f
            .take()
            .ok_or_else(|| CrmError::Internal("transaction body invoked twice".to_string()))?;
        output = Some(body(tx)?);
        Ok(())
    })?;
    output.ok_or_else(|| CrmError::Internal("transaction produced no result".to_string()))
}
