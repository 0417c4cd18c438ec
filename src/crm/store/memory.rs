//! In-process journey store.
//!
//! The whole table set sits behind one lock. A unit of work runs against a
//! staged copy which replaces the live tables only when the body succeeds, so
//! units of work are serialized and atomic.

use parking_lot::Mutex;
use uuid::Uuid;

use super::{JourneyStore, JourneyTx, TxBody};
use crate::crm::error::{CrmError, LEAD_HAS_PROJECT, QUOTE_ALREADY_INVOICED};
use crate::crm::types::{
    Invoice, Lead, LeadStatus, Milestone, Payment, Project, ProjectStatus, Quote, Task,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    leads: Vec<Lead>,
    quotes: Vec<Quote>,
    projects: Vec<Project>,
    invoices: Vec<Invoice>,
    payments: Vec<Payment>,
    milestones: Vec<Milestone>,
    tasks: Vec<Task>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JourneyStore for MemoryStore {
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<(), CrmError> {
        let mut live = self.tables.lock();
        let mut staged = live.clone();
        body(&mut MemoryTx {
            tables: &mut staged,
        })?;
        *live = staged;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
}

fn replace<T, F>(rows: &mut [T], row: &T, entity: &str, same: F) -> Result<(), CrmError>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    match rows.iter_mut().find(|existing| same(existing)) {
        Some(slot) => {
            *slot = row.clone();
            Ok(())
        }
        None => Err(CrmError::not_found(entity)),
    }
}

impl JourneyTx for MemoryTx<'_> {
    fn find_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError> {
        Ok(self
            .tables
            .leads
            .iter()
            .find(|l| l.id == lead_id && l.user_id == user_id)
            .cloned())
    }

    fn lock_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError> {
        self.find_lead(user_id, lead_id)
    }

    fn list_leads(
        &mut self,
        user_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, CrmError> {
        let mut leads: Vec<Lead> = self
            .tables
            .leads
            .iter()
            .filter(|l| l.user_id == user_id && status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    fn insert_lead(&mut self, lead: &Lead) -> Result<(), CrmError> {
        self.tables.leads.push(lead.clone());
        Ok(())
    }

    fn update_lead(&mut self, lead: &Lead) -> Result<(), CrmError> {
        replace(&mut self.tables.leads, lead, "Lead", |l| l.id == lead.id)
    }

    fn delete_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<bool, CrmError> {
        let before = self.tables.leads.len();
        self.tables
            .leads
            .retain(|l| !(l.id == lead_id && l.user_id == user_id));
        if self.tables.leads.len() == before {
            return Ok(false);
        }
        for quote in self.tables.quotes.iter_mut() {
            if quote.lead_id == Some(lead_id) {
                quote.lead_id = None;
            }
        }
        for project in self.tables.projects.iter_mut() {
            if project.lead_id == Some(lead_id) {
                project.lead_id = None;
            }
        }
        self.tables.tasks.retain(|t| t.lead_id != Some(lead_id));
        Ok(true)
    }

    fn find_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<Option<Quote>, CrmError> {
        Ok(self
            .tables
            .quotes
            .iter()
            .find(|q| q.id == quote_id && q.user_id == user_id)
            .cloned())
    }

    fn list_quotes(
        &mut self,
        user_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> Result<Vec<Quote>, CrmError> {
        let mut quotes: Vec<Quote> = self
            .tables
            .quotes
            .iter()
            .filter(|q| q.user_id == user_id && lead_id.map_or(true, |id| q.lead_id == Some(id)))
            .cloned()
            .collect();
        quotes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(quotes)
    }

    fn quotes_for_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Quote>, CrmError> {
        let mut quotes: Vec<Quote> = self
            .tables
            .quotes
            .iter()
            .filter(|q| q.user_id == user_id && q.project_id == Some(project_id))
            .cloned()
            .collect();
        quotes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(quotes)
    }

    fn insert_quote(&mut self, quote: &Quote) -> Result<(), CrmError> {
        self.tables.quotes.push(quote.clone());
        Ok(())
    }

    fn update_quote(&mut self, quote: &Quote) -> Result<(), CrmError> {
        replace(&mut self.tables.quotes, quote, "Quote", |q| q.id == quote.id)
    }

    fn delete_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<bool, CrmError> {
        let before = self.tables.quotes.len();
        self.tables
            .quotes
            .retain(|q| !(q.id == quote_id && q.user_id == user_id));
        Ok(self.tables.quotes.len() != before)
    }

    fn find_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, CrmError> {
        Ok(self
            .tables
            .projects
            .iter()
            .find(|p| p.id == project_id && p.user_id == user_id)
            .cloned())
    }

    fn project_for_lead(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Project>, CrmError> {
        Ok(self
            .tables
            .projects
            .iter()
            .find(|p| p.lead_id == Some(lead_id) && p.user_id == user_id)
            .cloned())
    }

    fn list_projects(
        &mut self,
        user_id: Uuid,
        statuses: &[ProjectStatus],
    ) -> Result<Vec<Project>, CrmError> {
        let mut projects: Vec<Project> = self
            .tables
            .projects
            .iter()
            .filter(|p| {
                p.user_id == user_id && (statuses.is_empty() || statuses.contains(&p.status))
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    fn insert_project(&mut self, project: &Project) -> Result<(), CrmError> {
        if let Some(lead_id) = project.lead_id {
            if self
                .tables
                .projects
                .iter()
                .any(|p| p.lead_id == Some(lead_id))
            {
                return Err(CrmError::invalid_state(LEAD_HAS_PROJECT));
            }
        }
        self.tables.projects.push(project.clone());
        Ok(())
    }

    fn update_project(&mut self, project: &Project) -> Result<(), CrmError> {
        replace(&mut self.tables.projects, project, "Project", |p| {
            p.id == project.id
        })
    }

    fn delete_project(&mut self, user_id: Uuid, project_id: Uuid) -> Result<bool, CrmError> {
        let before = self.tables.projects.len();
        self.tables
            .projects
            .retain(|p| !(p.id == project_id && p.user_id == user_id));
        if self.tables.projects.len() == before {
            return Ok(false);
        }
        self.tables.milestones.retain(|m| m.project_id != project_id);
        for quote in self.tables.quotes.iter_mut() {
            if quote.project_id == Some(project_id) {
                quote.project_id = None;
            }
        }
        for task in self.tables.tasks.iter_mut() {
            if task.project_id == Some(project_id) {
                task.project_id = None;
            }
        }
        Ok(true)
    }

    fn find_invoice(
        &mut self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError> {
        Ok(self
            .tables
            .invoices
            .iter()
            .find(|i| i.id == invoice_id && i.user_id == user_id)
            .cloned())
    }

    fn invoice_for_quote(
        &mut self,
        user_id: Uuid,
        quote_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError> {
        Ok(self
            .tables
            .invoices
            .iter()
            .find(|i| i.quote_id == Some(quote_id) && i.user_id == user_id)
            .cloned())
    }

    fn list_invoices(
        &mut self,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Invoice>, CrmError> {
        let mut invoices: Vec<Invoice> = self
            .tables
            .invoices
            .iter()
            .filter(|i| {
                i.user_id == user_id && project_id.map_or(true, |id| i.project_id == Some(id))
            })
            .cloned()
            .collect();
        invoices.sort_by_key(|i| i.sequence);
        Ok(invoices)
    }

    fn next_invoice_sequence(&mut self, user_id: Uuid) -> Result<i32, CrmError> {
        let current = self
            .tables
            .invoices
            .iter()
            .filter(|i| i.user_id == user_id)
            .map(|i| i.sequence)
            .max()
            .unwrap_or(0);
        Ok(current + 1)
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError> {
        if let Some(quote_id) = invoice.quote_id {
            if self
                .tables
                .invoices
                .iter()
                .any(|i| i.quote_id == Some(quote_id))
            {
                return Err(CrmError::invalid_state(QUOTE_ALREADY_INVOICED));
            }
        }
        if self
            .tables
            .invoices
            .iter()
            .any(|i| i.user_id == invoice.user_id && i.sequence == invoice.sequence)
        {
            return Err(CrmError::invalid_state(format!(
                "Conflicting write: invoice sequence {} already used",
                invoice.sequence
            )));
        }
        self.tables.invoices.push(invoice.clone());
        Ok(())
    }

    fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError> {
        replace(&mut self.tables.invoices, invoice, "Invoice", |i| {
            i.id == invoice.id
        })
    }

    fn payments_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<Payment>, CrmError> {
        let mut payments: Vec<Payment> = self
            .tables
            .payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(payments)
    }

    fn insert_payment(&mut self, payment: &Payment) -> Result<(), CrmError> {
        if !self
            .tables
            .invoices
            .iter()
            .any(|i| i.id == payment.invoice_id)
        {
            return Err(CrmError::not_found("Invoice"));
        }
        self.tables.payments.push(payment.clone());
        Ok(())
    }

    fn milestones_for_project(&mut self, project_id: Uuid) -> Result<Vec<Milestone>, CrmError> {
        let mut milestones: Vec<Milestone> = self
            .tables
            .milestones
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect();
        milestones.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(milestones)
    }

    fn find_milestone(&mut self, milestone_id: Uuid) -> Result<Option<Milestone>, CrmError> {
        Ok(self
            .tables
            .milestones
            .iter()
            .find(|m| m.id == milestone_id)
            .cloned())
    }

    fn insert_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError> {
        if !self
            .tables
            .projects
            .iter()
            .any(|p| p.id == milestone.project_id)
        {
            return Err(CrmError::not_found("Project"));
        }
        self.tables.milestones.push(milestone.clone());
        Ok(())
    }

    fn update_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError> {
        replace(&mut self.tables.milestones, milestone, "Milestone", |m| {
            m.id == milestone.id
        })
    }

    fn open_tasks(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CrmError> {
        let mut tasks: Vec<Task> = self
            .tables
            .tasks
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.completed_at.is_none()
                    && (t.lead_id == Some(lead_id)
                        || (project_id.is_some() && t.project_id == project_id))
            })
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(tasks)
    }

    fn insert_task(&mut self, task: &Task) -> Result<(), CrmError> {
        self.tables.tasks.push(task.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::store::in_transaction;
    use chrono::Utc;

    fn lead(user_id: Uuid) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            user_id,
            contact_name: "Dana Ortiz".into(),
            email: None,
            phone: None,
            address: "42 Elm St".into(),
            city: Some("Springfield".into()),
            state: None,
            zip_code: None,
            status: LeadStatus::New,
            source: None,
            notes: None,
            score: None,
            score_details: None,
            last_contact_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_failed_unit_of_work_leaves_no_writes() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let row = lead(user_id);

        let result: Result<(), CrmError> = in_transaction(&store, |tx| {
            tx.insert_lead(&row)?;
            Err(CrmError::invalid_state("abort"))
        });
        assert!(result.is_err());

        let found = in_transaction(&store, |tx| tx.find_lead(user_id, row.id)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_reads_are_scoped_by_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let row = lead(owner);
        in_transaction(&store, |tx| tx.insert_lead(&row)).unwrap();

        let stranger = in_transaction(&store, |tx| tx.find_lead(Uuid::new_v4(), row.id)).unwrap();
        assert!(stranger.is_none());
        let mine = in_transaction(&store, |tx| tx.find_lead(owner, row.id)).unwrap();
        assert_eq!(mine.map(|l| l.id), Some(row.id));
    }

    #[test]
    fn test_invoice_sequence_is_per_user() {
        let store = MemoryStore::new();
        let first = in_transaction(&store, |tx| tx.next_invoice_sequence(Uuid::new_v4())).unwrap();
        assert_eq!(first, 1);
    }
}
