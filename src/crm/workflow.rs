//! Customer-journey transitions: Lead -> Quote -> Project -> Invoice.
//!
//! Every public operation is a single unit of work against the store. The
//! lead row is locked before any transition that changes the lead's status,
//! and the one-project-per-lead and one-invoice-per-quote rules are also
//! enforced by the store on insert, so a losing concurrent writer fails with
//! `InvalidState` instead of creating a duplicate.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::info;
use uuid::Uuid;

use super::error::{CrmError, LEAD_HAS_PROJECT, QUOTE_ALREADY_INVOICED};
use super::pricing::{price_line_items, round_cents, Totals};
use super::store::{in_transaction, JourneyStore, JourneyTx};
use super::types::{
    ConvertLeadRequest, ConvertQuoteRequest, CreateInvoiceRequest, CreateQuoteRequest,
    CustomerJourney, Invoice, InvoiceStatus, InvoicingCandidate, JourneyMetrics, JourneyStage,
    Lead, LeadStatus, LineItem, MarkLostRequest, Project, ProjectStatus, Quote, QuoteStatus,
};

const EXCEEDS_COST_BASIS: &str = "Invoice would exceed the project's cost basis";
const NOTE_SEPARATOR: &str = "\n---\n";

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub quote_valid_days: i64,
    pub invoice_due_days: i64,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            quote_valid_days: 30,
            invoice_due_days: 30,
        }
    }
}

/// Where a new project comes from. Both variants end with the lead WON.
#[derive(Debug, Clone)]
pub enum ProjectSource {
    Quote {
        quote_id: Uuid,
    },
    Lead {
        lead_id: Uuid,
        name: Option<String>,
        description: Option<String>,
        estimated_budget: f64,
    },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Schedule {
    pub start_date: Option<DateTime<Utc>>,
    pub estimated_days: Option<i32>,
}

fn invoice_number(sequence: i32) -> String {
    format!("INV-{sequence:06}")
}

fn live_total(invoices: &[Invoice]) -> f64 {
    round_cents(
        invoices
            .iter()
            .filter(|inv| inv.status != InvoiceStatus::Cancelled)
            .map(|inv| inv.total)
            .sum(),
    )
}

fn journey_stage(
    lead: &Lead,
    quotes: &[Quote],
    project: Option<&Project>,
    invoices: &[Invoice],
) -> JourneyStage {
    if lead.status == LeadStatus::Lost {
        return JourneyStage::Lost;
    }
    let live: Vec<&Invoice> = invoices
        .iter()
        .filter(|inv| inv.status != InvoiceStatus::Cancelled)
        .collect();
    if !live.is_empty() && live.iter().all(|inv| inv.status == InvoiceStatus::Paid) {
        JourneyStage::Paid
    } else if !live.is_empty() {
        JourneyStage::Invoiced
    } else if project.is_some() {
        JourneyStage::Project
    } else if !quotes.is_empty() {
        JourneyStage::Quoted
    } else {
        JourneyStage::Lead
    }
}

/// Priced content of an invoice about to be issued.
struct InvoiceDraft {
    project_id: Option<Uuid>,
    quote_id: Option<Uuid>,
    line_items: Vec<LineItem>,
    totals: Totals,
}

#[derive(Clone)]
pub struct WorkflowService {
    store: Arc<dyn JourneyStore>,
    settings: WorkflowSettings,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn JourneyStore>, settings: WorkflowSettings) -> Self {
        Self { store, settings }
    }

    pub fn create_quote_from_lead(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
        req: CreateQuoteRequest,
    ) -> Result<Quote, CrmError> {
        let mut details = Vec::new();
        if req.title.trim().is_empty() {
            details.push("title is required".to_string());
        }
        let valid_days = req.valid_days.unwrap_or(self.settings.quote_valid_days);
        if valid_days < 1 {
            details.push("validDays must be >= 1".to_string());
        }
        let (line_items, totals) = match price_line_items(
            &req.line_items,
            req.tax.unwrap_or(0.0),
            req.discount.unwrap_or(0.0),
        ) {
            Ok(priced) if details.is_empty() => priced,
            Ok(_) => return Err(CrmError::validation(details)),
            Err(CrmError::Validation { details: more, .. }) => {
                details.extend(more);
                return Err(CrmError::validation(details));
            }
            Err(other) => return Err(other),
        };

        let quote = in_transaction(self.store.as_ref(), |tx| {
            let mut lead = tx
                .lock_lead(user_id, lead_id)?
                .ok_or_else(|| CrmError::not_found("Lead"))?;
            if lead.status == LeadStatus::Lost {
                return Err(CrmError::invalid_state(
                    "Cannot create a quote for a lost lead",
                ));
            }

            let now = Utc::now();
            let quote = Quote {
                id: Uuid::new_v4(),
                user_id,
                lead_id: Some(lead.id),
                project_id: None,
                title: req.title.trim().to_string(),
                description: req
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string),
                line_items,
                subtotal: totals.subtotal,
                tax_rate: totals.tax_rate,
                tax_amount: totals.tax_amount,
                discount: totals.discount,
                total: totals.total,
                status: QuoteStatus::Draft,
                valid_until: now + Duration::days(valid_days),
                created_at: now,
                updated_at: now,
            };
            tx.insert_quote(&quote)?;

            // A follow-on quote for a won customer leaves the lead WON.
            if lead.status != LeadStatus::Won {
                lead.status = LeadStatus::ProposalSent;
            }
            lead.last_contact_at = Some(now);
            lead.updated_at = now;
            tx.update_lead(&lead)?;
            Ok(quote)
        })?;

        info!(
            "Created quote {} ({}) for lead {}",
            quote.id, quote.total, lead_id
        );
        Ok(quote)
    }

    pub fn convert_quote_to_project(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        req: ConvertQuoteRequest,
    ) -> Result<Project, CrmError> {
        self.convert_to_project(
            user_id,
            ProjectSource::Quote { quote_id },
            Schedule {
                start_date: req.start_date,
                estimated_days: req.estimated_days,
            },
        )
    }

    pub fn convert_lead_to_project(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
        req: ConvertLeadRequest,
    ) -> Result<Project, CrmError> {
        self.convert_to_project(
            user_id,
            ProjectSource::Lead {
                lead_id,
                name: req.name,
                description: req.description,
                estimated_budget: req.estimated_budget.unwrap_or(0.0),
            },
            Schedule {
                start_date: req.start_date,
                estimated_days: req.estimated_days,
            },
        )
    }

    /// The only path that moves a lead to WON.
    pub fn convert_to_project(
        &self,
        user_id: Uuid,
        source: ProjectSource,
        schedule: Schedule,
    ) -> Result<Project, CrmError> {
        let mut details = Vec::new();
        if matches!(schedule.estimated_days, Some(days) if days < 1) {
            details.push("estimatedDays must be >= 1".to_string());
        }
        if let ProjectSource::Lead {
            estimated_budget, ..
        } = &source
        {
            if !estimated_budget.is_finite() || *estimated_budget < 0.0 {
                details.push("estimatedBudget must be >= 0".to_string());
            }
        }
        if !details.is_empty() {
            return Err(CrmError::validation(details));
        }

        let project = in_transaction(self.store.as_ref(), |tx| {
            let (lead_id, mut quote) = match &source {
                ProjectSource::Quote { quote_id } => {
                    let quote = tx
                        .find_quote(user_id, *quote_id)?
                        .ok_or_else(|| CrmError::not_found("Quote"))?;
                    if quote.status != QuoteStatus::Accepted {
                        return Err(CrmError::invalid_state(
                            "Only accepted quotes can be converted to a project",
                        ));
                    }
                    if quote.project_id.is_some() {
                        return Err(CrmError::invalid_state(
                            "Quote has already been converted to a project",
                        ));
                    }
                    let lead_id = quote.lead_id.ok_or_else(|| {
                        CrmError::invalid_state("Quote is not linked to a lead")
                    })?;
                    (lead_id, Some(quote))
                }
                ProjectSource::Lead { lead_id, .. } => (*lead_id, None),
            };

            let mut lead = tx
                .lock_lead(user_id, lead_id)?
                .ok_or_else(|| CrmError::not_found("Lead"))?;
            if lead.status == LeadStatus::Lost {
                return Err(CrmError::invalid_state(
                    "Cannot convert a lost lead to a project",
                ));
            }
            if tx.project_for_lead(user_id, lead_id)?.is_some() {
                return Err(CrmError::invalid_state(LEAD_HAS_PROJECT));
            }

            let (name, description, estimated_budget) = match (&source, &quote) {
                (_, Some(quote)) => (quote.title.clone(), quote.description.clone(), quote.total),
                (
                    ProjectSource::Lead {
                        name,
                        description,
                        estimated_budget,
                        ..
                    },
                    None,
                ) => (
                    name.as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .unwrap_or(lead.address.as_str())
                        .to_string(),
                    description.clone(),
                    round_cents(*estimated_budget),
                ),
                (ProjectSource::Quote { .. }, None) => {
                    return Err(CrmError::Internal("quote source without a quote".into()))
                }
            };

            let now = Utc::now();
            let start = schedule.start_date.unwrap_or(now);
            let project = Project {
                id: Uuid::new_v4(),
                user_id,
                lead_id: Some(lead.id),
                name,
                description,
                address: lead.address.clone(),
                city: lead.city.clone(),
                state: lead.state.clone(),
                zip_code: lead.zip_code.clone(),
                status: ProjectStatus::Planning,
                start_date: Some(start),
                end_date: schedule
                    .estimated_days
                    .map(|days| start + Duration::days(i64::from(days))),
                estimated_days: schedule.estimated_days,
                estimated_budget,
                actual_cost: 0.0,
                created_at: now,
                updated_at: now,
            };
            tx.insert_project(&project)?;

            if let Some(quote) = quote.as_mut() {
                quote.project_id = Some(project.id);
                quote.updated_at = now;
                tx.update_quote(quote)?;
            }

            lead.status = LeadStatus::Won;
            lead.last_contact_at = Some(now);
            lead.updated_at = now;
            tx.update_lead(&lead)?;
            Ok(project)
        })?;

        info!(
            "Converted lead {:?} to project {} (budget {})",
            project.lead_id, project.id, project.estimated_budget
        );
        Ok(project)
    }

    pub fn create_invoice_from_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        req: CreateInvoiceRequest,
    ) -> Result<Invoice, CrmError> {
        let invoice = in_transaction(self.store.as_ref(), |tx| {
            let project = tx
                .find_project(user_id, project_id)?
                .ok_or_else(|| CrmError::not_found("Project"))?;
            let cost_basis = round_cents(project.cost_basis());
            if cost_basis <= 0.0 {
                return Err(CrmError::invalid_state("Project has no billable cost"));
            }
            let invoiced = live_total(&tx.list_invoices(user_id, Some(project.id))?);
            if invoiced >= cost_basis {
                return Err(CrmError::invalid_state("Project is already fully invoiced"));
            }
            let remaining = round_cents(cost_basis - invoiced);

            // A quote larger than the unbilled balance is left for later; the
            // remainder is billed as a single line instead.
            let mut pending_quote = None;
            for quote in tx.quotes_for_project(user_id, project.id)? {
                if quote.status == QuoteStatus::Accepted
                    && quote.total <= remaining
                    && tx.invoice_for_quote(user_id, quote.id)?.is_none()
                {
                    pending_quote = Some(quote);
                    break;
                }
            }

            let draft = match pending_quote {
                Some(quote) => InvoiceDraft {
                    project_id: Some(project.id),
                    quote_id: Some(quote.id),
                    totals: Totals {
                        subtotal: quote.subtotal,
                        tax_rate: quote.tax_rate,
                        tax_amount: quote.tax_amount,
                        discount: quote.discount,
                        total: quote.total,
                    },
                    line_items: quote.line_items,
                },
                None => {
                    let description = if invoiced > 0.0 {
                        format!("{} (remaining balance)", project.name)
                    } else {
                        project.name.clone()
                    };
                    let line_items = vec![LineItem {
                        description,
                        quantity: 1.0,
                        unit_price: remaining,
                        line_total: remaining,
                    }];
                    let totals = Totals::compute(&line_items, 0.0, 0.0);
                    InvoiceDraft {
                        project_id: Some(project.id),
                        quote_id: None,
                        line_items,
                        totals,
                    }
                }
            };
            self.issue_invoice(tx, user_id, draft, &req)
        })?;

        info!(
            "Issued invoice {} ({}) for project {}",
            invoice.invoice_number, invoice.total, project_id
        );
        Ok(invoice)
    }

    pub fn create_invoice_from_quote(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        req: CreateInvoiceRequest,
    ) -> Result<Invoice, CrmError> {
        let invoice = in_transaction(self.store.as_ref(), |tx| {
            let quote = tx
                .find_quote(user_id, quote_id)?
                .ok_or_else(|| CrmError::not_found("Quote"))?;
            if quote.status != QuoteStatus::Accepted {
                return Err(CrmError::invalid_state(
                    "Only accepted quotes can be invoiced",
                ));
            }
            if tx.invoice_for_quote(user_id, quote.id)?.is_some() {
                return Err(CrmError::invalid_state(QUOTE_ALREADY_INVOICED));
            }
            if let Some(project_id) = quote.project_id {
                if let Some(project) = tx.find_project(user_id, project_id)? {
                    let invoiced = live_total(&tx.list_invoices(user_id, Some(project.id))?);
                    let remaining = round_cents(project.cost_basis() - invoiced);
                    if quote.total > remaining {
                        return Err(CrmError::invalid_state(EXCEEDS_COST_BASIS));
                    }
                }
            }
            let draft = InvoiceDraft {
                project_id: quote.project_id,
                quote_id: Some(quote.id),
                totals: Totals {
                    subtotal: quote.subtotal,
                    tax_rate: quote.tax_rate,
                    tax_amount: quote.tax_amount,
                    discount: quote.discount,
                    total: quote.total,
                },
                line_items: quote.line_items,
            };
            self.issue_invoice(tx, user_id, draft, &req)
        })?;

        info!(
            "Issued invoice {} ({}) for quote {}",
            invoice.invoice_number, invoice.total, quote_id
        );
        Ok(invoice)
    }

    fn issue_invoice(
        &self,
        tx: &mut dyn JourneyTx,
        user_id: Uuid,
        draft: InvoiceDraft,
        req: &CreateInvoiceRequest,
    ) -> Result<Invoice, CrmError> {
        let now = Utc::now();
        let sequence = tx.next_invoice_sequence(user_id)?;
        let invoice = Invoice {
            id: Uuid::new_v4(),
            user_id,
            project_id: draft.project_id,
            quote_id: draft.quote_id,
            invoice_number: invoice_number(sequence),
            sequence,
            line_items: draft.line_items,
            subtotal: draft.totals.subtotal,
            tax_rate: draft.totals.tax_rate,
            tax_amount: draft.totals.tax_amount,
            discount: draft.totals.discount,
            total: draft.totals.total,
            amount_paid: 0.0,
            status: InvoiceStatus::Draft,
            due_date: req
                .due_date
                .unwrap_or(now + Duration::days(self.settings.invoice_due_days)),
            notes: req
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            created_at: now,
            updated_at: now,
            paid_at: None,
        };
        tx.insert_invoice(&invoice)?;
        Ok(invoice)
    }

    pub fn mark_lead_as_lost(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
        req: MarkLostRequest,
    ) -> Result<Lead, CrmError> {
        let reason = req
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or("No reason given");
        let entry = format!("Lost: {reason}");

        let lead = in_transaction(self.store.as_ref(), |tx| {
            let mut lead = tx
                .lock_lead(user_id, lead_id)?
                .ok_or_else(|| CrmError::not_found("Lead"))?;
            if lead.status == LeadStatus::Won {
                return Err(CrmError::invalid_state("Cannot mark a won lead as lost"));
            }
            lead.notes = Some(match lead.notes.take().filter(|n| !n.is_empty()) {
                Some(notes) => format!("{notes}{NOTE_SEPARATOR}{entry}"),
                None => entry.clone(),
            });
            lead.status = LeadStatus::Lost;
            lead.updated_at = Utc::now();
            tx.update_lead(&lead)?;
            Ok(lead)
        })?;

        info!("Lead {} marked as lost: {}", lead.id, reason);
        Ok(lead)
    }

    pub fn get_customer_journey(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<CustomerJourney, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let lead = tx
                .find_lead(user_id, lead_id)?
                .ok_or_else(|| CrmError::not_found("Lead"))?;
            let quotes = tx.list_quotes(user_id, Some(lead.id))?;
            let project = tx.project_for_lead(user_id, lead.id)?;

            let mut invoices = match &project {
                Some(project) => tx.list_invoices(user_id, Some(project.id))?,
                None => Vec::new(),
            };
            for quote in &quotes {
                if let Some(invoice) = tx.invoice_for_quote(user_id, quote.id)? {
                    if !invoices.iter().any(|known| known.id == invoice.id) {
                        invoices.push(invoice);
                    }
                }
            }
            invoices.sort_by_key(|inv| inv.sequence);

            let mut payments = Vec::new();
            for invoice in &invoices {
                payments.extend(tx.payments_for_invoice(invoice.id)?);
            }
            let milestones = match &project {
                Some(project) => tx.milestones_for_project(project.id)?,
                None => Vec::new(),
            };
            let open_tasks = tx.open_tasks(user_id, lead.id, project.as_ref().map(|p| p.id))?;

            let metrics = JourneyMetrics {
                total_quotes: quotes.len(),
                accepted_quotes: quotes
                    .iter()
                    .filter(|q| q.status == QuoteStatus::Accepted)
                    .count(),
                has_project: project.is_some(),
                total_invoiced: live_total(&invoices),
                total_paid: round_cents(payments.iter().map(|p| p.amount).sum()),
                open_tasks: open_tasks.len(),
            };
            let stage = journey_stage(&lead, &quotes, project.as_ref(), &invoices);

            Ok(CustomerJourney {
                lead,
                quotes,
                project,
                invoices,
                payments,
                milestones,
                open_tasks,
                metrics,
                stage,
            })
        })
    }

    /// Active projects whose live invoices do not yet cover the cost basis.
    pub fn get_projects_ready_for_invoicing(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<InvoicingCandidate>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let projects = tx.list_projects(user_id, &[])?;
            let mut ready = Vec::new();
            for project in projects.into_iter().filter(|p| p.status.is_billable()) {
                let cost_basis = round_cents(project.cost_basis());
                let invoiced_total = live_total(&tx.list_invoices(user_id, Some(project.id))?);
                if invoiced_total < cost_basis {
                    ready.push(InvoicingCandidate {
                        remaining: round_cents(cost_basis - invoiced_total),
                        cost_basis,
                        invoiced_total,
                        project,
                    });
                }
            }
            Ok(ready)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::entities::EntityService;
    use crate::crm::store::MemoryStore;
    use crate::crm::types::{
        CreateLeadRequest, LineItemInput, RecordPaymentRequest, Task, UpdateProjectRequest,
    };
    use crate::{assert_err, assert_ok};

    struct Fixture {
        store: Arc<dyn JourneyStore>,
        entities: EntityService,
        workflow: WorkflowService,
        user_id: Uuid,
    }

    fn fixture() -> Fixture {
        crate::tests::test_util::setup();
        let store: Arc<dyn JourneyStore> = Arc::new(MemoryStore::new());
        Fixture {
            entities: EntityService::new(store.clone()),
            workflow: WorkflowService::new(store.clone(), WorkflowSettings::default()),
            store,
            user_id: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn lead(&self) -> Lead {
            assert_ok!(self.entities.create_lead(
                self.user_id,
                CreateLeadRequest {
                    contact_name: "Marcus Bell".into(),
                    address: "117 Orchard Lane".into(),
                    city: Some("Fairview".into()),
                    ..Default::default()
                }
            ))
        }

        fn quote(&self, lead_id: Uuid, amount: f64, tax: f64) -> Quote {
            assert_ok!(self.workflow.create_quote_from_lead(
                self.user_id,
                lead_id,
                single_item("Kitchen remodel", "Cabinets", amount, tax)
            ))
        }

        fn accepted_quote(&self, lead_id: Uuid, amount: f64) -> Quote {
            let quote = self.quote(lead_id, amount, 0.0);
            assert_ok!(self
                .entities
                .update_quote_status(self.user_id, quote.id, QuoteStatus::Accepted))
        }

        fn set_quote_status(&self, quote: &Quote, status: QuoteStatus) {
            let mut quote = quote.clone();
            quote.status = status;
            assert_ok!(in_transaction(self.store.as_ref(), |tx| tx.update_quote(&quote)));
        }

        fn project_count(&self) -> usize {
            assert_ok!(self.entities.list_projects(self.user_id, None)).len()
        }

        fn start_project(&self, project_id: Uuid) {
            assert_ok!(self.entities.update_project(
                self.user_id,
                project_id,
                UpdateProjectRequest {
                    status: Some(ProjectStatus::InProgress),
                    ..Default::default()
                }
            ));
        }
    }

    fn single_item(title: &str, item: &str, amount: f64, tax: f64) -> CreateQuoteRequest {
        CreateQuoteRequest {
            title: title.into(),
            description: None,
            line_items: vec![LineItemInput {
                description: item.into(),
                quantity: 1.0,
                unit_price: amount,
                line_total: Some(amount),
            }],
            tax: Some(tax),
            discount: Some(0.0),
            valid_days: None,
        }
    }

    #[test]
    fn test_quote_moves_open_lead_to_proposal_sent() {
        let f = fixture();
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Qualified,
            LeadStatus::ProposalSent,
            LeadStatus::Negotiation,
        ] {
            let lead = f.lead();
            assert_ok!(f.entities.update_lead(
                f.user_id,
                lead.id,
                crate::crm::types::UpdateLeadRequest {
                    status: Some(status),
                    ..Default::default()
                }
            ));
            f.quote(lead.id, 500.0, 0.0);
            let lead = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
            assert_eq!(lead.status, LeadStatus::ProposalSent);
            assert!(lead.last_contact_at.is_some());
        }
    }

    #[test]
    fn test_lost_lead_rejects_quote_and_stays_unchanged() {
        let f = fixture();
        let lead = f.lead();
        let lost = assert_ok!(f.workflow.mark_lead_as_lost(
            f.user_id,
            lead.id,
            MarkLostRequest {
                reason: Some("Budget too low".into()),
            }
        ));
        assert_eq!(lost.status, LeadStatus::Lost);

        let err = assert_err!(f.workflow.create_quote_from_lead(
            f.user_id,
            lead.id,
            single_item("Deck", "Boards", 800.0, 0.0)
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));

        let after = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(after, lost);
        assert!(assert_ok!(f.entities.list_quotes(f.user_id, Some(lead.id))).is_empty());
    }

    #[test]
    fn test_quote_validation_collects_every_problem() {
        let f = fixture();
        let lead = f.lead();
        let mut req = single_item("", "Tile", 100.0, 150.0);
        req.valid_days = Some(0);
        let err = assert_err!(f.workflow.create_quote_from_lead(f.user_id, lead.id, req));
        match err {
            CrmError::Validation { details, .. } => assert_eq!(details.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
        let lead = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead.status, LeadStatus::New);
    }

    #[test]
    fn test_every_quote_rejection_names_its_problems() {
        let f = fixture();
        let lead = f.lead();

        let blank_title = single_item("  ", "Tile", 100.0, 0.0);
        let err = assert_err!(f
            .workflow
            .create_quote_from_lead(f.user_id, lead.id, blank_title));
        match err {
            CrmError::Validation { details, .. } => {
                assert_eq!(details, vec!["title is required".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let mut oversized_discount = single_item("Gutters", "Clean", 200.0, 0.0);
        oversized_discount.discount = Some(250.0);
        let err = assert_err!(f.workflow.create_quote_from_lead(
            f.user_id,
            lead.id,
            oversized_discount
        ));
        match err {
            CrmError::Validation { details, .. } => {
                assert_eq!(details.len(), 1);
                assert!(details[0].contains("exceeds subtotal"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_quote_for_missing_lead_is_not_found() {
        let f = fixture();
        let err = assert_err!(f.workflow.create_quote_from_lead(
            f.user_id,
            Uuid::new_v4(),
            single_item("Deck", "Boards", 800.0, 0.0)
        ));
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[test]
    fn test_unaccepted_quotes_never_become_projects() {
        let f = fixture();
        for status in [
            QuoteStatus::Draft,
            QuoteStatus::Sent,
            QuoteStatus::Viewed,
            QuoteStatus::Rejected,
            QuoteStatus::Expired,
        ] {
            let lead = f.lead();
            let quote = f.quote(lead.id, 1200.0, 0.0);
            f.set_quote_status(&quote, status);
            let err = assert_err!(f.workflow.convert_quote_to_project(
                f.user_id,
                quote.id,
                Default::default()
            ));
            assert_eq!(
                err.message(),
                "Only accepted quotes can be converted to a project"
            );
        }
        assert_eq!(f.project_count(), 0);
    }

    #[test]
    fn test_second_quote_conversion_for_same_lead_is_rejected() {
        let f = fixture();
        let lead = f.lead();
        let first = f.accepted_quote(lead.id, 4000.0);
        let second = f.accepted_quote(lead.id, 4500.0);

        assert_ok!(f
            .workflow
            .convert_quote_to_project(f.user_id, first.id, Default::default()));
        let err = assert_err!(f.workflow.convert_quote_to_project(
            f.user_id,
            second.id,
            Default::default()
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));
        assert_eq!(err.message(), LEAD_HAS_PROJECT);
        assert_eq!(f.project_count(), 1);

        let untouched = assert_ok!(f.entities.get_quote(f.user_id, second.id));
        assert_eq!(untouched.project_id, None);
    }

    #[test]
    fn test_quote_invoiced_only_once() {
        let f = fixture();
        let lead = f.lead();
        let quote = f.accepted_quote(lead.id, 2750.0);

        assert_ok!(f
            .workflow
            .create_invoice_from_quote(f.user_id, quote.id, Default::default()));
        let err = assert_err!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(err.message(), QUOTE_ALREADY_INVOICED);

        let invoices = assert_ok!(f.entities.list_invoices(f.user_id, None));
        let linked: Vec<_> = invoices
            .iter()
            .filter(|inv| inv.quote_id == Some(quote.id))
            .collect();
        assert_eq!(linked.len(), 1);
    }

    #[test]
    fn test_unaccepted_quote_cannot_be_invoiced() {
        let f = fixture();
        let lead = f.lead();
        let quote = f.quote(lead.id, 300.0, 0.0);
        let err = assert_err!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(err.message(), "Only accepted quotes can be invoiced");
        assert!(assert_ok!(f.entities.list_invoices(f.user_id, None)).is_empty());
    }

    #[test]
    fn test_invoice_carries_quote_total() {
        let f = fixture();
        let lead = f.lead();
        let req = CreateQuoteRequest {
            title: "Bathroom".into(),
            description: Some("Full gut".into()),
            line_items: vec![
                LineItemInput {
                    description: "Vanity".into(),
                    quantity: 1.0,
                    unit_price: 1899.99,
                    line_total: None,
                },
                LineItemInput {
                    description: "Tile (sq ft)".into(),
                    quantity: 85.0,
                    unit_price: 12.4,
                    line_total: None,
                },
            ],
            tax: Some(6.25),
            discount: Some(125.0),
            valid_days: Some(14),
        };
        let quote = assert_ok!(f.workflow.create_quote_from_lead(f.user_id, lead.id, req));
        assert_eq!(
            quote.total,
            round_cents(quote.subtotal + round_cents(quote.subtotal * 6.25 / 100.0) - 125.0)
        );

        assert_ok!(f
            .entities
            .update_quote_status(f.user_id, quote.id, QuoteStatus::Accepted));
        let invoice = assert_ok!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(invoice.total, quote.total);
        assert_eq!(invoice.line_items, quote.line_items);
        assert_eq!(invoice.status, InvoiceStatus::Draft);
    }

    #[test]
    fn test_scenarios_a_through_c() {
        let f = fixture();
        let lead = f.lead();

        // A
        let quote = f.quote(lead.id, 15000.0, 8.5);
        assert_eq!(quote.total, 16275.0);
        assert_eq!(quote.status, QuoteStatus::Draft);
        let lead_now = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead_now.status, LeadStatus::ProposalSent);

        // B
        assert_ok!(f
            .entities
            .update_quote_status(f.user_id, quote.id, QuoteStatus::Accepted));
        let project = assert_ok!(f.workflow.convert_quote_to_project(
            f.user_id,
            quote.id,
            ConvertQuoteRequest {
                start_date: None,
                estimated_days: Some(30),
            }
        ));
        assert_eq!(project.estimated_budget, 16275.0);
        assert_eq!(project.status, ProjectStatus::Planning);
        assert_eq!(project.name, "Kitchen remodel");
        assert_eq!(project.address, "117 Orchard Lane");
        let start = project.start_date.unwrap();
        assert_eq!(project.end_date, Some(start + Duration::days(30)));
        let lead_now = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead_now.status, LeadStatus::Won);
        let quote_now = assert_ok!(f.entities.get_quote(f.user_id, quote.id));
        assert_eq!(quote_now.project_id, Some(project.id));

        // C
        let invoice = assert_ok!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(invoice.project_id, Some(project.id));
        assert_eq!(invoice.invoice_number, "INV-000001");
        let err = assert_err!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(err.message(), "Invoice already exists for this quote");
    }

    #[test]
    fn test_scenario_d_lost_lead_keeps_history() {
        let f = fixture();
        let lead = assert_ok!(f.entities.create_lead(
            f.user_id,
            CreateLeadRequest {
                contact_name: "Ana Lima".into(),
                address: "3 Bay St".into(),
                notes: Some("Wants quartz counters".into()),
                ..Default::default()
            }
        ));
        let lost = assert_ok!(f.workflow.mark_lead_as_lost(
            f.user_id,
            lead.id,
            MarkLostRequest {
                reason: Some("Budget too low".into()),
            }
        ));
        assert_eq!(lost.status, LeadStatus::Lost);
        assert_eq!(
            lost.notes.as_deref(),
            Some("Wants quartz counters\n---\nLost: Budget too low")
        );

        let again = assert_ok!(f.workflow.mark_lead_as_lost(
            f.user_id,
            lead.id,
            MarkLostRequest {
                reason: Some("Went with competitor".into()),
            }
        ));
        assert_eq!(
            again.notes.as_deref(),
            Some("Wants quartz counters\n---\nLost: Budget too low\n---\nLost: Went with competitor")
        );

        let err = assert_err!(f.workflow.create_quote_from_lead(
            f.user_id,
            lead.id,
            single_item("Counters", "Quartz", 3200.0, 0.0)
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));
        let err = assert_err!(f.workflow.convert_lead_to_project(
            f.user_id,
            lead.id,
            Default::default()
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));
    }

    #[test]
    fn test_won_lead_cannot_be_lost() {
        let f = fixture();
        let lead = f.lead();
        assert_ok!(f
            .workflow
            .convert_lead_to_project(f.user_id, lead.id, Default::default()));
        let err = assert_err!(f.workflow.mark_lead_as_lost(
            f.user_id,
            lead.id,
            MarkLostRequest { reason: None }
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));
        let lead = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead.status, LeadStatus::Won);
        assert_eq!(lead.notes, None);
    }

    #[test]
    fn test_follow_on_quote_keeps_lead_won() {
        let f = fixture();
        let lead = f.lead();
        assert_ok!(f
            .workflow
            .convert_lead_to_project(f.user_id, lead.id, Default::default()));
        f.quote(lead.id, 650.0, 0.0);
        let lead = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead.status, LeadStatus::Won);
    }

    #[test]
    fn test_scenario_e_journey_metrics() {
        let f = fixture();
        let lead = f.lead();
        let accepted = f.accepted_quote(lead.id, 5000.0);
        let project = assert_ok!(f.workflow.convert_quote_to_project(
            f.user_id,
            accepted.id,
            Default::default()
        ));
        f.quote(lead.id, 1800.0, 0.0);

        let invoice = assert_ok!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(invoice.quote_id, Some(accepted.id));
        assert_eq!(invoice.total, 5000.0);
        assert_ok!(f.entities.record_payment(
            f.user_id,
            invoice.id,
            RecordPaymentRequest {
                amount: 5000.0,
                method: Some("ach".into()),
                reference: None,
            }
        ));

        let journey = assert_ok!(f.workflow.get_customer_journey(f.user_id, lead.id));
        assert_eq!(journey.metrics.total_quotes, 2);
        assert_eq!(journey.metrics.accepted_quotes, 1);
        assert!(journey.metrics.has_project);
        assert_eq!(journey.metrics.total_invoiced, 5000.0);
        assert_eq!(journey.metrics.total_paid, 5000.0);
        assert_eq!(journey.stage, JourneyStage::Paid);
        assert_eq!(journey.payments.len(), 1);
        assert_eq!(journey.project.map(|p| p.id), Some(project.id));
    }

    #[test]
    fn test_journey_counts_open_tasks_and_excludes_cancelled_invoices() {
        let f = fixture();
        let lead = f.lead();
        let quote = f.accepted_quote(lead.id, 900.0);
        let invoice = assert_ok!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_ok!(f.entities.update_invoice_status(
            f.user_id,
            invoice.id,
            InvoiceStatus::Cancelled
        ));

        let now = Utc::now();
        let task = |title: &str, done: bool| Task {
            id: Uuid::new_v4(),
            user_id: f.user_id,
            lead_id: Some(lead.id),
            project_id: None,
            title: title.into(),
            due_date: None,
            completed_at: done.then_some(now),
            created_at: now,
        };
        let open = task("Call back", false);
        let closed = task("Site visit", true);
        assert_ok!(in_transaction(f.store.as_ref(), |tx| {
            tx.insert_task(&open)?;
            tx.insert_task(&closed)
        }));

        let journey = assert_ok!(f.workflow.get_customer_journey(f.user_id, lead.id));
        assert_eq!(journey.invoices.len(), 1);
        assert_eq!(journey.metrics.total_invoiced, 0.0);
        assert_eq!(journey.metrics.open_tasks, 1);
        assert_eq!(journey.open_tasks[0].title, "Call back");
        assert_eq!(journey.stage, JourneyStage::Quoted);
    }

    #[test]
    fn test_journey_of_unknown_lead_is_not_found() {
        let f = fixture();
        let lead = f.lead();
        let err = assert_err!(f.workflow.get_customer_journey(Uuid::new_v4(), lead.id));
        assert!(matches!(err, CrmError::NotFound(_)));
    }

    #[test]
    fn test_direct_conversion_wins_lead_and_blocks_quote_path() {
        let f = fixture();
        let lead = f.lead();
        let quote = f.accepted_quote(lead.id, 700.0);

        let project = assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            lead.id,
            ConvertLeadRequest {
                estimated_budget: Some(650.0),
                ..Default::default()
            }
        ));
        assert_eq!(project.name, "117 Orchard Lane");
        assert_eq!(project.estimated_budget, 650.0);
        assert_eq!(project.end_date, None);
        let lead_now = assert_ok!(f.entities.get_lead(f.user_id, lead.id));
        assert_eq!(lead_now.status, LeadStatus::Won);

        let err = assert_err!(f.workflow.convert_quote_to_project(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(err.message(), LEAD_HAS_PROJECT);
        assert_eq!(f.project_count(), 1);
    }

    #[test]
    fn test_direct_conversion_rejects_negative_budget() {
        let f = fixture();
        let lead = f.lead();
        let err = assert_err!(f.workflow.convert_lead_to_project(
            f.user_id,
            lead.id,
            ConvertLeadRequest {
                estimated_budget: Some(-10.0),
                ..Default::default()
            }
        ));
        assert!(matches!(err, CrmError::Validation { .. }));
        assert_eq!(f.project_count(), 0);
    }

    #[test]
    fn test_project_invoice_without_quote_bills_remaining_cost() {
        let f = fixture();
        let lead = f.lead();
        let project = assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            lead.id,
            ConvertLeadRequest {
                name: Some("Fence".into()),
                estimated_budget: Some(3000.0),
                ..Default::default()
            }
        ));

        let first = assert_ok!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(first.total, 3000.0);
        assert_eq!(first.line_items.len(), 1);
        assert_eq!(first.quote_id, None);

        let err = assert_err!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert!(matches!(err, CrmError::InvalidState(_)));

        f.start_project(project.id);
        assert_ok!(f.entities.update_project(
            f.user_id,
            project.id,
            UpdateProjectRequest {
                actual_cost: Some(3400.0),
                ..Default::default()
            }
        ));
        let second = assert_ok!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(second.total, 400.0);
        assert_eq!(second.invoice_number, "INV-000002");
    }

    #[test]
    fn test_project_invoice_never_exceeds_cost_basis() {
        let f = fixture();
        let lead = f.lead();
        let quote = f.accepted_quote(lead.id, 16275.0);
        let project = assert_ok!(f.workflow.convert_quote_to_project(
            f.user_id,
            quote.id,
            Default::default()
        ));
        f.start_project(project.id);
        assert_ok!(f.entities.update_project(
            f.user_id,
            project.id,
            UpdateProjectRequest {
                actual_cost: Some(1000.0),
                ..Default::default()
            }
        ));

        let err = assert_err!(f.workflow.create_invoice_from_quote(
            f.user_id,
            quote.id,
            Default::default()
        ));
        assert_eq!(err.message(), EXCEEDS_COST_BASIS);

        let invoice = assert_ok!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(invoice.total, 1000.0);
        assert_eq!(invoice.quote_id, None);
        assert_eq!(invoice.line_items.len(), 1);

        let ready = assert_ok!(f.workflow.get_projects_ready_for_invoicing(f.user_id));
        assert!(ready.iter().all(|c| c.project.id != project.id));
        let err = assert_err!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(err.message(), "Project is already fully invoiced");
    }

    #[test]
    fn test_project_without_cost_cannot_be_invoiced() {
        let f = fixture();
        let lead = f.lead();
        let project = assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            lead.id,
            Default::default()
        ));
        let err = assert_err!(f.workflow.create_invoice_from_project(
            f.user_id,
            project.id,
            Default::default()
        ));
        assert_eq!(err.message(), "Project has no billable cost");
    }

    #[test]
    fn test_ready_for_invoicing_lists_only_active_underbilled_projects() {
        let f = fixture();

        let planning = f.lead();
        assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            planning.id,
            ConvertLeadRequest {
                estimated_budget: Some(1000.0),
                ..Default::default()
            }
        ));

        let billed = f.lead();
        let billed_project = assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            billed.id,
            ConvertLeadRequest {
                estimated_budget: Some(2000.0),
                ..Default::default()
            }
        ));
        f.start_project(billed_project.id);
        assert_ok!(f.workflow.create_invoice_from_project(
            f.user_id,
            billed_project.id,
            Default::default()
        ));

        let open = f.lead();
        let open_project = assert_ok!(f.workflow.convert_lead_to_project(
            f.user_id,
            open.id,
            ConvertLeadRequest {
                estimated_budget: Some(5000.0),
                ..Default::default()
            }
        ));
        f.start_project(open_project.id);

        let ready = assert_ok!(f.workflow.get_projects_ready_for_invoicing(f.user_id));
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].project.id, open_project.id);
        assert_eq!(ready[0].cost_basis, 5000.0);
        assert_eq!(ready[0].invoiced_total, 0.0);
        assert_eq!(ready[0].remaining, 5000.0);

        assert!(assert_ok!(f.workflow.get_projects_ready_for_invoicing(Uuid::new_v4())).is_empty());
    }

    #[test]
    fn test_invoice_due_date_defaults_from_settings() {
        let store: Arc<dyn JourneyStore> = Arc::new(MemoryStore::new());
        let entities = EntityService::new(store.clone());
        let workflow = WorkflowService::new(
            store,
            WorkflowSettings {
                quote_valid_days: 7,
                invoice_due_days: 14,
            },
        );
        let user_id = Uuid::new_v4();
        let lead = assert_ok!(entities.create_lead(
            user_id,
            CreateLeadRequest {
                contact_name: "Lee Park".into(),
                address: "5 Ridge Ct".into(),
                ..Default::default()
            }
        ));
        let quote = assert_ok!(workflow.create_quote_from_lead(
            user_id,
            lead.id,
            single_item("Gutters", "Seamless gutter", 1400.0, 0.0)
        ));
        assert_eq!((quote.valid_until - quote.created_at).num_days(), 7);

        assert_ok!(entities.update_quote_status(user_id, quote.id, QuoteStatus::Accepted));
        let invoice = assert_ok!(workflow.create_invoice_from_quote(
            user_id,
            quote.id,
            CreateInvoiceRequest {
                due_date: None,
                notes: Some("  Net 14 ".into()),
            }
        ));
        assert_eq!((invoice.due_date - invoice.created_at).num_days(), 14);
        assert_eq!(invoice.notes.as_deref(), Some("Net 14"));
    }
}
