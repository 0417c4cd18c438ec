//! Plain CRUD over the journey entities. Journey transitions (conversion,
//! invoicing, losing a lead) live in [`super::workflow`].

use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::error::CrmError;
use super::pricing::{price_line_items, round_cents};
use super::store::{in_transaction, JourneyStore};
use super::types::{
    CreateLeadRequest, CreateMilestoneRequest, Invoice, InvoiceStatus, Lead, LeadStatus,
    Milestone, Payment, Project, ProjectStatus, Quote, QuoteStatus, RecordPaymentRequest,
    UpdateLeadRequest, UpdateProjectRequest, UpdateQuoteItemsRequest,
};

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct EntityService {
    store: Arc<dyn JourneyStore>,
}

impl EntityService {
    pub fn new(store: Arc<dyn JourneyStore>) -> Self {
        Self { store }
    }

    pub fn create_lead(&self, user_id: Uuid, req: CreateLeadRequest) -> Result<Lead, CrmError> {
        let mut details = Vec::new();
        if req.contact_name.trim().is_empty() {
            details.push("contactName is required".to_string());
        }
        if req.address.trim().is_empty() {
            details.push("address is required".to_string());
        }
        if !details.is_empty() {
            return Err(CrmError::validation(details));
        }

        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            user_id,
            contact_name: req.contact_name.trim().to_string(),
            email: non_blank(req.email),
            phone: non_blank(req.phone),
            address: req.address.trim().to_string(),
            city: non_blank(req.city),
            state: non_blank(req.state),
            zip_code: non_blank(req.zip_code),
            status: LeadStatus::New,
            source: non_blank(req.source),
            notes: non_blank(req.notes),
            score: None,
            score_details: None,
            last_contact_at: None,
            created_at: now,
            updated_at: now,
        };
        in_transaction(self.store.as_ref(), |tx| tx.insert_lead(&lead))?;
        info!("Created lead {} for user {}", lead.id, user_id);
        Ok(lead)
    }

    pub fn get_lead(&self, user_id: Uuid, lead_id: Uuid) -> Result<Lead, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.find_lead(user_id, lead_id))?
            .ok_or_else(|| CrmError::not_found("Lead"))
    }

    pub fn list_leads(
        &self,
        user_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.list_leads(user_id, status))
    }

    pub fn update_lead(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
        req: UpdateLeadRequest,
    ) -> Result<Lead, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let mut lead = tx
                .find_lead(user_id, lead_id)?
                .ok_or_else(|| CrmError::not_found("Lead"))?;

            if let Some(next) = req.status {
                if next != lead.status && !lead.status.can_set_manually(next) {
                    return Err(CrmError::invalid_state(format!(
                        "Cannot change lead status from {} to {}",
                        lead.status, next
                    )));
                }
                lead.status = next;
            }
            if let Some(name) = req.contact_name {
                if name.trim().is_empty() {
                    return Err(CrmError::validation(vec![
                        "contactName must not be blank".to_string()
                    ]));
                }
                lead.contact_name = name.trim().to_string();
            }
            if let Some(address) = req.address {
                if address.trim().is_empty() {
                    return Err(CrmError::validation(vec![
                        "address must not be blank".to_string()
                    ]));
                }
                lead.address = address.trim().to_string();
            }
            if req.email.is_some() {
                lead.email = non_blank(req.email);
            }
            if req.phone.is_some() {
                lead.phone = non_blank(req.phone);
            }
            if req.city.is_some() {
                lead.city = non_blank(req.city);
            }
            if req.state.is_some() {
                lead.state = non_blank(req.state);
            }
            if req.zip_code.is_some() {
                lead.zip_code = non_blank(req.zip_code);
            }
            if req.notes.is_some() {
                lead.notes = non_blank(req.notes);
            }
            lead.updated_at = Utc::now();
            tx.update_lead(&lead)?;
            Ok(lead)
        })
    }

    pub fn delete_lead(&self, user_id: Uuid, lead_id: Uuid) -> Result<(), CrmError> {
        let deleted = in_transaction(self.store.as_ref(), |tx| tx.delete_lead(user_id, lead_id))?;
        if !deleted {
            return Err(CrmError::not_found("Lead"));
        }
        info!("Deleted lead {lead_id}");
        Ok(())
    }

    pub fn get_quote(&self, user_id: Uuid, quote_id: Uuid) -> Result<Quote, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.find_quote(user_id, quote_id))?
            .ok_or_else(|| CrmError::not_found("Quote"))
    }

    pub fn list_quotes(
        &self,
        user_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> Result<Vec<Quote>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.list_quotes(user_id, lead_id))
    }

    pub fn update_quote_status(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        next: QuoteStatus,
    ) -> Result<Quote, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let mut quote = tx
                .find_quote(user_id, quote_id)?
                .ok_or_else(|| CrmError::not_found("Quote"))?;
            if quote.status == next {
                return Ok(quote);
            }
            if !quote.status.can_transition_to(next) {
                return Err(CrmError::invalid_state(format!(
                    "Cannot change quote status from {} to {}",
                    quote.status, next
                )));
            }
            let now = Utc::now();
            if next == QuoteStatus::Accepted && quote.valid_until < now {
                return Err(CrmError::invalid_state("Quote has expired"));
            }
            quote.status = next;
            quote.updated_at = now;
            tx.update_quote(&quote)?;
            info!("Quote {} is now {}", quote.id, next);
            Ok(quote)
        })
    }

    pub fn update_quote_items(
        &self,
        user_id: Uuid,
        quote_id: Uuid,
        req: UpdateQuoteItemsRequest,
    ) -> Result<Quote, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let mut quote = tx
                .find_quote(user_id, quote_id)?
                .ok_or_else(|| CrmError::not_found("Quote"))?;
            if quote.status != QuoteStatus::Draft {
                return Err(CrmError::invalid_state(
                    "Only draft quotes can have their line items changed",
                ));
            }
            let tax = req.tax.unwrap_or(quote.tax_rate);
            let discount = req.discount.unwrap_or(quote.discount);
            let (items, totals) = price_line_items(&req.line_items, tax, discount)?;
            quote.line_items = items;
            quote.subtotal = totals.subtotal;
            quote.tax_rate = totals.tax_rate;
            quote.tax_amount = totals.tax_amount;
            quote.discount = totals.discount;
            quote.total = totals.total;
            quote.updated_at = Utc::now();
            tx.update_quote(&quote)?;
            Ok(quote)
        })
    }

    pub fn delete_quote(&self, user_id: Uuid, quote_id: Uuid) -> Result<(), CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let quote = tx
                .find_quote(user_id, quote_id)?
                .ok_or_else(|| CrmError::not_found("Quote"))?;
            if quote.project_id.is_some() {
                return Err(CrmError::invalid_state(
                    "Quote has been converted to a project",
                ));
            }
            if tx.invoice_for_quote(user_id, quote_id)?.is_some() {
                return Err(CrmError::invalid_state("Quote has been invoiced"));
            }
            tx.delete_quote(user_id, quote_id)?;
            Ok(())
        })
    }

    pub fn get_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.find_project(user_id, project_id))?
            .ok_or_else(|| CrmError::not_found("Project"))
    }

    pub fn list_projects(
        &self,
        user_id: Uuid,
        status: Option<ProjectStatus>,
    ) -> Result<Vec<Project>, CrmError> {
        let statuses: Vec<ProjectStatus> = status.into_iter().collect();
        in_transaction(self.store.as_ref(), |tx| tx.list_projects(user_id, &statuses))
    }

    pub fn update_project(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        req: UpdateProjectRequest,
    ) -> Result<Project, CrmError> {
        let mut details = Vec::new();
        if let Some(cost) = req.actual_cost {
            if !cost.is_finite() || cost < 0.0 {
                details.push("actualCost must be >= 0".to_string());
            }
        }
        if let Some(days) = req.estimated_days {
            if days < 1 {
                details.push("estimatedDays must be >= 1".to_string());
            }
        }
        if matches!(&req.name, Some(name) if name.trim().is_empty()) {
            details.push("name must not be blank".to_string());
        }
        if !details.is_empty() {
            return Err(CrmError::validation(details));
        }

        in_transaction(self.store.as_ref(), |tx| {
            let mut project = tx
                .find_project(user_id, project_id)?
                .ok_or_else(|| CrmError::not_found("Project"))?;

            if let Some(next) = req.status {
                if next != project.status && !project.status.can_transition_to(next) {
                    return Err(CrmError::invalid_state(format!(
                        "Cannot change project status from {} to {}",
                        project.status, next
                    )));
                }
                project.status = next;
            }
            if let Some(name) = &req.name {
                project.name = name.trim().to_string();
            }
            if req.description.is_some() {
                project.description = non_blank(req.description.clone());
            }
            if let Some(cost) = req.actual_cost {
                project.actual_cost = round_cents(cost);
            }
            if let Some(start) = req.start_date {
                project.start_date = Some(start);
            }
            if let Some(days) = req.estimated_days {
                project.estimated_days = Some(days);
            }
            if let (Some(start), Some(days)) = (project.start_date, project.estimated_days) {
                project.end_date = Some(start + chrono::Duration::days(i64::from(days)));
            }
            project.updated_at = Utc::now();
            tx.update_project(&project)?;
            Ok(project)
        })
    }

    pub fn delete_project(&self, user_id: Uuid, project_id: Uuid) -> Result<(), CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            if tx.find_project(user_id, project_id)?.is_none() {
                return Err(CrmError::not_found("Project"));
            }
            if !tx.list_invoices(user_id, Some(project_id))?.is_empty() {
                return Err(CrmError::invalid_state("Project has invoices"));
            }
            tx.delete_project(user_id, project_id)?;
            Ok(())
        })
    }

    pub fn add_milestone(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        req: CreateMilestoneRequest,
    ) -> Result<Milestone, CrmError> {
        let mut details = Vec::new();
        if req.title.trim().is_empty() {
            details.push("title is required".to_string());
        }
        if matches!(req.amount, Some(amount) if !amount.is_finite() || amount < 0.0) {
            details.push("amount must be >= 0".to_string());
        }
        if !details.is_empty() {
            return Err(CrmError::validation(details));
        }

        in_transaction(self.store.as_ref(), |tx| {
            if tx.find_project(user_id, project_id)?.is_none() {
                return Err(CrmError::not_found("Project"));
            }
            let milestone = Milestone {
                id: Uuid::new_v4(),
                project_id,
                title: req.title.trim().to_string(),
                amount: req.amount.map(round_cents),
                due_date: req.due_date,
                completed_at: None,
                created_at: Utc::now(),
            };
            tx.insert_milestone(&milestone)?;
            Ok(milestone)
        })
    }

    pub fn list_milestones(
        &self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Milestone>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            if tx.find_project(user_id, project_id)?.is_none() {
                return Err(CrmError::not_found("Project"));
            }
            tx.milestones_for_project(project_id)
        })
    }

    pub fn complete_milestone(
        &self,
        user_id: Uuid,
        milestone_id: Uuid,
    ) -> Result<Milestone, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let mut milestone = tx
                .find_milestone(milestone_id)?
                .ok_or_else(|| CrmError::not_found("Milestone"))?;
            // Ownership runs through the parent project.
            if tx.find_project(user_id, milestone.project_id)?.is_none() {
                return Err(CrmError::not_found("Milestone"));
            }
            if milestone.completed_at.is_none() {
                milestone.completed_at = Some(Utc::now());
                tx.update_milestone(&milestone)?;
            }
            Ok(milestone)
        })
    }

    pub fn get_invoice(&self, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.find_invoice(user_id, invoice_id))?
            .ok_or_else(|| CrmError::not_found("Invoice"))
    }

    pub fn list_invoices(
        &self,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Invoice>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| tx.list_invoices(user_id, project_id))
    }

    pub fn update_invoice_status(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        next: InvoiceStatus,
    ) -> Result<Invoice, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            let mut invoice = tx
                .find_invoice(user_id, invoice_id)?
                .ok_or_else(|| CrmError::not_found("Invoice"))?;
            if invoice.status == next {
                return Ok(invoice);
            }
            if !invoice.status.can_set_manually(next) {
                return Err(CrmError::invalid_state(format!(
                    "Cannot change invoice status from {} to {}",
                    invoice.status, next
                )));
            }
            invoice.status = next;
            invoice.updated_at = Utc::now();
            tx.update_invoice(&invoice)?;
            info!("Invoice {} is now {}", invoice.invoice_number, next);
            Ok(invoice)
        })
    }

    /// Records a payment and moves the invoice to PARTIAL or PAID.
    pub fn record_payment(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        req: RecordPaymentRequest,
    ) -> Result<(Invoice, Payment), CrmError> {
        let amount = round_cents(req.amount);
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CrmError::validation(vec![
                "amount must be at least 0.01".to_string()
            ]));
        }

        in_transaction(self.store.as_ref(), |tx| {
            let mut invoice = tx
                .find_invoice(user_id, invoice_id)?
                .ok_or_else(|| CrmError::not_found("Invoice"))?;
            if !invoice.status.accepts_payment() {
                return Err(CrmError::invalid_state(format!(
                    "Cannot record a payment on a {} invoice",
                    invoice.status
                )));
            }
            let balance = invoice.balance();
            if amount > balance {
                return Err(CrmError::validation(vec![format!(
                    "amount {amount} exceeds the outstanding balance {balance}"
                )]));
            }

            let now = Utc::now();
            let payment = Payment {
                id: Uuid::new_v4(),
                invoice_id,
                amount,
                method: non_blank(req.method.clone()),
                reference: non_blank(req.reference.clone()),
                received_at: now,
            };
            tx.insert_payment(&payment)?;

            invoice.amount_paid = round_cents(invoice.amount_paid + amount);
            if invoice.balance() <= 0.0 {
                invoice.status = InvoiceStatus::Paid;
                invoice.paid_at = Some(now);
            } else {
                invoice.status = InvoiceStatus::Partial;
            }
            invoice.updated_at = now;
            tx.update_invoice(&invoice)?;
            info!(
                "Recorded payment of {} on invoice {} ({})",
                amount, invoice.invoice_number, invoice.status
            );
            Ok((invoice, payment))
        })
    }

    pub fn list_payments(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, CrmError> {
        in_transaction(self.store.as_ref(), |tx| {
            if tx.find_invoice(user_id, invoice_id)?.is_none() {
                return Err(CrmError::not_found("Invoice"));
            }
            tx.payments_for_invoice(invoice_id)
        })
    }
}
