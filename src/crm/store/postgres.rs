use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use uuid::Uuid;

use super::{JourneyStore, JourneyTx, TxBody};
use crate::core::shared::schema::crm::{
    crm_invoices, crm_leads, crm_milestones, crm_payments, crm_projects, crm_quotes, crm_tasks,
};
use crate::core::shared::utils::DbPool;
use crate::crm::error::CrmError;
use crate::crm::types::{
    Invoice, Lead, LeadStatus, LineItem, Milestone, Payment, Project, ProjectStatus, Quote, Task,
};

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crm_leads)]
#[diesel(treat_none_as_null = true)]
pub struct DbLead {
    pub id: Uuid,
    pub user_id: Uuid,
    pub contact_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub score: Option<i32>,
    pub score_details: Option<serde_json::Value>,
    pub last_contact_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crm_quotes)]
#[diesel(treat_none_as_null = true)]
pub struct DbQuote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub line_items: serde_json::Value,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub discount: f64,
    pub total: f64,
    pub status: String,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crm_projects)]
#[diesel(treat_none_as_null = true)]
pub struct DbProject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub estimated_days: Option<i32>,
    pub estimated_budget: f64,
    pub actual_cost: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crm_invoices)]
#[diesel(treat_none_as_null = true)]
pub struct DbInvoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub quote_id: Option<Uuid>,
    pub invoice_number: String,
    pub sequence: i32,
    pub line_items: serde_json::Value,
    pub subtotal: f64,
    pub tax_rate: f64,
    pub tax_amount: f64,
    pub discount: f64,
    pub total: f64,
    pub amount_paid: f64,
    pub status: String,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = crm_milestones)]
#[diesel(treat_none_as_null = true)]
pub struct DbMilestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub amount: Option<f64>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crm_tasks)]
pub struct DbTask {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crm_payments)]
pub struct DbPayment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub amount: f64,
    pub method: Option<String>,
    pub reference: Option<String>,
    pub received_at: DateTime<Utc>,
}

fn parse_status<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T, CrmError> {
    raw.parse().map_err(CrmError::Database)
}

fn decode_items(raw: serde_json::Value) -> Result<Vec<LineItem>, CrmError> {
    serde_json::from_value(raw).map_err(|e| CrmError::Database(format!("Bad line items: {e}")))
}

fn encode_items(items: &[LineItem]) -> Result<serde_json::Value, CrmError> {
    serde_json::to_value(items).map_err(|e| CrmError::Internal(e.to_string()))
}

pub fn db_lead_to_lead(db: DbLead) -> Result<Lead, CrmError> {
    Ok(Lead {
        id: db.id,
        user_id: db.user_id,
        contact_name: db.contact_name,
        email: db.email,
        phone: db.phone,
        address: db.address,
        city: db.city,
        state: db.state,
        zip_code: db.zip_code,
        status: parse_status(&db.status)?,
        source: db.source,
        notes: db.notes,
        score: db.score,
        score_details: db.score_details,
        last_contact_at: db.last_contact_at,
        created_at: db.created_at,
        updated_at: db.updated_at,
    })
}

pub fn lead_to_db_lead(lead: &Lead) -> DbLead {
    DbLead {
        id: lead.id,
        user_id: lead.user_id,
        contact_name: lead.contact_name.clone(),
        email: lead.email.clone(),
        phone: lead.phone.clone(),
        address: lead.address.clone(),
        city: lead.city.clone(),
        state: lead.state.clone(),
        zip_code: lead.zip_code.clone(),
        status: lead.status.to_string(),
        source: lead.source.clone(),
        notes: lead.notes.clone(),
        score: lead.score,
        score_details: lead.score_details.clone(),
        last_contact_at: lead.last_contact_at,
        created_at: lead.created_at,
        updated_at: lead.updated_at,
    }
}

pub fn db_quote_to_quote(db: DbQuote) -> Result<Quote, CrmError> {
    Ok(Quote {
        id: db.id,
        user_id: db.user_id,
        lead_id: db.lead_id,
        project_id: db.project_id,
        title: db.title,
        description: db.description,
        line_items: decode_items(db.line_items)?,
        subtotal: db.subtotal,
        tax_rate: db.tax_rate,
        tax_amount: db.tax_amount,
        discount: db.discount,
        total: db.total,
        status: parse_status(&db.status)?,
        valid_until: db.valid_until,
        created_at: db.created_at,
        updated_at: db.updated_at,
    })
}

pub fn quote_to_db_quote(quote: &Quote) -> Result<DbQuote, CrmError> {
    Ok(DbQuote {
        id: quote.id,
        user_id: quote.user_id,
        lead_id: quote.lead_id,
        project_id: quote.project_id,
        title: quote.title.clone(),
        description: quote.description.clone(),
        line_items: encode_items(&quote.line_items)?,
        subtotal: quote.subtotal,
        tax_rate: quote.tax_rate,
        tax_amount: quote.tax_amount,
        discount: quote.discount,
        total: quote.total,
        status: quote.status.to_string(),
        valid_until: quote.valid_until,
        created_at: quote.created_at,
        updated_at: quote.updated_at,
    })
}

pub fn db_project_to_project(db: DbProject) -> Result<Project, CrmError> {
    Ok(Project {
        id: db.id,
        user_id: db.user_id,
        lead_id: db.lead_id,
        name: db.name,
        description: db.description,
        address: db.address,
        city: db.city,
        state: db.state,
        zip_code: db.zip_code,
        status: parse_status(&db.status)?,
        start_date: db.start_date,
        end_date: db.end_date,
        estimated_days: db.estimated_days,
        estimated_budget: db.estimated_budget,
        actual_cost: db.actual_cost,
        created_at: db.created_at,
        updated_at: db.updated_at,
    })
}

pub fn project_to_db_project(project: &Project) -> DbProject {
    DbProject {
        id: project.id,
        user_id: project.user_id,
        lead_id: project.lead_id,
        name: project.name.clone(),
        description: project.description.clone(),
        address: project.address.clone(),
        city: project.city.clone(),
        state: project.state.clone(),
        zip_code: project.zip_code.clone(),
        status: project.status.to_string(),
        start_date: project.start_date,
        end_date: project.end_date,
        estimated_days: project.estimated_days,
        estimated_budget: project.estimated_budget,
        actual_cost: project.actual_cost,
        created_at: project.created_at,
        updated_at: project.updated_at,
    }
}

pub fn db_invoice_to_invoice(db: DbInvoice) -> Result<Invoice, CrmError> {
    Ok(Invoice {
        id: db.id,
        user_id: db.user_id,
        project_id: db.project_id,
        quote_id: db.quote_id,
        invoice_number: db.invoice_number,
        sequence: db.sequence,
        line_items: decode_items(db.line_items)?,
        subtotal: db.subtotal,
        tax_rate: db.tax_rate,
        tax_amount: db.tax_amount,
        discount: db.discount,
        total: db.total,
        amount_paid: db.amount_paid,
        status: parse_status(&db.status)?,
        due_date: db.due_date,
        notes: db.notes,
        created_at: db.created_at,
        updated_at: db.updated_at,
        paid_at: db.paid_at,
    })
}

pub fn invoice_to_db_invoice(invoice: &Invoice) -> Result<DbInvoice, CrmError> {
    Ok(DbInvoice {
        id: invoice.id,
        user_id: invoice.user_id,
        project_id: invoice.project_id,
        quote_id: invoice.quote_id,
        invoice_number: invoice.invoice_number.clone(),
        sequence: invoice.sequence,
        line_items: encode_items(&invoice.line_items)?,
        subtotal: invoice.subtotal,
        tax_rate: invoice.tax_rate,
        tax_amount: invoice.tax_amount,
        discount: invoice.discount,
        total: invoice.total,
        amount_paid: invoice.amount_paid,
        status: invoice.status.to_string(),
        due_date: invoice.due_date,
        notes: invoice.notes.clone(),
        created_at: invoice.created_at,
        updated_at: invoice.updated_at,
        paid_at: invoice.paid_at,
    })
}

impl From<DbMilestone> for Milestone {
    fn from(db: DbMilestone) -> Self {
        Self {
            id: db.id,
            project_id: db.project_id,
            title: db.title,
            amount: db.amount,
            due_date: db.due_date,
            completed_at: db.completed_at,
            created_at: db.created_at,
        }
    }
}

impl From<&Milestone> for DbMilestone {
    fn from(m: &Milestone) -> Self {
        Self {
            id: m.id,
            project_id: m.project_id,
            title: m.title.clone(),
            amount: m.amount,
            due_date: m.due_date,
            completed_at: m.completed_at,
            created_at: m.created_at,
        }
    }
}

impl From<DbTask> for Task {
    fn from(db: DbTask) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            lead_id: db.lead_id,
            project_id: db.project_id,
            title: db.title,
            due_date: db.due_date,
            completed_at: db.completed_at,
            created_at: db.created_at,
        }
    }
}

impl From<&Task> for DbTask {
    fn from(t: &Task) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            lead_id: t.lead_id,
            project_id: t.project_id,
            title: t.title.clone(),
            due_date: t.due_date,
            completed_at: t.completed_at,
            created_at: t.created_at,
        }
    }
}

impl From<DbPayment> for Payment {
    fn from(db: DbPayment) -> Self {
        Self {
            id: db.id,
            invoice_id: db.invoice_id,
            amount: db.amount,
            method: db.method,
            reference: db.reference,
            received_at: db.received_at,
        }
    }
}

impl From<&Payment> for DbPayment {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id,
            invoice_id: p.invoice_id,
            amount: p.amount,
            method: p.method.clone(),
            reference: p.reference.clone(),
            received_at: p.received_at,
        }
    }
}

fn expect_one(updated: usize, entity: &str) -> Result<(), CrmError> {
    if updated == 0 {
        Err(CrmError::not_found(entity))
    } else {
        Ok(())
    }
}

/// Diesel-backed store over the shared r2d2 Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl JourneyStore for PgStore {
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<(), CrmError> {
        let mut pooled = self.pool.get()?;
        let conn: &mut PgConnection = &mut pooled;
        conn.transaction::<(), CrmError, _>(|conn| body(&mut PgTx { conn }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgTx<'c> {
    conn: &'c mut PgConnection,
}

impl JourneyTx for PgTx<'_> {
    fn find_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError> {
        crm_leads::table
            .filter(crm_leads::id.eq(lead_id))
            .filter(crm_leads::user_id.eq(user_id))
            .first::<DbLead>(self.conn)
            .optional()?
            .map(db_lead_to_lead)
            .transpose()
    }

    fn lock_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, CrmError> {
        crm_leads::table
            .filter(crm_leads::id.eq(lead_id))
            .filter(crm_leads::user_id.eq(user_id))
            .for_update()
            .first::<DbLead>(self.conn)
            .optional()?
            .map(db_lead_to_lead)
            .transpose()
    }

    fn list_leads(
        &mut self,
        user_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, CrmError> {
        let mut query = crm_leads::table
            .filter(crm_leads::user_id.eq(user_id))
            .into_boxed();
        if let Some(status) = status {
            query = query.filter(crm_leads::status.eq(status.as_str()));
        }
        query
            .order(crm_leads::created_at.desc())
            .load::<DbLead>(self.conn)?
            .into_iter()
            .map(db_lead_to_lead)
            .collect()
    }

    fn insert_lead(&mut self, lead: &Lead) -> Result<(), CrmError> {
        diesel::insert_into(crm_leads::table)
            .values(&lead_to_db_lead(lead))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_lead(&mut self, lead: &Lead) -> Result<(), CrmError> {
        let updated = diesel::update(crm_leads::table.find(lead.id))
            .set(&lead_to_db_lead(lead))
            .execute(self.conn)?;
        expect_one(updated, "Lead")
    }

    fn delete_lead(&mut self, user_id: Uuid, lead_id: Uuid) -> Result<bool, CrmError> {
        let deleted = diesel::delete(
            crm_leads::table
                .filter(crm_leads::id.eq(lead_id))
                .filter(crm_leads::user_id.eq(user_id)),
        )
        .execute(self.conn)?;
        Ok(deleted > 0)
    }

    fn find_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<Option<Quote>, CrmError> {
        crm_quotes::table
            .filter(crm_quotes::id.eq(quote_id))
            .filter(crm_quotes::user_id.eq(user_id))
            .first::<DbQuote>(self.conn)
            .optional()?
            .map(db_quote_to_quote)
            .transpose()
    }

    fn list_quotes(
        &mut self,
        user_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> Result<Vec<Quote>, CrmError> {
        let mut query = crm_quotes::table
            .filter(crm_quotes::user_id.eq(user_id))
            .into_boxed();
        if let Some(lead_id) = lead_id {
            query = query.filter(crm_quotes::lead_id.eq(lead_id));
        }
        query
            .order(crm_quotes::created_at.asc())
            .load::<DbQuote>(self.conn)?
            .into_iter()
            .map(db_quote_to_quote)
            .collect()
    }

    fn quotes_for_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Vec<Quote>, CrmError> {
        crm_quotes::table
            .filter(crm_quotes::user_id.eq(user_id))
            .filter(crm_quotes::project_id.eq(project_id))
            .order(crm_quotes::created_at.asc())
            .load::<DbQuote>(self.conn)?
            .into_iter()
            .map(db_quote_to_quote)
            .collect()
    }

    fn insert_quote(&mut self, quote: &Quote) -> Result<(), CrmError> {
        diesel::insert_into(crm_quotes::table)
            .values(&quote_to_db_quote(quote)?)
            .execute(self.conn)?;
        Ok(())
    }

    fn update_quote(&mut self, quote: &Quote) -> Result<(), CrmError> {
        let updated = diesel::update(crm_quotes::table.find(quote.id))
            .set(&quote_to_db_quote(quote)?)
            .execute(self.conn)?;
        expect_one(updated, "Quote")
    }

    fn delete_quote(&mut self, user_id: Uuid, quote_id: Uuid) -> Result<bool, CrmError> {
        let deleted = diesel::delete(
            crm_quotes::table
                .filter(crm_quotes::id.eq(quote_id))
                .filter(crm_quotes::user_id.eq(user_id)),
        )
        .execute(self.conn)?;
        Ok(deleted > 0)
    }

    fn find_project(
        &mut self,
        user_id: Uuid,
        project_id: Uuid,
    ) -> Result<Option<Project>, CrmError> {
        crm_projects::table
            .filter(crm_projects::id.eq(project_id))
            .filter(crm_projects::user_id.eq(user_id))
            .first::<DbProject>(self.conn)
            .optional()?
            .map(db_project_to_project)
            .transpose()
    }

    fn project_for_lead(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Option<Project>, CrmError> {
        crm_projects::table
            .filter(crm_projects::lead_id.eq(lead_id))
            .filter(crm_projects::user_id.eq(user_id))
            .first::<DbProject>(self.conn)
            .optional()?
            .map(db_project_to_project)
            .transpose()
    }

    fn list_projects(
        &mut self,
        user_id: Uuid,
        statuses: &[ProjectStatus],
    ) -> Result<Vec<Project>, CrmError> {
        let mut query = crm_projects::table
            .filter(crm_projects::user_id.eq(user_id))
            .into_boxed();
        if !statuses.is_empty() {
            let wanted: Vec<&str> = statuses.iter().map(ProjectStatus::as_str).collect();
            query = query.filter(crm_projects::status.eq_any(wanted));
        }
        query
            .order(crm_projects::created_at.desc())
            .load::<DbProject>(self.conn)?
            .into_iter()
            .map(db_project_to_project)
            .collect()
    }

    fn insert_project(&mut self, project: &Project) -> Result<(), CrmError> {
        diesel::insert_into(crm_projects::table)
            .values(&project_to_db_project(project))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_project(&mut self, project: &Project) -> Result<(), CrmError> {
        let updated = diesel::update(crm_projects::table.find(project.id))
            .set(&project_to_db_project(project))
            .execute(self.conn)?;
        expect_one(updated, "Project")
    }

    fn delete_project(&mut self, user_id: Uuid, project_id: Uuid) -> Result<bool, CrmError> {
        let deleted = diesel::delete(
            crm_projects::table
                .filter(crm_projects::id.eq(project_id))
                .filter(crm_projects::user_id.eq(user_id)),
        )
        .execute(self.conn)?;
        Ok(deleted > 0)
    }

    fn find_invoice(
        &mut self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError> {
        crm_invoices::table
            .filter(crm_invoices::id.eq(invoice_id))
            .filter(crm_invoices::user_id.eq(user_id))
            .first::<DbInvoice>(self.conn)
            .optional()?
            .map(db_invoice_to_invoice)
            .transpose()
    }

    fn invoice_for_quote(
        &mut self,
        user_id: Uuid,
        quote_id: Uuid,
    ) -> Result<Option<Invoice>, CrmError> {
        crm_invoices::table
            .filter(crm_invoices::quote_id.eq(quote_id))
            .filter(crm_invoices::user_id.eq(user_id))
            .first::<DbInvoice>(self.conn)
            .optional()?
            .map(db_invoice_to_invoice)
            .transpose()
    }

    fn list_invoices(
        &mut self,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Invoice>, CrmError> {
        let mut query = crm_invoices::table
            .filter(crm_invoices::user_id.eq(user_id))
            .into_boxed();
        if let Some(project_id) = project_id {
            query = query.filter(crm_invoices::project_id.eq(project_id));
        }
        query
            .order(crm_invoices::sequence.asc())
            .load::<DbInvoice>(self.conn)?
            .into_iter()
            .map(db_invoice_to_invoice)
            .collect()
    }

    fn next_invoice_sequence(&mut self, user_id: Uuid) -> Result<i32, CrmError> {
        let current: Option<i32> = crm_invoices::table
            .filter(crm_invoices::user_id.eq(user_id))
            .select(diesel::dsl::max(crm_invoices::sequence))
            .first(self.conn)?;
        Ok(current.unwrap_or(0) + 1)
    }

    fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError> {
        diesel::insert_into(crm_invoices::table)
            .values(&invoice_to_db_invoice(invoice)?)
            .execute(self.conn)?;
        Ok(())
    }

    fn update_invoice(&mut self, invoice: &Invoice) -> Result<(), CrmError> {
        let updated = diesel::update(crm_invoices::table.find(invoice.id))
            .set(&invoice_to_db_invoice(invoice)?)
            .execute(self.conn)?;
        expect_one(updated, "Invoice")
    }

    fn payments_for_invoice(&mut self, invoice_id: Uuid) -> Result<Vec<Payment>, CrmError> {
        let rows: Vec<DbPayment> = crm_payments::table
            .filter(crm_payments::invoice_id.eq(invoice_id))
            .order(crm_payments::received_at.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(Payment::from).collect())
    }

    fn insert_payment(&mut self, payment: &Payment) -> Result<(), CrmError> {
        diesel::insert_into(crm_payments::table)
            .values(&DbPayment::from(payment))
            .execute(self.conn)?;
        Ok(())
    }

    fn milestones_for_project(&mut self, project_id: Uuid) -> Result<Vec<Milestone>, CrmError> {
        let rows: Vec<DbMilestone> = crm_milestones::table
            .filter(crm_milestones::project_id.eq(project_id))
            .order(crm_milestones::created_at.asc())
            .load(self.conn)?;
        Ok(rows.into_iter().map(Milestone::from).collect())
    }

    fn find_milestone(&mut self, milestone_id: Uuid) -> Result<Option<Milestone>, CrmError> {
        Ok(crm_milestones::table
            .find(milestone_id)
            .first::<DbMilestone>(self.conn)
            .optional()?
            .map(Milestone::from))
    }

    fn insert_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError> {
        diesel::insert_into(crm_milestones::table)
            .values(&DbMilestone::from(milestone))
            .execute(self.conn)?;
        Ok(())
    }

    fn update_milestone(&mut self, milestone: &Milestone) -> Result<(), CrmError> {
        let updated = diesel::update(crm_milestones::table.find(milestone.id))
            .set(&DbMilestone::from(milestone))
            .execute(self.conn)?;
        expect_one(updated, "Milestone")
    }

    fn open_tasks(
        &mut self,
        user_id: Uuid,
        lead_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<Task>, CrmError> {
        let mut query = crm_tasks::table
            .filter(crm_tasks::user_id.eq(user_id))
            .filter(crm_tasks::completed_at.is_null())
            .into_boxed();
        query = match project_id {
            Some(project_id) => query.filter(
                crm_tasks::lead_id
                    .eq(lead_id)
                    .or(crm_tasks::project_id.eq(project_id)),
            ),
            None => query.filter(crm_tasks::lead_id.eq(lead_id)),
        };
        let rows: Vec<DbTask> = query.order(crm_tasks::created_at.asc()).load(self.conn)?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    fn insert_task(&mut self, task: &Task) -> Result<(), CrmError> {
        diesel::insert_into(crm_tasks::table)
            .values(&DbTask::from(task))
            .execute(self.conn)?;
        Ok(())
    }
}
