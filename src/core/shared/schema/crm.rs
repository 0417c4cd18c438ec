diesel::table! {
    crm_leads (id) {
        id -> Uuid,
        user_id -> Uuid,
        contact_name -> Varchar,
        email -> Nullable<Varchar>,
        phone -> Nullable<Varchar>,
        address -> Varchar,
        city -> Nullable<Varchar>,
        state -> Nullable<Varchar>,
        zip_code -> Nullable<Varchar>,
        status -> Varchar,
        source -> Nullable<Varchar>,
        notes -> Nullable<Text>,
        score -> Nullable<Int4>,
        score_details -> Nullable<Jsonb>,
        last_contact_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    crm_quotes (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Nullable<Uuid>,
        project_id -> Nullable<Uuid>,
        title -> Varchar,
        description -> Nullable<Text>,
        line_items -> Jsonb,
        subtotal -> Float8,
        tax_rate -> Float8,
        tax_amount -> Float8,
        discount -> Float8,
        total -> Float8,
        status -> Varchar,
        valid_until -> Timestamptz,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    crm_projects (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Nullable<Uuid>,
        name -> Varchar,
        description -> Nullable<Text>,
        address -> Varchar,
        city -> Nullable<Varchar>,
        state -> Nullable<Varchar>,
        zip_code -> Nullable<Varchar>,
        status -> Varchar,
        start_date -> Nullable<Timestamptz>,
        end_date -> Nullable<Timestamptz>,
        estimated_days -> Nullable<Int4>,
        estimated_budget -> Float8,
        actual_cost -> Float8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    crm_invoices (id) {
        id -> Uuid,
        user_id -> Uuid,
        project_id -> Nullable<Uuid>,
        quote_id -> Nullable<Uuid>,
        invoice_number -> Varchar,
        sequence -> Int4,
        line_items -> Jsonb,
        subtotal -> Float8,
        tax_rate -> Float8,
        tax_amount -> Float8,
        discount -> Float8,
        total -> Float8,
        amount_paid -> Float8,
        status -> Varchar,
        due_date -> Timestamptz,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
        paid_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    crm_milestones (id) {
        id -> Uuid,
        project_id -> Uuid,
        title -> Varchar,
        amount -> Nullable<Float8>,
        due_date -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    crm_tasks (id) {
        id -> Uuid,
        user_id -> Uuid,
        lead_id -> Nullable<Uuid>,
        project_id -> Nullable<Uuid>,
        title -> Varchar,
        due_date -> Nullable<Timestamptz>,
        completed_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    crm_payments (id) {
        id -> Uuid,
        invoice_id -> Uuid,
        amount -> Float8,
        method -> Nullable<Varchar>,
        reference -> Nullable<Varchar>,
        received_at -> Timestamptz,
    }
}

diesel::joinable!(crm_quotes -> crm_leads (lead_id));
diesel::joinable!(crm_projects -> crm_leads (lead_id));
diesel::joinable!(crm_invoices -> crm_projects (project_id));
diesel::joinable!(crm_invoices -> crm_quotes (quote_id));
diesel::joinable!(crm_milestones -> crm_projects (project_id));
diesel::joinable!(crm_tasks -> crm_leads (lead_id));
diesel::joinable!(crm_payments -> crm_invoices (invoice_id));

diesel::allow_tables_to_appear_in_same_query!(
    crm_leads,
    crm_quotes,
    crm_projects,
    crm_invoices,
    crm_milestones,
    crm_tasks,
    crm_payments,
);
