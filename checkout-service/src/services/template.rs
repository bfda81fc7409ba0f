//! HTML invoice rendering.

use askama::Template;

use crate::models::{Invoice, PaymentStatus};

const COMPANY_NAME: &str = "DownDating";
const SUPPORT_EMAIL: &str = "support@downdating.in";
const WEBSITE: &str = "https://downdating.in";

#[derive(Template)]
#[template(path = "invoice.html")]
pub struct InvoiceTemplate<'a> {
    company_name: &'a str,
    support_email: &'a str,
    website: &'a str,
    invoice_number: &'a str,
    invoice_date: String,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    order_id: &'a str,
    payment_id: Option<&'a str>,
    plan_id: &'a str,
    plan_title: &'a str,
    amount: String,
    status_label: &'a str,
    completed: bool,
}

impl<'a> InvoiceTemplate<'a> {
    pub fn new(invoice: &'a Invoice) -> Self {
        Self {
            company_name: COMPANY_NAME,
            support_email: SUPPORT_EMAIL,
            website: WEBSITE,
            invoice_number: &invoice.invoice_number,
            invoice_date: invoice.created_at.format("%-d %B %Y").to_string(),
            name: &invoice.name,
            email: &invoice.email,
            phone: &invoice.phone,
            order_id: &invoice.razorpay_order_id,
            payment_id: invoice.razorpay_payment_id.as_deref(),
            plan_id: &invoice.plan_id,
            plan_title: &invoice.plan_title,
            amount: format_inr(invoice.amount),
            status_label: invoice.payment_status.label(),
            completed: invoice.payment_status == PaymentStatus::Completed,
        }
    }
}

pub fn render_invoice(invoice: &Invoice) -> Result<String, askama::Error> {
    InvoiceTemplate::new(invoice).render()
}

pub fn invoice_subject(invoice_number: &str) -> String {
    format!("Invoice #{} - {} Purchase", invoice_number, COMPANY_NAME)
}

/// Format paise as rupees with Indian digit grouping, e.g. `₹1,49,900.00`.
pub fn format_inr(minor_units: u64) -> String {
    let rupees = (minor_units / 100).to_string();
    let paise = minor_units % 100;

    let grouped = if rupees.len() <= 3 {
        rupees
    } else {
        let (head, tail) = rupees.split_at(rupees.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };

    format!("₹{}.{:02}", grouped, paise)
}
