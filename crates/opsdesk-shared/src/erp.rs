//! Tenant-scoped ERP rows as stored by the backend. Wire format is the
//! backend's snake_case JSON. Every row carries the `business_id` it is
//! scoped to; row-level security on the backend enforces the scoping, the
//! types here just mirror it.

use chrono::{DateTime, NaiveDate, Utc};

use crate::id::BusinessId;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Employee {
    pub id: uuid::Uuid,
    pub business_id: BusinessId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: String,
    pub department: String,
    pub salary: f64,
    pub hire_date: NaiveDate,
    pub status: EmployeeStatus,
}

#[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmployeeStatus {
    Active,
    Inactive,
    Terminated,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Customer {
    pub id: uuid::Uuid,
    pub business_id: BusinessId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    #[serde(rename = "type")]
    pub kind: CustomerKind,
    pub total_spent: f64,
    pub last_order_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustomerKind {
    Individual,
    Business,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct InventoryItem {
    pub id: uuid::Uuid,
    pub business_id: BusinessId,
    pub name: String,
    pub sku: String,
    pub category: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub cost_price: f64,
    pub reorder_level: i64,
    pub supplier: Option<String>,
    pub status: StockStatus,
}

#[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StockStatus {
    InStock,
    LowStock,
    OutOfStock,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct Invoice {
    pub id: uuid::Uuid,
    pub business_id: BusinessId,
    pub customer_id: uuid::Uuid,
    pub customer_name: String,
    pub invoice_number: String,
    pub items: Vec<InvoiceItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
    pub status: InvoiceStatus,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct InvoiceItem {
    pub id: uuid::Uuid,
    pub name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total: f64,
}

#[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_row_parses_from_backend_json() {
        let json = r#"{
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "business_id": "550e8400-e29b-41d4-a716-446655440000",
            "first_name": "Ada",
            "last_name": "Osei",
            "email": "ada@example.com",
            "phone": null,
            "role": "Accountant",
            "department": "Finance",
            "salary": 54000.0,
            "hire_date": "2023-04-01",
            "status": "active"
        }"#;

        let actual: Employee = serde_json::from_str(json).unwrap();

        assert_eq!(actual.status, EmployeeStatus::Active);
        assert_eq!(actual.phone, None);
        assert_eq!(actual.hire_date, NaiveDate::from_ymd_opt(2023, 4, 1).unwrap());
    }

    #[test]
    fn invoice_status_round_trips_snake_case() {
        let json = serde_json::to_string(&InvoiceStatus::Overdue).unwrap();
        assert_eq!(json, "\"overdue\"");
        let back: InvoiceStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, InvoiceStatus::Overdue);
    }
}
