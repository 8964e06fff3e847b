//! Tenant-scoped row queries for the dashboard screens. Each takes the
//! business to scope to plus a callback to wake the UI once data is in; the
//! backend's row-level security enforces the scoping server side as well.

use futures::channel::oneshot;
use opsdesk_shared::{
    const_config::path::{
        PathSpec, PATH_REST_CUSTOMERS, PATH_REST_EMPLOYEES, PATH_REST_INVENTORY,
        PATH_REST_INVOICES,
    },
    erp::{Customer, Employee, InventoryItem, Invoice},
    id::BusinessId,
};
use std::fmt::Debug;

use super::{process_json_body, RestBackend, UiCallBack};

impl RestBackend {
    #[tracing::instrument(skip(ui_notify))]
    pub fn list_employees<F: UiCallBack>(
        &self,
        business_id: BusinessId,
        ui_notify: F,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Employee>>> {
        self.list_rows(PATH_REST_EMPLOYEES, business_id, "last_name.asc", ui_notify)
    }

    #[tracing::instrument(skip(ui_notify))]
    pub fn list_customers<F: UiCallBack>(
        &self,
        business_id: BusinessId,
        ui_notify: F,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Customer>>> {
        self.list_rows(PATH_REST_CUSTOMERS, business_id, "name.asc", ui_notify)
    }

    #[tracing::instrument(skip(ui_notify))]
    pub fn list_inventory<F: UiCallBack>(
        &self,
        business_id: BusinessId,
        ui_notify: F,
    ) -> oneshot::Receiver<anyhow::Result<Vec<InventoryItem>>> {
        self.list_rows(PATH_REST_INVENTORY, business_id, "name.asc", ui_notify)
    }

    #[tracing::instrument(skip(ui_notify))]
    pub fn list_invoices<F: UiCallBack>(
        &self,
        business_id: BusinessId,
        ui_notify: F,
    ) -> oneshot::Receiver<anyhow::Result<Vec<Invoice>>> {
        self.list_rows(PATH_REST_INVOICES, business_id, "created_at.desc", ui_notify)
    }

    fn list_rows<U, F>(
        &self,
        path_spec: PathSpec,
        business_id: BusinessId,
        order: &'static str,
        ui_notify: F,
    ) -> oneshot::Receiver<anyhow::Result<Vec<U>>>
    where
        U: Send + Debug + serde::de::DeserializeOwned + 'static,
        F: UiCallBack,
    {
        let (tx, rx) = oneshot::channel();
        let query = [
            ("select", "*".to_string()),
            ("business_id", format!("eq.{business_id}")),
            ("order", order.to_string()),
        ];
        let on_done = move |resp: reqwest::Result<reqwest::Response>| async move {
            let msg = process_json_body::<Vec<U>>(resp).await;
            tx.send(msg).expect("failed to send oneshot msg");
            ui_notify();
        };
        self.initiate_get(path_spec, &query, on_done);
        rx
    }
}
