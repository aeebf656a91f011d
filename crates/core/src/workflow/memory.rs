use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::AuditEvent;
use crate::domain::money::Money;
use crate::domain::request::{
    CashFlow, CashFlowId, Request, RequestId, RequestItem, RequestItemId, RequestStatus,
};
use crate::domain::site::Site;
use crate::ingestion::NewRequest;
use crate::reporting::{ApprovedSpend, RequestFilter};
use crate::workflow::store::{
    Insertion, RequestRecord, StoreError, TransitionCommit, WorkflowStore,
};

#[derive(Default)]
struct MemoryState {
    sites: Vec<Site>,
    requests: BTreeMap<RequestId, Request>,
    by_submission: HashMap<String, RequestId>,
    cash_flows: Vec<CashFlow>,
    events: Vec<(RequestId, AuditEvent)>,
    next_request_id: i64,
    next_item_id: i64,
    next_cash_flow_id: i64,
    fail_writes: bool,
}

/// Process-local store with the same atomicity contract as the SQL store.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: Mutex<MemoryState>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: Vec<Site>) -> Self {
        let store = Self::new();
        store.lock().sites = sites;
        store
    }

    /// Makes every subsequent write fail with a backend error, leaving state untouched.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Overwrites a stored total in place, as an out-of-band edit to the record would.
    pub fn overwrite_total(&self, id: RequestId, total: Money) {
        if let Some(request) = self.lock().requests.get_mut(&id) {
            request.total_amount = total;
        }
    }

    pub fn events_for(&self, id: RequestId) -> Vec<AuditEvent> {
        self.lock()
            .events
            .iter()
            .filter(|(request_id, _)| *request_id == id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn cash_flows(&self) -> Vec<CashFlow> {
        self.lock().cash_flows.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MemoryState {
    fn record(&self, request: &Request) -> RequestRecord {
        RequestRecord { request: request.clone(), site_name: self.site_name(request) }
    }

    fn site_name(&self, request: &Request) -> String {
        self.sites
            .iter()
            .find(|site| site.id == request.site_id)
            .map(|site| site.name.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn find_site_by_name(&self, name: &str) -> Result<Option<Site>, StoreError> {
        Ok(self.lock().sites.iter().find(|site| site.name == name).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<Site>, StoreError> {
        let mut sites = self.lock().sites.clone();
        sites.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(sites)
    }

    async fn insert_request(
        &self,
        request: NewRequest,
        audit: AuditEvent,
    ) -> Result<Insertion, StoreError> {
        let mut state = self.lock();
        if let Some(existing) = state.by_submission.get(&request.submission_id) {
            return Ok(Insertion::Duplicate(*existing));
        }
        if state.fail_writes {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        if !state.sites.iter().any(|site| site.id == request.site_id) {
            return Err(StoreError::Backend(format!(
                "FOREIGN KEY constraint failed: site {}",
                request.site_id.0
            )));
        }

        state.next_request_id += 1;
        let id = RequestId(state.next_request_id);
        let mut items = Vec::with_capacity(request.items.len());
        for item in request.items {
            state.next_item_id += 1;
            items.push(RequestItem {
                id: RequestItemId(state.next_item_id),
                item_name: item.item_name,
                quantity: item.quantity,
                unit_rate: item.unit_rate,
                total_amount: item.total_amount,
                category: item.category,
            });
        }

        state.by_submission.insert(request.submission_id.clone(), id);
        state.requests.insert(
            id,
            Request {
                id,
                site_id: request.site_id,
                submission_id: request.submission_id,
                request_date: request.request_date,
                submitted_at: request.submitted_at,
                worker_name: request.worker.name,
                worker_contact: request.worker.contact,
                notes: request.notes,
                status: RequestStatus::PendingFinance,
                total_amount: request.total_amount,
                finance_review: None,
                head_office_review: None,
                items,
            },
        );
        state.events.push((id, audit));
        Ok(Insertion::Created(id))
    }

    async fn find_request(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        let state = self.lock();
        Ok(state.requests.get(&id).map(|request| state.record(request)))
    }

    async fn commit_transition(&self, commit: TransitionCommit) -> Result<(), StoreError> {
        let mut state = self.lock();
        let current = state.requests.get(&commit.request_id).ok_or(StoreError::NotFound)?;
        if current.status != commit.expected {
            return Err(StoreError::StatusChanged {
                expected: commit.expected,
                actual: current.status,
            });
        }
        if state.fail_writes {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        let updated = commit.applied_to(current);
        updated.check_invariants().map_err(|error| StoreError::Backend(error.to_string()))?;
        if commit.cash_flow.is_some()
            && state.cash_flows.iter().any(|entry| entry.request_id == commit.request_id)
        {
            return Err(StoreError::Backend(
                "UNIQUE constraint failed: cash_flow.request_id".to_string(),
            ));
        }

        if let Some(entry) = commit.cash_flow {
            state.next_cash_flow_id += 1;
            let id = CashFlowId(state.next_cash_flow_id);
            state.cash_flows.push(CashFlow {
                id,
                request_id: entry.request_id,
                site_id: entry.site_id,
                amount: entry.amount,
                transaction_date: entry.transaction_date,
                description: entry.description,
            });
        }

        state.requests.insert(commit.request_id, updated);
        state.events.push((commit.request_id, commit.audit));
        Ok(())
    }

    async fn list_requests(&self, filter: RequestFilter) -> Result<Vec<RequestRecord>, StoreError> {
        let state = self.lock();
        let mut records = state
            .requests
            .values()
            .filter(|request| filter.matches(request))
            .map(|request| state.record(request))
            .collect::<Vec<_>>();
        records.sort_by_key(|record| (record.request.submitted_at, record.request.id));
        Ok(records)
    }

    async fn approved_spend_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ApprovedSpend>, StoreError> {
        let state = self.lock();
        Ok(state
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::ApprovedHeadOffice)
            .filter_map(|request| {
                let approved_at = request.head_office_review.as_ref()?.reviewed_at;
                (approved_at >= start && approved_at < end).then(|| ApprovedSpend {
                    request_id: request.id,
                    site_name: state.site_name(request),
                    amount: request.total_amount,
                    approved_at,
                })
            })
            .collect())
    }

    async fn cash_flows_for_request(&self, id: RequestId) -> Result<Vec<CashFlow>, StoreError> {
        Ok(self.lock().cash_flows.iter().filter(|entry| entry.request_id == id).cloned().collect())
    }
}
