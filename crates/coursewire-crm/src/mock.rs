//! Scriptable mock CRM transport for deterministic testing.
//!
//! Replies are queued ahead of time; calls with no queued reply succeed
//! with generated remote ids. Every call is recorded for assertion.
//!
//! ## Usage
//!
//! ```rust
//! use coursewire_crm::mock::MockCrmConnector;
//! use coursewire_core::{CrmConnector, WireRecord};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mock = MockCrmConnector::new();
//!     let connection = mock.connect().await.unwrap();
//!
//!     let records = vec![WireRecord::new("KMTMMP__Keyword__c").field("Name", "Safety")];
//!     let results = connection.create(&records).await.unwrap();
//!     assert!(results[0].success);
//!     assert_eq!(mock.create_calls().len(), 1);
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use coursewire_core::{
    CrmConnection, CrmConnector, CrmCredential, Error, QueryPage, Result, SaveResult, WireRecord,
};

/// One scripted reply for a create or update call.
#[derive(Debug, Clone)]
pub enum BatchReply {
    /// Return these per-record results.
    Results(Vec<SaveResult>),
    /// Fail the call with a transport error.
    Transport(String),
}

/// A recorded transport call.
#[derive(Debug, Clone)]
pub enum MockCrmCall {
    Connect,
    Create { records: Vec<WireRecord> },
    Update { records: Vec<WireRecord> },
    Query { soql: String },
    QueryMore { locator: String },
}

#[derive(Default)]
struct MockCrmState {
    fail_connect: AtomicBool,
    next_id: AtomicUsize,
    batch_replies: Mutex<VecDeque<BatchReply>>,
    pages: Mutex<VecDeque<QueryPage>>,
    calls: Mutex<Vec<MockCrmCall>>,
}

impl MockCrmState {
    fn log_call(&self, call: MockCrmCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn auto_results(&self, count: usize) -> Vec<SaveResult> {
        (0..count)
            .map(|_| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                SaveResult::ok(format!("mock-id-{}", n + 1))
            })
            .collect()
    }

    fn reply_for(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        let reply = self.batch_replies.lock().unwrap().pop_front();
        match reply {
            Some(BatchReply::Results(results)) => Ok(results),
            Some(BatchReply::Transport(message)) => Err(Error::Request(message)),
            None => Ok(self.auto_results(records.len())),
        }
    }
}

/// Mock CRM connector for testing.
#[derive(Clone, Default)]
pub struct MockCrmConnector {
    state: Arc<MockCrmState>,
}

impl MockCrmConnector {
    /// Create a new mock connector that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connect calls fail.
    pub fn set_connect_failure(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Queue per-record results for the next create or update call.
    pub fn queue_results(&self, results: Vec<SaveResult>) {
        self.state
            .batch_replies
            .lock()
            .unwrap()
            .push_back(BatchReply::Results(results));
    }

    /// Queue a transport failure for the next create or update call.
    pub fn queue_transport_error(&self, message: impl Into<String>) {
        self.state
            .batch_replies
            .lock()
            .unwrap()
            .push_back(BatchReply::Transport(message.into()));
    }

    /// Queue a page for the next query or query_more call.
    pub fn queue_page(&self, page: QueryPage) {
        self.state.pages.lock().unwrap().push_back(page);
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCrmCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state.calls.lock().unwrap().clear()
    }

    /// Record batches submitted to create, in call order.
    pub fn create_calls(&self) -> Vec<Vec<WireRecord>> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCrmCall::Create { records } => Some(records.clone()),
                _ => None,
            })
            .collect()
    }

    /// Record batches submitted to update, in call order.
    pub fn update_calls(&self) -> Vec<Vec<WireRecord>> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCrmCall::Update { records } => Some(records.clone()),
                _ => None,
            })
            .collect()
    }

    /// Query strings submitted, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                MockCrmCall::Query { soql } => Some(soql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Get number of connect calls.
    pub fn connect_call_count(&self) -> usize {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, MockCrmCall::Connect))
            .count()
    }
}

#[async_trait]
impl CrmConnector for MockCrmConnector {
    async fn connect(&self) -> Result<Box<dyn CrmConnection>> {
        self.state.log_call(MockCrmCall::Connect);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Connect("Mock connection refused".to_string()));
        }
        Ok(Box::new(MockCrmConnection {
            state: self.state.clone(),
        }))
    }

    async fn connect_with(&self, _credentials: &CrmCredential) -> Result<Box<dyn CrmConnection>> {
        self.connect().await
    }
}

struct MockCrmConnection {
    state: Arc<MockCrmState>,
}

#[async_trait]
impl CrmConnection for MockCrmConnection {
    async fn create(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        self.state.log_call(MockCrmCall::Create {
            records: records.to_vec(),
        });
        self.state.reply_for(records)
    }

    async fn update(&self, records: &[WireRecord]) -> Result<Vec<SaveResult>> {
        self.state.log_call(MockCrmCall::Update {
            records: records.to_vec(),
        });
        self.state.reply_for(records)
    }

    async fn query(&self, soql: &str) -> Result<QueryPage> {
        self.state.log_call(MockCrmCall::Query {
            soql: soql.to_string(),
        });
        let page = self.state.pages.lock().unwrap().pop_front();
        Ok(page.unwrap_or_else(|| QueryPage::last(Vec::new())))
    }

    async fn query_more(&self, locator: &str) -> Result<QueryPage> {
        self.state.log_call(MockCrmCall::QueryMore {
            locator: locator.to_string(),
        });
        let page = self.state.pages.lock().unwrap().pop_front();
        Ok(page.unwrap_or_else(|| QueryPage::last(Vec::new())))
    }
}
