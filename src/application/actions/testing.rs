//! Fakes shared by the delegate tests.

use super::DelegateContext;
use crate::application::status_repository::StatusRepository;
use crate::domain::ports::{
    NativeRedirectRequest, NativeRedirectResponse, NativeRedirectService, StatusService,
};
use crate::domain::status::{StatusRequest, StatusResponse};
use crate::error::{CheckoutError, Result};
use crate::infrastructure::in_memory::InMemoryStateStore;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Answers with the scripted statuses in order, then `pending` forever.
#[derive(Default)]
pub struct ScriptedStatus {
    responses: Mutex<VecDeque<StatusResponse>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedStatus {
    pub fn new(codes: &[(&str, Option<&str>)]) -> Arc<Self> {
        let responses = codes
            .iter()
            .map(|(code, payload)| StatusResponse::new(*code, *payload))
            .collect();
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_for(&self, payment_data: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|pd| *pd == payment_data)
            .count()
    }
}

#[async_trait]
impl StatusService for ScriptedStatus {
    async fn check_status(&self, request: StatusRequest) -> Result<StatusResponse> {
        self.requests.lock().unwrap().push(request.payment_data);
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StatusResponse::new("pending", None)))
    }
}

/// Exchanges any redirect data for `redirectResult = "<data>:<query>"`.
#[derive(Default)]
pub struct EchoNativeRedirect {
    pub fail: bool,
}

#[async_trait]
impl NativeRedirectService for EchoNativeRedirect {
    async fn make_native_redirect(
        &self,
        request: NativeRedirectRequest,
    ) -> Result<NativeRedirectResponse> {
        if self.fail {
            return Err(CheckoutError::component("native redirect failed"));
        }
        Ok(NativeRedirectResponse {
            redirect_result: format!("{}:{}", request.redirect_data, request.return_query_string),
        })
    }
}

pub fn context(status: Arc<ScriptedStatus>) -> DelegateContext {
    DelegateContext::new(
        Arc::new(InMemoryStateStore::new()),
        StatusRepository::new(status),
    )
}
