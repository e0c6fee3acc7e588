//! Deterministic scripted gateway.
//!
//! Replies are queued per [`CallPurpose`] and consumed in order; when a
//! queue runs dry the purpose's standing responder (if any) answers. Every
//! request is recorded for later inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{CallPurpose, CompletionRequest, GatewayError, LanguageModelGateway};

type Responder = Box<dyn Fn(&CompletionRequest) -> String + Send + Sync>;

enum ScriptedReply {
    Text(String),
    Delayed(String, Duration),
    Fail(GatewayError),
}

/// In-memory gateway answering from per-purpose scripts.
pub struct ScriptedGateway {
    queues: Mutex<HashMap<CallPurpose, VecDeque<ScriptedReply>>>,
    responders: HashMap<CallPurpose, Responder>,
    requests: Mutex<Vec<CompletionRequest>>,
    model: String,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            responders: HashMap::new(),
            requests: Mutex::new(Vec::new()),
            model: "scripted".to_string(),
        }
    }

    fn push(self, purpose: CallPurpose, reply: ScriptedReply) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(purpose)
            .or_default()
            .push_back(reply);
        self
    }

    /// Queue one text reply.
    pub fn respond(self, purpose: CallPurpose, text: impl Into<String>) -> Self {
        self.push(purpose, ScriptedReply::Text(text.into()))
    }

    /// Queue one text reply delivered after `delay`.
    pub fn respond_after(
        self,
        purpose: CallPurpose,
        text: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.push(purpose, ScriptedReply::Delayed(text.into(), delay))
    }

    /// Queue one failure.
    pub fn fail(self, purpose: CallPurpose, error: GatewayError) -> Self {
        self.push(purpose, ScriptedReply::Fail(error))
    }

    /// Standing reply used once the queue for `purpose` is empty.
    pub fn fallback(self, purpose: CallPurpose, text: impl Into<String>) -> Self {
        let text = text.into();
        self.respond_with(purpose, move |_| text.clone())
    }

    /// Standing responder computed from the request.
    pub fn respond_with<F>(mut self, purpose: CallPurpose, responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> String + Send + Sync + 'static,
    {
        self.responders.insert(purpose, Box::new(responder));
        self
    }

    /// Every request seen so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Requests seen for one purpose, in call order.
    pub fn requests_for(&self, purpose: CallPurpose) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.purpose == purpose)
            .collect()
    }

    pub fn call_count(&self, purpose: CallPurpose) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.purpose == purpose)
            .count()
    }
}

#[async_trait]
impl LanguageModelGateway for ScriptedGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let queued = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&request.purpose)
            .and_then(|q| q.pop_front());

        match queued {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Delayed(text, delay)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            Some(ScriptedReply::Fail(error)) => Err(error),
            None => match self.responders.get(&request.purpose) {
                Some(responder) => Ok(responder(request)),
                None => Err(GatewayError::InvalidResponse(format!(
                    "no scripted response for {}",
                    request.purpose
                ))),
            },
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
