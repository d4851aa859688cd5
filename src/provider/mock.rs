/// Scripted provider for tests and dry runs.
///
/// Replays queued results in order, then falls back to a responder function.
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{GenerateRequest, Provider, ProviderError};

type Responder = Box<dyn Fn(&GenerateRequest) -> Result<String, ProviderError> + Send + Sync>;

pub struct ScriptedProvider {
    queue: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// Replays `results` in order; errors once the script runs out.
    pub fn new(results: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            queue: Mutex::new(results.into()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with `f`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&GenerateRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            queue: Mutex::new(VecDeque::new()),
            responder: Some(Box::new(f)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue results that are served before the responder is consulted.
    #[must_use]
    pub fn with_script(self, results: Vec<Result<String, ProviderError>>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(results);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Provider for ScriptedProvider {
    fn generate(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.prompt.clone());

        let queued = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match (queued, &self.responder) {
            (Some(result), _) => result,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(ProviderError::MalformedResponse(
                "script exhausted".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
