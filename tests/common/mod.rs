//! Shared mock sources and completion providers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crosscite::llm::{ChatRequest, ChatResponse};
use crosscite::{
    AgentError, Engine, EngineConfig, EvidenceItem, LlmProvider, PromptSet, SourceAdapter,
    SourceError, SourceFamily, SourceId, SourceRegistry, SourceRequest,
};

/// What a mock source does when called.
pub enum Behaviour {
    /// Always returns these items.
    Items(Vec<EvidenceItem>),
    /// Returns the items whose needle occurs in the request text.
    Keyed(Vec<(&'static str, EvidenceItem)>),
    /// Never answers.
    Hang,
    /// Always fails.
    Fail(SourceError),
}

/// Scripted source adapter that counts its calls.
pub struct MockSource {
    id: SourceId,
    family: SourceFamily,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl MockSource {
    pub fn new(id: &str, family: SourceFamily, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            id: SourceId::new(id),
            family,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn family(&self) -> SourceFamily {
        self.family
    }

    async fn retrieve(&self, request: &SourceRequest) -> Result<Vec<EvidenceItem>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Items(items) => Ok(items.iter().take(request.max_results).cloned().collect()),
            Behaviour::Keyed(entries) => Ok(entries
                .iter()
                .filter(|(needle, _)| request.text.contains(needle))
                .map(|(_, item)| item.clone())
                .take(request.max_results)
                .collect()),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Vec::new())
            }
            Behaviour::Fail(error) => Err(error.clone()),
        }
    }
}

pub fn item(source: &str, id: &str, title: &str, body: &str, score: f64) -> EvidenceItem {
    EvidenceItem::new(SourceId::new(source), id, title, body, score)
}

/// Completion provider with canned replies.
///
/// JSON-mode requests get `decomposition`, everything else gets `answer`.
/// A missing reply is an upstream failure.
pub struct ScriptedProvider {
    answer: Option<String>,
    decomposition: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            decomposition: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn down() -> Self {
        Self {
            answer: None,
            decomposition: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_decomposition(mut self, json: &str) -> Self {
        self.decomposition = Some(json.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = if request.json_mode {
            self.decomposition.as_ref()
        } else {
            self.answer.as_ref()
        };
        reply
            .map(|content| ChatResponse {
                content: content.clone(),
                ..ChatResponse::default()
            })
            .ok_or_else(|| AgentError::ApiRequest {
                message: "upstream 503 from https://llm.internal.example (token sk-test-123)".to_string(),
                status: Some(503),
            })
    }
}

pub fn registry(sources: &[Arc<MockSource>]) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for source in sources {
        registry
            .register(Arc::clone(source) as Arc<dyn SourceAdapter>)
            .unwrap_or_else(|_| unreachable!());
    }
    registry
}

pub fn engine(
    config: EngineConfig,
    sources: &[Arc<MockSource>],
    provider: Option<Arc<ScriptedProvider>>,
) -> Engine {
    Engine::with_provider(
        config,
        registry(sources),
        provider.map(|p| p as Arc<dyn LlmProvider>),
        &PromptSet::defaults(),
    )
}
