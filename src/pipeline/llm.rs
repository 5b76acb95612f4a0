//! LLM capability used by the outline stages, plus the shared client cache.
//!
//! The stages only ever need "system prompt + user prompt in, text out", so
//! they talk to the small object-safe [`OutlineLlm`] trait rather than to
//! `edgequake_llm::LLMProvider` directly. [`EdgequakeLlm`] adapts any
//! edgequake provider; tests plug in scripted implementations.
//!
//! Prompt engineering lives in [`crate::prompts`]; retry policy lives in
//! [`crate::pipeline::retry`]. [`LlmInvoker`] joins the two for one step.

use crate::config::{LlmProviderKind, ProcessingConfig};
use crate::error::{LlmError, OutlineError};
use crate::pipeline::retry::{execute_with_fallback, execute_with_retry, RetryPolicy};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

/// A text-completion capability.
#[async_trait]
pub trait OutlineLlm: Send + Sync {
    /// Send one system + user turn and return the raw completion text.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// [`OutlineLlm`] over an `edgequake_llm` provider.
pub struct EdgequakeLlm {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl EdgequakeLlm {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

impl fmt::Debug for EdgequakeLlm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgequakeLlm")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[async_trait]
impl OutlineLlm for EdgequakeLlm {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_prompt),
        ];
        let options = self.options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| LlmError::Provider(format!("{}", e)))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.model,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(response.content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Identity of a configured client.
///
/// Temperature is keyed by its bit pattern so the key can be `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub provider: LlmProviderKind,
    pub model: String,
    pub temperature_bits: u32,
    pub max_tokens: usize,
}

impl ClientKey {
    pub fn new(provider: LlmProviderKind, model: impl Into<String>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature_bits: temperature.to_bits(),
            max_tokens,
        }
    }

    /// Key of the primary model.
    pub fn primary(config: &ProcessingConfig) -> Self {
        Self::new(
            config.llm_provider,
            config.llm_model.clone(),
            config.temperature,
            config.max_tokens,
        )
    }

    /// Key of the fallback model, when one is configured.
    pub fn fallback(config: &ProcessingConfig) -> Option<Self> {
        config.fallback_model.as_ref().map(|model| {
            Self::new(
                config.llm_provider,
                model.clone(),
                config.temperature,
                config.max_tokens,
            )
        })
    }

    pub fn temperature(&self) -> f32 {
        f32::from_bits(self.temperature_bits)
    }
}

type ClientFactory = dyn Fn(&ClientKey) -> Result<Arc<dyn OutlineLlm>, OutlineError> + Send + Sync;

/// Process-wide cache of constructed clients, shared across requests.
///
/// Reads take the read lock only; a miss builds the client outside any lock
/// and inserts it with "first writer wins", so concurrent misses on the same
/// key converge on one instance.
pub struct LlmClientCache {
    clients: RwLock<HashMap<ClientKey, Arc<dyn OutlineLlm>>>,
    factory: Box<ClientFactory>,
}

impl LlmClientCache {
    /// Cache that builds [`EdgequakeLlm`] clients through `ProviderFactory`.
    pub fn new() -> Self {
        Self::with_factory(build_client)
    }

    /// Cache with a custom constructor for misses.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&ClientKey) -> Result<Arc<dyn OutlineLlm>, OutlineError> + Send + Sync + 'static,
    {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    pub fn get_or_create(&self, key: &ClientKey) -> Result<Arc<dyn OutlineLlm>, OutlineError> {
        if let Some(client) = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(Arc::clone(client));
        }

        let created = (self.factory)(key)?;
        debug!("LLM client cache miss: {}/{}", key.provider, key.model);
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(clients.entry(key.clone()).or_insert(created)))
    }

    /// Register a pre-built client under `key`, replacing any previous one.
    pub fn insert(&self, key: ClientKey, client: Arc<dyn OutlineLlm>) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, client);
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LlmClientCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LlmClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClientCache")
            .field("clients", &self.len())
            .finish()
    }
}

/// Construct an [`EdgequakeLlm`] for `key`.
///
/// The provider reads its credentials from the environment
/// (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, …).
pub fn build_client(key: &ClientKey) -> Result<Arc<dyn OutlineLlm>, OutlineError> {
    let provider_name = key.provider.as_str();
    let provider = ProviderFactory::create_llm_provider(provider_name, &key.model).map_err(|e| {
        OutlineError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!(
                "Could not create provider '{}' with model '{}'.\n\
                Check the provider's API key is set in the environment.\n\
                Error: {}",
                provider_name, key.model, e
            ),
        }
    })?;
    Ok(Arc::new(EdgequakeLlm::new(
        provider,
        key.model.clone(),
        key.temperature(),
        key.max_tokens,
    )))
}

/// Primary client, optional fallback and retry policy for one run.
#[derive(Clone)]
pub struct LlmInvoker {
    primary: Arc<dyn OutlineLlm>,
    fallback: Option<Arc<dyn OutlineLlm>>,
    policy: RetryPolicy,
}

impl LlmInvoker {
    pub fn new(primary: Arc<dyn OutlineLlm>, policy: RetryPolicy) -> Self {
        Self {
            primary,
            fallback: None,
            policy,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn OutlineLlm>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Resolve the clients `config` names through `clients`.
    pub fn from_config(config: &ProcessingConfig, clients: &LlmClientCache) -> Result<Self, OutlineError> {
        let primary = clients.get_or_create(&ClientKey::primary(config))?;
        let mut invoker = Self::new(primary, RetryPolicy::from_config(config));
        if let Some(key) = ClientKey::fallback(config) {
            invoker = invoker.with_fallback(clients.get_or_create(&key)?);
        }
        Ok(invoker)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn model_name(&self) -> &str {
        self.primary.model_name()
    }

    /// One logical completion: retried on the primary, then the fallback once.
    pub async fn invoke(&self, label: &str, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let primary = || self.primary.complete(system_prompt, user_prompt);
        match &self.fallback {
            Some(fallback) => {
                execute_with_fallback(label, &self.policy, primary, || {
                    fallback.complete(system_prompt, user_prompt)
                })
                .await
            }
            None => execute_with_retry(label, &self.policy, primary).await,
        }
    }
}

impl fmt::Debug for LlmInvoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmInvoker")
            .field("primary", &self.primary.model_name())
            .field("fallback", &self.fallback.as_ref().map(|f| f.model_name().to_string()))
            .field("policy", &self.policy)
            .finish()
    }
}
