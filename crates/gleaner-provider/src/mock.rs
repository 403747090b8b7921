//! Scriptable mock provider
//!
//! Returns pre-configured responses without any network calls. Responses
//! can be scripted per `(provider, item)` pair, failures can be made
//! persistent, and every call is logged so tests can assert on exactly
//! which provider was tried for which item.

use gleaner_domain::traits::{ExtractionProvider, ProviderRequest};
use gleaner_domain::{Extraction, ItemId, ProviderError, ProviderId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One logged call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Provider that was asked
    pub provider: ProviderId,
    /// Item that was processed
    pub item: ItemId,
}

type Script = VecDeque<Result<String, ProviderError>>;

/// Mock extraction provider for deterministic testing
///
/// Lookup order for each call:
/// 1. the next scripted response for `(provider, item)`
/// 2. a persistent failure for `(provider, item)`
/// 3. a persistent failure for `item` on any provider
/// 4. the default response
///
/// # Examples
///
/// ```
/// use gleaner_domain::{ItemId, ProviderError, ProviderId};
/// use gleaner_provider::MockProvider;
///
/// let provider = MockProvider::new("ok");
/// // First call for q2 on model-a is throttled, later calls succeed
/// provider.fail_times("model-a", "q2", ProviderError::rate_limited("429"), 1);
/// // q7 can never be read
/// provider.fail_always("q7", ProviderError::fatal("corrupt image"));
/// assert_eq!(provider.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    latency: Duration,
    scripts: Arc<Mutex<HashMap<(ProviderId, ItemId), Script>>>,
    failures: Arc<Mutex<HashMap<(Option<ProviderId>, ItemId), ProviderError>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    /// Create a new MockProvider with a fixed response for all items
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            latency: Duration::ZERO,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Simulate network latency on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue responses for one `(provider, item)` pair
    pub fn script<I>(&self, provider: impl Into<ProviderId>, item: impl Into<ItemId>, responses: I)
    where
        I: IntoIterator<Item = Result<String, ProviderError>>,
    {
        lock(&self.scripts)
            .entry((provider.into(), item.into()))
            .or_default()
            .extend(responses);
    }

    /// Fail the next `times` calls for one `(provider, item)` pair
    pub fn fail_times(
        &self,
        provider: impl Into<ProviderId>,
        item: impl Into<ItemId>,
        error: ProviderError,
        times: usize,
    ) {
        self.script(provider, item, std::iter::repeat_n(Err(error), times));
    }

    /// Fail every call for `item` on every provider
    pub fn fail_always(&self, item: impl Into<ItemId>, error: ProviderError) {
        lock(&self.failures).insert((None, item.into()), error);
    }

    /// Fail every call for `item` on one provider
    pub fn fail_always_on(
        &self,
        provider: impl Into<ProviderId>,
        item: impl Into<ItemId>,
        error: ProviderError,
    ) {
        lock(&self.failures).insert((Some(provider.into()), item.into()), error);
    }

    /// Remove every persistent failure for `item`
    pub fn recover(&self, item: &ItemId) {
        lock(&self.failures).retain(|(_, failing), _| failing != item);
    }

    /// Get the number of calls made so far
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Calls made for one item, in order
    pub fn calls_for(&self, item: &ItemId) -> Vec<MockCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| &call.item == item)
            .cloned()
            .collect()
    }

    /// All calls made so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Reset the call log
    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    fn respond(&self, provider: &ProviderId, item: &ItemId) -> Result<String, ProviderError> {
        lock(&self.calls).push(MockCall {
            provider: provider.clone(),
            item: item.clone(),
        });

        let key = (provider.clone(), item.clone());
        if let Some(next) = lock(&self.scripts).get_mut(&key).and_then(VecDeque::pop_front) {
            return next;
        }

        let failures = lock(&self.failures);
        if let Some(err) = failures
            .get(&(Some(provider.clone()), item.clone()))
            .or_else(|| failures.get(&(None, item.clone())))
        {
            return Err(err.clone());
        }

        Ok(self.default_response.clone())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("Default mock response")
    }
}

impl ExtractionProvider for MockProvider {
    async fn call(&self, request: ProviderRequest<'_>) -> Result<Extraction, ProviderError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let text = self.respond(request.provider, request.item)?;
        Ok(Extraction {
            text,
            model: Some(request.provider.to_string()),
            total_tokens: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_domain::{PromptConfig, ProviderErrorKind, SourceRef};

    async fn call(provider: &MockProvider, model: &str, item: &str) -> Result<Extraction, ProviderError> {
        let provider_id = ProviderId::new(model);
        let item_id = ItemId::new(item);
        let source = SourceRef::new(format!("{}.jpeg", item));
        let prompt = PromptConfig::default();
        provider
            .call(ProviderRequest {
                provider: &provider_id,
                item: &item_id,
                source: &source,
                prompt: &prompt,
                timeout: Duration::from_secs(1),
            })
            .await
    }

    #[tokio::test]
    async fn test_mock_provider_default() {
        let provider = MockProvider::new("Test response");
        let result = call(&provider, "a", "q1").await.unwrap();
        assert_eq!(result.text, "Test response");
        assert_eq!(result.model.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_scripted_responses_are_consumed_in_order() {
        let provider = MockProvider::default();
        provider.script(
            "a",
            "q1",
            vec![Err(ProviderError::timeout("slow")), Ok("second".to_string())],
        );

        let first = call(&provider, "a", "q1").await.unwrap_err();
        assert_eq!(first.kind, ProviderErrorKind::Timeout);
        assert_eq!(call(&provider, "a", "q1").await.unwrap().text, "second");
        assert_eq!(call(&provider, "a", "q1").await.unwrap().text, "Default mock response");
    }

    #[tokio::test]
    async fn test_scripts_are_per_provider() {
        let provider = MockProvider::new("ok");
        provider.fail_times("a", "q1", ProviderError::rate_limited("429"), 1);

        assert!(call(&provider, "b", "q1").await.is_ok());
        assert!(call(&provider, "a", "q1").await.is_err());
    }

    #[tokio::test]
    async fn test_persistent_failures_and_recover() {
        let provider = MockProvider::new("ok");
        provider.fail_always("q7", ProviderError::fatal("corrupt"));
        provider.fail_always_on("a", "q8", ProviderError::bad_request("no vision"));

        assert!(call(&provider, "a", "q7").await.is_err());
        assert!(call(&provider, "b", "q7").await.is_err());
        assert!(call(&provider, "a", "q8").await.is_err());
        assert!(call(&provider, "b", "q8").await.is_ok());

        provider.recover(&ItemId::new("q7"));
        assert!(call(&provider, "a", "q7").await.is_ok());
    }

    #[tokio::test]
    async fn test_call_log_is_shared_between_clones() {
        let provider1 = MockProvider::new("ok");
        let provider2 = provider1.clone();

        call(&provider1, "a", "q1").await.unwrap();
        call(&provider2, "b", "q2").await.unwrap();

        assert_eq!(provider1.call_count(), 2);
        assert_eq!(provider2.calls_for(&ItemId::new("q2")).len(), 1);

        provider1.reset_calls();
        assert_eq!(provider2.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_uses_tokio_time() {
        let provider = MockProvider::new("ok").with_latency(Duration::from_secs(5));
        let start = tokio::time::Instant::now();
        call(&provider, "a", "q1").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(5));
    }
}
