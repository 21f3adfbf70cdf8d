//! Macros for providers that reuse the OpenAI wire format.

/// Implement `ChatModel` for a newtype around [`OpenAiClient`](crate::remote::OpenAiClient).
///
/// The type must have an `inner: OpenAiClient` field.
#[macro_export]
macro_rules! impl_openai_compatible {
    ($client_type:ty) => {
        #[async_trait::async_trait]
        impl parley_core::ChatModel for $client_type {
            async fn chat(
                &self,
                request: parley_core::ChatRequest,
            ) -> std::result::Result<parley_core::ChatResponse, parley_core::ModelError> {
                parley_core::ChatModel::chat(&self.inner, request).await
            }

            fn model_name(&self) -> &str {
                parley_core::ChatModel::model_name(&self.inner)
            }
        }

        impl $client_type {
            pub fn config(&self) -> &$crate::config::RemoteLlmConfig {
                self.inner.config()
            }

            /// Override the backoff schedule derived from `max_retries`.
            pub fn with_retry_policy(mut self, retry: $crate::retry::RetryPolicy) -> Self {
                self.inner = self.inner.with_retry_policy(retry);
                self
            }
        }
    };
}
