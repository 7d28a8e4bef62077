use crate::error::Result;
use crate::model::Classification;
use async_trait::async_trait;

/// Detects entity and topic labels in a piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification>;
}

#[async_trait]
impl<F> Classifier for F
where
    F: Fn(&str) -> Result<Classification> + Send + Sync,
{
    async fn classify(&self, text: &str) -> Result<Classification> {
        self(text)
    }
}

/// Classifies one document. Empty text is never sent to the classifier, while
/// whitespace-only text is. A failing classifier yields an empty classification
/// plus the error message.
pub async fn classify_document(
    classifier: &dyn Classifier,
    text: &str,
) -> (Classification, Option<String>) {
    if text.is_empty() {
        return (Classification::default(), None);
    }
    match classifier.classify(text).await {
        Ok(classification) => (classification, None),
        Err(err) => (Classification::default(), Some(err.to_string())),
    }
}
