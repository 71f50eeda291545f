use serde::Serialize;

use super::ClientError;
use crate::types::ErrorEnvelope;

/// Loading / error / data triple for one fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum FetchState<T> {
    Loading,
    Failed(ErrorEnvelope),
    Ready(T),
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        FetchState::Loading
    }
}

impl<T> FetchState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            FetchState::Ready(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorEnvelope> {
        match self {
            FetchState::Failed(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchState<U> {
        match self {
            FetchState::Loading => FetchState::Loading,
            FetchState::Failed(envelope) => FetchState::Failed(envelope),
            FetchState::Ready(data) => FetchState::Ready(f(data)),
        }
    }
}

impl<T> From<Result<T, ClientError>> for FetchState<T> {
    fn from(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(data) => FetchState::Ready(data),
            Err(e) => FetchState::Failed(e.to_envelope()),
        }
    }
}
