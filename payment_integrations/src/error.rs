use shop_engine::traits::{CardProcessorError, ExplorerError, RateSourceError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum IntegrationError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The {0} integration has no credentials configured")]
    NotConfigured(&'static str),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("The request timed out")]
    Timeout,
    #[error("Invalid currency amount: {0}")]
    InvalidCurrencyAmount(String),
}

impl From<IntegrationError> for CardProcessorError {
    fn from(e: IntegrationError) -> Self {
        match e {
            IntegrationError::NotConfigured(name) => CardProcessorError::NotConfigured(name.to_string()),
            IntegrationError::QueryError { status, message } => CardProcessorError::Rejected { status, message },
            IntegrationError::JsonError(s) | IntegrationError::InvalidCurrencyAmount(s) => {
                CardProcessorError::InvalidResponse(s)
            },
            e => CardProcessorError::RequestFailed(e.to_string()),
        }
    }
}

impl From<IntegrationError> for ExplorerError {
    fn from(e: IntegrationError) -> Self {
        match e {
            IntegrationError::Timeout => ExplorerError::Timeout,
            IntegrationError::JsonError(s) | IntegrationError::InvalidCurrencyAmount(s) => {
                ExplorerError::InvalidResponse(s)
            },
            e => ExplorerError::RequestFailed(e.to_string()),
        }
    }
}

impl From<IntegrationError> for RateSourceError {
    fn from(e: IntegrationError) -> Self {
        match e {
            IntegrationError::JsonError(s) | IntegrationError::InvalidCurrencyAmount(s) => {
                RateSourceError::InvalidResponse(s)
            },
            e => RateSourceError::RequestFailed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errors_map_onto_collaborator_contracts() {
        let rejected = IntegrationError::QueryError { status: 402, message: "card_declined".into() };
        assert!(matches!(CardProcessorError::from(rejected), CardProcessorError::Rejected { status: 402, .. }));
        let missing = IntegrationError::NotConfigured("stripe");
        assert!(matches!(CardProcessorError::from(missing), CardProcessorError::NotConfigured(_)));
        assert!(matches!(ExplorerError::from(IntegrationError::Timeout), ExplorerError::Timeout));
        let bad = IntegrationError::JsonError("expected object".into());
        assert!(matches!(RateSourceError::from(bad), RateSourceError::InvalidResponse(_)));
    }
}
