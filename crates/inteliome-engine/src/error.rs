use inteliome_core::errors::GatewayError;
use inteliome_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(StoreError),

    /// The controller was wired or called in a way that can never succeed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A model reply that is not exactly one text block.
    #[error("{call} returned {shape} instead of a single text block")]
    ContractViolation { call: &'static str, shape: String },

    #[error("language gate replied {0:?}")]
    UnrecognizedLanguageVerdict(String),

    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        if e.is_configuration() {
            Self::Configuration(e.to_string())
        } else {
            Self::Store(e)
        }
    }
}

impl EngineError {
    /// Fatal errors that retrying the same input cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
