use thiserror::Error;

#[derive(Error, Debug)]
pub enum HaystackError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
