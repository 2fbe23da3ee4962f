#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),

    #[error("Request error")]
    RequestError(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    StatusError {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Json error")]
    JsonError(#[from] serde_json::Error),

    #[error("Template {template} references unknown variable `{variable}`")]
    TemplateError { template: String, variable: String },

    #[error("Notification rejected: {0}")]
    NotifyError(String),
}
