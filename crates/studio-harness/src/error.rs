use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type HarnessResult<T> = Result<T, HarnessError>;
