use std::error::Error as StdError;

use thiserror::Error;

use crate::{
    application::images::ImageError, client::ServiceError, config::LoadError,
    domain::error::DomainError, infra::error::InfraError,
};

/// Error message chain collected from an error and its sources.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self { source, messages }
    }

    pub fn render(&self) -> String {
        self.messages.join(": ")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("data service request failed")]
    Service(#[from] ServiceError),
    #[error("image upload failed")]
    Image(#[from] ImageError),
    #[error("failed to load configuration")]
    Config(#[from] LoadError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the operator CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Infra(InfraError::Configuration { .. }) => 78,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Validation(_)
            | AppError::Image(ImageError::Validation(_)) => 65,
            AppError::Service(_) | AppError::Image(ImageError::Upload(_)) => 69,
            AppError::Infra(InfraError::Io { .. }) => 74,
            _ => 1,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from_error("application::error::AppError", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_walks_source_chain() {
        let error = AppError::from(ServiceError::status(503, None, "unavailable"));
        let report = error.report();
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0], "data service request failed");
        assert!(report.render().contains("503"));
        assert_eq!(error.exit_code(), 69);
    }

    #[test]
    fn unreadable_file_reports_path_and_cause() {
        let error = AppError::from(InfraError::io(
            std::path::Path::new("covers/missing.png"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        ));
        assert_eq!(error.exit_code(), 74);
        assert_eq!(
            error.report().render(),
            "failed to read covers/missing.png: no such file"
        );
    }

    #[test]
    fn validation_errors_map_to_data_error_code() {
        assert_eq!(AppError::validation("no files").exit_code(), 65);
        assert_eq!(
            AppError::from(DomainError::validation("title must not be empty")).exit_code(),
            65
        );
    }
}
