#[cfg(test)]
use mockall::automock;

mod textfsm;
pub(crate) use textfsm::TextFsmParser;

use thiserror::Error;

/// One structured row extracted from a command output.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum ParserErrors {
    #[error("template `{0}` not found")]
    TemplateNotFound(String),
    #[error("unable to read template `{template}`: {source}")]
    TemplateReadError {
        template: String,
        source: std::io::Error,
    },
    #[error("invalid template `{template}` at line {line}: {reason}")]
    InvalidTemplate {
        template: String,
        line: usize,
        reason: String,
    },
    #[error("template `{template}` rejected input line {line}: {message}")]
    ErrorAction {
        template: String,
        line: usize,
        message: String,
    },
}

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait OutputParser: Send + Sync {
    async fn parse(&self, template: &str, output: &str) -> Result<Vec<Record>, ParserErrors>;
}
