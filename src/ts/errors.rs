use crate::ts::lang::SourceLanguage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeSitterError {
    #[error("failed to set {language} grammar for parser")]
    LanguageSet { language: SourceLanguage },

    #[error("failed to parse source code")]
    ParseFailed,
}
