mod document_utils;

pub use document_utils::*;
