//! Response marshalling

pub mod json;

pub use json::{AnalysisReport, ErrorBody, Response, ResponseBody};
