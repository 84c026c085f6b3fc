mod request_builder;
mod response_parser;

pub use request_builder::{ApiRequestBuilder, StaticTokenSource};
pub use response_parser::ApiResponseParser;
