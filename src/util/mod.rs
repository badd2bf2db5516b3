pub mod backoff;
pub mod safe_converter;
