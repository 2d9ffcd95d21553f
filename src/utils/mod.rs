pub mod constants;
pub mod net;

pub use constants::*;
pub use net::{host_of, is_extractable_url, is_retainable_request_url, normalize_scheme};
