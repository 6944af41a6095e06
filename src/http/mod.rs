pub mod client;
pub mod rate_limit;
pub mod request;
pub mod response;

pub use client::Fetcher;
pub use request::HttpRequest;
pub use response::HttpResponse;
