pub mod downloader;
pub mod uploader;

pub use downloader::{Downloader, FetchOutcome};
pub use uploader::Uploader;
