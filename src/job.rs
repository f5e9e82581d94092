//! Crawl-job plugin surface: work items and parse results, the URL-pattern
//! registry, the fetch opener, and the `CrawlJob` contract supplied to the
//! loader by dependency injection.

pub mod contract;
pub mod opener;
pub mod patterns;
pub mod work;
