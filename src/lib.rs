//! xspect: a context-aware reflected XSS scanning engine.
//!
//! The pipeline runs crawl -> inject -> detect -> triage against a single
//! origin. [`orchestrator::Engine`] drives one scan through its lifecycle
//! and snapshots it into a [`store::ScanStore`]; [`report`] renders the
//! terminal scan for humans or machines.

pub mod cancel;
pub mod cli;
pub mod corpus;
pub mod crawler;
pub mod detector;
pub mod error;
pub mod http;
pub mod injector;
pub mod model;
pub mod orchestrator;
pub mod report;
pub mod scope;
pub mod store;
pub mod triage;
