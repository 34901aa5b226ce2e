//! kubeguard — audits a Kubernetes worker node and its cluster against the
//! CIS Kubernetes Benchmark v1.9.
//!
//! Each automated control is an ordered list of evidence probes (process
//! flags, kubelet config fields, file metadata, cluster queries) resolved
//! first-match-wins into a single verdict. Cluster queries run under a
//! hard deadline and never block the run.
//!
//! See `DESIGN.md` for the module map and decisions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod evidence;
pub mod executor;
pub mod logging;
pub mod report;
pub mod runner;
pub mod types;
