//! # Toto Client
//!
//! A Rust client library for the Toto remote document-processing service.
//! It wraps the service's REST and GraphQL endpoints for authentication,
//! file upload, job queuing, status polling, and data/graph queries over
//! processed documents (OCR text, table extraction, full-text search).
//!
//! ## Features
//!
//! - **File Upload**: base64 data-URI payloads with deterministic
//!   name-size-mtime upload identifiers
//! - **Job Control**: named job submission and fixed-interval completion
//!   polling
//! - **Graph Queries**: parameterized templates for data nodes, full-text
//!   search, and pivoted final tables
//! - **Table Workflows**: detection, recognition, and CSV-to-table decoding
//! - **Error Handling**: one taxonomy carrying the original HTTP status and
//!   body for every wire failure, with no hidden retries
//!
//! The client is synchronous and blocking throughout. A single instance
//! reuses one transport handle across sequential calls; concurrent use of
//! the same instance from several threads is not guaranteed.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use toto_client::{api::TotoClient, config::ClientConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Connect to a deployment with authentication disabled
//! let client = TotoClient::new_unauthenticated(ClientConfig::well_known()?)?;
//!
//! // Upload a document and run OCR on it
//! let data_id = client.upload_file("invoice.pdf")?;
//! let job_id = client.queue_job("pageimg2ocr", &data_id, None, false)?;
//! client.wait_for_jobs_to_complete(&[job_id], None, true)?;
//!
//! // Read back the processed node
//! let node = client.get_data(&data_id, None, Some(&["pageimg2ocr"]), None)?;
//! println!("{} children", node.datas("pageimg2ocr").len());
//! # Ok(())
//! # }
//! ```

/// Client, REST operations, job polling, and the table workflows
pub mod api;

/// Identity-provider capability and the service-token exchange
pub mod auth;

/// Explicit client configuration; environment helpers for callers
pub mod config;

/// Response data model and the final-table pivot
pub mod data;

/// Wire-failure types carrying status codes and raw bodies
pub mod errors;

/// Deterministic upload identifiers
pub mod file_id;

/// Parameterized GraphQL templates and graph operations
pub mod graphql;

/// Decoded tabular payloads
pub mod table;
