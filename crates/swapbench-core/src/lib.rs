//! swapbench-core — Face-swap provider client and batch orchestrator.
//!
//! Builds provider-specific requests, sends them one at a time with
//! per-attempt timeouts and a bounded retry, and normalizes whatever
//! the provider returns into a single image reference plus metrics.

pub mod batch;
pub mod client;
pub mod credentials;
pub mod input;
pub mod normalize;
pub mod request;
pub mod types;

pub use batch::{Orchestrator, DEFAULT_REQUEST_DELAY};
pub use client::{Endpoints, HttpClient, RetryPolicy, SwapError, Swapper};
pub use credentials::{CredentialError, CredentialSource, Credentials, StaticCredentials, ThortfulAuth};
pub use input::{ImageInput, InputError};
pub use normalize::{NormalizeError, NormalizedResponse};
pub use request::{BuildError, SwapOptions, SwapRequest};
pub use types::{DetectionOrder, ErrorKind, ImageRef, ModelType, Provider, SwapResult, TestRecord};
