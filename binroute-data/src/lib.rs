//! Data-side services for Binroute: the mapping-service adapter and the
//! distance cache maintainer.
//!
//! [`routing`] talks to the external distance/directions provider, splitting
//! requests to fit its limits and retrying when throttled. [`cache`] keeps the
//! all-pairs distance cache in the record store consistent with the bins it
//! holds, either by a full rebuild or by recomputing only the legs a batch of
//! bin mutations touched.

#![forbid(unsafe_code)]

pub mod cache;
pub mod routing;

pub use cache::{CacheError, CacheReport, DistanceCacheMaintainer, NodeChanges};
pub use routing::{
    AdapterLimits, AdapterLimitsError, HttpMappingService, HttpMappingServiceConfig,
    MappingAdapter, ProviderBuildError,
};
