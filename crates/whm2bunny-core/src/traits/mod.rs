//! Core traits for the provisioning daemon
//!
//! - [`ProviderApi`]: the DNS + CDN provider surface the pipeline and
//!   scheduler drive
//! - [`ChatTransport`]: the outbound chat channel the notifier writes to

pub mod provider;
pub mod transport;

pub use provider::{
    Certificate, DnsRecord, NewDnsRecord, NewPullZone, ProviderApi, PullZone, RecordKind,
    TrafficStats, Zone,
};
pub use transport::ChatTransport;
