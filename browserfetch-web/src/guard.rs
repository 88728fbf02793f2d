//! SSRF guard: scheme allow-list, hostname resolution and address-range
//! classification.
//!
//! One [`SsrfGuard::check`] is called before the precheck, again before
//! navigation when the precheck followed redirects, and once more after
//! navigation for the settled URL and every observed hop. A host is allowed
//! only when *every* address it resolves to is public.
//!
//! DNS rebinding between this check and the browser's own connection is not
//! closed here.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use browserfetch_common::{AddressClass, FetchError, Result};
use tokio::net::lookup_host;
use url::{Host, Url};

/// Schemes the guard lets through by default.
pub const DEFAULT_SCHEMES: &[&str] = &["http", "https"];

/// Hostname resolution seam. Tests swap in [`StaticResolver`].
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Every address `host` resolves to, across both families.
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<IpAddr>> {
        let addrs = lookup_host((host, port)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Fixed host table. Unknown hosts fail to resolve.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, host: &str, ips: &[&str]) -> Self {
        let parsed = ips.iter().filter_map(|ip| ip.parse().ok()).collect();
        self.entries.insert(host.to_ascii_lowercase(), parsed);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> std::io::Result<Vec<IpAddr>> {
        self.entries
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unknown host"))
    }
}

/// Outcome of inspecting a URL at one validation point. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub original_url: String,
    pub scheme: String,
    pub hostname: String,
    pub resolved_ip_addresses: BTreeSet<IpAddr>,
    pub is_redirect_hop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Ok,
    BadScheme,
    PrivateIp,
    ReservedIp,
    ResolutionFailed,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecisionReason::Ok => "ok",
            DecisionReason::BadScheme => "bad_scheme",
            DecisionReason::PrivateIp => "private_ip",
            DecisionReason::ReservedIp => "reserved_ip",
            DecisionReason::ResolutionFailed => "resolution_failed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SsrfDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl SsrfDecision {
    const fn deny(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// Pure decision over a resolved target and a scheme allow-list.
    /// A private address wins over a reserved one when a host has both.
    pub fn evaluate(target: &ResolvedTarget, schemes: &[&str]) -> Self {
        if !schemes.contains(&target.scheme.as_str()) {
            return Self::deny(DecisionReason::BadScheme);
        }
        if target.resolved_ip_addresses.is_empty() {
            return Self::deny(DecisionReason::ResolutionFailed);
        }
        let classes: Vec<AddressClass> = target
            .resolved_ip_addresses
            .iter()
            .filter_map(|ip| classify_ip(*ip))
            .collect();
        if classes.contains(&AddressClass::Private) {
            Self::deny(DecisionReason::PrivateIp)
        } else if classes.contains(&AddressClass::Reserved) {
            Self::deny(DecisionReason::ReservedIp)
        } else {
            Self {
                allowed: true,
                reason: DecisionReason::Ok,
            }
        }
    }
}

/// Classify one address against the block-list; `None` means public.
/// IPv6 forms that carry an IPv4 address are judged as that address.
pub fn classify_ip(ip: IpAddr) -> Option<AddressClass> {
    match ip {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => match embedded_v4(v6) {
            Some(v4) => classify_v4(v4),
            None => classify_v6(v6),
        },
    }
}

/// IPv4 address inside a mapped (`::ffff:a.b.c.d`), NAT64 (`64:ff9b::/96`)
/// or deprecated compatible (`::a.b.c.d`) IPv6 address.
fn embedded_v4(addr: Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return Some(v4);
    }
    let [a, b, c, d, e, f, _, _] = addr.segments();
    let tail = || {
        let octets = addr.octets();
        Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15])
    };
    if a == 0x64 && b == 0xff9b && [c, d, e, f] == [0; 4] {
        return Some(tail());
    }
    // `::` and `::1` keep their IPv6 meaning.
    if [a, b, c, d, e, f] == [0; 6] && addr != Ipv6Addr::UNSPECIFIED && addr != Ipv6Addr::LOCALHOST {
        return Some(tail());
    }
    None
}

fn in_v4(addr: Ipv4Addr, net: [u8; 4], prefix: u32) -> bool {
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    (u32::from(addr) & mask) == (u32::from(Ipv4Addr::from(net)) & mask)
}

fn in_v6(addr: Ipv6Addr, net: Ipv6Addr, prefix: u32) -> bool {
    let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
    (u128::from(addr) & mask) == (u128::from(net) & mask)
}

const PRIVATE_V4: &[([u8; 4], u32)] = &[
    ([10, 0, 0, 0], 8),
    ([172, 16, 0, 0], 12),
    ([192, 168, 0, 0], 16),
    ([127, 0, 0, 0], 8),
    ([169, 254, 0, 0], 16),
];

const RESERVED_V4: &[([u8; 4], u32)] = &[
    ([0, 0, 0, 0], 8),
    ([100, 64, 0, 0], 10),
    ([192, 0, 0, 0], 24),
    ([192, 0, 2, 0], 24),
    ([198, 18, 0, 0], 15),
    ([198, 51, 100, 0], 24),
    ([203, 0, 113, 0], 24),
    ([224, 0, 0, 0], 4),
    ([240, 0, 0, 0], 4),
];

fn classify_v4(addr: Ipv4Addr) -> Option<AddressClass> {
    if PRIVATE_V4.iter().any(|(net, p)| in_v4(addr, *net, *p)) {
        Some(AddressClass::Private)
    } else if RESERVED_V4.iter().any(|(net, p)| in_v4(addr, *net, *p)) {
        Some(AddressClass::Reserved)
    } else {
        None
    }
}

fn classify_v6(addr: Ipv6Addr) -> Option<AddressClass> {
    let private = addr == Ipv6Addr::LOCALHOST
        || in_v6(addr, Ipv6Addr::new(0xfc00, 0, 0, 0, 0, 0, 0, 0), 7)
        || in_v6(addr, Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 0), 10);
    let reserved = addr == Ipv6Addr::UNSPECIFIED
        || in_v6(addr, Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0), 8)
        || in_v6(addr, Ipv6Addr::new(0x2001, 0x0db8, 0, 0, 0, 0, 0, 0), 32);
    if private {
        Some(AddressClass::Private)
    } else if reserved {
        Some(AddressClass::Reserved)
    } else {
        None
    }
}

/// Parse a user-supplied URL; anything without a host is rejected.
pub fn parse_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.host().is_none() {
        return Err(FetchError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

#[derive(Clone)]
pub struct SsrfGuard {
    resolver: Arc<dyn Resolver>,
    schemes: Vec<&'static str>,
}

impl fmt::Debug for SsrfGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SsrfGuard")
            .field("schemes", &self.schemes)
            .finish_non_exhaustive()
    }
}

impl SsrfGuard {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            schemes: DEFAULT_SCHEMES.to_vec(),
        }
    }

    /// Guard that resolves through the operating system.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver))
    }

    /// Build the target for `url`. IP-literal hosts skip DNS; a disallowed
    /// scheme skips it too. A failed lookup yields an empty address set.
    pub async fn inspect(&self, url: &Url, is_redirect_hop: bool) -> ResolvedTarget {
        let scheme = url.scheme().to_ascii_lowercase();
        let hostname = url.host_str().unwrap_or_default().to_string();
        let mut resolved = BTreeSet::new();

        if self.schemes.contains(&scheme.as_str()) {
            match url.host() {
                Some(Host::Ipv4(ip)) => {
                    resolved.insert(IpAddr::V4(ip));
                }
                Some(Host::Ipv6(ip)) => {
                    resolved.insert(IpAddr::V6(ip));
                }
                Some(Host::Domain(domain)) => {
                    let port = url.port_or_known_default().unwrap_or(443);
                    match self.resolver.resolve(domain, port).await {
                        Ok(ips) => resolved.extend(ips),
                        Err(err) => tracing::debug!(
                            host = %domain,
                            error = %err,
                            "guard.resolve_failed"
                        ),
                    }
                }
                None => {}
            }
        }

        ResolvedTarget {
            original_url: url.to_string(),
            scheme,
            hostname,
            resolved_ip_addresses: resolved,
            is_redirect_hop,
        }
    }

    pub async fn validate(&self, url: &Url) -> SsrfDecision {
        let target = self.inspect(url, false).await;
        SsrfDecision::evaluate(&target, &self.schemes)
    }

    /// Validate `url` and turn a denial into the matching [`FetchError`].
    pub async fn check(&self, url: &Url, is_redirect_hop: bool) -> Result<ResolvedTarget> {
        let target = self.inspect(url, is_redirect_hop).await;
        let decision = SsrfDecision::evaluate(&target, &self.schemes);
        if decision.allowed {
            return Ok(target);
        }

        tracing::warn!(
            host = %target.hostname,
            reason = %decision.reason,
            redirect_hop = is_redirect_hop,
            addresses = target.resolved_ip_addresses.len(),
            "guard.rejected"
        );

        let host = target.hostname.clone();
        Err(match decision.reason {
            DecisionReason::BadScheme => FetchError::InvalidUrl(format!(
                "unsupported scheme '{}'; only http and https are allowed",
                target.scheme
            )),
            DecisionReason::ResolutionFailed => FetchError::ResolutionFailed { host },
            DecisionReason::ReservedIp => FetchError::SsrfRejected {
                host,
                class: AddressClass::Reserved,
            },
            DecisionReason::PrivateIp | DecisionReason::Ok => FetchError::SsrfRejected {
                host,
                class: AddressClass::Private,
            },
        })
    }
}
