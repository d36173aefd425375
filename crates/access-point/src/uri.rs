use crate::error::{Error, Result};

use std::fmt;
use std::str::FromStr;

use oms_messaging::KeyValue;
use oms_messaging::keys;

/// Fixed scheme marker of the access point grammar.
pub const SCHEME: &str = "oms";

const LEGACY_SCHEME: &str = "openmessaging";

/// A parsed access point URI.
///
/// Grammar: `oms:<driver>://[<account>@]<host>[:<port>](,<host>[:<port>])*/<region>:<namespace>`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccessPointDescriptor {
    account_id: Option<String>,
    driver_type: String,
    hosts: Vec<String>,
    namespace: String,
    region: String,
}

impl AccessPointDescriptor {
    /// Parses an access point URI.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedAccessPointUri`] when the scheme, driver, host
    /// list, region or namespace cannot be isolated.
    pub fn parse(uri: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::malformed(uri, reason);

        let rest = match uri.strip_prefix(SCHEME).and_then(|r| r.strip_prefix(':')) {
            Some(rest) => rest,
            None if uri.starts_with(LEGACY_SCHEME) => {
                return Err(malformed("legacy `openmessaging:` scheme is not supported"));
            }
            None => return Err(malformed("expected `oms:` scheme")),
        };

        let (driver_type, rest) = rest
            .split_once(':')
            .ok_or_else(|| malformed("missing driver type"))?;
        if driver_type.is_empty() {
            return Err(malformed("empty driver type"));
        }

        let rest = rest
            .strip_prefix("//")
            .ok_or_else(|| malformed("expected `://` after driver type"))?;

        let (authority, path) = rest
            .rsplit_once('/')
            .ok_or_else(|| malformed("missing `/<region>:<namespace>` segment"))?;

        let (account_id, host_list) = match authority.rsplit_once('@') {
            Some(("", _)) => return Err(malformed("empty account id")),
            Some((account, hosts)) => (Some(account.to_string()), hosts),
            None => (None, authority),
        };

        if host_list.is_empty() {
            return Err(malformed("empty host list"));
        }

        let hosts = host_list
            .split(',')
            .map(|host| {
                validate_host(host)
                    .map(|()| host.to_string())
                    .map_err(|reason| malformed(&reason))
            })
            .collect::<Result<Vec<_>>>()?;

        let (region, namespace) = path
            .split_once(':')
            .ok_or_else(|| malformed("missing `:` between region and namespace"))?;
        if region.is_empty() {
            return Err(malformed("empty region"));
        }
        if namespace.is_empty() {
            return Err(malformed("empty namespace"));
        }

        Ok(Self {
            account_id,
            driver_type: driver_type.to_string(),
            hosts,
            namespace: namespace.to_string(),
            region: region.to_string(),
        })
    }

    /// The account id, if the URI carried one.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// The driver type token.
    #[must_use]
    pub fn driver_type(&self) -> &str {
        &self.driver_type
    }

    /// `host[:port]` entries in URI order.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The region.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// The descriptor's fields under their well-known property keys.
    #[must_use]
    pub fn to_properties(&self) -> KeyValue {
        let mut properties = KeyValue::new()
            .with(keys::DRIVER, self.driver_type.as_str())
            .with(keys::ACCESS_POINTS, self.hosts.join(","))
            .with(keys::REGION, self.region.as_str())
            .with(keys::NAMESPACE, self.namespace.as_str());

        if let Some(account_id) = &self.account_id {
            properties.put(keys::ACCOUNT_ID, account_id.as_str());
        }

        properties
    }
}

fn validate_host(host: &str) -> std::result::Result<(), String> {
    if host.is_empty() {
        return Err("empty host entry".to_string());
    }
    if host.contains(|c: char| c == '/' || c == '@' || c.is_whitespace()) {
        return Err(format!("invalid host `{host}`"));
    }

    match host.rsplit_once(':') {
        Some(("", _)) => Err(format!("missing host name in `{host}`")),
        Some((_, port)) => port
            .parse::<u16>()
            .map(|_| ())
            .map_err(|_| format!("invalid port in `{host}`")),
        None => Ok(()),
    }
}

impl fmt::Display for AccessPointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}:{}://", self.driver_type)?;
        if let Some(account_id) = &self.account_id {
            write!(f, "{account_id}@")?;
        }
        write!(
            f,
            "{}/{}:{}",
            self.hosts.join(","),
            self.region,
            self.namespace
        )
    }
}

impl FromStr for AccessPointDescriptor {
    type Err = Error;

    fn from_str(uri: &str) -> Result<Self> {
        Self::parse(uri)
    }
}
