//! Protocol path parsing and version negotiation.
//!
//! Streams and discovery advertisements are addressed by paths of the form
//! `/<protocol>`, `/<protocol>/<version>`, `/<protocol>/<appID>` and
//! `/<protocol>/<appID>/<version>`. A segment is treated as a version iff
//! it parses as semver; anything else is an application identifier. An
//! unversioned path routes to the numerically highest supported version.

use semver::Version;

/// The protocol name used as the leading path segment.
pub const PROTOCOL_NAME: &str = "peerwire";

/// Protocol versions this implementation supports, lowest first.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.1.0"];

/// Returns the supported versions as parsed semver values.
pub fn supported_versions() -> Vec<Version> {
    SUPPORTED_VERSIONS
        .iter()
        .map(|v| Version::parse(v).expect("supported version table is valid semver"))
        .collect()
}

/// Returns the numerically highest supported version.
pub fn highest_supported() -> Version {
    supported_versions()
        .into_iter()
        .max()
        .expect("supported version table is non-empty")
}

/// Picks the highest version present in both `advertised` and the local
/// supported set, or `None` when no version satisfies both sides.
pub fn negotiate(advertised: &[Version]) -> Option<Version> {
    let supported = supported_versions();
    advertised
        .iter()
        .filter(|v| supported.contains(v))
        .max()
        .cloned()
}

/// A parsed protocol path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolPath {
    /// `/<protocol>`: bare protocol advertisement.
    Base,
    /// `/<protocol>/<version>`: versioned protocol advertisement.
    Versioned(Version),
    /// `/<protocol>/<appID>`: unversioned application endpoint.
    App {
        /// The application identifier.
        app_id: String,
    },
    /// `/<protocol>/<appID>/<version>`: versioned application endpoint.
    AppVersioned {
        /// The application identifier.
        app_id: String,
        /// The requested protocol version.
        version: Version,
    },
}

impl ProtocolPath {
    /// Parses a path string. Returns `None` for paths that do not belong
    /// to this protocol.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.strip_prefix('/')?.split('/');
        if segments.next()? != PROTOCOL_NAME {
            return None;
        }

        let second = match segments.next() {
            None => return Some(ProtocolPath::Base),
            Some(s) if s.is_empty() => return None,
            Some(s) => s,
        };

        let third = match segments.next() {
            None => {
                return Some(match Version::parse(second) {
                    Ok(version) => ProtocolPath::Versioned(version),
                    Err(_) => ProtocolPath::App {
                        app_id: second.to_string(),
                    },
                })
            }
            Some(s) => s,
        };

        // More than three segments is not a protocol path.
        if segments.next().is_some() {
            return None;
        }

        let version = Version::parse(third).ok()?;
        Some(ProtocolPath::AppVersioned {
            app_id: second.to_string(),
            version,
        })
    }

    /// The version this path requests: the explicit version if present,
    /// otherwise the highest locally supported version.
    pub fn requested_version(&self) -> Version {
        match self {
            ProtocolPath::Versioned(v) | ProtocolPath::AppVersioned { version: v, .. } => {
                v.clone()
            }
            ProtocolPath::Base | ProtocolPath::App { .. } => highest_supported(),
        }
    }

    /// The application identifier, if this path addresses one.
    pub fn app_id(&self) -> Option<&str> {
        match self {
            ProtocolPath::App { app_id } | ProtocolPath::AppVersioned { app_id, .. } => {
                Some(app_id)
            }
            _ => None,
        }
    }
}

/// Builds the path set a server registers (and advertises) for an
/// application identifier: the unversioned endpoint plus one per
/// supported version.
pub fn app_routes(app_id: &str) -> Vec<String> {
    let mut routes = vec![format!("/{}/{}", PROTOCOL_NAME, app_id)];
    for version in SUPPORTED_VERSIONS {
        routes.push(format!("/{}/{}/{}", PROTOCOL_NAME, app_id, version));
    }
    routes
}

/// Builds the base advertisement path set: `/<protocol>` plus one
/// versioned entry per supported version.
pub fn base_routes() -> Vec<String> {
    let mut routes = vec![format!("/{}", PROTOCOL_NAME)];
    for version in SUPPORTED_VERSIONS {
        routes.push(format!("/{}/{}", PROTOCOL_NAME, version));
    }
    routes
}
