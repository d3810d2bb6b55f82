//! Protocol version table.

/// First protocol number with the configuration state (24w era, 1.20.2).
pub const CONFIGURATION_INTRODUCED: i32 = 764;

/// Protocol versions with an embedded schema document.
pub const SUPPORTED_VERSIONS: &[i32] = &[763, 765];

/// Newest protocol version this crate ships a schema for.
pub const LATEST_VERSION: i32 = 765;

/// Default server port.
pub const DEFAULT_PORT: u16 = 25565;

/// Whether a protocol version routes login through the configuration state.
pub fn supports_configuration(version: i32) -> bool {
    version >= CONFIGURATION_INTRODUCED
}

/// Whether this crate ships a schema for `version`.
pub fn is_supported(version: i32) -> bool {
    SUPPORTED_VERSIONS.contains(&version)
}

/// Display name for a supported protocol version.
pub fn game_version(version: i32) -> Option<&'static str> {
    match version {
        763 => Some("1.20.1"),
        765 => Some("1.20.4"),
        _ => None,
    }
}
