//! Serial device path resolution.
//!
//! The USB Gecko shows up as an ordinary tty. An explicit path (command line
//! or config file) is used as given and must exist. Otherwise the path comes
//! from the `USBGECKODEVICE` environment variable, falling back to the usual
//! path on each platform. There is no enumeration.

use crate::error::{Error, Result};
use log::{debug, trace};
use std::env;
use std::path::Path;

/// Environment variable naming the serial device.
pub const DEVICE_ENV_VAR: &str = "USBGECKODEVICE";

/// Path tried when no usable device is configured.
#[cfg(target_os = "macos")]
pub const DEFAULT_DEVICE: Option<&str> = Some("/dev/tty.usbserial-GECKUSB0");
/// Path tried when no usable device is configured.
#[cfg(all(unix, not(target_os = "macos")))]
pub const DEFAULT_DEVICE: Option<&str> = Some("/dev/ttyUSB0");
/// Path tried when no usable device is configured.
#[cfg(not(unix))]
pub const DEFAULT_DEVICE: Option<&str> = None;

/// Example value shown in the "device not found" message.
#[cfg(unix)]
pub const DEVICE_EXAMPLE: &str = "\"/dev/ttyUSB0\"";
/// Example value shown in the "device not found" message.
#[cfg(not(unix))]
pub const DEVICE_EXAMPLE: &str = "\"COM3\"";

/// Pick the device path to open.
///
/// An `explicit` path must exist; a missing one is [`Error::NoSuchDevice`].
/// Without one, `USBGECKODEVICE` is used when it names an existing path,
/// and the platform default is tried after that.
pub fn resolve_device(explicit: Option<&str>) -> Result<String> {
    let from_env = env::var(DEVICE_ENV_VAR).ok();
    resolve_with(explicit, from_env.as_deref(), DEFAULT_DEVICE)
}

fn resolve_with(
    explicit: Option<&str>,
    from_env: Option<&str>,
    default: Option<&str>,
) -> Result<String> {
    if let Some(path) = explicit {
        if !exists(path) {
            return Err(Error::NoSuchDevice {
                path: path.to_string(),
            });
        }
        debug!("Using device {path}");
        return Ok(path.to_string());
    }

    for candidate in [from_env, default]
        .into_iter()
        .flatten()
    {
        if exists(candidate) {
            debug!("Using device {candidate}");
            return Ok(candidate.to_string());
        }
        trace!("Device {candidate} does not exist");
    }

    Err(Error::DeviceNotFound {
        var: DEVICE_ENV_VAR,
        example: DEVICE_EXAMPLE,
    })
}

#[cfg(unix)]
fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

// COM ports are not filesystem entries; accept any non-empty name and let
// open report the failure.
#[cfg(not(unix))]
fn exists(path: &str) -> bool {
    !path.is_empty() && (path.to_ascii_uppercase().starts_with("COM") || Path::new(path).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_explicit_path_wins() {
        let dev = NamedTempFile::new().unwrap();
        let path = dev.path().to_str().unwrap();
        let other = NamedTempFile::new().unwrap();
        let other_path = other.path().to_str();

        let resolved = resolve_with(Some(path), other_path, other_path).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let env_dev = NamedTempFile::new().unwrap();
        let default = NamedTempFile::new().unwrap();

        let err = resolve_with(
            Some("/nonexistent/gecko0"),
            env_dev.path().to_str(),
            default.path().to_str(),
        )
        .unwrap_err();
        match &err {
            Error::NoSuchDevice { path } => assert_eq!(path, "/nonexistent/gecko0"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.to_string(), "device /nonexistent/gecko0 does not exist");
    }

    #[test]
    fn test_env_path_used_when_nothing_explicit() {
        let env_dev = NamedTempFile::new().unwrap();
        let env_path = env_dev.path().to_str().unwrap();
        let default = NamedTempFile::new().unwrap();

        let resolved = resolve_with(None, Some(env_path), default.path().to_str()).unwrap();
        assert_eq!(resolved, env_path);
    }

    #[test]
    fn test_missing_env_path_falls_back_to_default() {
        let default = NamedTempFile::new().unwrap();
        let default_path = default.path().to_str().unwrap();

        let resolved = resolve_with(None, Some("/nonexistent/gecko0"), Some(default_path)).unwrap();
        assert_eq!(resolved, default_path);
    }

    #[test]
    fn test_unset_uses_default() {
        let default = NamedTempFile::new().unwrap();
        let default_path = default.path().to_str().unwrap();

        assert_eq!(resolve_with(None, None, Some(default_path)).unwrap(), default_path);
    }

    #[test]
    fn test_nothing_usable() {
        let err =
            resolve_with(None, Some("/nonexistent/gecko0"), Some("/nonexistent/gecko1")).unwrap_err();
        assert!(matches!(
            err,
            Error::DeviceNotFound {
                var: DEVICE_ENV_VAR,
                ..
            }
        ));
        let msg = err.to_string();
        assert!(msg.contains("USBGECKODEVICE"));
        assert!(msg.contains(DEVICE_EXAMPLE));
    }

    #[test]
    fn test_no_default() {
        assert!(resolve_with(None, None, None).is_err());
    }
}
