//! Resolution of job locations into something the engine can open.

use std::ffi::OsStr;
use std::fmt;
use std::path::PathBuf;

use super::error::EncodeError;

/// A resolved input or output location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocation {
    /// A path on the local filesystem.
    Local(PathBuf),
    /// An `http(s)://` URI read directly by the engine.
    Remote(String),
}

fn strip_scheme<'a>(location: &'a str, scheme: &str) -> Option<&'a str> {
    let prefix = location.get(..scheme.len())?;
    if prefix.eq_ignore_ascii_case(scheme) {
        Some(&location[scheme.len()..])
    } else {
        None
    }
}

impl MediaLocation {
    /// Parses a local path, `file://` URI, or `http(s)://` URI.
    pub fn parse(location: &str) -> Result<Self, EncodeError> {
        if location.trim().is_empty() {
            return Err(EncodeError::unsupported_location(location));
        }

        if let Some(rest) = strip_scheme(location, "file://") {
            let rest = strip_scheme(rest, "localhost").unwrap_or(rest);
            if !rest.starts_with('/') {
                return Err(EncodeError::unsupported_location(location));
            }
            let decoded = urlencoding::decode(rest)
                .map_err(|_| EncodeError::unsupported_location(location))?;
            return Ok(Self::Local(PathBuf::from(decoded.into_owned())));
        }

        if strip_scheme(location, "http://").is_some()
            || strip_scheme(location, "https://").is_some()
        {
            return Ok(Self::Remote(location.to_string()));
        }

        if let Some(idx) = location.find("://") {
            let scheme = &location[..idx];
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
            {
                return Err(EncodeError::unsupported_location(location));
            }
        }

        Ok(Self::Local(PathBuf::from(location)))
    }

    /// Parses an output location, which must name a local file.
    pub fn parse_output(location: &str) -> Result<PathBuf, EncodeError> {
        match Self::parse(location)? {
            Self::Local(path) if path.file_name().is_some() => Ok(path),
            _ => Err(EncodeError::unsupported_location(location)),
        }
    }

    /// The argument handed to ffmpeg/ffprobe for this location.
    pub fn engine_arg(&self) -> &OsStr {
        match self {
            Self::Local(path) => path.as_os_str(),
            Self::Remote(uri) => OsStr::new(uri),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(uri) => f.write_str(uri),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path() {
        assert_eq!(
            MediaLocation::parse("/media/in/clip.mov").unwrap(),
            MediaLocation::Local(PathBuf::from("/media/in/clip.mov"))
        );
        assert_eq!(
            MediaLocation::parse("relative/clip.mov").unwrap(),
            MediaLocation::Local(PathBuf::from("relative/clip.mov"))
        );
    }

    #[test]
    fn test_file_uri_is_decoded() {
        assert_eq!(
            MediaLocation::parse("file:///media/in/my%20clip.mov").unwrap(),
            MediaLocation::Local(PathBuf::from("/media/in/my clip.mov"))
        );
        assert_eq!(
            MediaLocation::parse("FILE://localhost/media/a.mov").unwrap(),
            MediaLocation::Local(PathBuf::from("/media/a.mov"))
        );
        assert!(MediaLocation::parse("file://server/share/a.mov").is_err());
    }

    #[test]
    fn test_http_is_remote() {
        let location = MediaLocation::parse("https://cdn.example.com/a.mov?sig=1").unwrap();
        assert!(location.is_remote());
        assert_eq!(location.engine_arg(), OsStr::new("https://cdn.example.com/a.mov?sig=1"));
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let err = MediaLocation::parse("s3://bucket/a.mov").unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedLocation { .. }));
        assert!(MediaLocation::parse("   ").is_err());
    }

    #[test]
    fn test_output_must_be_local_file() {
        assert_eq!(
            MediaLocation::parse_output("file:///out/a.mp4").unwrap(),
            PathBuf::from("/out/a.mp4")
        );
        assert!(MediaLocation::parse_output("https://cdn.example.com/a.mp4").is_err());
        assert!(MediaLocation::parse_output("/").is_err());
    }
}
