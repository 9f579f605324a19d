use std::path::Path;
use std::str::FromStr;

/// Extension fallback for files whose magic bytes say nothing (mostly text)
const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("svg", "image/svg+xml"),
];

/// Extensions the toolkit's "images" filter lets through
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["avi", "mp4", "wmv", "mpg", "mpeg", "mov", "mkv", "flv", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "mid", "ogg", "flac", "aac", "m4a"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Failure of a `length_hint` check. Carries a message only when the caller asked for one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthError {
    pub min: usize,
    pub max: usize,
    pub message: Option<String>,
}

impl std::fmt::Display for LengthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => write!(f, "length out of range {}..={}", self.min, self.max),
        }
    }
}

impl std::error::Error for LengthError {}

/// Builds a check that fails when the character count of a value is below `min` or above `max`.
///
/// The second argument of the returned closure is the "emit message" flag.
pub fn length_hint(min: usize, max: usize) -> impl Fn(&str, bool) -> Result<(), LengthError> {
    move |value: &str, emit_message: bool| {
        let count = value.chars().count();
        if count < min || count > max {
            return Err(LengthError {
                min,
                max,
                message: emit_message
                    .then(|| format!("length must be between {} - {}", min, max)),
            });
        }
        Ok(())
    }
}

/// Accepted file category, mirroring the picker's `accept` option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Images,
    Video,
    Audio,
}

impl FromStr for FileKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" | "" => Ok(FileKind::File),
            "images" => Ok(FileKind::Images),
            "video" => Ok(FileKind::Video),
            "audio" => Ok(FileKind::Audio),
            other => Err(ValidationError {
                code: "UNKNOWN_FILE_KIND",
                message: format!("'{}' is not one of file, images, video, audio", other),
            }),
        }
    }
}

impl FileKind {
    /// Checks a file against this kind and an optional `|`-separated extension list.
    ///
    /// An explicit extension list replaces the kind's built-in extension set.
    pub fn accepts(&self, name: &str, exts: Option<&str>) -> Result<(), ValidationError> {
        let ext = extension_of(name);

        let allowed: Vec<String> = match exts {
            Some(list) if !list.trim().is_empty() => list
                .split('|')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            _ => match self {
                FileKind::File => return Ok(()),
                FileKind::Images => IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                FileKind::Video => VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
                FileKind::Audio => AUDIO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            },
        };

        match ext {
            Some(ext) if allowed.contains(&ext) => Ok(()),
            _ => Err(ValidationError {
                code: "REJECTED_FILE_TYPE",
                message: format!("'{}' is not an accepted file type", name),
            }),
        }
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// File-name component of a local path
pub fn display_name(path: &Path) -> Result<String, ValidationError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(|n| n.to_string())
        .ok_or_else(|| ValidationError {
            code: "INVALID_FILENAME",
            message: format!("'{}' has no usable file name", path.display()),
        })
}

/// Content type from magic bytes, then extension, then `application/octet-stream`
pub fn detect_content_type(name: &str, header: &[u8]) -> String {
    if let Some(kind) = infer::get(header) {
        return kind.mime_type().to_string();
    }

    if let Some(ext) = extension_of(name) {
        if let Some((_, mime)) = EXTENSION_TYPES.iter().find(|(e, _)| *e == ext) {
            return mime.to_string();
        }
    }

    mime::APPLICATION_OCTET_STREAM.to_string()
}
