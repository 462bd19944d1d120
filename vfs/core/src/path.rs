//! Lexical path cleaning. Nothing here touches a filesystem.

use layerfs_io::{FsError, FsErrorKind, FsResult};
use smallvec::SmallVec;

const LONG_PATH_PREFIX: &str = r"\\?\";

/// What to do with a trailing separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trailing {
    /// Always end with a separator.
    Force,
    /// End with one exactly when the input did.
    #[default]
    Keep,
    /// Never end with a separator, except for a bare root.
    Strip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathStyle {
    /// `/` only.
    #[default]
    Unix,
    /// `/` and `\` accepted, `\` emitted, `X:` drive prefixes are part of the
    /// root.
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanOptions {
    pub trailing: Trailing,
    pub style: PathStyle,
    /// Prefix absolute drive paths with `\\?\`. Windows style only.
    pub long_path_prefix: bool,
}

impl CleanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trailing(mut self, trailing: Trailing) -> Self {
        self.trailing = trailing;
        self
    }

    pub fn with_style(mut self, style: PathStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_long_path_prefix(mut self, long_path_prefix: bool) -> Self {
        self.long_path_prefix = long_path_prefix;
        self
    }

    fn separator(&self) -> char {
        match self.style {
            PathStyle::Unix => '/',
            PathStyle::Windows => '\\',
        }
    }

    fn is_separator(&self, c: char) -> bool {
        match self.style {
            PathStyle::Unix => c == '/',
            PathStyle::Windows => c == '/' || c == '\\',
        }
    }
}

/// Cleans `path`, returning a new string.
///
/// Empty and `.` segments are dropped, `..` cancels the segment before it,
/// and separators are collapsed. Going above an absolute root is
/// `InvalidPath`; a relative path that goes above its start keeps its
/// leading `..` segments. An empty relative result is `.`.
pub fn clean(path: &str, options: CleanOptions) -> FsResult<String> {
    let mut out = String::with_capacity(path.len() + LONG_PATH_PREFIX.len());
    emit(path, options, |piece| {
        out.push_str(piece);
        Ok(())
    })?;
    Ok(out)
}

/// Cleans `path` into `buf` and returns the number of bytes written.
///
/// Fails with `InvalidInput` when `buf` is too small. On any failure `buf` is
/// left zeroed.
pub fn clean_into(path: &str, options: CleanOptions, buf: &mut [u8]) -> FsResult<usize> {
    let mut written = 0;
    let result = emit(path, options, |piece| {
        let end = written + piece.len();
        let Some(dest) = buf.get_mut(written..end) else {
            return Err(FsError::new(FsErrorKind::InvalidInput, "path.clean_into.capacity"));
        };
        dest.copy_from_slice(piece.as_bytes());
        written = end;
        Ok(())
    });
    match result {
        Ok(()) => Ok(written),
        Err(err) => {
            buf.fill(0);
            Err(err)
        }
    }
}

/// Cleans `path` as an absolute `/`-separated path. Relative input is taken
/// relative to the root; anything that climbs above the root is
/// `InvalidPath`.
pub fn rooted(path: &str) -> FsResult<String> {
    let options = CleanOptions::new().with_trailing(Trailing::Strip);
    let cleaned = clean(path, options)?;
    if cleaned.starts_with('/') {
        Ok(cleaned)
    } else if cleaned == "." {
        Ok("/".to_owned())
    } else if cleaned == ".." || cleaned.starts_with("../") {
        Err(FsError::new(FsErrorKind::InvalidPath, "path.rooted"))
    } else {
        Ok(format!("/{cleaned}"))
    }
}

/// Iterates the real segments of a `/`-separated path, skipping empty and
/// `.` segments. `..` is returned as is.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty() && *s != ".")
}

/// Whether `path` ends with a separator.
pub fn has_trailing_separator(path: &str) -> bool {
    path.ends_with('/') || path.ends_with('\\')
}

/// Feeds the cleaned form of `path` to `sink` piece by piece.
fn emit(
    path: &str,
    options: CleanOptions,
    mut sink: impl FnMut(&str) -> FsResult<()>,
) -> FsResult<()> {
    let windows = options.style == PathStyle::Windows;
    let mut rest = path;
    let mut drive = None;
    if windows {
        rest = rest.strip_prefix(LONG_PATH_PREFIX).unwrap_or(rest);
        let bytes = rest.as_bytes();
        if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            drive = Some(&rest[..2]);
            rest = &rest[2..];
        }
    }

    let absolute = rest.starts_with(|c| options.is_separator(c));
    let trailing_in = rest.len() > 1 && rest.ends_with(|c| options.is_separator(c));

    let mut parts: SmallVec<[&str; 16]> = SmallVec::new();
    for segment in rest.split(|c| options.is_separator(c)) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(last) if *last != "..") {
                    parts.pop();
                } else if absolute {
                    return Err(FsError::new(FsErrorKind::InvalidPath, "path.clean.escape"));
                } else {
                    parts.push("..");
                }
            }
            real => parts.push(real),
        }
    }

    let mut sep_buf = [0u8; 4];
    let sep = &*options.separator().encode_utf8(&mut sep_buf);

    if let Some(drive) = drive {
        if absolute && options.long_path_prefix {
            sink(LONG_PATH_PREFIX)?;
        }
        sink(drive)?;
    }
    if absolute {
        sink(sep)?;
    } else if parts.is_empty() && drive.is_none() {
        sink(".")?;
    }

    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            sink(sep)?;
        }
        sink(part)?;
    }

    let trailing = match options.trailing {
        Trailing::Force => true,
        Trailing::Keep => trailing_in,
        Trailing::Strip => false,
    };
    // A bare root already ends with its separator.
    if trailing && !(absolute && parts.is_empty()) {
        sink(sep)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn unix(path: &str) -> String {
        clean(path, CleanOptions::new()).unwrap()
    }

    fn windows() -> CleanOptions {
        CleanOptions::new().with_style(PathStyle::Windows)
    }

    #[test]
    fn drops_dots_and_collapses_separators() {
        assert_eq!(unix("a/./b/../c"), unix("a/c"));
        assert_eq!(unix("a/c"), "a/c");
        assert_eq!(unix("//usr///lib/./x"), "/usr/lib/x");
        assert_eq!(unix("/a/b/../../c"), "/c");
        assert_eq!(unix("/"), "/");
        assert_eq!(unix("////"), "/");
    }

    #[test]
    fn empty_relative_result_is_dot() {
        assert_eq!(unix(""), ".");
        assert_eq!(unix("."), ".");
        assert_eq!(unix("a/.."), ".");
        assert_eq!(unix("./"), "./");
    }

    #[test]
    fn escaping_an_absolute_root_fails() {
        let err = clean("/..", CleanOptions::new()).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::InvalidPath);
        assert!(clean("/a/../../b", CleanOptions::new()).is_err());
    }

    #[test]
    fn relative_paths_keep_leading_parent_segments() {
        assert_eq!(unix(".."), "..");
        assert_eq!(unix("../../a"), "../../a");
        assert_eq!(unix("a/../../b"), "../b");
        assert_eq!(unix("../a/../.."), "../..");
    }

    #[test]
    fn trailing_separator_policies() {
        let force = CleanOptions::new().with_trailing(Trailing::Force);
        let strip = CleanOptions::new().with_trailing(Trailing::Strip);

        assert_eq!(unix("a/b/"), "a/b/");
        assert_eq!(unix("a/b"), "a/b");
        assert_eq!(clean("a/b", force).unwrap(), "a/b/");
        assert_eq!(clean("a/b/", strip).unwrap(), "a/b");
        assert_eq!(clean("/", strip).unwrap(), "/");
        assert_eq!(clean("/", force).unwrap(), "/");
        assert_eq!(clean("", force).unwrap(), "./");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let inputs = [
            "", ".", "./", "..", "/", "a//b", "/a/./b/", "../x/../../y", "a/b/../../..",
            "x/./y/./", "/usr/../bin/.//sh", "a/./.", "./a/.", "/./.", "./.", "a/.", "../.",
        ];
        for trailing in [Trailing::Force, Trailing::Keep, Trailing::Strip] {
            let options = CleanOptions::new().with_trailing(trailing);
            for input in inputs {
                let once = clean(input, options).unwrap();
                let twice = clean(&once, options).unwrap();
                assert_eq!(once, twice, "input {input:?} with {trailing:?}");
                assert!(!once.contains("//"));
                if once == "." || once == "./" {
                    continue;
                }
                let parts: Vec<&str> = once.split('/').filter(|s| !s.is_empty()).collect();
                assert!(!parts.contains(&"."), "{once:?} from {input:?}");
                // `..` survives only as the leading run of a relative path.
                let leading = match once.starts_with('/') {
                    true => 0,
                    false => parts.iter().take_while(|s| **s == "..").count(),
                };
                assert!(!parts[leading..].contains(&".."), "{once:?} from {input:?}");
            }
        }
    }

    #[test]
    fn windows_style_drives_and_backslashes() {
        assert_eq!(clean(r"C:\a\.\b\..\c", windows()).unwrap(), r"C:\a\c");
        assert_eq!(clean("C:/a//b/", windows()).unwrap(), r"C:\a\b\");
        assert_eq!(clean(r"a\b/c", windows()).unwrap(), r"a\b\c");
        assert_eq!(
            clean(r"C:\..", windows()).unwrap_err().kind(),
            FsErrorKind::InvalidPath
        );
    }

    #[test]
    fn windows_long_path_prefix() {
        let options = windows().with_long_path_prefix(true);
        assert_eq!(clean(r"D:\games\data", options).unwrap(), r"\\?\D:\games\data");
        assert_eq!(clean(r"\\?\D:\games\data", options).unwrap(), r"\\?\D:\games\data");
        assert_eq!(clean(r"\\?\D:\games", windows()).unwrap(), r"D:\games");
        assert_eq!(clean(r"games\data", options).unwrap(), r"games\data");
    }

    #[test]
    fn clean_into_writes_in_place() {
        let mut buf = [0xaau8; 32];
        let len = clean_into("/a/./b//c/..", CleanOptions::new(), &mut buf).unwrap();
        assert_eq!(&buf[..len], b"/a/b");
    }

    #[test]
    fn clean_into_leaves_no_partial_output() {
        let mut buf = [0xaau8; 4];
        let err = clean_into("/abc/def", CleanOptions::new(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::InvalidInput);
        assert_eq!(buf, [0; 4]);

        let mut buf = [0xaau8; 16];
        assert!(clean_into("/../x", CleanOptions::new(), &mut buf).is_err());
        assert_eq!(buf, [0; 16]);
    }

    #[test]
    fn rooted_paths() {
        assert_eq!(rooted("").unwrap(), "/");
        assert_eq!(rooted("a/b/").unwrap(), "/a/b");
        assert_eq!(rooted("/a/../b").unwrap(), "/b");
        assert_eq!(rooted("../a").unwrap_err().kind(), FsErrorKind::InvalidPath);
    }

    #[test]
    fn segment_iteration() {
        let parts: Vec<_> = segments("/data//textures/./ui/").collect();
        assert_eq!(parts, ["data", "textures", "ui"]);
        assert_eq!(segments("/").count(), 0);
    }
}
