//! Game path value types.
//!
//! A [`GamePath`] names a file relative to one of the game's root
//! directories. Package file tables key their entries by `GamePath`, so the
//! type compares, orders and hashes case-insensitively.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::Error;

/// Root directory a [`GamePath`] is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum GameDirectory {
    Config,
    Content,
}

impl GameDirectory {
    /// Decode the value stored in a package header.
    pub fn from_serialized(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Config),
            2 => Some(Self::Content),
            _ => None,
        }
    }

    /// The value stored in a package header.
    pub fn to_serialized(self) -> u16 {
        match self {
            Self::Config => 1,
            Self::Content => 2,
        }
    }

    /// URI scheme used in the textual form of a path.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Content => "content",
        }
    }
}

/// Target platform a package was cooked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Platform {
    Pc,
    Ios,
    Android,
    Linux,
}

impl Platform {
    /// All platforms, in serialized order.
    pub const ALL: [Platform; 4] = [Self::Pc, Self::Ios, Self::Android, Self::Linux];

    /// Decode the value stored in a package header.
    pub fn from_serialized(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Name used in cooked file names such as `pkgcdict_PC.dat`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pc => "PC",
            Self::Ios => "IOS",
            Self::Android => "Android",
            Self::Linux => "Linux",
        }
    }

    /// Platform of the running host.
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Pc
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Content type of a file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileType {
    Unknown,
    Animation2D,
    Csv,
    Effect,
    EffectHeader,
    Exe,
    Font,
    FxBank,
    Html,
    Json,
    PemCertificate,
    Protobuf,
    SaveGame,
    SceneAsset,
    ScenePrefab,
    Script,
    SoundBank,
    SoundProject,
    Texture0,
    Texture1,
    Texture2,
    Texture3,
    Texture4,
    Text,
    UiMovie,
    Wav,
    Xml,
    ScriptProject,
    Cs,
    Video,
}

impl FileType {
    /// Map an extension (with or without the leading `.`) to a file type.
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.strip_prefix('.').unwrap_or(extension);
        let lowered = extension.to_ascii_lowercase();
        match lowered.as_str() {
            "avi" => Self::Video,
            "bank" | "fsb" => Self::SoundBank,
            "cs" => Self::Cs,
            "csp" | "csproj" => Self::ScriptProject,
            "csv" => Self::Csv,
            "dat" => Self::SaveGame,
            "exe" => Self::Exe,
            "fbx" | "ssa" => Self::SceneAsset,
            "fcn" | "swf" => Self::UiMovie,
            "fdp" | "fev" | "fspro" => Self::SoundProject,
            "fx" | "fxc" => Self::Effect,
            "fxb" | "xfx" => Self::FxBank,
            "fxh" | "fxh_marker" => Self::EffectHeader,
            "html" => Self::Html,
            "json" => Self::Json,
            "lua" | "lbc" => Self::Script,
            "prefab" | "spf" => Self::ScenePrefab,
            "pb" | "proto" => Self::Protobuf,
            "pem" => Self::PemCertificate,
            "png" | "sif0" => Self::Texture0,
            "sif1" => Self::Texture1,
            "sif2" => Self::Texture2,
            "sif3" => Self::Texture3,
            "sif4" => Self::Texture4,
            "saf" | "son" => Self::Animation2D,
            "sff" | "ttf" => Self::Font,
            "txt" => Self::Text,
            "wav" => Self::Wav,
            "xml" => Self::Xml,
            _ => Self::Unknown,
        }
    }

    /// Extension this type carries once cooked, including the leading `.`.
    ///
    /// Empty for [`FileType::Unknown`].
    pub fn cooked_extension(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Animation2D => ".saf",
            Self::Cs => ".cs",
            Self::Csv => ".csv",
            Self::Effect => ".fxc",
            Self::EffectHeader => ".fxh_marker",
            Self::Exe => ".exe",
            Self::Font => ".sff",
            Self::FxBank => ".fxb",
            Self::Html => ".html",
            Self::Json => ".json",
            Self::PemCertificate => ".pem",
            Self::Protobuf => ".pb",
            Self::SaveGame => ".dat",
            Self::SceneAsset => ".ssa",
            Self::ScenePrefab => ".spf",
            Self::Script => ".lbc",
            Self::ScriptProject => ".csp",
            Self::SoundBank => ".bank",
            Self::SoundProject => ".fev",
            Self::Texture0 => ".sif0",
            Self::Texture1 => ".sif1",
            Self::Texture2 => ".sif2",
            Self::Texture3 => ".sif3",
            Self::Texture4 => ".sif4",
            Self::Text => ".txt",
            Self::UiMovie => ".fcn",
            Self::Video => ".avi",
            Self::Wav => ".wav",
            Self::Xml => ".xml",
        }
    }
}

/// A file path relative to a [`GameDirectory`].
///
/// Separators are normalized to `/` on construction and leading separators
/// are dropped. Equality, ordering and hashing ignore ASCII case, while the
/// original spelling is preserved for display.
///
/// # Example
///
/// ```
/// use sar_common::{FileType, GameDirectory, GamePath};
///
/// let path: GamePath = "content://UI\\Menus\\Main.JSON".parse().unwrap();
/// assert_eq!(path.directory(), GameDirectory::Content);
/// assert_eq!(path.relative(), "UI/Menus/Main.JSON");
/// assert_eq!(path.parent(), "UI/Menus");
/// assert_eq!(path.file_type(), FileType::Json);
/// assert_eq!(path, GamePath::new(GameDirectory::Content, "ui/menus/main.json"));
/// ```
#[derive(Clone)]
pub struct GamePath {
    directory: GameDirectory,
    relative: String,
}

impl GamePath {
    /// Create a path, normalizing separators.
    pub fn new(directory: GameDirectory, relative: impl AsRef<str>) -> Self {
        let relative = relative.as_ref().replace('\\', "/");
        let relative = relative.trim_start_matches('/').to_string();
        Self {
            directory,
            relative,
        }
    }

    /// The root directory.
    #[inline]
    pub fn directory(&self) -> GameDirectory {
        self.directory
    }

    /// The `/`-separated path below the root directory.
    #[inline]
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// The final path component.
    pub fn file_name(&self) -> &str {
        match memchr::memrchr(b'/', self.relative.as_bytes()) {
            Some(pos) => &self.relative[pos + 1..],
            None => &self.relative,
        }
    }

    /// Everything before the final path component, without a trailing `/`.
    pub fn parent(&self) -> &str {
        match memchr::memrchr(b'/', self.relative.as_bytes()) {
            Some(pos) => &self.relative[..pos],
            None => "",
        }
    }

    /// The extension of the final component including the leading `.`, or
    /// an empty string.
    pub fn extension(&self) -> &str {
        let name = self.file_name();
        match memchr::memrchr(b'.', name.as_bytes()) {
            Some(pos) => &name[pos..],
            None => "",
        }
    }

    /// Content type derived from the extension.
    pub fn file_type(&self) -> FileType {
        FileType::from_extension(self.extension())
    }

    /// Compare two relative paths ignoring ASCII case.
    pub fn compare_relative(a: &str, b: &str) -> Ordering {
        let a = a.bytes().map(|c| c.to_ascii_lowercase());
        let b = b.bytes().map(|c| c.to_ascii_lowercase());
        a.cmp(b)
    }
}

impl PartialEq for GamePath {
    fn eq(&self, other: &Self) -> bool {
        self.directory == other.directory && self.relative.eq_ignore_ascii_case(&other.relative)
    }
}

impl Eq for GamePath {}

impl Hash for GamePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.directory.hash(state);
        for byte in self.relative.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl Ord for GamePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.directory
            .cmp(&other.directory)
            .then_with(|| Self::compare_relative(&self.relative, &other.relative))
    }
}

impl PartialOrd for GamePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GamePath({self})")
    }
}

impl fmt::Display for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.directory.scheme(), self.relative)
    }
}

impl FromStr for GamePath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, relative) = s
            .split_once("://")
            .ok_or_else(|| Error::InvalidGamePath(format!("missing scheme in {s:?}")))?;

        let directory = if scheme.eq_ignore_ascii_case("config") {
            GameDirectory::Config
        } else if scheme.eq_ignore_ascii_case("content") {
            GameDirectory::Content
        } else {
            return Err(Error::InvalidGamePath(format!("unknown scheme {scheme:?}")));
        };

        Ok(Self::new(directory, relative))
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for GamePath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
