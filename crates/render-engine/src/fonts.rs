//! Font lookup for text draw operations.
//!
//! Family names are resolved against the system font database (indexed
//! once per process through cosmic-text). Generic names (`serif`,
//! `sans-serif`, `monospace`, ...) map to the usual installed families,
//! a value that looks like a path is loaded from disk, and anything that
//! does not resolve falls back to the default face.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use ab_glyph::{FontArc, FontVec};
use cosmic_text::fontdb::{Database, Query, ID};
use cosmic_text::{Family, FontSystem};
use reelcraft_common::error::{ReelError, ReelResult};

static SYSTEM_FONTS: OnceLock<Database> = OnceLock::new();

/// The process-wide system font index.
pub fn system_fonts() -> &'static Database {
    SYSTEM_FONTS.get_or_init(|| {
        let db = FontSystem::new().db().clone();
        tracing::debug!(faces = db.len(), "System fonts indexed");
        db
    })
}

/// Whether any system font is installed.
pub fn system_fonts_available() -> bool {
    !system_fonts().is_empty()
}

const SANS_FALLBACKS: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Noto Sans",
    "Arial",
    "Helvetica",
];
const SERIF_FALLBACKS: &[&str] = &[
    "DejaVu Serif",
    "Liberation Serif",
    "Noto Serif",
    "Times New Roman",
];
const MONO_FALLBACKS: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Courier New",
];

/// CSS-style generic family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericFamily {
    SansSerif,
    Serif,
    Monospace,
    Cursive,
    Fantasy,
}

impl GenericFamily {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sans-serif" | "sans" | "system-ui" => Some(Self::SansSerif),
            "serif" => Some(Self::Serif),
            "monospace" | "mono" => Some(Self::Monospace),
            "cursive" => Some(Self::Cursive),
            "fantasy" => Some(Self::Fantasy),
            _ => None,
        }
    }

    fn family(self) -> Family<'static> {
        match self {
            Self::SansSerif => Family::SansSerif,
            Self::Serif => Family::Serif,
            Self::Monospace => Family::Monospace,
            Self::Cursive => Family::Cursive,
            Self::Fantasy => Family::Fantasy,
        }
    }

    fn fallbacks(self) -> &'static [&'static str] {
        match self {
            Self::Serif => SERIF_FALLBACKS,
            Self::Monospace => MONO_FALLBACKS,
            _ => SANS_FALLBACKS,
        }
    }
}

/// Resolves family names to loaded faces and caches the result.
pub struct FontBook {
    default_face: Option<FontArc>,
    use_system: bool,
    faces: Mutex<HashMap<String, Option<FontArc>>>,
}

impl FontBook {
    /// Faces come from the installed system fonts.
    pub fn system() -> Self {
        Self {
            default_face: None,
            use_system: true,
            faces: Mutex::new(HashMap::new()),
        }
    }

    /// No faces at all; every text op is skipped.
    pub fn empty() -> Self {
        Self {
            default_face: None,
            use_system: false,
            faces: Mutex::new(HashMap::new()),
        }
    }

    /// Use `face` for unnamed and `sans-serif` text instead of the system
    /// sans-serif face.
    pub fn with_default_face(mut self, face: FontArc) -> Self {
        self.default_face = Some(face);
        self.faces
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self
    }

    /// Number of cached lookups.
    pub fn cached(&self) -> usize {
        self.faces.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The face for `family`, or the default face when it does not resolve.
    pub fn resolve(&self, family: Option<&str>) -> Option<FontArc> {
        let key = family.map(str::trim).unwrap_or_default().to_string();
        let mut faces = self.faces.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(face) = faces.get(&key) {
            return face.clone();
        }
        let face = self.lookup(&key);
        if face.is_none() {
            tracing::debug!(family = %key, "No font face available");
        }
        faces.insert(key, face.clone());
        face
    }

    fn lookup(&self, family: &str) -> Option<FontArc> {
        if family.is_empty() {
            return self.default_or_sans();
        }
        if looks_like_path(family) {
            match load_font_file(Path::new(family)) {
                Ok(face) => return Some(face),
                Err(err) => tracing::warn!(error = %err, "Font file not loaded"),
            }
            return self.default_or_sans();
        }
        match GenericFamily::parse(family) {
            Some(GenericFamily::SansSerif) => self.default_or_sans(),
            Some(generic) => self
                .system_generic(generic)
                .or_else(|| self.default_or_sans()),
            None => self
                .system_query(Family::Name(family))
                .or_else(|| self.default_or_sans()),
        }
    }

    fn default_or_sans(&self) -> Option<FontArc> {
        self.default_face
            .clone()
            .or_else(|| self.system_generic(GenericFamily::SansSerif))
            .or_else(|| self.system_any())
    }

    fn system_generic(&self, generic: GenericFamily) -> Option<FontArc> {
        self.system_query(generic.family()).or_else(|| {
            generic
                .fallbacks()
                .iter()
                .find_map(|name| self.system_query(Family::Name(*name)))
        })
    }

    fn system_query(&self, family: Family<'_>) -> Option<FontArc> {
        if !self.use_system {
            return None;
        }
        let db = system_fonts();
        let families = [family];
        let id = db.query(&Query {
            families: &families,
            ..Query::default()
        })?;
        face_from_db(db, id)
    }

    fn system_any(&self) -> Option<FontArc> {
        if !self.use_system {
            return None;
        }
        let db = system_fonts();
        db.faces().find_map(|face| face_from_db(db, face.id))
    }
}

impl Default for FontBook {
    fn default() -> Self {
        Self::system()
    }
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontBook")
            .field("default_face", &self.default_face.is_some())
            .field("use_system", &self.use_system)
            .field("cached", &self.cached())
            .finish()
    }
}

fn face_from_db(db: &Database, id: ID) -> Option<FontArc> {
    db.with_face_data(id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index).ok()
    })
    .flatten()
    .map(FontArc::new)
}

fn looks_like_path(family: &str) -> bool {
    family.contains('/')
        || family.contains('\\')
        || [".ttf", ".otf", ".ttc"]
            .iter()
            .any(|ext| family.to_ascii_lowercase().ends_with(ext))
}

/// Load a TTF/OTF font from disk.
pub fn load_font_file(path: &Path) -> ReelResult<FontArc> {
    let bytes = std::fs::read(path).map_err(|e| ReelError::Config {
        message: format!("Cannot read font {}: {e}", path.display()),
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| ReelError::Config {
        message: format!("Invalid font {}: {e}", path.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_names() {
        assert_eq!(GenericFamily::parse("Sans-Serif"), Some(GenericFamily::SansSerif));
        assert_eq!(GenericFamily::parse(" serif "), Some(GenericFamily::Serif));
        assert_eq!(GenericFamily::parse("mono"), Some(GenericFamily::Monospace));
        assert_eq!(GenericFamily::parse("Georgia"), None);
    }

    #[test]
    fn test_path_detection() {
        assert!(looks_like_path("/usr/share/fonts/a.ttf"));
        assert!(looks_like_path("Brand.OTF"));
        assert!(!looks_like_path("DejaVu Sans"));
    }

    #[test]
    fn test_empty_book_resolves_nothing() {
        let book = FontBook::empty();
        assert!(book.resolve(None).is_none());
        assert!(book.resolve(Some("serif")).is_none());
        assert_eq!(book.cached(), 2);
    }

    #[test]
    fn test_missing_font_file_is_a_config_error() {
        let err = load_font_file(Path::new("/nonexistent/reelcraft.ttf")).unwrap_err();
        assert!(matches!(err, ReelError::Config { .. }));
    }

    #[test]
    fn test_system_families_fall_back_to_a_face() {
        if !system_fonts_available() {
            eprintln!("no system fonts installed; skipping");
            return;
        }
        let book = FontBook::system();
        assert!(book.resolve(None).is_some());
        assert!(book.resolve(Some("sans-serif")).is_some());
        assert!(book.resolve(Some("serif")).is_some());
        assert!(book.resolve(Some("No Such Family 4711")).is_some());
        // Repeated lookups hit the cache.
        book.resolve(Some("serif"));
        assert_eq!(book.cached(), 4);
    }
}
