use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use ab_glyph::{FontArc, FontVec};
use fontdb::{Database, Family, Query};
use tracing::{debug, info, warn};

use crate::annotation::FontWeight;

/// Families offered even when the system database is empty.
pub const GENERIC_FAMILIES: &[&str] = &["sans-serif", "serif", "monospace", "cursive"];

pub struct FontBook {
    db: Database,
    cache: HashMap<(String, FontWeight), Option<FontArc>>,
}

impl FontBook {
    pub fn empty() -> Self {
        Self {
            db: Database::new(),
            cache: HashMap::new(),
        }
    }

    /// Scans system fonts plus `extra_dirs`. Slow on machines with many fonts.
    pub fn load(extra_dirs: &[PathBuf]) -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        for dir in extra_dirs {
            if dir.is_dir() {
                db.load_fonts_dir(dir);
            } else {
                warn!(dir = %dir.display(), "font directory does not exist");
            }
        }
        info!(faces = db.len(), "font database loaded");
        Self {
            db,
            cache: HashMap::new(),
        }
    }

    pub fn face_count(&self) -> usize {
        self.db.len()
    }

    /// Generic families first, then every installed family name.
    pub fn family_names(&self) -> Vec<String> {
        let installed: BTreeSet<String> = self
            .db
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .collect();
        GENERIC_FAMILIES
            .iter()
            .map(|name| name.to_string())
            .chain(installed)
            .collect()
    }

    /// Falls back to sans-serif, then to any face at all.
    pub fn resolve(&mut self, family: &str, weight: FontWeight) -> Option<FontArc> {
        let key = (family.to_string(), weight);
        if let Some(cached) = self.cache.get(&key) {
            return cached.clone();
        }

        let resolved = self
            .query(family, weight)
            .or_else(|| self.query("sans-serif", weight))
            .or_else(|| self.query("sans-serif", FontWeight::Normal))
            .or_else(|| self.db.faces().next().map(|face| face.id))
            .and_then(|id| self.face_to_font(id));

        if resolved.is_none() {
            warn!(family, ?weight, "no usable font face");
        }
        self.cache.insert(key, resolved.clone());
        resolved
    }

    fn query(&self, family: &str, weight: FontWeight) -> Option<fontdb::ID> {
        let families = [generic_family(family)];
        self.db.query(&Query {
            families: &families,
            weight: weight.to_fontdb(),
            ..Query::default()
        })
    }

    fn face_to_font(&self, id: fontdb::ID) -> Option<FontArc> {
        self.db
            .with_face_data(id, |data, index| {
                FontVec::try_from_vec_and_index(data.to_vec(), index)
            })
            .and_then(|parsed| match parsed {
                Ok(font) => {
                    debug!(?id, "font face parsed");
                    Some(FontArc::new(font))
                }
                Err(err) => {
                    warn!(?id, "cannot parse font face: {err}");
                    None
                }
            })
    }
}

fn generic_family(name: &str) -> Family<'_> {
    match name.trim().to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" => Family::SansSerif,
        "serif" => Family::Serif,
        "monospace" | "mono" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        _ => Family::Name(name),
    }
}

/// Fonts load once per process on a worker thread; rendering waits until they are ready.
pub enum FontGate {
    Loading(Receiver<FontBook>),
    Ready(FontBook),
}

impl FontGate {
    pub fn spawn(extra_dirs: Vec<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let book = FontBook::load(&extra_dirs);
            let _ = tx.send(book);
        });
        Self::Loading(rx)
    }

    pub fn poll(&mut self) -> Option<&mut FontBook> {
        if let Self::Loading(rx) = self {
            match rx.try_recv() {
                Ok(book) => *self = Self::Ready(book),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    warn!("font loader exited without a database, continuing without fonts");
                    *self = Self::Ready(FontBook::empty());
                }
            }
        }
        match self {
            Self::Ready(book) => Some(book),
            Self::Loading(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::{generic_family, FontBook, FontGate, GENERIC_FAMILIES};
    use crate::annotation::FontWeight;

    #[test]
    fn generic_names_map_to_fontdb_generics() {
        assert_eq!(generic_family("Sans-Serif"), fontdb::Family::SansSerif);
        assert_eq!(generic_family("monospace"), fontdb::Family::Monospace);
        assert_eq!(generic_family("Noto Sans TC"), fontdb::Family::Name("Noto Sans TC"));
    }

    #[test]
    fn empty_book_resolves_nothing_but_lists_generics() {
        let mut book = FontBook::empty();
        assert!(book.resolve("serif", FontWeight::Bold).is_none());
        assert_eq!(book.family_names().len(), GENERIC_FAMILIES.len());
    }

    #[test]
    fn gate_opens_when_the_worker_delivers() {
        let (tx, rx) = mpsc::channel();
        let mut gate = FontGate::Loading(rx);
        assert!(gate.poll().is_none());

        tx.send(FontBook::empty()).expect("send font book");
        assert!(gate.poll().is_some());
        assert!(gate.is_ready());
    }

    #[test]
    fn gate_opens_empty_when_the_worker_dies() {
        let (tx, rx) = mpsc::channel::<FontBook>();
        drop(tx);
        let mut gate = FontGate::Loading(rx);
        assert_eq!(gate.poll().map(|book| book.face_count()), Some(0));
    }
}
