use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::core::game::{Game, GameContext, GameSettings};
use crate::error::{panic_message, LoadError};

/// Builds a game instance from the shared collaborators.
pub type GameFactory = Arc<dyn Fn(GameContext) -> anyhow::Result<Box<dyn Game>> + Send + Sync>;

/// A built-in game type - the "recipe" a registry entry is instantiated from
#[derive(Clone)]
pub struct GameKind {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    factory: GameFactory,
}

impl GameKind {
    pub fn new<F>(id: &'static str, name: &'static str, description: &'static str, factory: F) -> Self
    where
        F: Fn(GameContext) -> anyhow::Result<Box<dyn Game>> + Send + Sync + 'static,
    {
        Self {
            id,
            name,
            description,
            factory: Arc::new(factory),
        }
    }
}

impl std::fmt::Debug for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameKind").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Every game type compiled into the binary.
#[derive(Clone, Debug, Default)]
pub struct GameCatalog {
    kinds: Vec<GameKind>,
}

impl GameCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: GameKind) {
        self.kinds.push(kind);
    }

    pub fn find(&self, id: &str) -> Option<&GameKind> {
        self.kinds.iter().find(|k| k.id.eq_ignore_ascii_case(id))
    }

    pub fn kinds(&self) -> &[GameKind] {
        &self.kinds
    }
}

/// Metadata about a loaded game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    /// Manifest the entry came from, `None` for built-in registration.
    pub manifest: Option<PathBuf>,
}

/// On-disk game manifest, `<games dir>/<id>.toml`.
#[derive(Debug, Deserialize)]
struct GameManifest {
    kind: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    settings: GameSettings,
}

struct Candidate {
    descriptor: GameDescriptor,
    factory: GameFactory,
    settings: GameSettings,
}

struct Entry {
    descriptor: GameDescriptor,
    factory: GameFactory,
    context: GameContext,
    /// `None` while a session owns the instance (or after it was dropped).
    instance: Option<Box<dyn Game>>,
}

/// Outcome of one `load_all` pass.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub errors: Vec<LoadError>,
}

/// Identifier → live game instance.
pub struct GameRegistry {
    catalog: GameCatalog,
    context: GameContext,
    manifest_dir: Option<PathBuf>,
    entries: HashMap<String, Entry>,
    load_count: usize,
}

/// Identifiers are compared lowercased and trimmed.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_lowercase()
}

impl GameRegistry {
    pub fn new(catalog: GameCatalog, context: GameContext) -> Self {
        Self {
            catalog,
            context,
            manifest_dir: None,
            entries: HashMap::new(),
            load_count: 0,
        }
    }

    /// Discover games from manifests in `dir` instead of the bare catalog.
    pub fn with_manifest_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.manifest_dir = dir;
        self
    }

    /// Scan, construct one instance per game and replace the whole mapping.
    ///
    /// A broken entry is logged and skipped; it never aborts the scan.
    pub fn load_all(&mut self) -> LoadReport {
        self.load_count += 1;
        let mut report = LoadReport::default();
        let mut entries = HashMap::new();

        for candidate in self.discover() {
            let built = candidate.and_then(|c| {
                let context = self.context.with_settings(c.settings);
                let instance = instantiate(&c.factory, context.clone(), &c.descriptor.id)?;
                Ok(Entry {
                    descriptor: c.descriptor,
                    factory: c.factory,
                    context,
                    instance: Some(instance),
                })
            });

            match built {
                Ok(entry) => {
                    let id = entry.descriptor.id.clone();
                    debug!(game = %id, kind = %entry.descriptor.kind, "loaded game");
                    if entries.insert(id.clone(), entry).is_some() {
                        debug!(game = %id, "identifier collision, later entry wins");
                    }
                }
                Err(e) => {
                    warn!(subject = %e.subject(), error = %e, "skipping game");
                    report.errors.push(e);
                }
            }
        }

        self.entries = entries;
        report.loaded = self.ids();
        info!(loaded = ?report.loaded, failed = report.errors.len(), "game scan finished");
        report
    }

    pub fn has(&self, id: &str) -> bool {
        self.entries.contains_key(&normalize_id(id))
    }

    /// The idle instance for `id`. Never constructs.
    pub fn get(&self, id: &str) -> Option<&dyn Game> {
        self.entries
            .get(&normalize_id(id))
            .and_then(|e| e.instance.as_deref())
    }

    /// Hand the instance over to a session, building a fresh one when the
    /// previous session already consumed it.
    pub fn checkout(&mut self, id: &str) -> Result<Box<dyn Game>, LoadError> {
        let id = normalize_id(id);
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| LoadError::NotFound(id.clone()))?;
        match entry.instance.take() {
            Some(instance) => Ok(instance),
            None => instantiate(&entry.factory, entry.context.clone(), &id),
        }
    }

    pub fn descriptor(&self, id: &str) -> Option<&GameDescriptor> {
        self.entries.get(&normalize_id(id)).map(|e| &e.descriptor)
    }

    /// Sorted by identifier.
    pub fn descriptors(&self) -> Vec<GameDescriptor> {
        let mut list: Vec<_> = self.entries.values().map(|e| e.descriptor.clone()).collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn load_count(&self) -> usize {
        self.load_count
    }

    fn discover(&self) -> Vec<Result<Candidate, LoadError>> {
        match &self.manifest_dir {
            None => self
                .catalog
                .kinds()
                .iter()
                .map(|kind| Ok(builtin_candidate(kind)))
                .collect(),
            Some(dir) => self.discover_manifests(dir),
        }
    }

    fn discover_manifests(&self, dir: &Path) -> Vec<Result<Candidate, LoadError>> {
        let listing = match std::fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(source) => {
                return vec![Err(LoadError::Io {
                    path: dir.to_path_buf(),
                    source,
                })]
            }
        };

        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
            })
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        paths.iter().map(|path| self.read_manifest(path)).collect()
    }

    fn read_manifest(&self, path: &Path) -> Result<Candidate, LoadError> {
        let id = path
            .file_stem()
            .map(|s| normalize_id(&s.to_string_lossy()))
            .unwrap_or_default();
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: GameManifest = toml::from_str(&text).map_err(|source| LoadError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;
        let kind = self
            .catalog
            .find(&manifest.kind)
            .ok_or_else(|| LoadError::UnknownKind {
                id: id.clone(),
                kind: manifest.kind.clone(),
            })?;

        Ok(Candidate {
            descriptor: GameDescriptor {
                id,
                name: manifest.name.unwrap_or_else(|| kind.name.to_string()),
                description: manifest
                    .description
                    .unwrap_or_else(|| kind.description.to_string()),
                kind: kind.id.to_string(),
                manifest: Some(path.to_path_buf()),
            },
            factory: kind.factory.clone(),
            settings: manifest.settings,
        })
    }
}

fn builtin_candidate(kind: &GameKind) -> Candidate {
    Candidate {
        descriptor: GameDescriptor {
            id: normalize_id(kind.id),
            name: kind.name.to_string(),
            description: kind.description.to_string(),
            kind: kind.id.to_string(),
            manifest: None,
        },
        factory: kind.factory.clone(),
        settings: GameSettings::new(),
    }
}

fn instantiate(factory: &GameFactory, context: GameContext, id: &str) -> Result<Box<dyn Game>, LoadError> {
    match catch_unwind(AssertUnwindSafe(|| factory(context))) {
        Ok(Ok(game)) => Ok(game),
        Ok(Err(source)) => Err(LoadError::Construct {
            id: id.to_string(),
            source,
        }),
        Err(payload) => Err(LoadError::Panicked {
            id: id.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{stub_catalog, stub_kind, test_context, Probe};

    fn write(dir: &Path, file: &str, body: &str) {
        std::fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn builtin_mode_registers_every_kind() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let mut registry = GameRegistry::new(stub_catalog(&["colors", "pairing"], &probe), ctx);

        let report = registry.load_all();
        assert_eq!(report.loaded, vec!["colors".to_string(), "pairing".to_string()]);
        assert!(report.errors.is_empty());
        assert!(registry.has("colors"));
        assert!(registry.has("COLORS"));
        assert!(registry.get("pairing").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(probe.constructed("colors"), 1);
    }

    #[test]
    fn get_never_constructs() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let registry = GameRegistry::new(stub_catalog(&["colors"], &probe), ctx);
        assert!(registry.get("colors").is_none());
        assert!(!registry.has("colors"));
        assert_eq!(probe.constructed("colors"), 0);
    }

    #[test]
    fn failing_constructors_are_isolated() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let mut catalog = stub_catalog(&["colors"], &probe);
        catalog.register(GameKind::new("broken", "Broken", "", |_| {
            Err(anyhow::anyhow!("missing asset"))
        }));
        catalog.register(GameKind::new("explodes", "Explodes", "", |_| panic!("boom")));
        let mut registry = GameRegistry::new(catalog, ctx);

        let report = registry.load_all();
        assert_eq!(report.loaded, vec!["colors".to_string()]);
        assert_eq!(report.errors.len(), 2);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, LoadError::Construct { id, .. } if id == "broken")));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, LoadError::Panicked { id, message } if id == "explodes" && message == "boom")));
    }

    #[test]
    fn manifests_define_identifiers_from_file_names() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Cores.toml", "kind = \"colors\"\nname = \"Jogo das Cores\"\n");
        write(dir.path(), "arrastar.toml", "kind = \"pairing\"\n[settings]\nlevels = 2\n");
        write(dir.path(), "notes.txt", "kind = \"colors\"\n");

        let mut registry = GameRegistry::new(stub_catalog(&["colors", "pairing"], &probe), ctx)
            .with_manifest_dir(Some(dir.path().to_path_buf()));
        let report = registry.load_all();

        assert_eq!(report.loaded, vec!["arrastar".to_string(), "cores".to_string()]);
        let cores = registry.descriptor("cores").unwrap();
        assert_eq!(cores.name, "Jogo das Cores");
        assert_eq!(cores.kind, "colors");
        assert_eq!(registry.descriptor("arrastar").unwrap().name, "pairing game");
        assert!(!registry.has("colors"));
    }

    #[test]
    fn bad_manifests_are_skipped() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.toml", "kind = ");
        write(dir.path(), "b.toml", "kind = \"chess\"\n");
        write(dir.path(), "c.toml", "kind = \"colors\"\n");

        let mut registry = GameRegistry::new(stub_catalog(&["colors"], &probe), ctx)
            .with_manifest_dir(Some(dir.path().to_path_buf()));
        let report = registry.load_all();

        assert_eq!(report.loaded, vec!["c".to_string()]);
        assert!(matches!(report.errors[0], LoadError::Manifest { .. }));
        assert!(matches!(&report.errors[1], LoadError::UnknownKind { kind, .. } if kind == "chess"));
    }

    #[test]
    fn identifier_collision_last_loaded_wins() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let dir = tempfile::tempdir().unwrap();
        // "GAME.toml" sorts before "game.toml"
        write(dir.path(), "GAME.toml", "kind = \"colors\"\n");
        write(dir.path(), "game.toml", "kind = \"pairing\"\n");

        let mut registry = GameRegistry::new(stub_catalog(&["colors", "pairing"], &probe), ctx)
            .with_manifest_dir(Some(dir.path().to_path_buf()));
        let report = registry.load_all();

        assert_eq!(report.loaded, vec!["game".to_string()]);
        assert_eq!(registry.descriptor("game").unwrap().kind, "pairing");
    }

    #[test]
    fn missing_manifest_dir_loads_nothing() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let mut registry = GameRegistry::new(stub_catalog(&["colors"], &probe), ctx)
            .with_manifest_dir(Some(PathBuf::from("/definitely/not/here")));
        let report = registry.load_all();
        assert!(report.loaded.is_empty());
        assert!(matches!(report.errors[0], LoadError::Io { .. }));
    }

    #[test]
    fn reload_replaces_instances() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let mut registry = GameRegistry::new(stub_catalog(&["colors"], &probe), ctx);
        registry.load_all();
        registry.load_all();
        assert_eq!(probe.constructed("colors"), 2);
        assert_eq!(registry.load_count(), 2);
    }

    #[test]
    fn checkout_moves_then_rebuilds() {
        let probe = Probe::default();
        let (ctx, _, _) = test_context();
        let mut catalog = GameCatalog::new();
        catalog.register(stub_kind("colors", &probe));
        let mut registry = GameRegistry::new(catalog, ctx);
        registry.load_all();

        let first = registry.checkout("colors").unwrap();
        assert!(registry.get("colors").is_none());
        assert!(registry.has("colors"));
        drop(first);

        let _second = registry.checkout("colors").unwrap();
        assert_eq!(probe.constructed("colors"), 2);
        assert!(matches!(registry.checkout("nope"), Err(LoadError::NotFound(id)) if id == "nope"));
    }
}
