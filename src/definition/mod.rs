pub mod options;
pub mod parsing;

use crate::definition::options::{LibraryType, TargetChip};

#[derive(Default, Debug, Clone)]
pub struct Document {
    pub recipes: Vec<Recipe>,
}

impl Document {
    /// Recipe lookup for the CLI: by name when one was given, otherwise the
    /// first recipe in the document.
    pub fn find_recipe(&self, name: Option<&str>) -> Option<&Recipe> {
        match name {
            Some(name) => self.recipes.iter().find(|recipe| recipe.name == name),
            None => self.recipes.first(),
        }
    }
}

/// One package declaration out of a recipe file. Defaults follow the layout
/// the toolchain itself produces: `zig build` writing into `zig-out`, public
/// headers kept under `inc`.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub description: String,
    pub home: Option<String>,
    pub license: Vec<String>,
    pub maintainers: Vec<String>,
    pub toolchain: String,
    pub output_dir: String,
    pub include_dir: String,
    pub targets: Vec<TargetChip>,
    pub default_library: LibraryType,
    pub source: SourceLayout,
    pub artifacts: ArtifactPatterns,
}

impl Default for Recipe {
    fn default() -> Self {
        Recipe {
            name: String::new(),
            version: String::new(),
            description: String::new(),
            home: None,
            license: Vec::new(),
            maintainers: Vec::new(),
            toolchain: "zig".to_string(),
            output_dir: "zig-out".to_string(),
            include_dir: "inc".to_string(),
            targets: Vec::new(),
            default_library: LibraryType::Shared,
            source: SourceLayout::default(),
            artifacts: ArtifactPatterns::default(),
        }
    }
}

/// What gets staged into the build tree: whole directories plus the loose
/// descriptor files the toolchain expects at the tree root.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

impl Default for SourceLayout {
    fn default() -> Self {
        SourceLayout {
            dirs: vec!["build".to_string(), "src".to_string(), "inc".to_string()],
            files: vec!["build.zig".to_string(), "build.zig.zon".to_string()],
        }
    }
}

/// Glob patterns selecting what leaves the build: libraries out of the
/// toolchain output dir, headers out of the declared include tree.
#[derive(Debug, Clone)]
pub struct ArtifactPatterns {
    pub libraries: Vec<String>,
    pub headers: Vec<String>,
}

impl Default for ArtifactPatterns {
    fn default() -> Self {
        ArtifactPatterns {
            libraries: vec!["*.a".to_string(), "*.so".to_string()],
            headers: vec!["*.h".to_string()],
        }
    }
}

impl Recipe {
    pub fn supports(&self, target: TargetChip) -> bool {
        self.targets.contains(&target)
    }
}
