use crate::definition::options::BuildOptions;
use crate::definition::parsing::{KilnParserCompoundError, ParseDocument};
use crate::definition::{Document, Recipe};
use crate::engine::packager::FolderLayout;
use crate::engine::{Engine, EngineSettings};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use kdl::KdlDocument;
use miette::NamedSource;
use std::path::{Path, PathBuf};

mod definition;
mod engine;
mod utils;

#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Builds firmware library recipes into package folders")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build one configuration of a recipe and collect the result
    Build {
        /// Recipe document to build from
        #[arg(default_value = "package.kdl")]
        recipe: PathBuf,

        /// Which recipe to build when the document declares several
        #[arg(long)]
        name: Option<String>,

        /// Target chip, e.g. STM32F103
        #[arg(long)]
        target: Option<String>,

        /// Library type, static or shared
        #[arg(long)]
        library: Option<String>,

        /// Optimization level: Debug, ReleaseFast, ReleaseSafe or ReleaseSmall
        #[arg(long)]
        optimize: Option<String>,

        /// Source tree root, defaults to the recipe document's directory
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Where build trees get created
        #[arg(long, default_value = ".kiln/build")]
        build_root: PathBuf,

        /// Where finished packages get placed
        #[arg(long, default_value = ".kiln/pkg")]
        package_root: PathBuf,
    },

    /// Print what a recipe document declares, after defaulting
    Show {
        /// Recipe document to inspect
        #[arg(default_value = "package.kdl")]
        recipe: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            recipe,
            name,
            target,
            library,
            optimize,
            source_dir,
            build_root,
            package_root,
        } => {
            let document = load_document(&recipe)?;
            let selected = match document.find_recipe(name.as_deref()) {
                Some(selected) => selected,
                None => match name {
                    Some(name) => bail!("no recipe named `{}` in {}", name, recipe.display()),
                    None => bail!("{} declares no recipes", recipe.display()),
                },
            };

            let options = BuildOptions::from_cli(
                target.as_deref(),
                library.as_deref(),
                optimize.as_deref(),
            )?;

            let source_root = source_dir
                .or_else(|| parent_dir(&recipe))
                .unwrap_or_else(|| PathBuf::from("."));
            let settings = EngineSettings::new(source_root, build_root, package_root);

            let engine = Engine::from_settings::<FolderLayout>(settings);
            let package = engine.build_package(selected, options).await?;

            println!("link against: {}", package.libraries.join(", "));
            println!("include dirs: {}", package.include_dirs.join(", "));
        }

        Commands::Show { recipe } => {
            let document = load_document(&recipe)?;
            if document.recipes.is_empty() {
                bail!("{} declares no recipes", recipe.display());
            }

            for entry in &document.recipes {
                show_recipe(entry);
            }
        }
    }

    Ok(())
}

fn load_document(path: &Path) -> anyhow::Result<Document> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("could not read recipe document {}", path.display()))?;

    let kdl_document: KdlDocument = match source.parse() {
        Ok(kdl_document) => kdl_document,
        Err(kdl_error) => {
            let error = miette::Error::new(kdl_error);
            println!("{:?}", error);
            bail!("failed parsing {}", path.display());
        }
    };

    let (document, errors) = Document::parse_document_with_errors(&kdl_document);

    if !errors.is_empty() {
        let error = miette::Error::new(KilnParserCompoundError {
            source_code: NamedSource::new(path.display().to_string(), source),
            errors,
        });

        println!("{:?}", error);
        bail!("failed parsing {}", path.display());
    }

    match document {
        Some(document) => Ok(document),
        None => bail!("failed parsing {}", path.display()),
    }
}

/// The directory part of a bare file name like `package.kdl` is the empty
/// string, which is not a usable root.
fn parent_dir(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        None
    } else {
        Some(parent.to_path_buf())
    }
}

fn show_recipe(recipe: &Recipe) {
    println!("{} {}", recipe.name, recipe.version);
    if !recipe.description.is_empty() {
        println!("  {}", recipe.description);
    }
    if let Some(home) = &recipe.home {
        println!("  home: {}", home);
    }
    if !recipe.license.is_empty() {
        println!("  license: {}", recipe.license.join(" "));
    }
    if !recipe.maintainers.is_empty() {
        println!("  maintainers: {}", recipe.maintainers.join(", "));
    }

    println!("  toolchain: {} (output in {})", recipe.toolchain, recipe.output_dir);
    let targets: Vec<&str> = recipe.targets.iter().map(|chip| chip.name()).collect();
    println!("  targets: {}", targets.join(", "));
    println!("  default library: {}", recipe.default_library);
    println!(
        "  sources: {} and {}",
        recipe.source.dirs.join(", "),
        recipe.source.files.join(", ")
    );
    println!(
        "  artifacts: {} from {}, {} from {}",
        recipe.artifacts.libraries.join(", "),
        recipe.output_dir,
        recipe.artifacts.headers.join(", "),
        recipe.include_dir
    );
}
