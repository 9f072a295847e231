use crate::definition::options::{LibraryType, TargetChip};
use crate::definition::{ArtifactPatterns, SourceLayout};
use crate::{Document, Recipe};
use kdl::{KdlDocument, KdlNode};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::str::FromStr;
use thiserror::Error;
use wax::Glob;

#[derive(Debug, Diagnostic, Error)]
#[error("Failed parsing recipe document")]
pub struct KilnParserCompoundError {
    #[source_code]
    pub source_code: NamedSource,
    #[related]
    pub(crate) errors: Vec<KilnParseError>,
}

#[derive(Debug, Diagnostic, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct KilnParseError {
    /// Offset in chars of the error.
    #[label("{}", label.unwrap_or("here"))]
    pub span: SourceSpan,

    /// Label text for this span. Defaults to `"here"`.
    pub label: Option<&'static str>,

    /// Suggestion for fixing the parser error.
    #[help]
    pub help: Option<String>,

    /// Specific error kind for this parser error.
    pub kind: &'static str,
}

const EMPTY_NODES: &[KdlNode] = &[];

pub(crate) trait GetNodes {
    fn nodes(&self) -> &[KdlNode];
}

impl GetNodes for KdlNode {
    fn nodes(&self) -> &[KdlNode] {
        self.children().map_or(EMPTY_NODES, |x| x.nodes())
    }
}

pub trait ParseDocument {
    fn parse_document_strict(
        input: &KdlDocument,
        source: &str,
        filename: Option<&str>,
    ) -> miette::Result<Self>
    where
        Self: Sized,
    {
        let (data, errors) = Self::parse_document_with_errors(input);

        match data {
            Some(obj) if errors.is_empty() => Ok(obj),

            _ => Err(KilnParserCompoundError {
                source_code: NamedSource::new(
                    filename
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "[memory.kdl]".to_string()),
                    source.to_string(),
                ),
                errors,
            }
            .into()),
        }
    }

    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized;
}

pub trait ParseNode {
    fn parse_node_strict(
        input: &KdlNode,
        source: &str,
        filename: Option<&str>,
    ) -> miette::Result<Self>
    where
        Self: Sized,
    {
        let (data, errors) = Self::parse_node_with_errors(input);

        match data {
            Some(obj) if errors.is_empty() => Ok(obj),

            _ => Err(KilnParserCompoundError {
                source_code: NamedSource::new(
                    filename
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "[memory.kdl]".to_string()),
                    source.to_string(),
                ),
                errors,
            }
            .into()),
        }
    }

    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized;
}

#[macro_export]
macro_rules! parse_string_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        use $crate::definition::parsing::extract_single_string_value;

        match extract_single_string_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a string"),
            concat!("only 1 string expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n.into(),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_string_list_into {
    ($input:ident, $into:ident, $errors:expr, $name:literal) => {
        use $crate::definition::parsing::{extract_string_values, ListExtHelper};

        match extract_string_values(
            $input,
            concat!($name, " expects only string values"),
            concat!($name, " expected values, property found instead"),
        ) {
            Ok(n) => $into.add(n),
            Err(e) => $errors.push(e),
        };
    };
}

pub trait ListExtHelper<T> {
    fn add(&mut self, value: Vec<T>);
    fn set(&mut self, value: Vec<T>);
}

impl<T> ListExtHelper<T> for Vec<T> {
    fn add(&mut self, value: Vec<T>) {
        self.extend(value);
    }

    fn set(&mut self, value: Vec<T>) {
        *self = value;
    }
}

impl<T> ListExtHelper<T> for Option<Vec<T>> {
    fn add(&mut self, value: Vec<T>) {
        if let Some(data) = self {
            data.extend(value)
        } else {
            *self = Some(value)
        }
    }

    fn set(&mut self, value: Vec<T>) {
        *self = Some(value);
    }
}

impl ParseDocument for Document {
    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut recipes = vec![];
        let mut errors = vec![];

        for node in input.nodes() {
            match node.name().value() {
                "recipe" => {
                    let (recipe, err) = Recipe::parse_node_with_errors(node);
                    if let Some(recipe) = recipe {
                        recipes.push(recipe);
                    }
                    errors.extend(err);
                }

                _ => {}
            }
        }

        (Some(Document { recipes }), errors)
    }
}

impl ParseNode for Recipe {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors: Vec<KilnParseError> = vec![];

        let defaults = Recipe::default();
        let mut name: String = "<unnamed>".to_string();
        let mut found_version = false;
        let mut version: String = "0.0.0".to_string();
        let mut description: String = "".to_string();
        let mut home: Option<String> = None;
        let mut license: Vec<String> = vec![];
        let mut maintainers: Vec<String> = vec![];
        let mut toolchain: String = defaults.toolchain;
        let mut output_dir: String = defaults.output_dir;
        let mut include_dir: String = defaults.include_dir;
        let mut found_targets = false;
        let mut targets: Vec<TargetChip> = vec![];
        let mut default_library: Option<LibraryType> = None;
        let mut source: Option<SourceLayout> = None;
        let mut artifacts: Option<ArtifactPatterns> = None;

        parse_string_into!(input, name, errors, "name of recipe");
        for node in input.nodes() {
            match node.name().value() {
                "version" => {
                    found_version = true;
                    parse_string_into!(node, version, errors, "version");
                }

                "description" => {
                    parse_string_into!(node, description, errors, "description");
                }

                "home" => {
                    parse_string_into!(node, home, errors, "home");
                }

                "license" => {
                    parse_string_list_into!(node, license, errors, "license");
                }

                "maintainer" => {
                    parse_string_list_into!(node, maintainers, errors, "maintainer");
                }

                "toolchain" => {
                    parse_string_into!(node, toolchain, errors, "toolchain");
                }

                "output-dir" => {
                    parse_string_into!(node, output_dir, errors, "output-dir");
                }

                "include-dir" => {
                    parse_string_into!(node, include_dir, errors, "include-dir");
                }

                "targets" => {
                    found_targets = true;
                    match extract_spanned_strings(
                        node,
                        "targets expects only string values",
                        "targets expected values, property found instead",
                    ) {
                        Ok(values) => {
                            for (raw, span) in values {
                                match TargetChip::parse(&raw) {
                                    Some(chip) => targets.push(chip),
                                    None => errors.push(KilnParseError {
                                        span,
                                        label: Some("not a recognized chip"),
                                        help: Some(format!("supported chips are {}", chip_list())),
                                        kind: "unknown target chip",
                                    }),
                                }
                            }
                        }
                        Err(e) => errors.push(e),
                    }
                }

                "default-library" => {
                    let mut raw: Option<String> = None;
                    parse_string_into!(node, raw, errors, "default-library");

                    if let Some(raw) = raw {
                        match LibraryType::parse(&raw) {
                            Some(library) => default_library = Some(library),
                            None => errors.push(KilnParseError {
                                span: *node.entries().first().unwrap().span(),
                                label: None,
                                help: Some("expected \"static\" or \"shared\"".to_string()),
                                kind: "unknown default library type",
                            }),
                        }
                    }
                }

                "source" => {
                    let (layout, err) = SourceLayout::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(layout) = layout {
                        source = Some(layout);
                    }
                }

                "artifacts" => {
                    let (patterns, err) = ArtifactPatterns::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(patterns) = patterns {
                        artifacts = Some(patterns);
                    }
                }

                _ => {}
            }
        }

        if !found_version {
            errors.push(KilnParseError {
                span: *input.span(),
                label: None,
                help: None,
                kind: "recipe missing version",
            })
        }

        if !found_targets {
            errors.push(KilnParseError {
                span: *input.span(),
                label: None,
                help: Some(format!(
                    "add a targets node listing chips out of: {}",
                    chip_list()
                )),
                kind: "recipe missing targets",
            })
        }

        let recipe = Recipe {
            name,
            version,
            description,
            home,
            license,
            maintainers,
            toolchain,
            output_dir,
            include_dir,
            targets,
            default_library: default_library.unwrap_or(defaults.default_library),
            source: source.unwrap_or(defaults.source),
            artifacts: artifacts.unwrap_or(defaults.artifacts),
        };

        (Some(recipe), errors)
    }
}

impl ParseNode for SourceLayout {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut dirs: Option<Vec<String>> = None;
        let mut files: Option<Vec<String>> = None;

        for node in input.nodes() {
            match node.name().value() {
                "dir" => {
                    parse_string_list_into!(node, dirs, errors, "dir");
                }

                "file" => {
                    parse_string_list_into!(node, files, errors, "file");
                }

                _ => {}
            }
        }

        let defaults = SourceLayout::default();
        (
            Some(SourceLayout {
                dirs: dirs.unwrap_or(defaults.dirs),
                files: files.unwrap_or(defaults.files),
            }),
            errors,
        )
    }
}

impl ParseNode for ArtifactPatterns {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut libraries: Option<Vec<String>> = None;
        let mut headers: Option<Vec<String>> = None;

        for node in input.nodes() {
            match node.name().value() {
                "library" => match extract_spanned_strings(
                    node,
                    "library expects only string patterns",
                    "library expected values, property found instead",
                ) {
                    Ok(values) => libraries.add(checked_globs(values, &mut errors)),
                    Err(e) => errors.push(e),
                },

                "header" => match extract_spanned_strings(
                    node,
                    "header expects only string patterns",
                    "header expected values, property found instead",
                ) {
                    Ok(values) => headers.add(checked_globs(values, &mut errors)),
                    Err(e) => errors.push(e),
                },

                _ => {}
            }
        }

        let defaults = ArtifactPatterns::default();
        (
            Some(ArtifactPatterns {
                libraries: libraries.unwrap_or(defaults.libraries),
                headers: headers.unwrap_or(defaults.headers),
            }),
            errors,
        )
    }
}

fn chip_list() -> String {
    TargetChip::ALL.map(|chip| chip.name()).join(", ")
}

/// Patterns get compiled once here so a typo fails at parse time, with a span,
/// instead of deep inside collection.
fn checked_globs(
    values: Vec<(String, SourceSpan)>,
    errors: &mut Vec<KilnParseError>,
) -> Vec<String> {
    let mut patterns = vec![];

    for (pattern, span) in values {
        match Glob::from_str(pattern.as_str()) {
            Ok(_) => patterns.push(pattern),
            Err(glob_error) => errors.push(KilnParseError {
                span,
                label: Some("does not compile as a glob"),
                help: Some(format!("{}", glob_error)),
                kind: "invalid artifact pattern",
            }),
        }
    }

    patterns
}

pub(crate) fn extract_single_string_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<String, KilnParseError> {
    match input.entries().len() {
        0 => Err(KilnParseError {
            span: *input.name().span(),
            label: None,
            help: None,
            kind: missing_error,
        }),

        1 => {
            let name_entry = input.entries().first().unwrap();

            if name_entry.name().is_some() {
                return Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: property_found_error,
                });
            }

            if let Some(v) = name_entry.value().as_string() {
                Ok(v.to_string())
            } else {
                Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: wrong_type_error,
                })
            }
        }

        _ => {
            let start_args = input.entries().first().unwrap().span().offset();
            let end_args = input
                .entries()
                .last()
                .map(|x| x.span().len() + x.span().offset())
                .unwrap();

            let span = SourceSpan::new(start_args.into(), (end_args - start_args).into());
            Err(KilnParseError {
                span,
                label: None,
                help: None,
                kind: too_many_error,
            })
        }
    }
}

pub(crate) fn extract_string_values(
    input: &KdlNode,
    wrong_type_error: &'static str,
    property_found_error: &'static str,
) -> Result<Vec<String>, KilnParseError> {
    let mut values = vec![];

    for entry in input.entries() {
        if entry.name().is_some() {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: property_found_error,
            });
        }

        if let Some(v) = entry.value().as_string() {
            values.push(v.to_string());
        } else {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: wrong_type_error,
            });
        }
    }

    Ok(values)
}

pub(crate) fn extract_spanned_strings(
    input: &KdlNode,
    wrong_type_error: &'static str,
    property_found_error: &'static str,
) -> Result<Vec<(String, SourceSpan)>, KilnParseError> {
    let mut values = vec![];

    for entry in input.entries() {
        if entry.name().is_some() {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: property_found_error,
            });
        }

        if let Some(v) = entry.value().as_string() {
            values.push((v.to_string(), *entry.span()));
        } else {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: wrong_type_error,
            });
        }
    }

    Ok(values)
}
