//! Per-schema inclusion/exclusion filters.
//!
//! Object specifiers from the configuration (`routine`, `package.routine`,
//! `schema.routine`, `schema.package.routine`) are normalized into
//! schema-scoped [`Fqdn`]s, and rendered into the SQL fragments the
//! introspection query interpolates.
//!
//! An allow-list is exclusive: once a schema names any `include_routines`,
//! its exclude lists produce no fragments at all.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::config::SchemaSettings;
use crate::introspection::{Appendix, AppendixKey, RowError, RowPatch};

/// Unquoted identifier accepted in a specifier segment.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*$").unwrap());

/// Errors raised while compiling a schema's filters.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("schema {schema}: malformed object specifier '{specifier}': {reason}")]
    MalformedSpecifier {
        schema: String,
        specifier: String,
        reason: String,
    },

    #[error("schema {schema}: invalid package name '{package}'")]
    InvalidPackage { schema: String, package: String },

    #[error("invalid schema name '{0}'")]
    InvalidSchemaName(String),

    #[error("schema {schema}: invalid appendix entry {key}: {source}")]
    InvalidAppendix {
        schema: String,
        key: AppendixKey,
        #[source]
        source: RowError,
    },
}

pub type FilterResult<T> = Result<T, FilterError>;

// ============================================================================
// FQDN
// ============================================================================

/// Fully-qualified routine name: schema, package (may be empty), routine.
///
/// All parts are upper-cased on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fqdn {
    pub schema: String,
    pub package: String,
    pub routine: String,
}

impl Fqdn {
    pub fn new(
        schema: impl AsRef<str>,
        package: impl AsRef<str>,
        routine: impl AsRef<str>,
    ) -> Self {
        Self {
            schema: schema.as_ref().to_uppercase(),
            package: package.as_ref().to_uppercase(),
            routine: routine.as_ref().to_uppercase(),
        }
    }

    /// Whether the routine lives inside a package.
    pub fn has_package(&self) -> bool {
        !self.package.is_empty()
    }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.schema, &self.package, &self.routine]
            .into_iter()
            .map(String::as_str)
            .filter(|part| !part.is_empty())
            .collect();
        f.write_str(&parts.join("."))
    }
}

impl Serialize for Fqdn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalize a dotted object specifier into an [`Fqdn`] scoped to `schema`.
///
/// ```text
/// routine                  -> SCHEMA..ROUTINE
/// package.routine          -> SCHEMA.PACKAGE.ROUTINE
/// schema.routine           -> SCHEMA..ROUTINE
/// schema.package.routine   -> SCHEMA.PACKAGE.ROUTINE
/// schema..routine          -> SCHEMA..ROUTINE
/// ```
pub fn normalize(schema: &str, specifier: &str) -> FilterResult<Fqdn> {
    let malformed = |reason: &str| FilterError::MalformedSpecifier {
        schema: schema.to_string(),
        specifier: specifier.to_string(),
        reason: reason.to_string(),
    };

    if specifier.trim().is_empty() {
        return Err(malformed("empty specifier"));
    }

    let mut segments: Vec<&str> = specifier.split('.').collect();
    if segments.len() > 3 {
        return Err(malformed("more than 3 dotted segments"));
    }

    if segments.len() == 1 || !segments[0].eq_ignore_ascii_case(schema) {
        segments.insert(0, schema);
    }
    if segments.len() == 2 {
        segments.insert(1, "");
    }
    if segments.len() != 3 {
        return Err(malformed("does not resolve to schema.package.routine"));
    }

    let (owner, package, routine) = (segments[0], segments[1], segments[2]);
    if routine.is_empty() {
        return Err(malformed("missing routine name"));
    }
    for segment in [owner, package, routine] {
        if !segment.is_empty() && !IDENTIFIER.is_match(segment) {
            return Err(malformed(&format!("'{}' is not a valid identifier", segment)));
        }
    }

    Ok(Fqdn::new(owner, package, routine))
}

/// Quote a value as a single-quoted SQL literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn join_literals<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(quote_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Compiled schema filter
// ============================================================================

/// Ready-to-interpolate `in (...)` lists. An empty string means "no clause".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterFragments {
    /// Package names of allow-listed packaged routines.
    pub included_packages: String,
    /// `SCHEMA.PACKAGE.ROUTINE` literals of allow-listed packaged routines.
    pub included_routines: String,
    /// Bare routine names of allow-listed loose routines.
    pub included_routines_no_pkg: String,
    pub excluded_packages: String,
    /// `SCHEMA.PACKAGE.ROUTINE` literals.
    pub excluded_routines: String,
    /// `SCHEMA.ROUTINE` literals.
    pub excluded_routines_no_pkg: String,
}

/// A schema's compiled filter specification. Immutable once compiled.
#[derive(Debug, Clone)]
pub struct SchemaFilter {
    name: String,
    no_package_name: String,
    appendix: Appendix,
    exclude_packages: BTreeSet<String>,
    exclude_routines: BTreeSet<Fqdn>,
    include_routines: BTreeSet<Fqdn>,
    fragments: FilterFragments,
}

impl SchemaFilter {
    /// Compile raw schema settings.
    pub fn compile(settings: &SchemaSettings) -> FilterResult<Self> {
        if !IDENTIFIER.is_match(&settings.name) {
            return Err(FilterError::InvalidSchemaName(settings.name.clone()));
        }
        let name = settings.name.to_uppercase();
        let no_package_name = settings
            .no_package_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .map(str::to_uppercase)
            .unwrap_or_else(|| format!("{}_NO_PKG", name));

        let include_routines = settings
            .include_routines
            .iter()
            .map(|spec| normalize(&name, spec))
            .collect::<FilterResult<BTreeSet<_>>>()?;

        let exclude_routines = settings
            .exclude_routines
            .iter()
            .map(|spec| normalize(&name, spec))
            .collect::<FilterResult<BTreeSet<_>>>()?;

        let exclude_packages = settings
            .exclude_packages
            .iter()
            .map(|package| {
                if IDENTIFIER.is_match(package) {
                    Ok(package.to_uppercase())
                } else {
                    Err(FilterError::InvalidPackage {
                        schema: name.clone(),
                        package: package.clone(),
                    })
                }
            })
            .collect::<FilterResult<BTreeSet<_>>>()?;

        let mut appendix = Appendix::default();
        for entry in &settings.appendix {
            let key = AppendixKey::new(entry.object_id, entry.subprogram_id, entry.position);
            let patch = RowPatch::decode(entry.comment.clone(), &entry.fields).map_err(
                |source| FilterError::InvalidAppendix {
                    schema: name.clone(),
                    key,
                    source,
                },
            )?;
            appendix.insert(key, patch);
        }

        let mut fragments = FilterFragments::default();
        if include_routines.is_empty() {
            fragments.excluded_packages =
                join_literals(exclude_packages.iter().map(String::as_str));

            let (packaged, loose): (Vec<&Fqdn>, Vec<&Fqdn>) =
                exclude_routines.iter().partition(|f| f.has_package());
            let packaged: Vec<String> = packaged.iter().map(|f| f.to_string()).collect();
            let loose: Vec<String> = loose.iter().map(|f| f.to_string()).collect();
            fragments.excluded_routines = join_literals(packaged.iter().map(String::as_str));
            fragments.excluded_routines_no_pkg = join_literals(loose.iter().map(String::as_str));
        } else {
            let packages: BTreeSet<&str> = include_routines
                .iter()
                .filter(|f| f.has_package())
                .map(|f| f.package.as_str())
                .collect();
            let packaged: Vec<String> = include_routines
                .iter()
                .filter(|f| f.has_package())
                .map(|f| f.to_string())
                .collect();
            fragments.included_packages = join_literals(packages);
            fragments.included_routines = join_literals(packaged.iter().map(String::as_str));
            fragments.included_routines_no_pkg = join_literals(
                include_routines
                    .iter()
                    .filter(|f| !f.has_package())
                    .map(|f| f.routine.as_str()),
            );
        }

        Ok(Self {
            name,
            no_package_name,
            appendix,
            exclude_packages,
            exclude_routines,
            include_routines,
            fragments,
        })
    }

    /// Upper-cased schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the synthetic package holding loose routines.
    pub fn no_package_name(&self) -> &str {
        &self.no_package_name
    }

    pub fn appendix(&self) -> &Appendix {
        &self.appendix
    }

    pub fn exclude_packages(&self) -> &BTreeSet<String> {
        &self.exclude_packages
    }

    pub fn exclude_routines(&self) -> &BTreeSet<Fqdn> {
        &self.exclude_routines
    }

    pub fn include_routines(&self) -> &BTreeSet<Fqdn> {
        &self.include_routines
    }

    pub fn fragments(&self) -> &FilterFragments {
        &self.fragments
    }

    /// True when an allow-list is active and exclusions are ignored.
    pub fn is_allow_list(&self) -> bool {
        !self.include_routines.is_empty()
    }
}
