//! The flag catalog: every flag the search may touch and its legal values

use bestflags_core::{Error, FlagSet, FlagValue, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// The values a flag ranges over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FlagDomain {
    /// An on/off switch
    Toggle,
    /// Integer levels `start..end` (end exclusive)
    Range { start: i64, end: i64 },
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagSpec {
    pub name: String,
    #[serde(flatten)]
    pub domain: FlagDomain,
    /// Whether a range flag may be left out of a flag set entirely.
    /// Toggles are never omittable: leaving one out means `false`.
    #[serde(default)]
    pub optional: bool,
}

impl FlagSpec {
    pub fn toggle(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: FlagDomain::Toggle,
            optional: false,
        }
    }

    pub fn range(name: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            name: name.into(),
            domain: FlagDomain::Range { start, end },
            optional: false,
        }
    }

    #[must_use]
    pub fn omittable(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn is_omittable(&self) -> bool {
        self.optional && matches!(self.domain, FlagDomain::Range { .. })
    }

    /// Values in ascending order
    pub fn values(&self) -> Vec<FlagValue> {
        match self.domain {
            FlagDomain::Toggle => vec![FlagValue::Bool(false), FlagValue::Bool(true)],
            FlagDomain::Range { start, end } => (start..end).map(FlagValue::Int).collect(),
        }
    }

    /// Every legal state in order: absent first (when omittable), then values.
    pub fn states(&self) -> Vec<Option<FlagValue>> {
        let mut states = Vec::new();
        if self.is_omittable() {
            states.push(None);
        }
        states.extend(self.values().into_iter().map(Some));
        states
    }

    /// Whether `value` (or absence) is legal for this flag
    pub fn admits(&self, value: Option<FlagValue>) -> bool {
        match (value, &self.domain) {
            (None, _) => self.is_omittable() || matches!(self.domain, FlagDomain::Toggle),
            (Some(FlagValue::Bool(_)), FlagDomain::Toggle) => true,
            (Some(FlagValue::Int(level)), FlagDomain::Range { start, end }) => {
                (*start..*end).contains(&level)
            }
            _ => false,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.name.chars().any(char::is_whitespace) {
            return Err(Error::configuration(format!(
                "invalid flag name '{}'",
                self.name
            )));
        }
        if let FlagDomain::Range { start, end } = self.domain {
            if start >= end {
                return Err(Error::configuration(format!(
                    "flag '{}' has an empty range [{start}-{end})",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FlagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.domain {
            FlagDomain::Toggle => write!(f, "{}", self.name),
            FlagDomain::Range { start, end } => {
                write!(f, "{}=[{start}-{end}]", self.name)?;
                if self.is_omittable() {
                    write!(f, " (optional)")?;
                }
                Ok(())
            }
        }
    }
}

/// Ordered, name-unique collection of flag specs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagCatalog {
    flags: IndexMap<String, FlagSpec>,
}

impl FlagCatalog {
    /// Build a catalog, rejecting duplicates and malformed entries
    pub fn new(specs: impl IntoIterator<Item = FlagSpec>) -> Result<Self> {
        let mut flags = IndexMap::new();
        for spec in specs {
            spec.validate()?;
            if flags.contains_key(&spec.name) {
                return Err(Error::configuration(format!(
                    "flag '{}' is declared more than once",
                    spec.name
                )));
            }
            flags.insert(spec.name.clone(), spec);
        }
        Ok(Self { flags })
    }

    /// Parse the line-oriented catalog format.
    ///
    /// `name` declares a toggle; `name=[start-end]` declares an omittable
    /// integer flag with values `start..end`. Blank lines and `#` comments
    /// are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut specs = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            specs.push(parse_line(index + 1, line)?);
        }
        Self::new(specs)
    }

    /// Load a catalog file in the line-oriented format
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, "read flag catalog", e))?;
        let catalog = Self::parse(&text)?;
        tracing::debug!(path = %path.display(), flags = catalog.len(), "loaded flag catalog");
        Ok(catalog)
    }

    /// Append the entries of `other`, rejecting names already present
    pub fn extend(&mut self, other: FlagCatalog) -> Result<()> {
        for (name, spec) in other.flags {
            if self.flags.contains_key(&name) {
                return Err(Error::configuration(format!(
                    "flag '{name}' is declared more than once"
                )));
            }
            self.flags.insert(name, spec);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FlagSpec> {
        self.flags.get(name)
    }

    /// Specs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags.values()
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Check that a flag set only names catalog flags with legal values
    pub fn check(&self, flags: &FlagSet) -> Result<()> {
        for (name, value) in flags.iter() {
            let spec = self.get(name).ok_or_else(|| {
                Error::configuration(format!("flag '{name}' is not in the catalog"))
            })?;
            if !spec.admits(Some(value)) {
                return Err(Error::configuration(format!(
                    "value {value} is not legal for flag {spec}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_line(line_no: usize, line: &str) -> Result<FlagSpec> {
    let Some((name, range)) = line.rsplit_once("=[") else {
        if line.contains('[') || line.contains(']') || line.chars().any(char::is_whitespace) {
            return Err(Error::flag_spec_parse(line_no, line, "malformed flag"));
        }
        return Ok(FlagSpec::toggle(line));
    };

    let range = range
        .strip_suffix(']')
        .ok_or_else(|| Error::flag_spec_parse(line_no, line, "range is missing ']'"))?;
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| Error::flag_spec_parse(line_no, line, "range must be 'start-end'"))?;
    let start: i64 = start
        .trim()
        .parse()
        .map_err(|_| Error::flag_spec_parse(line_no, line, "range start is not an integer"))?;
    let end: i64 = end
        .trim()
        .parse()
        .map_err(|_| Error::flag_spec_parse(line_no, line, "range end is not an integer"))?;
    if start >= end {
        return Err(Error::flag_spec_parse(line_no, line, "range is empty"));
    }
    if name.is_empty() {
        return Err(Error::flag_spec_parse(line_no, line, "flag name is empty"));
    }
    Ok(FlagSpec::range(name, start, end).omittable())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toggles_ranges_and_comments() {
        let catalog = FlagCatalog::parse(
            "# gcc knobs\n-funroll-loops\n\n-falign-loops=[1-10]  # alignment\n",
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        let names: Vec<&str> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["-funroll-loops", "-falign-loops"]);

        let align = catalog.get("-falign-loops").unwrap();
        assert_eq!(align.domain, FlagDomain::Range { start: 1, end: 10 });
        assert!(align.is_omittable());
        assert_eq!(align.states().len(), 10);
        assert_eq!(align.states()[0], None);
    }

    #[test]
    fn reports_the_offending_line() {
        let err = FlagCatalog::parse("-fa\n-fb=[5-2]\n").unwrap_err();
        match err {
            Error::FlagSpecParse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(FlagCatalog::parse("-fc=[1-x]").is_err());
        assert!(FlagCatalog::parse("-fd=[1-3").is_err());
        assert!(FlagCatalog::parse("two words").is_err());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = FlagCatalog::parse("-fa\n-fa\n").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn toggles_are_never_omittable() {
        let spec = FlagSpec::toggle("-fpic").omittable();
        assert!(!spec.is_omittable());
        assert_eq!(
            spec.states(),
            vec![Some(FlagValue::Bool(false)), Some(FlagValue::Bool(true))]
        );
        assert!(spec.admits(None));
    }

    #[test]
    fn checks_flag_sets_against_the_catalog() {
        let catalog = FlagCatalog::new([FlagSpec::range("opt_level", 0, 4)]).unwrap();
        let ok = FlagSet::from_iter([("opt_level", FlagValue::Int(3))]);
        let out_of_range = FlagSet::from_iter([("opt_level", FlagValue::Int(4))]);
        let unknown = FlagSet::from_iter([("-flto", FlagValue::Bool(true))]);
        assert!(catalog.check(&ok).is_ok());
        assert!(catalog.check(&out_of_range).is_err());
        assert!(catalog.check(&unknown).is_err());
    }

    #[test]
    fn inline_specs_deserialize_from_json() {
        let spec: FlagSpec = serde_json::from_str(
            r#"{"name": "opt_level", "kind": "range", "start": 0, "end": 4}"#,
        )
        .unwrap();
        assert_eq!(spec, FlagSpec::range("opt_level", 0, 4));
        let spec: FlagSpec =
            serde_json::from_str(r#"{"name": "-flto", "kind": "toggle"}"#).unwrap();
        assert_eq!(spec, FlagSpec::toggle("-flto"));
    }
}
