use derive_more::Display;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::{collections::BTreeSet, fmt, str::FromStr};
use thiserror::Error;

use crate::store_path::{into_name, StorePathNameError};

#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Display, SerializeDisplay, DeserializeFromStr,
)]
pub struct OutputName(pub(crate) String);
impl AsRef<str> for OutputName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for OutputName {
    type Err = StorePathNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = into_name(&s)?.to_string();
        Ok(OutputName(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputSpec {
    All,
    Named(BTreeSet<OutputName>),
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputSpec::All => f.write_str("*")?,
            OutputSpec::Named(outputs) => {
                let mut it = outputs.iter();
                if let Some(output) = it.next() {
                    write!(f, "{}", output)?;
                    for output in it {
                        write!(f, ",{}", output)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl FromStr for OutputSpec {
    type Err = StorePathNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(OutputSpec::All)
        } else {
            let mut outputs = BTreeSet::new();
            for name in s.split(",") {
                let output = name.parse()?;
                outputs.insert(output);
            }
            Ok(OutputSpec::Named(outputs))
        }
    }
}

impl OutputSpec {
    pub fn union_(&self, other: &OutputSpec) -> OutputSpec {
        match (self, other) {
            (OutputSpec::All, _) | (_, OutputSpec::All) => OutputSpec::All,
            (OutputSpec::Named(a), OutputSpec::Named(b)) => {
                OutputSpec::Named(a.union(b).cloned().collect())
            }
        }
    }

    pub fn is_subset_of(&self, other: &OutputSpec) -> bool {
        match (self, other) {
            (_, OutputSpec::All) => true,
            (OutputSpec::All, OutputSpec::Named(_)) => false,
            (OutputSpec::Named(a), OutputSpec::Named(b)) => a.is_subset(b),
        }
    }
}

/// An `OutputSpec` qualified by an optional dynamic-derivation path prefix,
/// as found after the last unescaped `^` in a derived-path string like
/// `foo.drv^bar^out,bin`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtendedOutputsSpec {
    Default,
    Explicit(OutputSpec),
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub enum ParseExtendedOutputsSpecError {
    #[error("invalid output name in extended outputs spec")]
    BadOutputName(#[from] StorePathNameError),
}

impl fmt::Display for ExtendedOutputsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtendedOutputsSpec::Default => Ok(()),
            ExtendedOutputsSpec::Explicit(spec) => write!(f, "^{}", spec),
        }
    }
}

impl ExtendedOutputsSpec {
    /// Splits `s` at the last `^`, returning the prefix unchanged and the
    /// parsed `ExtendedOutputsSpec` suffix (or `Default` if there is none).
    pub fn parse_opt(s: &str) -> Result<(&str, ExtendedOutputsSpec), ParseExtendedOutputsSpecError> {
        match s.rsplit_once('^') {
            None => Ok((s, ExtendedOutputsSpec::Default)),
            Some((prefix, suffix)) => {
                let spec = suffix.parse::<OutputSpec>()?;
                Ok((prefix, ExtendedOutputsSpec::Explicit(spec)))
            }
        }
    }
}

#[cfg(test)]
mod unittests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*", OutputSpec::All)]
    #[case("out", OutputSpec::Named(BTreeSet::from([OutputName("out".into())])))]
    #[case("bin,out", OutputSpec::Named(BTreeSet::from([
        OutputName("bin".into()), OutputName("out".into())
    ])))]
    fn parse_print_roundtrip(#[case] input: &str, #[case] expected: OutputSpec) {
        let parsed: OutputSpec = input.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string().parse::<OutputSpec>().unwrap(), expected);
    }

    #[rstest]
    #[case("*,foo")]
    #[case("foo,*")]
    #[case("**")]
    fn parse_rejects_star_mixed_with_names(#[case] input: &str) {
        assert!(input.parse::<OutputSpec>().is_err());
    }

    #[test]
    fn union_all_absorbs() {
        let all = OutputSpec::All;
        let a: OutputSpec = "a".parse().unwrap();
        assert_eq!(all.union_(&a), OutputSpec::All);
        assert_eq!(a.union_(&all), OutputSpec::All);
    }

    #[test]
    fn union_named_is_set_union() {
        let a: OutputSpec = "a".parse().unwrap();
        let b: OutputSpec = "b".parse().unwrap();
        assert_eq!(a.union_(&b), "a,b".parse().unwrap());
    }

    #[test]
    fn is_subset_of_matches_set_containment() {
        let all = OutputSpec::All;
        let a: OutputSpec = "a".parse().unwrap();
        assert!(a.is_subset_of(&all));
        let ab: OutputSpec = "a,b".parse().unwrap();
        assert!(a.is_subset_of(&ab));
        assert!(!ab.is_subset_of(&a));
    }

    #[test]
    fn extended_outputs_spec_splits_on_last_caret() {
        let (prefix, spec) = ExtendedOutputsSpec::parse_opt("foo^bar^out,bin").unwrap();
        assert_eq!(prefix, "foo^bar");
        assert_eq!(
            spec,
            ExtendedOutputsSpec::Explicit("out,bin".parse().unwrap())
        );
    }

    #[test]
    fn extended_outputs_spec_defaults_without_caret() {
        let (prefix, spec) = ExtendedOutputsSpec::parse_opt("foo").unwrap();
        assert_eq!(prefix, "foo");
        assert_eq!(spec, ExtendedOutputsSpec::Default);
    }
}
